use std::sync::Arc;

use num_bigint::BigInt;

use super::{Val, num};
use crate::symbol::Symbol;

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<f64> for Val {
    fn from(f: f64) -> Self {
        Val::Double(f)
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<Symbol> for Val {
    fn from(s: Symbol) -> Self {
        Val::Symbol(s)
    }
}

/// Big integers are reduced to `Int` whenever they fit.
impl From<BigInt> for Val {
    fn from(i: BigInt) -> Self {
        num::reduce(i)
    }
}

impl From<()> for Val {
    fn from(_: ()) -> Self {
        Val::Nil
    }
}
