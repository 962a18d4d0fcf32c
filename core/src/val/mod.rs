use std::fmt;
use std::sync::{Arc, RwLock};

use num_bigint::BigInt;

use crate::symbol::Symbol;
use crate::universe::Class;

mod convert;
pub mod num;
mod object;

pub use object::{BlockValue, Instance};

pub type ArrayRef = Arc<RwLock<Vec<Val>>>;

/// A runtime value. Immediates are stored inline; everything with identity
/// lives behind an `Arc` so that `==` can compare pointers.
#[derive(Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    BigInt(Arc<BigInt>),
    Double(f64),
    Str(Arc<str>),
    Symbol(Symbol),
    Array(ArrayRef),
    Block(Arc<BlockValue>),
    Object(Arc<Instance>),
    Class(Arc<Class>),
}

impl Val {
    pub fn new_array(items: Vec<Val>) -> Val {
        Val::Array(Arc::new(RwLock::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Nil => "Nil",
            Val::Bool(true) => "True",
            Val::Bool(false) => "False",
            Val::Int(_) | Val::BigInt(_) => "Integer",
            Val::Double(_) => "Double",
            Val::Str(_) => "String",
            Val::Symbol(_) => "Symbol",
            Val::Array(_) => "Array",
            Val::Block(_) => "Block",
            Val::Object(_) => "Object",
            Val::Class(_) => "Class",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Smalltalk `==`: value identity for immediates, pointer identity otherwise.
    pub fn is_identical(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::BigInt(a), Val::BigInt(b)) => Arc::ptr_eq(a, b) || a == b,
            (Val::Double(a), Val::Double(b)) => a.to_bits() == b.to_bits(),
            (Val::Str(a), Val::Str(b)) => Arc::ptr_eq(a, b),
            (Val::Symbol(a), Val::Symbol(b)) => a == b,
            (Val::Array(a), Val::Array(b)) => Arc::ptr_eq(a, b),
            (Val::Block(a), Val::Block(b)) => Arc::ptr_eq(a, b),
            (Val::Object(a), Val::Object(b)) => Arc::ptr_eq(a, b),
            (Val::Class(a), Val::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Double(a), Val::Double(b)) => a == b,
            (Val::Int(_) | Val::BigInt(_), Val::Int(_) | Val::BigInt(_)) => {
                num::compare(num::CmpOp::Eq, self, other).unwrap_or(false)
            }
            _ => self.is_identical(other),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => f.write_str("nil"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Int(i) => write!(f, "{i}"),
            Val::BigInt(i) => write!(f, "{i}"),
            Val::Double(d) => write!(f, "{d:?}"),
            Val::Str(s) => f.write_str(s),
            Val::Symbol(s) => write!(f, "#{s}"),
            Val::Array(items) => {
                f.write_str("#(")?;
                let items = crate::util::sync::read(items);
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Val::Block(b) => write!(f, "a Block{}", b.num_args()),
            Val::Object(o) => write!(f, "a {}", o.class().name()),
            Val::Class(c) => write!(f, "{}", c.name()),
        }
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => write!(f, "{s:?}"),
            Val::BigInt(i) => write!(f, "BigInt({i})"),
            other => write!(f, "{other}"),
        }
    }
}

#[cfg(test)]
mod val_test;
