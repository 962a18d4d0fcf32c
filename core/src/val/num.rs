//! Integer and double arithmetic with overflow promotion.
//!
//! The `i64` fast path uses checked operations; an overflow diverts to the
//! cold big-integer path, and big results that fit are reduced again.

use std::sync::Arc;

use anyhow::{Result, bail};
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

use super::Val;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// `/` on doubles.
    Div,
    /// `//`, floored.
    Quo,
    /// `\\`, floored modulo (sign of the divisor).
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Lt => ord == Less,
            CmpOp::Le => ord != Greater,
            CmpOp::Gt => ord == Greater,
            CmpOp::Ge => ord != Less,
            CmpOp::Eq => ord == Equal,
            CmpOp::Ne => ord != Equal,
        }
    }
}

pub fn reduce(value: BigInt) -> Val {
    match value.to_i64() {
        Some(i) => Val::Int(i),
        None => Val::BigInt(Arc::new(value)),
    }
}

fn to_big(v: &Val) -> Option<BigInt> {
    match v {
        Val::Int(i) => Some(BigInt::from(*i)),
        Val::BigInt(b) => Some((**b).clone()),
        _ => None,
    }
}

fn to_f64(v: &Val) -> Option<f64> {
    match v {
        Val::Int(i) => Some(*i as f64),
        Val::BigInt(b) => b.to_f64(),
        Val::Double(d) => Some(*d),
        _ => None,
    }
}

/// Integer arithmetic. `None` when either operand is not an integer.
pub fn integer_binary(op: ArithOp, lhs: &Val, rhs: &Val) -> Option<Result<Val>> {
    match (lhs, rhs) {
        (Val::Int(a), Val::Int(b)) => Some(small_binary(op, *a, *b)),
        _ => {
            let a = to_big(lhs)?;
            let b = to_big(rhs)?;
            Some(big_binary(op, a, b))
        }
    }
}

#[inline]
fn small_binary(op: ArithOp, a: i64, b: i64) -> Result<Val> {
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Quo | ArithOp::Div => {
            if b == 0 {
                bail!("division by zero");
            }
            floor_div(a, b)
        }
        ArithOp::Rem => {
            if b == 0 {
                bail!("division by zero");
            }
            floor_mod(a, b)
        }
    };
    match result {
        Some(v) => Ok(Val::Int(v)),
        None => promote(op, a, b),
    }
}

#[cold]
#[inline(never)]
fn promote(op: ArithOp, a: i64, b: i64) -> Result<Val> {
    tracing::debug!(target: "sprig::vm::slowpath", ?op, a, b, "integer overflow, promoting to big integer");
    big_binary(op, BigInt::from(a), BigInt::from(b))
}

#[cold]
fn big_binary(op: ArithOp, a: BigInt, b: BigInt) -> Result<Val> {
    let value = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Quo | ArithOp::Div | ArithOp::Rem => {
            if b.is_zero() {
                bail!("division by zero");
            }
            let mut q = &a / &b;
            let mut r = &a % &b;
            if !r.is_zero() && (r.sign() == Sign::Minus) != (b.sign() == Sign::Minus) {
                q -= 1;
                r += &b;
            }
            if op == ArithOp::Rem { r } else { q }
        }
    };
    Ok(reduce(value))
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) { q.checked_sub(1) } else { Some(q) }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) { Some(r + b) } else { Some(r) }
}

/// Double arithmetic; integers on either side are widened.
pub fn double_binary(op: ArithOp, lhs: &Val, rhs: &Val) -> Option<Result<Val>> {
    let a = to_f64(lhs)?;
    let b = to_f64(rhs)?;
    let v = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Quo => (a / b).floor(),
        ArithOp::Rem => a - b * (a / b).floor(),
    };
    Some(Ok(Val::Double(v)))
}

/// Numeric comparison across `Int`, `BigInt` and `Double`.
pub fn compare(op: CmpOp, lhs: &Val, rhs: &Val) -> Option<bool> {
    let ord = match (lhs, rhs) {
        (Val::Int(a), Val::Int(b)) => a.cmp(b),
        (Val::Double(_), _) | (_, Val::Double(_)) => to_f64(lhs)?.partial_cmp(&to_f64(rhs)?)?,
        _ => to_big(lhs)?.cmp(&to_big(rhs)?),
    };
    Some(op.holds(ord))
}

/// `value + 1` for the `INC` instruction.
pub fn increment(v: &Val) -> Option<Result<Val>> {
    match v {
        Val::Int(i) => Some(match i.checked_add(1) {
            Some(n) => Ok(Val::Int(n)),
            None => promote(ArithOp::Add, *i, 1),
        }),
        Val::Double(d) => Some(Ok(Val::Double(d + 1.0))),
        Val::BigInt(_) => integer_binary(ArithOp::Add, v, &Val::Int(1)),
        _ => None,
    }
}

/// `value - 1` for the `DEC` instruction.
pub fn decrement(v: &Val) -> Option<Result<Val>> {
    match v {
        Val::Int(i) => Some(match i.checked_sub(1) {
            Some(n) => Ok(Val::Int(n)),
            None => promote(ArithOp::Sub, *i, 1),
        }),
        Val::Double(d) => Some(Ok(Val::Double(d - 1.0))),
        Val::BigInt(_) => integer_binary(ArithOp::Sub, v, &Val::Int(1)),
        _ => None,
    }
}
