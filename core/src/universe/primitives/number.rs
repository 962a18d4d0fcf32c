use anyhow::anyhow;
use num_traits::ToPrimitive;

use super::{block_arg, define, int_arg, type_error};
use crate::universe::ClassTable;
use crate::val::Val;
use crate::val::num::{self, ArithOp, CmpOp};
use crate::vm::{Completion, EagerOp, Primitive, Vm};

pub(super) fn install(classes: &ClassTable) {
    let core = classes.core();
    define(
        classes,
        &core.integer,
        [
            Primitive::new("+", add).with_eager(EagerOp::IntAdd),
            Primitive::new("-", sub).with_eager(EagerOp::IntSub),
            Primitive::new("*", mul).with_eager(EagerOp::IntMul),
            Primitive::new("//", quo),
            Primitive::new("\\\\", rem),
            Primitive::new("<", lt).with_eager(EagerOp::IntLt),
            Primitive::new("<=", le).with_eager(EagerOp::IntLe),
            Primitive::new(">", gt).with_eager(EagerOp::IntGt),
            Primitive::new(">=", ge).with_eager(EagerOp::IntGe),
            Primitive::new("=", eq).with_eager(EagerOp::IntEq),
            Primitive::new("~=", ne).with_eager(EagerOp::IntNe),
            Primitive::new("negated", negated),
            Primitive::new("printString", print_string),
            Primitive::new("asDouble", as_double),
            Primitive::new("to:do:", to_do).with_eager(EagerOp::IntToDo),
            Primitive::new("timesRepeat:", times_repeat),
        ],
    );
    define(
        classes,
        &core.double,
        [
            Primitive::new("+", add),
            Primitive::new("-", sub),
            Primitive::new("*", mul),
            Primitive::new("/", div),
            Primitive::new("<", lt),
            Primitive::new("<=", le),
            Primitive::new(">", gt),
            Primitive::new(">=", ge),
            Primitive::new("=", eq),
            Primitive::new("printString", print_string),
        ],
    );
}

fn arith(op: ArithOp, selector: &str, args: &[Val]) -> Completion<Val> {
    let (lhs, rhs) = (&args[0], &args[1]);
    if let Some(r) = num::integer_binary(op, lhs, rhs) {
        return Ok(r?);
    }
    match num::double_binary(op, lhs, rhs) {
        Some(r) => Ok(r?),
        None => Err(type_error(lhs, selector, "a number", rhs)),
    }
}

fn compare(op: CmpOp, selector: &str, args: &[Val]) -> Completion<Val> {
    match num::compare(op, &args[0], &args[1]) {
        Some(b) => Ok(Val::Bool(b)),
        // equality with a non-number is simply false
        None if op == CmpOp::Eq => Ok(Val::Bool(false)),
        None if op == CmpOp::Ne => Ok(Val::Bool(true)),
        None => Err(type_error(&args[0], selector, "a number", &args[1])),
    }
}

fn add(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    arith(ArithOp::Add, "+", args)
}

fn sub(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    arith(ArithOp::Sub, "-", args)
}

fn mul(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    arith(ArithOp::Mul, "*", args)
}

fn quo(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    arith(ArithOp::Quo, "//", args)
}

fn rem(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    arith(ArithOp::Rem, "\\\\", args)
}

fn div(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    match num::double_binary(ArithOp::Div, &args[0], &args[1]) {
        Some(r) => Ok(r?),
        None => Err(type_error(&args[0], "/", "a number", &args[1])),
    }
}

fn lt(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    compare(CmpOp::Lt, "<", args)
}

fn le(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    compare(CmpOp::Le, "<=", args)
}

fn gt(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    compare(CmpOp::Gt, ">", args)
}

fn ge(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    compare(CmpOp::Ge, ">=", args)
}

fn eq(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    compare(CmpOp::Eq, "=", args)
}

fn ne(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    compare(CmpOp::Ne, "~=", args)
}

fn negated(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    if let Val::Double(d) = args[0] {
        return Ok(Val::Double(-d));
    }
    arith(ArithOp::Sub, "negated", &[Val::Int(0), args[0].clone()])
}

fn print_string(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::from(args[0].to_string()))
}

fn as_double(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let d = match &args[0] {
        Val::Int(i) => *i as f64,
        Val::BigInt(b) => b.to_f64().ok_or_else(|| anyhow!("{} does not fit a double", b))?,
        Val::Double(d) => *d,
        other => return Err(anyhow!("asDouble sent to {}", other.type_name()).into()),
    };
    Ok(Val::Double(d))
}

/// Closure form of `to:do:`, used when the body is not a literal block.
fn to_do(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let start = int_arg(args, 0, "to:do:")?;
    let limit = int_arg(args, 1, "to:do:")?;
    let body = block_arg(args, 2, "to:do:")?;
    vm.to_do(start, limit, &body)?;
    Ok(args[0].clone())
}

fn times_repeat(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let count = int_arg(args, 0, "timesRepeat:")?;
    let body = block_arg(args, 1, "timesRepeat:")?;
    for _ in 0..count {
        vm.invoke_block(&body, Vec::new())?;
    }
    Ok(args[0].clone())
}
