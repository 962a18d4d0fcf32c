use anyhow::anyhow;

use super::define;
use crate::universe::ClassTable;
use crate::val::Val;
use crate::vm::{Completion, EagerOp, Primitive, Unwind, Vm};

pub(super) fn install(classes: &ClassTable) {
    let core = classes.core();
    // closure forms; literal-block arguments are inlined by the compiler
    define(
        classes,
        &core.boolean,
        [
            Primitive::new("not", not).with_eager(EagerOp::Not),
            Primitive::new("&", and),
            Primitive::new("|", or),
            Primitive::new("and:", and_then),
            Primitive::new("or:", or_else),
            Primitive::new("ifTrue:", if_true),
            Primitive::new("ifFalse:", if_false),
            Primitive::new("ifTrue:ifFalse:", if_true_if_false),
            Primitive::new("ifFalse:ifTrue:", if_false_if_true),
        ],
    );
    define(
        classes,
        &core.block,
        [
            Primitive::new("value", value).with_eager(EagerOp::BlockValue),
            Primitive::new("value:", value).with_eager(EagerOp::BlockValue1),
            Primitive::new("value:with:", value).with_eager(EagerOp::BlockValue2),
            Primitive::new("numArgs", num_args),
            Primitive::new("restart", restart),
        ],
    );
}

fn truth(args: &[Val]) -> Completion<bool> {
    match args[0] {
        Val::Bool(b) => Ok(b),
        ref other => Err(anyhow!("{} is not a Boolean", other.type_name()).into()),
    }
}

fn not(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Bool(!truth(args)?))
}

fn and(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(if truth(args)? { args[1].clone() } else { Val::Bool(false) })
}

fn or(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(if truth(args)? { Val::Bool(true) } else { args[1].clone() })
}

fn and_then(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    if truth(args)? { vm.value_of(&args[1]) } else { Ok(Val::Bool(false)) }
}

fn or_else(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    if truth(args)? { Ok(Val::Bool(true)) } else { vm.value_of(&args[1]) }
}

fn if_true(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    if truth(args)? { vm.value_of(&args[1]) } else { Ok(Val::Nil) }
}

fn if_false(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    if truth(args)? { Ok(Val::Nil) } else { vm.value_of(&args[1]) }
}

fn if_true_if_false(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let branch = if truth(args)? { &args[1] } else { &args[2] };
    vm.value_of(branch)
}

fn if_false_if_true(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let branch = if truth(args)? { &args[2] } else { &args[1] };
    vm.value_of(branch)
}

/// `value`, `value:` and `value:with:`.
fn value(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    match &args[0] {
        Val::Block(b) => {
            let block = b.clone();
            vm.invoke_block(&block, args[1..].to_vec())
        }
        other => Err(anyhow!("{} is not a Block", other.type_name()).into()),
    }
}

fn num_args(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    match &args[0] {
        Val::Block(b) => Ok(Val::Int(b.num_args() as i64)),
        other => Err(anyhow!("{} is not a Block", other.type_name()).into()),
    }
}

/// Replays the activation that sent `restart` from its first instruction.
fn restart(_: &mut Vm, _args: &[Val]) -> Completion<Val> {
    Err(Unwind::Restart)
}
