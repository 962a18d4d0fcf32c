use std::sync::Arc;

use anyhow::anyhow;

use super::{define, index, symbol_arg, type_error};
use crate::symbol::Symbol;
use crate::universe::ClassTable;
use crate::util::{fast_hash, sync};
use crate::val::Val;
use crate::vm::{Completion, EagerOp, Primitive, Vm};

pub(super) fn install(classes: &ClassTable) {
    let core = classes.core();
    define(
        classes,
        &core.object,
        [
            Primitive::new("==", identical).with_eager(EagerOp::Identical),
            Primitive::new("=", equal),
            Primitive::new("~=", not_equal),
            Primitive::new("class", class),
            Primitive::new("isNil", is_nil).with_eager(EagerOp::IsNil),
            Primitive::new("notNil", not_nil).with_eager(EagerOp::NotNil),
            Primitive::new("value", value),
            Primitive::new("printString", print_string),
            Primitive::new("println", println),
            Primitive::new("hashcode", hashcode),
            Primitive::new("perform:", perform),
            Primitive::new("perform:with:", perform),
            Primitive::new("perform:withArguments:", perform_with_arguments),
            Primitive::new("respondsTo:", responds_to),
            Primitive::new("instVarAt:", inst_var_at),
            Primitive::new("instVarAt:put:", inst_var_at_put),
        ],
    );
    define(
        classes,
        &core.class,
        [
            Primitive::new("new", new),
            Primitive::new("name", name),
            Primitive::new("superclass", superclass),
        ],
    );
    define(
        classes,
        &core.system,
        [
            Primitive::new("global:", global),
            Primitive::new("global:put:", global_put),
            Primitive::new("hasGlobal:", has_global),
            Primitive::new("printString:", system_print),
            Primitive::new("printNewline", print_newline),
            Primitive::new("ticks", ticks),
        ],
    );
}

fn identical(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Bool(args[0].is_identical(&args[1])))
}

fn equal(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Bool(args[0] == args[1]))
}

fn not_equal(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Bool(args[0] != args[1]))
}

fn class(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Class(vm.classes().class_of(&args[0]).clone()))
}

fn is_nil(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Bool(args[0].is_nil()))
}

fn not_nil(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Bool(!args[0].is_nil()))
}

fn value(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(args[0].clone())
}

fn print_string(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::from(args[0].to_string()))
}

fn println(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    vm.output().write_str(&format!("{}\n", args[0]));
    Ok(args[0].clone())
}

fn hashcode(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let h = match &args[0] {
        Val::Int(i) => return Ok(Val::Int(*i)),
        Val::Nil => fast_hash(&0u8),
        Val::Bool(b) => fast_hash(b),
        Val::BigInt(b) => fast_hash(&**b),
        Val::Double(d) => fast_hash(&d.to_bits()),
        Val::Str(s) => fast_hash(&**s),
        Val::Symbol(s) => fast_hash(&s.id()),
        Val::Array(a) => fast_hash(&(Arc::as_ptr(a) as usize)),
        Val::Block(b) => fast_hash(&(Arc::as_ptr(b) as usize)),
        Val::Object(o) => fast_hash(&(Arc::as_ptr(o) as usize)),
        Val::Class(c) => fast_hash(&(Arc::as_ptr(c) as usize)),
    };
    // keep it a small integer
    Ok(Val::Int((h >> 2) as i64))
}

fn dispatch(vm: &mut Vm, selector: Symbol, args: Vec<Val>) -> Completion<Val> {
    if selector.arity() != args.len() - 1 {
        return Err(anyhow!(
            "#{} takes {} arguments, {} given",
            selector,
            selector.arity(),
            args.len() - 1
        )
        .into());
    }
    vm.send_uncached(selector, args)
}

/// `perform:` and `perform:with:`.
fn perform(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let selector = symbol_arg(args, 1, "perform:")?;
    let mut call = Vec::with_capacity(args.len() - 1);
    call.push(args[0].clone());
    call.extend_from_slice(&args[2..]);
    dispatch(vm, selector, call)
}

fn perform_with_arguments(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let selector = symbol_arg(args, 1, "perform:withArguments:")?;
    let Val::Array(items) = &args[2] else {
        return Err(type_error(&args[0], "perform:withArguments:", "an array", &args[2]));
    };
    let mut call = vec![args[0].clone()];
    call.extend(sync::read(items).iter().cloned());
    dispatch(vm, selector, call)
}

fn responds_to(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let selector = symbol_arg(args, 1, "respondsTo:")?;
    Ok(Val::Bool(vm.classes().understands(&args[0], selector)))
}

fn inst_var_at(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let Val::Object(o) = &args[0] else {
        return Err(anyhow!("{} has no instance variables", args[0].type_name()).into());
    };
    let idx = index(args, 1, o.layout().field_count(), "instVarAt:")?;
    Ok(o.field(idx)?)
}

fn inst_var_at_put(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let Val::Object(o) = &args[0] else {
        return Err(anyhow!("{} has no instance variables", args[0].type_name()).into());
    };
    o.update_layout();
    let idx = index(args, 1, o.layout().field_count(), "instVarAt:put:")?;
    o.set_field(idx, args[2].clone())?;
    Ok(args[2].clone())
}

fn new(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    match &args[0] {
        Val::Class(c) if Arc::ptr_eq(c, &vm.classes().core().array) => Ok(Val::new_array(Vec::new())),
        Val::Class(c) => Ok(vm.new_instance(c)),
        other => Err(anyhow!("new sent to non-class {}", other.type_name()).into()),
    }
}

fn name(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    match &args[0] {
        Val::Class(c) => Ok(Val::Symbol(c.name())),
        other => Err(anyhow!("name sent to non-class {}", other.type_name()).into()),
    }
}

fn superclass(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    match &args[0] {
        Val::Class(c) => Ok(c.superclass().map(|s| Val::Class(s.clone())).unwrap_or(Val::Nil)),
        other => Err(anyhow!("superclass sent to non-class {}", other.type_name()).into()),
    }
}

fn global(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let name = symbol_arg(args, 1, "global:")?;
    Ok(vm.globals().read(name).unwrap_or(Val::Nil))
}

fn global_put(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let name = symbol_arg(args, 1, "global:put:")?;
    vm.globals().write(name, args[2].clone());
    Ok(args[2].clone())
}

fn has_global(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    let name = symbol_arg(args, 1, "hasGlobal:")?;
    Ok(Val::Bool(vm.globals().contains(name)))
}

fn system_print(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    vm.output().write_str(&args[1].to_string());
    Ok(args[0].clone())
}

fn print_newline(vm: &mut Vm, args: &[Val]) -> Completion<Val> {
    vm.output().write_str("\n");
    Ok(args[0].clone())
}

fn ticks(vm: &mut Vm, _args: &[Val]) -> Completion<Val> {
    Ok(Val::Int(vm.elapsed_micros()))
}

