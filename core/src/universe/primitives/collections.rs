use anyhow::anyhow;

use super::{define, index, int_arg, text, type_error};
use crate::symbol::Symbol;
use crate::universe::ClassTable;
use crate::util::sync;
use crate::val::Val;
use crate::vm::{Completion, Primitive, Vm};

pub(super) fn install(classes: &ClassTable) {
    let core = classes.core();
    define(
        classes,
        &core.string,
        [
            Primitive::new(",", concat),
            Primitive::new("length", length),
            Primitive::new("=", equal),
            Primitive::new("printString", print_string),
            Primitive::new("asSymbol", as_symbol),
        ],
    );
    define(classes, &core.symbol, [Primitive::new("asString", as_string)]);
    define(
        classes,
        &core.array,
        [
            Primitive::new("at:", at),
            Primitive::new("at:put:", at_put),
            Primitive::new("length", length),
        ],
    );
    if let Some(meta) = core.array.metaclass() {
        define(classes, meta, [Primitive::new("new:", new_array)]);
    }
}

fn concat(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    match (text(&args[0]), text(&args[1])) {
        (Some(a), Some(b)) => Ok(Val::from(format!("{a}{b}"))),
        _ => Err(type_error(&args[0], ",", "a string", &args[1])),
    }
}

fn length(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let len = match &args[0] {
        Val::Array(items) => sync::read(items).len(),
        other => match text(other) {
            Some(s) => s.chars().count(),
            None => return Err(anyhow!("length sent to {}", other.type_name()).into()),
        },
    };
    Ok(Val::Int(len as i64))
}

fn equal(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::Bool(match (text(&args[0]), text(&args[1])) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }))
}

fn print_string(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    Ok(Val::from(args[0].to_string()))
}

fn as_symbol(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    match text(&args[0]) {
        Some(s) => Ok(Val::Symbol(Symbol::intern(&s))),
        None => Err(anyhow!("asSymbol sent to {}", args[0].type_name()).into()),
    }
}

fn as_string(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    match &args[0] {
        Val::Symbol(s) => Ok(Val::Str(s.as_str())),
        other => Ok(other.clone()),
    }
}

fn at(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let Val::Array(items) = &args[0] else {
        return Err(anyhow!("at: sent to {}", args[0].type_name()).into());
    };
    let items = sync::read(items);
    let i = index(args, 1, items.len(), "at:")?;
    Ok(items[i].clone())
}

fn at_put(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let Val::Array(items) = &args[0] else {
        return Err(anyhow!("at:put: sent to {}", args[0].type_name()).into());
    };
    let mut items = sync::write(items);
    let i = index(args, 1, items.len(), "at:put:")?;
    items[i] = args[2].clone();
    Ok(args[2].clone())
}

/// `Array new: size`, filled with nil.
fn new_array(_: &mut Vm, args: &[Val]) -> Completion<Val> {
    let size = int_arg(args, 1, "new:")?;
    if size < 0 {
        return Err(anyhow!("negative array size {}", size).into());
    }
    Ok(Val::new_array(vec![Val::Nil; size as usize]))
}
