//! Native methods of the bootstrap classes.

mod block;
mod collections;
mod number;
mod object;

use std::sync::Arc;

use anyhow::anyhow;

use crate::symbol::Symbol;
use crate::universe::{Class, ClassTable};
use crate::val::{BlockValue, Val};
use crate::vm::{Completion, Invokable, Primitive, Unwind};

pub(super) fn install(classes: &ClassTable) {
    object::install(classes);
    number::install(classes);
    block::install(classes);
    collections::install(classes);
}

fn define<const N: usize>(classes: &ClassTable, class: &Arc<Class>, primitives: [Primitive; N]) {
    for p in primitives {
        classes.install(class, Invokable::Primitive(Arc::new(p)));
    }
}

fn type_error(receiver: &Val, selector: &str, expected: &str, got: &Val) -> Unwind {
    anyhow!(
        "{}>>{} expects {}, got {}",
        receiver.type_name(),
        selector,
        expected,
        got.type_name()
    )
    .into()
}

fn int_arg(args: &[Val], idx: usize, selector: &str) -> Completion<i64> {
    match &args[idx] {
        Val::Int(i) => Ok(*i),
        other => Err(type_error(&args[0], selector, "a small integer", other)),
    }
}

fn symbol_arg(args: &[Val], idx: usize, selector: &str) -> Completion<Symbol> {
    match &args[idx] {
        Val::Symbol(s) => Ok(*s),
        Val::Str(s) => Ok(Symbol::intern(s)),
        other => Err(type_error(&args[0], selector, "a selector", other)),
    }
}

fn block_arg(args: &[Val], idx: usize, selector: &str) -> Completion<Arc<BlockValue>> {
    match &args[idx] {
        Val::Block(b) => Ok(b.clone()),
        other => Err(type_error(&args[0], selector, "a block", other)),
    }
}

/// Character data of strings and symbols.
fn text(v: &Val) -> Option<Arc<str>> {
    match v {
        Val::Str(s) => Some(s.clone()),
        Val::Symbol(s) => Some(s.as_str()),
        _ => None,
    }
}

/// 1-based index into a collection of `len` elements.
fn index(args: &[Val], idx: usize, len: usize, selector: &str) -> Completion<usize> {
    let i = int_arg(args, idx, selector)?;
    if i < 1 || i as usize > len {
        return Err(anyhow!("index {} out of bounds for {} of size {}", i, args[0].type_name(), len).into());
    }
    Ok(i as usize - 1)
}
