use std::sync::Arc;

use crate::symbol::Symbol;
use crate::universe::Class;
use crate::val::Val;
use crate::vm::bytecode::ScopeId;

use super::MethodBuilder;

/// One lexical scope under compilation, with the builder of its program.
pub(super) struct Scope {
    pub(super) is_block: bool,
    /// Declared arguments; slot 0 is `self` in methods and the block itself
    /// in blocks.
    args: Vec<String>,
    locals: Vec<String>,
    pub(super) builder: MethodBuilder,
}

impl Scope {
    pub(super) fn new(is_block: bool, depth: u8, args: Vec<String>, locals: Vec<String>) -> Self {
        Self {
            is_block,
            args,
            locals,
            builder: MethodBuilder::new(ScopeId::fresh(), depth),
        }
    }

    pub(super) fn args(&self) -> &[String] {
        &self.args
    }

    pub(super) fn locals(&self) -> &[String] {
        &self.locals
    }
}

/// What a name denotes at the point of use. `level` counts scopes outwards
/// from the innermost one.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Resolved {
    SelfRef { level: u8 },
    Argument { slot: u8, level: u8 },
    Local { slot: u8, level: u8 },
    Field { index: u8, level: u8 },
    Constant(Val),
    Global(Symbol),
}

pub(super) fn resolve(scopes: &[Scope], holder: &Arc<Class>, name: &str) -> Resolved {
    let method_level = (scopes.len() - 1) as u8;
    match name {
        "self" | "super" => return Resolved::SelfRef { level: method_level },
        "nil" => return Resolved::Constant(Val::Nil),
        "true" => return Resolved::Constant(Val::Bool(true)),
        "false" => return Resolved::Constant(Val::Bool(false)),
        _ => {}
    }
    for (level, scope) in scopes.iter().rev().enumerate() {
        let level = level as u8;
        if let Some(slot) = scope.locals().iter().position(|l| l == name) {
            return Resolved::Local { slot: slot as u8, level };
        }
        // slot 0 is never named by the user
        if let Some(slot) = scope.args().iter().skip(1).position(|a| a == name) {
            return Resolved::Argument {
                slot: (slot + 1) as u8,
                level,
            };
        }
    }
    match holder.field_index(name) {
        Some(index) => Resolved::Field {
            index: index as u8,
            level: method_level,
        },
        None => Resolved::Global(Symbol::intern(name)),
    }
}
