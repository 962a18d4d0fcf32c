use std::sync::Arc;

use anyhow::anyhow;

use crate::symbol::Symbol;
use crate::val::{BlockValue, Val};
use crate::vm::{Completion, Vm};

/// Conditions a running program can observe. Delivered to the
/// [`ErrorHook`] together with the object they concern.
#[derive(Clone)]
pub enum Condition {
    /// No method for `selector` in the receiver's class chain.
    DoesNotUnderstand { selector: Symbol, arguments: Vec<Val> },
    /// `^value` was attempted from `block` after its home activation returned.
    EscapedBlock { block: Arc<BlockValue>, value: Val },
    /// A global was read before anything was stored under its name.
    UnknownGlobal { name: Symbol },
}

impl Condition {
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::DoesNotUnderstand { .. } => "doesNotUnderstand",
            Condition::EscapedBlock { .. } => "escapedBlock",
            Condition::UnknownGlobal { .. } => "unknownGlobal",
        }
    }

    /// Selector of the message the default hook delivers to the receiver.
    pub fn handler_selector(&self) -> Symbol {
        match self {
            Condition::DoesNotUnderstand { .. } => Symbol::intern("doesNotUnderstand:arguments:"),
            Condition::EscapedBlock { .. } => Symbol::intern("escapedBlock:"),
            Condition::UnknownGlobal { .. } => Symbol::intern("unknownGlobal:"),
        }
    }

    fn handler_arguments(&self) -> Vec<Val> {
        match self {
            Condition::DoesNotUnderstand { selector, arguments } => {
                vec![Val::Symbol(*selector), Val::new_array(arguments.clone())]
            }
            Condition::EscapedBlock { block, .. } => vec![Val::Block(block.clone())],
            Condition::UnknownGlobal { name } => vec![Val::Symbol(*name)],
        }
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::DoesNotUnderstand { selector, arguments } => {
                write!(f, "DoesNotUnderstand({selector:?}, {arguments:?})")
            }
            Condition::EscapedBlock { block, value } => {
                write!(f, "EscapedBlock({}, {value:?})", block.method().signature())
            }
            Condition::UnknownGlobal { name } => write!(f, "UnknownGlobal({name:?})"),
        }
    }
}

/// Error-reporting hook. Whatever it returns becomes the value of the
/// expression that raised the condition.
pub trait ErrorHook: Send + Sync {
    fn report(&self, vm: &mut Vm, receiver: Val, condition: Condition) -> Completion<Val>;
}

/// Delivers the condition as an ordinary message to the receiver when its
/// class understands the handler selector; fails with a host error otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHook;

impl ErrorHook for DefaultHook {
    fn report(&self, vm: &mut Vm, receiver: Val, condition: Condition) -> Completion<Val> {
        let handler = condition.handler_selector();
        let class = vm.classes().class_of(&receiver).clone();
        if let Some(target) = vm.classes().lookup(&class, handler) {
            let mut args = Vec::with_capacity(3);
            args.push(receiver);
            args.extend(condition.handler_arguments());
            return vm.invoke(&target, args);
        }
        let err = match condition {
            Condition::DoesNotUnderstand { selector, .. } => {
                anyhow!("{} does not understand #{}", class.name(), selector)
            }
            Condition::EscapedBlock { block, .. } => anyhow!(
                "block {} escaped: its home activation already returned (receiver {})",
                block.method().signature(),
                class.name()
            ),
            Condition::UnknownGlobal { name } => anyhow!("unknown global {}", name),
        };
        Err(err.into())
    }
}
