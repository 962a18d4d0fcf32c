use std::fmt;
use std::sync::{Arc, Weak};

use crate::symbol::Symbol;
use crate::universe::Class;
use crate::val::Val;

use super::bytecode::Program;
use super::control::Completion;
use super::quicken::EagerOp;
use super::vm::Vm;

/// A method or block body compiled to bytecode.
pub struct CompiledMethod {
    signature: Symbol,
    holder: Option<Weak<Class>>,
    program: Program,
    /// Declared arguments plus the receiver (or the block itself).
    num_args: usize,
    is_block: bool,
}

impl CompiledMethod {
    pub(crate) fn new(
        signature: Symbol,
        holder: Option<&Arc<Class>>,
        program: Program,
        is_block: bool,
    ) -> Self {
        let num_args = program.arguments().len();
        Self {
            signature,
            holder: holder.map(Arc::downgrade),
            program,
            num_args,
            is_block,
        }
    }

    pub fn signature(&self) -> Symbol {
        self.signature
    }

    /// Class the method was compiled for; super sends start above it.
    pub fn holder(&self) -> Option<Arc<Class>> {
        self.holder.as_ref().and_then(Weak::upgrade)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn num_args(&self) -> usize {
        self.num_args
    }

    pub fn is_block(&self) -> bool {
        self.is_block
    }
}

impl fmt::Debug for CompiledMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMethod")
            .field("signature", &self.signature)
            .field("num_args", &self.num_args)
            .field("is_block", &self.is_block)
            .finish()
    }
}

/// Native implementation of a message. `args[0]` is the receiver; the
/// invoker guarantees `args.len() == arity + 1`.
pub type PrimitiveFn = fn(&mut Vm, &[Val]) -> Completion<Val>;

pub struct Primitive {
    pub(crate) selector: Symbol,
    pub(crate) func: PrimitiveFn,
    /// Eager specialization the quickener may substitute for a send that
    /// resolves to this primitive.
    pub(crate) eager: Option<EagerOp>,
}

impl Primitive {
    pub fn new(selector: &str, func: PrimitiveFn) -> Self {
        Self {
            selector: Symbol::intern(selector),
            func,
            eager: None,
        }
    }

    pub(crate) fn with_eager(mut self, op: EagerOp) -> Self {
        self.eager = Some(op);
        self
    }

    pub fn selector(&self) -> Symbol {
        self.selector
    }

    pub fn arity(&self) -> usize {
        self.selector.arity()
    }
}

/// Callable unit stored in method tables and dispatch chains.
#[derive(Clone)]
pub enum Invokable {
    Method(Arc<CompiledMethod>),
    Primitive(Arc<Primitive>),
}

impl Invokable {
    pub fn signature(&self) -> Symbol {
        match self {
            Invokable::Method(m) => m.signature(),
            Invokable::Primitive(p) => p.selector,
        }
    }

    /// Declared argument count, receiver excluded.
    pub fn arity(&self) -> usize {
        match self {
            Invokable::Method(m) => m.num_args().saturating_sub(1),
            Invokable::Primitive(p) => p.arity(),
        }
    }

    pub fn captured_variable_count(&self) -> usize {
        match self {
            Invokable::Method(m) => m.program().captured_variable_count(),
            Invokable::Primitive(_) => 0,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Invokable::Primitive(_))
    }

    pub(crate) fn eager(&self) -> Option<EagerOp> {
        match self {
            Invokable::Primitive(p) => p.eager,
            Invokable::Method(_) => None,
        }
    }

    pub fn ptr_eq(&self, other: &Invokable) -> bool {
        match (self, other) {
            (Invokable::Method(a), Invokable::Method(b)) => Arc::ptr_eq(a, b),
            (Invokable::Primitive(a), Invokable::Primitive(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Invokable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invokable::Method(m) => write!(f, "method {}", m.signature()),
            Invokable::Primitive(p) => write!(f, "primitive {}", p.selector),
        }
    }
}
