//! Per-instruction specialization slots.
//!
//! The instruction tape is never rewritten. Instead every instruction offset
//! owns a slot that is empty until the instruction first executes; from then
//! on the interpreter runs the specialization stored there. An eager
//! specialization that later sees an input it cannot handle is replaced by a
//! generic send; nothing else is ever replaced.

use std::sync::{Arc, RwLock};

use crate::universe::{Class, GlobalCell};
use crate::util::sync;
use crate::val::Val;
use crate::val::num::{self, ArithOp, CmpOp};

use super::bytecode::Opcode;
use super::control::Completion;
use super::dispatch::DispatchChain;
use super::method::Invokable;
use super::vm::Vm;

/// Statically known implementations a send can be bound to without going
/// through a dispatch chain. Each one mirrors a primitive exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EagerOp {
    IntAdd,
    IntSub,
    IntMul,
    IntLt,
    IntLe,
    IntGt,
    IntGe,
    IntEq,
    IntNe,
    Identical,
    IsNil,
    NotNil,
    Not,
    BlockValue,
    BlockValue1,
    BlockValue2,
    IntToDo,
}

impl EagerOp {
    /// Runs the specialization. `None` means the operands are outside what it
    /// handles and the caller must fall back to a generic send.
    #[inline]
    pub(crate) fn execute(self, vm: &mut Vm, args: &[Val]) -> Option<Completion<Val>> {
        match self {
            EagerOp::IntAdd => arith(ArithOp::Add, args),
            EagerOp::IntSub => arith(ArithOp::Sub, args),
            EagerOp::IntMul => arith(ArithOp::Mul, args),
            EagerOp::IntLt => cmp(CmpOp::Lt, args),
            EagerOp::IntLe => cmp(CmpOp::Le, args),
            EagerOp::IntGt => cmp(CmpOp::Gt, args),
            EagerOp::IntGe => cmp(CmpOp::Ge, args),
            EagerOp::IntEq => cmp(CmpOp::Eq, args),
            EagerOp::IntNe => cmp(CmpOp::Ne, args),
            EagerOp::Identical => Some(Ok(Val::Bool(args[0].is_identical(&args[1])))),
            EagerOp::IsNil => Some(Ok(Val::Bool(args[0].is_nil()))),
            EagerOp::NotNil => Some(Ok(Val::Bool(!args[0].is_nil()))),
            EagerOp::Not => match args[0] {
                Val::Bool(b) => Some(Ok(Val::Bool(!b))),
                _ => None,
            },
            EagerOp::BlockValue | EagerOp::BlockValue1 | EagerOp::BlockValue2 => match &args[0] {
                Val::Block(b) if b.num_args() == args.len() - 1 => Some(vm.invoke_block(b, args[1..].to_vec())),
                _ => None,
            },
            EagerOp::IntToDo => match (&args[0], &args[1], &args[2]) {
                (Val::Int(start), Val::Int(limit), Val::Block(body)) if body.num_args() == 1 => {
                    Some(vm.to_do(*start, *limit, body).map(|_| args[0].clone()))
                }
                _ => None,
            },
        }
    }
}

#[inline]
fn arith(op: ArithOp, args: &[Val]) -> Option<Completion<Val>> {
    num::integer_binary(op, &args[0], &args[1]).map(|r| r.map_err(Into::into))
}

#[inline]
fn cmp(op: CmpOp, args: &[Val]) -> Option<Completion<Val>> {
    match (&args[0], &args[1]) {
        (Val::Int(_) | Val::BigInt(_), Val::Int(_) | Val::BigInt(_)) => {
            num::compare(op, &args[0], &args[1]).map(|b| Ok(Val::Bool(b)))
        }
        _ => None,
    }
}

/// An eager specialization bound at one send site. It stays valid while the
/// receiver has the class observed at quickening time and no method has been
/// installed since.
pub struct EagerSend {
    pub(crate) op: EagerOp,
    pub(crate) class: Arc<Class>,
    pub(crate) epoch: u64,
    pub(crate) arity: usize,
}

/// Statically bound super send.
pub struct SuperSend {
    pub(crate) target: Option<Invokable>,
    pub(crate) epoch: u64,
}

pub enum Specialization {
    /// `Q_PUSH_GLOBAL`: the resolved binding.
    Global(Arc<GlobalCell>),
    /// `Q_SEND`: a dispatch chain.
    Send(DispatchChain),
    Super(SuperSend),
    /// `Q_SEND_1`..`Q_SEND_3`, by the number of values the send consumes.
    Eager(EagerSend),
}

impl Specialization {
    pub fn opcode(&self) -> Opcode {
        match self {
            Specialization::Global(_) => Opcode::QPushGlobal,
            Specialization::Send(_) | Specialization::Super(_) => Opcode::QSend,
            Specialization::Eager(e) => match e.arity {
                0 => Opcode::QSend1,
                1 => Opcode::QSend2,
                _ => Opcode::QSend3,
            },
        }
    }

    pub fn chain(&self) -> Option<&DispatchChain> {
        match self {
            Specialization::Send(chain) => Some(chain),
            _ => None,
        }
    }

    pub fn eager_op(&self) -> Option<EagerOp> {
        match self {
            Specialization::Eager(e) => Some(e.op),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Specialization::Global(cell) => format!("-> {}", cell.name()),
            Specialization::Send(chain) if chain.is_megamorphic() => "megamorphic".to_string(),
            Specialization::Send(chain) => format!("chain depth {}", chain.depth()),
            Specialization::Super(s) => match &s.target {
                Some(t) => format!("super -> {:?}", t),
                None => "super -> not understood".to_string(),
            },
            Specialization::Eager(e) => format!("eager {:?} on {}", e.op, e.class.name()),
        }
    }
}

/// Side table of specialization slots, one per instruction offset.
pub struct QuickenTable {
    slots: Box<[RwLock<Option<Arc<Specialization>>>]>,
}

impl QuickenTable {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| RwLock::new(None)).collect(),
        }
    }

    #[inline]
    pub fn get(&self, ip: usize) -> Option<Arc<Specialization>> {
        self.slots.get(ip).and_then(|s| sync::read(s).clone())
    }

    /// Fills an empty slot. If another activation got there first its
    /// specialization wins and is returned.
    pub(crate) fn install(&self, ip: usize, spec: Specialization) -> Option<Arc<Specialization>> {
        let slot = self.slots.get(ip)?;
        let mut guard = sync::write(slot);
        if let Some(existing) = guard.as_ref() {
            return Some(existing.clone());
        }
        let spec = Arc::new(spec);
        *guard = Some(spec.clone());
        Some(spec)
    }

    /// Replaces the slot unconditionally. Used to fall back from an eager
    /// specialization and to rebind a stale super send.
    pub(crate) fn replace(&self, ip: usize, spec: Specialization) -> Option<Arc<Specialization>> {
        let slot = self.slots.get(ip)?;
        let spec = Arc::new(spec);
        *sync::write(slot) = Some(spec.clone());
        Some(spec)
    }

    pub fn quickened_count(&self) -> usize {
        self.slots.iter().filter(|s| sync::read(s).is_some()).count()
    }
}
