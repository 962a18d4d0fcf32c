use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::symbol::Symbol;
use crate::val::Val;

use super::compiler::{CompileError, verify};
use super::method::CompiledMethod;
use super::quicken::QuickenTable;

/// Stack bytecode. Operand layout is fixed per opcode (see [`Opcode::len`]):
/// one byte for the opcode, then either a literal index / context level, or a
/// `(slot, context)` pair, or a jump offset.
///
/// Short jumps store an unsigned 1-byte offset in the first operand byte and
/// leave the second zero; the `JUMP2_*` forms store a little-endian `u16`.
/// Offsets are relative to the start of the jump instruction.
///
/// The `Q_*` opcodes never appear on the tape. They name the state of an
/// instruction whose specialization slot has been filled, see
/// [`QuickenTable`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Halt = 0,
    Dup = 1,
    DupSecond = 2,
    PushLocal = 3,    // slot, ctx
    PushArgument = 4, // slot, ctx
    PushField = 5,    // field, ctx
    PushBlock = 6,    // literal
    PushBlockNoCtx = 7,
    PushConstant = 8, // literal
    PushGlobal = 9,   // literal
    PushSelf = 10,
    PushNil = 11,
    Push0 = 12,
    Push1 = 13,
    Pop = 14,
    PopLocal = 15,    // slot, ctx
    PopArgument = 16, // slot, ctx
    PopField = 17,    // field, ctx
    Send = 18,        // literal
    SuperSend = 19,   // literal
    ReturnLocal = 20,
    ReturnNonLocal = 21, // ctx
    ReturnSelf = 22,
    Inc = 23,
    Dec = 24,
    Jump = 25,
    JumpOnTrueTopNil = 26,
    JumpOnFalseTopNil = 27,
    JumpOnTruePop = 28,
    JumpOnFalsePop = 29,
    JumpIfGreater = 30,
    JumpBackwards = 31,
    Jump2 = 32,
    Jump2OnTrueTopNil = 33,
    Jump2OnFalseTopNil = 34,
    Jump2OnTruePop = 35,
    Jump2OnFalsePop = 36,
    Jump2IfGreater = 37,
    Jump2Backwards = 38,
    QPushGlobal = 39,
    QSend = 40,
    QSend1 = 41,
    QSend2 = 42,
    QSend3 = 43,
}

const OPCODES: [Opcode; 44] = [
    Opcode::Halt,
    Opcode::Dup,
    Opcode::DupSecond,
    Opcode::PushLocal,
    Opcode::PushArgument,
    Opcode::PushField,
    Opcode::PushBlock,
    Opcode::PushBlockNoCtx,
    Opcode::PushConstant,
    Opcode::PushGlobal,
    Opcode::PushSelf,
    Opcode::PushNil,
    Opcode::Push0,
    Opcode::Push1,
    Opcode::Pop,
    Opcode::PopLocal,
    Opcode::PopArgument,
    Opcode::PopField,
    Opcode::Send,
    Opcode::SuperSend,
    Opcode::ReturnLocal,
    Opcode::ReturnNonLocal,
    Opcode::ReturnSelf,
    Opcode::Inc,
    Opcode::Dec,
    Opcode::Jump,
    Opcode::JumpOnTrueTopNil,
    Opcode::JumpOnFalseTopNil,
    Opcode::JumpOnTruePop,
    Opcode::JumpOnFalsePop,
    Opcode::JumpIfGreater,
    Opcode::JumpBackwards,
    Opcode::Jump2,
    Opcode::Jump2OnTrueTopNil,
    Opcode::Jump2OnFalseTopNil,
    Opcode::Jump2OnTruePop,
    Opcode::Jump2OnFalsePop,
    Opcode::Jump2IfGreater,
    Opcode::Jump2Backwards,
    Opcode::QPushGlobal,
    Opcode::QSend,
    Opcode::QSend1,
    Opcode::QSend2,
    Opcode::QSend3,
];

const LENGTHS: [u8; 44] = [
    1, 1, 1, 3, 3, 3, 2, 2, 2, 2, // HALT .. PUSH_GLOBAL
    1, 1, 1, 1, 1, 3, 3, 3, 2, 2, // PUSH_SELF .. SUPER_SEND
    1, 2, 1, 1, 1, 3, 3, 3, 3, 3, // RETURN_LOCAL .. JUMP_ON_FALSE_POP
    3, 3, 3, 3, 3, 3, 3, 3, 3, 2, // JUMP_IF_GREATER .. Q_PUSH_GLOBAL
    2, 2, 2, 2, // Q_SEND ..
];

const NAMES: [&str; 44] = [
    "HALT",
    "DUP",
    "DUP_SECOND",
    "PUSH_LOCAL",
    "PUSH_ARGUMENT",
    "PUSH_FIELD",
    "PUSH_BLOCK",
    "PUSH_BLOCK_NO_CTX",
    "PUSH_CONSTANT",
    "PUSH_GLOBAL",
    "PUSH_SELF",
    "PUSH_NIL",
    "PUSH_0",
    "PUSH_1",
    "POP",
    "POP_LOCAL",
    "POP_ARGUMENT",
    "POP_FIELD",
    "SEND",
    "SUPER_SEND",
    "RETURN_LOCAL",
    "RETURN_NON_LOCAL",
    "RETURN_SELF",
    "INC",
    "DEC",
    "JUMP",
    "JUMP_ON_TRUE_TOP_NIL",
    "JUMP_ON_FALSE_TOP_NIL",
    "JUMP_ON_TRUE_POP",
    "JUMP_ON_FALSE_POP",
    "JUMP_IF_GREATER",
    "JUMP_BACKWARDS",
    "JUMP2",
    "JUMP2_ON_TRUE_TOP_NIL",
    "JUMP2_ON_FALSE_TOP_NIL",
    "JUMP2_ON_TRUE_POP",
    "JUMP2_ON_FALSE_POP",
    "JUMP2_IF_GREATER",
    "JUMP2_BACKWARDS",
    "Q_PUSH_GLOBAL",
    "Q_SEND",
    "Q_SEND_1",
    "Q_SEND_2",
    "Q_SEND_3",
];

impl Opcode {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        OPCODES.get(byte as usize).copied()
    }

    /// Instruction length in bytes, operands included.
    #[inline]
    pub fn len(self) -> usize {
        LENGTHS[self as usize] as usize
    }

    pub fn name(self) -> &'static str {
        NAMES[self as usize]
    }

    pub fn is_quickened(self) -> bool {
        (self as u8) >= Opcode::QPushGlobal as u8
    }

    pub fn is_jump(self) -> bool {
        (Opcode::Jump as u8..=Opcode::Jump2Backwards as u8).contains(&(self as u8))
    }

    pub fn is_backward_jump(self) -> bool {
        matches!(self, Opcode::JumpBackwards | Opcode::Jump2Backwards)
    }

    pub fn is_long_jump(self) -> bool {
        (Opcode::Jump2 as u8..=Opcode::Jump2Backwards as u8).contains(&(self as u8))
    }

    /// The 2-byte-offset form of a short jump.
    pub fn long_form(self) -> Option<Opcode> {
        if self.is_jump() && !self.is_long_jump() {
            Opcode::from_byte(self as u8 + (Opcode::Jump2 as u8 - Opcode::Jump as u8))
        } else {
            None
        }
    }

    /// The 1-byte-offset form of a jump. Identity for short jumps.
    pub fn short_form(self) -> Option<Opcode> {
        if self.is_long_jump() {
            Opcode::from_byte(self as u8 - (Opcode::Jump2 as u8 - Opcode::Jump as u8))
        } else if self.is_jump() {
            Some(self)
        } else {
            None
        }
    }

    /// Opcodes that read or write a variable through a `(slot, ctx)` pair.
    pub fn has_context_operand(self) -> bool {
        matches!(
            self,
            Opcode::PushLocal
                | Opcode::PushArgument
                | Opcode::PushField
                | Opcode::PopLocal
                | Opcode::PopArgument
                | Opcode::PopField
        )
    }
}

/// Reads the jump offset of the jump instruction at `ip`.
#[inline]
pub fn jump_offset(code: &[u8], ip: usize, op: Opcode) -> usize {
    if op.is_long_jump() {
        u16::from_le_bytes([code[ip + 1], code[ip + 2]]) as usize
    } else {
        code[ip + 1] as usize
    }
}

/// A constant in a program's literal pool.
#[derive(Clone)]
pub enum Literal {
    Value(Val),
    Selector(Symbol),
    Global(Symbol),
    Block(Arc<CompiledMethod>),
}

impl Literal {
    pub fn same_as(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::Value(a), Literal::Value(b)) => {
                a.is_identical(b) || matches!((a, b), (Val::Str(x), Val::Str(y)) if x == y)
            }
            (Literal::Selector(a), Literal::Selector(b)) => a == b,
            (Literal::Global(a), Literal::Global(b)) => a == b,
            (Literal::Block(a), Literal::Block(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Value(v) => write!(f, "{v:?}"),
            Literal::Selector(s) => write!(f, "{s:?}"),
            Literal::Global(s) => write!(f, "global {s}"),
            Literal::Block(m) => write!(f, "block {}", m.signature()),
        }
    }
}

/// Identity of a lexical scope, stable across inlining so that a variable
/// merged into an outer method can be recognised again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

static NEXT_SCOPE: AtomicU32 = AtomicU32::new(1);

impl ScopeId {
    pub fn fresh() -> Self {
        ScopeId(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Argument,
    Local,
}

/// Local/argument descriptor produced by the compiler.
#[derive(Debug, Clone)]
pub struct VarDescriptor {
    pub name: Arc<str>,
    pub kind: VarKind,
    /// Lexical depth of the declaring scope (0 = method).
    pub scope_depth: u8,
    pub slot: u8,
    /// Scope the variable was originally declared in.
    pub origin: ScopeId,
}

impl VarDescriptor {
    /// Same declaration, regardless of the slot or kind it has in the frame
    /// it was merged into.
    pub fn same_variable(&self, other: &VarDescriptor) -> bool {
        self.origin == other.origin && self.name == other.name
    }
}

/// `(loop_start_index, backward_jump_index)` for a loop emitted into a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoopMarker {
    pub loop_begin: usize,
    pub backward_jump: usize,
}

/// Immutable instruction tape plus everything needed to execute it.
pub struct Program {
    code: Box<[u8]>,
    literals: Box<[Literal]>,
    arguments: Box<[VarDescriptor]>,
    locals: Box<[VarDescriptor]>,
    max_stack_depth: usize,
    loops: Box<[LoopMarker]>,
    quickened: QuickenTable,
}

impl Program {
    /// Verifies the tape and computes the operand stack bound.
    pub(crate) fn new(
        code: Vec<u8>,
        literals: Vec<Literal>,
        arguments: Vec<VarDescriptor>,
        locals: Vec<VarDescriptor>,
        loops: Vec<LoopMarker>,
    ) -> Result<Program, CompileError> {
        let max_stack_depth = verify::verify(&code, &literals, arguments.len(), locals.len())?;
        let quickened = QuickenTable::new(code.len());
        Ok(Program {
            code: code.into_boxed_slice(),
            literals: literals.into_boxed_slice(),
            arguments: arguments.into_boxed_slice(),
            locals: locals.into_boxed_slice(),
            max_stack_depth,
            loops: loops.into_boxed_slice(),
            quickened,
        })
    }

    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    #[inline]
    pub fn literal(&self, idx: u8) -> Option<&Literal> {
        self.literals.get(idx as usize)
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn arguments(&self) -> &[VarDescriptor] {
        &self.arguments
    }

    pub fn locals(&self) -> &[VarDescriptor] {
        &self.locals
    }

    pub fn locals_count(&self) -> usize {
        self.locals.len()
    }

    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    pub fn loops(&self) -> &[LoopMarker] {
        &self.loops
    }

    pub fn quickened(&self) -> &QuickenTable {
        &self.quickened
    }

    /// Effective opcode at `ip`: the quickened form once the slot is filled.
    pub fn opcode_at(&self, ip: usize) -> Option<Opcode> {
        let op = Opcode::from_byte(*self.code.get(ip)?)?;
        Some(self.quickened.get(ip).map(|s| s.opcode()).unwrap_or(op))
    }

    /// Start offsets of every instruction, in order.
    pub fn instruction_starts(&self) -> Vec<usize> {
        let mut starts = Vec::new();
        let mut ip = 0;
        while ip < self.code.len() {
            starts.push(ip);
            match Opcode::from_byte(self.code[ip]) {
                Some(op) => ip += op.len(),
                None => break,
            }
        }
        starts
    }

    /// Number of distinct variables this program reads or writes in an
    /// enclosing scope.
    pub fn captured_variable_count(&self) -> usize {
        let mut seen = Vec::new();
        for ip in self.instruction_starts() {
            let Some(op) = Opcode::from_byte(self.code[ip]) else { break };
            if op.has_context_operand() && self.code[ip + 2] > 0 {
                let kind = match op {
                    Opcode::PushLocal | Opcode::PopLocal => 0u8,
                    Opcode::PushArgument | Opcode::PopArgument => 1,
                    _ => 2,
                };
                let key = (kind, self.code[ip + 1], self.code[ip + 2]);
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
        }
        seen.len()
    }

    /// Whether executing this program needs the defining frame: any access
    /// to an enclosing scope, a non-local return, or a nested closure that
    /// captures.
    pub fn needs_context(&self) -> bool {
        self.instruction_starts().into_iter().any(|ip| match Opcode::from_byte(self.code[ip]) {
            Some(op) if op.has_context_operand() => self.code[ip + 2] > 0,
            Some(Opcode::ReturnNonLocal | Opcode::PushBlock) => true,
            _ => false,
        })
    }
}
