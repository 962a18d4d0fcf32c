use std::sync::Arc;

use crate::vm::bytecode::{Literal, LoopMarker, Opcode, Program, ScopeId, VarDescriptor, VarKind};

use super::CompileError;

/// Accumulates one program: instruction bytes, the literal pool and the
/// variable descriptors of its frame.
pub(crate) struct MethodBuilder {
    code: Vec<u8>,
    literals: Vec<Literal>,
    arguments: Vec<VarDescriptor>,
    locals: Vec<VarDescriptor>,
    loops: Vec<LoopMarker>,
    scope: ScopeId,
    depth: u8,
}

impl MethodBuilder {
    pub(crate) fn new(scope: ScopeId, depth: u8) -> Self {
        Self {
            code: Vec::new(),
            literals: Vec::new(),
            arguments: Vec::new(),
            locals: Vec::new(),
            loops: Vec::new(),
            scope,
            depth,
        }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn code(&self) -> &[u8] {
        &self.code
    }

    pub(crate) fn emit(&mut self, op: Opcode, operands: &[u8]) {
        debug_assert_eq!(op.len(), operands.len() + 1, "{} takes {} operand bytes", op.name(), op.len() - 1);
        self.code.push(op as u8);
        self.code.extend_from_slice(operands);
    }

    /// Index of `lit` in the pool, adding it if no equal literal is present.
    pub(crate) fn add_literal(&mut self, lit: Literal) -> Result<u8, CompileError> {
        if let Some(idx) = self.literals.iter().position(|l| l.same_as(&lit)) {
            return Ok(idx as u8);
        }
        if self.literals.len() > u8::MAX as usize {
            return Err(CompileError::Limit(format!("more than {} literals", u8::MAX as usize + 1)));
        }
        self.literals.push(lit);
        Ok((self.literals.len() - 1) as u8)
    }

    pub(crate) fn emit_literal(&mut self, op: Opcode, lit: Literal) -> Result<(), CompileError> {
        let idx = self.add_literal(lit)?;
        self.emit(op, &[idx]);
        Ok(())
    }

    fn declare(&mut self, name: &str, kind: VarKind) -> Result<u8, CompileError> {
        let list = match kind {
            VarKind::Argument => &mut self.arguments,
            VarKind::Local => &mut self.locals,
        };
        if list.len() > u8::MAX as usize {
            return Err(CompileError::Limit(format!("too many variables declaring '{name}'")));
        }
        let slot = list.len() as u8;
        list.push(VarDescriptor {
            name: Arc::from(name),
            kind,
            scope_depth: self.depth,
            slot,
            origin: self.scope,
        });
        Ok(slot)
    }

    pub(crate) fn add_argument(&mut self, name: &str) -> Result<u8, CompileError> {
        self.declare(name, VarKind::Argument)
    }

    pub(crate) fn add_local(&mut self, name: &str) -> Result<u8, CompileError> {
        self.declare(name, VarKind::Local)
    }

    /// Gives a variable of an inlined scope a local slot in this frame. A
    /// variable merged before keeps its slot.
    pub(crate) fn merge_local(&mut self, desc: &VarDescriptor) -> Result<u8, CompileError> {
        if let Some(existing) = self.locals.iter().find(|l| l.same_variable(desc)) {
            return Ok(existing.slot);
        }
        if self.locals.len() > u8::MAX as usize {
            return Err(CompileError::Limit(format!("too many locals merging '{}'", desc.name)));
        }
        let slot = self.locals.len() as u8;
        self.locals.push(VarDescriptor {
            name: desc.name.clone(),
            kind: VarKind::Local,
            scope_depth: self.depth,
            slot,
            origin: desc.origin,
        });
        Ok(slot)
    }

    /// Emits a forward jump with a placeholder offset; returns its position
    /// for [`Self::patch_jump_to`].
    pub(crate) fn emit_jump(&mut self, op: Opcode) -> usize {
        let at = self.position();
        let short = op.short_form().unwrap_or(op);
        self.emit(short, &[0, 0]);
        at
    }

    /// Points the jump at `at` to `target`, switching to the 2-byte form
    /// when the offset does not fit in one byte.
    pub(crate) fn patch_jump_to(&mut self, at: usize, target: usize) -> Result<(), CompileError> {
        let op = Opcode::from_byte(self.code[at])
            .filter(|op| op.is_jump() && !op.is_backward_jump())
            .ok_or_else(|| CompileError::inliner(format!("no forward jump to patch at {at}")))?;
        let offset = target
            .checked_sub(at)
            .ok_or_else(|| CompileError::inliner(format!("forward jump at {at} patched to earlier {target}")))?;
        if offset <= u8::MAX as usize {
            let short = op.short_form().unwrap_or(op);
            self.code[at] = short as u8;
            self.code[at + 1] = offset as u8;
            self.code[at + 2] = 0;
        } else if offset <= u16::MAX as usize {
            let long = op.long_form().unwrap_or(op);
            let [lo, hi] = (offset as u16).to_le_bytes();
            self.code[at] = long as u8;
            self.code[at + 1] = lo;
            self.code[at + 2] = hi;
        } else {
            return Err(CompileError::Limit(format!("jump of {offset} bytes")));
        }
        Ok(())
    }

    pub(crate) fn patch_jump_here(&mut self, at: usize) -> Result<(), CompileError> {
        let here = self.position();
        self.patch_jump_to(at, here)
    }

    /// Jumps back to `loop_begin` and records the loop.
    pub(crate) fn emit_backward_jump(&mut self, loop_begin: usize) -> Result<(), CompileError> {
        let at = self.position();
        let offset = at - loop_begin;
        if offset <= u8::MAX as usize {
            self.emit(Opcode::JumpBackwards, &[offset as u8, 0]);
        } else if offset <= u16::MAX as usize {
            let [lo, hi] = (offset as u16).to_le_bytes();
            self.emit(Opcode::Jump2Backwards, &[lo, hi]);
        } else {
            return Err(CompileError::Limit(format!("loop of {offset} bytes")));
        }
        self.loops.push(LoopMarker {
            loop_begin,
            backward_jump: at,
        });
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<Program, CompileError> {
        Program::new(self.code, self.literals, self.arguments, self.locals, self.loops)
    }
}
