//! Control-flow messages compiled to jumps when their arguments are literal
//! blocks. Each form leaves exactly one value on the stack, like the send
//! it replaces.

use crate::ast::{BlockDef, Expr};
use crate::vm::bytecode::Opcode;

use super::CompileError;
use super::driver::Unit;
use super::inliner;

fn literal_block(expr: &Expr, params: usize) -> Option<&BlockDef> {
    match expr {
        Expr::Block(def) if def.params.len() == params => Some(def),
        _ => None,
    }
}

impl Unit<'_> {
    /// Emits `receiver selector args` inline. `Ok(false)` when the message
    /// or its arguments do not qualify; nothing has been emitted then.
    pub(super) fn try_inline(&mut self, receiver: &Expr, selector: &str, args: &[Expr]) -> Result<bool, CompileError> {
        match (selector, args) {
            ("ifTrue:", [body]) => match literal_block(body, 0) {
                Some(body) => self.if_then(receiver, Opcode::JumpOnFalseTopNil, body).map(|_| true),
                None => Ok(false),
            },
            ("ifFalse:", [body]) => match literal_block(body, 0) {
                Some(body) => self.if_then(receiver, Opcode::JumpOnTrueTopNil, body).map(|_| true),
                None => Ok(false),
            },
            ("ifTrue:ifFalse:", [then, other]) => match (literal_block(then, 0), literal_block(other, 0)) {
                (Some(then), Some(other)) => self.if_else(receiver, Opcode::JumpOnFalsePop, then, other).map(|_| true),
                _ => Ok(false),
            },
            ("ifFalse:ifTrue:", [then, other]) => match (literal_block(then, 0), literal_block(other, 0)) {
                (Some(then), Some(other)) => self.if_else(receiver, Opcode::JumpOnTruePop, then, other).map(|_| true),
                _ => Ok(false),
            },
            ("whileTrue:" | "whileFalse:", [body]) => match (literal_block(receiver, 0), literal_block(body, 0)) {
                (Some(cond), Some(body)) => {
                    let exit = if selector == "whileTrue:" { Opcode::JumpOnFalsePop } else { Opcode::JumpOnTruePop };
                    self.while_loop(cond, exit, body).map(|_| true)
                }
                _ => Ok(false),
            },
            ("to:do:", [limit, body]) => match literal_block(body, 1) {
                Some(body) => self.to_do(receiver, limit, body).map(|_| true),
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    /// `cond ifTrue: [body]`: `nil` when the branch is not taken.
    fn if_then(&mut self, cond: &Expr, skip: Opcode, body: &BlockDef) -> Result<(), CompileError> {
        self.expr(cond)?;
        let jump = self.builder()?.emit_jump(skip);
        self.inline_block(body)?;
        self.builder()?.patch_jump_here(jump)
    }

    fn if_else(&mut self, cond: &Expr, to_else: Opcode, then: &BlockDef, other: &BlockDef) -> Result<(), CompileError> {
        self.expr(cond)?;
        let else_jump = self.builder()?.emit_jump(to_else);
        self.inline_block(then)?;
        let end_jump = self.builder()?.emit_jump(Opcode::Jump);
        self.builder()?.patch_jump_here(else_jump)?;
        self.inline_block(other)?;
        self.builder()?.patch_jump_here(end_jump)
    }

    /// `[cond] whileTrue: [body]`, answering `nil`.
    fn while_loop(&mut self, cond: &BlockDef, exit: Opcode, body: &BlockDef) -> Result<(), CompileError> {
        let loop_begin = self.builder()?.position();
        self.inline_block(cond)?;
        let exit_jump = self.builder()?.emit_jump(exit);
        self.inline_block(body)?;
        self.emit(Opcode::Pop, &[]);
        self.builder()?.emit_backward_jump(loop_begin)?;
        self.builder()?.patch_jump_here(exit_jump)?;
        self.emit(Opcode::PushNil, &[]);
        Ok(())
    }

    /// `start to: limit do: [:i | body]`, answering `start`.
    ///
    /// Stack during the loop: `start limit i`. The exit test pops `limit`
    /// and `i`, leaving the result in place.
    fn to_do(&mut self, start: &Expr, limit: &Expr, body: &BlockDef) -> Result<(), CompileError> {
        self.expr(start)?;
        self.expr(limit)?;
        self.emit(Opcode::DupSecond, &[]);
        let (block, slot) = self.compile_loop_body(body)?;
        let loop_begin = self.builder()?.position();
        let exit_jump = self.builder()?.emit_jump(Opcode::JumpIfGreater);
        self.emit(Opcode::Dup, &[]);
        self.emit(Opcode::PopLocal, &[slot, 0]);
        inliner::inline_into(self.builder()?, &block)?;
        self.emit(Opcode::Pop, &[]);
        self.emit(Opcode::Inc, &[]);
        self.builder()?.emit_backward_jump(loop_begin)?;
        self.builder()?.patch_jump_here(exit_jump)
    }
}
