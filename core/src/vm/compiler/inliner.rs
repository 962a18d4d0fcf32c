//! Block inliner and scope adapter.
//!
//! `inline_into` splices the bytecode of a compiled block into the program
//! being built for its enclosing scope. The block's own variables become
//! locals of the enclosing frame, references to outer scopes lose one context
//! level, and nested blocks are re-homed one level shallower by rewriting
//! their operands in place (instruction lengths never change).
//!
//! Jump targets are resolved while walking the block in order. Forward jumps
//! wait in a min-heap keyed by original target until the walk reaches that
//! target; loop heads and backward jumps come from the block's loop markers,
//! also consumed in ascending order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::util::{FastHashMap, fast_hash_map_new};
use crate::vm::bytecode::{Literal, Opcode, Program, jump_offset};
use crate::vm::method::CompiledMethod;

use super::{CompileError, MethodBuilder};

/// New local slots of the inlined block's variables, indexed by the slot the
/// variable had in the block. Argument 0 (the block itself) has none.
struct VarMap {
    args: Vec<Option<u8>>,
    locals: Vec<u8>,
}

impl VarMap {
    fn build(builder: &mut MethodBuilder, program: &Program) -> Result<Self, CompileError> {
        let mut args = vec![None];
        for desc in program.arguments().iter().skip(1) {
            args.push(Some(builder.merge_local(desc)?));
        }
        let mut locals = Vec::with_capacity(program.locals_count());
        for desc in program.locals() {
            locals.push(builder.merge_local(desc)?);
        }
        Ok(Self { args, locals })
    }

    fn argument(&self, slot: u8) -> Result<u8, CompileError> {
        match self.args.get(slot as usize) {
            Some(Some(mapped)) => Ok(*mapped),
            Some(None) => Err(CompileError::inliner("inlined block reads its own block receiver")),
            None => Err(CompileError::inliner(format!("argument slot {slot} out of range"))),
        }
    }

    fn local(&self, slot: u8) -> Result<u8, CompileError> {
        self.locals
            .get(slot as usize)
            .copied()
            .ok_or_else(|| CompileError::inliner(format!("local slot {slot} out of range")))
    }
}

pub(super) fn inline_into(builder: &mut MethodBuilder, block: &Arc<CompiledMethod>) -> Result<(), CompileError> {
    let program = block.program();
    let code = program.code();
    let vars = VarMap::build(builder, program)?;
    let start = builder.position();

    // a block activation starts with its locals nil; so must every pass
    // through the spliced code
    for &slot in &vars.locals {
        builder.emit(Opcode::PushNil, &[]);
        builder.emit(Opcode::PopLocal, &[slot, 0]);
    }

    // (original target, position of the emitted jump)
    let mut forward: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
    let mut loop_heads: BinaryHeap<Reverse<usize>> = program.loops().iter().map(|m| Reverse(m.loop_begin)).collect();
    // (original backward jump, original loop head)
    let mut back_jumps: BinaryHeap<Reverse<(usize, usize)>> = program
        .loops()
        .iter()
        .map(|m| Reverse((m.backward_jump, m.loop_begin)))
        .collect();
    let mut heads: FastHashMap<usize, usize> = fast_hash_map_new();

    let starts = program.instruction_starts();
    let last = starts.last().copied();
    for &ip in &starts {
        while let Some(&Reverse((target, at))) = forward.peek() {
            if target > ip {
                break;
            }
            if target < ip {
                return Err(CompileError::inliner(format!("jump target {target} is not an instruction start")));
            }
            forward.pop();
            builder.patch_jump_here(at)?;
        }
        while let Some(&Reverse(head)) = loop_heads.peek() {
            if head > ip {
                break;
            }
            if head < ip {
                return Err(CompileError::inliner(format!("loop head {head} is not an instruction start")));
            }
            loop_heads.pop();
            heads.insert(head, builder.position());
        }

        let op = Opcode::from_byte(code[ip]).ok_or_else(|| CompileError::inliner(format!("bad opcode at {ip}")))?;
        match op {
            Opcode::PushLocal | Opcode::PopLocal => {
                let (slot, ctx) = (code[ip + 1], code[ip + 2]);
                if ctx == 0 {
                    builder.emit(op, &[vars.local(slot)?, 0]);
                } else {
                    builder.emit(op, &[slot, ctx - 1]);
                }
            }
            Opcode::PushArgument | Opcode::PopArgument => {
                let (slot, ctx) = (code[ip + 1], code[ip + 2]);
                if ctx == 0 {
                    let as_local = if op == Opcode::PushArgument { Opcode::PushLocal } else { Opcode::PopLocal };
                    builder.emit(as_local, &[vars.argument(slot)?, 0]);
                } else {
                    builder.emit(op, &[slot, ctx - 1]);
                }
            }
            Opcode::PushField | Opcode::PopField => {
                let (index, ctx) = (code[ip + 1], code[ip + 2]);
                if ctx == 0 {
                    return Err(CompileError::inliner(format!("{} at block level", op.name())));
                }
                builder.emit(op, &[index, ctx - 1]);
            }
            Opcode::PushBlock => {
                let nested = block_literal(program, code[ip + 1])?;
                let adapted = adapt(nested, 1, &vars)?;
                builder.emit_literal(op, Literal::Block(adapted))?;
            }
            Opcode::PushBlockNoCtx | Opcode::PushConstant | Opcode::PushGlobal | Opcode::Send | Opcode::SuperSend => {
                let lit = program
                    .literal(code[ip + 1])
                    .cloned()
                    .ok_or_else(|| CompileError::inliner(format!("literal {} out of range", code[ip + 1])))?;
                builder.emit_literal(op, lit)?;
            }
            Opcode::ReturnLocal => {
                if Some(ip) != last {
                    return Err(CompileError::inliner(format!("block returns locally at {ip} before its end")));
                }
            }
            Opcode::ReturnNonLocal => {
                let ctx = code[ip + 1];
                match ctx {
                    0 => return Err(CompileError::inliner("non-local return without context level")),
                    1 => builder.emit(Opcode::ReturnLocal, &[]),
                    _ => builder.emit(Opcode::ReturnNonLocal, &[ctx - 1]),
                }
            }
            Opcode::PushSelf | Opcode::ReturnSelf => {
                return Err(CompileError::inliner(format!("{} inside a block", op.name())));
            }
            Opcode::JumpBackwards | Opcode::Jump2Backwards => {
                let Some(Reverse((jump_at, head))) = back_jumps.pop() else {
                    return Err(CompileError::inliner(format!("backward jump at {ip} has no loop marker")));
                };
                if jump_at != ip || ip - jump_offset(code, ip, op) != head {
                    return Err(CompileError::inliner(format!(
                        "backward jump at {ip} does not match loop marker ({head}, {jump_at})"
                    )));
                }
                let new_head = heads
                    .get(&head)
                    .copied()
                    .ok_or_else(|| CompileError::inliner(format!("loop head {head} was never emitted")))?;
                builder.emit_backward_jump(new_head)?;
            }
            _ if op.is_jump() => {
                let target = ip + jump_offset(code, ip, op);
                let at = builder.emit_jump(op);
                forward.push(Reverse((target, at)));
            }
            Opcode::QPushGlobal | Opcode::QSend | Opcode::QSend1 | Opcode::QSend2 | Opcode::QSend3 => {
                return Err(CompileError::inliner(format!("quickened opcode {} in compiled block", op.name())));
            }
            _ => builder.emit(op, &code[ip + 1..ip + op.len()]),
        }
    }

    // jumps to the end of the block land after the spliced code
    while let Some(Reverse((target, at))) = forward.pop() {
        if target != code.len() && Some(target) != last {
            return Err(CompileError::inliner(format!("jump to {target} was never patched")));
        }
        builder.patch_jump_here(at)?;
    }
    if let Some(Reverse((jump_at, _))) = back_jumps.pop() {
        return Err(CompileError::inliner(format!("loop marker for {jump_at} has no backward jump")));
    }
    if let Some(Reverse(head)) = loop_heads.pop() {
        return Err(CompileError::inliner(format!("loop head {head} past the end of the block")));
    }

    tracing::trace!(
        target: "sprig::compiler::inline",
        block = %block.signature(),
        from = code.len(),
        emitted = builder.position() - start,
        "inlined block"
    );
    Ok(())
}

fn block_literal(program: &Program, idx: u8) -> Result<&Arc<CompiledMethod>, CompileError> {
    match program.literal(idx) {
        Some(Literal::Block(m)) => Ok(m),
        _ => Err(CompileError::inliner(format!("literal {idx} is not a block"))),
    }
}

/// Re-homes a block nested in an inlined block. `removed` is the context
/// level, as seen from `method`, of the scope that disappeared; its
/// variables now live in the enclosing frame under `vars`.
fn adapt(method: &Arc<CompiledMethod>, removed: u8, vars: &VarMap) -> Result<Arc<CompiledMethod>, CompileError> {
    let program = method.program();
    let mut code = program.code().to_vec();
    let mut literals = program.literals().to_vec();

    for ip in program.instruction_starts() {
        let op = Opcode::from_byte(code[ip]).ok_or_else(|| CompileError::inliner(format!("bad opcode at {ip}")))?;
        if op.has_context_operand() {
            let (slot, ctx) = (code[ip + 1], code[ip + 2]);
            if ctx > removed {
                code[ip + 2] = ctx - 1;
            } else if ctx == removed {
                match op {
                    Opcode::PushLocal | Opcode::PopLocal => code[ip + 1] = vars.local(slot)?,
                    Opcode::PushArgument | Opcode::PopArgument => {
                        code[ip] = if op == Opcode::PushArgument { Opcode::PushLocal } else { Opcode::PopLocal } as u8;
                        code[ip + 1] = vars.argument(slot)?;
                    }
                    _ => return Err(CompileError::inliner(format!("{} addresses an inlined block scope", op.name()))),
                }
            }
            continue;
        }
        match op {
            Opcode::ReturnNonLocal => {
                let ctx = code[ip + 1];
                if ctx == removed {
                    return Err(CompileError::inliner("non-local return targets an inlined block"));
                }
                if ctx > removed {
                    code[ip + 1] = ctx - 1;
                }
            }
            Opcode::PushBlock => {
                let idx = code[ip + 1] as usize;
                let nested = block_literal(program, code[ip + 1])?;
                let adapted = adapt(nested, removed + 1, vars)?;
                if let Some(slot) = literals.get_mut(idx) {
                    *slot = Literal::Block(adapted);
                }
            }
            _ => {}
        }
    }

    let rebuilt = Program::new(
        code,
        literals,
        program.arguments().to_vec(),
        program.locals().to_vec(),
        program.loops().to_vec(),
    )?;
    let holder = method.holder();
    Ok(Arc::new(CompiledMethod::new(method.signature(), holder.as_ref(), rebuilt, true)))
}
