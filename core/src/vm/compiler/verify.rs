//! Static checks over an instruction tape, run before a program is built.
//!
//! The interpreter relies on the result: operand stack slots are sized from
//! the computed maximum depth and never bounds-checked, and operands that
//! address the frame itself (context level 0) are known to be in range.

use crate::vm::bytecode::{Literal, Opcode, jump_offset};

use super::CompileError;

/// Returns the maximum operand stack depth of `code`.
pub(crate) fn verify(
    code: &[u8],
    literals: &[Literal],
    num_args: usize,
    num_locals: usize,
) -> Result<usize, CompileError> {
    if code.is_empty() {
        return Err(CompileError::verify(0, "empty program"));
    }
    let starts = scan(code)?;
    for ip in 0..code.len() {
        if starts[ip] {
            check_operands(code, ip, literals, num_args, num_locals, &starts)?;
        }
    }
    max_depth(code, literals)
}

/// Instruction boundaries; rejects unknown and quickened opcodes and
/// truncated instructions.
fn scan(code: &[u8]) -> Result<Vec<bool>, CompileError> {
    let mut starts = vec![false; code.len()];
    let mut ip = 0;
    while ip < code.len() {
        let op = Opcode::from_byte(code[ip])
            .ok_or_else(|| CompileError::verify(ip, format!("unknown opcode {}", code[ip])))?;
        if op.is_quickened() {
            return Err(CompileError::verify(ip, format!("{} on the tape", op.name())));
        }
        if ip + op.len() > code.len() {
            return Err(CompileError::verify(ip, format!("truncated {}", op.name())));
        }
        starts[ip] = true;
        ip += op.len();
    }
    Ok(starts)
}

fn check_operands(
    code: &[u8],
    ip: usize,
    literals: &[Literal],
    num_args: usize,
    num_locals: usize,
    starts: &[bool],
) -> Result<(), CompileError> {
    let Some(op) = Opcode::from_byte(code[ip]) else {
        return Err(CompileError::verify(ip, "unknown opcode"));
    };
    let literal = |ip: usize| {
        literals
            .get(code[ip + 1] as usize)
            .ok_or_else(|| CompileError::verify(ip, format!("literal {} out of range", code[ip + 1])))
    };
    match op {
        Opcode::Send | Opcode::SuperSend => {
            if !matches!(literal(ip)?, Literal::Selector(_)) {
                return Err(CompileError::verify(ip, "send without a selector literal"));
            }
        }
        Opcode::PushGlobal => {
            if !matches!(literal(ip)?, Literal::Global(_)) {
                return Err(CompileError::verify(ip, "global read without a global literal"));
            }
        }
        Opcode::PushBlock | Opcode::PushBlockNoCtx => {
            if !matches!(literal(ip)?, Literal::Block(_)) {
                return Err(CompileError::verify(ip, "block push without a block literal"));
            }
        }
        Opcode::PushConstant => {
            if !matches!(literal(ip)?, Literal::Value(_) | Literal::Selector(_)) {
                return Err(CompileError::verify(ip, "constant push without a value literal"));
            }
        }
        Opcode::PushLocal | Opcode::PopLocal if code[ip + 2] == 0 => {
            if code[ip + 1] as usize >= num_locals {
                return Err(CompileError::verify(ip, format!("local {} of {}", code[ip + 1], num_locals)));
            }
        }
        Opcode::PushArgument | Opcode::PopArgument if code[ip + 2] == 0 => {
            if code[ip + 1] as usize >= num_args {
                return Err(CompileError::verify(ip, format!("argument {} of {}", code[ip + 1], num_args)));
            }
        }
        _ if op.is_jump() => {
            let offset = jump_offset(code, ip, op);
            let target = if op.is_backward_jump() {
                ip.checked_sub(offset)
            } else {
                Some(ip + offset).filter(|_| offset > 0)
            };
            match target {
                Some(t) if t < code.len() && starts[t] => {}
                _ => return Err(CompileError::verify(ip, format!("{} to a bad target", op.name()))),
            }
        }
        _ => {}
    }
    Ok(())
}

enum Flow {
    /// Continue with the next instruction.
    Next,
    /// Branch to a target as well as (unless `only`) falling through.
    Branch { target: usize, taken_depth: usize, only: bool },
    Stop,
}

/// Abstract interpretation of stack depths over the control-flow graph.
fn max_depth(code: &[u8], literals: &[Literal]) -> Result<usize, CompileError> {
    let mut depth_at: Vec<Option<usize>> = vec![None; code.len()];
    let mut work = vec![(0usize, 0usize)];
    let mut max = 0usize;

    while let Some((ip, depth)) = work.pop() {
        match depth_at[ip] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(CompileError::verify(ip, format!("stack depth {depth} joins {seen}")));
            }
            None => depth_at[ip] = Some(depth),
        }
        let op = Opcode::from_byte(code[ip]).ok_or_else(|| CompileError::verify(ip, "unknown opcode"))?;
        let (pops, pushes) = stack_effect(op, code, ip, literals)?;
        if depth < pops {
            return Err(CompileError::verify(ip, format!("{} underflows a stack of {depth}", op.name())));
        }
        let after = depth - pops + pushes;
        max = max.max(after).max(depth);

        let flow = match op {
            Opcode::Halt | Opcode::ReturnLocal | Opcode::ReturnNonLocal | Opcode::ReturnSelf => Flow::Stop,
            Opcode::Jump | Opcode::Jump2 => Flow::Branch {
                target: ip + jump_offset(code, ip, op),
                taken_depth: after,
                only: true,
            },
            Opcode::JumpBackwards | Opcode::Jump2Backwards => Flow::Branch {
                target: ip - jump_offset(code, ip, op),
                taken_depth: after,
                only: true,
            },
            Opcode::JumpOnTrueTopNil
            | Opcode::JumpOnFalseTopNil
            | Opcode::Jump2OnTrueTopNil
            | Opcode::Jump2OnFalseTopNil => {
                // taken: the condition is replaced by nil
                Flow::Branch {
                    target: ip + jump_offset(code, ip, op),
                    taken_depth: after + 1,
                    only: false,
                }
            }
            Opcode::JumpIfGreater | Opcode::Jump2IfGreater => Flow::Branch {
                target: ip + jump_offset(code, ip, op),
                taken_depth: depth - 2,
                only: false,
            },
            _ if op.is_jump() => Flow::Branch {
                target: ip + jump_offset(code, ip, op),
                taken_depth: after,
                only: false,
            },
            _ => Flow::Next,
        };

        let fall_through = match flow {
            Flow::Stop => false,
            Flow::Next => true,
            Flow::Branch { target, taken_depth, only } => {
                work.push((target, taken_depth));
                !only
            }
        };
        if fall_through {
            let next = ip + op.len();
            if next >= code.len() {
                return Err(CompileError::verify(ip, "execution falls off the end"));
            }
            work.push((next, after));
        }
    }
    Ok(max)
}

/// `(pops, pushes)` on the fall-through path.
fn stack_effect(op: Opcode, code: &[u8], ip: usize, literals: &[Literal]) -> Result<(usize, usize), CompileError> {
    Ok(match op {
        Opcode::Halt => (0, 0),
        Opcode::Dup => (1, 2),
        Opcode::DupSecond => (2, 3),
        Opcode::PushLocal
        | Opcode::PushArgument
        | Opcode::PushField
        | Opcode::PushBlock
        | Opcode::PushBlockNoCtx
        | Opcode::PushConstant
        | Opcode::PushGlobal
        | Opcode::PushSelf
        | Opcode::PushNil
        | Opcode::Push0
        | Opcode::Push1 => (0, 1),
        Opcode::Pop | Opcode::PopLocal | Opcode::PopArgument | Opcode::PopField => (1, 0),
        Opcode::Send | Opcode::SuperSend => {
            let arity = match literals.get(code[ip + 1] as usize) {
                Some(Literal::Selector(s)) => s.arity(),
                _ => return Err(CompileError::verify(ip, "send without a selector literal")),
            };
            (arity + 1, 1)
        }
        Opcode::ReturnLocal | Opcode::ReturnNonLocal => (1, 0),
        Opcode::ReturnSelf => (0, 0),
        Opcode::Inc | Opcode::Dec => (1, 1),
        Opcode::Jump | Opcode::Jump2 | Opcode::JumpBackwards | Opcode::Jump2Backwards => (0, 0),
        Opcode::JumpOnTrueTopNil
        | Opcode::JumpOnFalseTopNil
        | Opcode::JumpOnTruePop
        | Opcode::JumpOnFalsePop
        | Opcode::Jump2OnTrueTopNil
        | Opcode::Jump2OnFalseTopNil
        | Opcode::Jump2OnTruePop
        | Opcode::Jump2OnFalsePop => (1, 0),
        // falls through with both operands kept
        Opcode::JumpIfGreater | Opcode::Jump2IfGreater => (2, 2),
        Opcode::QPushGlobal | Opcode::QSend | Opcode::QSend1 | Opcode::QSend2 | Opcode::QSend3 => {
            return Err(CompileError::verify(ip, format!("{} on the tape", op.name())));
        }
    })
}
