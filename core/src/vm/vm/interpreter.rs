use std::sync::Arc;

use anyhow::anyhow;

use crate::symbol::Symbol;
use crate::universe::Condition;
use crate::val::{BlockValue, Val, num};
use crate::vm::bytecode::{Literal, Opcode, Program, jump_offset};
use crate::vm::control::{Completion, Unwind};
use crate::vm::dispatch::DispatchChain;
use crate::vm::method::CompiledMethod;
use crate::vm::quicken::{EagerSend, Specialization, SuperSend};

use super::{Frame, FrameRef, OperandStack, Vm};

impl Vm {
    /// Runs `method` against `frame` and accounts the activation's back edges.
    pub(super) fn execute(&mut self, method: &Arc<CompiledMethod>, frame: &FrameRef) -> Completion<Val> {
        let mut back_edges = 0u64;
        let result = self.interpret(method, frame, &mut back_edges);
        if back_edges > 0 {
            self.stats.back_edges += back_edges;
            if back_edges >= self.config().back_edge_report_threshold {
                tracing::debug!(
                    target: "sprig::vm::osr",
                    method = %method.signature(),
                    back_edges,
                    "hot loop"
                );
            }
        }
        result
    }

    fn interpret(&mut self, method: &Arc<CompiledMethod>, frame: &FrameRef, back_edges: &mut u64) -> Completion<Val> {
        let program = method.program();
        let code = program.code();
        let mut stack = OperandStack::with_depth(program.max_stack_depth());
        let mut ip = 0usize;

        loop {
            let Some(&byte) = code.get(ip) else {
                return Err(anyhow!("execution ran off the end of #{}", method.signature()).into());
            };
            let op = Opcode::from_byte(byte)
                .ok_or_else(|| anyhow!("invalid opcode {} at {} in #{}", byte, ip, method.signature()))?;
            let mut next = ip + op.len();

            match op {
                Opcode::Halt => {
                    return Ok(if stack.depth() > 0 { stack.pop() } else { Val::Nil });
                }
                Opcode::Dup => {
                    let v = stack.top().clone();
                    stack.push(v);
                }
                Opcode::DupSecond => {
                    let v = stack.peek(1).clone();
                    stack.push(v);
                }
                Opcode::PushLocal => {
                    let v = frame.enclosing(code[ip + 2])?.local(code[ip + 1] as usize)?;
                    stack.push(v);
                }
                Opcode::PushArgument => {
                    let v = frame.enclosing(code[ip + 2])?.argument(code[ip + 1] as usize)?;
                    stack.push(v);
                }
                Opcode::PushField => {
                    let v = field_owner(frame.enclosing(code[ip + 2])?)?.field(code[ip + 1] as usize)?;
                    stack.push(v);
                }
                Opcode::PushBlock | Opcode::PushBlockNoCtx => {
                    let Some(Literal::Block(body)) = program.literal(code[ip + 1]) else {
                        let idx = code[ip + 1];
                        return Err(anyhow!("literal {idx} of #{} is not a block", method.signature()).into());
                    };
                    let context = (op == Opcode::PushBlock).then(|| frame.clone());
                    self.stats.closures_created += 1;
                    stack.push(Val::Block(Arc::new(BlockValue::new(body.clone(), context))));
                }
                Opcode::PushConstant => match program.literal(code[ip + 1]) {
                    Some(Literal::Value(v)) => stack.push(v.clone()),
                    Some(Literal::Selector(s)) => stack.push(Val::Symbol(*s)),
                    other => {
                        return Err(anyhow!("bad constant literal {:?} in #{}", other, method.signature()).into());
                    }
                },
                Opcode::PushGlobal => match self.push_global(program, ip, frame)? {
                    Some(v) => stack.push(v),
                    None => {
                        stack.clear();
                        next = 0;
                    }
                },
                Opcode::PushSelf => stack.push(frame.receiver()),
                Opcode::PushNil => stack.push(Val::Nil),
                Opcode::Push0 => stack.push(Val::Int(0)),
                Opcode::Push1 => stack.push(Val::Int(1)),
                Opcode::Pop => {
                    stack.pop();
                }
                Opcode::PopLocal => {
                    let v = stack.pop();
                    frame.enclosing(code[ip + 2])?.set_local(code[ip + 1] as usize, v)?;
                }
                Opcode::PopArgument => {
                    let v = stack.pop();
                    frame.enclosing(code[ip + 2])?.set_argument(code[ip + 1] as usize, v)?;
                }
                Opcode::PopField => {
                    let v = stack.pop();
                    field_owner(frame.enclosing(code[ip + 2])?)?.set_field(code[ip + 1] as usize, v)?;
                }
                Opcode::Send | Opcode::SuperSend => {
                    let selector = selector_literal(program, code[ip + 1])?;
                    let args = stack.pop_n(selector.arity() + 1);
                    self.stats.sends += 1;
                    let outcome = if op == Opcode::Send {
                        self.send_at(program, ip, selector, args)
                    } else {
                        self.super_send(method, ip, selector, args)
                    };
                    match self.complete_send(frame, outcome)? {
                        Some(v) => stack.push(v),
                        None => {
                            stack.clear();
                            next = 0;
                        }
                    }
                }
                Opcode::ReturnLocal => return Ok(stack.pop()),
                Opcode::ReturnNonLocal => {
                    let value = stack.pop();
                    return Err(self.non_local_return(frame, code[ip + 1], value));
                }
                Opcode::ReturnSelf => return Ok(frame.receiver()),
                Opcode::Inc | Opcode::Dec => {
                    let top = stack.top_mut();
                    let stepped = if op == Opcode::Inc { num::increment(top) } else { num::decrement(top) };
                    match stepped {
                        Some(v) => *top = v?,
                        None => {
                            let verb = if op == Opcode::Inc { "incremented" } else { "decremented" };
                            return Err(anyhow!("{} cannot be {verb}", top.type_name()).into());
                        }
                    }
                }
                Opcode::Jump | Opcode::Jump2 => next = ip + jump_offset(code, ip, op),
                Opcode::JumpOnTrueTopNil
                | Opcode::JumpOnFalseTopNil
                | Opcode::Jump2OnTrueTopNil
                | Opcode::Jump2OnFalseTopNil => {
                    let when = matches!(op, Opcode::JumpOnTrueTopNil | Opcode::Jump2OnTrueTopNil);
                    if condition(stack.top(), method)? == when {
                        *stack.top_mut() = Val::Nil;
                        next = ip + jump_offset(code, ip, op);
                    } else {
                        stack.pop();
                    }
                }
                Opcode::JumpOnTruePop | Opcode::JumpOnFalsePop | Opcode::Jump2OnTruePop | Opcode::Jump2OnFalsePop => {
                    let when = matches!(op, Opcode::JumpOnTruePop | Opcode::Jump2OnTruePop);
                    if condition(&stack.pop(), method)? == when {
                        next = ip + jump_offset(code, ip, op);
                    }
                }
                Opcode::JumpIfGreater | Opcode::Jump2IfGreater => {
                    let greater = num::compare(num::CmpOp::Gt, stack.top(), stack.peek(1)).ok_or_else(|| {
                        anyhow!(
                            "loop bounds must be numbers, got {} and {}",
                            stack.top().type_name(),
                            stack.peek(1).type_name()
                        )
                    })?;
                    if greater {
                        stack.drop_n(2);
                        next = ip + jump_offset(code, ip, op);
                    }
                }
                Opcode::JumpBackwards | Opcode::Jump2Backwards => {
                    *back_edges += 1;
                    next = ip - jump_offset(code, ip, op);
                }
                Opcode::QPushGlobal | Opcode::QSend | Opcode::QSend1 | Opcode::QSend2 | Opcode::QSend3 => {
                    return Err(
                        anyhow!("quickened opcode {} found on the tape of #{}", op.name(), method.signature()).into()
                    );
                }
            }
            ip = next;
        }
    }

    /// Resolves a send site through its specialization slot, quickening it on
    /// first execution.
    fn send_at(&mut self, program: &Program, ip: usize, selector: Symbol, args: Vec<Val>) -> Completion<Val> {
        let spec = match program.quickened().get(ip) {
            Some(spec) => spec,
            None => self.quicken_send(program, ip, selector, &args)?,
        };
        match &*spec {
            Specialization::Send(chain) => chain.dispatch(self, args),
            Specialization::Eager(eager) => {
                if eager.epoch == self.classes().epoch()
                    && Arc::ptr_eq(self.classes().class_of(&args[0]), &eager.class)
                {
                    if let Some(outcome) = eager.op.execute(self, &args) {
                        return outcome;
                    }
                }
                self.eager_miss(program, ip, selector, eager, args)
            }
            other => Err(anyhow!("send site {} holds a {} specialization", ip, other.opcode().name()).into()),
        }
    }

    fn quicken_send(
        &mut self,
        program: &Program,
        ip: usize,
        selector: Symbol,
        args: &[Val],
    ) -> Completion<Arc<Specialization>> {
        let spec = match self.eager_specialization(selector, args) {
            Some(eager) => Specialization::Eager(eager),
            None => Specialization::Send(DispatchChain::new(selector)),
        };
        tracing::trace!(
            target: "sprig::vm::quicken",
            ip,
            selector = %selector,
            kind = spec.opcode().name(),
            "quickened send"
        );
        self.stats.quickenings += 1;
        program
            .quickened()
            .install(ip, spec)
            .ok_or_else(|| anyhow!("no specialization slot at {}", ip).into())
    }

    /// The eager specialization for `selector` on this receiver, if lookup
    /// resolves to a primitive that has one.
    fn eager_specialization(&self, selector: Symbol, args: &[Val]) -> Option<EagerSend> {
        if !self.config().eager_specialization {
            return None;
        }
        let class = self.classes().class_of(&args[0]);
        let op = self.classes().lookup(class, selector)?.eager()?;
        Some(EagerSend {
            op,
            class: class.clone(),
            epoch: self.classes().epoch(),
            arity: selector.arity(),
        })
    }

    /// An eager site saw operands it does not handle: it becomes a generic
    /// send for good, and this call goes through the new dispatch chain.
    fn eager_miss(
        &mut self,
        program: &Program,
        ip: usize,
        selector: Symbol,
        eager: &EagerSend,
        args: Vec<Val>,
    ) -> Completion<Val> {
        self.stats.eager_misses += 1;
        tracing::debug!(
            target: "sprig::vm::quicken",
            ip,
            selector = %selector,
            kind = ?eager.op,
            receiver = args[0].type_name(),
            "eager specialization missed, falling back to dispatch chain"
        );
        let spec = program
            .quickened()
            .replace(ip, Specialization::Send(DispatchChain::new(selector)))
            .ok_or_else(|| anyhow!("no specialization slot at {}", ip))?;
        match spec.chain() {
            Some(chain) => chain.dispatch(self, args),
            None => self.send_uncached(selector, args),
        }
    }

    /// Super sends bind statically to the holder's superclass; the binding
    /// is redone when the method epoch moves.
    fn super_send(
        &mut self,
        method: &Arc<CompiledMethod>,
        ip: usize,
        selector: Symbol,
        mut args: Vec<Val>,
    ) -> Completion<Val> {
        let epoch = self.classes().epoch();
        let quickened = method.program().quickened();
        let bound = match quickened.get(ip).as_deref() {
            Some(Specialization::Super(s)) if s.epoch == epoch => Some(s.target.clone()),
            _ => None,
        };
        let target = match bound {
            Some(target) => target,
            None => {
                let holder = method
                    .holder()
                    .ok_or_else(|| anyhow!("super send of #{} outside of a class", selector))?;
                let target = holder.superclass().and_then(|s| self.classes().lookup(s, selector));
                self.stats.quickenings += 1;
                tracing::trace!(
                    target: "sprig::vm::quicken",
                    ip,
                    selector = %selector,
                    kind = "super",
                    "quickened send"
                );
                quickened.replace(
                    ip,
                    Specialization::Super(SuperSend {
                        target: target.clone(),
                        epoch,
                    }),
                );
                target
            }
        };
        match target {
            Some(target) => self.invoke(&target, args),
            None => {
                let receiver = args.remove(0);
                self.report(receiver, Condition::DoesNotUnderstand { selector, arguments: args })
            }
        }
    }

    /// Reads a global through its cell. `Ok(None)` asks for a restart.
    fn push_global(&mut self, program: &Program, ip: usize, frame: &Frame) -> Completion<Option<Val>> {
        let spec = match program.quickened().get(ip) {
            Some(spec) => spec,
            None => {
                let Some(Literal::Global(name)) = program.literal(program.code()[ip + 1]) else {
                    return Err(anyhow!("global literal expected at {}", ip).into());
                };
                let cell = self.globals().cell(*name);
                self.stats.quickenings += 1;
                tracing::trace!(target: "sprig::vm::quicken", ip, name = %name, "quickened global");
                program
                    .quickened()
                    .install(ip, Specialization::Global(cell))
                    .ok_or_else(|| anyhow!("no specialization slot at {}", ip))?
            }
        };
        let Specialization::Global(cell) = &*spec else {
            return Err(anyhow!("global site {} holds a {} specialization", ip, spec.opcode().name()).into());
        };
        match cell.get() {
            Some(v) => Ok(Some(v)),
            None => {
                let outcome = self.report(frame.home().receiver(), Condition::UnknownGlobal { name: cell.name() });
                self.complete_send(frame, outcome)
            }
        }
    }

    /// Settles the outcome of a send in the sending activation. `Ok(None)`
    /// means the activation restarts from its first instruction. An escaped
    /// block is reported to `self` of the activation that sent the message.
    fn complete_send(&mut self, frame: &Frame, outcome: Completion<Val>) -> Completion<Option<Val>> {
        match outcome {
            Ok(v) => Ok(Some(v)),
            Err(Unwind::Restart) => {
                self.stats.restarts += 1;
                tracing::trace!(target: "sprig::vm::nlr", "activation restarted");
                Ok(None)
            }
            Err(Unwind::EscapedBlock { block, value }) => {
                self.stats.escaped_blocks += 1;
                self.report(frame.home().receiver(), Condition::EscapedBlock { block, value })
                    .map(Some)
            }
            Err(other) => Err(other),
        }
    }

    /// `^value` from a block: unwind to the home activation if it is still
    /// running, otherwise the block has escaped.
    fn non_local_return(&mut self, frame: &Frame, level: u8, value: Val) -> Unwind {
        let target = match frame.enclosing(level) {
            Ok(target) => target,
            Err(e) => return e.into(),
        };
        if target.marker().is_on_stack() {
            self.stats.non_local_returns += 1;
            return Unwind::NonLocalReturn {
                target: target.id(),
                value,
            };
        }
        match frame.receiver() {
            Val::Block(block) => {
                tracing::debug!(
                    target: "sprig::vm::nlr",
                    block = %block.method().signature(),
                    home = ?target.id(),
                    state = ?target.marker().state(),
                    "escaped block"
                );
                Unwind::EscapedBlock { block, value }
            }
            other => anyhow!("non-local return from a {} activation", other.type_name()).into(),
        }
    }
}

#[inline]
fn selector_literal(program: &Program, idx: u8) -> anyhow::Result<Symbol> {
    match program.literal(idx) {
        Some(Literal::Selector(s)) => Ok(*s),
        other => Err(anyhow!("literal {} is not a selector: {:?}", idx, other)),
    }
}

fn field_owner(frame: &Frame) -> anyhow::Result<Arc<crate::val::Instance>> {
    match frame.receiver() {
        Val::Object(inst) => Ok(inst),
        other => Err(anyhow!("{} has no fields", other.type_name())),
    }
}

#[inline]
fn condition(v: &Val, method: &CompiledMethod) -> anyhow::Result<bool> {
    match v {
        Val::Bool(b) => Ok(*b),
        other => Err(anyhow!(
            "non-boolean condition ({}) in #{}",
            other.type_name(),
            method.signature()
        )),
    }
}
