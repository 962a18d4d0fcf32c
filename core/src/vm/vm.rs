mod frame;
mod guards;
mod interpreter;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow, bail};

use crate::ast::{Expr, MethodDef};
use crate::symbol::Symbol;
use crate::universe::{self, Class, ClassTable, Condition, GlobalTable};
use crate::val::{BlockValue, Instance, Val};

use super::compiler::Compiler;
use super::config::VmConfig;
use super::context::{Output, VmContext};
use super::control::{Completion, Unwind};
use super::method::{CompiledMethod, Invokable};
use super::stats::VmStats;

pub use frame::{ActivationId, Frame, FrameMarker, FrameRef, MarkerState};
pub(crate) use frame::OperandStack;
use guards::OnStackGuard;

/// The interpreter. One `Vm` drives one thread of execution; the class
/// table and globals in its [`VmContext`] may be shared with other VMs.
pub struct Vm {
    ctx: VmContext,
    pub(crate) stats: VmStats,
    compiler: Compiler,
    depth: usize,
    next_activation: u64,
    started: Instant,
}

impl Vm {
    pub fn new() -> Result<Self> {
        Self::with_context(VmContext::default())
    }

    pub fn with_config(config: VmConfig) -> Result<Self> {
        Self::with_context(VmContext::new(config))
    }

    /// Builds a VM and installs the core library into the context's class
    /// table: primitives, compiled library methods and the class globals.
    pub fn with_context(ctx: VmContext) -> Result<Self> {
        let compiler = Compiler::new(ctx.config());
        let mut vm = Self {
            ctx,
            stats: VmStats::default(),
            compiler,
            depth: 0,
            next_activation: 0,
            started: Instant::now(),
        };
        universe::bootstrap(&mut vm)?;
        Ok(vm)
    }

    pub fn context(&self) -> &VmContext {
        &self.ctx
    }

    #[inline]
    pub fn classes(&self) -> &ClassTable {
        self.ctx.classes()
    }

    #[inline]
    pub fn globals(&self) -> &GlobalTable {
        self.ctx.globals()
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        self.ctx.config()
    }

    pub fn output(&self) -> &Output {
        self.ctx.output()
    }

    pub fn stats(&self) -> &VmStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = VmStats::default();
    }

    pub(crate) fn elapsed_micros(&self) -> i64 {
        self.started.elapsed().as_micros() as i64
    }

    pub fn compile_method(&self, holder: &Arc<Class>, def: &MethodDef) -> Result<Arc<CompiledMethod>> {
        Ok(self.compiler.compile_method(def, holder)?)
    }

    /// Compiles `def` and installs it in `holder`'s method table.
    pub fn define_method(&mut self, holder: &Arc<Class>, def: &MethodDef) -> Result<Arc<CompiledMethod>> {
        let method = self.compile_method(holder, def)?;
        self.classes().install(holder, Invokable::Method(method.clone()));
        Ok(method)
    }

    /// Creates a class and binds it to a global of the same name.
    pub fn define_class(&mut self, name: &str, superclass: &Arc<Class>, fields: &[&str]) -> Arc<Class> {
        let class = self.classes().define_class(name, superclass, fields);
        self.globals().write(class.name(), Val::Class(class.clone()));
        class
    }

    pub fn new_instance(&self, class: &Arc<Class>) -> Val {
        Val::Object(Arc::new(Instance::new(class)))
    }

    /// Sends `selector` to `args[0]` without a call-site cache.
    pub fn send(&mut self, selector: &str, args: Vec<Val>) -> Result<Val> {
        if args.is_empty() {
            bail!("send of #{} needs a receiver", selector);
        }
        self.send_uncached(Symbol::intern(selector), args)
            .map_err(Unwind::into_error)
    }

    /// Runs `method` with `args` (receiver first) as an outermost activation.
    pub fn run(&mut self, method: &Arc<CompiledMethod>, args: Vec<Val>) -> Result<Val> {
        self.invoke(&Invokable::Method(method.clone()), args)
            .map_err(Unwind::into_error)
    }

    /// Compiles the statements as a method of `Nil` and runs it with `nil`
    /// as receiver. Like any method it answers `self` unless it returns.
    pub fn eval(&mut self, body: Vec<Expr>) -> Result<Val> {
        let nil = self.classes().core().nil.clone();
        let method = self.compile_method(&nil, &MethodDef::new("doIt", &[], &[], body))?;
        self.run(&method, vec![Val::Nil])
    }

    /// Calls a method or primitive. `args[0]` is the receiver.
    pub fn invoke(&mut self, target: &Invokable, args: Vec<Val>) -> Completion<Val> {
        match target {
            Invokable::Primitive(p) => {
                if args.len() != p.arity() + 1 {
                    return Err(anyhow!(
                        "primitive #{} expects {} arguments, got {}",
                        p.selector(),
                        p.arity(),
                        args.len().saturating_sub(1)
                    )
                    .into());
                }
                (p.func)(self, &args)
            }
            Invokable::Method(m) => {
                if args.len() != m.num_args() {
                    return Err(anyhow!(
                        "#{} expects {} arguments, got {}",
                        m.signature(),
                        m.num_args() - 1,
                        args.len().saturating_sub(1)
                    )
                    .into());
                }
                self.activate(m, args, None)
            }
        }
    }

    /// Evaluates a closure with the given block arguments.
    pub fn invoke_block(&mut self, block: &Arc<BlockValue>, args: Vec<Val>) -> Completion<Val> {
        if block.num_args() != args.len() {
            return Err(anyhow!(
                "block expects {} arguments, got {}",
                block.num_args(),
                args.len()
            )
            .into());
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Val::Block(block.clone()));
        full.extend(args);
        self.activate(block.method(), full, block.context().cloned())
    }

    /// `aBlock value` for blocks, the object itself for anything else.
    pub(crate) fn value_of(&mut self, v: &Val) -> Completion<Val> {
        match v {
            Val::Block(b) => self.invoke_block(b, Vec::new()),
            other => Ok(other.clone()),
        }
    }

    pub(crate) fn to_do(&mut self, start: i64, limit: i64, body: &Arc<BlockValue>) -> Completion<()> {
        for i in start..=limit {
            self.invoke_block(body, vec![Val::Int(i)])?;
        }
        Ok(())
    }

    /// Runs a compiled body in a fresh frame. The frame's on-stack marker is
    /// flipped on every way out; a non-local return addressed to this
    /// activation ends here and becomes its result.
    fn activate(
        &mut self,
        method: &Arc<CompiledMethod>,
        args: Vec<Val>,
        context: Option<FrameRef>,
    ) -> Completion<Val> {
        if self.depth >= self.config().max_call_depth {
            return Err(anyhow!(
                "stack overflow: more than {} nested activations in #{}",
                self.config().max_call_depth,
                method.signature()
            )
            .into());
        }
        self.next_activation += 1;
        let frame = Frame::new(
            ActivationId(self.next_activation),
            args,
            method.program().locals_count(),
            context,
        );
        self.stats.frames_created += 1;
        self.depth += 1;
        let result = {
            let mut guard = OnStackGuard::enter(&frame);
            let (exit, result) = match self.execute(method, &frame) {
                Ok(v) => (MarkerState::ReturnedNormally, Ok(v)),
                Err(Unwind::NonLocalReturn { target, value }) if target == frame.id() => {
                    (MarkerState::ReturnedNormally, Ok(value))
                }
                Err(u @ Unwind::NonLocalReturn { .. }) => (MarkerState::UnwoundByNonLocalReturn, Err(u)),
                Err(u) => (MarkerState::Aborted, Err(u)),
            };
            guard.exit_as(exit);
            result
        };
        self.depth -= 1;
        result
    }

    /// Full lookup on every call; the megamorphic and host-entry path.
    pub(crate) fn send_uncached(&mut self, selector: Symbol, mut args: Vec<Val>) -> Completion<Val> {
        let class = self.classes().class_of(&args[0]).clone();
        match self.classes().lookup(&class, selector) {
            Some(target) => self.invoke(&target, args),
            None => {
                let receiver = args.remove(0);
                self.report(receiver, Condition::DoesNotUnderstand { selector, arguments: args })
            }
        }
    }

    /// Hands a condition to the error-reporting hook; its answer becomes the
    /// value of the expression that raised the condition.
    pub fn report(&mut self, receiver: Val, condition: Condition) -> Completion<Val> {
        if let Condition::DoesNotUnderstand { selector, .. } = &condition {
            self.stats.dnu_reports += 1;
            tracing::debug!(target: "sprig::vm::dispatch", selector = %selector, "does not understand");
        }
        let hook = self.ctx.hook().clone();
        hook.report(self, receiver, condition)
    }
}
