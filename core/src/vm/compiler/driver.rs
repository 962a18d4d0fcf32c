use std::sync::Arc;

use crate::ast::{BlockDef, Expr, Lit, MethodDef};
use crate::symbol::{Symbol, selector_arity};
use crate::universe::Class;
use crate::val::Val;
use crate::vm::bytecode::{Literal, Opcode};
use crate::vm::config::VmConfig;
use crate::vm::method::CompiledMethod;

use super::CompileError;
use super::inliner;
use super::scope::{Resolved, Scope, resolve};

/// Lowers method trees to bytecode. Literal blocks of the control-flow
/// messages are compiled as blocks and then spliced into the enclosing
/// program by the block inliner.
#[derive(Debug, Clone)]
pub struct Compiler {
    inline_blocks: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(&VmConfig::default())
    }
}

impl Compiler {
    pub fn new(config: &VmConfig) -> Self {
        Self {
            inline_blocks: config.inline_blocks,
        }
    }

    pub fn compile_method(&self, def: &MethodDef, holder: &Arc<Class>) -> Result<Arc<CompiledMethod>, CompileError> {
        if selector_arity(&def.selector) != def.params.len() {
            return Err(CompileError::Invalid(format!(
                "#{} takes {} arguments, {} declared",
                def.selector,
                selector_arity(&def.selector),
                def.params.len()
            )));
        }
        let mut unit = Unit {
            holder,
            selector: &def.selector,
            inline_blocks: self.inline_blocks,
            scopes: Vec::new(),
            blocks: 0,
        };
        unit.open_scope(false, "self", &def.params, &def.locals)?;
        let mut returned = false;
        for stmt in &def.body {
            unit.expr(stmt)?;
            if matches!(stmt, Expr::Return(_)) {
                returned = true;
                break;
            }
            unit.emit(Opcode::Pop, &[]);
        }
        if !returned {
            unit.emit(Opcode::ReturnSelf, &[]);
        }
        let scope = unit.close_scope()?;
        let program = scope.builder.finish()?;
        Ok(Arc::new(CompiledMethod::new(
            Symbol::intern(&def.selector),
            Some(holder),
            program,
            false,
        )))
    }
}

/// State of one method compilation.
pub(super) struct Unit<'a> {
    holder: &'a Arc<Class>,
    selector: &'a str,
    inline_blocks: bool,
    scopes: Vec<Scope>,
    blocks: usize,
}

impl Unit<'_> {
    fn scope(&mut self) -> Result<&mut Scope, CompileError> {
        self.scopes
            .last_mut()
            .ok_or_else(|| CompileError::Invalid("no open scope".to_string()))
    }

    pub(super) fn builder(&mut self) -> Result<&mut super::MethodBuilder, CompileError> {
        Ok(&mut self.scope()?.builder)
    }

    /// Level of the innermost scope counted from the method (0 = method).
    fn depth(&self) -> u8 {
        self.scopes.len().saturating_sub(1) as u8
    }

    fn open_scope(
        &mut self,
        is_block: bool,
        first: &str,
        params: &[String],
        locals: &[String],
    ) -> Result<(), CompileError> {
        if self.scopes.len() > u8::MAX as usize {
            return Err(CompileError::Limit("blocks nested too deeply".to_string()));
        }
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(first.to_string());
        args.extend(params.iter().cloned());
        let mut scope = Scope::new(is_block, self.scopes.len() as u8, args, locals.to_vec());
        for a in scope.args().to_vec() {
            scope.builder.add_argument(&a)?;
        }
        for l in scope.locals().to_vec() {
            scope.builder.add_local(&l)?;
        }
        self.scopes.push(scope);
        Ok(())
    }

    fn close_scope(&mut self) -> Result<Scope, CompileError> {
        self.scopes
            .pop()
            .ok_or_else(|| CompileError::Invalid("scope closed twice".to_string()))
    }

    pub(super) fn emit(&mut self, op: Opcode, operands: &[u8]) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.builder.emit(op, operands);
        }
    }

    fn emit_literal(&mut self, op: Opcode, lit: Literal) -> Result<(), CompileError> {
        self.builder()?.emit_literal(op, lit)
    }

    pub(super) fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit) => self.literal(lit),
            Expr::Var(name) => self.read(name),
            Expr::Assign(name, value) => {
                self.expr(value)?;
                self.emit(Opcode::Dup, &[]);
                self.write(name)
            }
            Expr::Send { receiver, selector, args } => {
                if self.inline_blocks && self.try_inline(receiver, selector, args)? {
                    return Ok(());
                }
                self.check_arity(selector, args.len())?;
                self.expr(receiver)?;
                for a in args {
                    self.expr(a)?;
                }
                self.emit_literal(Opcode::Send, Literal::Selector(Symbol::intern(selector)))
            }
            Expr::SuperSend { selector, args } => {
                self.check_arity(selector, args.len())?;
                self.read("self")?;
                for a in args {
                    self.expr(a)?;
                }
                self.emit_literal(Opcode::SuperSend, Literal::Selector(Symbol::intern(selector)))
            }
            Expr::Block(def) => self.push_block(def),
            Expr::Return(value) => {
                self.expr(value)?;
                let depth = self.depth();
                if depth == 0 {
                    self.emit(Opcode::ReturnLocal, &[]);
                } else {
                    self.emit(Opcode::ReturnNonLocal, &[depth]);
                }
                Ok(())
            }
        }
    }

    fn check_arity(&self, selector: &str, given: usize) -> Result<(), CompileError> {
        let expected = selector_arity(selector);
        if expected == given {
            Ok(())
        } else {
            Err(CompileError::Invalid(format!(
                "#{selector} sent with {given} arguments, takes {expected}"
            )))
        }
    }

    fn literal(&mut self, lit: &Lit) -> Result<(), CompileError> {
        let value = match lit {
            Lit::Nil => {
                self.emit(Opcode::PushNil, &[]);
                return Ok(());
            }
            Lit::Int(0) => {
                self.emit(Opcode::Push0, &[]);
                return Ok(());
            }
            Lit::Int(1) => {
                self.emit(Opcode::Push1, &[]);
                return Ok(());
            }
            Lit::Bool(b) => Val::Bool(*b),
            Lit::Int(i) => Val::Int(*i),
            Lit::Double(d) => Val::Double(*d),
            Lit::Str(s) => Val::from(s.as_str()),
            Lit::Symbol(s) => Val::Symbol(Symbol::intern(s)),
        };
        self.emit_literal(Opcode::PushConstant, Literal::Value(value))
    }

    fn read(&mut self, name: &str) -> Result<(), CompileError> {
        match resolve(&self.scopes, self.holder, name) {
            Resolved::SelfRef { level: 0 } => self.emit(Opcode::PushSelf, &[]),
            Resolved::SelfRef { level } => self.emit(Opcode::PushArgument, &[0, level]),
            Resolved::Argument { slot, level } => self.emit(Opcode::PushArgument, &[slot, level]),
            Resolved::Local { slot, level } => self.emit(Opcode::PushLocal, &[slot, level]),
            Resolved::Field { index, level } => self.emit(Opcode::PushField, &[index, level]),
            Resolved::Constant(Val::Nil) => self.emit(Opcode::PushNil, &[]),
            Resolved::Constant(v) => self.emit_literal(Opcode::PushConstant, Literal::Value(v))?,
            Resolved::Global(sym) => self.emit_literal(Opcode::PushGlobal, Literal::Global(sym))?,
        }
        Ok(())
    }

    fn write(&mut self, name: &str) -> Result<(), CompileError> {
        match resolve(&self.scopes, self.holder, name) {
            Resolved::Argument { slot, level } => self.emit(Opcode::PopArgument, &[slot, level]),
            Resolved::Local { slot, level } => self.emit(Opcode::PopLocal, &[slot, level]),
            Resolved::Field { index, level } => self.emit(Opcode::PopField, &[index, level]),
            Resolved::SelfRef { .. } | Resolved::Constant(_) => {
                return Err(CompileError::Invalid(format!("cannot assign to '{name}'")));
            }
            Resolved::Global(_) => {
                return Err(CompileError::Invalid(format!(
                    "assignment to undeclared variable '{name}' in #{}",
                    self.selector
                )));
            }
        }
        Ok(())
    }

    /// Compiles a block body into its own method.
    pub(super) fn compile_block(&mut self, def: &BlockDef) -> Result<Arc<CompiledMethod>, CompileError> {
        self.blocks += 1;
        let signature = Symbol::intern(&format!("{}[{}]", self.selector, self.blocks));
        self.open_scope(true, "$block", &def.params, &def.locals)?;
        let depth = self.depth();
        if def.body.is_empty() {
            self.emit(Opcode::PushNil, &[]);
        }
        let mut returned = false;
        for (i, stmt) in def.body.iter().enumerate() {
            self.expr(stmt)?;
            if matches!(stmt, Expr::Return(_)) {
                returned = true;
                break;
            }
            if i + 1 < def.body.len() {
                self.emit(Opcode::Pop, &[]);
            }
        }
        if !returned {
            self.emit(Opcode::ReturnLocal, &[]);
        }
        let scope = self.close_scope()?;
        debug_assert!(scope.is_block && depth > 0);
        let program = scope.builder.finish()?;
        Ok(Arc::new(CompiledMethod::new(signature, Some(self.holder), program, true)))
    }

    fn push_block(&mut self, def: &BlockDef) -> Result<(), CompileError> {
        let block = self.compile_block(def)?;
        let op = if block.program().needs_context() {
            Opcode::PushBlock
        } else {
            Opcode::PushBlockNoCtx
        };
        self.emit_literal(op, Literal::Block(block))
    }

    /// Compiles `def` and splices its bytecode into the current program.
    pub(super) fn inline_block(&mut self, def: &BlockDef) -> Result<(), CompileError> {
        let block = self.compile_block(def)?;
        inliner::inline_into(self.builder()?, &block)
    }

    /// Merges the loop variable of a `to:do:` body into the current frame
    /// before the body itself is inlined.
    pub(super) fn compile_loop_body(&mut self, def: &BlockDef) -> Result<(Arc<CompiledMethod>, u8), CompileError> {
        let block = self.compile_block(def)?;
        let var = block
            .program()
            .arguments()
            .get(1)
            .cloned()
            .ok_or_else(|| CompileError::inliner("loop body without an index argument"))?;
        let slot = self.builder()?.merge_local(&var)?;
        Ok((block, slot))
    }
}
