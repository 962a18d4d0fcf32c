use anyhow::{Context, Result};

use crate::ast::{Expr, MethodDef};
use crate::symbol::Symbol;
use crate::val::Val;
use crate::vm::Vm;

use super::primitives;

/// Installs the core library into the VM's class table and binds the class
/// globals. A context that is already bootstrapped is left alone, so VMs
/// sharing one context do not reinstall (and invalidate) each other's methods.
pub(crate) fn bootstrap(vm: &mut Vm) -> Result<()> {
    let block = vm.classes().core().block.clone();
    if block.local_method(Symbol::intern("whileTrue:")).is_some() {
        return Ok(());
    }
    primitives::install(vm.classes());

    for def in [while_loop("whileTrue:", "ifFalse:"), while_loop("whileFalse:", "ifTrue:")] {
        vm.define_method(&block, &def)
            .with_context(|| format!("compiling Block>>{}", def.selector))?;
    }

    for class in vm.classes().classes() {
        vm.globals().write(class.name(), Val::Class(class));
    }
    let system = vm.classes().core().system.clone();
    let instance = vm.new_instance(&system);
    vm.globals().write(Symbol::intern("system"), instance);

    tracing::debug!(
        target: "sprig::vm::dispatch",
        classes = vm.classes().classes().len(),
        epoch = vm.classes().epoch(),
        "core library installed"
    );
    Ok(())
}

/// `whileTrue: body` on blocks with a non-literal receiver or body:
///
/// ```text
/// (self value) ifFalse: [^nil].
/// body value.
/// self restart
/// ```
fn while_loop(selector: &str, exit: &str) -> MethodDef {
    MethodDef::new(
        selector,
        &["body"],
        &[],
        vec![
            Expr::send(
                Expr::unary(Expr::this(), "value"),
                exit,
                vec![Expr::block(&[], &[], vec![Expr::ret(Expr::nil())])],
            ),
            Expr::unary(Expr::var("body"), "value"),
            Expr::unary(Expr::this(), "restart"),
        ],
    )
}
