pub(super) use std::sync::{Arc, Mutex};

pub(super) use crate::{
    ast::{Expr, MethodDef},
    symbol::Symbol,
    universe::{Class, Condition, ErrorHook},
    val::Val,
    vm::{
        CompiledMethod, Completion, Literal, MarkerState, Opcode, Output, Specialization, Vm, VmConfig, VmContext,
        disassemble,
    },
};

pub(super) fn new_vm() -> Vm {
    new_vm_with(VmConfig::default())
}

pub(super) fn new_vm_with(config: VmConfig) -> Vm {
    Vm::with_context(VmContext::new(config).with_output(Output::buffer())).unwrap()
}

pub(super) fn object_class(vm: &Vm) -> Arc<Class> {
    vm.classes().core().object.clone()
}

pub(super) fn define(vm: &mut Vm, class: &Arc<Class>, def: MethodDef) -> Arc<CompiledMethod> {
    vm.define_method(class, &def).unwrap()
}

pub(super) fn sym(s: &str) -> Val {
    Val::Symbol(Symbol::intern(s))
}

/// Offsets of the `SEND`s of `selector` in `method`, read from the tape so
/// sites already quickened still count.
pub(super) fn send_sites(method: &CompiledMethod, selector: &str) -> Vec<usize> {
    let program = method.program();
    program
        .instruction_starts()
        .into_iter()
        .filter(|&ip| {
            Opcode::from_byte(program.code()[ip]) == Some(Opcode::Send)
                && matches!(
                    program.literal(program.code()[ip + 1]),
                    Some(Literal::Selector(s)) if &*s.as_str() == selector
                )
        })
        .collect()
}

pub(super) fn only_send_site(method: &CompiledMethod, selector: &str) -> usize {
    let sites = send_sites(method, selector);
    assert_eq!(sites.len(), 1, "sends of #{selector}: {sites:?}");
    sites[0]
}

pub(super) fn spec_at(method: &CompiledMethod, ip: usize) -> Arc<Specialization> {
    method.program().quickened().get(ip).expect("instruction was quickened")
}

/// Records every condition and answers nil.
#[derive(Default)]
pub(super) struct RecordingHook {
    pub(super) seen: Mutex<Vec<(String, Condition)>>,
}

impl RecordingHook {
    pub(super) fn kinds(&self) -> Vec<&'static str> {
        self.seen.lock().unwrap().iter().map(|(_, c)| c.kind()).collect()
    }
}

impl ErrorHook for RecordingHook {
    fn report(&self, _vm: &mut Vm, receiver: Val, condition: Condition) -> Completion<Val> {
        self.seen.lock().unwrap().push((receiver.to_string(), condition));
        Ok(Val::Nil)
    }
}

pub(super) fn vm_with_hook(hook: Arc<RecordingHook>) -> Vm {
    let ctx = VmContext::default().with_output(Output::buffer()).with_hook(hook);
    Vm::with_context(ctx).unwrap()
}

mod arithmetic;
mod closures;
mod concurrency;
mod dispatch;
mod globals;
mod inlining;
mod quickening;
