use super::*;

fn define_plus(vm: &mut Vm) -> Arc<CompiledMethod> {
    let object = object_class(vm);
    define(
        vm,
        &object,
        MethodDef::new(
            "plus:with:",
            &["a", "b"],
            &[],
            vec![Expr::ret(Expr::binary(Expr::var("a"), "+", Expr::var("b")))],
        ),
    )
}

fn plus(vm: &mut Vm, a: Val, b: Val) -> Val {
    vm.send("plus:with:", vec![Val::Nil, a, b]).unwrap()
}

#[test]
fn test_vm_send_quickens_to_eager_specialization() {
    let mut vm = new_vm();
    let method = define_plus(&mut vm);
    let ip = only_send_site(&method, "+");
    assert!(method.program().quickened().get(ip).is_none());

    assert_eq!(plus(&mut vm, Val::Int(2), Val::Int(3)), Val::Int(5));
    let spec = spec_at(&method, ip);
    assert_eq!(spec.opcode(), Opcode::QSend2);
    assert_eq!(spec.eager_op(), Some(crate::vm::EagerOp::IntAdd));
    assert_eq!(vm.stats().quickenings, 1);

    plus(&mut vm, Val::Int(4), Val::Int(5));
    assert_eq!(vm.stats().quickenings, 1, "a slot is quickened once");
    assert_eq!(vm.stats().eager_misses, 0);
}

#[test]
fn test_vm_quickened_site_keeps_its_tape_opcode() {
    let mut vm = new_vm();
    let method = define_plus(&mut vm);
    let ip = only_send_site(&method, "+");

    plus(&mut vm, Val::Int(2), Val::Int(3));
    assert_eq!(method.program().code()[ip], Opcode::Send as u8);
    assert_eq!(method.program().opcode_at(ip), Some(Opcode::QSend2));
    assert_eq!(only_send_site(&method, "+"), ip);
}

#[test]
fn test_vm_eager_miss_falls_back_to_generic_send() {
    let mut vm = new_vm();
    let method = define_plus(&mut vm);
    let ip = only_send_site(&method, "+");

    plus(&mut vm, Val::Int(1), Val::Int(1));
    assert_eq!(plus(&mut vm, Val::Double(1.5), Val::Int(2)), Val::Double(3.5));
    assert_eq!(vm.stats().eager_misses, 1);
    let spec = spec_at(&method, ip);
    assert_eq!(spec.opcode(), Opcode::QSend);
    assert_eq!(spec.chain().unwrap().depth(), 1);

    // the site stays generic
    assert_eq!(plus(&mut vm, Val::Int(1), Val::Int(2)), Val::Int(3));
    assert_eq!(vm.stats().eager_misses, 1);
    assert_eq!(spec_at(&method, ip).chain().unwrap().depth(), 2);
}

#[test]
fn test_vm_eager_miss_on_operand_type() {
    let mut vm = new_vm();
    let method = define_plus(&mut vm);
    let ip = only_send_site(&method, "+");

    plus(&mut vm, Val::Int(1), Val::Int(1));
    // same receiver class, operand the specialization does not handle
    assert_eq!(plus(&mut vm, Val::Int(1), Val::Double(0.25)), Val::Double(1.25));
    assert_eq!(vm.stats().eager_misses, 1);
    assert_eq!(spec_at(&method, ip).opcode(), Opcode::QSend);
}

#[test]
fn test_vm_eager_specialization_can_be_disabled() {
    let mut vm = new_vm_with(VmConfig {
        eager_specialization: false,
        ..VmConfig::default()
    });
    let method = define_plus(&mut vm);
    assert_eq!(plus(&mut vm, Val::Int(2), Val::Int(3)), Val::Int(5));
    let spec = spec_at(&method, only_send_site(&method, "+"));
    assert_eq!(spec.opcode(), Opcode::QSend);
    assert!(spec.eager_op().is_none());
}

#[test]
fn test_vm_tape_is_never_rewritten() {
    let mut vm = new_vm();
    let method = define_plus(&mut vm);
    let before = method.program().code().to_vec();
    let listing = disassemble(method.program());
    assert!(listing.contains("SEND"));
    assert!(!listing.contains("Q_SEND"));

    plus(&mut vm, Val::Int(2), Val::Int(3));
    assert_eq!(method.program().code(), &before[..]);
    let listing = disassemble(method.program());
    assert!(listing.contains("Q_SEND_2 eager IntAdd on Integer"), "{listing}");
    assert!(listing.starts_with("; args=3 locals=0 max_stack=2 loops=0"), "{listing}");
}

#[test]
fn test_vm_eager_entry_is_guarded_by_epoch() {
    let mut vm = new_vm();
    let method = define_plus(&mut vm);
    plus(&mut vm, Val::Int(2), Val::Int(3));

    // Integer>>+ redefined in the language; the eager entry must not hit
    let integer = vm.classes().core().integer.clone();
    define(
        &mut vm,
        &integer,
        MethodDef::new("+", &["other"], &[], vec![Expr::ret(Expr::int(42))]),
    );
    assert_eq!(plus(&mut vm, Val::Int(2), Val::Int(3)), Val::Int(42));
    assert_eq!(vm.stats().eager_misses, 1);
    assert_eq!(spec_at(&method, only_send_site(&method, "+")).opcode(), Opcode::QSend);
}

#[test]
fn test_vm_block_value_is_specialized() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // apply: b  ^b value: 20
    let method = define(
        &mut vm,
        &object,
        MethodDef::new(
            "apply:",
            &["b"],
            &[],
            vec![Expr::ret(Expr::send(Expr::var("b"), "value:", vec![Expr::int(20)]))],
        ),
    );
    // run  ^self apply: [:x | x + 1]
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "run",
            &[],
            &[],
            vec![Expr::ret(Expr::send(
                Expr::this(),
                "apply:",
                vec![Expr::block(&["x"], &[], vec![Expr::binary(Expr::var("x"), "+", Expr::int(1))])],
            ))],
        ),
    );
    assert_eq!(vm.send("run", vec![Val::Nil]).unwrap(), Val::Int(21));
    let spec = spec_at(&method, only_send_site(&method, "value:"));
    assert_eq!(spec.eager_op(), Some(crate::vm::EagerOp::BlockValue1));
    assert_eq!(spec.opcode(), Opcode::QSend2);
}
