use super::*;

/// `callKind: x ^x kind` plus `K1..Kn`, each answering its index from `kind`.
fn polymorphic_setup(vm: &mut Vm, classes: usize) -> (Arc<CompiledMethod>, Vec<Val>) {
    let object = object_class(vm);
    let site = define(
        vm,
        &object,
        MethodDef::new("callKind:", &["x"], &[], vec![Expr::ret(Expr::unary(Expr::var("x"), "kind"))]),
    );
    let mut receivers = Vec::new();
    for i in 0..classes {
        let class = vm.define_class(&format!("K{i}"), &object, &[]);
        define(vm, &class, MethodDef::new("kind", &[], &[], vec![Expr::ret(Expr::int(i as i64))]));
        receivers.push(vm.new_instance(&class));
    }
    (site, receivers)
}

#[test]
fn test_vm_recursive_site_stays_monomorphic() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // fact: n  ^n <= 1 ifTrue: [1] ifFalse: [n * (self fact: n - 1)]
    let fact = define(
        &mut vm,
        &object,
        MethodDef::new(
            "fact:",
            &["n"],
            &[],
            vec![Expr::ret(Expr::send(
                Expr::binary(Expr::var("n"), "<=", Expr::int(1)),
                "ifTrue:ifFalse:",
                vec![
                    Expr::block(&[], &[], vec![Expr::int(1)]),
                    Expr::block(
                        &[],
                        &[],
                        vec![Expr::binary(
                            Expr::var("n"),
                            "*",
                            Expr::send(Expr::this(), "fact:", vec![Expr::binary(Expr::var("n"), "-", Expr::int(1))]),
                        )],
                    ),
                ],
            ))],
        ),
    );
    assert_eq!(vm.send("fact:", vec![Val::Nil, Val::Int(5)]).unwrap(), Val::Int(120));

    let site = only_send_site(&fact, "fact:");
    let spec = spec_at(&fact, site);
    let chain = spec.chain().expect("generic send");
    assert_eq!(chain.depth(), 1);
    assert!(!chain.is_megamorphic());
    assert_eq!(vm.stats().cache_misses, 1);
    assert_eq!(vm.stats().cache_hits, 3);
}

#[test]
fn test_vm_chain_grows_to_bound_then_goes_megamorphic() {
    let mut vm = new_vm_with(VmConfig {
        inline_cache_size: 4,
        ..VmConfig::default()
    });
    let (site, receivers) = polymorphic_setup(&mut vm, 6);
    let ip = only_send_site(&site, "kind");

    for (i, r) in receivers.iter().take(4).enumerate() {
        assert_eq!(vm.send("callKind:", vec![Val::Nil, r.clone()]).unwrap(), Val::Int(i as i64));
        let spec = spec_at(&site, ip);
        assert_eq!(spec.chain().unwrap().depth(), i + 1);
    }
    // already cached shapes hit without growing the chain
    vm.send("callKind:", vec![Val::Nil, receivers[0].clone()]).unwrap();
    assert_eq!(spec_at(&site, ip).chain().unwrap().depth(), 4);

    assert_eq!(vm.send("callKind:", vec![Val::Nil, receivers[4].clone()]).unwrap(), Val::Int(4));
    let spec = spec_at(&site, ip);
    assert!(spec.chain().unwrap().is_megamorphic());
    assert_eq!(spec.describe(), "megamorphic");

    // megamorphic is final and still dispatches correctly
    for (i, r) in receivers.iter().enumerate() {
        assert_eq!(vm.send("callKind:", vec![Val::Nil, r.clone()]).unwrap(), Val::Int(i as i64));
    }
    assert!(vm.stats().megamorphic_sends >= 7);
}

#[test]
fn test_vm_method_installation_invalidates_cached_entries() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    let nil_class = vm.classes().core().nil.clone();
    define(&mut vm, &object, MethodDef::new("greet", &[], &[], vec![Expr::ret(Expr::int(1))]));
    let site = define(
        &mut vm,
        &object,
        MethodDef::new("callGreet:", &["x"], &[], vec![Expr::ret(Expr::unary(Expr::var("x"), "greet"))]),
    );
    assert_eq!(vm.send("callGreet:", vec![Val::Nil, Val::Nil]).unwrap(), Val::Int(1));

    define(&mut vm, &nil_class, MethodDef::new("greet", &[], &[], vec![Expr::ret(Expr::int(2))]));
    assert_eq!(vm.send("callGreet:", vec![Val::Nil, Val::Nil]).unwrap(), Val::Int(2));

    // the stale entry is replaced where it sat
    let ip = only_send_site(&site, "greet");
    assert_eq!(spec_at(&site, ip).chain().unwrap().depth(), 1);
}

#[test]
fn test_vm_unrelated_definitions_do_not_grow_chain() {
    let mut vm = new_vm_with(VmConfig {
        inline_cache_size: 2,
        ..VmConfig::default()
    });
    let object = object_class(&vm);
    define(&mut vm, &object, MethodDef::new("foo", &[], &[], vec![Expr::ret(Expr::int(1))]));
    let site = define(
        &mut vm,
        &object,
        MethodDef::new("callFoo:", &["x"], &[], vec![Expr::ret(Expr::unary(Expr::var("x"), "foo"))]),
    );

    for i in 0..5 {
        assert_eq!(vm.send("callFoo:", vec![Val::Nil, Val::Nil]).unwrap(), Val::Int(1));
        let unrelated = vm.define_class(&format!("Unrelated{i}"), &object, &[]);
        define(&mut vm, &unrelated, MethodDef::new("foo", &[], &[], vec![Expr::ret(Expr::int(2))]));
    }
    assert_eq!(vm.send("callFoo:", vec![Val::Nil, Val::Nil]).unwrap(), Val::Int(1));

    let ip = only_send_site(&site, "foo");
    let spec = spec_at(&site, ip);
    let chain = spec.chain().unwrap();
    assert_eq!(chain.depth(), 1);
    assert!(!chain.is_megamorphic());
    assert_eq!(vm.stats().megamorphic_sends, 0);
}

#[test]
fn test_vm_layout_guard_migrates_old_instances() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    let point = vm.define_class("Point", &object, &["x"]);
    define(&mut vm, &point, MethodDef::new("x", &[], &[], vec![Expr::ret(Expr::var("x"))]));
    define(
        &mut vm,
        &point,
        MethodDef::new("x:", &["v"], &[], vec![Expr::assign("x", Expr::var("v"))]),
    );
    let site = define(
        &mut vm,
        &object,
        MethodDef::new("readX:", &["p"], &[], vec![Expr::ret(Expr::unary(Expr::var("p"), "x"))]),
    );

    let old = vm.new_instance(&point);
    vm.send("x:", vec![old.clone(), Val::Int(3)]).unwrap();

    vm.classes().add_field(&point, "y");
    let fresh = vm.new_instance(&point);
    vm.send("x:", vec![fresh.clone(), Val::Int(4)]).unwrap();

    assert_eq!(vm.send("readX:", vec![Val::Nil, fresh]).unwrap(), Val::Int(4));
    let ip = only_send_site(&site, "x");
    assert_eq!(spec_at(&site, ip).chain().unwrap().depth(), 1);

    // the old instance misses, migrates to the current layout and then
    // matches the existing entry
    let Val::Object(inst) = &old else { unreachable!() };
    assert!(!inst.has_layout(&point.layout()));
    assert_eq!(vm.send("readX:", vec![Val::Nil, old.clone()]).unwrap(), Val::Int(3));
    assert!(inst.has_layout(&point.layout()));
    assert_eq!(spec_at(&site, ip).chain().unwrap().depth(), 1);
}

#[test]
fn test_vm_does_not_understand_is_cached_and_reported() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "doesNotUnderstand:arguments:",
            &["selector", "args"],
            &[],
            vec![Expr::ret(Expr::var("selector"))],
        ),
    );
    let site = define(
        &mut vm,
        &object,
        MethodDef::new("tryFrob", &[], &[], vec![Expr::ret(Expr::unary(Expr::this(), "frob"))]),
    );
    for _ in 0..3 {
        assert_eq!(vm.send("tryFrob", vec![Val::Int(7)]).unwrap(), sym("frob"));
    }
    let ip = only_send_site(&site, "frob");
    assert_eq!(spec_at(&site, ip).chain().unwrap().depth(), 1);
    assert_eq!(vm.stats().dnu_reports, 3);
    assert_eq!(vm.stats().cache_misses, 1);

    assert_eq!(
        vm.send("frobnicate:", vec![Val::Nil, Val::Int(1)]).unwrap(),
        sym("frobnicate:")
    );
}

#[test]
fn test_vm_does_not_understand_without_handler_fails() {
    let mut vm = new_vm();
    let err = vm.send("frob", vec![Val::Int(1)]).unwrap_err();
    assert_eq!(err.to_string(), "Integer does not understand #frob");
}

#[test]
fn test_vm_super_send_rebinds_after_redefinition() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    let a = vm.define_class("A", &object, &[]);
    let b = vm.define_class("B", &a, &[]);
    define(&mut vm, &a, MethodDef::new("level", &[], &[], vec![Expr::ret(Expr::int(1))]));
    let method = define(
        &mut vm,
        &b,
        MethodDef::new(
            "level",
            &[],
            &[],
            vec![Expr::ret(Expr::binary(Expr::super_send("level", vec![]), "+", Expr::int(10)))],
        ),
    );
    let instance = vm.new_instance(&b);
    assert_eq!(vm.send("level", vec![instance.clone()]).unwrap(), Val::Int(11));

    define(&mut vm, &a, MethodDef::new("level", &[], &[], vec![Expr::ret(Expr::int(5))]));
    assert_eq!(vm.send("level", vec![instance]).unwrap(), Val::Int(15));

    let code = method.program().code();
    let ip = method
        .program()
        .instruction_starts()
        .into_iter()
        .find(|&ip| code[ip] == Opcode::SuperSend as u8)
        .unwrap();
    assert!(matches!(&*spec_at(&method, ip), Specialization::Super(_)));
}

#[test]
fn test_vm_call_depth_is_bounded() {
    let mut vm = new_vm_with(VmConfig {
        max_call_depth: 100,
        ..VmConfig::default()
    });
    let object = object_class(&vm);
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "down:",
            &["n"],
            &[],
            vec![Expr::ret(Expr::send(
                Expr::this(),
                "down:",
                vec![Expr::binary(Expr::var("n"), "+", Expr::int(1))],
            ))],
        ),
    );
    let err = vm.send("down:", vec![Val::Nil, Val::Int(0)]).unwrap_err();
    assert!(err.to_string().contains("stack overflow"), "{err}");
}
