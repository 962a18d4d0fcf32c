use super::*;

fn define_sum_to(vm: &mut Vm) -> Arc<CompiledMethod> {
    let object = object_class(vm);
    // sumTo: n  | s | s := 0. 1 to: n do: [:i | s := s + i]. ^s
    define(
        vm,
        &object,
        MethodDef::new(
            "sumTo:",
            &["n"],
            &["s"],
            vec![
                Expr::assign("s", Expr::int(0)),
                Expr::send(
                    Expr::int(1),
                    "to:do:",
                    vec![
                        Expr::var("n"),
                        Expr::block(
                            &["i"],
                            &[],
                            vec![Expr::assign("s", Expr::binary(Expr::var("s"), "+", Expr::var("i")))],
                        ),
                    ],
                ),
                Expr::ret(Expr::var("s")),
            ],
        ),
    )
}

#[test]
fn test_vm_inlined_loop_creates_no_closures() {
    let mut vm = new_vm();
    define_sum_to(&mut vm);
    vm.reset_stats();
    assert_eq!(
        vm.send("sumTo:", vec![Val::Nil, Val::Int(1_000_000)]).unwrap(),
        Val::Int(500_000_500_000)
    );
    assert_eq!(vm.stats().closures_created, 0);
    assert_eq!(vm.stats().frames_created, 1);
    assert_eq!(vm.stats().back_edges, 1_000_000);
}

#[test]
fn test_vm_inlined_and_closure_loops_agree() {
    let mut inlined = new_vm();
    let mut plain = new_vm_with(VmConfig {
        inline_blocks: false,
        ..VmConfig::default()
    });
    define_sum_to(&mut inlined);
    define_sum_to(&mut plain);
    for n in [0, 1, 10, 10_000] {
        assert_eq!(
            inlined.send("sumTo:", vec![Val::Nil, Val::Int(n)]).unwrap(),
            plain.send("sumTo:", vec![Val::Nil, Val::Int(n)]).unwrap(),
            "n = {n}"
        );
    }
    assert_eq!(inlined.stats().closures_created, 0);
    assert_eq!(plain.stats().closures_created, 4);
}

#[test]
fn test_vm_nested_block_in_inlined_block_reads_merged_variables() {
    for inline_blocks in [true, false] {
        let mut vm = new_vm_with(VmConfig {
            inline_blocks,
            ..VmConfig::default()
        });
        let object = object_class(&vm);
        // foo  | x | x := 5. ^(true ifTrue: [ | y | y := 3. [x + y] ]) value
        let inner = Expr::block(&[], &[], vec![Expr::binary(Expr::var("x"), "+", Expr::var("y"))]);
        let then = Expr::block(&[], &["y"], vec![Expr::assign("y", Expr::int(3)), inner]);
        define(
            &mut vm,
            &object,
            MethodDef::new(
                "foo",
                &[],
                &["x"],
                vec![
                    Expr::assign("x", Expr::int(5)),
                    Expr::ret(Expr::unary(Expr::send(Expr::bool(true), "ifTrue:", vec![then]), "value")),
                ],
            ),
        );
        assert_eq!(vm.send("foo", vec![Val::Nil]).unwrap(), Val::Int(8), "inline_blocks={inline_blocks}");
    }
}

#[test]
fn test_vm_inlined_block_locals_start_nil_each_pass() {
    for inline_blocks in [true, false] {
        let mut vm = new_vm_with(VmConfig {
            inline_blocks,
            ..VmConfig::default()
        });
        let object = object_class(&vm);
        // fresh  | count | count := 0.
        //   1 to: 3 do: [:i | | t | t isNil ifTrue: [count := count + 1]. t := i].
        //   ^count
        let body = Expr::block(
            &["i"],
            &["t"],
            vec![
                Expr::send(
                    Expr::unary(Expr::var("t"), "isNil"),
                    "ifTrue:",
                    vec![Expr::block(
                        &[],
                        &[],
                        vec![Expr::assign("count", Expr::binary(Expr::var("count"), "+", Expr::int(1)))],
                    )],
                ),
                Expr::assign("t", Expr::var("i")),
            ],
        );
        define(
            &mut vm,
            &object,
            MethodDef::new(
                "fresh",
                &[],
                &["count"],
                vec![
                    Expr::assign("count", Expr::int(0)),
                    Expr::send(Expr::int(1), "to:do:", vec![Expr::int(3), body]),
                    Expr::ret(Expr::var("count")),
                ],
            ),
        );
        assert_eq!(vm.send("fresh", vec![Val::Nil]).unwrap(), Val::Int(3), "inline_blocks={inline_blocks}");
    }
}

#[test]
fn test_vm_inlined_control_flow_answers_like_sends() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // branches: c  ^{c ifTrue: [1]. c ifFalse: [2]. 1 to: 0 do: [:i | i]. [false] whileTrue: [nil]}
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "branches:",
            &["c"],
            &["a"],
            vec![
                Expr::assign("a", Expr::send(Expr::global("Array"), "new:", vec![Expr::int(4)])),
                Expr::send(
                    Expr::var("a"),
                    "at:put:",
                    vec![
                        Expr::int(1),
                        Expr::send(Expr::var("c"), "ifTrue:", vec![Expr::block(&[], &[], vec![Expr::int(1)])]),
                    ],
                ),
                Expr::send(
                    Expr::var("a"),
                    "at:put:",
                    vec![
                        Expr::int(2),
                        Expr::send(Expr::var("c"), "ifFalse:", vec![Expr::block(&[], &[], vec![Expr::int(2)])]),
                    ],
                ),
                Expr::send(
                    Expr::var("a"),
                    "at:put:",
                    vec![
                        Expr::int(3),
                        Expr::send(
                            Expr::int(7),
                            "to:do:",
                            vec![Expr::int(0), Expr::block(&["i"], &[], vec![Expr::var("i")])],
                        ),
                    ],
                ),
                Expr::send(
                    Expr::var("a"),
                    "at:put:",
                    vec![
                        Expr::int(4),
                        Expr::send(
                            Expr::block(&[], &[], vec![Expr::bool(false)]),
                            "whileTrue:",
                            vec![Expr::block(&[], &[], vec![Expr::nil()])],
                        ),
                    ],
                ),
                Expr::ret(Expr::var("a")),
            ],
        ),
    );
    let render = |v: Val| v.to_string();
    assert_eq!(render(vm.send("branches:", vec![Val::Nil, Val::Bool(true)]).unwrap()), "#(1 nil 7 nil)");
    assert_eq!(render(vm.send("branches:", vec![Val::Nil, Val::Bool(false)]).unwrap()), "#(nil 2 7 nil)");
    assert_eq!(vm.stats().closures_created, 0);

    let err = vm.send("branches:", vec![Val::Nil, Val::Int(3)]).unwrap_err();
    assert!(format!("{err:#}").contains("non-boolean condition"), "{err:#}");
}
