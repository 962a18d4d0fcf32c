use super::*;

fn install_make_block(vm: &mut Vm) {
    let object = object_class(vm);
    // makeBlock  ^[:x | ^x]
    define(
        vm,
        &object,
        MethodDef::new(
            "makeBlock",
            &[],
            &[],
            vec![Expr::ret(Expr::block(&["x"], &[], vec![Expr::ret(Expr::var("x"))]))],
        ),
    );
    // escape  | b | b := self makeBlock. ^b value: 5
    define(
        vm,
        &object,
        MethodDef::new(
            "escape",
            &[],
            &["b"],
            vec![
                Expr::assign("b", Expr::unary(Expr::this(), "makeBlock")),
                Expr::ret(Expr::send(Expr::var("b"), "value:", vec![Expr::int(5)])),
            ],
        ),
    );
}

#[test]
fn test_vm_escaped_block_reports_once() {
    let hook = Arc::new(RecordingHook::default());
    let mut vm = vm_with_hook(hook.clone());
    install_make_block(&mut vm);

    assert_eq!(vm.send("escape", vec![Val::Int(3)]).unwrap(), Val::Nil);
    assert_eq!(hook.kinds(), vec!["escapedBlock"]);
    {
        let seen = hook.seen.lock().unwrap();
        let (receiver, condition) = &seen[0];
        assert_eq!(receiver, "3");
        let Condition::EscapedBlock { value, .. } = condition else {
            panic!("unexpected {condition:?}");
        };
        assert_eq!(*value, Val::Int(5));
    }
    assert_eq!(vm.stats().escaped_blocks, 1);
    assert_eq!(vm.stats().non_local_returns, 0);
}

#[test]
fn test_vm_escaped_block_reported_to_sending_activation() {
    let hook = Arc::new(RecordingHook::default());
    let mut vm = vm_with_hook(hook.clone());
    install_make_block(&mut vm);
    let object = object_class(&vm);
    // callIt: b  ^b value: 5
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "callIt:",
            &["b"],
            &[],
            vec![Expr::ret(Expr::send(Expr::var("b"), "value:", vec![Expr::int(5)]))],
        ),
    );

    let block = vm.send("makeBlock", vec![Val::Int(3)]).unwrap();
    assert!(hook.kinds().is_empty());
    assert_eq!(vm.send("callIt:", vec![Val::Int(77), block]).unwrap(), Val::Nil);
    assert_eq!(hook.kinds(), vec!["escapedBlock"]);
    let seen = hook.seen.lock().unwrap();
    assert_eq!(seen[0].0, "77");
}

#[test]
fn test_vm_escaped_block_default_hook_sends_escaped_block() {
    let mut vm = new_vm();
    install_make_block(&mut vm);
    let err = vm.send("escape", vec![Val::Nil]).unwrap_err();
    assert!(err.to_string().contains("escaped"), "{err}");

    let object = object_class(&vm);
    define(
        &mut vm,
        &object,
        MethodDef::new("escapedBlock:", &["block"], &[], vec![Expr::ret(Expr::symbol("caught"))]),
    );
    assert_eq!(vm.send("escape", vec![Val::Nil]).unwrap(), sym("caught"));
}

/// `each: aBlock  1 to: 10 do: aBlock` and
/// `firstAbove: limit  self each: [:i | i > limit ifTrue: [^i]]. ^0`
fn install_first_above(vm: &mut Vm) {
    let object = object_class(vm);
    define(
        vm,
        &object,
        MethodDef::new(
            "each:",
            &["aBlock"],
            &[],
            vec![Expr::send(Expr::int(1), "to:do:", vec![Expr::int(10), Expr::var("aBlock")])],
        ),
    );
    define(
        vm,
        &object,
        MethodDef::new(
            "firstAbove:",
            &["limit"],
            &[],
            vec![
                Expr::send(
                    Expr::this(),
                    "each:",
                    vec![Expr::block(
                        &["i"],
                        &[],
                        vec![Expr::send(
                            Expr::binary(Expr::var("i"), ">", Expr::var("limit")),
                            "ifTrue:",
                            vec![Expr::block(&[], &[], vec![Expr::ret(Expr::var("i"))])],
                        )],
                    )],
                ),
                Expr::ret(Expr::int(0)),
            ],
        ),
    );
}

#[test]
fn test_vm_non_local_return_unwinds_to_home() {
    for inline_blocks in [true, false] {
        let mut vm = new_vm_with(VmConfig {
            inline_blocks,
            ..VmConfig::default()
        });
        install_first_above(&mut vm);
        assert_eq!(vm.send("firstAbove:", vec![Val::Nil, Val::Int(3)]).unwrap(), Val::Int(4));
        assert_eq!(vm.stats().non_local_returns, 1);
        assert_eq!(vm.send("firstAbove:", vec![Val::Nil, Val::Int(30)]).unwrap(), Val::Int(0));
        assert_eq!(vm.stats().non_local_returns, 1);
    }
}

#[test]
fn test_vm_frame_markers_record_how_activations_ended() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // keep: tag around: aBlock  | k | k := [k]. system global: tag put: k. ^aBlock value
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "keep:around:",
            &["tag", "aBlock"],
            &["k"],
            vec![
                Expr::assign("k", Expr::block(&[], &[], vec![Expr::var("k")])),
                Expr::send(Expr::global("system"), "global:put:", vec![Expr::var("tag"), Expr::var("k")]),
                Expr::ret(Expr::unary(Expr::var("aBlock"), "value")),
            ],
        ),
    );
    // outer  self keep: #unwound around: [^7]. ^0
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "outer",
            &[],
            &[],
            vec![
                Expr::send(
                    Expr::this(),
                    "keep:around:",
                    vec![Expr::symbol("unwound"), Expr::block(&[], &[], vec![Expr::ret(Expr::int(7))])],
                ),
                Expr::ret(Expr::int(0)),
            ],
        ),
    );
    assert_eq!(vm.send("outer", vec![Val::Nil]).unwrap(), Val::Int(7));
    assert_eq!(
        vm.send("keep:around:", vec![Val::Nil, sym("normal"), Val::Int(1)]).unwrap(),
        Val::Int(1)
    );

    let state_of = |vm: &Vm, tag: &str| {
        let Some(Val::Block(b)) = vm.globals().read(Symbol::intern(tag)) else {
            panic!("no block stored under {tag}");
        };
        b.context().expect("block with context").marker().state()
    };
    assert_eq!(state_of(&vm, "unwound"), MarkerState::UnwoundByNonLocalReturn);
    assert_eq!(state_of(&vm, "normal"), MarkerState::ReturnedNormally);
}

#[test]
fn test_vm_failed_activation_is_marked_aborted() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // boom  | k | k := [k]. system global: #aborted put: k. ^nil frob
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "boom",
            &[],
            &["k"],
            vec![
                Expr::assign("k", Expr::block(&[], &[], vec![Expr::var("k")])),
                Expr::send(Expr::global("system"), "global:put:", vec![Expr::symbol("aborted"), Expr::var("k")]),
                Expr::ret(Expr::unary(Expr::nil(), "frob")),
            ],
        ),
    );
    assert!(vm.send("boom", vec![Val::Nil]).is_err());
    let Some(Val::Block(b)) = vm.globals().read(Symbol::intern("aborted")) else {
        panic!("block not stored");
    };
    assert_eq!(b.context().unwrap().marker().state(), MarkerState::Aborted);
}

#[test]
fn test_vm_blocks_share_their_home_frame() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // counter  | n inc | n := 0. inc := [n := n + 1]. inc value. inc value. ^n
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "counter",
            &[],
            &["n", "inc"],
            vec![
                Expr::assign("n", Expr::int(0)),
                Expr::assign(
                    "inc",
                    Expr::block(&[], &[], vec![Expr::assign("n", Expr::binary(Expr::var("n"), "+", Expr::int(1)))]),
                ),
                Expr::unary(Expr::var("inc"), "value"),
                Expr::unary(Expr::var("inc"), "value"),
                Expr::ret(Expr::var("n")),
            ],
        ),
    );
    vm.reset_stats();
    assert_eq!(vm.send("counter", vec![Val::Nil]).unwrap(), Val::Int(2));
    assert_eq!(vm.stats().closures_created, 1);
}

#[test]
fn test_vm_restart_replays_while_loop() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // countTo: n  | i c b | i := 0. c := [i < n]. b := [i := i + 1]. c whileTrue: b. ^i
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "countTo:",
            &["n"],
            &["i", "c", "b"],
            vec![
                Expr::assign("i", Expr::int(0)),
                Expr::assign("c", Expr::block(&[], &[], vec![Expr::binary(Expr::var("i"), "<", Expr::var("n"))])),
                Expr::assign(
                    "b",
                    Expr::block(&[], &[], vec![Expr::assign("i", Expr::binary(Expr::var("i"), "+", Expr::int(1)))]),
                ),
                Expr::send(Expr::var("c"), "whileTrue:", vec![Expr::var("b")]),
                Expr::ret(Expr::var("i")),
            ],
        ),
    );
    assert_eq!(vm.send("countTo:", vec![Val::Nil, Val::Int(100)]).unwrap(), Val::Int(100));
    assert_eq!(vm.stats().restarts, 100);

    // countTo: and a single whileTrue: activation, plus 11 condition and
    // 10 body activations
    vm.reset_stats();
    vm.send("countTo:", vec![Val::Nil, Val::Int(10)]).unwrap();
    assert_eq!(vm.stats().restarts, 10);
    assert_eq!(vm.stats().frames_created, 23);
}
