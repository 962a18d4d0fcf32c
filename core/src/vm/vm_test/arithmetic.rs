use super::*;

fn define_add(vm: &mut Vm) -> Arc<CompiledMethod> {
    let object = object_class(vm);
    define(
        vm,
        &object,
        MethodDef::new(
            "add:to:",
            &["a", "b"],
            &[],
            vec![Expr::ret(Expr::binary(Expr::var("a"), "+", Expr::var("b")))],
        ),
    )
}

#[test]
fn test_vm_eager_add_promotes_on_overflow() {
    let mut vm = new_vm();
    let method = define_add(&mut vm);
    let site = only_send_site(&method, "+");

    let big = vm.send("add:to:", vec![Val::Nil, Val::Int(i64::MAX), Val::Int(1)]).unwrap();
    assert!(matches!(big, Val::BigInt(_)), "{big:?}");
    assert_eq!(big.to_string(), "9223372036854775808");

    // a big receiver is still an Integer: the eager path holds and reduces
    let back = vm.send("add:to:", vec![Val::Nil, big, Val::Int(-1)]).unwrap();
    assert_eq!(back, Val::Int(i64::MAX));
    assert_eq!(vm.stats().eager_misses, 0);
    assert_eq!(spec_at(&method, site).opcode(), Opcode::QSend2);
}

#[test]
fn test_vm_loop_index_crosses_into_big_integers() {
    for inline_blocks in [true, false] {
        let mut vm = new_vm_with(VmConfig {
            inline_blocks,
            ..VmConfig::default()
        });
        let object = object_class(&vm);
        // edge  | c | c := 0. (MAX - 2) to: MAX do: [:i | c := c + 1]. ^c
        define(
            &mut vm,
            &object,
            MethodDef::new(
                "edge",
                &[],
                &["c"],
                vec![
                    Expr::assign("c", Expr::int(0)),
                    Expr::send(
                        Expr::int(i64::MAX - 2),
                        "to:do:",
                        vec![
                            Expr::int(i64::MAX),
                            Expr::block(
                                &["i"],
                                &[],
                                vec![Expr::assign("c", Expr::binary(Expr::var("c"), "+", Expr::int(1)))],
                            ),
                        ],
                    ),
                    Expr::ret(Expr::var("c")),
                ],
            ),
        );
        assert_eq!(vm.send("edge", vec![Val::Nil]).unwrap(), Val::Int(3), "inline_blocks={inline_blocks}");
    }
}

#[test]
fn test_vm_mixed_arithmetic_widens_to_double() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // mix: a  ^(a * 2) + 0.5
    define(
        &mut vm,
        &object,
        MethodDef::new(
            "mix:",
            &["a"],
            &[],
            vec![Expr::ret(Expr::binary(
                Expr::binary(Expr::var("a"), "*", Expr::int(2)),
                "+",
                Expr::double(0.5),
            ))],
        ),
    );
    assert_eq!(vm.send("mix:", vec![Val::Nil, Val::Double(1.25)]).unwrap(), Val::Double(3.0));
    assert_eq!(vm.send("mix:", vec![Val::Nil, Val::Int(3)]).unwrap(), Val::Double(6.5));
    assert_eq!(vm.send("mix:", vec![Val::Nil, Val::Int(-1)]).unwrap(), Val::Double(-1.5));

    let err = vm.send("mix:", vec![Val::Nil, Val::from("x")]).unwrap_err();
    assert!(format!("{err:#}").contains("does not understand"), "{err:#}");
}

#[test]
fn test_vm_fields_are_read_and_written_in_place() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    let point = vm.define_class("Point", &object, &["x", "y"]);
    // x: ax y: ay  x := ax. y := ay
    define(
        &mut vm,
        &point,
        MethodDef::new(
            "x:y:",
            &["ax", "ay"],
            &[],
            vec![Expr::assign("x", Expr::var("ax")), Expr::assign("y", Expr::var("ay"))],
        ),
    );
    define(&mut vm, &point, MethodDef::new("x", &[], &[], vec![Expr::ret(Expr::var("x"))]));
    define(&mut vm, &point, MethodDef::new("y", &[], &[], vec![Expr::ret(Expr::var("y"))]));
    // dot: p  ^(x * p x) + (y * p y)
    define(
        &mut vm,
        &point,
        MethodDef::new(
            "dot:",
            &["p"],
            &[],
            vec![Expr::ret(Expr::binary(
                Expr::binary(Expr::var("x"), "*", Expr::unary(Expr::var("p"), "x")),
                "+",
                Expr::binary(Expr::var("y"), "*", Expr::unary(Expr::var("p"), "y")),
            ))],
        ),
    );

    let make = |x: i64, y: i64| {
        Expr::send(Expr::unary(Expr::global("Point"), "new"), "x:y:", vec![Expr::int(x), Expr::int(y)])
    };
    let result = vm
        .eval(vec![Expr::ret(Expr::send(make(3, 4), "dot:", vec![make(1, 2)]))])
        .unwrap();
    assert_eq!(result, Val::Int(11));

    // a fresh instance starts with nil fields
    let fresh = vm.new_instance(&point);
    assert_eq!(vm.send("x", vec![fresh]).unwrap(), Val::Nil);
}
