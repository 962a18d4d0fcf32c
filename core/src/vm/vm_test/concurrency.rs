use super::*;
use crate::vm::{DispatchChain, Frame, FrameRef};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_vm_shared_types_are_send_and_sync() {
    assert_send_sync::<Val>();
    assert_send_sync::<Frame>();
    assert_send_sync::<FrameRef>();
    assert_send_sync::<CompiledMethod>();
    assert_send_sync::<DispatchChain>();
    assert_send_sync::<VmContext>();
}

#[test]
fn test_vm_two_vms_share_one_context() {
    let ctx = VmContext::new(VmConfig {
        inline_cache_size: 4,
        ..VmConfig::default()
    })
    .with_output(Output::buffer());
    let mut vm = Vm::with_context(ctx.clone()).unwrap();
    let object = object_class(&vm);
    let site = define(
        &mut vm,
        &object,
        MethodDef::new("callKind:", &["x"], &[], vec![Expr::ret(Expr::unary(Expr::var("x"), "kind"))]),
    );
    let mut receivers = Vec::new();
    for i in 0..3 {
        let class = vm.define_class(&format!("Shape{i}"), &object, &[]);
        define(&mut vm, &class, MethodDef::new("kind", &[], &[], vec![Expr::ret(Expr::int(i))]));
        receivers.push(vm.new_instance(&class));
    }

    let epoch = vm.classes().epoch();
    std::thread::scope(|s| {
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let ctx = ctx.clone();
                let receivers = &receivers;
                s.spawn(move || {
                    let mut vm = Vm::with_context(ctx).unwrap();
                    let mut total = 0;
                    for round in 0..2_000 {
                        let i = round % receivers.len();
                        let answer = vm.send("callKind:", vec![Val::Nil, receivers[i].clone()]).unwrap();
                        assert_eq!(answer, Val::Int(i as i64));
                        total += 1;
                    }
                    total
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), 2_000);
        }
    });

    // a second VM on the same context installs nothing
    assert_eq!(vm.classes().epoch(), epoch);
    let ip = only_send_site(&site, "kind");
    let spec = spec_at(&site, ip);
    let chain = spec.chain().unwrap();
    assert_eq!(chain.depth(), 3);
    assert!(!chain.is_megamorphic());
}
