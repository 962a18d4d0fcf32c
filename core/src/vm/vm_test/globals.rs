use super::*;

fn global_site(method: &CompiledMethod) -> usize {
    let program = method.program();
    let sites: Vec<usize> = program
        .instruction_starts()
        .into_iter()
        .filter(|&ip| Opcode::from_byte(program.code()[ip]) == Some(Opcode::PushGlobal))
        .collect();
    assert_eq!(sites.len(), 1, "global reads: {sites:?}");
    sites[0]
}

fn define_peek(vm: &mut Vm) -> Arc<CompiledMethod> {
    let object = object_class(vm);
    define(vm, &object, MethodDef::new("peek", &[], &[], vec![Expr::ret(Expr::global("Missing"))]))
}

#[test]
fn test_vm_unknown_global_is_reported() {
    let hook = Arc::new(RecordingHook::default());
    let mut vm = vm_with_hook(hook.clone());
    define_peek(&mut vm);

    assert_eq!(vm.send("peek", vec![Val::Int(4)]).unwrap(), Val::Nil);
    assert_eq!(hook.kinds(), vec!["unknownGlobal"]);
    let seen = hook.seen.lock().unwrap();
    assert_eq!(seen[0].0, "4");
    assert!(matches!(&seen[0].1, Condition::UnknownGlobal { name } if *name == Symbol::intern("Missing")));
}

#[test]
fn test_vm_quickened_global_sees_later_writes() {
    let hook = Arc::new(RecordingHook::default());
    let mut vm = vm_with_hook(hook.clone());
    let method = define_peek(&mut vm);
    let site = global_site(&method);

    vm.send("peek", vec![Val::Nil]).unwrap();
    assert!(matches!(
        &*spec_at(&method, site),
        Specialization::Global(cell) if cell.name() == Symbol::intern("Missing")
    ));
    assert_eq!(vm.stats().quickenings, 1);

    vm.globals().write(Symbol::intern("Missing"), Val::Int(7));
    assert_eq!(vm.send("peek", vec![Val::Nil]).unwrap(), Val::Int(7));
    vm.globals().write(Symbol::intern("Missing"), Val::from("later"));
    assert_eq!(vm.send("peek", vec![Val::Nil]).unwrap(), Val::from("later"));

    assert_eq!(hook.kinds().len(), 1);
    assert_eq!(vm.stats().quickenings, 1);
}

#[test]
fn test_vm_unknown_global_handler_answers_for_the_read() {
    let mut vm = new_vm();
    let object = object_class(&vm);
    // unknownGlobal: name  ^name
    define(
        &mut vm,
        &object,
        MethodDef::new("unknownGlobal:", &["name"], &[], vec![Expr::ret(Expr::var("name"))]),
    );
    define_peek(&mut vm);
    assert_eq!(vm.send("peek", vec![Val::Nil]).unwrap(), sym("Missing"));
}

#[test]
fn test_vm_unknown_global_without_handler_fails() {
    let mut vm = new_vm();
    define_peek(&mut vm);
    let err = vm.send("peek", vec![Val::Nil]).unwrap_err();
    assert_eq!(format!("{err:#}"), "unknown global Missing");
}

#[test]
fn test_vm_globals_written_by_the_program() {
    let mut vm = new_vm();
    // system global: #Counter put: 5. ^Counter + (system global: #Counter)
    let result = vm
        .eval(vec![
            Expr::send(Expr::global("system"), "global:put:", vec![Expr::symbol("Counter"), Expr::int(5)]),
            Expr::ret(Expr::binary(
                Expr::global("Counter"),
                "+",
                Expr::send(Expr::global("system"), "global:", vec![Expr::symbol("Counter")]),
            )),
        ])
        .unwrap();
    assert_eq!(result, Val::Int(10));
    assert_eq!(vm.globals().read(Symbol::intern("Counter")), Some(Val::Int(5)));

    // classes are bound by name
    assert!(matches!(
        vm.globals().read(Symbol::intern("Integer")),
        Some(Val::Class(c)) if &*c.name().as_str() == "Integer"
    ));
}
