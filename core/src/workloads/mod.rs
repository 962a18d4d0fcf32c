//! Small programs that exercise the engine: deep recursion through one call
//! site, inlined loops, polymorphic sends, escaping blocks, non-local
//! returns and restarted `whileTrue:` loops. Built as method trees and
//! installed on a `Bench` class.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};

use crate::ast::{Expr, MethodDef};
use crate::symbol::Symbol;
use crate::universe::Class;
use crate::val::Val;
use crate::vm::{CompiledMethod, Invokable, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// `fact: n`, recursive.
    Fact,
    /// `sumTo: n` with an inlined `to:do:` loop.
    Loop,
    /// `poly: n`: `printString` sent to four receiver classes from one site.
    Poly,
    /// `escape: n`: `^` from a block whose home already returned.
    Escape,
    /// `detect: n`: non-local return out of a closure-form `to:do:`.
    Nlr,
    /// `countTo: n`: `whileTrue:` on block variables, driven by `restart`.
    While,
}

impl Workload {
    pub const ALL: [Workload; 6] = [
        Workload::Fact,
        Workload::Loop,
        Workload::Poly,
        Workload::Escape,
        Workload::Nlr,
        Workload::While,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Workload::Fact => "fact",
            Workload::Loop => "loop",
            Workload::Poly => "poly",
            Workload::Escape => "escape",
            Workload::Nlr => "nlr",
            Workload::While => "while",
        }
    }

    pub fn selector(self) -> &'static str {
        match self {
            Workload::Fact => "fact:",
            Workload::Loop => "sumTo:",
            Workload::Poly => "poly:",
            Workload::Escape => "escape:",
            Workload::Nlr => "detect:",
            Workload::While => "countTo:",
        }
    }

    pub fn default_argument(self) -> i64 {
        match self {
            Workload::Fact => 20,
            Workload::Loop => 1_000_000,
            Workload::Poly => 10_000,
            Workload::Escape => 7,
            Workload::Nlr => 500,
            Workload::While => 1_000,
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Workload {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Workload::ALL
            .into_iter()
            .find(|w| w.name() == s)
            .ok_or_else(|| anyhow!("unknown workload '{}' (expected one of: {})", s, names()))
    }
}

fn names() -> String {
    Workload::ALL.map(Workload::name).join(", ")
}

/// Defines `Bench` and its methods on first use; later calls return the
/// existing class.
pub fn install(vm: &mut Vm) -> Result<Arc<Class>> {
    if let Some(class) = vm.classes().by_name("Bench") {
        return Ok(class);
    }
    let object = vm.classes().core().object.clone();
    let class = vm.define_class("Bench", &object, &[]);
    for def in methods() {
        vm.define_method(&class, &def)
            .with_context(|| format!("compiling Bench>>{}", def.selector))?;
    }
    Ok(class)
}

/// Runs `workload` with argument `n` on a fresh `Bench` instance.
pub fn run(vm: &mut Vm, workload: Workload, n: i64) -> Result<Val> {
    let class = install(vm)?;
    let receiver = vm.new_instance(&class);
    vm.send(workload.selector(), vec![receiver, Val::Int(n)])
        .with_context(|| format!("workload {workload} failed"))
}

/// The compiled entry method of `workload`.
pub fn entry_method(vm: &mut Vm, workload: Workload) -> Result<Arc<CompiledMethod>> {
    let class = install(vm)?;
    match class.local_method(Symbol::intern(workload.selector())) {
        Some(Invokable::Method(m)) => Ok(m),
        Some(Invokable::Primitive(_)) => bail!("Bench>>{} is a primitive", workload.selector()),
        None => bail!("Bench>>{} is not installed", workload.selector()),
    }
}

fn var(name: &str) -> Expr {
    Expr::var(name)
}

fn int(i: i64) -> Expr {
    Expr::int(i)
}

fn methods() -> Vec<MethodDef> {
    vec![
        // ^n <= 1 ifTrue: [1] ifFalse: [n * (self fact: n - 1)]
        MethodDef::new(
            "fact:",
            &["n"],
            &[],
            vec![Expr::ret(Expr::send(
                Expr::binary(var("n"), "<=", int(1)),
                "ifTrue:ifFalse:",
                vec![
                    Expr::block(&[], &[], vec![int(1)]),
                    Expr::block(
                        &[],
                        &[],
                        vec![Expr::binary(
                            var("n"),
                            "*",
                            Expr::send(Expr::this(), "fact:", vec![Expr::binary(var("n"), "-", int(1))]),
                        )],
                    ),
                ],
            ))],
        ),
        // | s | s := 0. 1 to: n do: [:i | s := s + i]. ^s
        MethodDef::new(
            "sumTo:",
            &["n"],
            &["s"],
            vec![
                Expr::assign("s", int(0)),
                Expr::send(
                    int(1),
                    "to:do:",
                    vec![
                        var("n"),
                        Expr::block(&["i"], &[], vec![Expr::assign("s", Expr::binary(var("s"), "+", var("i")))]),
                    ],
                ),
                Expr::ret(var("s")),
            ],
        ),
        poly(),
        // | b | b := self makeBlock. ^b value: n
        MethodDef::new(
            "escape:",
            &["n"],
            &["b"],
            vec![
                Expr::assign("b", Expr::unary(Expr::this(), "makeBlock")),
                Expr::ret(Expr::send(var("b"), "value:", vec![var("n")])),
            ],
        ),
        // ^[:x | ^x]
        MethodDef::new(
            "makeBlock",
            &[],
            &[],
            vec![Expr::ret(Expr::block(&["x"], &[], vec![Expr::ret(var("x"))]))],
        ),
        MethodDef::new("escapedBlock:", &["block"], &[], vec![Expr::ret(Expr::symbol("escaped"))]),
        // self each: [:i | i * i > n ifTrue: [^i]]. ^0
        MethodDef::new(
            "detect:",
            &["n"],
            &[],
            vec![
                Expr::send(
                    Expr::this(),
                    "each:",
                    vec![Expr::block(
                        &["i"],
                        &[],
                        vec![Expr::send(
                            Expr::binary(Expr::binary(var("i"), "*", var("i")), ">", var("n")),
                            "ifTrue:",
                            vec![Expr::block(&[], &[], vec![Expr::ret(var("i"))])],
                        )],
                    )],
                ),
                Expr::ret(int(0)),
            ],
        ),
        // 1 to: 100000 do: aBlock
        MethodDef::new(
            "each:",
            &["aBlock"],
            &[],
            vec![Expr::send(int(1), "to:do:", vec![int(100_000), var("aBlock")])],
        ),
        // | i cond body | i := 0. cond := [i < n]. body := [i := i + 1].
        // cond whileTrue: body. ^i
        MethodDef::new(
            "countTo:",
            &["n"],
            &["i", "cond", "body"],
            vec![
                Expr::assign("i", int(0)),
                Expr::assign("cond", Expr::block(&[], &[], vec![Expr::binary(var("i"), "<", var("n"))])),
                Expr::assign(
                    "body",
                    Expr::block(&[], &[], vec![Expr::assign("i", Expr::binary(var("i"), "+", int(1)))]),
                ),
                Expr::send(var("cond"), "whileTrue:", vec![var("body")]),
                Expr::ret(var("i")),
            ],
        ),
    ]
}

/// ```text
/// poly: n
///   | items total |
///   items := Array new: 4.
///   items at: 1 put: 1; at: 2 put: 2.5; at: 3 put: 'abc'; at: 4 put: #sym.
///   total := 0.
///   1 to: n do: [:i | total := total + (items at: i \\ 4 + 1) printString length].
///   ^total
/// ```
fn poly() -> MethodDef {
    let items = [int(1), Expr::double(2.5), Expr::string("abc"), Expr::symbol("sym")];
    let mut body = vec![Expr::assign(
        "items",
        Expr::send(Expr::global("Array"), "new:", vec![int(items.len() as i64)]),
    )];
    for (i, item) in items.into_iter().enumerate() {
        body.push(Expr::send(var("items"), "at:put:", vec![int(i as i64 + 1), item]));
    }
    let slot = Expr::binary(Expr::binary(var("i"), "\\\\", int(4)), "+", int(1));
    let element = Expr::send(var("items"), "at:", vec![slot]);
    let length = Expr::unary(Expr::unary(element, "printString"), "length");
    body.push(Expr::assign("total", int(0)));
    body.push(Expr::send(
        int(1),
        "to:do:",
        vec![
            var("n"),
            Expr::block(&["i"], &[], vec![Expr::assign("total", Expr::binary(var("total"), "+", length))]),
        ],
    ));
    body.push(Expr::ret(var("total")));
    MethodDef::new("poly:", &["n"], &["items", "total"], body)
}
