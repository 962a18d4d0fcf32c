//! Syntax tree consumed by the bytecode compiler.
//!
//! There is no parser in this crate: hosts and tests build trees with the
//! helper constructors below.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Lit),
    /// Variable read. `self`, `nil`, `true` and `false` are reserved names.
    Var(String),
    Assign(String, Box<Expr>),
    Send {
        receiver: Box<Expr>,
        selector: String,
        args: Vec<Expr>,
    },
    /// `super selector: args`, looked up above the method's holder.
    SuperSend {
        selector: String,
        args: Vec<Expr>,
    },
    Block(BlockDef),
    /// `^expr`. Inside a block this returns from the enclosing method.
    Return(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockDef {
    pub params: Vec<String>,
    pub locals: Vec<String>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub selector: String,
    pub params: Vec<String>,
    pub locals: Vec<String>,
    pub body: Vec<Expr>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl BlockDef {
    pub fn new(params: &[&str], locals: &[&str], body: Vec<Expr>) -> Self {
        Self {
            params: names(params),
            locals: names(locals),
            body,
        }
    }

    /// Whether the block ends by returning from its home method.
    pub fn ends_with_return(&self) -> bool {
        matches!(self.body.last(), Some(Expr::Return(_)))
    }
}

impl MethodDef {
    pub fn new(selector: &str, params: &[&str], locals: &[&str], body: Vec<Expr>) -> Self {
        Self {
            selector: selector.to_string(),
            params: names(params),
            locals: names(locals),
            body,
        }
    }
}

impl Expr {
    pub fn int(i: i64) -> Expr {
        Expr::Literal(Lit::Int(i))
    }

    pub fn double(d: f64) -> Expr {
        Expr::Literal(Lit::Double(d))
    }

    pub fn string(s: &str) -> Expr {
        Expr::Literal(Lit::Str(s.to_string()))
    }

    pub fn symbol(s: &str) -> Expr {
        Expr::Literal(Lit::Symbol(s.to_string()))
    }

    pub fn nil() -> Expr {
        Expr::Literal(Lit::Nil)
    }

    pub fn bool(b: bool) -> Expr {
        Expr::Literal(Lit::Bool(b))
    }

    pub fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    pub fn this() -> Expr {
        Expr::Var("self".to_string())
    }

    pub fn assign(name: &str, value: Expr) -> Expr {
        Expr::Assign(name.to_string(), Box::new(value))
    }

    pub fn send(receiver: Expr, selector: &str, args: Vec<Expr>) -> Expr {
        Expr::Send {
            receiver: Box::new(receiver),
            selector: selector.to_string(),
            args,
        }
    }

    pub fn unary(receiver: Expr, selector: &str) -> Expr {
        Expr::send(receiver, selector, Vec::new())
    }

    pub fn binary(lhs: Expr, op: &str, rhs: Expr) -> Expr {
        Expr::send(lhs, op, vec![rhs])
    }

    pub fn super_send(selector: &str, args: Vec<Expr>) -> Expr {
        Expr::SuperSend {
            selector: selector.to_string(),
            args,
        }
    }

    pub fn block(params: &[&str], locals: &[&str], body: Vec<Expr>) -> Expr {
        Expr::Block(BlockDef::new(params, locals, body))
    }

    pub fn ret(value: Expr) -> Expr {
        Expr::Return(Box::new(value))
    }

    pub fn global(name: &str) -> Expr {
        Expr::var(name)
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Nil => f.write_str("nil"),
            Lit::Bool(b) => write!(f, "{b}"),
            Lit::Int(i) => write!(f, "{i}"),
            Lit::Double(d) => write!(f, "{d:?}"),
            Lit::Str(s) => write!(f, "'{s}'"),
            Lit::Symbol(s) => write!(f, "#{s}"),
        }
    }
}

/// Smalltalk-ish rendering, used in diagnostics.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(l) => write!(f, "{l}"),
            Expr::Var(name) => f.write_str(name),
            Expr::Assign(name, value) => write!(f, "{name} := {value}"),
            Expr::Send { receiver, selector, args } => {
                write!(f, "({receiver}")?;
                write_message(f, selector, args)?;
                f.write_str(")")
            }
            Expr::SuperSend { selector, args } => {
                f.write_str("(super")?;
                write_message(f, selector, args)?;
                f.write_str(")")
            }
            Expr::Block(b) => {
                f.write_str("[")?;
                for p in &b.params {
                    write!(f, ":{p} ")?;
                }
                if !b.params.is_empty() {
                    f.write_str("| ")?;
                }
                if !b.locals.is_empty() {
                    write!(f, "| {} | ", b.locals.join(" "))?;
                }
                for (i, e) in b.body.iter().enumerate() {
                    if i > 0 {
                        f.write_str(". ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str("]")
            }
            Expr::Return(value) => write!(f, "^{value}"),
        }
    }
}

fn write_message(f: &mut fmt::Formatter<'_>, selector: &str, args: &[Expr]) -> fmt::Result {
    if args.is_empty() {
        return write!(f, " {selector}");
    }
    let parts: Vec<&str> = selector.split_inclusive(':').collect();
    if parts.len() == args.len() && selector.ends_with(':') {
        for (part, arg) in parts.iter().zip(args) {
            write!(f, " {part} {arg}")?;
        }
        Ok(())
    } else {
        write!(f, " {selector} {}", args[0])
    }
}
