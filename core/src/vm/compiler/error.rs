use std::fmt;

/// Reasons a method fails to compile. None of them is recoverable: the
/// method is not installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The block inliner met bytecode it cannot splice. Always a compiler bug.
    Inliner(String),
    /// The verifier rejected the instruction tape.
    Verify { ip: usize, msg: String },
    /// An operand encoding overflowed: literal pool, slot index or jump range.
    Limit(String),
    /// The tree describes something the language does not allow.
    Invalid(String),
}

impl CompileError {
    pub(crate) fn inliner(msg: impl Into<String>) -> Self {
        CompileError::Inliner(msg.into())
    }

    pub(crate) fn verify(ip: usize, msg: impl Into<String>) -> Self {
        CompileError::Verify { ip, msg: msg.into() }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Inliner(msg) => write!(f, "block inliner inconsistency: {msg}"),
            CompileError::Verify { ip, msg } => write!(f, "bytecode verification failed at {ip}: {msg}"),
            CompileError::Limit(msg) => write!(f, "compiler limit exceeded: {msg}"),
            CompileError::Invalid(msg) => write!(f, "invalid method: {msg}"),
        }
    }
}

impl std::error::Error for CompileError {}
