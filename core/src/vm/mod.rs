//! Stack bytecode VM subsystem
//!
//! Bytecode definitions, the compiler with its block inliner, and the
//! quickening interpreter with per-site dispatch chains.

mod bytecode;
mod compiler;
mod config;
mod context;
mod control;
mod disasm;
mod dispatch;
mod method;
mod quicken;
mod stats;
#[allow(clippy::module_inception)]
mod vm;

pub use bytecode::*;
pub use compiler::{CompileError, Compiler};
pub use config::VmConfig;
pub use context::{Output, VmContext};
pub use control::{Completion, Unwind};
pub use disasm::disassemble;
pub use dispatch::DispatchChain;
pub use method::{CompiledMethod, Invokable, Primitive, PrimitiveFn};
pub use quicken::{EagerOp, QuickenTable, Specialization};
pub use stats::VmStats;
pub use vm::*;

#[cfg(test)]
mod vm_test;
