mod builder;
mod driver;
mod error;
mod inliner;
mod intrinsics;
mod scope;
pub(crate) mod verify;

pub(crate) use builder::MethodBuilder;
pub use driver::Compiler;
pub use error::CompileError;
