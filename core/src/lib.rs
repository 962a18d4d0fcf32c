pub mod ast;
pub mod symbol;
pub mod universe;
pub mod util;
pub mod val;
pub mod vm;
pub mod workloads;
