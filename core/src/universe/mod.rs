//! Classes, globals and the core library a program runs against.

mod bootstrap;
mod class;
mod globals;
mod hook;
mod primitives;

pub(crate) use bootstrap::bootstrap;
pub use class::{Class, ClassTable, CoreClasses, ObjectLayout};
pub use globals::{GlobalCell, GlobalTable};
pub use hook::{Condition, DefaultHook, ErrorHook};
