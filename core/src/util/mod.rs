pub mod fast_map;
pub mod sync;

pub use fast_map::*;
