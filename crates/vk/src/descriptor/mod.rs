mod arena;
mod layout;
mod write;

pub use arena::*;
pub use layout::*;
pub use write::*;
