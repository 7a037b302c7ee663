//! Reflection-driven shader parameter binding.
//!
//! Layouts, shader objects and binding data live in [`binding`]; the Vulkan realization
//! of binding data is in [`vk`].
pub use basalt_binding as binding;
pub use basalt_binding::*;
#[cfg(feature = "vulkan")]
pub use basalt_vk as vk;

pub mod log;
