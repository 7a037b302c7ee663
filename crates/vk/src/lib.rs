//! Vulkan realization of basalt binding data for the descriptor-set binding model.
pub extern crate ash;

mod backend;
pub mod convert;
pub mod descriptor;
mod device;
mod error;
mod pipeline_layout;
mod upload;

pub use backend::VulkanBackend;
pub use descriptor::{DescriptorArena, DescriptorSetLayout, RealizedBinding};
pub use device::{Device, HasDevice};
pub use error::{Error, Result};
pub use pipeline_layout::*;
pub use upload::{HostVisiblePage, HostVisiblePages};
