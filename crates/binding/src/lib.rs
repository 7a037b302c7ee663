pub mod allocator;
pub mod backend;
pub mod binder;
pub mod config;
mod error;
pub mod layout;
pub mod model;
pub mod object;
pub mod program;
pub mod reflection;
pub mod resource;

#[cfg(test)]
mod test_utils;

pub use allocator::{HostPages, OrdinaryAllocation, OrdinaryDataAllocator, UploadPage, UploadPages};
pub use backend::{BackendLimits, BindingBackend, HostBackend};
pub use binder::{
    BindingData, BindingDataBuilder, DescriptorPayload, DescriptorWrite, GroupAllocation,
    PushConstantData, ResourceUsage,
};
pub use config::BindingConfig;
pub use error::{Error, Result};
pub use layout::{
    GroupEntry, GroupSchema, LayoutCache, PipelineBindingDesc, RootShaderObjectLayout,
    ShaderObjectLayout,
};
pub use model::{
    BindingModel, BindingModelKind, DescriptorKind, DescriptorSetModel, FlatRegisterModel,
    ResourceCategory, ResourceState, RootSignatureModel,
};
pub use object::{RootShaderObject, ShaderCursor, ShaderObject};
pub use program::{Program, SpecializedProgram, Specializer};
pub use reflection::{ProgramReflection, TypeLayoutReflection};
pub use resource::{Binding, NativeHandle, ResourceKind, ResourceView};
