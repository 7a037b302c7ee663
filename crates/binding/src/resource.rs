use crate::{reflection::BindingType, Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    sync::{Arc, Weak},
};

/// A backend object handle, e.g. a `VkImageView` or a CPU descriptor address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativeHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    TextureView,
    Sampler,
    AccelerationStructure,
}

/// A resource or view owned outside of the binding engine.
///
/// Shader objects only keep weak references; binding data keeps strong ones
/// for as long as the submission needs them.
pub trait ResourceView: Debug + Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn native_handle(&self) -> NativeHandle;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferRange {
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    pub const WHOLE: BufferRange = BufferRange {
        offset: 0,
        size: u64::MAX,
    };
}

impl Default for BufferRange {
    fn default() -> Self {
        Self::WHOLE
    }
}

/// Backend format code of a typed buffer view, e.g. a raw `VkFormat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TexelFormat(pub u32);

#[derive(Clone, Debug)]
pub enum Binding {
    Null,
    Resource(Arc<dyn ResourceView>),
    Buffer {
        buffer: Arc<dyn ResourceView>,
        range: BufferRange,
    },
    TypedBuffer {
        buffer: Arc<dyn ResourceView>,
        format: TexelFormat,
        range: BufferRange,
    },
    CombinedTextureSampler {
        texture: Arc<dyn ResourceView>,
        sampler: Arc<dyn ResourceView>,
    },
}

impl Binding {
    fn describe(&self) -> &'static str {
        match self {
            Binding::Null => "null",
            Binding::Resource(resource) => match resource.kind() {
                ResourceKind::Buffer => "a buffer",
                ResourceKind::TextureView => "a texture view",
                ResourceKind::Sampler => "a sampler",
                ResourceKind::AccelerationStructure => "an acceleration structure",
            },
            Binding::Buffer { .. } => "a buffer range",
            Binding::TypedBuffer { .. } => "a typed buffer view",
            Binding::CombinedTextureSampler { .. } => "a combined texture sampler",
        }
    }
}

impl From<Arc<dyn ResourceView>> for Binding {
    fn from(resource: Arc<dyn ResourceView>) -> Self {
        Binding::Resource(resource)
    }
}

/// One element of a resource binding range.
#[derive(Clone, Debug, Default)]
pub struct ResourceSlot {
    resource: Option<Weak<dyn ResourceView>>,
    sampler: Option<Weak<dyn ResourceView>>,
    format: Option<TexelFormat>,
    range: Option<BufferRange>,
}

impl ResourceSlot {
    pub(crate) fn new(binding_type: BindingType, binding: Binding) -> Result<Self> {
        let mismatch = Error::BindingKindMismatch {
            binding_type,
            binding: binding.describe(),
        };
        let expects = |resource: &Arc<dyn ResourceView>, kind: ResourceKind| {
            if resource.kind() == kind {
                Ok(())
            } else {
                Err(Error::BindingKindMismatch {
                    binding_type,
                    binding: binding.describe(),
                })
            }
        };
        let mut slot = ResourceSlot::default();
        match (&binding, binding_type) {
            (Binding::Null, _) => return Ok(slot),
            (
                Binding::Resource(resource),
                BindingType::Texture | BindingType::MutableTexture,
            ) => expects(resource, ResourceKind::TextureView)?,
            (Binding::Resource(resource), BindingType::Sampler) => {
                expects(resource, ResourceKind::Sampler)?
            }
            (Binding::Resource(resource), BindingType::AccelerationStructure) => {
                expects(resource, ResourceKind::AccelerationStructure)?
            }
            (
                Binding::Resource(resource),
                BindingType::RawBuffer
                | BindingType::MutableRawBuffer
                | BindingType::TypedBuffer
                | BindingType::MutableTypedBuffer,
            ) => expects(resource, ResourceKind::Buffer)?,
            (
                Binding::Buffer { buffer, range },
                BindingType::RawBuffer
                | BindingType::MutableRawBuffer
                | BindingType::TypedBuffer
                | BindingType::MutableTypedBuffer,
            ) => {
                expects(buffer, ResourceKind::Buffer)?;
                slot.range = Some(*range);
            }
            (
                Binding::TypedBuffer {
                    buffer,
                    format,
                    range,
                },
                BindingType::TypedBuffer | BindingType::MutableTypedBuffer,
            ) => {
                expects(buffer, ResourceKind::Buffer)?;
                slot.format = Some(*format);
                slot.range = Some(*range);
            }
            (
                Binding::CombinedTextureSampler { texture, sampler },
                BindingType::CombinedTextureSampler,
            ) => {
                expects(texture, ResourceKind::TextureView)?;
                expects(sampler, ResourceKind::Sampler)?;
                slot.sampler = Some(Arc::downgrade(sampler));
            }
            _ => return Err(mismatch),
        }
        slot.resource = match binding {
            Binding::Null => None,
            Binding::Resource(resource)
            | Binding::Buffer {
                buffer: resource, ..
            }
            | Binding::TypedBuffer {
                buffer: resource, ..
            }
            | Binding::CombinedTextureSampler {
                texture: resource, ..
            } => Some(Arc::downgrade(&resource)),
        };
        Ok(slot)
    }

    /// `None` when nothing was bound or the resource has since been dropped.
    pub fn resource(&self) -> Option<Arc<dyn ResourceView>> {
        self.resource.as_ref().and_then(Weak::upgrade)
    }
    pub fn sampler(&self) -> Option<Arc<dyn ResourceView>> {
        self.sampler.as_ref().and_then(Weak::upgrade)
    }
    pub fn format(&self) -> Option<TexelFormat> {
        self.format
    }
    pub fn range(&self) -> BufferRange {
        self.range.unwrap_or_default()
    }
    pub fn is_bound(&self) -> bool {
        self.resource().is_some()
    }
}
