use crate::layout::{GroupSchema, PipelineBindingDesc};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendLimits {
    pub max_push_constant_size: u32,
    pub min_uniform_buffer_offset_alignment: u64,
}

impl Default for BackendLimits {
    /// The minimums every Vulkan implementation guarantees.
    fn default() -> Self {
        Self {
            max_push_constant_size: 128,
            min_uniform_buffer_offset_alignment: 256,
        }
    }
}

/// The device side of binding: turns finalized group and pipeline descriptions into
/// backend objects. Dropping the returned objects releases them.
pub trait BindingBackend {
    type GroupLayout;
    type PipelineLayout;
    type Error: std::error::Error + Send + Sync + 'static;

    fn limits(&self) -> BackendLimits;

    /// Whether pipeline layouts end with the backend's bindless group.
    fn has_bindless_group(&self) -> bool {
        false
    }

    fn create_group_layout(&self, schema: &GroupSchema) -> Result<Self::GroupLayout, Self::Error>;

    /// `groups` holds one layout per entry of `desc.groups`, in order.
    fn create_pipeline_layout(
        &self,
        groups: &[Arc<Self::GroupLayout>],
        desc: &PipelineBindingDesc,
    ) -> Result<Self::PipelineLayout, Self::Error>;
}

/// Backend without device objects. Layouts are kept as plain descriptions;
/// used for CPU execution of the flat register model and for testing.
#[derive(Clone, Debug, Default)]
pub struct HostBackend {
    pub limits: BackendLimits,
    pub bindless: bool,
}

impl BindingBackend for HostBackend {
    type GroupLayout = GroupSchema;
    type PipelineLayout = PipelineBindingDesc;
    type Error = Infallible;

    fn limits(&self) -> BackendLimits {
        self.limits
    }
    fn has_bindless_group(&self) -> bool {
        self.bindless
    }
    fn create_group_layout(&self, schema: &GroupSchema) -> Result<GroupSchema, Infallible> {
        Ok(schema.clone())
    }
    fn create_pipeline_layout(
        &self,
        _groups: &[Arc<GroupSchema>],
        desc: &PipelineBindingDesc,
    ) -> Result<PipelineBindingDesc, Infallible> {
        Ok(desc.clone())
    }
}
