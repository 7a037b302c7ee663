use crate::{descriptor::DescriptorSetLayout, Device, HasDevice, PipelineLayout};
use ash::{prelude::VkResult, vk};
use basalt_binding::{BackendLimits, BindingBackend, GroupSchema, PipelineBindingDesc};
use std::sync::Arc;

/// Creates descriptor set layouts and pipeline layouts for the descriptor-set binding model.
pub struct VulkanBackend {
    device: Arc<Device>,
    bindless: Option<Arc<DescriptorSetLayout>>,
}

impl VulkanBackend {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            bindless: None,
        }
    }
    /// Every pipeline layout created from now on ends with `layout`.
    pub fn with_bindless_layout(mut self, layout: Arc<DescriptorSetLayout>) -> Self {
        self.bindless = Some(layout);
        self
    }
}

impl HasDevice for VulkanBackend {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl BindingBackend for VulkanBackend {
    type GroupLayout = DescriptorSetLayout;
    type PipelineLayout = PipelineLayout;
    type Error = vk::Result;

    fn limits(&self) -> BackendLimits {
        self.device.backend_limits()
    }
    fn has_bindless_group(&self) -> bool {
        self.bindless.is_some()
    }
    fn create_group_layout(&self, schema: &GroupSchema) -> VkResult<DescriptorSetLayout> {
        DescriptorSetLayout::new(self.device.clone(), schema)
    }
    fn create_pipeline_layout(
        &self,
        groups: &[Arc<DescriptorSetLayout>],
        desc: &PipelineBindingDesc,
    ) -> VkResult<PipelineLayout> {
        let bindless = if desc.bindless {
            Some(
                self.bindless
                    .clone()
                    .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?,
            )
        } else {
            None
        };
        PipelineLayout::new(
            self.device.clone(),
            groups.to_vec(),
            bindless,
            &desc.push_constant_ranges,
        )
    }
}
