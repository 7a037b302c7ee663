use crate::{convert::descriptor_type, Device, HasDevice};
use ash::{prelude::VkResult, vk};
use basalt_binding::GroupSchema;
use std::{collections::BTreeMap, sync::Arc};

/// Bindings of one descriptor set layout. Group entries map one to one onto binding numbers.
pub fn set_layout_bindings(schema: &GroupSchema) -> Vec<vk::DescriptorSetLayoutBinding> {
    schema
        .entries
        .iter()
        .map(|entry| vk::DescriptorSetLayoutBinding {
            binding: entry.index,
            descriptor_type: descriptor_type(entry.kind),
            descriptor_count: entry.count,
            stage_flags: vk::ShaderStageFlags::ALL,
            ..Default::default()
        })
        .collect()
}

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    pub(crate) raw: vk::DescriptorSetLayout,
    pub(crate) desc_types: Vec<(vk::DescriptorType, u32)>,
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.raw, None);
        }
    }
}

impl HasDevice for DescriptorSetLayout {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, schema: &GroupSchema) -> VkResult<Self> {
        let bindings = set_layout_bindings(schema);
        Self::from_bindings(device, &bindings, vk::DescriptorSetLayoutCreateFlags::empty())
    }

    /// For layouts not described by a group schema, e.g. the bindless set.
    pub fn from_bindings(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<Self> {
        let info = vk::DescriptorSetLayoutCreateInfo::builder()
            .flags(flags)
            .bindings(bindings);
        let raw = unsafe { device.create_descriptor_set_layout(&info, None)? };
        tracing::debug!(layout = ?raw, bindings = bindings.len(), "created descriptor set layout");
        Ok(Self {
            device,
            raw,
            desc_types: descriptor_counts(bindings),
        })
    }

    pub unsafe fn raw(&self) -> vk::DescriptorSetLayout {
        self.raw
    }
    /// Descriptors of each type one set of this layout takes from a pool.
    pub fn desc_types(&self) -> &[(vk::DescriptorType, u32)] {
        &self.desc_types
    }
}

fn descriptor_counts(bindings: &[vk::DescriptorSetLayoutBinding]) -> Vec<(vk::DescriptorType, u32)> {
    bindings
        .iter()
        .fold(BTreeMap::<_, u32>::new(), |mut counts, binding| {
            *counts.entry(binding.descriptor_type).or_default() += binding.descriptor_count;
            counts
        })
        .into_iter()
        .collect()
}
