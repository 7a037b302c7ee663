use crate::{convert::shader_stage, descriptor::DescriptorSetLayout, Device, HasDevice};
use ash::{prelude::VkResult, vk};
use basalt_binding::layout::PushConstantRange;
use smallvec::SmallVec;
use std::sync::Arc;

pub fn push_constant_ranges(ranges: &[PushConstantRange]) -> Vec<vk::PushConstantRange> {
    ranges
        .iter()
        .map(|range| vk::PushConstantRange {
            stage_flags: shader_stage(range.stage),
            offset: range.offset,
            size: range.size,
        })
        .collect()
}

/// A `VkPipelineLayout` whose set numbers follow the group order of a root layout.
pub struct PipelineLayout {
    device: Arc<Device>,
    raw: vk::PipelineLayout,
    groups: Vec<Arc<DescriptorSetLayout>>,
    bindless: Option<Arc<DescriptorSetLayout>>,
}

impl PipelineLayout {
    /// `bindless`, when present, takes the set number after the last group.
    pub fn new(
        device: Arc<Device>,
        groups: Vec<Arc<DescriptorSetLayout>>,
        bindless: Option<Arc<DescriptorSetLayout>>,
        push_constants: &[PushConstantRange],
    ) -> VkResult<Self> {
        let sets: SmallVec<[vk::DescriptorSetLayout; 4]> = groups
            .iter()
            .chain(bindless.iter())
            .map(|set| unsafe { set.raw() })
            .collect();
        let ranges = push_constant_ranges(push_constants);
        let info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&sets)
            .push_constant_ranges(&ranges);
        let raw = unsafe { device.create_pipeline_layout(&info, None)? };
        tracing::debug!(
            layout = ?raw,
            groups = groups.len(),
            bindless = bindless.is_some(),
            push_constants = ranges.len(),
            "created pipeline layout"
        );
        Ok(Self {
            device,
            raw,
            groups,
            bindless,
        })
    }

    /// Set layouts the arena allocates for each realized binding.
    pub fn allocated_sets(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.groups
    }

    pub fn has_bindless_set(&self) -> bool {
        self.bindless.is_some()
    }

    pub unsafe fn raw(&self) -> vk::PipelineLayout {
        self.raw
    }
}

impl HasDevice for PipelineLayout {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.raw, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_binding::reflection::ShaderStage;

    #[test]
    fn test_push_constant_ranges() {
        let ranges = push_constant_ranges(&[
            PushConstantRange {
                offset: 0,
                size: 16,
                stage: ShaderStage::Vertex,
            },
            PushConstantRange {
                offset: 16,
                size: 8,
                stage: ShaderStage::Fragment,
            },
        ]);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].offset, 16);
        assert_eq!(ranges[1].size, 8);
        assert_eq!(ranges[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
