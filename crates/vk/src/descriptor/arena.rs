use super::DescriptorWriteBatch;
use crate::{convert::shader_stage, Device, Error, HasDevice, PipelineLayout, Result};
use ash::{prelude::VkResult, vk};
use basalt_binding::{BindingData, BindingModelKind, GroupAllocation, PushConstantData};
use smallvec::SmallVec;
use std::{collections::BTreeMap, sync::Arc};

/// Totals the descriptors of `sets`, each repeated `copies` times.
/// Returns the set count alongside the per-type pool sizes.
pub fn pool_sizes<'a>(
    sets: impl IntoIterator<Item = &'a [(vk::DescriptorType, u32)]>,
    copies: u32,
) -> (u32, Vec<vk::DescriptorPoolSize>) {
    let mut set_count = 0;
    let mut per_type = BTreeMap::<vk::DescriptorType, u32>::new();
    for set in sets {
        set_count += copies;
        for &(ty, count) in set {
            *per_type.entry(ty).or_default() += count * copies;
        }
    }
    let sizes = per_type
        .into_iter()
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty,
            descriptor_count,
        })
        .collect();
    (set_count, sizes)
}

/// Descriptor sets for bindings of one or more pipeline layouts, recycled as a whole.
pub struct DescriptorArena {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    bindless_set: Option<vk::DescriptorSet>,
}

impl Drop for DescriptorArena {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

impl HasDevice for DescriptorArena {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl DescriptorArena {
    /// Sized for `bindings_per_layout` realized bindings of every layout between resets.
    pub fn for_pipeline_layouts<'a>(
        device: Arc<Device>,
        layouts: impl IntoIterator<Item = &'a PipelineLayout>,
        bindings_per_layout: u32,
    ) -> VkResult<Self> {
        let (max_sets, pool_sizes) = pool_sizes(
            layouts
                .into_iter()
                .flat_map(|layout| layout.allocated_sets())
                .map(|set| set.desc_types()),
            bindings_per_layout,
        );
        let info = vk::DescriptorPoolCreateInfo {
            max_sets: max_sets.max(1),
            p_pool_sizes: pool_sizes.as_ptr(),
            pool_size_count: pool_sizes.len() as u32,
            ..Default::default()
        };
        let pool = unsafe { device.create_descriptor_pool(&info, None)? };
        tracing::info!(pool = ?pool, max_sets, "created descriptor arena");
        Ok(Self {
            device,
            pool,
            bindless_set: None,
        })
    }

    /// The set bound in place of the bindless group.
    pub fn with_bindless_set(mut self, set: vk::DescriptorSet) -> Self {
        self.bindless_set = Some(set);
        self
    }

    /// Allocates one descriptor set per group of `data` and writes its descriptors.
    pub fn realize(&mut self, layout: &PipelineLayout, data: &BindingData) -> Result<RealizedBinding> {
        if data.model != BindingModelKind::DescriptorSet {
            return Err(Error::UnsupportedModel(data.model));
        }
        let object_groups = data
            .groups
            .iter()
            .filter(|group| matches!(group, GroupAllocation::Object(_)))
            .count();
        if object_groups != layout.allocated_sets().len() {
            return Err(Error::GroupCountMismatch {
                expected: layout.allocated_sets().len(),
                found: object_groups,
            });
        }

        let set_layouts: SmallVec<[_; 4]> = layout
            .allocated_sets()
            .iter()
            .map(|set| unsafe { set.raw() })
            .collect();
        let mut allocated = if set_layouts.is_empty() {
            Vec::new()
        } else {
            let info = vk::DescriptorSetAllocateInfo {
                descriptor_pool: self.pool,
                descriptor_set_count: set_layouts.len() as u32,
                p_set_layouts: set_layouts.as_ptr(),
                ..Default::default()
            };
            unsafe { self.device.allocate_descriptor_sets(&info)? }
        }
        .into_iter();
        let mut sets: SmallVec<[vk::DescriptorSet; 4]> = SmallVec::with_capacity(data.groups.len());
        for group in data.groups.iter() {
            let set = match group {
                GroupAllocation::Object(_) => allocated.next(),
                GroupAllocation::Bindless if layout.has_bindless_set() => {
                    Some(self.bindless_set.ok_or(Error::MissingBindlessSet)?)
                }
                GroupAllocation::Bindless => return Err(Error::MissingBindlessSet),
            };
            sets.extend(set);
        }

        let batch = DescriptorWriteBatch::new(&sets, data)?;
        unsafe {
            self.device.update_descriptor_sets(&batch.raw(), &[]);
        }
        tracing::trace!(sets = sets.len(), writes = batch.len(), "realized binding data");
        Ok(RealizedBinding {
            pipeline_layout: unsafe { layout.raw() },
            sets,
            push_constants: data.push_constants.clone(),
        })
    }

    /// Returns every set to the pool. Realized bindings from before must no longer be in use.
    pub fn reset(&mut self) -> VkResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
        }
    }
}

/// Descriptor sets and push constants ready to be recorded into a command buffer.
pub struct RealizedBinding {
    pipeline_layout: vk::PipelineLayout,
    sets: SmallVec<[vk::DescriptorSet; 4]>,
    push_constants: Vec<PushConstantData>,
}

impl RealizedBinding {
    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }
    pub fn push_constants(&self) -> &[PushConstantData] {
        &self.push_constants
    }

    /// # Safety
    /// `command_buffer` must be in the recording state and bound to a pipeline created
    /// with this binding's pipeline layout.
    pub unsafe fn cmd_bind(
        &self,
        device: &Device,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
    ) {
        if !self.sets.is_empty() {
            device.cmd_bind_descriptor_sets(
                command_buffer,
                bind_point,
                self.pipeline_layout,
                0,
                &self.sets,
                &[],
            );
        }
        for push_constant in self.push_constants.iter() {
            device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout,
                shader_stage(push_constant.range.stage),
                push_constant.range.offset,
                &push_constant.data,
            );
        }
    }
}
