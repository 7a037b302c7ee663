use crate::{
    convert::{descriptor_type, image_layout},
    Error, Result,
};
use ash::vk::{self, Handle};
use basalt_binding::{BindingData, DescriptorKind, DescriptorPayload};
use std::ffi::c_void;

enum WriteInfo {
    Image(usize),
    Buffer(usize),
    TexelBuffer(usize),
    AccelerationStructure(usize),
}

struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    descriptor_type: vk::DescriptorType,
    info: WriteInfo,
}

/// `VkWriteDescriptorSet`s for one `BindingData`, with the info structs they point into.
pub struct DescriptorWriteBatch {
    writes: Vec<PendingWrite>,
    image_infos: Vec<vk::DescriptorImageInfo>,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    texel_buffer_views: Vec<vk::BufferView>,
    accel_structs: Vec<vk::AccelerationStructureKHR>,
    accel_struct_infos: Vec<vk::WriteDescriptorSetAccelerationStructureKHR>,
}

impl DescriptorWriteBatch {
    /// `sets` holds one descriptor set per group of `data`, in order.
    pub fn new(sets: &[vk::DescriptorSet], data: &BindingData) -> Result<Self> {
        let mut batch = Self {
            writes: Vec::with_capacity(data.writes.len()),
            image_infos: Vec::new(),
            buffer_infos: Vec::new(),
            texel_buffer_views: Vec::new(),
            accel_structs: Vec::new(),
            accel_struct_infos: Vec::new(),
        };
        for write in data.writes.iter() {
            let set = write
                .group
                .and_then(|group| sets.get(group as usize))
                .copied()
                .ok_or(Error::GroupOutOfBounds {
                    group: write.group,
                    count: sets.len(),
                })?;
            let info = batch.push_info(write.kind, &write.payload);
            batch.writes.push(PendingWrite {
                set,
                binding: write.index,
                array_element: write.array_element,
                descriptor_type: descriptor_type(write.kind),
                info,
            });
        }
        batch.accel_struct_infos = batch
            .accel_structs
            .iter()
            .map(|accel_struct| vk::WriteDescriptorSetAccelerationStructureKHR {
                acceleration_structure_count: 1,
                p_acceleration_structures: accel_struct,
                ..Default::default()
            })
            .collect();
        Ok(batch)
    }

    fn push_image(&mut self, sampler: u64, view: u64, kind: DescriptorKind) -> WriteInfo {
        self.image_infos.push(vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(sampler),
            image_view: vk::ImageView::from_raw(view),
            image_layout: if view == 0 {
                vk::ImageLayout::UNDEFINED
            } else {
                image_layout(kind)
            },
        });
        WriteInfo::Image(self.image_infos.len() - 1)
    }

    fn push_buffer(&mut self, buffer: u64, offset: u64, range: u64) -> WriteInfo {
        self.buffer_infos.push(vk::DescriptorBufferInfo {
            buffer: vk::Buffer::from_raw(buffer),
            offset,
            range,
        });
        WriteInfo::Buffer(self.buffer_infos.len() - 1)
    }

    fn push_texel_buffer(&mut self, view: u64) -> WriteInfo {
        self.texel_buffer_views.push(vk::BufferView::from_raw(view));
        WriteInfo::TexelBuffer(self.texel_buffer_views.len() - 1)
    }

    fn push_accel_struct(&mut self, handle: u64) -> WriteInfo {
        self.accel_structs
            .push(vk::AccelerationStructureKHR::from_raw(handle));
        WriteInfo::AccelerationStructure(self.accel_structs.len() - 1)
    }

    fn push_info(&mut self, kind: DescriptorKind, payload: &DescriptorPayload) -> WriteInfo {
        match *payload {
            DescriptorPayload::Null => match kind {
                DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer => {
                    self.push_buffer(0, 0, vk::WHOLE_SIZE)
                }
                DescriptorKind::UniformTexelBuffer | DescriptorKind::StorageTexelBuffer => {
                    self.push_texel_buffer(0)
                }
                DescriptorKind::AccelerationStructure => self.push_accel_struct(0),
                DescriptorKind::SampledImage
                | DescriptorKind::StorageImage
                | DescriptorKind::Sampler
                | DescriptorKind::CombinedImageSampler => self.push_image(0, 0, kind),
            },
            DescriptorPayload::Buffer {
                buffer,
                offset,
                size,
            } => self.push_buffer(buffer.0, offset, size),
            // Typed buffers are bound through the resource's buffer view.
            DescriptorPayload::TexelBuffer { buffer, .. } => self.push_texel_buffer(buffer.0),
            DescriptorPayload::Image { view } => self.push_image(0, view.0, kind),
            DescriptorPayload::Sampler { sampler } => self.push_image(sampler.0, 0, kind),
            DescriptorPayload::CombinedImageSampler { view, sampler } => {
                self.push_image(sampler.0, view.0, kind)
            }
            DescriptorPayload::AccelerationStructure { handle } => self.push_accel_struct(handle.0),
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// The returned structs point into `self` and must not outlive it.
    pub fn raw(&self) -> Vec<vk::WriteDescriptorSet> {
        self.writes
            .iter()
            .map(|write| {
                let mut raw = vk::WriteDescriptorSet {
                    dst_set: write.set,
                    dst_binding: write.binding,
                    dst_array_element: write.array_element,
                    descriptor_count: 1,
                    descriptor_type: write.descriptor_type,
                    ..Default::default()
                };
                match write.info {
                    WriteInfo::Image(i) => raw.p_image_info = &self.image_infos[i],
                    WriteInfo::Buffer(i) => raw.p_buffer_info = &self.buffer_infos[i],
                    WriteInfo::TexelBuffer(i) => {
                        raw.p_texel_buffer_view = &self.texel_buffer_views[i]
                    }
                    WriteInfo::AccelerationStructure(i) => {
                        raw.p_next = &self.accel_struct_infos[i] as *const _ as *const c_void
                    }
                }
                raw
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_binding::{
        BindingModelKind, DescriptorWrite, GroupAllocation, GroupSchema, NativeHandle,
        ResourceCategory,
    };
    use std::sync::Arc;

    fn write(group: u32, index: u32, kind: DescriptorKind, payload: DescriptorPayload) -> DescriptorWrite {
        DescriptorWrite {
            group: Some(group),
            category: ResourceCategory::Descriptor,
            index,
            array_element: 0,
            kind,
            payload,
        }
    }

    fn data(writes: Vec<DescriptorWrite>) -> BindingData {
        BindingData {
            model: BindingModelKind::DescriptorSet,
            groups: vec![
                GroupAllocation::Object(Arc::new(GroupSchema::default())),
                GroupAllocation::Object(Arc::new(GroupSchema::default())),
            ],
            writes,
            push_constants: Vec::new(),
            resource_states: Vec::new(),
        }
    }

    fn sets() -> [vk::DescriptorSet; 2] {
        [vk::DescriptorSet::from_raw(100), vk::DescriptorSet::from_raw(200)]
    }

    #[test]
    fn test_writes_target_group_sets() {
        let data = data(vec![
            write(
                0,
                0,
                DescriptorKind::UniformBuffer,
                DescriptorPayload::Buffer {
                    buffer: NativeHandle(5),
                    offset: 256,
                    size: 64,
                },
            ),
            write(
                1,
                2,
                DescriptorKind::CombinedImageSampler,
                DescriptorPayload::CombinedImageSampler {
                    view: NativeHandle(6),
                    sampler: NativeHandle(7),
                },
            ),
            write(
                1,
                3,
                DescriptorKind::AccelerationStructure,
                DescriptorPayload::AccelerationStructure {
                    handle: NativeHandle(8),
                },
            ),
        ]);
        let batch = DescriptorWriteBatch::new(&sets(), &data).unwrap();
        assert_eq!(batch.len(), 3);
        let raw = batch.raw();

        assert_eq!(raw[0].dst_set.as_raw(), 100);
        assert_eq!(raw[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        let buffer = unsafe { &*raw[0].p_buffer_info };
        assert_eq!(buffer.buffer.as_raw(), 5);
        assert_eq!((buffer.offset, buffer.range), (256, 64));

        assert_eq!(raw[1].dst_set.as_raw(), 200);
        assert_eq!(raw[1].dst_binding, 2);
        let image = unsafe { &*raw[1].p_image_info };
        assert_eq!(image.image_view.as_raw(), 6);
        assert_eq!(image.sampler.as_raw(), 7);
        assert_eq!(image.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        assert!(!raw[2].p_next.is_null());
        let accel = unsafe { &*(raw[2].p_next as *const vk::WriteDescriptorSetAccelerationStructureKHR) };
        assert_eq!(accel.acceleration_structure_count, 1);
        assert_eq!(unsafe { (*accel.p_acceleration_structures).as_raw() }, 8);
    }

    #[test]
    fn test_null_writes() {
        let data = data(vec![
            write(0, 0, DescriptorKind::StorageBuffer, DescriptorPayload::Null),
            write(0, 1, DescriptorKind::StorageImage, DescriptorPayload::Null),
        ]);
        let batch = DescriptorWriteBatch::new(&sets(), &data).unwrap();
        let raw = batch.raw();
        let buffer = unsafe { &*raw[0].p_buffer_info };
        assert_eq!(buffer.buffer, vk::Buffer::null());
        assert_eq!(buffer.range, vk::WHOLE_SIZE);
        let image = unsafe { &*raw[1].p_image_info };
        assert_eq!(image.image_view, vk::ImageView::null());
        assert_eq!(image.image_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_write_outside_groups() {
        let data = data(vec![write(
            2,
            0,
            DescriptorKind::Sampler,
            DescriptorPayload::Sampler {
                sampler: NativeHandle(1),
            },
        )]);
        assert!(matches!(
            DescriptorWriteBatch::new(&sets(), &data),
            Err(Error::GroupOutOfBounds {
                group: Some(2),
                count: 2
            })
        ));
    }
}
