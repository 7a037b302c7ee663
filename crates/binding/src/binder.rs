//! Walks a root shader object against its layout and produces the backend-neutral
//! [`BindingData`] for one draw or dispatch.
use crate::{
    allocator::{OrdinaryDataAllocator, UploadPages},
    layout::{
        collect_child_groups, GroupSchema, PipelineBindingDesc, PushConstantRange,
        RootShaderObjectLayout, ShaderObjectLayout,
    },
    model::{
        BindingModel, BindingModelKind, BindingOffset, DescriptorKind, ResourceCategory,
        ResourceState,
    },
    object::{RootShaderObject, ShaderObject},
    reflection::BindingType,
    resource::{NativeHandle, ResourceSlot, ResourceView, TexelFormat},
    Error, Result,
};
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorPayload {
    /// Explicit null descriptor, only written when enabled in the config.
    Null,
    Buffer {
        buffer: NativeHandle,
        offset: u64,
        size: u64,
    },
    TexelBuffer {
        buffer: NativeHandle,
        format: Option<TexelFormat>,
        offset: u64,
        size: u64,
    },
    Image {
        view: NativeHandle,
    },
    Sampler {
        sampler: NativeHandle,
    },
    CombinedImageSampler {
        view: NativeHandle,
        sampler: NativeHandle,
    },
    AccelerationStructure {
        handle: NativeHandle,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// `None` for models without groups.
    pub group: Option<u32>,
    pub category: ResourceCategory,
    pub index: u32,
    pub array_element: u32,
    pub kind: DescriptorKind,
    pub payload: DescriptorPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupAllocation {
    Object(Arc<GroupSchema>),
    /// The backend's bindless set. Always last.
    Bindless,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushConstantData {
    pub range: PushConstantRange,
    pub data: Vec<u8>,
}

/// A resource referenced by this binding, kept alive until the binding data is dropped.
#[derive(Clone, Debug)]
pub struct ResourceUsage {
    pub resource: Arc<dyn ResourceView>,
    pub state: ResourceState,
}

#[derive(Clone, Debug)]
pub struct BindingData {
    pub model: BindingModelKind,
    /// In set / table order.
    pub groups: Vec<GroupAllocation>,
    pub writes: Vec<DescriptorWrite>,
    pub push_constants: Vec<PushConstantData>,
    pub resource_states: Vec<ResourceUsage>,
}

impl BindingData {
    fn new(model: BindingModelKind) -> Self {
        Self {
            model,
            groups: Vec::new(),
            writes: Vec::new(),
            push_constants: Vec::new(),
            resource_states: Vec::new(),
        }
    }
    pub fn writes_for_group(&self, group: u32) -> impl Iterator<Item = &DescriptorWrite> {
        self.writes.iter().filter(move |w| w.group == Some(group))
    }
    pub fn find(
        &self,
        group: Option<u32>,
        category: ResourceCategory,
        index: u32,
        array_element: u32,
    ) -> Option<&DescriptorWrite> {
        self.writes.iter().find(|w| {
            w.group == group
                && w.category == category
                && w.index == index
                && w.array_element == array_element
        })
    }
    /// Per-register view of one category, for backends with flat register files.
    pub fn register_table(&self, category: ResourceCategory) -> Vec<Option<&DescriptorPayload>> {
        let len = self
            .writes
            .iter()
            .filter(|w| w.category == category)
            .map(|w| w.index + 1)
            .max()
            .unwrap_or(0);
        let mut table = vec![None; len as usize];
        for write in self.writes.iter().filter(|w| w.category == category) {
            table[write.index as usize] = Some(&write.payload);
        }
        table
    }
}

pub struct BindingDataBuilder<'a, P: UploadPages> {
    model: &'a dyn BindingModel,
    allocator: &'a mut OrdinaryDataAllocator<P>,
    null_descriptors: bool,
    data: BindingData,
}

impl<'a, P: UploadPages> BindingDataBuilder<'a, P> {
    pub fn new(model: &'a dyn BindingModel, allocator: &'a mut OrdinaryDataAllocator<P>) -> Self {
        Self {
            model,
            allocator,
            null_descriptors: false,
            data: BindingData::new(model.kind()),
        }
    }

    pub fn null_descriptors(mut self, enabled: bool) -> Self {
        self.null_descriptors = enabled;
        self
    }

    /// Binds the globals into the root group, then every entry point at its offset.
    ///
    /// `layout` may be a specialization of `root`'s own layout.
    pub fn bind_as_root(
        mut self,
        root: &RootShaderObject,
        layout: &RootShaderObjectLayout,
    ) -> Result<BindingData> {
        debug_assert_eq!(layout.model(), self.model.kind());
        let pipeline = layout.pipeline().ok_or(Error::UnspecializedProgram)?;

        let mut offset = layout.globals_offset();
        offset.group = self.data.groups.len() as u32;
        if let Some(group) = layout.root_group() {
            self.allocate_group(group.clone());
        }
        self.bind_as_constant_buffer(root.globals(), offset, layout.globals())?;

        for (index, entry_point) in layout.entry_points().iter().enumerate() {
            let Some(object) = root.entry_point(index) else {
                self.skip_groups(BindingType::ConstantBuffer, &entry_point.layout);
                continue;
            };
            let mut entry_offset = entry_point.offset;
            entry_offset.group = offset.group;
            self.bind_as_entry_point(object, entry_offset, &entry_point.layout, pipeline)?;
        }

        if pipeline.bindless {
            self.data.groups.push(GroupAllocation::Bindless);
        }
        tracing::trace!(
            groups = self.data.groups.len(),
            writes = self.data.writes.len(),
            push_constants = self.data.push_constants.len(),
            "bound root shader object"
        );
        Ok(self.data)
    }

    fn allocate_group(&mut self, schema: Arc<GroupSchema>) {
        tracing::trace!(
            group = self.data.groups.len(),
            entries = schema.entries.len(),
            "allocating group"
        );
        self.data.groups.push(GroupAllocation::Object(schema));
    }

    fn bind_as_entry_point(
        &mut self,
        object: &ShaderObject,
        mut offset: BindingOffset,
        layout: &ShaderObjectLayout,
        pipeline: &PipelineBindingDesc,
    ) -> Result<()> {
        if !layout.has_push_constants() {
            return self.bind_as_constant_buffer(object, offset, layout);
        }
        if let Some(range) = pipeline
            .push_constant_ranges
            .get(offset.push_constant_range as usize)
        {
            let mut data = ordinary_bytes(object, layout).into_vec();
            data.resize(range.size as usize, 0);
            self.data.push_constants.push(PushConstantData {
                range: *range,
                data,
            });
        }
        offset.push_constant_range += 1;
        self.bind_as_value(object, offset, layout)
    }

    /// Allocates, without writes, the groups an absent sub-object would have opened.
    fn skip_groups(&mut self, binding_type: BindingType, layout: &ShaderObjectLayout) {
        if !self.model.uses_groups() {
            return;
        }
        let mut groups = Vec::new();
        if binding_type == BindingType::ParameterBlock {
            groups.extend(layout.own_group().cloned());
        }
        collect_child_groups(layout, &mut groups);
        for group in groups {
            self.allocate_group(group);
        }
    }

    fn bind_as_parameter_block(
        &mut self,
        object: &ShaderObject,
        offset: BindingOffset,
        layout: &ShaderObjectLayout,
    ) -> Result<()> {
        debug_assert_eq!(offset.group, self.data.groups.len() as u32);
        if let Some(group) = layout.own_group() {
            self.allocate_group(group.clone());
        }
        self.bind_as_constant_buffer(object, offset, layout)
    }

    fn bind_as_constant_buffer(
        &mut self,
        object: &ShaderObject,
        mut offset: BindingOffset,
        layout: &ShaderObjectLayout,
    ) -> Result<()> {
        self.bind_ordinary_data_if_needed(object, &mut offset, layout)?;
        self.bind_as_value(object, offset, layout)
    }

    fn bind_ordinary_data_if_needed(
        &mut self,
        object: &ShaderObject,
        offset: &mut BindingOffset,
        layout: &ShaderObjectLayout,
    ) -> Result<()> {
        let Some(coordinate) = layout.ordinary_data_coordinate() else {
            return Ok(());
        };
        let size = layout.total_ordinary_data_size() as u64;
        let allocation = self.allocator.allocate(size)?;
        self.allocator
            .write(&allocation, 0, &ordinary_bytes(object, layout))?;
        tracing::trace!(
            type_name = layout.name(),
            size,
            offset = allocation.offset,
            "uploaded ordinary data"
        );
        let index = offset.get(coordinate.category) + coordinate.index;
        self.push_write(
            offset.group,
            coordinate.category,
            index,
            0,
            DescriptorKind::UniformBuffer,
            DescriptorPayload::Buffer {
                buffer: allocation.buffer,
                offset: allocation.offset,
                size,
            },
        );
        offset.categories.add(coordinate.category, 1);
        Ok(())
    }

    fn bind_as_value(
        &mut self,
        object: &ShaderObject,
        offset: BindingOffset,
        layout: &ShaderObjectLayout,
    ) -> Result<()> {
        for range in layout.binding_ranges() {
            let (Some(coordinate), Some(kind)) = (range.coordinate, range.kind) else {
                continue;
            };
            let base = offset.get(coordinate.category) + coordinate.index;
            for element in 0..range.count {
                let (index, array_element) = self.model.element_coordinate(base, element);
                let payload = object
                    .slots()
                    .get((range.slot_index + element) as usize)
                    .and_then(|slot| self.resolve(range.binding_type, slot));
                match payload {
                    Some(payload) => self.push_write(
                        offset.group,
                        coordinate.category,
                        index,
                        array_element,
                        kind,
                        payload,
                    ),
                    None if self.null_descriptors => self.push_write(
                        offset.group,
                        coordinate.category,
                        index,
                        array_element,
                        kind,
                        DescriptorPayload::Null,
                    ),
                    None => {
                        tracing::trace!(index, array_element, "skipping empty slot");
                    }
                }
            }
        }

        // Group offsets of sub-object ranges count from the first group opened below this object.
        let child_groups = BindingOffset {
            group: self.data.groups.len() as u32,
            push_constant_range: offset.push_constant_range,
            ..Default::default()
        };
        for sub in layout.sub_object_ranges() {
            let range = &layout.binding_ranges()[sub.binding_range as usize];
            if !range.binding_type.is_sub_object() {
                continue;
            }
            let Some(child_layout) = sub.layout.as_ref() else {
                tracing::trace!(
                    type_name = layout.name(),
                    binding_range = sub.binding_range,
                    "skipping unspecialized existential range"
                );
                continue;
            };
            for element in 0..range.count {
                let Some(child) = object.child(range.sub_object_index + element) else {
                    tracing::trace!(
                        type_name = layout.name(),
                        binding_range = sub.binding_range,
                        element,
                        "skipping missing sub-object"
                    );
                    self.skip_groups(range.binding_type, child_layout);
                    continue;
                };
                let child_offset = offset.merge(&sub.offset).merge_scaled(&sub.stride, element);
                match range.binding_type {
                    BindingType::ParameterBlock if self.model.uses_groups() => {
                        let block_offset = child_groups
                            .merge(&sub.offset)
                            .merge_scaled(&sub.stride, element);
                        self.bind_as_parameter_block(child, block_offset, child_layout)?
                    }
                    BindingType::ExistentialValue => {
                        if child.layout().name() != child_layout.name() {
                            tracing::warn!(
                                expected = child_layout.name(),
                                found = child.layout().name(),
                                "existential object does not match the specialized layout"
                            );
                            self.skip_groups(range.binding_type, child_layout);
                            continue;
                        }
                        self.bind_as_value(child, child_offset, child_layout)?
                    }
                    _ => self.bind_as_constant_buffer(child, child_offset, child_layout)?,
                }
            }
        }
        Ok(())
    }

    fn resolve(&mut self, binding_type: BindingType, slot: &ResourceSlot) -> Option<DescriptorPayload> {
        let resource = slot.resource()?;
        let handle = resource.native_handle();
        let payload = match binding_type {
            BindingType::Texture | BindingType::MutableTexture => {
                DescriptorPayload::Image { view: handle }
            }
            BindingType::Sampler => DescriptorPayload::Sampler { sampler: handle },
            BindingType::CombinedTextureSampler => DescriptorPayload::CombinedImageSampler {
                view: handle,
                sampler: slot.sampler()?.native_handle(),
            },
            BindingType::RawBuffer | BindingType::MutableRawBuffer => DescriptorPayload::Buffer {
                buffer: handle,
                offset: slot.range().offset,
                size: slot.range().size,
            },
            BindingType::TypedBuffer | BindingType::MutableTypedBuffer => {
                DescriptorPayload::TexelBuffer {
                    buffer: handle,
                    format: slot.format(),
                    offset: slot.range().offset,
                    size: slot.range().size,
                }
            }
            BindingType::AccelerationStructure => {
                DescriptorPayload::AccelerationStructure { handle }
            }
            _ => return None,
        };
        if let Some(state) = ResourceState::required_for(binding_type) {
            self.data
                .resource_states
                .push(ResourceUsage { resource, state });
        }
        Some(payload)
    }

    fn push_write(
        &mut self,
        group: u32,
        category: ResourceCategory,
        index: u32,
        array_element: u32,
        kind: DescriptorKind,
        payload: DescriptorPayload,
    ) {
        self.model.debug_check_capacity(category, index);
        self.data.writes.push(DescriptorWrite {
            group: self.model.uses_groups().then_some(group),
            category,
            index,
            array_element,
            kind,
            payload,
        });
    }
}

/// The object's ordinary data with the payloads of its existential values filled in.
fn ordinary_bytes(object: &ShaderObject, layout: &ShaderObjectLayout) -> SmallVec<[u8; 256]> {
    let size = layout.total_ordinary_data_size() as usize;
    let mut bytes: SmallVec<[u8; 256]> = SmallVec::from_elem(0, size);
    let own = object.data();
    let len = own.len().min(size);
    bytes[..len].copy_from_slice(&own[..len]);
    for range in layout.binding_ranges() {
        if range.binding_type != BindingType::ExistentialValue || !range.takes_sub_objects() {
            continue;
        }
        for element in 0..range.count {
            let Some(child) = object.child(range.sub_object_index + element) else {
                continue;
            };
            let start = (range.uniform_offset + element * range.uniform_stride) as usize;
            if start >= size {
                continue;
            }
            let data = child.data();
            let mut len = data.len().min(size - start);
            if range.uniform_stride > 0 {
                len = len.min(range.uniform_stride as usize);
            }
            bytes[start..start + len].copy_from_slice(&data[..len]);
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocator::HostPages,
        backend::BackendLimits,
        config::BindingConfig,
        layout::LayoutCache,
        model::{DescriptorSetModel, FlatRegisterModel, RootSignatureModel},
        reflection::{
            BindingRangeReflection, ProgramReflection, ShaderStage, TypeLayoutReflection,
        },
        resource::{Binding, BufferRange, ResourceKind},
        test_utils::{buffer, resource, sampler, texture},
    };

    struct Fixture {
        model: Arc<dyn BindingModel>,
        layout: Arc<RootShaderObjectLayout>,
        allocator: OrdinaryDataAllocator<HostPages>,
    }

    impl Fixture {
        fn new(model: Arc<dyn BindingModel>, program: &ProgramReflection) -> Self {
            Self::with_bindless(model, program, false)
        }
        fn with_bindless(
            model: Arc<dyn BindingModel>,
            program: &ProgramReflection,
            bindless: bool,
        ) -> Self {
            let mut cache = LayoutCache::new(model.clone());
            let layout = RootShaderObjectLayout::create(
                &mut cache,
                program,
                &BackendLimits::default(),
                bindless,
            )
            .unwrap();
            Self {
                allocator: OrdinaryDataAllocator::host(
                    model.min_ordinary_alignment(),
                    &BindingConfig::default(),
                ),
                model,
                layout: Arc::new(layout),
            }
        }
        fn root(&self) -> RootShaderObject {
            RootShaderObject::new(self.layout.clone())
        }
        fn bind(&mut self, root: &RootShaderObject) -> BindingData {
            BindingDataBuilder::new(self.model.as_ref(), &mut self.allocator)
                .bind_as_root(root, &self.layout)
                .unwrap()
        }
    }

    fn material_program() -> ProgramReflection {
        ProgramReflection::new(
            TypeLayoutReflection::builder("Material")
                .uniform("tint", 0, 16)
                .resource("albedo", BindingType::Texture, 1)
                .resource("sampler", BindingType::Sampler, 1)
                .build(),
        )
    }

    #[test]
    fn test_handles_round_trip() {
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &material_program());
        let mut root = fixture.root();
        let (albedo, linear) = (texture(42), sampler(7));
        root.write(0, &[1.0f32, 0.5, 0.25, 1.0]).unwrap();
        root.set_binding(0, 0, albedo.clone()).unwrap();
        root.set_binding(1, 0, linear.clone()).unwrap();
        let data = fixture.bind(&root);

        assert_eq!(data.groups.len(), 1);
        assert_eq!(data.writes.len(), 3);
        let ordinary = data.find(Some(0), ResourceCategory::Descriptor, 0, 0).unwrap();
        assert_eq!(ordinary.kind, DescriptorKind::UniformBuffer);
        let DescriptorPayload::Buffer { buffer, offset, size } = ordinary.payload else {
            panic!("expected a buffer");
        };
        assert_eq!(size, 16);
        let allocation = crate::allocator::OrdinaryAllocation {
            page: 0,
            buffer,
            offset,
            size,
        };
        assert_eq!(
            fixture.allocator.bytes(&allocation),
            bytemuck::cast_slice::<f32, u8>(&[1.0, 0.5, 0.25, 1.0])
        );
        assert_eq!(
            data.find(Some(0), ResourceCategory::Descriptor, 1, 0)
                .unwrap()
                .payload,
            DescriptorPayload::Image {
                view: NativeHandle(42)
            }
        );
        assert_eq!(
            data.find(Some(0), ResourceCategory::Descriptor, 2, 0)
                .unwrap()
                .payload,
            DescriptorPayload::Sampler {
                sampler: NativeHandle(7)
            }
        );
        assert_eq!(data.resource_states.len(), 1);
        assert_eq!(data.resource_states[0].state, ResourceState::ShaderResource);
        assert!(Arc::ptr_eq(&data.resource_states[0].resource, &albedo));
    }

    #[test]
    fn test_texture_array_per_model() {
        let program = ProgramReflection::new(
            TypeLayoutReflection::builder("Textures")
                .resource("textures", BindingType::Texture, 4)
                .build(),
        );
        let textures: Vec<_> = (1..=4).map(texture).collect();
        let models: [(Arc<dyn BindingModel>, ResourceCategory, bool); 3] = [
            (
                Arc::new(FlatRegisterModel::default()),
                ResourceCategory::ShaderResource,
                false,
            ),
            (Arc::new(DescriptorSetModel), ResourceCategory::Descriptor, true),
            (Arc::new(RootSignatureModel), ResourceCategory::Descriptor, false),
        ];
        for (model, category, array_elements) in models {
            let mut fixture = Fixture::new(model, &program);
            let mut root = fixture.root();
            for (i, texture) in textures.iter().enumerate() {
                root.set_binding(0, i as u32, texture.clone()).unwrap();
            }
            let data = fixture.bind(&root);
            assert_eq!(data.writes.len(), 4);
            for (i, write) in data.writes.iter().enumerate() {
                let i = i as u32;
                assert_eq!(write.category, category);
                if array_elements {
                    assert_eq!((write.index, write.array_element), (0, i));
                } else {
                    assert_eq!((write.index, write.array_element), (i, 0));
                }
                assert_eq!(
                    write.payload,
                    DescriptorPayload::Image {
                        view: NativeHandle(i as u64 + 1)
                    }
                );
            }
        }
    }

    #[test]
    fn test_empty_slots() {
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &material_program());
        let root = fixture.root();
        let data = fixture.bind(&root);
        // Only the ordinary data buffer.
        assert_eq!(data.writes.len(), 1);
        assert!(data.resource_states.is_empty());

        fixture.allocator.reset();
        let data = BindingDataBuilder::new(fixture.model.as_ref(), &mut fixture.allocator)
            .null_descriptors(true)
            .bind_as_root(&root, &fixture.layout)
            .unwrap();
        assert_eq!(data.writes.len(), 3);
        assert_eq!(data.writes[1].payload, DescriptorPayload::Null);
        assert_eq!(data.writes[2].payload, DescriptorPayload::Null);
    }

    #[test]
    fn test_dropped_resource_is_not_bound() {
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &material_program());
        let mut root = fixture.root();
        let albedo = texture(42);
        root.set_binding(0, 0, albedo.clone()).unwrap();
        drop(albedo);
        let data = fixture.bind(&root);
        assert!(data
            .writes
            .iter()
            .all(|w| w.kind != DescriptorKind::SampledImage));
    }

    #[test]
    fn test_rebinding_is_idempotent() {
        let mut fixture = Fixture::new(Arc::new(RootSignatureModel), &material_program());
        let mut root = fixture.root();
        let (albedo, linear) = (texture(1), sampler(2));
        root.set_binding(0, 0, albedo.clone()).unwrap();
        root.set_binding(1, 0, linear.clone()).unwrap();
        let first = fixture.bind(&root);
        fixture.allocator.reset();
        let second = fixture.bind(&root);
        assert_eq!(first.writes, second.writes);
        assert_eq!(first.groups, second.groups);
        assert_eq!(first.push_constants, second.push_constants);
    }

    fn nested_program() -> ProgramReflection {
        let shadow = TypeLayoutReflection::builder("Shadow")
            .uniform("bias", 0, 16)
            .resource("map", BindingType::Texture, 1)
            .build();
        let lighting = TypeLayoutReflection::builder("Lighting")
            .uniform("count", 0, 4)
            .resource("env", BindingType::Texture, 1)
            .sub_object("shadow", BindingType::ConstantBuffer, shadow, 1)
            .build();
        ProgramReflection::new(
            TypeLayoutReflection::builder("Globals")
                .sub_object("lighting", BindingType::ParameterBlock, lighting, 1)
                .build(),
        )
    }

    fn bind_nested(fixture: &mut Fixture) -> BindingData {
        let mut root = fixture.root();
        let (env, map) = (texture(10), texture(20));
        let lighting = root.object_mut(0, 0).unwrap();
        lighting.set_binding(0, 0, env.clone()).unwrap();
        lighting
            .object_mut(1, 0)
            .unwrap()
            .set_binding(0, 0, map.clone())
            .unwrap();
        fixture.bind(&root)
    }

    #[test]
    fn test_offsets_compose_through_parameter_block() {
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &nested_program());
        let data = bind_nested(&mut fixture);
        // The globals hold nothing of their own; the parameter block is group 0.
        assert_eq!(data.groups.len(), 1);
        let map = data
            .writes
            .iter()
            .find(|w| w.payload == DescriptorPayload::Image { view: NativeHandle(20) })
            .unwrap();
        assert_eq!((map.group, map.index), (Some(0), 3));
        let env = data
            .writes
            .iter()
            .find(|w| w.payload == DescriptorPayload::Image { view: NativeHandle(10) })
            .unwrap();
        assert_eq!((env.group, env.index), (Some(0), 1));
        let buffers: Vec<_> = data
            .writes
            .iter()
            .filter(|w| w.kind == DescriptorKind::UniformBuffer)
            .map(|w| w.index)
            .collect();
        assert_eq!(buffers, vec![0, 2]);
    }

    #[test]
    fn test_offsets_compose_in_flat_registers() {
        let mut fixture = Fixture::new(Arc::new(FlatRegisterModel::default()), &nested_program());
        let data = bind_nested(&mut fixture);
        assert!(data.groups.is_empty());
        let constant_buffers = data.register_table(ResourceCategory::ConstantBuffer);
        assert_eq!(constant_buffers.len(), 2);
        assert!(constant_buffers.iter().all(|b| b.is_some()));
        let textures = data.register_table(ResourceCategory::ShaderResource);
        assert_eq!(
            textures,
            vec![
                Some(&DescriptorPayload::Image { view: NativeHandle(10) }),
                Some(&DescriptorPayload::Image { view: NativeHandle(20) }),
            ]
        );
        assert!(data.writes.iter().all(|w| w.group.is_none()));
    }

    #[test]
    fn test_group_order_matches_pipeline() {
        let inner = TypeLayoutReflection::builder("Inner")
            .resource("t", BindingType::Texture, 1)
            .build();
        let outer = TypeLayoutReflection::builder("Outer")
            .resource("t", BindingType::Texture, 1)
            .sub_object("inner", BindingType::ParameterBlock, inner, 2)
            .build();
        let program = ProgramReflection::new(
            TypeLayoutReflection::builder("Globals")
                .uniform("time", 0, 4)
                .sub_object("outer", BindingType::ParameterBlock, outer, 1)
                .build(),
        );
        let mut fixture = Fixture::with_bindless(Arc::new(DescriptorSetModel), &program, true);
        let root = fixture.root();
        let data = fixture.bind(&root);
        let pipeline = fixture.layout.pipeline().unwrap();
        assert_eq!(data.groups.len() as u32, pipeline.group_count());
        for (allocated, expected) in data.groups.iter().zip(pipeline.groups.iter()) {
            assert_eq!(allocated, &GroupAllocation::Object(expected.clone()));
        }
        assert_eq!(data.groups.last(), Some(&GroupAllocation::Bindless));
    }

    #[test]
    fn test_missing_parameter_block_keeps_its_group() {
        let inner = TypeLayoutReflection::builder("Inner")
            .resource("t", BindingType::Texture, 1)
            .build();
        let program = ProgramReflection::new(
            TypeLayoutReflection::builder("Globals")
                .uniform("time", 0, 4)
                .sub_object("blocks", BindingType::ParameterBlock, inner, 2)
                .build(),
        );
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &program);
        let mut root = fixture.root();
        assert!(root.take_object(0, 0).unwrap().is_some());
        let t = texture(77);
        root.object_mut(0, 1)
            .unwrap()
            .set_binding(0, 0, t.clone())
            .unwrap();
        let data = fixture.bind(&root);

        let pipeline = fixture.layout.pipeline().unwrap();
        assert_eq!(data.groups.len(), pipeline.groups.len());
        assert_eq!(data.groups.len(), 3);
        assert_eq!(data.writes_for_group(1).count(), 0);
        let write = data
            .writes
            .iter()
            .find(|w| w.payload == DescriptorPayload::Image { view: NativeHandle(77) })
            .unwrap();
        assert_eq!((write.group, write.index), (Some(2), 0));
    }

    #[test]
    fn test_mismatched_existential_keeps_its_groups() {
        let shadow = TypeLayoutReflection::builder("Shadow")
            .resource("map", BindingType::Texture, 1)
            .build();
        let point = TypeLayoutReflection::builder("PointLight")
            .uniform("position", 0, 16)
            .sub_object("shadow", BindingType::ParameterBlock, shadow, 1)
            .build();
        let spot = TypeLayoutReflection::builder("SpotLight")
            .uniform("direction", 0, 16)
            .build();
        let sky = TypeLayoutReflection::builder("Sky")
            .resource("env", BindingType::Texture, 1)
            .build();
        let program = ProgramReflection::new(
            TypeLayoutReflection::builder("Scene<PointLight>")
                .uniform("exposure", 0, 4)
                .range(
                    "light",
                    BindingRangeReflection {
                        element_type: Some(Arc::new(point)),
                        uniform_offset: 16,
                        uniform_stride: 16,
                        specializable: true,
                        ..BindingRangeReflection::new(BindingType::ExistentialValue, 1)
                    },
                )
                .sub_object("sky", BindingType::ParameterBlock, sky, 1)
                .uniform_size(32)
                .build(),
        );
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &program);
        let mut root = fixture.root();
        let mut cache = LayoutCache::new(fixture.model.clone());
        root.set_object(0, 0, ShaderObject::new(cache.get_or_build(&spot).unwrap()))
            .unwrap();
        let env = texture(12);
        root.object_mut(1, 0)
            .unwrap()
            .set_binding(0, 0, env.clone())
            .unwrap();
        let data = fixture.bind(&root);

        let pipeline = fixture.layout.pipeline().unwrap();
        assert_eq!(data.groups.len(), pipeline.groups.len());
        assert_eq!(data.groups.len(), 3);
        // The shadow block of the expected light stays allocated but empty.
        assert_eq!(data.writes_for_group(1).count(), 0);
        let write = data
            .writes
            .iter()
            .find(|w| w.payload == DescriptorPayload::Image { view: NativeHandle(12) })
            .unwrap();
        assert_eq!(write.group, Some(2));
    }

    #[test]
    fn test_unspecialized_program_is_not_bindable() {
        let mut program = material_program();
        program
            .specialization_params
            .push(crate::reflection::SpecializationParam {
                name: "T".into(),
                interface: "ILight".into(),
            });
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &program);
        let root = fixture.root();
        let result = BindingDataBuilder::new(fixture.model.as_ref(), &mut fixture.allocator)
            .bind_as_root(&root, &fixture.layout);
        assert!(matches!(result, Err(Error::UnspecializedProgram)));
    }

    #[test]
    fn test_unresolved_existential_is_skipped() {
        let program = ProgramReflection::new(
            TypeLayoutReflection::builder("Scene")
                .resource("albedo", BindingType::Texture, 1)
                .range(
                    "light",
                    BindingRangeReflection::new(BindingType::ExistentialValue, 1),
                )
                .build(),
        );
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &program);
        let mut root = fixture.root();
        let albedo = texture(3);
        root.set_binding(0, 0, albedo.clone()).unwrap();
        let data = fixture.bind(&root);
        assert_eq!(data.writes.len(), 1);
    }

    #[test]
    fn test_existential_bound_as_value() {
        let light = TypeLayoutReflection::builder("PointLight")
            .uniform("position", 0, 16)
            .resource("cookie", BindingType::Texture, 1)
            .build();
        let program = ProgramReflection::new(
            TypeLayoutReflection::builder("Scene<PointLight>")
                .uniform("exposure", 0, 4)
                .range(
                    "light",
                    BindingRangeReflection {
                        element_type: Some(Arc::new(light.clone())),
                        uniform_offset: 16,
                        uniform_stride: 16,
                        specializable: true,
                        ..BindingRangeReflection::new(BindingType::ExistentialValue, 1)
                    },
                )
                .uniform_size(32)
                .build(),
        );
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &program);
        let mut root = fixture.root();
        let mut cache = LayoutCache::new(fixture.model.clone());
        let mut point = ShaderObject::new(cache.get_or_build(&light).unwrap());
        point.write(0, &[1.0f32, 2.0, 3.0, 1.0]).unwrap();
        let cookie = texture(5);
        point.set_binding(0, 0, cookie.clone()).unwrap();
        root.set_object(0, 0, point).unwrap();

        let data = fixture.bind(&root);
        assert_eq!(data.writes.len(), 2);
        let DescriptorPayload::Buffer { buffer, offset, size } = data.writes[0].payload else {
            panic!("expected the ordinary data buffer first");
        };
        let allocation = crate::allocator::OrdinaryAllocation {
            page: 0,
            buffer,
            offset,
            size,
        };
        assert_eq!(
            &fixture.allocator.bytes(&allocation)[16..32],
            bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0, 3.0, 1.0])
        );
        assert_eq!(data.writes[1].index, 1);
        assert_eq!(
            data.writes[1].payload,
            DescriptorPayload::Image { view: NativeHandle(5) }
        );
    }

    #[test]
    fn test_entry_point_push_constants() {
        let params = TypeLayoutReflection::builder("MainParams")
            .uniform("scale", 0, 8)
            .resource("output", BindingType::MutableTexture, 1)
            .build();
        let program = material_program().with_entry_point("main", ShaderStage::Compute, params);
        let mut fixture = Fixture::new(Arc::new(DescriptorSetModel), &program);
        let mut root = fixture.root();
        let output = texture(9);
        let entry_point = root.entry_point_mut(0).unwrap();
        entry_point.write(0, &[2.0f32, 3.0]).unwrap();
        entry_point.set_binding(0, 0, output.clone()).unwrap();
        let data = fixture.bind(&root);

        assert_eq!(data.push_constants.len(), 1);
        assert_eq!(data.push_constants[0].range.stage, ShaderStage::Compute);
        assert_eq!(
            data.push_constants[0].data,
            bytemuck::cast_slice::<f32, u8>(&[2.0, 3.0])
        );
        let write = data.find(Some(0), ResourceCategory::Descriptor, 3, 0).unwrap();
        assert_eq!(write.kind, DescriptorKind::StorageImage);
        assert_eq!(data.resource_states.len(), 1);
        assert_eq!(data.resource_states[0].state, ResourceState::UnorderedAccess);
    }

    #[test]
    fn test_entry_point_constant_buffer_on_flat_model() {
        let params = TypeLayoutReflection::builder("MainParams")
            .uniform("scale", 0, 8)
            .build();
        let program = material_program().with_entry_point("main", ShaderStage::Compute, params);
        let mut fixture = Fixture::new(Arc::new(FlatRegisterModel::default()), &program);
        let root = fixture.root();
        let data = fixture.bind(&root);
        assert!(data.push_constants.is_empty());
        let constant_buffers = data.register_table(ResourceCategory::ConstantBuffer);
        assert_eq!(constant_buffers.len(), 2);
        let Some(DescriptorPayload::Buffer { size, .. }) = constant_buffers[1] else {
            panic!("expected the entry point's constant buffer at b1");
        };
        assert_eq!(*size, 8);
    }

    #[test]
    fn test_resource_states() {
        let program = ProgramReflection::new(
            TypeLayoutReflection::builder("Resources")
                .resource("input", BindingType::RawBuffer, 1)
                .resource("output", BindingType::MutableRawBuffer, 1)
                .resource("scene", BindingType::AccelerationStructure, 1)
                .resource("texels", BindingType::MutableTypedBuffer, 1)
                .build(),
        );
        let mut fixture = Fixture::new(Arc::new(RootSignatureModel), &program);
        let mut root = fixture.root();
        let (input, output, scene, texels) = (
            buffer(1),
            buffer(2),
            resource(ResourceKind::AccelerationStructure, 3),
            buffer(4),
        );
        root.set_binding(
            0,
            0,
            Binding::Buffer {
                buffer: input.clone(),
                range: BufferRange { offset: 64, size: 128 },
            },
        )
        .unwrap();
        root.set_binding(1, 0, output.clone()).unwrap();
        root.set_binding(2, 0, scene.clone()).unwrap();
        root.set_binding(3, 0, texels.clone()).unwrap();
        let data = fixture.bind(&root);
        let states: Vec<_> = data.resource_states.iter().map(|u| u.state).collect();
        assert_eq!(
            states,
            vec![
                ResourceState::ShaderResource,
                ResourceState::UnorderedAccess,
                ResourceState::AccelerationStructureRead,
                ResourceState::UnorderedAccess,
            ]
        );
        assert_eq!(
            data.writes[0].payload,
            DescriptorPayload::Buffer {
                buffer: NativeHandle(1),
                offset: 64,
                size: 128
            }
        );
    }
}
