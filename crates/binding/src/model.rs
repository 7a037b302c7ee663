//! Binding models: how a backend addresses shader resources.
//!
//! A [`BindingModel`] decides which category a binding type consumes, how many units a range
//! of `n` elements takes, and whether parameter blocks open a fresh group. The layout builder
//! and the binding data builder are written against this trait only.
use crate::{
    reflection::{BindingType, VariablePlacement},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceCategory {
    ConstantBuffer = 0,
    ShaderResource = 1,
    UnorderedAccess = 2,
    Sampler = 3,
    /// Unified descriptor slots: Vulkan bindings, or D3D12 CBV/SRV/UAV table entries.
    Descriptor = 4,
}

impl ResourceCategory {
    pub const COUNT: usize = 5;
    pub const ALL: [ResourceCategory; Self::COUNT] = [
        ResourceCategory::ConstantBuffer,
        ResourceCategory::ShaderResource,
        ResourceCategory::UnorderedAccess,
        ResourceCategory::Sampler,
        ResourceCategory::Descriptor,
    ];
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One counter per [`ResourceCategory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryVec([u32; ResourceCategory::COUNT]);

impl CategoryVec {
    pub fn get(&self, category: ResourceCategory) -> u32 {
        self.0[category.index()]
    }
    pub fn set(&mut self, category: ResourceCategory, value: u32) {
        self.0[category.index()] = value;
    }
    pub fn add(&mut self, category: ResourceCategory, value: u32) {
        self.0[category.index()] += value;
    }
    pub fn merge(&self, other: &CategoryVec) -> CategoryVec {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a += *b;
        }
        out
    }
    pub fn scaled(&self, n: u32) -> CategoryVec {
        CategoryVec(self.0.map(|a| a * n))
    }
    pub fn max(&self, other: &CategoryVec) -> CategoryVec {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a = (*a).max(*b);
        }
        out
    }
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|a| *a == 0)
    }
    pub fn iter(&self) -> impl Iterator<Item = (ResourceCategory, u32)> + '_ {
        ResourceCategory::ALL
            .iter()
            .map(|c| (*c, self.get(*c)))
            .filter(|(_, n)| *n != 0)
    }
}

/// Where an object's data lands in the backend's binding space.
///
/// Offsets compose by addition, independently per component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingOffset {
    pub categories: CategoryVec,
    /// Descriptor set / root table group.
    pub group: u32,
    pub push_constant_range: u32,
}

impl BindingOffset {
    pub fn get(&self, category: ResourceCategory) -> u32 {
        self.categories.get(category)
    }
    pub fn merge(&self, other: &BindingOffset) -> BindingOffset {
        BindingOffset {
            categories: self.categories.merge(&other.categories),
            group: self.group + other.group,
            push_constant_range: self.push_constant_range + other.push_constant_range,
        }
    }
    /// `self + stride * n`.
    pub fn merge_scaled(&self, stride: &BindingOffset, n: u32) -> BindingOffset {
        BindingOffset {
            categories: self.categories.merge(&stride.categories.scaled(n)),
            group: self.group + stride.group * n,
            push_constant_range: self.push_constant_range + stride.push_constant_range * n,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingCoordinate {
    pub category: ResourceCategory,
    pub index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    UniformTexelBuffer,
    StorageTexelBuffer,
    SampledImage,
    StorageImage,
    Sampler,
    CombinedImageSampler,
    AccelerationStructure,
}

impl DescriptorKind {
    pub fn for_binding_type(binding_type: BindingType) -> Option<Self> {
        Some(match binding_type {
            BindingType::Texture => DescriptorKind::SampledImage,
            BindingType::MutableTexture => DescriptorKind::StorageImage,
            BindingType::Sampler => DescriptorKind::Sampler,
            BindingType::CombinedTextureSampler => DescriptorKind::CombinedImageSampler,
            BindingType::RawBuffer | BindingType::MutableRawBuffer => DescriptorKind::StorageBuffer,
            BindingType::TypedBuffer => DescriptorKind::UniformTexelBuffer,
            BindingType::MutableTypedBuffer => DescriptorKind::StorageTexelBuffer,
            BindingType::ConstantBuffer => DescriptorKind::UniformBuffer,
            BindingType::AccelerationStructure => DescriptorKind::AccelerationStructure,
            BindingType::ParameterBlock
            | BindingType::ExistentialValue
            | BindingType::VaryingInput
            | BindingType::VaryingOutput
            | BindingType::Unknown => return None,
        })
    }
}

/// The state a bound resource must be in while the draw or dispatch executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    AccelerationStructureRead,
}

impl ResourceState {
    pub fn required_for(binding_type: BindingType) -> Option<Self> {
        match binding_type {
            BindingType::Texture
            | BindingType::CombinedTextureSampler
            | BindingType::RawBuffer
            | BindingType::TypedBuffer => Some(ResourceState::ShaderResource),
            BindingType::MutableTexture
            | BindingType::MutableRawBuffer
            | BindingType::MutableTypedBuffer => Some(ResourceState::UnorderedAccess),
            BindingType::AccelerationStructure => Some(ResourceState::AccelerationStructureRead),
            BindingType::ConstantBuffer => Some(ResourceState::ConstantBuffer),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingModelKind {
    FlatRegister,
    DescriptorSet,
    RootSignature,
}

pub trait BindingModel: Debug + Send + Sync {
    fn kind(&self) -> BindingModelKind;

    /// Categories this model assigns indices in.
    fn categories(&self) -> &'static [ResourceCategory];

    /// `Ok(None)` for binding types that never take a resource slot of their own:
    /// sub-object ranges and varyings.
    fn category_for(&self, binding_type: BindingType) -> Result<Option<ResourceCategory>>;

    fn ordinary_data_category(&self) -> ResourceCategory;

    /// Units of its category consumed by a range of `count` elements.
    fn range_units(&self, count: u32) -> u32;

    /// Returns `(index, array_element)` of one element of a range starting at `base`.
    fn element_coordinate(&self, base: u32, element: u32) -> (u32, u32);

    /// Whether parameter blocks open a fresh descriptor set or table.
    fn uses_groups(&self) -> bool;

    fn supports_push_constants(&self) -> bool;

    fn offset_from_placement(&self, placement: &VariablePlacement) -> BindingOffset;

    fn min_ordinary_alignment(&self) -> u64;

    /// Register limits are enforced upstream; this only catches bugs in debug builds.
    fn debug_check_capacity(&self, _category: ResourceCategory, _index: u32) {}
}

fn unsupported(model: BindingModelKind, binding_type: BindingType) -> Error {
    Error::UnsupportedBindingType {
        model,
        binding_type,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterLimits {
    pub constant_buffer: u32,
    pub shader_resource: u32,
    pub unordered_access: u32,
    pub sampler: u32,
}

impl Default for RegisterLimits {
    fn default() -> Self {
        Self {
            constant_buffer: 14,
            shader_resource: 128,
            unordered_access: 64,
            sampler: 16,
        }
    }
}

/// Fixed register files per category (`b`, `t`, `u`, `s`). Arrays take consecutive registers.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatRegisterModel {
    pub limits: RegisterLimits,
}

impl BindingModel for FlatRegisterModel {
    fn kind(&self) -> BindingModelKind {
        BindingModelKind::FlatRegister
    }
    fn categories(&self) -> &'static [ResourceCategory] {
        &[
            ResourceCategory::ConstantBuffer,
            ResourceCategory::ShaderResource,
            ResourceCategory::UnorderedAccess,
            ResourceCategory::Sampler,
        ]
    }
    fn category_for(&self, binding_type: BindingType) -> Result<Option<ResourceCategory>> {
        Ok(Some(match binding_type {
            BindingType::Texture
            | BindingType::RawBuffer
            | BindingType::TypedBuffer
            | BindingType::AccelerationStructure => ResourceCategory::ShaderResource,
            BindingType::MutableTexture
            | BindingType::MutableRawBuffer
            | BindingType::MutableTypedBuffer => ResourceCategory::UnorderedAccess,
            BindingType::Sampler => ResourceCategory::Sampler,
            BindingType::ConstantBuffer
            | BindingType::ParameterBlock
            | BindingType::ExistentialValue
            | BindingType::VaryingInput
            | BindingType::VaryingOutput => return Ok(None),
            BindingType::CombinedTextureSampler | BindingType::Unknown => {
                return Err(unsupported(self.kind(), binding_type))
            }
        }))
    }
    fn ordinary_data_category(&self) -> ResourceCategory {
        ResourceCategory::ConstantBuffer
    }
    fn range_units(&self, count: u32) -> u32 {
        count
    }
    fn element_coordinate(&self, base: u32, element: u32) -> (u32, u32) {
        (base + element, 0)
    }
    fn uses_groups(&self) -> bool {
        false
    }
    fn supports_push_constants(&self) -> bool {
        false
    }
    fn offset_from_placement(&self, placement: &VariablePlacement) -> BindingOffset {
        let mut offset = BindingOffset::default();
        let categories = &mut offset.categories;
        categories.set(ResourceCategory::ConstantBuffer, placement.constant_buffer);
        categories.set(ResourceCategory::ShaderResource, placement.shader_resource);
        categories.set(ResourceCategory::UnorderedAccess, placement.unordered_access);
        categories.set(ResourceCategory::Sampler, placement.sampler);
        offset
    }
    fn min_ordinary_alignment(&self) -> u64 {
        16
    }
    fn debug_check_capacity(&self, category: ResourceCategory, index: u32) {
        let limit = match category {
            ResourceCategory::ConstantBuffer => self.limits.constant_buffer,
            ResourceCategory::ShaderResource => self.limits.shader_resource,
            ResourceCategory::UnorderedAccess => self.limits.unordered_access,
            ResourceCategory::Sampler => self.limits.sampler,
            ResourceCategory::Descriptor => 0,
        };
        debug_assert!(
            index < limit,
            "{:?} register {} exceeds limit {}",
            category,
            index,
            limit
        );
    }
}

/// Vulkan style descriptor sets. A range takes one binding; its elements are array elements.
#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorSetModel;

impl BindingModel for DescriptorSetModel {
    fn kind(&self) -> BindingModelKind {
        BindingModelKind::DescriptorSet
    }
    fn categories(&self) -> &'static [ResourceCategory] {
        &[ResourceCategory::Descriptor]
    }
    fn category_for(&self, binding_type: BindingType) -> Result<Option<ResourceCategory>> {
        match binding_type {
            BindingType::Unknown => Err(unsupported(self.kind(), binding_type)),
            ty if ty.is_sub_object() || ty.is_varying() => Ok(None),
            _ => Ok(Some(ResourceCategory::Descriptor)),
        }
    }
    fn ordinary_data_category(&self) -> ResourceCategory {
        ResourceCategory::Descriptor
    }
    fn range_units(&self, _count: u32) -> u32 {
        1
    }
    fn element_coordinate(&self, base: u32, element: u32) -> (u32, u32) {
        (base, element)
    }
    fn uses_groups(&self) -> bool {
        true
    }
    fn supports_push_constants(&self) -> bool {
        true
    }
    fn offset_from_placement(&self, placement: &VariablePlacement) -> BindingOffset {
        let mut offset = BindingOffset {
            group: placement.register_space,
            push_constant_range: placement.push_constant_buffer,
            ..Default::default()
        };
        offset
            .categories
            .set(ResourceCategory::Descriptor, placement.descriptor_slot);
        offset
    }
    fn min_ordinary_alignment(&self) -> u64 {
        256
    }
}

/// D3D12 style root signature: a CBV/SRV/UAV table and a sampler table per group.
#[derive(Clone, Copy, Debug, Default)]
pub struct RootSignatureModel;

impl BindingModel for RootSignatureModel {
    fn kind(&self) -> BindingModelKind {
        BindingModelKind::RootSignature
    }
    fn categories(&self) -> &'static [ResourceCategory] {
        &[ResourceCategory::Descriptor, ResourceCategory::Sampler]
    }
    fn category_for(&self, binding_type: BindingType) -> Result<Option<ResourceCategory>> {
        match binding_type {
            BindingType::Unknown | BindingType::CombinedTextureSampler => {
                Err(unsupported(self.kind(), binding_type))
            }
            BindingType::Sampler => Ok(Some(ResourceCategory::Sampler)),
            ty if ty.is_sub_object() || ty.is_varying() => Ok(None),
            _ => Ok(Some(ResourceCategory::Descriptor)),
        }
    }
    fn ordinary_data_category(&self) -> ResourceCategory {
        ResourceCategory::Descriptor
    }
    fn range_units(&self, count: u32) -> u32 {
        count
    }
    fn element_coordinate(&self, base: u32, element: u32) -> (u32, u32) {
        (base + element, 0)
    }
    fn uses_groups(&self) -> bool {
        true
    }
    fn supports_push_constants(&self) -> bool {
        true
    }
    fn offset_from_placement(&self, placement: &VariablePlacement) -> BindingOffset {
        let mut offset = BindingOffset {
            group: placement.register_space,
            push_constant_range: placement.push_constant_buffer,
            ..Default::default()
        };
        offset
            .categories
            .set(ResourceCategory::Descriptor, placement.descriptor_slot);
        offset
            .categories
            .set(ResourceCategory::Sampler, placement.sampler);
        offset
    }
    fn min_ordinary_alignment(&self) -> u64 {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset(cb: u32, sr: u32, group: u32) -> BindingOffset {
        let mut offset = BindingOffset {
            group,
            ..Default::default()
        };
        offset.categories.set(ResourceCategory::ConstantBuffer, cb);
        offset.categories.set(ResourceCategory::ShaderResource, sr);
        offset
    }

    #[test]
    fn test_merge_is_per_category() {
        let a = offset(1, 0, 0);
        let b = offset(0, 3, 2);
        let merged = a.merge(&b);
        assert_eq!(merged.get(ResourceCategory::ConstantBuffer), 1);
        assert_eq!(merged.get(ResourceCategory::ShaderResource), 3);
        assert_eq!(merged.get(ResourceCategory::Sampler), 0);
        assert_eq!(merged.group, 2);
        assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn test_merge_is_associative() {
        let a = offset(1, 2, 0);
        let b = offset(3, 0, 1);
        let c = offset(0, 5, 4);
        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn test_merge_scaled() {
        let base = offset(1, 0, 0);
        let stride = offset(2, 3, 1);
        let third = base.merge_scaled(&stride, 3);
        assert_eq!(third.get(ResourceCategory::ConstantBuffer), 7);
        assert_eq!(third.get(ResourceCategory::ShaderResource), 9);
        assert_eq!(third.group, 3);
        assert_eq!(base.merge_scaled(&stride, 0), base);
    }

    #[test]
    fn test_flat_categories() {
        let model = FlatRegisterModel::default();
        assert_eq!(
            model.category_for(BindingType::Texture).unwrap(),
            Some(ResourceCategory::ShaderResource)
        );
        assert_eq!(
            model.category_for(BindingType::MutableRawBuffer).unwrap(),
            Some(ResourceCategory::UnorderedAccess)
        );
        assert_eq!(model.category_for(BindingType::ConstantBuffer).unwrap(), None);
        assert_eq!(model.category_for(BindingType::VaryingInput).unwrap(), None);
        assert!(matches!(
            model.category_for(BindingType::CombinedTextureSampler),
            Err(Error::UnsupportedBindingType { .. })
        ));
    }

    #[test]
    fn test_unknown_is_rejected_everywhere() {
        let models: [&dyn BindingModel; 3] = [
            &FlatRegisterModel::default(),
            &DescriptorSetModel,
            &RootSignatureModel,
        ];
        for model in models {
            assert!(model.category_for(BindingType::Unknown).is_err());
        }
    }

    #[test]
    fn test_element_coordinates() {
        assert_eq!(DescriptorSetModel.element_coordinate(3, 2), (3, 2));
        assert_eq!(RootSignatureModel.element_coordinate(3, 2), (5, 0));
        assert_eq!(DescriptorSetModel.range_units(4), 1);
        assert_eq!(RootSignatureModel.range_units(4), 4);
    }

    #[test]
    fn test_placement() {
        let placement = VariablePlacement {
            descriptor_slot: 4,
            register_space: 1,
            sampler: 2,
            push_constant_buffer: 1,
            ..Default::default()
        };
        let offset = RootSignatureModel.offset_from_placement(&placement);
        assert_eq!(offset.get(ResourceCategory::Descriptor), 4);
        assert_eq!(offset.get(ResourceCategory::Sampler), 2);
        assert_eq!(offset.group, 1);
        assert_eq!(offset.push_constant_range, 1);
        let offset = DescriptorSetModel.offset_from_placement(&placement);
        assert_eq!(offset.get(ResourceCategory::Sampler), 0);
    }
}
