mod builder;
mod root;

pub use builder::*;
pub use root::*;
pub(crate) use root::collect_child_groups;

use crate::{
    model::{
        BindingCoordinate, BindingModelKind, BindingOffset, CategoryVec, DescriptorKind,
        ResourceCategory,
    },
    reflection::BindingType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry of a descriptor set or root table: `count` descriptors of `kind`
/// starting at `index` in `category`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupEntry {
    pub category: ResourceCategory,
    pub index: u32,
    pub count: u32,
    pub kind: DescriptorKind,
}

impl GroupEntry {
    pub fn shifted(&self, by: &CategoryVec) -> GroupEntry {
        GroupEntry {
            index: self.index + by.get(self.category),
            ..*self
        }
    }
}

/// The shape of one descriptor set / root table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSchema {
    pub entries: Vec<GroupEntry>,
}

impl GroupSchema {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn descriptor_count(&self, kind: DescriptorKind) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.count)
            .sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrdinaryDataMode {
    /// Uploaded into a constant buffer bound first in the object's binding space.
    Buffer,
    /// Entry point parameters delivered as push constants / root constants.
    PushConstant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingRangeInfo {
    pub binding_type: BindingType,
    pub count: u32,
    /// First index into the object's resource slots. Only meaningful when [`Self::coordinate`] is set.
    pub slot_index: u32,
    /// First index into the object's sub-objects. Only meaningful when [`Self::sub_object_range`] is set.
    pub sub_object_index: u32,
    /// Relative to the object's element origin, after its ordinary data buffer.
    pub coordinate: Option<BindingCoordinate>,
    pub kind: Option<DescriptorKind>,
    pub sub_object_range: Option<u32>,
    pub uniform_offset: u32,
    pub uniform_stride: u32,
    pub specializable: bool,
}

impl BindingRangeInfo {
    pub fn takes_slots(&self) -> bool {
        self.coordinate.is_some()
    }
    pub fn takes_sub_objects(&self) -> bool {
        self.sub_object_range.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubObjectRangeInfo {
    pub binding_range: u32,
    /// `None` for existential ranges that have not been specialized.
    pub layout: Option<Arc<ShaderObjectLayout>>,
    /// Offset of the first element relative to the parent's element origin.
    /// For parameter blocks, `group` counts from the first group after the parent's own.
    pub offset: BindingOffset,
    pub stride: BindingOffset,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub uniform_offset: u32,
    pub uniform_size: u32,
    pub uniform_stride: u32,
    pub binding_range: Option<u32>,
}

/// Backend-neutral description of how an object of one shader type maps onto
/// resource slots, sub-objects and ordinary data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderObjectLayout {
    pub(crate) name: String,
    pub(crate) model: BindingModelKind,
    pub(crate) ordinary_size: u32,
    pub(crate) ordinary_mode: OrdinaryDataMode,
    pub(crate) ordinary_category: ResourceCategory,
    pub(crate) binding_ranges: Vec<BindingRangeInfo>,
    pub(crate) sub_object_ranges: Vec<SubObjectRangeInfo>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) slot_count: u32,
    pub(crate) sub_object_count: u32,
    pub(crate) element_footprint: CategoryVec,
    pub(crate) element_entries: Vec<GroupEntry>,
    pub(crate) own_group: Option<Arc<GroupSchema>>,
    pub(crate) child_group_count: u32,
    pub(crate) total_resource_count: u32,
}

impl ShaderObjectLayout {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn model(&self) -> BindingModelKind {
        self.model
    }
    pub fn binding_range_count(&self) -> u32 {
        self.binding_ranges.len() as u32
    }
    pub fn binding_range(&self, index: u32) -> Option<&BindingRangeInfo> {
        self.binding_ranges.get(index as usize)
    }
    pub fn binding_ranges(&self) -> &[BindingRangeInfo] {
        &self.binding_ranges
    }
    pub fn sub_object_range_count(&self) -> u32 {
        self.sub_object_ranges.len() as u32
    }
    pub fn sub_object_range(&self, index: u32) -> Option<&SubObjectRangeInfo> {
        self.sub_object_ranges.get(index as usize)
    }
    pub fn sub_object_ranges(&self) -> &[SubObjectRangeInfo] {
        &self.sub_object_ranges
    }
    /// The sub-object range backing binding range `binding_range`, if it holds sub-objects.
    pub fn sub_object_range_for(&self, binding_range: u32) -> Option<&SubObjectRangeInfo> {
        self.binding_range(binding_range)?
            .sub_object_range
            .and_then(|i| self.sub_object_range(i))
    }
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }
    pub fn sub_object_count(&self) -> u32 {
        self.sub_object_count
    }
    pub fn total_ordinary_data_size(&self) -> u32 {
        self.ordinary_size
    }
    pub fn ordinary_data_mode(&self) -> OrdinaryDataMode {
        self.ordinary_mode
    }
    pub fn has_ordinary_data_buffer(&self) -> bool {
        self.ordinary_mode == OrdinaryDataMode::Buffer && self.ordinary_size > 0
    }
    pub fn has_push_constants(&self) -> bool {
        self.ordinary_mode == OrdinaryDataMode::PushConstant && self.ordinary_size > 0
    }
    /// Where the ordinary data buffer is bound, relative to the object's own origin.
    pub fn ordinary_data_coordinate(&self) -> Option<BindingCoordinate> {
        self.has_ordinary_data_buffer().then_some(BindingCoordinate {
            category: self.ordinary_category,
            index: 0,
        })
    }
    pub(crate) fn ordinary_shift(&self) -> CategoryVec {
        let mut shift = CategoryVec::default();
        if self.has_ordinary_data_buffer() {
            shift.set(self.ordinary_category, 1);
        }
        shift
    }
    /// Units consumed when bound as a value: own ranges and inline children.
    pub fn element_footprint(&self) -> CategoryVec {
        self.element_footprint
    }
    /// Units consumed when bound as a constant buffer, including the ordinary data buffer.
    pub fn footprint(&self) -> CategoryVec {
        self.element_footprint.merge(&self.ordinary_shift())
    }
    pub fn element_entries(&self) -> &[GroupEntry] {
        &self.element_entries
    }
    /// Group entries relative to the object's own origin, ordinary data buffer first.
    pub fn container_entries(&self) -> Vec<GroupEntry> {
        let shift = self.ordinary_shift();
        let mut entries = Vec::with_capacity(self.element_entries.len() + 1);
        if let Some(coordinate) = self.ordinary_data_coordinate() {
            entries.push(GroupEntry {
                category: coordinate.category,
                index: coordinate.index,
                count: 1,
                kind: DescriptorKind::UniformBuffer,
            });
        }
        entries.extend(self.element_entries.iter().map(|e| e.shifted(&shift)));
        entries
    }
    /// The group this object fills when bound as a parameter block.
    pub fn own_group(&self) -> Option<&Arc<GroupSchema>> {
        self.own_group.as_ref()
    }
    pub fn child_group_count(&self) -> u32 {
        self.child_group_count
    }
    pub fn total_group_count(&self) -> u32 {
        self.own_group.is_some() as u32 + self.child_group_count
    }
    /// Resource slots reachable from this object, nested sub-objects included.
    pub fn total_resource_count(&self) -> u32 {
        self.total_resource_count
    }
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}
