use super::{
    BindingRangeInfo, FieldInfo, GroupEntry, GroupSchema, OrdinaryDataMode, ShaderObjectLayout,
    SubObjectRangeInfo,
};
use crate::{
    model::{BindingCoordinate, BindingModel, BindingOffset, CategoryVec, DescriptorKind},
    reflection::{BindingType, TypeLayoutReflection},
    Error, Result,
};
use std::{collections::HashMap, sync::Arc};

/// Layouts already built for one binding model, keyed by type name.
///
/// Owned by a program; dropping it drops every layout it built.
#[derive(Debug)]
pub struct LayoutCache {
    model: Arc<dyn BindingModel>,
    layouts: HashMap<(String, OrdinaryDataMode), Arc<ShaderObjectLayout>>,
}

impl LayoutCache {
    pub fn new(model: Arc<dyn BindingModel>) -> Self {
        Self {
            model,
            layouts: HashMap::new(),
        }
    }
    pub fn model(&self) -> &Arc<dyn BindingModel> {
        &self.model
    }
    pub fn len(&self) -> usize {
        self.layouts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
    pub fn clear(&mut self) {
        self.layouts.clear();
    }
    pub fn get_or_build(&mut self, ty: &TypeLayoutReflection) -> Result<Arc<ShaderObjectLayout>> {
        self.get_or_build_with(ty, OrdinaryDataMode::Buffer)
    }
    pub fn get_or_build_with(
        &mut self,
        ty: &TypeLayoutReflection,
        mode: OrdinaryDataMode,
    ) -> Result<Arc<ShaderObjectLayout>> {
        // Anonymous types can't be told apart by name.
        if ty.name.is_empty() {
            return Ok(Arc::new(
                LayoutBuilder::new(self).ordinary_data_mode(mode).build(ty)?,
            ));
        }
        let key = (ty.name.clone(), mode);
        if let Some(layout) = self.layouts.get(&key) {
            return Ok(layout.clone());
        }
        tracing::debug!(type_name = %ty.name, ?mode, "building shader object layout");
        let layout = Arc::new(LayoutBuilder::new(self).ordinary_data_mode(mode).build(ty)?);
        self.layouts.insert(key, layout.clone());
        Ok(layout)
    }
}

/// Turns reflected type layouts into [`ShaderObjectLayout`]s.
///
/// The ordinary data buffer always comes first in its category. Resource ranges follow in
/// declaration order, then sub-object ranges: constant buffers and specialized existential
/// values inline, parameter blocks in fresh groups when the model has them. A parameter
/// block's group offset counts from the first group opened below its parent object.
pub struct LayoutBuilder<'c> {
    cache: &'c mut LayoutCache,
    mode: OrdinaryDataMode,
}

impl<'c> LayoutBuilder<'c> {
    pub fn new(cache: &'c mut LayoutCache) -> Self {
        Self {
            cache,
            mode: OrdinaryDataMode::Buffer,
        }
    }
    /// `PushConstant` falls back to `Buffer` on models without push constants.
    pub fn ordinary_data_mode(mut self, mode: OrdinaryDataMode) -> Self {
        self.mode = mode;
        self
    }
    pub fn build(self, ty: &TypeLayoutReflection) -> Result<ShaderObjectLayout> {
        let model = self.cache.model().clone();
        let mode = if model.supports_push_constants() {
            self.mode
        } else {
            OrdinaryDataMode::Buffer
        };
        let invalid = |reason: String| Error::InvalidReflection {
            type_name: ty.name.clone(),
            reason,
        };

        let mut counters = CategoryVec::default();
        let mut entries: Vec<GroupEntry> = Vec::new();
        let mut binding_ranges = Vec::with_capacity(ty.binding_ranges.len());
        let mut slot_count = 0;
        let mut sub_object_count = 0;
        let mut total_resource_count = 0;

        for range in ty.binding_ranges.iter() {
            let category = model.category_for(range.binding_type)?;
            let mut info = BindingRangeInfo {
                binding_type: range.binding_type,
                count: range.count,
                slot_index: slot_count,
                sub_object_index: sub_object_count,
                coordinate: None,
                kind: DescriptorKind::for_binding_type(range.binding_type),
                sub_object_range: None,
                uniform_offset: range.uniform_offset,
                uniform_stride: range.uniform_stride,
                specializable: range.specializable,
            };
            if let Some(category) = category {
                let base = range
                    .explicit_index
                    .unwrap_or_else(|| counters.get(category));
                let end = base + model.range_units(range.count);
                if end > counters.get(category) {
                    counters.set(category, end);
                }
                info.coordinate = Some(BindingCoordinate {
                    category,
                    index: base,
                });
                if let Some(kind) = info.kind {
                    entries.push(GroupEntry {
                        category,
                        index: base,
                        count: range.count,
                        kind,
                    });
                }
                slot_count += range.count;
                total_resource_count += range.count;
            }
            let structured = range.binding_type.is_raw_buffer() && range.element_type.is_some();
            if range.binding_type.is_sub_object() || structured {
                sub_object_count += range.count;
            }
            binding_ranges.push(info);
        }

        let mut sub_object_ranges = Vec::new();
        let mut child_group_count = 0;
        for (i, range) in ty.binding_ranges.iter().enumerate() {
            let structured = range.binding_type.is_raw_buffer() && range.element_type.is_some();
            if !range.binding_type.is_sub_object() && !structured {
                continue;
            }
            let layout = match range.element_type.as_ref() {
                Some(element_type) => Some(self.cache.get_or_build(element_type)?),
                None => None,
            };
            let required = || {
                layout
                    .clone()
                    .ok_or_else(|| invalid(format!("binding range {} has no element type", i)))
            };
            let mut inline = |layout: &ShaderObjectLayout, as_value: bool| {
                let (footprint, child_entries) = if as_value {
                    (layout.element_footprint(), layout.element_entries().to_vec())
                } else {
                    (layout.footprint(), layout.container_entries())
                };
                let offset = BindingOffset {
                    categories: counters,
                    ..Default::default()
                };
                let stride = BindingOffset {
                    categories: footprint,
                    ..Default::default()
                };
                for element in 0..range.count {
                    let origin = offset.merge_scaled(&stride, element);
                    entries.extend(child_entries.iter().map(|e| e.shifted(&origin.categories)));
                }
                counters = counters.merge(&footprint.scaled(range.count));
                child_group_count += layout.child_group_count() * range.count;
                (offset, stride)
            };
            let (offset, stride) = match range.binding_type {
                BindingType::ConstantBuffer => inline(&*required()?, false),
                BindingType::ParameterBlock if model.uses_groups() => {
                    let layout = required()?;
                    let offset = BindingOffset {
                        group: child_group_count,
                        ..Default::default()
                    };
                    let stride = BindingOffset {
                        group: layout.total_group_count(),
                        ..Default::default()
                    };
                    child_group_count += stride.group * range.count;
                    (offset, stride)
                }
                BindingType::ParameterBlock => inline(&*required()?, false),
                BindingType::ExistentialValue => match layout.as_ref() {
                    Some(layout) => inline(layout, true),
                    None => (
                        BindingOffset {
                            categories: counters,
                            ..Default::default()
                        },
                        BindingOffset::default(),
                    ),
                },
                // Structured buffer elements only describe data, nothing is bound for them.
                _ => (BindingOffset::default(), BindingOffset::default()),
            };
            if range.binding_type.is_sub_object() {
                if let Some(layout) = layout.as_ref() {
                    total_resource_count += layout.total_resource_count() * range.count;
                }
            }
            binding_ranges[i].sub_object_range = Some(sub_object_ranges.len() as u32);
            sub_object_ranges.push(SubObjectRangeInfo {
                binding_range: i as u32,
                layout,
                offset,
                stride,
            });
        }

        let fields = ty
            .fields
            .iter()
            .map(|field| {
                if let Some(range) = field.binding_range {
                    if range as usize >= binding_ranges.len() {
                        return Err(invalid(format!(
                            "field `{}` refers to missing binding range {}",
                            field.name, range
                        )));
                    }
                }
                Ok(FieldInfo {
                    name: field.name.clone(),
                    uniform_offset: field.uniform_offset,
                    uniform_size: field.uniform_size,
                    uniform_stride: field.uniform_stride,
                    binding_range: field.binding_range,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut layout = ShaderObjectLayout {
            name: ty.name.clone(),
            model: model.kind(),
            ordinary_size: ty.uniform_size,
            ordinary_mode: mode,
            ordinary_category: model.ordinary_data_category(),
            binding_ranges,
            sub_object_ranges,
            fields,
            slot_count,
            sub_object_count,
            element_footprint: counters,
            element_entries: entries,
            own_group: None,
            child_group_count,
            total_resource_count,
        };
        if model.uses_groups() {
            let entries = layout.container_entries();
            if !entries.is_empty() {
                layout.own_group = Some(Arc::new(GroupSchema { entries }));
            }
        }
        Ok(layout)
    }
}
