use super::{GroupEntry, GroupSchema, LayoutCache, OrdinaryDataMode, ShaderObjectLayout};
use crate::{
    backend::BackendLimits,
    model::{BindingOffset, CategoryVec},
    reflection::{BindingType, ProgramReflection, ShaderStage, SpecializationParam},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::{ops::Deref, sync::Arc};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPointInfo {
    pub name: String,
    pub stage: ShaderStage,
    pub layout: Arc<ShaderObjectLayout>,
    /// Entry point parameters share the root group, so `offset.group` is always 0.
    pub offset: BindingOffset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
    pub stage: ShaderStage,
}

/// Everything needed to create the backend pipeline layout / root signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineBindingDesc {
    /// Groups in set / table order.
    pub groups: Vec<Arc<GroupSchema>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    /// A bindless group follows all other groups.
    pub bindless: bool,
    /// Highest register used plus one, per category. The flat model has no groups to describe this.
    pub register_counts: CategoryVec,
}

impl PipelineBindingDesc {
    pub fn group_count(&self) -> u32 {
        self.groups.len() as u32 + self.bindless as u32
    }
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_ranges
            .last()
            .map_or(0, |range| range.offset + range.size)
    }
}

/// The layout of a whole program: its global scope plus one layout per entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootShaderObjectLayout {
    globals: Arc<ShaderObjectLayout>,
    globals_offset: BindingOffset,
    entry_points: Vec<EntryPointInfo>,
    root_group: Option<Arc<GroupSchema>>,
    pipeline: Option<PipelineBindingDesc>,
    specialization_params: Vec<SpecializationParam>,
}

impl Deref for RootShaderObjectLayout {
    type Target = ShaderObjectLayout;
    fn deref(&self) -> &ShaderObjectLayout {
        &self.globals
    }
}

impl RootShaderObjectLayout {
    pub fn create(
        cache: &mut LayoutCache,
        program: &ProgramReflection,
        limits: &BackendLimits,
        bindless: bool,
    ) -> Result<Self> {
        let model = cache.model().clone();
        let globals = cache.get_or_build(&program.globals)?;
        let mut globals_offset = model.offset_from_placement(&program.globals_placement);
        globals_offset.group = 0;
        globals_offset.push_constant_range = 0;

        let mut running = globals_offset.categories.merge(&globals.footprint());
        let mut push_constant_index = 0;
        let mut entry_points = Vec::with_capacity(program.entry_points.len());
        for entry_point in program.entry_points.iter() {
            let layout =
                cache.get_or_build_with(&entry_point.params, OrdinaryDataMode::PushConstant)?;
            let mut offset = match entry_point.placement.as_ref() {
                Some(placement) => model.offset_from_placement(placement),
                None => {
                    let offset = BindingOffset {
                        categories: running,
                        ..Default::default()
                    };
                    running = running.merge(&layout.footprint());
                    offset
                }
            };
            offset.group = 0;
            offset.push_constant_range = push_constant_index;
            if layout.has_push_constants() {
                push_constant_index += 1;
            }
            entry_points.push(EntryPointInfo {
                name: entry_point.name.clone(),
                stage: entry_point.stage,
                layout,
                offset,
            });
        }

        let root_group = if model.uses_groups() {
            let mut entries: Vec<GroupEntry> = globals
                .container_entries()
                .iter()
                .map(|e| e.shifted(&globals_offset.categories))
                .collect();
            for entry_point in entry_points.iter() {
                entries.extend(
                    entry_point
                        .layout
                        .container_entries()
                        .iter()
                        .map(|e| e.shifted(&entry_point.offset.categories)),
                );
            }
            (!entries.is_empty()).then(|| Arc::new(GroupSchema { entries }))
        } else {
            None
        };

        let mut layout = Self {
            globals,
            globals_offset,
            entry_points,
            root_group,
            pipeline: None,
            specialization_params: program.specialization_params.clone(),
        };
        if !layout.specialization_params.is_empty() {
            tracing::debug!(
                params = layout.specialization_params.len(),
                "root layout needs specialization before it can be bound"
            );
            return Ok(layout);
        }

        let mut groups = Vec::new();
        if model.uses_groups() {
            groups.extend(layout.root_group.iter().cloned());
            collect_child_groups(&layout.globals, &mut groups);
            for entry_point in layout.entry_points.iter() {
                collect_child_groups(&entry_point.layout, &mut groups);
            }
        }

        let mut push_constant_ranges = Vec::new();
        let mut push_constant_size = 0;
        for entry_point in layout.entry_points.iter() {
            if entry_point.layout.has_push_constants() {
                let size = entry_point.layout.total_ordinary_data_size().next_multiple_of(4);
                push_constant_ranges.push(PushConstantRange {
                    offset: push_constant_size,
                    size,
                    stage: entry_point.stage,
                });
                push_constant_size += size;
            }
        }
        if push_constant_size > limits.max_push_constant_size {
            return Err(Error::PushConstantLimitExceeded {
                total: push_constant_size,
                limit: limits.max_push_constant_size,
            });
        }

        let mut register_counts = layout
            .globals_offset
            .categories
            .merge(&layout.globals.footprint());
        for entry_point in layout.entry_points.iter() {
            register_counts = register_counts.max(
                &entry_point
                    .offset
                    .categories
                    .merge(&entry_point.layout.footprint()),
            );
        }

        tracing::debug!(
            groups = groups.len(),
            push_constant_size,
            bindless,
            "built pipeline binding description"
        );
        layout.pipeline = Some(PipelineBindingDesc {
            groups,
            push_constant_ranges,
            bindless,
            register_counts,
        });
        Ok(layout)
    }

    pub fn globals(&self) -> &Arc<ShaderObjectLayout> {
        &self.globals
    }
    pub fn globals_offset(&self) -> BindingOffset {
        self.globals_offset
    }
    pub fn entry_points(&self) -> &[EntryPointInfo] {
        &self.entry_points
    }
    pub fn entry_point(&self, index: usize) -> Option<&EntryPointInfo> {
        self.entry_points.get(index)
    }
    pub fn entry_point_count(&self) -> usize {
        self.entry_points.len()
    }
    /// Globals and entry point parameters together, when the model has groups.
    pub fn root_group(&self) -> Option<&Arc<GroupSchema>> {
        self.root_group.as_ref()
    }
    /// `None` while specialization parameters remain unresolved.
    pub fn pipeline(&self) -> Option<&PipelineBindingDesc> {
        self.pipeline.as_ref()
    }
    pub fn is_bindable(&self) -> bool {
        self.pipeline.is_some()
    }
    pub fn specialization_params(&self) -> &[SpecializationParam] {
        &self.specialization_params
    }
}

/// Groups opened below `layout`, in the order binding allocates them.
pub(crate) fn collect_child_groups(layout: &ShaderObjectLayout, out: &mut Vec<Arc<GroupSchema>>) {
    for sub in layout.sub_object_ranges() {
        let range = &layout.binding_ranges()[sub.binding_range as usize];
        let Some(child) = sub.layout.as_ref() else {
            continue;
        };
        if !range.binding_type.is_sub_object() {
            continue;
        }
        for _ in 0..range.count {
            if range.binding_type == BindingType::ParameterBlock {
                out.extend(child.own_group().cloned());
            }
            collect_child_groups(child, out);
        }
    }
}
