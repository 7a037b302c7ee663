use crate::{
    allocator::{OrdinaryDataAllocator, UploadPages},
    backend::BindingBackend,
    binder::{BindingData, BindingDataBuilder},
    config::BindingConfig,
    layout::{GroupSchema, LayoutCache, RootShaderObjectLayout},
    model::BindingModel,
    object::{RootShaderObject, ShaderObject},
    reflection::{ProgramReflection, SpecializationArg, TypeLayoutReflection},
    Error, Result,
};
use std::{collections::HashMap, sync::Arc};

/// Produces the reflection of a program with its specialization parameters resolved.
pub trait Specializer {
    fn specialize(
        &self,
        program: &ProgramReflection,
        args: &[SpecializationArg],
    ) -> std::result::Result<ProgramReflection, Box<dyn std::error::Error + Send + Sync>>;
}

struct PipelineObjects<B: BindingBackend> {
    group_layouts: Vec<Arc<B::GroupLayout>>,
    pipeline_layout: B::PipelineLayout,
}

impl<B: BindingBackend> PipelineObjects<B> {
    /// `None` when the root layout still needs specialization.
    fn create(backend: &B, root: &RootShaderObjectLayout) -> Result<Option<Self>> {
        let Some(desc) = root.pipeline() else {
            return Ok(None);
        };
        let mut created: Vec<(&Arc<GroupSchema>, Arc<B::GroupLayout>)> = Vec::new();
        let mut group_layouts = Vec::with_capacity(desc.groups.len());
        for schema in desc.groups.iter() {
            // Identical groups, e.g. the elements of a parameter block array, share one layout.
            let layout = match created.iter().find(|(existing, _)| *existing == schema) {
                Some((_, layout)) => layout.clone(),
                None => {
                    let layout = Arc::new(
                        backend
                            .create_group_layout(schema)
                            .map_err(Error::backend)?,
                    );
                    created.push((schema, layout.clone()));
                    layout
                }
            };
            group_layouts.push(layout);
        }
        let pipeline_layout = backend
            .create_pipeline_layout(&group_layouts, desc)
            .map_err(Error::backend)?;
        tracing::debug!(
            groups = group_layouts.len(),
            unique_groups = created.len(),
            "created pipeline layout"
        );
        Ok(Some(Self {
            group_layouts,
            pipeline_layout,
        }))
    }
}

pub struct SpecializedProgram<B: BindingBackend> {
    layouts: LayoutCache,
    root_layout: Arc<RootShaderObjectLayout>,
    pipeline: PipelineObjects<B>,
}

impl<B: BindingBackend> SpecializedProgram<B> {
    pub fn root_layout(&self) -> &Arc<RootShaderObjectLayout> {
        &self.root_layout
    }
    pub fn group_layouts(&self) -> &[Arc<B::GroupLayout>] {
        &self.pipeline.group_layouts
    }
    pub fn pipeline_layout(&self) -> &B::PipelineLayout {
        &self.pipeline.pipeline_layout
    }
    pub fn layout_cache(&self) -> &LayoutCache {
        &self.layouts
    }
}

/// A shader program's layouts together with the backend objects created for them.
///
/// Layouts are cached per program; specializations get their own cache since the same
/// type name may lay out differently once its existential fields are resolved.
pub struct Program<B: BindingBackend> {
    backend: Arc<B>,
    reflection: ProgramReflection,
    layouts: LayoutCache,
    root_layout: Arc<RootShaderObjectLayout>,
    pipeline: Option<PipelineObjects<B>>,
    specializations: HashMap<Vec<SpecializationArg>, SpecializedProgram<B>>,
}

impl<B: BindingBackend> Program<B> {
    pub fn new(
        backend: Arc<B>,
        model: Arc<dyn BindingModel>,
        reflection: ProgramReflection,
    ) -> Result<Self> {
        let mut layouts = LayoutCache::new(model);
        let root_layout = RootShaderObjectLayout::create(
            &mut layouts,
            &reflection,
            &backend.limits(),
            backend.has_bindless_group(),
        )?;
        let pipeline = PipelineObjects::create(backend.as_ref(), &root_layout)?;
        Ok(Self {
            backend,
            reflection,
            layouts,
            root_layout: Arc::new(root_layout),
            pipeline,
            specializations: HashMap::new(),
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
    pub fn model(&self) -> &Arc<dyn BindingModel> {
        self.layouts.model()
    }
    pub fn reflection(&self) -> &ProgramReflection {
        &self.reflection
    }
    pub fn root_layout(&self) -> &Arc<RootShaderObjectLayout> {
        &self.root_layout
    }
    pub fn layout_cache(&self) -> &LayoutCache {
        &self.layouts
    }
    pub fn is_bindable(&self) -> bool {
        self.pipeline.is_some()
    }
    pub fn group_layouts(&self) -> Option<&[Arc<B::GroupLayout>]> {
        self.pipeline.as_ref().map(|p| p.group_layouts.as_slice())
    }
    pub fn pipeline_layout(&self) -> Option<&B::PipelineLayout> {
        self.pipeline.as_ref().map(|p| &p.pipeline_layout)
    }

    pub fn create_root_object(&self) -> RootShaderObject {
        RootShaderObject::new(self.root_layout.clone())
    }

    /// Creates an object of a type used by this program, e.g. the concrete type of an existential field.
    pub fn create_object(&mut self, ty: &TypeLayoutReflection) -> Result<ShaderObject> {
        Ok(ShaderObject::new(self.layouts.get_or_build(ty)?))
    }

    pub fn specialization(&self, args: &[SpecializationArg]) -> Option<&SpecializedProgram<B>> {
        self.specializations.get(args)
    }

    pub fn specialize(
        &mut self,
        args: &[SpecializationArg],
        specializer: &dyn Specializer,
    ) -> Result<&SpecializedProgram<B>> {
        let expected = self.reflection.specialization_params.len();
        if args.len() != expected {
            return Err(Error::SpecializationArgCount {
                expected,
                found: args.len(),
            });
        }
        if !self.specializations.contains_key(args) {
            let reflection = specializer
                .specialize(&self.reflection, args)
                .map_err(Error::Specialization)?;
            let mut layouts = LayoutCache::new(self.layouts.model().clone());
            let root_layout = RootShaderObjectLayout::create(
                &mut layouts,
                &reflection,
                &self.backend.limits(),
                self.backend.has_bindless_group(),
            )?;
            let pipeline = PipelineObjects::create(self.backend.as_ref(), &root_layout)?
                .ok_or(Error::UnspecializedProgram)?;
            tracing::debug!(
                args = ?args.iter().map(|a| a.type_name.as_str()).collect::<Vec<_>>(),
                "specialized program"
            );
            self.specializations.insert(
                args.to_vec(),
                SpecializedProgram {
                    layouts,
                    root_layout: Arc::new(root_layout),
                    pipeline,
                },
            );
        }
        self.specializations
            .get(args)
            .ok_or(Error::UnspecializedProgram)
    }

    /// Specializes for the concrete types currently plugged into `root`.
    pub fn specialize_for(
        &mut self,
        root: &RootShaderObject,
        specializer: &dyn Specializer,
    ) -> Result<&SpecializedProgram<B>> {
        let args = root.specialization_args();
        self.specialize(&args, specializer)
    }

    /// The layout `root` binds against: the program's own, or the specialization matching
    /// the types in its existential fields.
    pub fn bindable_layout(&self, root: &RootShaderObject) -> Result<&Arc<RootShaderObjectLayout>> {
        if self.root_layout.is_bindable() {
            return Ok(&self.root_layout);
        }
        self.specializations
            .get(&root.specialization_args())
            .map(|s| &s.root_layout)
            .ok_or(Error::UnspecializedProgram)
    }

    /// The stricter of the model's ordinary data alignment and the backend's uniform
    /// buffer offset alignment.
    pub fn ordinary_alignment(&self) -> u64 {
        let limits = self.backend.limits();
        self.model()
            .min_ordinary_alignment()
            .max(limits.min_uniform_buffer_offset_alignment)
    }

    pub fn create_allocator<P: UploadPages>(
        &self,
        pages: P,
        config: &BindingConfig,
    ) -> OrdinaryDataAllocator<P> {
        OrdinaryDataAllocator::new(pages, self.ordinary_alignment(), config)
    }

    pub fn bind<P: UploadPages>(
        &self,
        root: &RootShaderObject,
        allocator: &mut OrdinaryDataAllocator<P>,
        config: &BindingConfig,
    ) -> Result<BindingData> {
        let layout = self.bindable_layout(root)?;
        BindingDataBuilder::new(self.layouts.model().as_ref(), allocator)
            .null_descriptors(config.null_descriptors)
            .bind_as_root(root, layout)
    }
}
