//! Reflection data produced by the shader compiler.
//!
//! Everything here is plain data so that reflection can be loaded from any serde format,
//! or assembled in code with [`TypeLayoutBuilder`].
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingType {
    Texture,
    MutableTexture,
    Sampler,
    CombinedTextureSampler,
    RawBuffer,
    MutableRawBuffer,
    TypedBuffer,
    MutableTypedBuffer,
    ConstantBuffer,
    ParameterBlock,
    ExistentialValue,
    AccelerationStructure,
    VaryingInput,
    VaryingOutput,
    #[serde(other)]
    Unknown,
}

impl BindingType {
    /// Ranges of these types hold child shader objects instead of resources.
    pub fn is_sub_object(self) -> bool {
        matches!(
            self,
            BindingType::ConstantBuffer | BindingType::ParameterBlock | BindingType::ExistentialValue
        )
    }
    pub fn is_varying(self) -> bool {
        matches!(self, BindingType::VaryingInput | BindingType::VaryingOutput)
    }
    pub fn is_raw_buffer(self) -> bool {
        matches!(self, BindingType::RawBuffer | BindingType::MutableRawBuffer)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Fragment,
    Compute,
    RayGeneration,
    Intersection,
    AnyHit,
    ClosestHit,
    Miss,
    Callable,
    Mesh,
    Amplification,
}

fn one() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRangeReflection {
    pub binding_type: BindingType,
    #[serde(default = "one")]
    pub count: u32,
    /// Nested type for sub-object ranges and structured buffers.
    /// Existential ranges only carry one after specialization.
    #[serde(default)]
    pub element_type: Option<Arc<TypeLayoutReflection>>,
    /// Index explicitly assigned in the shader source, within the range's category.
    /// Counted after the object's ordinary data buffer.
    #[serde(default)]
    pub explicit_index: Option<u32>,
    #[serde(default)]
    pub specializable: bool,
    /// Location of an existential value's payload inside the parent's ordinary data.
    #[serde(default)]
    pub uniform_offset: u32,
    #[serde(default)]
    pub uniform_stride: u32,
}

impl BindingRangeReflection {
    pub fn new(binding_type: BindingType, count: u32) -> Self {
        Self {
            binding_type,
            count,
            element_type: None,
            explicit_index: None,
            specializable: false,
            uniform_offset: 0,
            uniform_stride: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReflection {
    pub name: String,
    #[serde(default)]
    pub uniform_offset: u32,
    #[serde(default)]
    pub uniform_size: u32,
    /// Byte stride between elements when the field is a uniform array.
    #[serde(default)]
    pub uniform_stride: u32,
    #[serde(default)]
    pub binding_range: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLayoutReflection {
    pub name: String,
    #[serde(default)]
    pub uniform_size: u32,
    #[serde(default)]
    pub binding_ranges: Vec<BindingRangeReflection>,
    #[serde(default)]
    pub fields: Vec<FieldReflection>,
}

impl TypeLayoutReflection {
    pub fn builder(name: impl Into<String>) -> TypeLayoutBuilder {
        TypeLayoutBuilder {
            inner: TypeLayoutReflection {
                name: name.into(),
                ..Default::default()
            },
        }
    }
}

/// Per-category absolute offsets assigned to a variable by the compiler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct VariablePlacement {
    pub descriptor_slot: u32,
    pub register_space: u32,
    pub constant_buffer: u32,
    pub shader_resource: u32,
    pub unordered_access: u32,
    pub sampler: u32,
    pub push_constant_buffer: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointReflection {
    pub name: String,
    pub stage: ShaderStage,
    pub params: Arc<TypeLayoutReflection>,
    #[serde(default)]
    pub placement: Option<VariablePlacement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecializationParam {
    pub name: String,
    /// Interface type the argument must conform to.
    pub interface: String,
}

/// A concrete type plugged into an existential slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecializationArg {
    pub type_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramReflection {
    pub globals: Arc<TypeLayoutReflection>,
    #[serde(default)]
    pub globals_placement: VariablePlacement,
    #[serde(default)]
    pub entry_points: Vec<EntryPointReflection>,
    #[serde(default)]
    pub specialization_params: Vec<SpecializationParam>,
}

impl ProgramReflection {
    pub fn new(globals: TypeLayoutReflection) -> Self {
        Self {
            globals: Arc::new(globals),
            globals_placement: VariablePlacement::default(),
            entry_points: Vec::new(),
            specialization_params: Vec::new(),
        }
    }
    pub fn with_entry_point(
        mut self,
        name: impl Into<String>,
        stage: ShaderStage,
        params: TypeLayoutReflection,
    ) -> Self {
        self.entry_points.push(EntryPointReflection {
            name: name.into(),
            stage,
            params: Arc::new(params),
            placement: None,
        });
        self
    }
}

/// Assembles a [`TypeLayoutReflection`] field by field, keeping the
/// field table and the binding ranges in sync.
pub struct TypeLayoutBuilder {
    inner: TypeLayoutReflection,
}

impl TypeLayoutBuilder {
    /// Plain data stored in the ordinary data buffer.
    pub fn uniform(mut self, name: impl Into<String>, offset: u32, size: u32) -> Self {
        self.inner.fields.push(FieldReflection {
            name: name.into(),
            uniform_offset: offset,
            uniform_size: size,
            uniform_stride: 0,
            binding_range: None,
        });
        self.inner.uniform_size = self.inner.uniform_size.max(offset + size);
        self
    }
    pub fn uniform_array(
        mut self,
        name: impl Into<String>,
        offset: u32,
        stride: u32,
        count: u32,
    ) -> Self {
        self.inner.fields.push(FieldReflection {
            name: name.into(),
            uniform_offset: offset,
            uniform_size: stride * count,
            uniform_stride: stride,
            binding_range: None,
        });
        self.inner.uniform_size = self.inner.uniform_size.max(offset + stride * count);
        self
    }
    pub fn resource(self, name: impl Into<String>, binding_type: BindingType, count: u32) -> Self {
        self.range(name, BindingRangeReflection::new(binding_type, count))
    }
    pub fn sub_object(
        self,
        name: impl Into<String>,
        binding_type: BindingType,
        element_type: TypeLayoutReflection,
        count: u32,
    ) -> Self {
        self.range(
            name,
            BindingRangeReflection {
                element_type: Some(Arc::new(element_type)),
                ..BindingRangeReflection::new(binding_type, count)
            },
        )
    }
    pub fn range(mut self, name: impl Into<String>, range: BindingRangeReflection) -> Self {
        self.inner.fields.push(FieldReflection {
            name: name.into(),
            uniform_offset: range.uniform_offset,
            uniform_size: 0,
            uniform_stride: range.uniform_stride,
            binding_range: Some(self.inner.binding_ranges.len() as u32),
        });
        self.inner.binding_ranges.push(range);
        self
    }
    /// Overrides the total ordinary data size, e.g. to account for trailing padding.
    pub fn uniform_size(mut self, size: u32) -> Self {
        self.inner.uniform_size = size;
        self
    }
    pub fn build(self) -> TypeLayoutReflection {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_unknown_binding_type() {
        let ty: TypeLayoutReflection = serde_json::from_str(
            r#"{
                "name": "Globals",
                "uniform_size": 16,
                "binding_ranges": [
                    { "binding_type": "texture", "count": 4 },
                    { "binding_type": "ray_query_thing" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(ty.binding_ranges[0].binding_type, BindingType::Texture);
        assert_eq!(ty.binding_ranges[0].count, 4);
        assert_eq!(ty.binding_ranges[1].binding_type, BindingType::Unknown);
        assert_eq!(ty.binding_ranges[1].count, 1);
    }

    #[test]
    fn test_builder_keeps_fields_in_sync() {
        let ty = TypeLayoutReflection::builder("Material")
            .uniform("tint", 0, 16)
            .resource("albedo", BindingType::Texture, 1)
            .resource("sampler", BindingType::Sampler, 1)
            .build();
        assert_eq!(ty.uniform_size, 16);
        assert_eq!(ty.binding_ranges.len(), 2);
        assert_eq!(ty.fields[1].binding_range, Some(0));
        assert_eq!(ty.fields[2].binding_range, Some(1));
    }
}
