use crate::{model::BindingModelKind, reflection::BindingType};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("binding type {binding_type:?} is not supported by the {model:?} binding model")]
    UnsupportedBindingType {
        model: BindingModelKind,
        binding_type: BindingType,
    },
    #[error("push constants take {total} bytes, device limit is {limit}")]
    PushConstantLimitExceeded { total: u32, limit: u32 },
    #[error("invalid reflection for `{type_name}`: {reason}")]
    InvalidReflection { type_name: String, reason: String },
    #[error("program has unresolved specialization parameters")]
    UnspecializedProgram,
    #[error("binding range {range} out of bounds ({count} ranges)")]
    BindingRangeOutOfBounds { range: u32, count: u32 },
    #[error("element {element} out of bounds for binding range {range} ({count} elements)")]
    ElementOutOfBounds { range: u32, element: u32, count: u32 },
    #[error("write of {len} bytes at offset {offset} exceeds ordinary data of {size} bytes")]
    DataOutOfBounds { offset: usize, len: usize, size: usize },
    #[error("cannot bind {binding} into a {binding_type:?} range")]
    BindingKindMismatch {
        binding_type: BindingType,
        binding: &'static str,
    },
    #[error("binding range {range} does not hold sub-objects")]
    NotASubObjectRange { range: u32 },
    #[error("binding range {range} has no static layout; set a concrete object first")]
    NoStaticLayout { range: u32 },
    #[error("field `{name}` not found in `{type_name}`")]
    FieldNotFound { name: String, type_name: String },
    #[error("binding range {range} holds sub-objects, not resources")]
    NotAResourceRange { range: u32 },
    #[error("`{0}` is neither a binding range nor a uniform array")]
    NotAnArray(String),
    #[error("expected an object of type `{expected}`, got `{found}`")]
    LayoutMismatch { expected: String, found: String },
    #[error("malformed shader path `{0}`")]
    MalformedPath(String),
    #[error("entry point {index} out of bounds ({count} entry points)")]
    EntryPointOutOfBounds { index: usize, count: usize },
    #[error("expected {expected} specialization arguments, got {found}")]
    SpecializationArgCount { expected: usize, found: usize },
    #[error("specialization failed: {0}")]
    Specialization(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}
