use ash::vk;
use basalt_binding::BindingModelKind;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Vulkan(#[from] vk::Result),
    #[error("binding data for the {0:?} model cannot be realized as descriptor sets")]
    UnsupportedModel(BindingModelKind),
    #[error("pipeline layout has {expected} descriptor sets, binding data has {found}")]
    GroupCountMismatch { expected: usize, found: usize },
    #[error("descriptor write targets group {group:?}, binding data has {count} groups")]
    GroupOutOfBounds { group: Option<u32>, count: usize },
    #[error("pipeline layout ends with a bindless set, but the arena has none")]
    MissingBindlessSet,
}
