use crate::resource::{NativeHandle, ResourceKind, ResourceView};
use std::sync::Arc;

#[derive(Debug)]
pub struct TestResource {
    pub kind: ResourceKind,
    pub handle: u64,
}

impl ResourceView for TestResource {
    fn kind(&self) -> ResourceKind {
        self.kind
    }
    fn native_handle(&self) -> NativeHandle {
        NativeHandle(self.handle)
    }
}

pub fn resource(kind: ResourceKind, handle: u64) -> Arc<dyn ResourceView> {
    Arc::new(TestResource { kind, handle })
}

pub fn texture(handle: u64) -> Arc<dyn ResourceView> {
    resource(ResourceKind::TextureView, handle)
}

pub fn sampler(handle: u64) -> Arc<dyn ResourceView> {
    resource(ResourceKind::Sampler, handle)
}

pub fn buffer(handle: u64) -> Arc<dyn ResourceView> {
    resource(ResourceKind::Buffer, handle)
}
