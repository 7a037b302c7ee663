mod cursor;

pub use cursor::*;

use crate::{
    layout::{BindingRangeInfo, RootShaderObjectLayout, ShaderObjectLayout},
    reflection::{BindingType, SpecializationArg},
    resource::{Binding, ResourceSlot},
    Error, Result,
};
use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

/// Parameter values of one shader type: resource slots, child objects and ordinary data bytes,
/// sized from its layout.
#[derive(Debug)]
pub struct ShaderObject {
    layout: Arc<ShaderObjectLayout>,
    slots: Vec<ResourceSlot>,
    objects: Vec<Option<Box<ShaderObject>>>,
    data: Vec<u8>,
}

impl ShaderObject {
    /// Children of constant buffer and parameter block ranges are created right away.
    pub fn new(layout: Arc<ShaderObjectLayout>) -> Self {
        let mut objects: Vec<Option<Box<ShaderObject>>> =
            (0..layout.sub_object_count()).map(|_| None).collect();
        for sub in layout.sub_object_ranges() {
            let range = &layout.binding_ranges()[sub.binding_range as usize];
            if !matches!(
                range.binding_type,
                BindingType::ConstantBuffer | BindingType::ParameterBlock
            ) {
                continue;
            }
            if let Some(child) = sub.layout.as_ref() {
                for element in 0..range.count {
                    objects[(range.sub_object_index + element) as usize] =
                        Some(Box::new(ShaderObject::new(child.clone())));
                }
            }
        }
        Self {
            slots: vec![ResourceSlot::default(); layout.slot_count() as usize],
            objects,
            data: vec![0; layout.total_ordinary_data_size() as usize],
            layout,
        }
    }

    pub fn layout(&self) -> &Arc<ShaderObjectLayout> {
        &self.layout
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn slots(&self) -> &[ResourceSlot] {
        &self.slots
    }
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
    pub fn sub_object_count(&self) -> usize {
        self.objects.len()
    }

    fn range_element(&self, range: u32, element: u32) -> Result<&BindingRangeInfo> {
        let info = self
            .layout
            .binding_range(range)
            .ok_or(Error::BindingRangeOutOfBounds {
                range,
                count: self.layout.binding_range_count(),
            })?;
        if element >= info.count {
            return Err(Error::ElementOutOfBounds {
                range,
                element,
                count: info.count,
            });
        }
        Ok(info)
    }

    fn sub_object_index(&self, range: u32, element: u32) -> Result<usize> {
        let info = self.range_element(range, element)?;
        if !info.takes_sub_objects() {
            return Err(Error::NotASubObjectRange { range });
        }
        Ok((info.sub_object_index + element) as usize)
    }

    pub fn set_data(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let size = self.data.len();
        let dst = offset
            .checked_add(bytes.len())
            .and_then(|end| self.data.get_mut(offset..end))
            .ok_or(Error::DataOutOfBounds {
                offset,
                len: bytes.len(),
                size,
            })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    pub fn write<T: bytemuck::Pod>(&mut self, offset: usize, value: &T) -> Result<()> {
        self.set_data(offset, bytemuck::bytes_of(value))
    }

    pub fn set_binding(&mut self, range: u32, element: u32, binding: impl Into<Binding>) -> Result<()> {
        let info = self.range_element(range, element)?;
        if !info.takes_slots() {
            return Err(Error::NotAResourceRange { range });
        }
        let index = (info.slot_index + element) as usize;
        let slot = ResourceSlot::new(info.binding_type, binding.into())?;
        self.slots[index] = slot;
        Ok(())
    }

    pub fn slot(&self, range: u32, element: u32) -> Option<&ResourceSlot> {
        let info = self.range_element(range, element).ok()?;
        if !info.takes_slots() {
            return None;
        }
        self.slots.get((info.slot_index + element) as usize)
    }

    pub fn object(&self, range: u32, element: u32) -> Option<&ShaderObject> {
        let index = self.sub_object_index(range, element).ok()?;
        self.objects[index].as_deref()
    }

    /// Creates the child from the range's layout if it is missing.
    pub fn object_mut(&mut self, range: u32, element: u32) -> Result<&mut ShaderObject> {
        let index = self.sub_object_index(range, element)?;
        if self.objects[index].is_none() {
            let layout = self
                .layout
                .sub_object_range_for(range)
                .and_then(|sub| sub.layout.clone())
                .ok_or(Error::NoStaticLayout { range })?;
            self.objects[index] = Some(Box::new(ShaderObject::new(layout)));
        }
        Ok(self.objects[index]
            .as_deref_mut()
            .ok_or(Error::NoStaticLayout { range })?)
    }

    /// Moves `object` into the slot, returning the previous child.
    ///
    /// Existential ranges accept any concrete type; other ranges require the declared one.
    pub fn set_object(
        &mut self,
        range: u32,
        element: u32,
        object: ShaderObject,
    ) -> Result<Option<ShaderObject>> {
        let index = self.sub_object_index(range, element)?;
        let binding_type = self.layout.binding_ranges()[range as usize].binding_type;
        if binding_type != BindingType::ExistentialValue {
            if let Some(expected) = self
                .layout
                .sub_object_range_for(range)
                .and_then(|sub| sub.layout.as_ref())
            {
                if expected.name() != object.layout.name() {
                    return Err(Error::LayoutMismatch {
                        expected: expected.name().to_string(),
                        found: object.layout.name().to_string(),
                    });
                }
            }
        }
        Ok(self.objects[index]
            .replace(Box::new(object))
            .map(|previous| *previous))
    }

    pub fn take_object(&mut self, range: u32, element: u32) -> Result<Option<ShaderObject>> {
        let index = self.sub_object_index(range, element)?;
        Ok(self.objects[index].take().map(|previous| *previous))
    }

    pub(crate) fn child(&self, index: u32) -> Option<&ShaderObject> {
        self.objects.get(index as usize).and_then(|o| o.as_deref())
    }

    pub fn cursor(&mut self) -> ShaderCursor<'_> {
        ShaderCursor::new(self)
    }

    /// Concrete types of existential children, depth first in declaration order.
    pub fn specialization_args(&self) -> Vec<SpecializationArg> {
        let mut args = Vec::new();
        self.collect_specialization_args(&mut args);
        args
    }

    fn collect_specialization_args(&self, out: &mut Vec<SpecializationArg>) {
        for range in self.layout.binding_ranges() {
            if !range.takes_sub_objects() || !range.binding_type.is_sub_object() {
                continue;
            }
            for element in 0..range.count {
                let Some(child) = self.child(range.sub_object_index + element) else {
                    continue;
                };
                if range.binding_type == BindingType::ExistentialValue {
                    out.push(SpecializationArg {
                        type_name: child.layout.name().to_string(),
                    });
                }
                child.collect_specialization_args(out);
            }
        }
    }
}

/// The globals of a program plus one object per entry point.
#[derive(Debug)]
pub struct RootShaderObject {
    layout: Arc<RootShaderObjectLayout>,
    globals: ShaderObject,
    entry_points: Vec<ShaderObject>,
}

impl RootShaderObject {
    pub fn new(layout: Arc<RootShaderObjectLayout>) -> Self {
        Self {
            globals: ShaderObject::new(layout.globals().clone()),
            entry_points: layout
                .entry_points()
                .iter()
                .map(|entry_point| ShaderObject::new(entry_point.layout.clone()))
                .collect(),
            layout,
        }
    }
    pub fn layout(&self) -> &Arc<RootShaderObjectLayout> {
        &self.layout
    }
    pub fn globals(&self) -> &ShaderObject {
        &self.globals
    }
    pub fn entry_point_count(&self) -> usize {
        self.entry_points.len()
    }
    pub fn entry_point(&self, index: usize) -> Option<&ShaderObject> {
        self.entry_points.get(index)
    }
    pub fn entry_point_mut(&mut self, index: usize) -> Result<&mut ShaderObject> {
        let count = self.entry_points.len();
        self.entry_points
            .get_mut(index)
            .ok_or(Error::EntryPointOutOfBounds { index, count })
    }
    pub fn specialization_args(&self) -> Vec<SpecializationArg> {
        let mut args = Vec::new();
        self.globals.collect_specialization_args(&mut args);
        for entry_point in self.entry_points.iter() {
            entry_point.collect_specialization_args(&mut args);
        }
        args
    }
}

impl Deref for RootShaderObject {
    type Target = ShaderObject;
    fn deref(&self) -> &ShaderObject {
        &self.globals
    }
}

impl DerefMut for RootShaderObject {
    fn deref_mut(&mut self) -> &mut ShaderObject {
        &mut self.globals
    }
}
