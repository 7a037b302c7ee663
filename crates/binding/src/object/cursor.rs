use super::ShaderObject;
use crate::{reflection::BindingType, resource::Binding, Error, Result};

/// A location inside one shader object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderOffset {
    pub uniform_offset: u32,
    pub binding_range: Option<u32>,
    pub element: u32,
}

/// Navigates a shader object tree by field name and array index.
///
/// ```ignore
/// root.cursor().path("material.textures[2]")?.set_binding(texture)?;
/// ```
pub struct ShaderCursor<'a> {
    object: &'a mut ShaderObject,
    offset: ShaderOffset,
    name: String,
    uniform_stride: u32,
}

impl<'a> ShaderCursor<'a> {
    pub fn new(object: &'a mut ShaderObject) -> Self {
        Self {
            object,
            offset: ShaderOffset::default(),
            name: String::new(),
            uniform_stride: 0,
        }
    }
    pub fn offset(&self) -> ShaderOffset {
        self.offset
    }
    pub fn object_ref(&self) -> &ShaderObject {
        self.object
    }

    fn points_into_object(&self) -> Option<u32> {
        let range = self.offset.binding_range?;
        let info = self.object.layout().binding_range(range)?;
        info.binding_type.is_sub_object().then_some(range)
    }

    /// Moves into the child object the cursor points at.
    pub fn object(self) -> Result<ShaderCursor<'a>> {
        let range = self
            .points_into_object()
            .ok_or(Error::NotASubObjectRange {
                range: self.offset.binding_range.unwrap_or(u32::MAX),
            })?;
        let ShaderCursor { object, offset, .. } = self;
        Ok(ShaderCursor::new(object.object_mut(range, offset.element)?))
    }

    pub fn field(self, name: &str) -> Result<ShaderCursor<'a>> {
        // Fields of constant buffers and parameter blocks live in the child object.
        let cursor = if self.points_into_object().is_some() {
            self.object()?
        } else {
            self
        };
        let field = cursor
            .object
            .layout()
            .field(name)
            .ok_or_else(|| Error::FieldNotFound {
                name: name.to_string(),
                type_name: cursor.object.layout().name().to_string(),
            })?;
        let offset = ShaderOffset {
            uniform_offset: cursor.offset.uniform_offset + field.uniform_offset,
            binding_range: field.binding_range,
            element: 0,
        };
        let uniform_stride = field.uniform_stride;
        Ok(ShaderCursor {
            object: cursor.object,
            offset,
            name: name.to_string(),
            uniform_stride,
        })
    }

    pub fn element(mut self, index: u32) -> Result<ShaderCursor<'a>> {
        match self.offset.binding_range {
            Some(range) => {
                let count = self
                    .object
                    .layout()
                    .binding_range(range)
                    .map_or(0, |info| info.count);
                if index >= count {
                    return Err(Error::ElementOutOfBounds {
                        range,
                        element: index,
                        count,
                    });
                }
                self.offset.element = index;
            }
            None if self.uniform_stride > 0 => {
                self.offset.uniform_offset += index * self.uniform_stride;
            }
            None => return Err(Error::NotAnArray(self.name)),
        }
        Ok(self)
    }

    /// Follows a path such as `lights[1].color`.
    pub fn path(self, path: &str) -> Result<ShaderCursor<'a>> {
        let malformed = || Error::MalformedPath(path.to_string());
        let mut cursor = self;
        for segment in path.split('.') {
            let (name, mut rest) = segment.split_at(segment.find('[').unwrap_or(segment.len()));
            if name.is_empty() {
                return Err(malformed());
            }
            cursor = cursor.field(name)?;
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(malformed)?;
                if !rest.starts_with('[') {
                    return Err(malformed());
                }
                let index: u32 = rest[1..close].parse().map_err(|_| malformed())?;
                cursor = cursor.element(index)?;
                rest = &rest[close + 1..];
            }
        }
        Ok(cursor)
    }

    pub fn set_data(&mut self, bytes: &[u8]) -> Result<()> {
        self.object
            .set_data(self.offset.uniform_offset as usize, bytes)
    }

    pub fn write<T: bytemuck::Pod>(&mut self, value: &T) -> Result<()> {
        self.set_data(bytemuck::bytes_of(value))
    }

    pub fn set_binding(&mut self, binding: impl Into<Binding>) -> Result<()> {
        let range = self
            .offset
            .binding_range
            .ok_or_else(|| Error::NotAnArray(self.name.clone()))?;
        self.object.set_binding(range, self.offset.element, binding)
    }

    pub fn set_object(&mut self, object: ShaderObject) -> Result<Option<ShaderObject>> {
        let range = self
            .offset
            .binding_range
            .ok_or(Error::NotASubObjectRange { range: u32::MAX })?;
        self.object.set_object(range, self.offset.element, object)
    }

    /// Whether the cursor points at an existential slot that still needs a concrete object.
    pub fn is_unresolved_existential(&self) -> bool {
        let Some(range) = self.offset.binding_range else {
            return false;
        };
        let Some(info) = self.object.layout().binding_range(range) else {
            return false;
        };
        info.binding_type == BindingType::ExistentialValue
            && self.object.object(range, self.offset.element).is_none()
    }
}
