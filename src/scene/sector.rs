//! Independent baking unit.

use super::light::Light;
use super::object::Object;
use super::primitive::Primitive;

/// Stable reference to a primitive inside a sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveRef {
    pub object: u32,
    pub primitive: u32,
}

impl PrimitiveRef {
    #[inline]
    pub fn new(object: usize, primitive: usize) -> Self {
        Self { object: object as u32, primitive: primitive as u32 }
    }
}

/// Objects and lights that are baked together. Sectors share nothing.
#[derive(Clone, Debug, Default)]
pub struct Sector {
    pub name: String,
    pub objects: Vec<Object>,
    pub lights: Vec<Light>,
}

impl Sector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    #[inline]
    pub fn primitive(&self, r: PrimitiveRef) -> &Primitive {
        &self.objects[r.object as usize].primitives[r.primitive as usize]
    }

    #[inline]
    pub fn object(&self, r: PrimitiveRef) -> &Object {
        &self.objects[r.object as usize]
    }

    /// Every primitive reference, object-major.
    pub fn primitive_refs(&self) -> impl Iterator<Item = PrimitiveRef> + '_ {
        self.objects.iter().enumerate().flat_map(|(o, obj)| {
            (0..obj.primitives.len()).map(move |p| PrimitiveRef::new(o, p))
        })
    }

    pub fn primitive_count(&self) -> usize {
        self.objects.iter().map(|o| o.primitives.len()).sum()
    }
}
