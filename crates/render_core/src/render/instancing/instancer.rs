//! Instance data compiler
//!
//! Packs one interleaved per-instance byte buffer from an ordered list of
//! entities and an ordered list of attribute generators, then uploads it
//! with a matching attribute layout.
//!
//! # Record layout
//!
//! ```text
//! | gen 0 | gen 1 | ... | gen n |   entity 0
//! | gen 0 | gen 1 | ... | gen n |   entity 1
//! ```
//!
//! Each generator owns `byte_size` bytes of every record, at an offset equal
//! to the sum of the sizes of the generators before it. The stride of every
//! attribute is the full record size and the divisor is 1.

use crate::ecs::Entity;
use crate::render::api::{AttributeLayout, BufferHandle, GpuBufferSink, ScalarType, VertexLayoutHandle};
use crate::render::{RenderError, RenderResult};
use bytemuck::{Pod, Zeroable};

/// Writes one attribute of one entity into its slice of the record
pub type WriteFn<'a> = Box<dyn Fn(&mut [u8], Entity) + 'a>;

/// Description of one per-instance attribute and how to produce it
pub struct AttributeGenerator<'a> {
    /// Bytes written per instance, including padding
    pub byte_size: usize,
    /// Components per element (1..=4)
    pub component_count: u32,
    /// Destination attribute slot
    pub slot: u32,
    /// Component scalar type
    pub scalar_type: ScalarType,
    /// Normalize fixed-point data; ignored for integer attributes
    pub normalize: bool,
    write: WriteFn<'a>,
}

impl<'a> AttributeGenerator<'a> {
    /// Create a generator. `write` receives exactly `byte_size` zeroed bytes.
    pub fn new(
        byte_size: usize,
        component_count: u32,
        slot: u32,
        scalar_type: ScalarType,
        write: impl Fn(&mut [u8], Entity) + 'a,
    ) -> Self {
        Self {
            byte_size,
            component_count,
            slot,
            scalar_type,
            normalize: false,
            write: Box::new(write),
        }
    }

    /// Request normalization of the attribute's values
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    /// Reject descriptors the GPU could not consume
    pub fn validate(&self) -> RenderResult<()> {
        let invalid = |reason: String| RenderError::InvalidAttribute { slot: self.slot, reason };

        if !(1..=4).contains(&self.component_count) {
            return Err(invalid(format!(
                "component count {} outside 1..=4",
                self.component_count
            )));
        }
        if self.byte_size == 0 {
            return Err(invalid("zero byte size".to_string()));
        }

        let element_size = self.component_count as usize * self.scalar_type.size_bytes();
        if element_size > self.byte_size {
            return Err(invalid(format!(
                "{} components need {} bytes but only {} are reserved",
                self.component_count, element_size, self.byte_size
            )));
        }
        Ok(())
    }

    fn write(&self, destination: &mut [u8], entity: Entity) {
        (self.write)(destination, entity);
    }
}

impl std::fmt::Debug for AttributeGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeGenerator")
            .field("byte_size", &self.byte_size)
            .field("component_count", &self.component_count)
            .field("slot", &self.slot)
            .field("scalar_type", &self.scalar_type)
            .field("normalize", &self.normalize)
            .finish_non_exhaustive()
    }
}

/// Record size and per-attribute offsets of a generator list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    record_size: usize,
    offsets: Vec<usize>,
}

impl RecordLayout {
    /// Prefix-sum layout of `generators` in the given order
    pub fn from_generators(generators: &[AttributeGenerator<'_>]) -> Self {
        let mut offsets = Vec::with_capacity(generators.len());
        let mut record_size = 0;
        for generator in generators {
            offsets.push(record_size);
            record_size += generator.byte_size;
        }
        Self { record_size, offsets }
    }

    /// Bytes per instance record
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Byte offset of each generator inside a record
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// GPU attribute description of every generator
    pub fn attribute_layouts(&self, generators: &[AttributeGenerator<'_>]) -> Vec<AttributeLayout> {
        generators
            .iter()
            .zip(&self.offsets)
            .map(|(generator, &offset)| AttributeLayout {
                slot: generator.slot,
                component_count: generator.component_count,
                scalar_type: generator.scalar_type,
                normalized: generator.normalize && generator.scalar_type == ScalarType::Float,
                stride: self.record_size,
                offset,
                divisor: 1,
            })
            .collect()
    }
}

/// Uploaded instance buffer and its geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceBuffer {
    /// Backend handle
    pub handle: BufferHandle,
    /// Bytes per instance record
    pub record_size: usize,
    /// Byte offset of each attribute inside a record
    pub offsets: Vec<usize>,
    /// Number of records
    pub instance_count: usize,
}

/// 16-byte aligned unit of the host staging buffer
#[repr(C, align(16))]
#[derive(Clone, Copy, Pod, Zeroable)]
struct StagingBlock([u8; 16]);

/// Zeroed, 16-byte aligned host buffer of `len` bytes
struct StagingBuffer {
    blocks: Vec<StagingBlock>,
    len: usize,
}

impl StagingBuffer {
    fn zeroed(len: usize) -> Self {
        Self {
            blocks: vec![StagingBlock::zeroed(); len.div_ceil(16)],
            len,
        }
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<StagingBlock, u8>(&self.blocks)[..self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<StagingBlock, u8>(&mut self.blocks)[..self.len]
    }
}

/// Pack `entities` with `generators` and upload the result bound to `target_layout`.
///
/// Entity-major, attribute-minor interleaving. Returns `Ok(None)` without
/// touching the sink when `entities` is empty.
pub fn pack<S>(
    entities: &[Entity],
    generators: &[AttributeGenerator<'_>],
    target_layout: VertexLayoutHandle,
    sink: &mut S,
) -> RenderResult<Option<InstanceBuffer>>
where
    S: GpuBufferSink + ?Sized,
{
    for generator in generators {
        generator.validate()?;
    }

    if entities.is_empty() {
        log::trace!("Nothing to pack for layout {:?}", target_layout);
        return Ok(None);
    }

    let layout = RecordLayout::from_generators(generators);
    let record_size = layout.record_size();
    let mut staging = StagingBuffer::zeroed(record_size * entities.len());

    if record_size > 0 {
        for (record, &entity) in staging.bytes_mut().chunks_exact_mut(record_size).zip(entities) {
            for (generator, &offset) in generators.iter().zip(layout.offsets()) {
                generator.write(&mut record[offset..offset + generator.byte_size], entity);
            }
        }
    }

    let attributes = layout.attribute_layouts(generators);
    let handle = sink.upload_instance_buffer(target_layout, staging.bytes(), &attributes)?;

    log::trace!(
        "Packed {} instances x {} bytes into {:?}",
        entities.len(),
        record_size,
        handle
    );

    Ok(Some(InstanceBuffer {
        handle,
        record_size,
        offsets: layout.offsets,
        instance_count: entities.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::World;
    use crate::render::backends::HeadlessBackend;

    fn fill(byte_size: usize, slot: u32, value: u8) -> AttributeGenerator<'static> {
        AttributeGenerator::new(byte_size, 1, slot, ScalarType::Float, move |dst, _| dst.fill(value))
    }

    #[test]
    fn test_record_layout_prefix_sums() {
        let generators = vec![fill(16, 3, 0), fill(16, 4, 0), fill(16, 5, 0), fill(16, 6, 0), fill(12, 7, 0)];
        let layout = RecordLayout::from_generators(&generators);

        assert_eq!(layout.record_size(), 76);
        assert_eq!(layout.offsets(), &[0, 16, 32, 48, 64]);
    }

    #[test]
    fn test_pack_interleaves_entity_major() {
        let mut world = World::new();
        let entities: Vec<Entity> = (0..3).map(|_| world.create_entity()).collect();
        let generators = vec![
            AttributeGenerator::new(4, 1, 0, ScalarType::Int, |dst, e| {
                dst.copy_from_slice(&(e.id() as i32).to_ne_bytes());
            }),
            AttributeGenerator::new(8, 2, 1, ScalarType::Float, |dst, e| {
                let v = [e.id() as f32, -(e.id() as f32)];
                dst.copy_from_slice(bytemuck::cast_slice(&v));
            }),
        ];

        let mut backend = HeadlessBackend::new();
        let buffer = pack(&entities, &generators, VertexLayoutHandle(1), &mut backend)
            .unwrap()
            .unwrap();

        assert_eq!(buffer.record_size, 12);
        assert_eq!(buffer.instance_count, 3);
        let bytes = &backend.buffer(buffer.handle).unwrap().bytes;
        assert_eq!(bytes.len(), 36);

        for (i, entity) in entities.iter().enumerate() {
            let record = &bytes[i * 12..(i + 1) * 12];
            let id: i32 = bytemuck::pod_read_unaligned(&record[0..4]);
            let values: [f32; 2] = bytemuck::pod_read_unaligned(&record[4..12]);
            assert_eq!(id, entity.id() as i32);
            assert_eq!(values, [entity.id() as f32, -(entity.id() as f32)]);
        }
    }

    #[test]
    fn test_attribute_layouts_describe_records() {
        let mut world = World::new();
        let entity = world.create_entity();
        let generators = vec![
            fill(16, 3, 1).normalized(),
            AttributeGenerator::new(16, 3, 7, ScalarType::Int, |_, _| {}).normalized(),
        ];

        let mut backend = HeadlessBackend::new();
        let buffer = pack(&[entity], &generators, VertexLayoutHandle(2), &mut backend)
            .unwrap()
            .unwrap();
        let attributes = &backend.buffer(buffer.handle).unwrap().attributes;

        assert_eq!(attributes.len(), 2);
        assert!(attributes.iter().all(|a| a.stride == 32 && a.divisor == 1));
        assert_eq!(attributes[1].offset, 16);
        assert!(attributes[0].normalized);
        // Integers never go through normalization
        assert!(!attributes[1].normalized);
        assert!(attributes[1].uses_integer_path());
        assert!(!attributes[0].uses_integer_path());
    }

    #[test]
    fn test_unwritten_padding_is_zero() {
        let mut world = World::new();
        let entity = world.create_entity();
        let generators = vec![AttributeGenerator::new(16, 3, 7, ScalarType::Int, |dst, _| {
            dst[..12].copy_from_slice(bytemuck::cast_slice(&[-1i32, -1, -1]));
        })];

        let mut backend = HeadlessBackend::new();
        let buffer = pack(&[entity], &generators, VertexLayoutHandle(1), &mut backend)
            .unwrap()
            .unwrap();

        let bytes = &backend.buffer(buffer.handle).unwrap().bytes;
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_empty_entity_list_is_noop() {
        let generators = vec![fill(16, 3, 0)];
        let mut backend = HeadlessBackend::new();

        let result = pack(&[], &generators, VertexLayoutHandle(1), &mut backend).unwrap();

        assert!(result.is_none());
        assert_eq!(backend.stats().uploads, 0);
    }

    #[test]
    fn test_invalid_generators_rejected_before_writing() {
        let mut world = World::new();
        let entity = world.create_entity();
        let mut backend = HeadlessBackend::new();

        let too_many = vec![AttributeGenerator::new(32, 5, 2, ScalarType::Float, |_, _| panic!("must not write"))];
        let result = pack(&[entity], &too_many, VertexLayoutHandle(1), &mut backend);
        assert!(matches!(result, Err(RenderError::InvalidAttribute { slot: 2, .. })));

        let too_small = vec![AttributeGenerator::new(8, 4, 3, ScalarType::Float, |_, _| panic!("must not write"))];
        assert!(pack(&[entity], &too_small, VertexLayoutHandle(1), &mut backend).is_err());

        let empty = vec![AttributeGenerator::new(0, 1, 4, ScalarType::Int, |_, _| {})];
        assert!(pack(&[entity], &empty, VertexLayoutHandle(1), &mut backend).is_err());

        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_staging_buffer_alignment() {
        let staging = StagingBuffer::zeroed(76 * 3);
        assert_eq!(staging.bytes().len(), 228);
        assert_eq!(staging.bytes().as_ptr() as usize % 16, 0);
    }
}
