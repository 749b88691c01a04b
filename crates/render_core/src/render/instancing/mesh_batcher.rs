//! # Mesh Batcher
//!
//! Owns the entities a draw pass renders and turns them into one instanced
//! draw per mesh.
//!
//! ## Architecture
//!
//! - **Tracked set**: entities kept sorted by mesh id on every insertion, so
//!   entities sharing a mesh form one contiguous run
//! - **Runs**: each run with a valid mesh owns one instance buffer built by
//!   the [instancer](super::instancer)
//! - **Selective update**: after a transform flush only the runs containing a
//!   changed entity are re-packed; every other buffer is left untouched
//!
//! ## Instance record
//!
//! ```text
//! model matrix column 0..3   vec4 float   slots model_matrix_slot..+4
//! auxiliary indices          ivecN        slot auxiliary_slot, padded to 16 bytes
//! ```

use super::instancer::{pack, AttributeGenerator, InstanceBuffer};
use crate::config::{ConfigError, InstancingConfig};
use crate::ecs::{Entity, MeshId, TextureId, World};
use crate::foundation::collections::BoundedSlotTable;
use crate::foundation::math::Mat4;
use crate::render::api::{GpuBufferSink, MaterialTable, RenderBackend, ScalarType};
use crate::render::{RenderError, RenderResult};
use crate::scene::SceneManager;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

/// Auxiliary index written for entities without a texture in that position
pub const NO_TEXTURE: i32 = -1;

/// Maximal contiguous group of tracked entities sharing one mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshRun<'a> {
    /// Shared mesh, possibly [`MeshId::INVALID`]
    pub mesh: MeshId,
    /// Entities of the run in tracked order
    pub entities: &'a [Entity],
}

/// Statistics for batch rendering performance monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Runs currently holding an instance buffer
    pub runs: usize,

    /// Instances across those buffers
    pub instances: usize,

    /// Draw calls issued by the last `run_shader`
    pub draw_calls: usize,

    /// Instance buffers built since creation
    pub buffers_built: usize,

    /// Instance buffers released since creation
    pub buffers_released: usize,
}

impl BatchStats {
    /// Average instances per draw call
    pub fn avg_instances_per_draw(&self) -> f32 {
        if self.runs == 0 {
            0.0
        } else {
            self.instances as f32 / self.runs as f32
        }
    }
}

/// Mesh-sorted tracked set with one instance buffer per run
#[derive(Debug)]
pub struct MeshBatcher {
    config: InstancingConfig,
    tracked: Vec<Entity>,
    tracked_meshes: Vec<MeshId>,
    buffers: BTreeMap<MeshId, InstanceBuffer>,
    // Unloaded meshes and the run size they were skipped at
    skipped: HashMap<MeshId, usize>,
    auxiliary: HashMap<Entity, Vec<i32>>,
    texture_slots: BoundedSlotTable<TextureId>,
    stats: BatchStats,
}

impl MeshBatcher {
    /// Create an empty batcher from a validated configuration
    pub fn try_new(config: InstancingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Create an empty batcher.
    ///
    /// An invalid `config` is a caller error: every later pack would fail.
    /// Use [`try_new`](Self::try_new) for configuration from outside the
    /// program.
    pub fn new(config: InstancingConfig) -> Self {
        if let Err(err) = config.validate() {
            debug_assert!(false, "invalid instancing config: {err}");
            log::warn!("Mesh batcher created with invalid config: {}", err);
        }

        log::info!(
            "Mesh batcher: matrix slots {}..{}, {} auxiliary indices at slot {}, {} texture slots",
            config.model_matrix_slot,
            config.model_matrix_slot + 4,
            config.auxiliary_index_count,
            config.auxiliary_slot,
            config.texture_slots
        );

        Self {
            texture_slots: BoundedSlotTable::new(config.texture_slots),
            config,
            tracked: Vec::new(),
            tracked_meshes: Vec::new(),
            buffers: BTreeMap::new(),
            skipped: HashMap::new(),
            auxiliary: HashMap::new(),
            stats: BatchStats::default(),
        }
    }

    /// Track `entity`, keeping the set sorted by mesh id.
    ///
    /// The mesh id is read once, at insertion. Entities with an equal mesh id
    /// keep their insertion order.
    pub fn add_object(&mut self, world: &World, entity: Entity) {
        let mesh = world.mesh_of(entity);
        let position = self.tracked_meshes.partition_point(|&m| m <= mesh);
        self.tracked.insert(position, entity);
        self.tracked_meshes.insert(position, mesh);
        log::trace!("Tracking {} with mesh {:?} at {}", entity, mesh, position);
    }

    /// Track `entity` and every entity parented under it
    pub fn add_object_with_children(&mut self, scene: &SceneManager, entity: Entity) {
        let mut stack = vec![entity];
        while let Some(next) = stack.pop() {
            self.add_object(scene.world(), next);
            stack.extend(scene.children_of(next));
        }
    }

    /// Tracked entities in mesh order
    pub fn tracked(&self) -> &[Entity] {
        &self.tracked
    }

    /// Partition of the tracked set into maximal same-mesh runs
    pub fn runs(&self) -> Vec<MeshRun<'_>> {
        self.run_ranges()
            .into_iter()
            .map(|(mesh, range)| MeshRun {
                mesh,
                entities: &self.tracked[range],
            })
            .collect()
    }

    fn run_ranges(&self) -> Vec<(MeshId, Range<usize>)> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for end in 1..=self.tracked_meshes.len() {
            if end == self.tracked_meshes.len() || self.tracked_meshes[end] != self.tracked_meshes[start] {
                ranges.push((self.tracked_meshes[start], start..end));
                start = end;
            }
        }
        ranges
    }

    fn drawable_run_ranges(&self) -> Vec<(MeshId, Range<usize>)> {
        let mut ranges = self.run_ranges();
        ranges.retain(|(mesh, _)| mesh.is_valid());
        ranges
    }

    /// Instance buffer of a mesh run
    pub fn instance_buffer(&self, mesh: MeshId) -> Option<&InstanceBuffer> {
        self.buffers.get(&mesh)
    }

    /// `(mesh, instance count)` of every built run, ascending by mesh
    pub fn instance_counts(&self) -> impl Iterator<Item = (MeshId, usize)> + '_ {
        self.buffers.iter().map(|(&mesh, buffer)| (mesh, buffer.instance_count))
    }

    /// Set the auxiliary indices of `entity`, padded with [`NO_TEXTURE`]
    pub fn set_auxiliary_indices(&mut self, entity: Entity, indices: &[i32]) {
        let count = self.config.auxiliary_index_count;
        if indices.len() > count {
            log::warn!(
                "{} auxiliary indices given for {}, keeping the first {}",
                indices.len(),
                entity,
                count
            );
        }

        let mut padded = vec![NO_TEXTURE; count];
        for (dst, &src) in padded.iter_mut().zip(indices) {
            *dst = src;
        }
        self.auxiliary.insert(entity, padded);
    }

    /// Auxiliary indices of `entity`, if any were assigned
    pub fn auxiliary_indices(&self, entity: Entity) -> Option<&[i32]> {
        self.auxiliary.get(&entity).map(Vec::as_slice)
    }

    /// Bind the textures of every tracked entity's material to texture slots.
    ///
    /// Textures no tracked entity uses any more are evicted first; surviving
    /// textures keep their slot. Each entity's auxiliary indices become the
    /// slots of its material's first textures, [`NO_TEXTURE`] where it has none
    /// or the table is full.
    pub fn run_texture_mapping<M>(&mut self, world: &World, materials: &M)
    where
        M: MaterialTable + ?Sized,
    {
        let count = self.config.auxiliary_index_count;

        let entity_textures: Vec<(Entity, Vec<TextureId>)> = self
            .tracked
            .iter()
            .map(|&entity| {
                let textures = materials
                    .material_textures(world.material_of(entity))
                    .unwrap_or(&[])
                    .iter()
                    .take(count)
                    .copied()
                    .collect();
                (entity, textures)
            })
            .collect();

        let used: HashSet<TextureId> = entity_textures
            .iter()
            .flat_map(|(_, textures)| textures.iter().copied())
            .filter(TextureId::is_valid)
            .collect();
        self.texture_slots.retain(|texture| used.contains(texture));

        for (entity, textures) in entity_textures {
            let mut indices = vec![NO_TEXTURE; count];
            for (index, texture) in indices.iter_mut().zip(textures) {
                if !texture.is_valid() {
                    continue;
                }
                match self.texture_slots.acquire(texture, |t| used.contains(t)) {
                    Some(slot) => *index = i32::try_from(slot).unwrap_or(NO_TEXTURE),
                    None => log::warn!("No texture slot left for {:?} of {}", texture, entity),
                }
            }
            self.auxiliary.insert(entity, indices);
        }

        log::debug!("Texture mapping: {} textures bound", self.texture_slots.len());
    }

    /// Current texture slot assignments as `(slot, texture)`
    pub fn texture_bindings(&self) -> impl Iterator<Item = (usize, TextureId)> + '_ {
        self.texture_slots.iter().map(|(slot, &texture)| (slot, texture))
    }

    /// Rebuild the instance buffer of every run, releasing all previous buffers
    pub fn run_instancing<B>(&mut self, scene: &SceneManager, backend: &mut B) -> RenderResult<()>
    where
        B: RenderBackend + ?Sized,
    {
        self.release_buffers(backend)?;
        self.skipped.clear();

        for (mesh, range) in self.drawable_run_ranges() {
            if !self.mesh_loaded(mesh, range.len(), backend)? {
                continue;
            }
            let built = self.build_run(scene, mesh, &self.tracked[range], backend)?;
            self.replace_buffer(mesh, built, backend)?;
        }

        self.refresh_totals();
        log::info!(
            "Instanced {} entities into {} runs",
            self.stats.instances,
            self.stats.runs
        );
        Ok(())
    }

    /// Re-pack only the runs containing an entity of `dirty`.
    ///
    /// Runs whose membership changed since their buffer was built, and runs
    /// without a buffer, are rebuilt as well. Runs of meshes the backend does
    /// not know are skipped. Returns the number of runs actually re-packed.
    pub fn update_instanced_buffer<B>(
        &mut self,
        scene: &SceneManager,
        dirty: &HashSet<Entity>,
        backend: &mut B,
    ) -> RenderResult<usize>
    where
        B: RenderBackend + ?Sized,
    {
        let mut rebuilt = 0;

        for (mesh, range) in self.drawable_run_ranges() {
            if !self.mesh_loaded(mesh, range.len(), backend)? {
                continue;
            }

            let entities = &self.tracked[range];
            let stale = self
                .buffers
                .get(&mesh)
                .map_or(true, |buffer| buffer.instance_count != entities.len());

            if !stale && !entities.iter().any(|entity| dirty.contains(entity)) {
                continue;
            }

            log::debug!("Re-packing run of mesh {:?} ({} instances)", mesh, entities.len());
            let built = self.build_run(scene, mesh, entities, backend)?;
            if built.is_some() {
                rebuilt += 1;
            }
            self.replace_buffer(mesh, built, backend)?;
        }

        self.refresh_totals();
        Ok(rebuilt)
    }

    /// Issue one instanced draw per built run, ascending by mesh id
    pub fn run_shader<B>(&mut self, backend: &mut B) -> RenderResult<usize>
    where
        B: RenderBackend + ?Sized,
    {
        let mut draws = 0;

        for (&mesh, buffer) in &self.buffers {
            let Some(info) = backend.mesh_info(mesh) else {
                log::warn!("Skipping draw of unknown mesh {:?}", mesh);
                continue;
            };

            let instance_count = u32::try_from(buffer.instance_count).map_err(|_| {
                RenderError::RenderingFailed(format!(
                    "{} instances of mesh {:?} exceed one draw call",
                    buffer.instance_count, mesh
                ))
            })?;

            backend.draw_instanced(info.vertex_layout, buffer.handle, info.index_count, instance_count)?;
            draws += 1;
        }

        self.stats.draw_calls = draws;
        Ok(draws)
    }

    /// Release every instance buffer held by the batcher
    pub fn release_buffers<S>(&mut self, sink: &mut S) -> RenderResult<()>
    where
        S: GpuBufferSink + ?Sized,
    {
        while let Some((mesh, buffer)) = self.buffers.pop_first() {
            sink.release_buffer(buffer.handle)?;
            self.stats.buffers_released += 1;
            log::trace!("Released instance buffer of mesh {:?}", mesh);
        }
        self.refresh_totals();
        Ok(())
    }

    /// Batching counters
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    fn build_run<B>(
        &self,
        scene: &SceneManager,
        mesh: MeshId,
        entities: &[Entity],
        backend: &mut B,
    ) -> RenderResult<Option<InstanceBuffer>>
    where
        B: RenderBackend + ?Sized,
    {
        let Some(info) = backend.mesh_info(mesh) else {
            return Ok(None);
        };

        let matrices: HashMap<Entity, Mat4> = entities
            .iter()
            .map(|&entity| (entity, scene.model_matrix_of(entity).unwrap_or_else(Mat4::identity)))
            .collect();

        let generators = self.canonical_generators(&matrices);
        pack(entities, &generators, info.vertex_layout, backend)
    }

    /// Four model-matrix columns followed by the auxiliary indices
    fn canonical_generators<'a>(&'a self, matrices: &'a HashMap<Entity, Mat4>) -> Vec<AttributeGenerator<'a>> {
        let mut generators: Vec<AttributeGenerator<'a>> = (0..4u32)
            .map(|column| {
                let first = column as usize * 4;
                AttributeGenerator::new(16, 4, self.config.model_matrix_slot + column, ScalarType::Float, move |dst, entity| {
                    let matrix = matrices.get(&entity).copied().unwrap_or_else(Mat4::identity);
                    dst.copy_from_slice(bytemuck::cast_slice(&matrix.as_slice()[first..first + 4]));
                })
            })
            .collect();

        let count = self.config.auxiliary_index_count;
        generators.push(AttributeGenerator::new(
            (count * 4).next_multiple_of(16),
            count as u32,
            self.config.auxiliary_slot,
            ScalarType::Int,
            move |dst, entity| {
                let indices = self.auxiliary.get(&entity);
                for (i, chunk) in dst[..count * 4].chunks_exact_mut(4).enumerate() {
                    let value = indices.and_then(|v| v.get(i)).copied().unwrap_or(NO_TEXTURE);
                    chunk.copy_from_slice(&value.to_ne_bytes());
                }
            },
        ));

        generators
    }

    /// Whether the backend knows `mesh`.
    ///
    /// An unknown mesh loses any buffer it held. The warning is logged once
    /// per run size, so a run that stays unloaded does not log every frame.
    fn mesh_loaded<B>(&mut self, mesh: MeshId, count: usize, backend: &mut B) -> RenderResult<bool>
    where
        B: RenderBackend + ?Sized,
    {
        if backend.mesh_info(mesh).is_some() {
            self.skipped.remove(&mesh);
            return Ok(true);
        }

        if self.skipped.insert(mesh, count) != Some(count) {
            log::warn!("Mesh {:?} is not loaded, its {} instances are skipped", mesh, count);
        }
        self.replace_buffer(mesh, None, backend)?;
        Ok(false)
    }

    fn replace_buffer<S>(&mut self, mesh: MeshId, built: Option<InstanceBuffer>, sink: &mut S) -> RenderResult<()>
    where
        S: GpuBufferSink + ?Sized,
    {
        if let Some(buffer) = built {
            self.stats.buffers_built += 1;
            if let Some(old) = self.buffers.insert(mesh, buffer) {
                sink.release_buffer(old.handle)?;
                self.stats.buffers_released += 1;
            }
        } else if let Some(old) = self.buffers.remove(&mesh) {
            sink.release_buffer(old.handle)?;
            self.stats.buffers_released += 1;
        }
        Ok(())
    }

    fn refresh_totals(&mut self) {
        self.stats.runs = self.buffers.len();
        self.stats.instances = self.buffers.values().map(|b| b.instance_count).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentKind;
    use crate::render::backends::HeadlessBackend;

    fn scene_with_meshes(meshes: &[u64]) -> (SceneManager, Vec<Entity>) {
        let mut scene = SceneManager::new();
        let entities = meshes
            .iter()
            .map(|&mesh| {
                let (entity, _) = scene.create_entity_with_transform(Entity::INVALID);
                scene.set_mesh(entity, MeshId(mesh));
                entity
            })
            .collect();
        (scene, entities)
    }

    fn tracked_meshes(batcher: &MeshBatcher, world: &World) -> Vec<u64> {
        batcher.tracked().iter().map(|&e| world.mesh_of(e).0).collect()
    }

    #[test]
    fn test_insertion_keeps_mesh_order() {
        let (scene, entities) = scene_with_meshes(&[2, 1, 2]);
        let mut batcher = MeshBatcher::new(InstancingConfig::default());
        for &e in &entities {
            batcher.add_object(scene.world(), e);
        }

        assert_eq!(tracked_meshes(&batcher, scene.world()), vec![1, 2, 2]);
        // Equal keys keep insertion order
        assert_eq!(batcher.tracked(), &[entities[1], entities[0], entities[2]]);
    }

    #[test]
    fn test_ordering_invariant_over_many_inserts() {
        let meshes = [5, 3, 0, 9, 3, 1, 5, 0, 2, 9, 9, 4, 1];
        let (scene, entities) = scene_with_meshes(&meshes);
        let mut batcher = MeshBatcher::new(InstancingConfig::default());

        for &e in &entities {
            batcher.add_object(scene.world(), e);
            let order = tracked_meshes(&batcher, scene.world());
            assert!(order.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_runs_partition_tracked_set() {
        let (scene, entities) = scene_with_meshes(&[3, 0, 1, 3, 1, 1, 7]);
        let mut batcher = MeshBatcher::new(InstancingConfig::default());
        for &e in &entities {
            batcher.add_object(scene.world(), e);
        }

        let runs = batcher.runs();
        let meshes: Vec<u64> = runs.iter().map(|r| r.mesh.0).collect();
        assert_eq!(meshes, vec![0, 1, 3, 7]);

        let flattened: Vec<Entity> = runs.iter().flat_map(|r| r.entities.iter().copied()).collect();
        assert_eq!(flattened, batcher.tracked());
        assert!(runs.windows(2).all(|w| w[0].mesh != w[1].mesh));
        assert!(runs.iter().all(|r| !r.entities.is_empty()));
    }

    #[test]
    fn test_empty_batcher_has_no_runs() {
        let batcher = MeshBatcher::new(InstancingConfig::default());
        assert!(batcher.runs().is_empty());
    }

    #[test]
    fn test_add_object_with_children() {
        let mut scene = SceneManager::new();
        let (root, _) = scene.create_entity_with_transform(Entity::INVALID);
        let (child, _) = scene.create_entity_with_transform(root);
        let (grandchild, _) = scene.create_entity_with_transform(child);
        let (_unrelated, _) = scene.create_entity_with_transform(Entity::INVALID);
        scene.set_mesh(root, MeshId(2));
        scene.set_mesh(child, MeshId(1));
        scene.set_mesh(grandchild, MeshId(2));

        let mut batcher = MeshBatcher::new(InstancingConfig::default());
        batcher.add_object_with_children(&scene, root);

        assert_eq!(batcher.tracked().len(), 3);
        assert_eq!(tracked_meshes(&batcher, scene.world()), vec![1, 2, 2]);
    }

    #[test]
    fn test_auxiliary_indices_are_padded() {
        let (_, entities) = scene_with_meshes(&[1]);
        let mut batcher = MeshBatcher::new(InstancingConfig::default());

        batcher.set_auxiliary_indices(entities[0], &[4]);
        assert_eq!(batcher.auxiliary_indices(entities[0]), Some(&[4, NO_TEXTURE, NO_TEXTURE][..]));

        batcher.set_auxiliary_indices(entities[0], &[1, 2, 3, 4]);
        assert_eq!(batcher.auxiliary_indices(entities[0]), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_texture_mapping_assigns_shared_slots() {
        let mut backend = HeadlessBackend::new();
        let brick = backend.register_material(vec![TextureId(10), TextureId(11)]);
        let stone = backend.register_material(vec![TextureId(11), TextureId::INVALID, TextureId(12)]);

        let (mut scene, entities) = scene_with_meshes(&[1, 1, 2]);
        scene.set_material(entities[0], brick);
        scene.set_material(entities[1], stone);

        let mut batcher = MeshBatcher::new(InstancingConfig::default());
        for &e in &entities {
            batcher.add_object(scene.world(), e);
        }
        batcher.run_texture_mapping(scene.world(), &backend);

        assert_eq!(batcher.auxiliary_indices(entities[0]), Some(&[0, 1, NO_TEXTURE][..]));
        assert_eq!(batcher.auxiliary_indices(entities[1]), Some(&[1, NO_TEXTURE, 2][..]));
        assert_eq!(batcher.auxiliary_indices(entities[2]), Some(&[NO_TEXTURE; 3][..]));
        assert_eq!(batcher.texture_bindings().count(), 3);
    }

    #[test]
    fn test_texture_mapping_evicts_unused_textures() {
        let mut backend = HeadlessBackend::new();
        let first = backend.register_material(vec![TextureId(1), TextureId(2)]);
        let second = backend.register_material(vec![TextureId(3)]);

        let (mut scene, entities) = scene_with_meshes(&[1]);
        scene.set_material(entities[0], first);

        let config = InstancingConfig {
            texture_slots: 2,
            ..InstancingConfig::default()
        };
        let mut batcher = MeshBatcher::new(config);
        batcher.add_object(scene.world(), entities[0]);
        batcher.run_texture_mapping(scene.world(), &backend);
        assert_eq!(batcher.texture_bindings().count(), 2);

        scene.set_material(entities[0], second);
        batcher.run_texture_mapping(scene.world(), &backend);

        assert_eq!(batcher.auxiliary_indices(entities[0]), Some(&[0, NO_TEXTURE, NO_TEXTURE][..]));
        assert_eq!(batcher.texture_bindings().collect::<Vec<_>>(), vec![(0, TextureId(3))]);
    }

    #[test]
    fn test_invalid_mesh_run_is_not_built() {
        let mut backend = HeadlessBackend::new();
        let mesh = backend.register_mesh(6);
        let mut scene = SceneManager::new();
        let (without_mesh, _) = scene.create_entity_with_transform(Entity::INVALID);
        let (with_mesh, _) = scene.create_entity_with_transform(Entity::INVALID);
        scene.world_mut().add_component(with_mesh, ComponentKind::Mesh, mesh, true);

        let mut batcher = MeshBatcher::new(InstancingConfig::default());
        batcher.add_object(scene.world(), without_mesh);
        batcher.add_object(scene.world(), with_mesh);
        batcher.run_instancing(&scene, &mut backend).unwrap();

        assert_eq!(batcher.runs().len(), 2);
        assert_eq!(batcher.instance_counts().collect::<Vec<_>>(), vec![(mesh, 1)]);
        assert_eq!(batcher.run_shader(&mut backend).unwrap(), 1);
    }

    #[test]
    fn test_try_new_rejects_invalid_config() {
        let too_many = InstancingConfig {
            auxiliary_index_count: 5,
            ..InstancingConfig::default()
        };
        let none = InstancingConfig {
            auxiliary_index_count: 0,
            ..InstancingConfig::default()
        };

        assert!(matches!(MeshBatcher::try_new(too_many), Err(ConfigError::Invalid(_))));
        assert!(matches!(MeshBatcher::try_new(none), Err(ConfigError::Invalid(_))));
        assert!(MeshBatcher::try_new(InstancingConfig::default()).is_ok());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid instancing config")]
    fn test_new_with_invalid_config_is_a_contract_violation() {
        let config = InstancingConfig {
            auxiliary_slot: 4,
            ..InstancingConfig::default()
        };
        let _ = MeshBatcher::new(config);
    }

    #[test]
    fn test_batch_stats_average() {
        let stats = BatchStats {
            runs: 4,
            instances: 10,
            ..BatchStats::default()
        };
        assert_eq!(stats.avg_instances_per_draw(), 2.5);
        assert_eq!(BatchStats::default().avg_instances_per_draw(), 0.0);
    }
}
