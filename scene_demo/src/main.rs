//! Headless scene demo
//!
//! Builds a small fleet (a carrier with escorts, each escort carrying a
//! turret) next to an asteroid ring, then runs a fixed number of frames
//! through the instancing pipeline against the headless backend.
//!
//! Usage: `scene_demo [config.toml|config.ron]`

use render_core::foundation::logging;
use render_core::foundation::math::{constants, rotation_from_axis_angle, Vec3};
use render_core::prelude::*;

const FRAMES: u32 = 120;
const ESCORTS: usize = 4;
const ASTEROIDS: usize = 12;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

struct Fleet {
    carrier: Entity,
    carrier_transform: TransformId,
    asteroids: Vec<TransformId>,
}

fn build_scene(scene: &mut SceneManager, backend: &mut HeadlessBackend) -> Fleet {
    let hull = backend.register_mesh(2_904);
    let turret = backend.register_mesh(612);
    let rock = backend.register_mesh(960);

    let hull_paint = backend.register_material(vec![TextureId(1), TextureId(2)]);
    let rock_surface = backend.register_material(vec![TextureId(3)]);

    let (carrier, carrier_transform) = scene.create_entity_with_transform(Entity::INVALID);
    scene.set_mesh(carrier, hull);
    scene.set_material(carrier, hull_paint);
    scene.transforms_mut().set_scale(carrier_transform, Vec3::new(3.0, 3.0, 3.0));

    for i in 0..ESCORTS {
        let angle = i as f32 * 2.0 * constants::PI / ESCORTS as f32;
        let (escort, escort_transform) = scene.create_entity_with_transform(carrier);
        scene.set_mesh(escort, hull);
        scene.set_material(escort, hull_paint);
        scene
            .transforms_mut()
            .set_position(escort_transform, Vec3::new(8.0 * angle.cos(), 0.0, 8.0 * angle.sin()));

        let (gun, gun_transform) = scene.create_entity_with_transform(escort);
        scene.set_mesh(gun, turret);
        scene
            .transforms_mut()
            .set_position(gun_transform, Vec3::new(8.0 * angle.cos(), 1.0, 8.0 * angle.sin()));
    }

    let asteroids = (0..ASTEROIDS)
        .map(|i| {
            let angle = i as f32 * 30.0 * constants::DEG_TO_RAD;
            let (asteroid, transform) = scene.create_entity_with_transform(Entity::INVALID);
            scene.set_mesh(asteroid, rock);
            scene.set_material(asteroid, rock_surface);
            scene
                .transforms_mut()
                .set_position(transform, Vec3::new(40.0 * angle.cos(), 0.0, 40.0 * angle.sin()));
            transform
        })
        .collect();

    Fleet {
        carrier,
        carrier_transform,
        asteroids,
    }
}

fn main() -> Result<(), DemoError> {
    logging::init_with_level(log::LevelFilter::Info);

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            RenderCoreConfig::load_from_file(&path)?
        }
        None => RenderCoreConfig::default(),
    };
    config.validate()?;

    let mut scene = SceneManager::with_config(config.transform.clone());
    let mut backend = HeadlessBackend::new();
    let mut batcher = MeshBatcher::try_new(config.instancing.clone())?;

    let fleet = build_scene(&mut scene, &mut backend);
    scene.flush_updates();

    batcher.add_object_with_children(&scene, fleet.carrier);
    for &asteroid in &fleet.asteroids {
        if let Some(entity) = scene.transforms().get(asteroid).map(|t| t.owner()) {
            batcher.add_object(scene.world(), entity);
        }
    }
    batcher.run_texture_mapping(scene.world(), &backend);
    batcher.run_instancing(&scene, &mut backend)?;

    let mut rebuilt_total = 0;
    for frame in 0..FRAMES {
        let yaw = rotation_from_axis_angle(&Vec3::y(), frame as f32 * 0.02);
        let drift = Vec3::new(frame as f32 * 0.1, 0.0, 0.0);
        scene.transforms_mut().set_rotation(fleet.carrier_transform, yaw);
        scene.transforms_mut().set_position(fleet.carrier_transform, drift);

        if frame % 10 == 0 {
            let index = (frame / 10) as usize % fleet.asteroids.len();
            let id = fleet.asteroids[index];
            if let Some(position) = scene.transforms().get(id).map(|t| t.position()) {
                scene.transforms_mut().set_position(id, position + Vec3::new(0.0, 0.5, 0.0));
            }
        }

        let report = run_frame(&mut scene, &mut batcher, &mut backend)?;
        rebuilt_total += report.runs_rebuilt;
        backend.take_draw_calls();

        if frame % 20 == 0 {
            log::info!(
                "Frame {:>3}: {} entities moved, {} runs re-packed, {} draws",
                frame,
                report.changed_entities,
                report.runs_rebuilt,
                report.draw_calls
            );
        }
    }

    let stats = batcher.stats().clone();
    log::info!(
        "{} frames: {} runs, {} instances ({:.1} per draw), {} re-packs, {} buffers built, {} released",
        FRAMES,
        stats.runs,
        stats.instances,
        stats.avg_instances_per_draw(),
        rebuilt_total,
        stats.buffers_built,
        stats.buffers_released
    );

    batcher.release_buffers(&mut backend)?;
    log::info!(
        "Uploaded {} bytes total, {} buffers still alive",
        backend.stats().bytes_uploaded,
        backend.live_buffer_count()
    );
    Ok(())
}
