//! Per-frame driver
//!
//! One frame of the instancing pipeline: apply staged transform changes,
//! re-pack the mesh runs they touched, then draw every run.

use super::api::RenderBackend;
use super::instancing::MeshBatcher;
use super::RenderResult;
use crate::scene::SceneManager;

/// What one frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Entities whose transform changed in the flush
    pub changed_entities: usize,
    /// Mesh runs re-packed
    pub runs_rebuilt: usize,
    /// Instanced draw calls issued
    pub draw_calls: usize,
}

/// Flush transforms, update affected instance buffers and draw
pub fn run_frame<B>(
    scene: &mut SceneManager,
    batcher: &mut MeshBatcher,
    backend: &mut B,
) -> RenderResult<FrameReport>
where
    B: RenderBackend + ?Sized,
{
    let changed = scene.flush_updates();
    let runs_rebuilt = batcher.update_instanced_buffer(scene, &changed, backend)?;
    let draw_calls = batcher.run_shader(backend)?;

    let report = FrameReport {
        changed_entities: changed.len(),
        runs_rebuilt,
        draw_calls,
    };
    log::trace!("{:?}", report);
    Ok(report)
}
