//! Scene management system
//!
//! Spatial placement of entities.
//!
//! ## Architecture
//!
//! ```text
//! SceneManager (context object)
//!   ├── World           entity → {kind → id}
//!   └── TransformGraph  write-ahead nodes, delta propagation
//! ```

mod scene_manager;
mod transform;
mod transform_graph;

pub use scene_manager::SceneManager;
pub use transform::{Transform, TransformDelta, TransformState};
pub use transform_graph::TransformGraph;
