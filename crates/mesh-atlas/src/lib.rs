//! Mesh repair, simplification, UV atlas generation, and attribute baking.
//!
//! This crate turns untrusted polygonal surface meshes into clean, textured
//! assets: it deduplicates and repairs geometry, resolves self-intersections,
//! prunes debris, simplifies by vertex clustering, orients facet windings
//! consistently, builds a conformal UV atlas, and bakes per-vertex and
//! per-facet attributes into atlas-aligned images.
//!
//! # Pipeline
//!
//! The stages run strictly in sequence against one mutable [`Mesh`]:
//!
//! 1. **Repair** ([`repair`]): tolerance-based vertex colocation, duplicate
//!    and degenerate facet removal, triangulation, self-intersection
//!    resolution, small-component pruning.
//! 2. **Decimation** ([`decimate`], optional): vertex clustering on a uniform
//!    grid plus a degree-3 collapse pass.
//! 3. **Orientation** ([`orient`]): consistent winding per component, closed
//!    components flipped outward.
//! 4. **Atlas** ([`atlas`]): chart segmentation at hard dihedral angles,
//!    least-squares conformal parameterization, shelf packing into the unit
//!    square.
//! 5. **Bake** ([`bake`]): rasterize facet normals or vertex colors into
//!    images addressed by the atlas.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use mesh_atlas::{PipelineConfig, load_mesh, process_mesh};
//!
//! let mut mesh = load_mesh(Path::new("scan.obj")).unwrap();
//! let atlas = process_mesh(&mut mesh, &PipelineConfig::default()).unwrap();
//! println!("{} charts", atlas.chart_count());
//! ```
//!
//! Or file-to-file, the way the CLI drives it:
//!
//! ```no_run
//! use std::path::Path;
//! use mesh_atlas::{PipelineConfig, convert_file};
//!
//! convert_file(
//!     Path::new("scan.obj"),
//!     Path::new("out.obj"),
//!     Some(Path::new("out_texture.png")),
//!     Some(Path::new("out_normals.png")),
//!     &PipelineConfig::default(),
//! )
//! .unwrap();
//! ```
//!
//! # Logging
//!
//! All stages log through `tracing`. Set `RUST_LOG=mesh_atlas=debug` for
//! per-stage detail when a subscriber is installed.
//!
//! # Numerical conventions
//!
//! Coordinates are `f64` and unit-agnostic. The default colocation tolerance
//! is derived from the average edge length, so repair behaves the same at
//! any scale. Face winding is counter-clockwise viewed from outside.

pub mod adjacency;
pub mod atlas;
pub mod bake;
pub mod components;
pub mod decimate;
mod error;
pub mod intersect;
pub mod io;
pub mod orient;
pub mod pipeline;
pub mod progress;
pub mod repair;
pub mod stats;
mod types;

pub use adjacency::MeshAdjacency;
pub use atlas::{Atlas, AtlasParams, Chart, make_atlas, make_atlas_with_progress};
pub use bake::{Image, bake_facet_normals, bake_vertex_colors, save_image};
pub use components::{ComponentAnalysis, find_connected_components, remove_small_components};
pub use decimate::{DecimateParams, DecimateResult, collapse_degree3_vertices, decimate_mesh};
pub use error::{MeshError, MeshResult};
pub use intersect::{
    IntersectionParams, SelfIntersectionResult, detect_self_intersections,
    resolve_self_intersections,
};
pub use io::{MeshFormat, load_mesh, save_mesh, save_mesh_with_texture};
pub use orient::orient_normals;
pub use pipeline::{PipelineConfig, PipelineConfigError, convert_file, process_mesh};
pub use progress::{Progress, ProgressCallback, ProgressTracker};
pub use repair::{
    RepairParams, colocate_vertices, compute_vertex_normals, remove_degenerate_facets,
    remove_duplicate_facets, repair_mesh, repair_mesh_with_config, triangulate_facets,
};
pub use stats::{MeshStats, show_stats};
pub use types::{Facet, Mesh, Triangle, Vertex, VertexColor};
