//! The conversion pipeline: repair, decimate, orient, atlas, bake.
//!
//! Stages run strictly in sequence against one mutable mesh; each stage
//! requires the previous stage's invariants (deduplicated, intersection-free,
//! oriented) before it runs. Data parallelism lives inside the stages, never
//! across them.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::atlas::{Atlas, AtlasParams, make_atlas};
use crate::bake::{bake_facet_normals, bake_vertex_colors, save_image};
use crate::decimate::{DecimateParams, decimate_mesh};
use crate::error::MeshResult;
use crate::io::{load_mesh, save_mesh_with_texture};
use crate::orient::orient_normals;
use crate::repair::{RepairParams, repair_mesh_with_config};
use crate::stats::{MeshStats, show_stats};
use crate::types::Mesh;

/// Full pipeline configuration, loadable from TOML.
///
/// # Example TOML
///
/// ```toml
/// texture_size = 512
/// decimate_bins = 100
///
/// [repair]
/// colocate_tolerance = 0.001
/// min_component_area = 0.01
///
/// [atlas]
/// hard_angle_deg = 45.0
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Repair stage parameters.
    pub repair: RepairParams,

    /// Grid resolution for the decimation stage; `None` skips decimation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimate_bins: Option<u32>,

    /// Atlas construction parameters.
    pub atlas: AtlasParams,

    /// Side length of baked images in pixels.
    pub texture_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repair: RepairParams::default(),
            decimate_bins: None,
            atlas: AtlasParams::default(),
            texture_size: 1024,
        }
    }
}

/// Errors from reading or writing a pipeline configuration file.
#[derive(Debug, Error)]
pub enum PipelineConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("invalid config file")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),
}

impl PipelineConfig {
    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PipelineConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&contents)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Run the geometry stages on a mesh: repair, optional decimation, normal
/// orientation, and atlas construction.
///
/// The mesh is mutated in place; the returned atlas references its final
/// facet indices.
pub fn process_mesh(mesh: &mut Mesh, config: &PipelineConfig) -> MeshResult<Atlas> {
    show_stats(mesh, "input");

    repair_mesh_with_config(mesh, &config.repair)?;
    show_stats(mesh, "repair");

    if let Some(bins) = config.decimate_bins {
        decimate_mesh(mesh, &DecimateParams::with_bins(bins));
        show_stats(mesh, "decimate");
    }

    orient_normals(mesh);

    let atlas = make_atlas(mesh, &config.atlas)?;
    info!(
        "Atlas: {} chart(s), {} via projection fallback",
        atlas.chart_count(),
        atlas.fallback_count()
    );
    show_stats(mesh, "atlas");

    Ok(atlas)
}

/// File-to-file conversion: load, process, bake, save.
///
/// `out_texture` receives the vertex-color bake, `out_normal_map` the facet
/// normal bake; either may be omitted. The output mesh references the
/// texture when one was written.
pub fn convert_file(
    input: &Path,
    out_mesh: &Path,
    out_texture: Option<&Path>,
    out_normal_map: Option<&Path>,
    config: &PipelineConfig,
) -> MeshResult<MeshStats> {
    let mut mesh = load_mesh(input)?;

    let atlas = process_mesh(&mut mesh, config)?;

    if let Some(path) = out_normal_map {
        let image = bake_facet_normals(&mesh, &atlas, config.texture_size);
        save_image(path, &image)?;
    }

    if let Some(path) = out_texture {
        let image = bake_vertex_colors(&mesh, &atlas, config.texture_size);
        save_image(path, &image)?;
    }

    save_mesh_with_texture(&mesh, Some(&atlas), out_mesh, out_texture)?;

    Ok(show_stats(&mesh, "output"))
}
