//! Error types for the conversion pipeline.
//!
//! Only structural failures are surfaced here: unreadable or malformed input,
//! a mesh that is empty after repair, and output paths that cannot be written.
//! Numerical edge cases inside the stages (degenerate facets, charts that
//! cannot be conformally solved) are recovered locally with a logged fallback
//! and never abort the pipeline.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that can occur during mesh loading, processing, or saving.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read mesh from {path}")]
    #[diagnostic(
        code(mesh::io::read),
        help("Check that the file exists and is readable")
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(mesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a mesh file.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(mesh::parse::error),
        help(
            "The file may be corrupted or in an unsupported format variant. Try re-exporting from the original software."
        )
    )]
    ParseError { path: PathBuf, details: String },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(
        code(mesh::format::unsupported),
        help("Supported formats: STL, OBJ, PLY")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Empty or degenerate mesh (no vertices or facets left).
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(mesh::validation::empty),
        help(
            "The mesh must have at least one vertex and one facet. Repair may have removed everything; check the input and the colocation tolerance."
        )
    )]
    EmptyMesh { details: String },

    /// Invalid vertex index in facet data.
    #[error(
        "invalid vertex index: facet {facet_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(mesh::validation::vertex_index),
        help("Check the mesh export settings; facet indices must reference existing vertices.")
    )]
    InvalidVertexIndex {
        facet_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Invalid coordinate value (NaN or Infinity).
    #[error("invalid coordinate at vertex {vertex_index}: {coordinate} is {value}")]
    #[diagnostic(
        code(mesh::validation::coordinate),
        help(
            "Check for numerical issues in the source data. This often happens with very small or very large values."
        )
    )]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// Atlas construction failed for the whole mesh.
    #[error("atlas construction failed: {details}")]
    #[diagnostic(
        code(mesh::atlas::failed),
        help("Run repair first so the mesh has consistent connectivity, then retry.")
    )]
    AtlasFailed { details: String },
}

impl MeshError {
    /// Shorthand for an I/O read error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for an I/O write error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a parse error.
    pub fn parse(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }
}
