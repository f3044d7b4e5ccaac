//! Mesh statistics reporting.
//!
//! Each pipeline stage logs a statistics block after mutating the mesh, the
//! quickest way to see what a stage actually did to a model.

use tracing::info;

use crate::components::find_connected_components;
use crate::types::Mesh;

/// Snapshot of mesh metrics.
#[derive(Debug, Clone)]
pub struct MeshStats {
    pub vertices: usize,
    pub facets: usize,
    pub triangulated: bool,
    pub components: usize,
    pub surface_area: f64,
    pub dimensions: [f64; 3],
}

impl MeshStats {
    /// Gather statistics from a mesh.
    pub fn gather(mesh: &Mesh) -> Self {
        let components = find_connected_components(mesh).component_count;
        let dimensions = mesh
            .bounds()
            .map(|(min, max)| {
                let d = max - min;
                [d.x, d.y, d.z]
            })
            .unwrap_or([0.0; 3]);

        Self {
            vertices: mesh.vertex_count(),
            facets: mesh.facet_count(),
            triangulated: mesh.is_triangulated(),
            components,
            surface_area: mesh.surface_area(),
            dimensions,
        }
    }
}

impl std::fmt::Display for MeshStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  vertices:   {}", self.vertices)?;
        writeln!(
            f,
            "  facets:     {}{}",
            self.facets,
            if self.triangulated {
                " (triangulated)"
            } else {
                ""
            }
        )?;
        writeln!(f, "  components: {}", self.components)?;
        writeln!(f, "  area:       {:.4}", self.surface_area)?;
        write!(
            f,
            "  dimensions: {:.3} x {:.3} x {:.3}",
            self.dimensions[0], self.dimensions[1], self.dimensions[2]
        )
    }
}

/// Log a statistics block for the current mesh state.
pub fn show_stats(mesh: &Mesh, label: &str) -> MeshStats {
    let stats = MeshStats::gather(mesh);
    info!("Mesh stats [{}]:\n{}", label, stats);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Facet, Vertex};

    #[test]
    fn test_gather_stats() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(2.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 2.0, 0.0));
        mesh.facets.push(Facet::triangle(0, 1, 2));

        let stats = MeshStats::gather(&mesh);
        assert_eq!(stats.vertices, 3);
        assert_eq!(stats.facets, 1);
        assert_eq!(stats.components, 1);
        assert!(stats.triangulated);
        assert!((stats.surface_area - 2.0).abs() < 1e-12);
        assert_eq!(stats.dimensions, [2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_stats_display() {
        let mesh = Mesh::new();
        let stats = MeshStats::gather(&mesh);
        let out = format!("{}", stats);
        assert!(out.contains("vertices:   0"));
        assert!(out.contains("components: 0"));
    }
}
