//! Connected component analysis and small-component pruning.
//!
//! Two facets belong to the same component when they share an edge. Pruning
//! is area-driven: noisy scans and intersection resolution leave behind small
//! disconnected shells whose area is a tiny fraction of the surface.

use hashbrown::HashSet;

use crate::adjacency::MeshAdjacency;
use crate::types::Mesh;
use tracing::{debug, info};

/// Result of connected component analysis.
///
/// Components are sorted by surface area, largest first.
#[derive(Debug, Clone)]
pub struct ComponentAnalysis {
    /// Number of connected components found.
    pub component_count: usize,
    /// Facet indices for each component.
    pub components: Vec<Vec<u32>>,
    /// Surface area of each component, parallel to `components`.
    pub areas: Vec<f64>,
    /// Total surface area of the mesh.
    pub total_area: f64,
}

impl ComponentAnalysis {
    /// Check if the mesh is fully connected (single component).
    pub fn is_connected(&self) -> bool {
        self.component_count == 1
    }

    /// Facet indices of the largest-area component.
    pub fn largest_component(&self) -> &[u32] {
        self.components.first().map(|v| v.as_slice()).unwrap_or(&[])
    }
}

impl std::fmt::Display for ComponentAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Component Analysis:")?;
        writeln!(f, "  Connected components: {}", self.component_count)?;
        if self.component_count > 1 {
            for (i, (comp, area)) in self.components.iter().zip(&self.areas).enumerate() {
                writeln!(
                    f,
                    "    Component {}: {} facets, area {:.4}",
                    i + 1,
                    comp.len(),
                    area
                )?;
            }
        }
        Ok(())
    }
}

/// Find all connected components in a mesh.
///
/// Flood fill over edge adjacency starting from each unvisited facet.
pub fn find_connected_components(mesh: &Mesh) -> ComponentAnalysis {
    if mesh.facets.is_empty() {
        return ComponentAnalysis {
            component_count: 0,
            components: Vec::new(),
            areas: Vec::new(),
            total_area: 0.0,
        };
    }

    let adjacency = MeshAdjacency::build(&mesh.facets);
    let facet_count = mesh.facets.len();

    let mut visited = vec![false; facet_count];
    let mut components: Vec<Vec<u32>> = Vec::new();

    for start_facet in 0..facet_count {
        if visited[start_facet] {
            continue;
        }

        // Worklist flood fill, no recursion
        let mut component = Vec::new();
        let mut queue = vec![start_facet as u32];
        visited[start_facet] = true;

        while let Some(facet_idx) = queue.pop() {
            component.push(facet_idx);

            for (a, b) in mesh.facets[facet_idx as usize].edges() {
                for &neighbor in adjacency.facets_on_edge(a, b) {
                    if !visited[neighbor as usize] {
                        visited[neighbor as usize] = true;
                        queue.push(neighbor);
                    }
                }
            }
        }

        components.push(component);
    }

    let mut areas: Vec<f64> = components
        .iter()
        .map(|comp| comp.iter().map(|&f| mesh.facet_area(f as usize)).sum())
        .collect();
    let total_area: f64 = areas.iter().sum();

    // Sort by area, largest first
    let mut order: Vec<usize> = (0..components.len()).collect();
    order.sort_by(|&a, &b| areas[b].partial_cmp(&areas[a]).unwrap_or(std::cmp::Ordering::Equal));
    components = order.iter().map(|&i| std::mem::take(&mut components[i])).collect();
    areas = order.iter().map(|&i| areas[i]).collect();

    info!(
        "Found {} connected component(s) in mesh with {} facets",
        components.len(),
        facet_count
    );

    if components.len() > 1 {
        debug!(
            "Component areas: {:?}",
            areas.iter().map(|a| format!("{:.4}", a)).collect::<Vec<_>>()
        );
    }

    ComponentAnalysis {
        component_count: components.len(),
        components,
        areas,
        total_area,
    }
}

/// Remove components whose surface area is below `rel_area` times the total.
///
/// The largest component is always kept, so a degenerate threshold can never
/// empty the mesh. Unreferenced vertices are compacted afterwards.
///
/// Returns the number of components removed.
pub fn remove_small_components(mesh: &mut Mesh, rel_area: f64) -> usize {
    let analysis = find_connected_components(mesh);

    if analysis.component_count <= 1 {
        return 0;
    }

    let threshold = rel_area * analysis.total_area;

    // Index 0 is the largest component and always survives
    let keep: Vec<bool> = analysis
        .areas
        .iter()
        .enumerate()
        .map(|(i, &area)| i == 0 || area >= threshold)
        .collect();

    let removed = keep.iter().filter(|&&k| !k).count();
    if removed == 0 {
        return 0;
    }

    info!(
        "Removing {} component(s) below area threshold {:.4} ({}% of total)",
        removed,
        threshold,
        rel_area * 100.0
    );

    let facets_to_keep: HashSet<u32> = analysis
        .components
        .iter()
        .zip(&keep)
        .filter(|&(_, &k)| k)
        .flat_map(|(comp, _)| comp.iter().copied())
        .collect();

    let mut idx = 0u32;
    mesh.facets.retain(|_| {
        let k = facets_to_keep.contains(&idx);
        idx += 1;
        k
    });

    mesh.remove_unreferenced_vertices();

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Facet, Vertex};

    fn create_single_triangle() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.facets.push(Facet::triangle(0, 1, 2));
        mesh
    }

    /// A large two-triangle quad plus a tiny separate triangle.
    fn create_large_and_tiny() -> Mesh {
        let mut mesh = Mesh::new();

        // Large quad (area 100) as two triangles
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.0, 10.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 10.0, 0.0));
        mesh.facets.push(Facet::triangle(0, 1, 2));
        mesh.facets.push(Facet::triangle(0, 2, 3));

        // Tiny triangle far away (area 0.005)
        mesh.vertices.push(Vertex::from_coords(100.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(100.1, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(100.0, 0.1, 0.0));
        mesh.facets.push(Facet::triangle(4, 5, 6));

        mesh
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = Mesh::new();
        let analysis = find_connected_components(&mesh);
        assert_eq!(analysis.component_count, 0);
        assert!(!analysis.is_connected());
    }

    #[test]
    fn test_single_component() {
        let mesh = create_single_triangle();
        let analysis = find_connected_components(&mesh);
        assert_eq!(analysis.component_count, 1);
        assert!(analysis.is_connected());
    }

    #[test]
    fn test_components_sorted_by_area() {
        let mesh = create_large_and_tiny();
        let analysis = find_connected_components(&mesh);

        assert_eq!(analysis.component_count, 2);
        assert_eq!(analysis.components[0].len(), 2);
        assert!(analysis.areas[0] > analysis.areas[1]);
        assert!((analysis.total_area - analysis.areas.iter().sum::<f64>()).abs() < 1e-12);
    }

    #[test]
    fn test_remove_small_components() {
        let mut mesh = create_large_and_tiny();
        let removed = remove_small_components(&mut mesh, 0.01);

        assert_eq!(removed, 1);
        assert_eq!(mesh.facet_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_small_threshold_keeps_everything() {
        let mut mesh = create_large_and_tiny();
        let removed = remove_small_components(&mut mesh, 1e-9);

        assert_eq!(removed, 0);
        assert_eq!(mesh.facet_count(), 3);
    }

    #[test]
    fn test_largest_component_always_survives() {
        let mut mesh = create_large_and_tiny();
        // Threshold so high that every component is below it
        let removed = remove_small_components(&mut mesh, 10.0);

        assert_eq!(removed, 1);
        assert_eq!(mesh.facet_count(), 2, "largest component must remain");
    }

    #[test]
    fn test_area_monotone_under_pruning() {
        let mut mesh = create_large_and_tiny();
        let tau = 0.01;
        let area_before = mesh.surface_area();

        remove_small_components(&mut mesh, tau);

        let area_after = mesh.surface_area();
        assert!(area_after >= (1.0 - tau) * area_before);
    }

    #[test]
    fn test_display() {
        let mesh = create_large_and_tiny();
        let analysis = find_connected_components(&mesh);
        let output = format!("{}", analysis);
        assert!(output.contains("Connected components: 2"));
    }
}
