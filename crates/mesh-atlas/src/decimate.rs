//! Mesh simplification by vertex clustering.
//!
//! Vertices are binned into a uniform 3D grid laid over the bounding box and
//! every bin collapses to a single representative vertex. The operation is
//! deliberately not topology-preserving: manifold boundaries may merge, which
//! is the accepted trade-off for its speed and robustness on dirty input.

use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use tracing::{debug, info};

use crate::adjacency::MeshAdjacency;
use crate::repair::remove_duplicate_facets;
use crate::types::{Facet, Mesh, Vertex};

/// Parameters for vertex-clustering decimation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecimateParams {
    /// Grid resolution: number of cells along the longest bounding-box axis.
    pub bins: u32,

    /// Whether to drop duplicate facets produced by the collapse.
    pub drop_duplicate_facets: bool,

    /// Whether to run the degree-3 pass afterwards: vertices incident to
    /// exactly 3 facets are removed and their fan replaced by one triangle.
    /// These vertices add triangles without contributing shape.
    pub collapse_degree3: bool,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            bins: 100,
            drop_duplicate_facets: true,
            collapse_degree3: true,
        }
    }
}

impl DecimateParams {
    /// Create params with a specific grid resolution.
    pub fn with_bins(bins: u32) -> Self {
        Self {
            bins,
            ..Default::default()
        }
    }
}

/// Statistics from a decimation run.
#[derive(Debug, Clone)]
pub struct DecimateResult {
    pub original_vertices: usize,
    pub final_vertices: usize,
    pub original_facets: usize,
    pub final_facets: usize,
    /// Occupied grid cells; the clustered vertex count never exceeds this.
    pub occupied_cells: usize,
    /// Degree-3 vertices collapsed in the second pass.
    pub degree3_collapsed: usize,
}

/// Decimate a mesh in place by vertex clustering.
///
/// Each occupied grid cell collapses to the *average position* of its
/// vertices; the attributes of the cell's lowest-index vertex are carried
/// over. Facets whose ring collapses below 3 distinct corners are dropped.
pub fn decimate_mesh(mesh: &mut Mesh, params: &DecimateParams) -> DecimateResult {
    let original_vertices = mesh.vertex_count();
    let original_facets = mesh.facet_count();

    let mut result = DecimateResult {
        original_vertices,
        final_vertices: original_vertices,
        original_facets,
        final_facets: original_facets,
        occupied_cells: original_vertices,
        degree3_collapsed: 0,
    };

    let Some((min, max)) = mesh.bounds() else {
        return result;
    };

    if params.bins == 0 || mesh.facets.is_empty() {
        return result;
    }

    let extent = max - min;
    let longest = extent.x.max(extent.y).max(extent.z);
    if longest <= 0.0 {
        return result;
    }
    let cell_size = longest / params.bins as f64;

    // Bin vertices into cells
    let mut cells: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let cell = cell_of(&vertex.position, &min, cell_size);
        cells.entry(cell).or_default().push(idx as u32);
    }
    result.occupied_cells = cells.len();

    // One representative per occupied cell, keyed deterministically by the
    // lowest vertex index it holds
    let mut clusters: Vec<Vec<u32>> = cells.into_values().collect();
    clusters.sort_by_key(|members| *members.iter().min().unwrap());

    let mut remap: Vec<u32> = vec![0; mesh.vertices.len()];
    let mut new_vertices: Vec<Vertex> = Vec::with_capacity(clusters.len());

    for members in &clusters {
        let new_idx = new_vertices.len() as u32;

        let mut centroid = Point3::origin();
        for &m in members {
            centroid.coords += mesh.vertices[m as usize].position.coords;
            remap[m as usize] = new_idx;
        }
        centroid.coords /= members.len() as f64;

        let keeper = *members.iter().min().unwrap();
        let mut vertex = mesh.vertices[keeper as usize].clone();
        vertex.position = centroid;
        new_vertices.push(vertex);
    }

    mesh.vertices = new_vertices;

    for facet in &mut mesh.facets {
        for v in &mut facet.vertices {
            *v = remap[*v as usize];
        }
        facet.dedup_ring();
    }
    mesh.facets.retain(|f| {
        let distinct: HashSet<u32> = f.vertices.iter().copied().collect();
        distinct.len() >= 3
    });

    if params.drop_duplicate_facets {
        remove_duplicate_facets(mesh);
    }

    mesh.remove_unreferenced_vertices();

    if params.collapse_degree3 {
        result.degree3_collapsed = collapse_degree3_vertices(mesh);
    }

    result.final_vertices = mesh.vertex_count();
    result.final_facets = mesh.facet_count();

    info!(
        "Decimated mesh: {} -> {} vertices, {} -> {} facets ({} occupied cells)",
        original_vertices,
        result.final_vertices,
        original_facets,
        result.final_facets,
        result.occupied_cells
    );

    result
}

/// Collapse vertices incident to exactly 3 triangles.
///
/// Such a vertex sits in the middle of a triangular fan; removing it and
/// re-covering the fan's boundary ring with a single triangle preserves the
/// silhouette while dropping two facets per vertex.
///
/// Returns the number of vertices collapsed.
pub fn collapse_degree3_vertices(mesh: &mut Mesh) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.facets);

    let mut removed_facets: HashSet<u32> = HashSet::new();
    let mut new_facets: Vec<Facet> = Vec::new();
    let mut collapsed = 0;

    // Visit vertices in index order so the pass is deterministic
    let mut candidates: Vec<u32> = adjacency
        .vertex_to_facets
        .iter()
        .filter(|(_, incident)| incident.len() == 3)
        .map(|(&v, _)| v)
        .collect();
    candidates.sort_unstable();

    for v in &candidates {
        let incident = adjacency.facets_around_vertex(*v);

        // Skip vertices whose fan was already touched this pass
        if incident.iter().any(|f| removed_facets.contains(f)) {
            continue;
        }

        // All three must be triangles containing v
        if incident
            .iter()
            .any(|&f| mesh.facets[f as usize].degree() != 3)
        {
            continue;
        }

        // Collect the ring: every corner of the fan that is not v. A closed
        // fan has exactly 3 ring vertices, each shared by 2 of the 3 facets.
        let mut ring_count: HashMap<u32, usize> = HashMap::new();
        for &f in incident {
            for &corner in &mesh.facets[f as usize].vertices {
                if corner != *v {
                    *ring_count.entry(corner).or_insert(0) += 1;
                }
            }
        }
        if ring_count.len() != 3 || ring_count.values().any(|&c| c != 2) {
            continue;
        }

        // Take winding from one fan triangle: rotate (a, v, b) so v leads,
        // the remaining ring vertex closes the new triangle
        let f0 = &mesh.facets[incident[0] as usize];
        let pos = f0.vertices.iter().position(|&c| c == *v).unwrap();
        let a = f0.vertices[(pos + 1) % 3];
        let b = f0.vertices[(pos + 2) % 3];
        let c = *ring_count
            .keys()
            .find(|&&r| r != a && r != b)
            .expect("third ring vertex");

        for &f in incident {
            removed_facets.insert(f);
        }
        new_facets.push(Facet::triangle(a, b, c));
        collapsed += 1;
    }

    if collapsed == 0 {
        return 0;
    }

    let mut idx = 0u32;
    mesh.facets.retain(|_| {
        let keep = !removed_facets.contains(&idx);
        idx += 1;
        keep
    });
    mesh.facets.extend(new_facets);
    mesh.remove_unreferenced_vertices();

    debug!("Collapsed {} degree-3 vertices", collapsed);

    collapsed
}

/// Grid cell of a position.
fn cell_of(pos: &Point3<f64>, min: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        ((pos.x - min.x) / cell_size).floor() as i64,
        ((pos.y - min.y) / cell_size).floor() as i64,
        ((pos.z - min.z) / cell_size).floor() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A dense planar grid of triangles, (n+1)^2 vertices.
    fn make_grid_mesh(n: u32) -> Mesh {
        let mut mesh = Mesh::new();
        for j in 0..=n {
            for i in 0..=n {
                mesh.vertices
                    .push(Vertex::from_coords(i as f64, j as f64, 0.0));
            }
        }
        let idx = |i: u32, j: u32| j * (n + 1) + i;
        for j in 0..n {
            for i in 0..n {
                mesh.facets
                    .push(Facet::triangle(idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)));
                mesh.facets
                    .push(Facet::triangle(idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)));
            }
        }
        mesh
    }

    #[test]
    fn test_decimation_reduces_counts() {
        let mut mesh = make_grid_mesh(10); // 121 vertices
        let before = mesh.vertex_count();

        let result = decimate_mesh(&mut mesh, &DecimateParams::with_bins(4));

        assert!(result.final_vertices < before);
        assert!(result.final_facets < result.original_facets);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_vertex_count_bounded_by_occupied_cells() {
        let mut mesh = make_grid_mesh(12);
        let result = decimate_mesh(&mut mesh, &DecimateParams::with_bins(5));

        assert!(
            result.final_vertices <= result.occupied_cells,
            "{} vertices exceed {} occupied cells",
            result.final_vertices,
            result.occupied_cells
        );
    }

    #[test]
    fn test_no_dangling_indices_after_decimation() {
        let mut mesh = make_grid_mesh(8);
        decimate_mesh(&mut mesh, &DecimateParams::with_bins(3));

        for facet in &mesh.facets {
            for &v in &facet.vertices {
                assert!((v as usize) < mesh.vertex_count());
            }
        }
    }

    #[test]
    fn test_zero_bins_is_noop() {
        let mut mesh = make_grid_mesh(4);
        let before = mesh.vertex_count();

        let result = decimate_mesh(&mut mesh, &DecimateParams::with_bins(0));
        assert_eq!(result.final_vertices, before);
    }

    #[test]
    fn test_representative_is_cell_average() {
        // Two vertices in the same cell must collapse to their midpoint
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.2, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(5.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(5.0, 5.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 5.0, 0.0));
        mesh.facets.push(Facet::triangle(0, 2, 3));
        mesh.facets.push(Facet::triangle(1, 3, 4));

        decimate_mesh(
            &mut mesh,
            &DecimateParams {
                bins: 4,
                drop_duplicate_facets: true,
                collapse_degree3: false,
            },
        );

        let merged = mesh
            .vertices
            .iter()
            .find(|v| v.position.x > 0.05 && v.position.x < 0.15)
            .expect("merged representative at average position");
        assert!((merged.position.x - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_collapse_degree3() {
        // A triangle with a steiner point in the middle: the point has
        // exactly 3 incident triangles and must collapse away.
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0)); // 0
        mesh.vertices.push(Vertex::from_coords(4.0, 0.0, 0.0)); // 1
        mesh.vertices.push(Vertex::from_coords(2.0, 3.0, 0.0)); // 2
        mesh.vertices.push(Vertex::from_coords(2.0, 1.0, 0.0)); // 3 (center)
        mesh.facets.push(Facet::triangle(0, 1, 3));
        mesh.facets.push(Facet::triangle(1, 2, 3));
        mesh.facets.push(Facet::triangle(2, 0, 3));

        let collapsed = collapse_degree3_vertices(&mut mesh);
        assert_eq!(collapsed, 1);
        assert_eq!(mesh.facet_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);

        // Winding preserved: normal still points +Z
        let n = mesh.facet_normal(0).unwrap();
        assert!(n.z > 0.99);
    }

    #[test]
    fn test_collapse_degree3_skips_boundary_vertex() {
        // A vertex with 3 incident facets whose fan is open (boundary):
        // ring has a vertex appearing only once, so it must not collapse.
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0)); // 0 center
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0)); // 1
        mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0)); // 2
        mesh.vertices.push(Vertex::from_coords(-0.5, 1.0, 0.0)); // 3
        mesh.vertices.push(Vertex::from_coords(-1.0, 0.0, 0.0)); // 4
        mesh.facets.push(Facet::triangle(0, 1, 2));
        mesh.facets.push(Facet::triangle(0, 2, 3));
        mesh.facets.push(Facet::triangle(0, 3, 4));

        let collapsed = collapse_degree3_vertices(&mut mesh);
        assert_eq!(collapsed, 0);
        assert_eq!(mesh.facet_count(), 3);
    }
}
