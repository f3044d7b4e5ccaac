//! Mesh repair operations: colocation, facet deduplication, triangulation.

use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::components::remove_small_components;
use crate::error::{MeshError, MeshResult};
use crate::intersect::{IntersectionParams, resolve_self_intersections};
use crate::types::{Facet, Mesh, Triangle};

/// Configuration parameters for the repair stage.
///
/// All distance thresholds are in mesh units.
///
/// # Example
///
/// ```
/// use mesh_atlas::RepairParams;
///
/// // Defaults derive the colocation tolerance from the average edge length
/// let params = RepairParams::default();
///
/// // Or pin an absolute tolerance
/// let params = RepairParams {
///     colocate_tolerance: Some(0.01),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RepairParams {
    /// Distance threshold for merging colocated vertices.
    ///
    /// `None` derives the tolerance as `1e-3` of the mesh's average edge
    /// length, so it scales with model size. A tolerance <= 0 disables the
    /// merge entirely (documented no-op, not an error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colocate_tolerance: Option<f64>,

    /// Area below which a triangulated facet is dropped as degenerate.
    pub degenerate_area_epsilon: f64,

    /// Whether to resolve self-intersecting triangle pairs after
    /// triangulation.
    pub resolve_intersections: bool,

    /// Relative area threshold for pruning small connected components.
    ///
    /// Components whose surface area is below this fraction of the total are
    /// removed; the largest component always survives. `0.0` disables pruning.
    pub min_component_area: f64,

    /// Whether to recompute vertex normals after repair.
    pub compute_normals: bool,

    /// Whether to remove unreferenced vertices after repair.
    pub remove_unreferenced: bool,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            colocate_tolerance: None,
            degenerate_area_epsilon: 1e-12,
            resolve_intersections: true,
            min_component_area: 0.01,
            compute_normals: true,
            remove_unreferenced: true,
        }
    }
}

/// Relative factor used to derive the colocation tolerance from the average
/// edge length when none is given explicitly.
pub const COLOCATE_RELATIVE_TOLERANCE: f64 = 1e-3;

/// Merge vertices that are within `tolerance` distance of each other.
///
/// Uses spatial hashing: vertices are bucketed into cells of `2 * tolerance`
/// and each vertex is compared against its 3x3x3 cell neighborhood. Clusters
/// collapse onto the *first-encountered* (lowest-index) vertex, which keeps
/// the operation deterministic and preserves that vertex's attributes.
///
/// Facet references are rewritten; rings that lose corners are compacted and
/// facets with fewer than 3 distinct vertices are dropped.
///
/// A tolerance <= 0 is a documented no-op.
///
/// Returns the number of vertices merged away.
pub fn colocate_vertices(mesh: &mut Mesh, tolerance: f64) -> usize {
    if tolerance <= 0.0 || mesh.vertices.is_empty() {
        return 0;
    }

    let original_count = mesh.vertices.len();
    let cell_size = tolerance * 2.0;

    // Build spatial hash: cell -> vertex indices
    let mut spatial_hash: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let cell = pos_to_cell(&vertex.position, cell_size);
        spatial_hash.entry(cell).or_default().push(idx as u32);
    }

    let mut vertex_remap: Vec<u32> = (0..mesh.vertices.len() as u32).collect();
    let mut merged_count = 0;

    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let idx = idx as u32;
        if vertex_remap[idx as usize] != idx {
            continue; // already merged into an earlier vertex
        }

        let cell = pos_to_cell(&vertex.position, cell_size);

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let neighbor_cell = (cell.0 + dx, cell.1 + dy, cell.2 + dz);

                    if let Some(candidates) = spatial_hash.get(&neighbor_cell) {
                        for &other_idx in candidates {
                            if other_idx <= idx {
                                continue; // only merge into smaller indices
                            }
                            if vertex_remap[other_idx as usize] != other_idx {
                                continue;
                            }

                            let other_pos = &mesh.vertices[other_idx as usize].position;
                            let dist = (vertex.position - other_pos).norm();

                            if dist < tolerance {
                                vertex_remap[other_idx as usize] = idx;
                                merged_count += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    if merged_count == 0 {
        return 0;
    }

    // Resolve transitive merges (A->B, B->C => A->C)
    for i in 0..vertex_remap.len() {
        let mut target = vertex_remap[i];
        while vertex_remap[target as usize] != target {
            target = vertex_remap[target as usize];
        }
        vertex_remap[i] = target;
    }

    for facet in &mut mesh.facets {
        for v in &mut facet.vertices {
            *v = vertex_remap[*v as usize];
        }
        facet.dedup_ring();
    }

    mesh.facets.retain(|f| f.degree() >= 3);

    info!(
        "Colocated {} vertices (tolerance = {:.3e}): {} -> {}",
        merged_count,
        tolerance,
        original_count,
        original_count - merged_count
    );

    merged_count
}

/// Remove duplicate facets.
///
/// Facets are duplicates when they cover the same vertex set, regardless of
/// winding or starting corner. The first occurrence is kept.
///
/// Returns the number of facets removed.
pub fn remove_duplicate_facets(mesh: &mut Mesh) -> usize {
    let original_count = mesh.facets.len();

    let mut seen: HashSet<Vec<u32>> = HashSet::new();
    let mut keep = Vec::with_capacity(original_count);

    for facet in &mesh.facets {
        let mut key = facet.vertices.clone();
        key.sort_unstable();
        keep.push(seen.insert(key));
    }

    let mut idx = 0;
    mesh.facets.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });

    let removed = original_count - mesh.facets.len();
    if removed > 0 {
        info!("Removed {} duplicate facets", removed);
    }

    removed
}

/// Remove facets that are geometrically degenerate.
///
/// A facet is degenerate when it has fewer than 3 distinct vertices or its
/// total area is below `area_epsilon`.
///
/// Returns the number of facets removed.
pub fn remove_degenerate_facets(mesh: &mut Mesh, area_epsilon: f64) -> usize {
    let original_count = mesh.facets.len();

    let areas: Vec<f64> = (0..mesh.facets.len()).map(|i| mesh.facet_area(i)).collect();

    let mut idx = 0;
    mesh.facets.retain(|facet| {
        let distinct: HashSet<u32> = facet.vertices.iter().copied().collect();
        let keep = distinct.len() >= 3 && areas[idx] >= area_epsilon;
        idx += 1;
        keep
    });

    let removed = original_count - mesh.facets.len();
    if removed > 0 {
        info!(
            "Removed {} degenerate facets (area < {:.2e})",
            removed, area_epsilon
        );
    }

    removed
}

/// Triangulate all facets of degree > 3 by fan decomposition.
///
/// Each n-gon (v0, v1, ..., vn-1) is split into triangles
/// (v0, vi, vi+1). Chart assignments are carried over to the pieces.
///
/// Returns the number of facets that were split.
pub fn triangulate_facets(mesh: &mut Mesh) -> usize {
    if mesh.is_triangulated() {
        return 0;
    }

    let mut split_count = 0;
    let mut new_facets = Vec::with_capacity(mesh.facets.len());

    for facet in mesh.facets.drain(..) {
        if facet.degree() <= 3 {
            new_facets.push(facet);
            continue;
        }

        split_count += 1;
        let ring = &facet.vertices;
        for i in 1..ring.len() - 1 {
            let mut tri = Facet::triangle(ring[0], ring[i], ring[i + 1]);
            tri.chart = facet.chart;
            new_facets.push(tri);
        }
    }

    mesh.facets = new_facets;

    if split_count > 0 {
        info!(
            "Triangulated {} polygonal facets into {} triangles total",
            split_count,
            mesh.facets.len()
        );
    }

    split_count
}

/// Compute vertex normals as the area-weighted average of incident facet
/// normals.
pub fn compute_vertex_normals(mesh: &mut Mesh) {
    for vertex in &mut mesh.vertices {
        vertex.normal = None;
    }

    let mut normal_accum: Vec<nalgebra::Vector3<f64>> =
        vec![nalgebra::Vector3::zeros(); mesh.vertices.len()];

    for facet in &mesh.facets {
        let ring = &facet.vertices;
        for i in 1..ring.len().saturating_sub(1) {
            let tri = Triangle::new(
                mesh.vertices[ring[0] as usize].position,
                mesh.vertices[ring[i] as usize].position,
                mesh.vertices[ring[i + 1] as usize].position,
            );

            // Unnormalized normal has length 2*area, giving area weighting
            let weighted = tri.normal_unnormalized();
            normal_accum[ring[0] as usize] += weighted;
            normal_accum[ring[i] as usize] += weighted;
            normal_accum[ring[i + 1] as usize] += weighted;
        }
    }

    for (idx, accum) in normal_accum.into_iter().enumerate() {
        let len_sq = accum.norm_squared();
        if len_sq > f64::EPSILON {
            mesh.vertices[idx].normal = Some(accum / len_sq.sqrt());
        }
    }

    debug!("Computed vertex normals for {} vertices", mesh.vertices.len());
}

/// Convert position to spatial hash cell.
fn pos_to_cell(pos: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (pos.x / cell_size).floor() as i64,
        (pos.y / cell_size).floor() as i64,
        (pos.z / cell_size).floor() as i64,
    )
}

/// Run the repair stage with default parameters.
pub fn repair_mesh(mesh: &mut Mesh) -> MeshResult<()> {
    repair_mesh_with_config(mesh, &RepairParams::default())
}

/// Run the repair stage: colocation, facet cleanup, triangulation,
/// intersection resolution, and small-component pruning.
///
/// The ordering matters: colocation runs first so near-duplicate geometry is
/// not misread as self-intersection, and pruning runs last to also sweep up
/// debris produced by the intersection resolver.
///
/// # Errors
///
/// Returns [`MeshError::EmptyMesh`] if nothing is left after repair.
pub fn repair_mesh_with_config(mesh: &mut Mesh, params: &RepairParams) -> MeshResult<()> {
    let initial_verts = mesh.vertex_count();
    let initial_facets = mesh.facet_count();

    if initial_facets == 0 {
        warn!("Mesh has no facets, skipping repair");
        return Err(MeshError::EmptyMesh {
            details: "mesh has no facets to repair".to_string(),
        });
    }

    let tolerance = params
        .colocate_tolerance
        .unwrap_or_else(|| COLOCATE_RELATIVE_TOLERANCE * mesh.average_edge_length());

    info!(
        "Starting repair (tolerance={:.3e}, min component area={:.3})",
        tolerance, params.min_component_area
    );

    colocate_vertices(mesh, tolerance);
    remove_duplicate_facets(mesh);
    remove_degenerate_facets(mesh, params.degenerate_area_epsilon);

    triangulate_facets(mesh);

    if params.resolve_intersections {
        resolve_self_intersections(mesh, &IntersectionParams::default());
        // Resolution can introduce slivers along the intersection curves
        remove_degenerate_facets(mesh, params.degenerate_area_epsilon);
    }

    if params.min_component_area > 0.0 {
        remove_small_components(mesh, params.min_component_area);
    }

    if params.remove_unreferenced {
        mesh.remove_unreferenced_vertices();
    }

    if mesh.is_empty() {
        return Err(MeshError::EmptyMesh {
            details: "repair removed every vertex or facet".to_string(),
        });
    }

    if params.compute_normals {
        compute_vertex_normals(mesh);
    }

    info!(
        "Repair complete: {} verts -> {}, {} facets -> {}",
        initial_verts,
        mesh.vertex_count(),
        initial_facets,
        mesh.facet_count()
    );

    Ok(())
}
