//! UV atlas construction: chart segmentation, conformal parameterization,
//! and packing.
//!
//! Facets are partitioned into charts bounded by hard dihedral angles and
//! non-manifold edges. Every chart that passes the topological-disk test is
//! flattened with a least-squares conformal map; charts that fail the test or
//! whose solve degenerates fall back to a planar projection onto their
//! best-fit plane. Packed charts share the unit square without overlap.

use hashbrown::{HashMap, HashSet};
use nalgebra::{DMatrix, DVector, Point2, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::adjacency::MeshAdjacency;
use crate::error::{MeshError, MeshResult};
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::types::{Mesh, Triangle, edge_key};

/// Parameters for atlas construction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AtlasParams {
    /// Dihedral angle (degrees) above which an edge forces a chart boundary.
    pub hard_angle_deg: f64,

    /// Gutter between packed charts, as a fraction of the packing extent.
    pub packing_margin: f64,
}

impl Default for AtlasParams {
    fn default() -> Self {
        Self {
            hard_angle_deg: 45.0,
            packing_margin: 0.005,
        }
    }
}

/// A chart: a connected set of facets with one continuous parameterization.
///
/// UV coordinates are stored per (vertex, chart): a vertex on a chart
/// boundary carries a distinct UV in every chart it touches.
#[derive(Debug, Clone)]
pub struct Chart {
    /// Facet indices belonging to this chart.
    pub facets: Vec<u32>,

    /// UV per incident vertex. After packing these are final atlas
    /// coordinates inside the unit square.
    pub uv: HashMap<u32, Point2<f64>>,

    /// Whether the conformal solve was replaced by the planar fallback.
    pub used_fallback: bool,
}

impl Chart {
    /// UV bounding box as (min, max). Zero-sized for empty charts.
    pub fn uv_bounds(&self) -> (Point2<f64>, Point2<f64>) {
        let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in self.uv.values() {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        if self.uv.is_empty() {
            return (Point2::origin(), Point2::origin());
        }
        (min, max)
    }
}

/// The full set of packed charts forming one texture-space layout.
#[derive(Debug, Clone)]
pub struct Atlas {
    pub charts: Vec<Chart>,
}

impl Atlas {
    /// Number of charts.
    #[inline]
    pub fn chart_count(&self) -> usize {
        self.charts.len()
    }

    /// Number of charts that needed the projection fallback.
    pub fn fallback_count(&self) -> usize {
        self.charts.iter().filter(|c| c.used_fallback).count()
    }
}

/// Build a UV atlas for a triangulated mesh.
///
/// Assigns every facet a chart id (stored on the facet), parameterizes each
/// chart independently, and packs all charts into the unit square.
///
/// # Errors
///
/// Returns [`MeshError::AtlasFailed`] if the mesh is empty or not
/// triangulated.
pub fn make_atlas(mesh: &mut Mesh, params: &AtlasParams) -> MeshResult<Atlas> {
    make_atlas_with_progress(mesh, params, None)
}

/// [`make_atlas`] with a per-chart progress callback.
///
/// The callback fires after each chart is parameterized. Returning `false`
/// requests cancellation: charts not yet started switch to the cheap planar
/// fallback so the stage still completes with a valid (if lower-quality)
/// atlas.
pub fn make_atlas_with_progress(
    mesh: &mut Mesh,
    params: &AtlasParams,
    progress: Option<&ProgressCallback>,
) -> MeshResult<Atlas> {
    if mesh.is_empty() {
        return Err(MeshError::AtlasFailed {
            details: "cannot build an atlas for an empty mesh".to_string(),
        });
    }
    if !mesh.is_triangulated() {
        return Err(MeshError::AtlasFailed {
            details: "atlas construction requires a triangulated mesh".to_string(),
        });
    }

    let chart_facets = segment_charts(mesh, params.hard_angle_deg);
    info!(
        "Segmented mesh into {} chart(s) (hard angle {:.1} deg)",
        chart_facets.len(),
        params.hard_angle_deg
    );

    // Charts are independent; parameterize them in parallel
    let mesh_ref: &Mesh = mesh;
    let tracker = ProgressTracker::new(chart_facets.len() as u64);
    let mut charts: Vec<Chart> = chart_facets
        .into_par_iter()
        .map(|facets| {
            let chart = if tracker.is_cancelled() {
                let vertices = chart_vertices(mesh_ref, &facets);
                let uv = planar_projection(mesh_ref, &facets, &vertices);
                Chart {
                    facets,
                    uv,
                    used_fallback: true,
                }
            } else {
                parameterize_chart(mesh_ref, facets)
            };

            tracker.advance(1);
            if let Some(callback) = progress {
                if !callback(&tracker.snapshot("parameterizing charts")) {
                    tracker.cancel();
                }
            }

            chart
        })
        .collect();

    let fallbacks = charts.iter().filter(|c| c.used_fallback).count();
    if fallbacks > 0 {
        warn!(
            "{} chart(s) used planar projection fallback instead of a conformal solve",
            fallbacks
        );
    }

    pack_charts(&mut charts, params.packing_margin);

    Ok(Atlas { charts })
}

/// Partition facets into charts.
///
/// BFS growth over edge-adjacent facets that never crosses a non-manifold
/// edge or an edge whose dihedral angle exceeds the threshold. Chart ids are
/// written to the facets.
fn segment_charts(mesh: &mut Mesh, hard_angle_deg: f64) -> Vec<Vec<u32>> {
    let adjacency = MeshAdjacency::build(&mesh.facets);
    let facet_count = mesh.facets.len();

    let normals: Vec<Option<Vector3<f64>>> =
        (0..facet_count).map(|i| mesh.facet_normal(i)).collect();

    let cos_threshold = hard_angle_deg.to_radians().cos();

    let mut assigned = vec![false; facet_count];
    let mut charts: Vec<Vec<u32>> = Vec::new();

    for seed in 0..facet_count {
        if assigned[seed] {
            continue;
        }

        let chart_id = charts.len() as u32;
        let mut chart = Vec::new();
        let mut queue = vec![seed as u32];
        assigned[seed] = true;

        while let Some(facet_idx) = queue.pop() {
            chart.push(facet_idx);
            mesh.facets[facet_idx as usize].chart = Some(chart_id);

            for (a, b) in mesh.facets[facet_idx as usize].edges().collect::<Vec<_>>() {
                let incident = adjacency.facets_on_edge(a, b);
                // Crossing a non-manifold edge would break the disk test
                if incident.len() != 2 {
                    continue;
                }

                for &neighbor in incident {
                    if neighbor == facet_idx || assigned[neighbor as usize] {
                        continue;
                    }

                    let crossable = match (normals[facet_idx as usize], normals[neighbor as usize])
                    {
                        (Some(n0), Some(n1)) => n0.dot(&n1) >= cos_threshold,
                        // Degenerate facets follow their neighbor's chart
                        _ => true,
                    };

                    if crossable {
                        assigned[neighbor as usize] = true;
                        queue.push(neighbor);
                    }
                }
            }
        }

        charts.push(chart);
    }

    charts
}

/// Parameterize one chart, preferring the conformal solve.
fn parameterize_chart(mesh: &Mesh, facets: Vec<u32>) -> Chart {
    let vertices = chart_vertices(mesh, &facets);

    let is_disk = chart_is_disk(mesh, &facets, &vertices);
    let solved = if is_disk {
        lscm(mesh, &facets, &vertices)
    } else {
        None
    };

    match solved {
        Some(uv) => Chart {
            facets,
            uv,
            used_fallback: false,
        },
        None => {
            let uv = planar_projection(mesh, &facets, &vertices);
            debug!(
                "Chart with {} facet(s) fell back to planar projection (disk: {})",
                facets.len(),
                is_disk
            );
            Chart {
                facets,
                uv,
                used_fallback: true,
            }
        }
    }
}

/// Distinct vertices used by a chart, in ascending index order.
fn chart_vertices(mesh: &Mesh, facets: &[u32]) -> Vec<u32> {
    let mut set: HashSet<u32> = HashSet::new();
    for &f in facets {
        for &v in &mesh.facets[f as usize].vertices {
            set.insert(v);
        }
    }
    let mut vertices: Vec<u32> = set.into_iter().collect();
    vertices.sort_unstable();
    vertices
}

/// Test whether a chart is a topological disk: Euler characteristic 1 and a
/// single boundary loop.
fn chart_is_disk(mesh: &Mesh, facets: &[u32], vertices: &[u32]) -> bool {
    let mut edge_use: HashMap<(u32, u32), usize> = HashMap::new();
    for &f in facets {
        for (a, b) in mesh.facets[f as usize].edges() {
            *edge_use.entry(edge_key(a, b)).or_insert(0) += 1;
        }
    }

    let v = vertices.len() as i64;
    let e = edge_use.len() as i64;
    let f = facets.len() as i64;
    if v - e + f != 1 {
        return false;
    }

    // Count boundary loops: connected components of the boundary-edge graph
    let boundary: Vec<(u32, u32)> = edge_use
        .iter()
        .filter(|&(_, &count)| count == 1)
        .map(|(&edge, _)| edge)
        .collect();

    if boundary.len() < 3 {
        return false;
    }

    let mut neighbors: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(a, b) in &boundary {
        neighbors.entry(a).or_default().push(b);
        neighbors.entry(b).or_default().push(a);
    }

    let mut visited: HashSet<u32> = HashSet::new();
    let mut loops = 0;
    for &(start, _) in &boundary {
        if visited.contains(&start) {
            continue;
        }
        loops += 1;
        let mut queue = vec![start];
        visited.insert(start);
        while let Some(v) = queue.pop() {
            for &n in neighbors.get(&v).map(|v| v.as_slice()).unwrap_or(&[]) {
                if visited.insert(n) {
                    queue.push(n);
                }
            }
        }
    }

    loops == 1
}

/// Boundary vertices of a chart (vertices on edges with one in-chart facet).
fn chart_boundary_vertices(mesh: &Mesh, facets: &[u32]) -> Vec<u32> {
    let mut edge_use: HashMap<(u32, u32), usize> = HashMap::new();
    for &f in facets {
        for (a, b) in mesh.facets[f as usize].edges() {
            *edge_use.entry(edge_key(a, b)).or_insert(0) += 1;
        }
    }

    let mut set: HashSet<u32> = HashSet::new();
    for ((a, b), count) in edge_use {
        if count == 1 {
            set.insert(a);
            set.insert(b);
        }
    }
    let mut boundary: Vec<u32> = set.into_iter().collect();
    boundary.sort_unstable();
    boundary
}

/// Least-squares conformal map of a disk chart.
///
/// Minimizes the conformal energy over all triangles with two boundary
/// vertices pinned at maximum separation; the remaining unknowns come from a
/// dense normal-equation solve. Returns None when the chart has no usable
/// pins or the system is singular.
fn lscm(mesh: &Mesh, facets: &[u32], vertices: &[u32]) -> Option<HashMap<u32, Point2<f64>>> {
    let n = vertices.len();
    if n < 3 {
        return None;
    }

    let local: HashMap<u32, usize> = vertices
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, i))
        .collect();

    // Pin the two most distant boundary vertices
    let boundary = chart_boundary_vertices(mesh, facets);
    if boundary.len() < 2 {
        return None;
    }
    let mut pin0 = boundary[0];
    let mut pin1 = boundary[1];
    let mut max_dist_sq = 0.0;
    for i in 0..boundary.len() {
        for j in (i + 1)..boundary.len() {
            let d = (mesh.vertices[boundary[i] as usize].position
                - mesh.vertices[boundary[j] as usize].position)
                .norm_squared();
            if d > max_dist_sq {
                max_dist_sq = d;
                pin0 = boundary[i];
                pin1 = boundary[j];
            }
        }
    }
    if max_dist_sq <= 0.0 {
        return None; // all boundary vertices coincide
    }
    let pin_distance = max_dist_sq.sqrt();

    let p0_local = local[&pin0];
    let p1_local = local[&pin1];

    // Unknown layout: free vertices only, u then v interleaved as (2k, 2k+1)
    let mut free_index: Vec<Option<usize>> = vec![None; n];
    let mut free_count = 0;
    for i in 0..n {
        if i != p0_local && i != p1_local {
            free_index[i] = Some(free_count);
            free_count += 1;
        }
    }

    let rows = 2 * facets.len();
    let cols = 2 * free_count;
    if cols == 0 {
        // Two-vertex chart cannot happen for degree-3 facets; bail out
        return None;
    }

    let pin_uv = |i: usize| -> (f64, f64) {
        if i == p0_local {
            (0.0, 0.0)
        } else {
            (pin_distance, 0.0)
        }
    };

    let mut a = DMatrix::<f64>::zeros(rows, cols);
    let mut b = DVector::<f64>::zeros(rows);

    for (t, &f) in facets.iter().enumerate() {
        let tri_vertices = &mesh.facets[f as usize].vertices;
        let p0 = mesh.vertices[tri_vertices[0] as usize].position;
        let p1 = mesh.vertices[tri_vertices[1] as usize].position;
        let p2 = mesh.vertices[tri_vertices[2] as usize].position;

        // Local orthonormal frame in the triangle plane
        let e1 = p1 - p0;
        let x1 = e1.norm();
        if x1 <= f64::EPSILON {
            continue;
        }
        let ex = e1 / x1;
        let normal = Triangle::new(p0, p1, p2).normal_unnormalized();
        let norm_len = normal.norm();
        if norm_len <= f64::EPSILON {
            continue;
        }
        let ey = (normal / norm_len).cross(&ex);

        let e2 = p2 - p0;
        let x2 = e2.dot(&ex);
        let y2 = e2.dot(&ey);

        let double_area = x1 * y2;
        if double_area.abs() <= f64::EPSILON {
            continue;
        }
        let scale = 1.0 / double_area.abs().sqrt();

        // Conformal gradient weights per corner in the local frame
        let w = [
            (x2 - x1, y2), // corner 0
            (-x2, -y2),    // corner 1
            (x1, 0.0),     // corner 2
        ];

        let row_re = 2 * t;
        let row_im = 2 * t + 1;

        for (corner, &(wx, wy)) in w.iter().enumerate() {
            let li = local[&tri_vertices[corner]];
            let (wx, wy) = (wx * scale, wy * scale);

            match free_index[li] {
                Some(k) => {
                    // Re: wx*u - wy*v ; Im: wy*u + wx*v
                    a[(row_re, 2 * k)] += wx;
                    a[(row_re, 2 * k + 1)] -= wy;
                    a[(row_im, 2 * k)] += wy;
                    a[(row_im, 2 * k + 1)] += wx;
                }
                None => {
                    let (u, v) = pin_uv(li);
                    b[row_re] -= wx * u - wy * v;
                    b[row_im] -= wy * u + wx * v;
                }
            }
        }
    }

    // Normal equations; the pinned system is positive definite when the
    // chart is a genuine disk
    let at = a.transpose();
    let m = &at * &a;
    let rhs = &at * &b;

    let solution = m.cholesky()?.solve(&rhs);

    let mut uv: HashMap<u32, Point2<f64>> = HashMap::with_capacity(n);
    for (i, &vertex) in vertices.iter().enumerate() {
        let (u, v) = match free_index[i] {
            Some(k) => (solution[2 * k], solution[2 * k + 1]),
            None => pin_uv(i),
        };
        if !u.is_finite() || !v.is_finite() {
            return None;
        }
        uv.insert(vertex, Point2::new(u, v));
    }

    Some(uv)
}

/// Planar projection fallback: project chart vertices onto the plane
/// orthogonal to the chart's area-weighted mean normal.
fn planar_projection(mesh: &Mesh, facets: &[u32], vertices: &[u32]) -> HashMap<u32, Point2<f64>> {
    let mut normal = Vector3::zeros();
    for &f in facets {
        if let Some(t) = mesh.triangle(f as usize) {
            normal += t.normal_unnormalized();
        }
    }
    if normal.norm_squared() <= f64::EPSILON {
        normal = Vector3::z();
    } else {
        normal.normalize_mut();
    }

    // Basis vector least aligned with the normal gives a stable tangent
    let helper = if normal.x.abs() <= normal.y.abs() && normal.x.abs() <= normal.z.abs() {
        Vector3::x()
    } else if normal.y.abs() <= normal.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let tangent = normal.cross(&helper).normalize();
    let bitangent = normal.cross(&tangent);

    let origin = mesh.vertices[vertices[0] as usize].position;

    vertices
        .iter()
        .map(|&v| {
            let d = mesh.vertices[v as usize].position - origin;
            (v, Point2::new(d.dot(&tangent), d.dot(&bitangent)))
        })
        .collect()
}

/// Pack charts into the unit square with shelf packing.
///
/// Charts are placed left-to-right on shelves in order of descending height,
/// then everything is scaled uniformly into [0,1]^2. The gutter keeps packed
/// footprints disjoint after scaling. Correctness over optimality.
fn pack_charts(charts: &mut [Chart], margin: f64) {
    if charts.is_empty() {
        return;
    }

    // Normalize each chart to its own origin and collect sizes
    let mut sizes: Vec<(f64, f64)> = Vec::with_capacity(charts.len());
    for chart in charts.iter_mut() {
        let (min, max) = chart.uv_bounds();
        for p in chart.uv.values_mut() {
            p.x -= min.x;
            p.y -= min.y;
        }
        sizes.push((max.x - min.x, max.y - min.y));
    }

    let total_area: f64 = sizes.iter().map(|(w, h)| w * h).sum();
    let max_width = sizes.iter().map(|(w, _)| *w).fold(0.0, f64::max);
    let gutter = (total_area.sqrt() * margin).max(f64::MIN_POSITIVE);

    // Aim at a square layout
    let target_width = (total_area.sqrt() * 1.1).max(max_width + gutter);

    // Descending height, index as deterministic tie-break
    let mut order: Vec<usize> = (0..charts.len()).collect();
    order.sort_by(|&i, &j| {
        sizes[j]
            .1
            .partial_cmp(&sizes[i].1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(i.cmp(&j))
    });

    let mut placements: Vec<(f64, f64)> = vec![(0.0, 0.0); charts.len()];
    let mut cursor_x = 0.0;
    let mut shelf_y = 0.0;
    let mut shelf_height = 0.0;
    let mut extent_x: f64 = 0.0;

    for &idx in &order {
        let (w, h) = sizes[idx];

        if cursor_x > 0.0 && cursor_x + w + gutter > target_width {
            shelf_y += shelf_height + gutter;
            cursor_x = 0.0;
            shelf_height = 0.0;
        }

        placements[idx] = (cursor_x, shelf_y);
        cursor_x += w + gutter;
        shelf_height = shelf_height.max(h);
        extent_x = extent_x.max(cursor_x);
    }

    let extent = extent_x.max(shelf_y + shelf_height + gutter);
    let scale = if extent > 0.0 { 1.0 / extent } else { 1.0 };

    for (chart, &(px, py)) in charts.iter_mut().zip(&placements) {
        for p in chart.uv.values_mut() {
            p.x = (p.x + px + gutter * 0.5) * scale;
            p.y = (p.y + py + gutter * 0.5) * scale;
        }
    }

    debug!(
        "Packed {} chart(s), utilization {:.1}%",
        charts.len(),
        100.0 * total_area * scale * scale
    );
}
