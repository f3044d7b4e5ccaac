//! Self-intersection detection and resolution.
//!
//! Detection finds pairs of non-adjacent triangles whose extents intersect in
//! 3D. Resolution inserts the intersection segment endpoints as new vertices
//! and re-splits the involved triangles so the surfaces meet along the curve
//! instead of passing through each other.
//!
//! Resolution is best-effort: it handles every *detected* pair in a single
//! bounded pass and always terminates. Near-coplanar overlaps below numeric
//! precision may survive; slivers introduced along the curve are swept by the
//! caller's degenerate post-pass.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::types::{Facet, Mesh, Triangle, Vertex};

/// Result of self-intersection detection.
#[derive(Debug, Clone)]
pub struct SelfIntersectionResult {
    /// Whether the mesh has any self-intersections.
    pub has_intersections: bool,
    /// Number of intersecting triangle pairs found.
    pub intersection_count: usize,
    /// Intersecting facet pairs as (facet_a, facet_b), up to `max_reported`.
    pub intersecting_pairs: Vec<(u32, u32)>,
    /// Total facets checked.
    pub facets_checked: usize,
    /// Whether the search stopped early at the `max_reported` limit.
    pub truncated: bool,
}

impl SelfIntersectionResult {
    /// Check if the mesh is free of self-intersections.
    pub fn is_clean(&self) -> bool {
        !self.has_intersections
    }
}

impl std::fmt::Display for SelfIntersectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_intersections {
            write!(
                f,
                "Self-intersections found: {} pair(s){}",
                self.intersection_count,
                if self.truncated { " (truncated)" } else { "" }
            )
        } else {
            write!(f, "No self-intersections detected")
        }
    }
}

/// Parameters for intersection detection and resolution.
#[derive(Debug, Clone)]
pub struct IntersectionParams {
    /// Maximum number of intersecting pairs to report during detection.
    /// Set to 0 for unlimited; resolution always runs unlimited.
    pub max_reported: usize,
    /// Epsilon for geometric comparisons.
    pub epsilon: f64,
    /// Whether to skip adjacent triangles (sharing an edge or vertex).
    /// Triangles touching along shared topology are not self-intersections.
    pub skip_adjacent: bool,
}

impl Default for IntersectionParams {
    fn default() -> Self {
        Self {
            max_reported: 100,
            epsilon: 1e-10,
            skip_adjacent: true,
        }
    }
}

/// Axis-aligned bounding box for spatial culling.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_triangle(tri: &Triangle) -> Self {
        let min = Point3::new(
            tri.v0.x.min(tri.v1.x).min(tri.v2.x),
            tri.v0.y.min(tri.v1.y).min(tri.v2.y),
            tri.v0.z.min(tri.v1.z).min(tri.v2.z),
        );
        let max = Point3::new(
            tri.v0.x.max(tri.v1.x).max(tri.v2.x),
            tri.v0.y.max(tri.v1.y).max(tri.v2.y),
            tri.v0.z.max(tri.v1.z).max(tri.v2.z),
        );
        Self { min, max }
    }

    fn expand(&self, epsilon: f64) -> Self {
        Self {
            min: Point3::new(
                self.min.x - epsilon,
                self.min.y - epsilon,
                self.min.z - epsilon,
            ),
            max: Point3::new(
                self.max.x + epsilon,
                self.max.y + epsilon,
                self.max.z + epsilon,
            ),
        }
    }

    fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// Detect self-intersections in a triangulated mesh.
///
/// Uses bounding-box culling to avoid O(n^2) triangle-triangle tests where
/// possible; the remaining pair tests run in parallel. Facets that are not
/// triangles are ignored (the repair pipeline triangulates first).
pub fn detect_self_intersections(
    mesh: &Mesh,
    params: &IntersectionParams,
) -> SelfIntersectionResult {
    let facet_count = mesh.facets.len();

    if facet_count < 2 {
        return SelfIntersectionResult {
            has_intersections: false,
            intersection_count: 0,
            intersecting_pairs: Vec::new(),
            facets_checked: facet_count,
            truncated: false,
        };
    }

    info!("Checking {} facets for self-intersections", facet_count);

    let triangles: Vec<Option<Triangle>> =
        (0..facet_count).map(|i| mesh.triangle(i)).collect();
    let aabbs: Vec<Option<Aabb>> = triangles
        .iter()
        .map(|t| t.as_ref().map(|t| Aabb::from_triangle(t).expand(params.epsilon)))
        .collect();

    let adjacency = if params.skip_adjacent {
        Some(build_vertex_sharing_adjacency(&mesh.facets))
    } else {
        None
    };

    let max_pairs = if params.max_reported == 0 {
        usize::MAX
    } else {
        params.max_reported
    };

    let intersection_count = AtomicUsize::new(0);
    let should_stop = AtomicBool::new(false);

    let intersecting_pairs: Vec<(u32, u32)> = (0..facet_count)
        .into_par_iter()
        .flat_map(|i| {
            if should_stop.load(Ordering::Relaxed) {
                return Vec::new();
            }

            let Some(tri_i) = &triangles[i] else {
                return Vec::new();
            };
            let aabb_i = aabbs[i].unwrap();

            let mut local_pairs = Vec::new();

            for j in (i + 1)..facet_count {
                if should_stop.load(Ordering::Relaxed) {
                    break;
                }

                let Some(tri_j) = &triangles[j] else {
                    continue;
                };

                if !aabb_i.overlaps(&aabbs[j].unwrap()) {
                    continue;
                }

                if let Some(adj) = &adjacency {
                    if adj[i].contains(&(j as u32)) {
                        continue;
                    }
                }

                if triangles_intersect(tri_i, tri_j, params.epsilon) {
                    let count = intersection_count.fetch_add(1, Ordering::Relaxed);

                    if count < max_pairs {
                        local_pairs.push((i as u32, j as u32));
                    }

                    if count + 1 >= max_pairs && params.max_reported > 0 {
                        should_stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }

            local_pairs
        })
        .collect();

    let final_count = intersection_count.load(Ordering::Relaxed);
    let truncated = params.max_reported > 0 && final_count >= max_pairs;

    if final_count > 0 {
        warn!("Found {} self-intersecting triangle pair(s)", final_count);
    } else {
        info!("No self-intersections found");
    }

    SelfIntersectionResult {
        has_intersections: final_count > 0,
        intersection_count: final_count,
        intersecting_pairs,
        facets_checked: facet_count,
        truncated,
    }
}

/// Resolve detected self-intersections by re-triangulating around the
/// intersection curves.
///
/// For every detected pair, the tri-tri intersection segment is computed and
/// its endpoints are inserted into both triangles, splitting them so the
/// segment becomes a shared edge of the local triangulations. The involved
/// facets are replaced in place; intersection-curve vertices are shared
/// between the two sides through a quantized point registry.
///
/// Returns the number of pairs resolved.
pub fn resolve_self_intersections(mesh: &mut Mesh, params: &IntersectionParams) -> usize {
    let detect_params = IntersectionParams {
        max_reported: 0,
        ..params.clone()
    };
    let detection = detect_self_intersections(mesh, &detect_params);

    if detection.is_clean() {
        return 0;
    }

    let diag = mesh
        .bounds()
        .map(|(min, max)| (max - min).norm())
        .unwrap_or(1.0);
    // Intersection-curve vertices closer than this are treated as one
    let weld_epsilon = (diag * 1e-9).max(1e-12);

    // Collect split points per involved facet
    let mut splits: HashMap<u32, Vec<Point3<f64>>> = HashMap::new();
    let mut resolved = 0;

    for &(i, j) in &detection.intersecting_pairs {
        let (Some(tri_i), Some(tri_j)) = (mesh.triangle(i as usize), mesh.triangle(j as usize))
        else {
            continue;
        };

        if let Some((start, end)) = triangle_intersection_segment(&tri_i, &tri_j, params.epsilon) {
            for p in [start, end] {
                splits.entry(i).or_default().push(p);
                splits.entry(j).or_default().push(p);
            }
            resolved += 1;
        }
    }

    if splits.is_empty() {
        debug!("No usable intersection segments; leaving mesh unchanged");
        return 0;
    }

    // Shared registry so both sides of a curve reference the same vertex
    let mut registry = PointRegistry::new(weld_epsilon);

    let mut replaced: HashMap<u32, Vec<[u32; 3]>> = HashMap::new();
    let mut facet_ids: Vec<u32> = splits.keys().copied().collect();
    facet_ids.sort_unstable();

    for facet_idx in facet_ids {
        let points = &splits[&facet_idx];
        let Some([a, b, c]) = mesh.facets[facet_idx as usize].as_triangle() else {
            continue;
        };
        let pieces = split_triangle(mesh, [a, b, c], points, &mut registry, weld_epsilon);
        replaced.insert(facet_idx, pieces);
    }

    // Swap re-triangulated facets in, keeping untouched facets as-is
    let mut new_facets = Vec::with_capacity(mesh.facets.len() + replaced.len() * 2);
    for (idx, facet) in mesh.facets.drain(..).enumerate() {
        match replaced.get(&(idx as u32)) {
            Some(pieces) => {
                for &[a, b, c] in pieces {
                    new_facets.push(Facet::triangle(a, b, c));
                }
            }
            None => new_facets.push(facet),
        }
    }
    mesh.facets = new_facets;

    info!(
        "Resolved {} intersecting pair(s), mesh now has {} facets",
        resolved,
        mesh.facets.len()
    );

    resolved
}

/// Registry deduplicating inserted curve vertices by quantized position.
struct PointRegistry {
    cells: HashMap<(i64, i64, i64), u32>,
    epsilon: f64,
}

impl PointRegistry {
    fn new(epsilon: f64) -> Self {
        Self {
            cells: HashMap::new(),
            epsilon,
        }
    }

    fn intern(&mut self, mesh: &mut Mesh, p: Point3<f64>) -> u32 {
        let key = (
            (p.x / self.epsilon).round() as i64,
            (p.y / self.epsilon).round() as i64,
            (p.z / self.epsilon).round() as i64,
        );
        *self.cells.entry(key).or_insert_with(|| {
            let idx = mesh.vertices.len() as u32;
            mesh.vertices.push(Vertex::new(p));
            idx
        })
    }
}

/// Split a triangle by incremental insertion of interior / on-edge points.
///
/// Every sub-triangle containing the point is split: a 3-way fan for interior
/// points, a 2-way split for points on an edge (split in each incident
/// sub-triangle so the local triangulation stays conforming).
fn split_triangle(
    mesh: &mut Mesh,
    triangle: [u32; 3],
    points: &[Point3<f64>],
    registry: &mut PointRegistry,
    weld_epsilon: f64,
) -> Vec<[u32; 3]> {
    const BARY_EDGE_EPS: f64 = 1e-6;

    let mut pieces: Vec<[u32; 3]> = vec![triangle];

    // Dedup insertion points within weld distance
    let mut unique: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    for &p in points {
        if !unique.iter().any(|q| (p - q).norm() < weld_epsilon) {
            unique.push(p);
        }
    }

    for p in unique {
        // Skip points coinciding with an existing corner of any piece
        let coincides = pieces.iter().flat_map(|t| t.iter()).any(|&v| {
            (mesh.vertices[v as usize].position - p).norm() < weld_epsilon
        });
        if coincides {
            continue;
        }

        let mut next: Vec<[u32; 3]> = Vec::with_capacity(pieces.len() + 2);
        let mut inserted = false;
        let mut vi: Option<u32> = None;

        for &[a, b, c] in &pieces {
            let tri = Triangle::new(
                mesh.vertices[a as usize].position,
                mesh.vertices[b as usize].position,
                mesh.vertices[c as usize].position,
            );

            match barycentric(&tri, &p) {
                Some((u, v, w)) if u >= -BARY_EDGE_EPS && v >= -BARY_EDGE_EPS && w >= -BARY_EDGE_EPS => {
                    let idx = *vi.get_or_insert_with(|| registry.intern(mesh, p));
                    inserted = true;

                    // A zero-ish coordinate means the point sits on the edge
                    // opposite that corner: split across the edge instead of
                    // fanning, so no degenerate piece is produced
                    if u <= BARY_EDGE_EPS {
                        next.push([a, b, idx]);
                        next.push([a, idx, c]);
                    } else if v <= BARY_EDGE_EPS {
                        next.push([b, c, idx]);
                        next.push([b, idx, a]);
                    } else if w <= BARY_EDGE_EPS {
                        next.push([c, a, idx]);
                        next.push([c, idx, b]);
                    } else {
                        next.push([idx, a, b]);
                        next.push([idx, b, c]);
                        next.push([idx, c, a]);
                    }
                }
                _ => next.push([a, b, c]),
            }
        }

        if inserted {
            pieces = next;
        }
    }

    // Drop pieces collapsed to zero area by near-edge insertions
    pieces.retain(|&[a, b, c]| {
        a != b
            && b != c
            && a != c
            && Triangle::new(
                mesh.vertices[a as usize].position,
                mesh.vertices[b as usize].position,
                mesh.vertices[c as usize].position,
            )
            .area()
                > 0.0
    });

    pieces
}

/// Barycentric coordinates of `p` projected onto the triangle's plane.
/// Returns None for degenerate triangles or points far off the plane.
fn barycentric(tri: &Triangle, p: &Point3<f64>) -> Option<(f64, f64, f64)> {
    let v0 = tri.v1 - tri.v0;
    let v1 = tri.v2 - tri.v0;
    let v2 = p - tri.v0;

    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < f64::EPSILON {
        return None;
    }

    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    let u = 1.0 - v - w;

    // Reject points that are not actually near the plane
    let normal = tri.normal()?;
    let dist = (p - tri.v0).dot(&normal).abs();
    let scale = d00.max(d11).sqrt().max(f64::MIN_POSITIVE);
    if dist > scale * 1e-6 {
        return None;
    }

    Some((u, v, w))
}

/// Build facet adjacency by shared vertices.
fn build_vertex_sharing_adjacency(facets: &[Facet]) -> Vec<HashSet<u32>> {
    let mut vertex_to_facets: HashMap<u32, Vec<u32>> = HashMap::new();
    for (facet_idx, facet) in facets.iter().enumerate() {
        for &v in &facet.vertices {
            vertex_to_facets.entry(v).or_default().push(facet_idx as u32);
        }
    }

    let mut adjacency: Vec<HashSet<u32>> = vec![HashSet::new(); facets.len()];
    for (facet_idx, facet) in facets.iter().enumerate() {
        for &v in &facet.vertices {
            if let Some(neighbors) = vertex_to_facets.get(&v) {
                for &neighbor in neighbors {
                    if neighbor != facet_idx as u32 {
                        adjacency[facet_idx].insert(neighbor);
                    }
                }
            }
        }
    }

    adjacency
}

/// Test if two triangles intersect using separating axis tests.
fn triangles_intersect(t1: &Triangle, t2: &Triangle, epsilon: f64) -> bool {
    let n1 = t1.normal_unnormalized();
    let n2 = t2.normal_unnormalized();

    // Degenerate triangles don't intersect meaningfully
    if n1.norm_squared() < epsilon * epsilon || n2.norm_squared() < epsilon * epsilon {
        return false;
    }

    let edges1 = [t1.v1 - t1.v0, t1.v2 - t1.v1, t1.v0 - t1.v2];
    let edges2 = [t2.v1 - t2.v0, t2.v2 - t2.v1, t2.v0 - t2.v2];

    let cross_normals = n1.cross(&n2);
    let is_coplanar =
        cross_normals.norm_squared() < epsilon * epsilon * n1.norm_squared() * n2.norm_squared();

    if is_coplanar {
        // In-plane SAT using edge perpendiculars
        for edge in &edges1 {
            let axis = n1.cross(edge);
            if axis.norm_squared() > epsilon * epsilon && separated_by_axis(&axis, t1, t2, epsilon)
            {
                return false;
            }
        }
        for edge in &edges2 {
            let axis = n2.cross(edge);
            if axis.norm_squared() > epsilon * epsilon && separated_by_axis(&axis, t1, t2, epsilon)
            {
                return false;
            }
        }
        return true;
    }

    if separated_by_axis(&n1, t1, t2, epsilon) {
        return false;
    }
    if separated_by_axis(&n2, t1, t2, epsilon) {
        return false;
    }

    for e1 in &edges1 {
        for e2 in &edges2 {
            let axis = e1.cross(e2);
            if axis.norm_squared() > epsilon * epsilon && separated_by_axis(&axis, t1, t2, epsilon)
            {
                return false;
            }
        }
    }

    true
}

/// Check if two triangles are separated by a given axis.
fn separated_by_axis(axis: &Vector3<f64>, t1: &Triangle, t2: &Triangle, epsilon: f64) -> bool {
    let p1_0 = axis.dot(&t1.v0.coords);
    let p1_1 = axis.dot(&t1.v1.coords);
    let p1_2 = axis.dot(&t1.v2.coords);
    let min1 = p1_0.min(p1_1).min(p1_2);
    let max1 = p1_0.max(p1_1).max(p1_2);

    let p2_0 = axis.dot(&t2.v0.coords);
    let p2_1 = axis.dot(&t2.v1.coords);
    let p2_2 = axis.dot(&t2.v2.coords);
    let min2 = p2_0.min(p2_1).min(p2_2);
    let max2 = p2_0.max(p2_1).max(p2_2);

    max1 + epsilon < min2 || max2 + epsilon < min1
}

/// Edge-triangle intersection via Moller-Trumbore clipping.
///
/// Returns the intersection point when the segment (e0, e1) pierces the
/// triangle's interior.
fn edge_triangle_intersect(
    e0: &Point3<f64>,
    e1: &Point3<f64>,
    tri: &Triangle,
    epsilon: f64,
) -> Option<Point3<f64>> {
    let direction = e1 - e0;
    if direction.norm_squared() < epsilon * epsilon {
        return None;
    }

    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;
    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);

    // Edge parallel to the triangle plane
    if a.abs() < epsilon {
        return None;
    }

    let f = 1.0 / a;
    let s = e0 - tri.v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    if t < -epsilon || t > 1.0 + epsilon {
        return None;
    }

    let t = t.clamp(0.0, 1.0);
    Some(Point3::from(e0.coords + direction * t))
}

/// Compute the segment where two triangles cross.
///
/// Clips each triangle's edges against the other and takes the two most
/// distant intersection points as segment endpoints. Returns None when fewer
/// than two distinct points exist (touching or grazing contact).
fn triangle_intersection_segment(
    t1: &Triangle,
    t2: &Triangle,
    epsilon: f64,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let mut points: Vec<Point3<f64>> = Vec::with_capacity(6);

    for (e0, e1) in [(t1.v0, t1.v1), (t1.v1, t1.v2), (t1.v2, t1.v0)] {
        if let Some(p) = edge_triangle_intersect(&e0, &e1, t2, epsilon) {
            points.push(p);
        }
    }
    for (e0, e1) in [(t2.v0, t2.v1), (t2.v1, t2.v2), (t2.v2, t2.v0)] {
        if let Some(p) = edge_triangle_intersect(&e0, &e1, t1, epsilon) {
            points.push(p);
        }
    }

    if points.len() < 2 {
        return None;
    }

    // Dedup near-coincident points
    let mut unique: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    let merge_eps = epsilon.max(1e-12).sqrt();
    for p in points {
        if !unique.iter().any(|q| (p - q).norm_squared() < merge_eps * merge_eps) {
            unique.push(p);
        }
    }

    if unique.len() < 2 {
        return None;
    }

    // Most distant pair spans the whole segment
    let mut max_dist_sq = 0.0;
    let mut best = (0, 1);
    for i in 0..unique.len() {
        for j in (i + 1)..unique.len() {
            let dist_sq = (unique[j] - unique[i]).norm_squared();
            if dist_sq > max_dist_sq {
                max_dist_sq = dist_sq;
                best = (i, j);
            }
        }
    }

    Some((unique[best.0], unique[best.1]))
}
