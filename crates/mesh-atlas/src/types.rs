//! Core mesh data types.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

/// RGB color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl VertexColor {
    /// Create a new color from RGB components.
    #[inline]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from floating point values in [0, 1] range.
    #[inline]
    pub fn from_float(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: (r.clamp(0.0, 1.0) * 255.0) as u8,
            g: (g.clamp(0.0, 1.0) * 255.0) as u8,
            b: (b.clamp(0.0, 1.0) * 255.0) as u8,
        }
    }

    /// Convert to floating point values in [0, 1] range.
    #[inline]
    pub fn to_float(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

/// A vertex with optional per-vertex attributes.
///
/// An attribute is considered present on the mesh only when every vertex
/// carries it; loaders either populate an attribute for all vertices or none.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// 3D position.
    pub position: Point3<f64>,

    /// Unit normal vector, computed from incident facets.
    pub normal: Option<Vector3<f64>>,

    /// Vertex color (RGB).
    pub color: Option<VertexColor>,
}

impl Vertex {
    /// Create a new vertex with only position set.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            color: None,
        }
    }

    /// Create a vertex from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Create a vertex with position and color.
    #[inline]
    pub fn with_color(position: Point3<f64>, color: VertexColor) -> Self {
        Self {
            position,
            normal: None,
            color: Some(color),
        }
    }
}

/// A polygonal facet: an ordered ring of vertex indices, degree >= 3.
///
/// Triangulated facets have exactly three vertices. The optional chart id is
/// assigned by the atlas builder and preserved across saves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    /// Vertex indices in winding order.
    pub vertices: Vec<u32>,

    /// Chart the facet belongs to after atlas segmentation.
    pub chart: Option<u32>,
}

impl Facet {
    /// Create a facet from an ordered vertex ring.
    #[inline]
    pub fn new(vertices: Vec<u32>) -> Self {
        Self {
            vertices,
            chart: None,
        }
    }

    /// Create a triangular facet.
    #[inline]
    pub fn triangle(a: u32, b: u32, c: u32) -> Self {
        Self::new(vec![a, b, c])
    }

    /// Number of vertices (= number of edges) in the ring.
    #[inline]
    pub fn degree(&self) -> usize {
        self.vertices.len()
    }

    /// Iterate over the directed edges of the ring, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// The vertex indices as a triangle, if this facet is one.
    #[inline]
    pub fn as_triangle(&self) -> Option<[u32; 3]> {
        match self.vertices.as_slice() {
            &[a, b, c] => Some([a, b, c]),
            _ => None,
        }
    }

    /// Reverse the winding order in place.
    pub fn flip(&mut self) {
        self.vertices.reverse();
    }

    /// Drop consecutive repeated vertices (cyclically).
    ///
    /// Index remapping after vertex merges can leave the same index twice in a
    /// row; this compacts the ring so `degree()` reflects distinct corners.
    pub fn dedup_ring(&mut self) {
        self.vertices.dedup();
        while self.vertices.len() > 1 && self.vertices.first() == self.vertices.last() {
            self.vertices.pop();
        }
    }
}

/// A surface mesh with indexed vertices and polygonal facets.
///
/// The mesh is mutated destructively by each pipeline stage; all mutation
/// helpers preserve the invariant that every facet index references an
/// existing vertex.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Facets as index rings into the vertex array, counter-clockwise winding
    /// when viewed from outside.
    pub facets: Vec<Facet>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(vertex_count: usize, facet_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            facets: Vec::with_capacity(facet_count),
        }
    }

    /// Number of vertices in the mesh.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of facets in the mesh.
    #[inline]
    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    /// Check if mesh is empty (no vertices or facets).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.facets.is_empty()
    }

    /// Whether every facet is a triangle.
    pub fn is_triangulated(&self) -> bool {
        self.facets.iter().all(|f| f.degree() == 3)
    }

    /// Whether every vertex carries a color.
    pub fn has_vertex_colors(&self) -> bool {
        !self.vertices.is_empty() && self.vertices.iter().all(|v| v.color.is_some())
    }

    /// Whether every vertex carries a normal.
    pub fn has_vertex_normals(&self) -> bool {
        !self.vertices.is_empty() && self.vertices.iter().all(|v| v.normal.is_some())
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if mesh is empty.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        if self.vertices.is_empty() {
            return None;
        }

        let mut min = self.vertices[0].position;
        let mut max = self.vertices[0].position;

        for vertex in &self.vertices[1..] {
            let p = &vertex.position;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }

    /// Positions of a facet's corners.
    pub fn facet_positions(&self, facet_idx: usize) -> Vec<Point3<f64>> {
        self.facets[facet_idx]
            .vertices
            .iter()
            .map(|&v| self.vertices[v as usize].position)
            .collect()
    }

    /// Iterate over triangles, fan-decomposing facets of higher degree.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.facets.iter().flat_map(move |facet| {
            let ring = &facet.vertices;
            (1..ring.len().saturating_sub(1)).map(move |i| {
                Triangle::new(
                    self.vertices[ring[0] as usize].position,
                    self.vertices[ring[i] as usize].position,
                    self.vertices[ring[i + 1] as usize].position,
                )
            })
        })
    }

    /// Get a facet as a Triangle. Returns None for facets of degree != 3.
    pub fn triangle(&self, facet_idx: usize) -> Option<Triangle> {
        self.facets.get(facet_idx).and_then(|f| {
            f.as_triangle().map(|[a, b, c]| {
                Triangle::new(
                    self.vertices[a as usize].position,
                    self.vertices[b as usize].position,
                    self.vertices[c as usize].position,
                )
            })
        })
    }

    /// Area of a single facet (fan decomposition for degree > 3).
    pub fn facet_area(&self, facet_idx: usize) -> f64 {
        let ring = &self.facets[facet_idx].vertices;
        let mut area = 0.0;
        for i in 1..ring.len().saturating_sub(1) {
            area += Triangle::new(
                self.vertices[ring[0] as usize].position,
                self.vertices[ring[i] as usize].position,
                self.vertices[ring[i + 1] as usize].position,
            )
            .area();
        }
        area
    }

    /// Geometric normal of a facet (unit length), accumulated over its
    /// corner fan. Returns None for degenerate facets.
    pub fn facet_normal(&self, facet_idx: usize) -> Option<Vector3<f64>> {
        let ring = &self.facets[facet_idx].vertices;
        let mut accum = Vector3::zeros();
        for i in 1..ring.len().saturating_sub(1) {
            accum += Triangle::new(
                self.vertices[ring[0] as usize].position,
                self.vertices[ring[i] as usize].position,
                self.vertices[ring[i + 1] as usize].position,
            )
            .normal_unnormalized();
        }
        let len_sq = accum.norm_squared();
        if len_sq > f64::EPSILON {
            Some(accum / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        (0..self.facets.len()).map(|i| self.facet_area(i)).sum()
    }

    /// Mean length of all facet edges.
    ///
    /// The default colocation tolerance is derived from this, so it scales
    /// with model size. Returns 0.0 for a mesh with no facets.
    pub fn average_edge_length(&self) -> f64 {
        let mut total = 0.0;
        let mut count = 0usize;
        for facet in &self.facets {
            for (a, b) in facet.edges() {
                total += (self.vertices[a as usize].position
                    - self.vertices[b as usize].position)
                    .norm();
                count += 1;
            }
        }
        if count == 0 { 0.0 } else { total / count as f64 }
    }

    /// Compute the signed volume of the mesh via the divergence theorem.
    ///
    /// Positive for a closed mesh with outward-facing normals, negative for an
    /// inside-out mesh. Not meaningful for open meshes.
    pub fn signed_volume(&self) -> f64 {
        let mut volume = 0.0;

        for facet in &self.facets {
            let ring = &facet.vertices;
            for i in 1..ring.len().saturating_sub(1) {
                let v0 = &self.vertices[ring[0] as usize].position;
                let v1 = &self.vertices[ring[i] as usize].position;
                let v2 = &self.vertices[ring[i + 1] as usize].position;

                let cross = Vector3::new(
                    v1.y * v2.z - v1.z * v2.y,
                    v1.z * v2.x - v1.x * v2.z,
                    v1.x * v2.y - v1.y * v2.x,
                );
                volume += v0.x * cross.x + v0.y * cross.y + v0.z * cross.z;
            }
        }

        volume / 6.0
    }

    /// Translate mesh by the given vector.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for vertex in &mut self.vertices {
            vertex.position += offset;
        }
    }

    /// Scale mesh uniformly around the origin.
    pub fn scale(&mut self, factor: f64) {
        for vertex in &mut self.vertices {
            vertex.position.coords *= factor;
        }
    }

    /// Remove vertices not referenced by any facet and remap facet indices.
    ///
    /// The vertex array is compacted and every facet reference rewritten in
    /// the same pass, so no dangling index is ever observable.
    ///
    /// Returns the number of vertices removed.
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let original_count = self.vertices.len();

        let mut referenced = vec![false; original_count];
        for facet in &self.facets {
            for &v in &facet.vertices {
                referenced[v as usize] = true;
            }
        }

        if referenced.iter().all(|&r| r) {
            return 0;
        }

        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut new_vertices = Vec::with_capacity(original_count);

        for (old_idx, vertex) in self.vertices.iter().enumerate() {
            if referenced[old_idx] {
                remap.insert(old_idx as u32, new_vertices.len() as u32);
                new_vertices.push(vertex.clone());
            }
        }

        for facet in &mut self.facets {
            for v in &mut facet.vertices {
                *v = remap[v];
            }
        }

        let removed = original_count - new_vertices.len();
        self.vertices = new_vertices;
        removed
    }
}

/// Canonical undirected edge key: the smaller index first.
#[inline]
pub(crate) fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

/// A triangle with concrete vertex positions.
///
/// Utility type for geometric calculations. Winding is counter-clockwise
/// when viewed from the front (normal points toward viewer).
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    /// The direction follows the right-hand rule with CCW winding.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    /// Returns None for degenerate triangles (zero area).
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Compute the area of the triangle.
    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Compute the centroid (center of mass).
    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::new(
            (self.v0.x + self.v1.x + self.v2.x) / 3.0,
            (self.v0.y + self.v1.y + self.v2.y) / 3.0,
            (self.v0.z + self.v1.z + self.v2.z) / 3.0,
        )
    }

    /// Check if the triangle is degenerate (zero or near-zero area).
    pub fn is_degenerate(&self, epsilon: f64) -> bool {
        self.area() < epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    /// Unit cube with outward-facing normals (CCW winding from outside).
    fn make_unit_cube() -> Mesh {
        let mut mesh = Mesh::new();

        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0)); // 0
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0)); // 1
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0)); // 2
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0)); // 3
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0)); // 4
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 1.0)); // 5
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 1.0)); // 6
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 1.0)); // 7

        for [a, b, c] in [
            [0, 2, 1],
            [0, 3, 2], // bottom
            [4, 5, 6],
            [4, 6, 7], // top
            [0, 1, 5],
            [0, 5, 4], // front
            [3, 7, 6],
            [3, 6, 2], // back
            [0, 4, 7],
            [0, 7, 3], // left
            [1, 2, 6],
            [1, 6, 5], // right
        ] {
            mesh.facets.push(Facet::triangle(a, b, c));
        }

        mesh
    }

    #[test]
    fn test_vertex_creation() {
        let v = Vertex::from_coords(1.0, 2.0, 3.0);
        assert!(approx_eq(v.position.x, 1.0));
        assert!(approx_eq(v.position.y, 2.0));
        assert!(approx_eq(v.position.z, 3.0));
        assert!(v.normal.is_none());
        assert!(v.color.is_none());
    }

    #[test]
    fn test_facet_edges() {
        let f = Facet::new(vec![0, 1, 2, 3]);
        let edges: Vec<_> = f.edges().collect();
        assert_eq!(edges, vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
    }

    #[test]
    fn test_facet_dedup_ring() {
        let mut f = Facet::new(vec![0, 1, 1, 2, 0]);
        f.dedup_ring();
        assert_eq!(f.vertices, vec![0, 1, 2]);

        let mut collapsed = Facet::new(vec![3, 3, 3]);
        collapsed.dedup_ring();
        assert_eq!(collapsed.degree(), 1);
    }

    #[test]
    fn test_triangle_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );

        let normal = tri.normal().expect("non-degenerate triangle");
        assert!(approx_eq(normal.x, 0.0));
        assert!(approx_eq(normal.y, 0.0));
        assert!(approx_eq(normal.z, 1.0));
    }

    #[test]
    fn test_triangle_area() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        assert!(approx_eq(tri.area(), 0.5));
    }

    #[test]
    fn test_degenerate_triangle_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
    }

    #[test]
    fn test_mesh_bounds() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.0, 5.0, 3.0));
        mesh.vertices.push(Vertex::from_coords(-2.0, 8.0, 1.0));

        let (min, max) = mesh.bounds().expect("non-empty mesh");
        assert!(approx_eq(min.x, -2.0));
        assert!(approx_eq(max.x, 10.0));
        assert!(approx_eq(max.y, 8.0));
        assert!(approx_eq(max.z, 3.0));
    }

    #[test]
    fn test_empty_mesh_bounds() {
        let mesh = Mesh::new();
        assert!(mesh.bounds().is_none());
    }

    #[test]
    fn test_quad_facet_area() {
        // Unit square as one quad facet
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.facets.push(Facet::new(vec![0, 1, 2, 3]));

        assert!(approx_eq(mesh.facet_area(0), 1.0));
        assert!(approx_eq(mesh.surface_area(), 1.0));
        assert_eq!(mesh.triangles().count(), 2);
        assert!(!mesh.is_triangulated());
    }

    #[test]
    fn test_signed_volume_unit_cube() {
        let mesh = make_unit_cube();
        assert!(approx_eq(mesh.signed_volume(), 1.0));
    }

    #[test]
    fn test_signed_volume_inverted_cube() {
        let mut mesh = make_unit_cube();
        for facet in &mut mesh.facets {
            facet.flip();
        }
        assert!(approx_eq(mesh.signed_volume(), -1.0));
    }

    #[test]
    fn test_surface_area_unit_cube() {
        let mesh = make_unit_cube();
        assert!(approx_eq(mesh.surface_area(), 6.0));
    }

    #[test]
    fn test_average_edge_length() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(2.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(2.0, 2.0, 0.0));
        mesh.facets.push(Facet::triangle(0, 1, 2));

        // Edges: 2, 2, 2*sqrt(2)
        let expected = (2.0 + 2.0 + 2.0 * 2.0_f64.sqrt()) / 3.0;
        assert!(approx_eq(mesh.average_edge_length(), expected));
    }

    #[test]
    fn test_remove_unreferenced_vertices() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(5.0, 5.0, 5.0)); // unreferenced
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.facets.push(Facet::triangle(0, 2, 3));

        let removed = mesh.remove_unreferenced_vertices();
        assert_eq!(removed, 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.facets[0].vertices, vec![0, 1, 2]);
    }

    #[test]
    fn test_facet_normal_quad() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.facets.push(Facet::new(vec![0, 1, 2, 3]));

        let n = mesh.facet_normal(0).expect("planar quad");
        assert!(approx_eq(n.z, 1.0));
    }
}
