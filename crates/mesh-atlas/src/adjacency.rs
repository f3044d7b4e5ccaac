//! Edge and vertex adjacency maps for mesh traversal.
//!
//! `MeshAdjacency` is a snapshot of the facet connectivity: it is cheap to
//! rebuild and is rebuilt after every mutating stage rather than kept in sync
//! incrementally.

use hashbrown::HashMap;

use crate::types::{Facet, edge_key};

/// Connectivity maps built from the facet array.
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Canonical undirected edge -> facets incident to it.
    pub edge_to_facets: HashMap<(u32, u32), Vec<u32>>,

    /// Vertex -> facets incident to it.
    pub vertex_to_facets: HashMap<u32, Vec<u32>>,
}

impl MeshAdjacency {
    /// Build adjacency maps from a facet array.
    pub fn build(facets: &[Facet]) -> Self {
        let mut edge_to_facets: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
        let mut vertex_to_facets: HashMap<u32, Vec<u32>> = HashMap::new();

        for (facet_idx, facet) in facets.iter().enumerate() {
            let facet_idx = facet_idx as u32;

            for &v in &facet.vertices {
                let entry = vertex_to_facets.entry(v).or_default();
                if entry.last() != Some(&facet_idx) {
                    entry.push(facet_idx);
                }
            }

            for (a, b) in facet.edges() {
                if a != b {
                    edge_to_facets.entry(edge_key(a, b)).or_default().push(facet_idx);
                }
            }
        }

        Self {
            edge_to_facets,
            vertex_to_facets,
        }
    }

    /// Facets incident to a vertex.
    pub fn facets_around_vertex(&self, vertex: u32) -> &[u32] {
        self.vertex_to_facets
            .get(&vertex)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Facets sharing the undirected edge (a, b).
    pub fn facets_on_edge(&self, a: u32, b: u32) -> &[u32] {
        self.edge_to_facets
            .get(&edge_key(a, b))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Edge-adjacent neighbors of a facet (excluding the facet itself).
    pub fn facet_neighbors(&self, facet_idx: u32, facet: &Facet) -> Vec<u32> {
        let mut neighbors = Vec::new();
        for (a, b) in facet.edges() {
            for &other in self.facets_on_edge(a, b) {
                if other != facet_idx && !neighbors.contains(&other) {
                    neighbors.push(other);
                }
            }
        }
        neighbors
    }

    /// Iterate over boundary edges (edges with exactly one incident facet).
    pub fn boundary_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_facets
            .iter()
            .filter(|(_, facets)| facets.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Iterate over non-manifold edges (edges shared by more than two facets).
    pub fn non_manifold_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_facets
            .iter()
            .filter(|(_, facets)| facets.len() > 2)
            .map(|(&edge, _)| edge)
    }

    /// Number of distinct undirected edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edge_to_facets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_connected_triangles() -> Vec<Facet> {
        // Triangles sharing edge (1, 2)
        vec![Facet::triangle(0, 1, 2), Facet::triangle(1, 3, 2)]
    }

    #[test]
    fn test_edge_map() {
        let facets = two_connected_triangles();
        let adj = MeshAdjacency::build(&facets);

        assert_eq!(adj.edge_count(), 5);
        assert_eq!(adj.facets_on_edge(1, 2), &[0, 1]);
        assert_eq!(adj.facets_on_edge(2, 1), &[0, 1]);
        assert_eq!(adj.facets_on_edge(0, 1), &[0]);
    }

    #[test]
    fn test_vertex_map() {
        let facets = two_connected_triangles();
        let adj = MeshAdjacency::build(&facets);

        assert_eq!(adj.facets_around_vertex(0), &[0]);
        assert_eq!(adj.facets_around_vertex(1), &[0, 1]);
        assert_eq!(adj.facets_around_vertex(3), &[1]);
        assert!(adj.facets_around_vertex(99).is_empty());
    }

    #[test]
    fn test_facet_neighbors() {
        let facets = two_connected_triangles();
        let adj = MeshAdjacency::build(&facets);

        assert_eq!(adj.facet_neighbors(0, &facets[0]), vec![1]);
        assert_eq!(adj.facet_neighbors(1, &facets[1]), vec![0]);
    }

    #[test]
    fn test_boundary_edges() {
        let facets = two_connected_triangles();
        let adj = MeshAdjacency::build(&facets);

        let boundary: Vec<_> = adj.boundary_edges().collect();
        assert_eq!(boundary.len(), 4);
        assert!(!boundary.contains(&(1, 2)));
    }

    #[test]
    fn test_non_manifold_edges() {
        // Three triangles sharing edge (0, 1)
        let facets = vec![
            Facet::triangle(0, 1, 2),
            Facet::triangle(0, 1, 3),
            Facet::triangle(0, 1, 4),
        ];
        let adj = MeshAdjacency::build(&facets);

        let nm: Vec<_> = adj.non_manifold_edges().collect();
        assert_eq!(nm, vec![(0, 1)]);
    }

    #[test]
    fn test_quad_facet_edges() {
        let facets = vec![Facet::new(vec![0, 1, 2, 3])];
        let adj = MeshAdjacency::build(&facets);

        assert_eq!(adj.edge_count(), 4);
        assert_eq!(adj.facets_on_edge(3, 0), &[0]);
    }
}
