//! Consistent facet orientation.
//!
//! BFS flood fill from a seed facet in each connected component, flipping any
//! neighbor that traverses the shared edge in the same direction as the facet
//! it was reached from. The visited set guarantees termination even on
//! non-orientable patches (a Moebius-like twist keeps the seed's choice and
//! accepts the one inconsistent seam). Closed components that end up
//! inside-out are flipped whole using their signed volume.

use hashbrown::HashSet;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::adjacency::MeshAdjacency;
use crate::types::{Mesh, edge_key};

/// Orient facet windings consistently across every connected component, then
/// flip closed components whose normals point inward.
///
/// Returns the total number of facets flipped.
pub fn orient_normals(mesh: &mut Mesh) -> usize {
    if mesh.facets.is_empty() {
        return 0;
    }

    let adjacency = MeshAdjacency::build(&mesh.facets);
    let facet_count = mesh.facets.len();

    let mut global_visited: HashSet<u32> = HashSet::new();
    let mut to_flip: HashSet<u32> = HashSet::new();
    let mut components: Vec<Vec<u32>> = Vec::new();

    for start_facet in 0..facet_count {
        let start_facet = start_facet as u32;

        if global_visited.contains(&start_facet) {
            continue;
        }

        let mut component = Vec::new();
        let mut component_flips: HashSet<u32> = HashSet::new();
        let mut queue: VecDeque<u32> = VecDeque::new();

        queue.push_back(start_facet);
        global_visited.insert(start_facet);

        while let Some(facet_idx) = queue.pop_front() {
            component.push(facet_idx);
            let edges: Vec<(u32, u32)> = mesh.facets[facet_idx as usize].edges().collect();

            for (v0, v1) in edges {
                let Some(neighbors) = adjacency.edge_to_facets.get(&edge_key(v0, v1)) else {
                    continue;
                };

                for &neighbor_idx in neighbors {
                    if neighbor_idx == facet_idx || global_visited.contains(&neighbor_idx) {
                        continue;
                    }

                    global_visited.insert(neighbor_idx);

                    // Consistent winding traverses a shared edge in opposite
                    // directions; same direction means the neighbor flips
                    // relative to the current facet
                    let same_direction =
                        edge_direction_in_facet(&mesh.facets[neighbor_idx as usize].vertices, v0, v1)
                            .unwrap_or_default();

                    let flip_neighbor = if component_flips.contains(&facet_idx) {
                        !same_direction
                    } else {
                        same_direction
                    };

                    if flip_neighbor {
                        component_flips.insert(neighbor_idx);
                    }

                    queue.push_back(neighbor_idx);
                }
            }
        }

        to_flip.extend(component_flips);
        components.push(component);
    }

    for &facet_idx in &to_flip {
        mesh.facets[facet_idx as usize].flip();
    }

    let mut flipped = to_flip.len();

    // Second pass: a consistently wound component can still face inward as a
    // whole; its signed volume decides
    let mut inverted_components = 0;
    for component in &components {
        let volume = component_signed_volume(mesh, component);
        if volume < -f64::EPSILON {
            for &facet_idx in component {
                mesh.facets[facet_idx as usize].flip();
            }
            flipped += component.len();
            inverted_components += 1;
        }
    }

    if flipped > 0 {
        info!(
            "Oriented normals: flipped {} facet(s) across {} component(s) ({} inside-out)",
            flipped,
            components.len(),
            inverted_components
        );
    } else {
        debug!(
            "Facet orientation already consistent across {} component(s)",
            components.len()
        );
    }

    flipped
}

/// Signed volume contributed by a subset of facets.
fn component_signed_volume(mesh: &Mesh, facet_indices: &[u32]) -> f64 {
    let mut volume = 0.0;
    for &facet_idx in facet_indices {
        let ring = &mesh.facets[facet_idx as usize].vertices;
        for i in 1..ring.len().saturating_sub(1) {
            let v0 = &mesh.vertices[ring[0] as usize].position;
            let v1 = &mesh.vertices[ring[i] as usize].position;
            let v2 = &mesh.vertices[ring[i + 1] as usize].position;
            volume += v0.coords.dot(&v1.coords.cross(&v2.coords));
        }
    }
    volume / 6.0
}

/// Check if edge (a, b) appears in a facet ring in the same direction
/// (a -> b). Returns None if the edge is not part of the ring.
fn edge_direction_in_facet(ring: &[u32], a: u32, b: u32) -> Option<bool> {
    let n = ring.len();
    for i in 0..n {
        let v0 = ring[i];
        let v1 = ring[(i + 1) % n];

        if v0 == a && v1 == b {
            return Some(true);
        }
        if v0 == b && v1 == a {
            return Some(false);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Facet, Vertex};

    fn make_unit_cube() -> Mesh {
        let mut mesh = Mesh::new();
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        for [x, y, z] in corners {
            mesh.vertices.push(Vertex::from_coords(x, y, z));
        }
        for [a, b, c] in [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ] {
            mesh.facets.push(Facet::triangle(a, b, c));
        }
        mesh
    }

    #[test]
    fn test_edge_direction() {
        assert_eq!(edge_direction_in_facet(&[0, 1, 2], 0, 1), Some(true));
        assert_eq!(edge_direction_in_facet(&[0, 1, 2], 1, 0), Some(false));
        assert_eq!(edge_direction_in_facet(&[0, 1, 2], 2, 0), Some(true));
        assert_eq!(edge_direction_in_facet(&[0, 1, 2], 0, 3), None);
    }

    #[test]
    fn test_already_consistent_cube() {
        let mut mesh = make_unit_cube();
        orient_normals(&mut mesh);
        assert!(mesh.signed_volume() > 0.99);
    }

    #[test]
    fn test_fix_single_flipped_facet() {
        let mut mesh = make_unit_cube();
        mesh.facets[5].flip();

        orient_normals(&mut mesh);

        // Consistent again: every edge traversed once in each direction
        let adjacency = MeshAdjacency::build(&mesh.facets);
        for ((a, b), facets) in adjacency.edge_to_facets.iter() {
            assert_eq!(facets.len(), 2);
            let d0 = edge_direction_in_facet(&mesh.facets[facets[0] as usize].vertices, *a, *b);
            let d1 = edge_direction_in_facet(&mesh.facets[facets[1] as usize].vertices, *a, *b);
            assert_ne!(d0, d1);
        }
        assert!(mesh.signed_volume() > 0.99);
    }

    #[test]
    fn test_inside_out_cube_is_flipped() {
        let mut mesh = make_unit_cube();
        for facet in &mut mesh.facets {
            facet.flip();
        }
        assert!(mesh.signed_volume() < 0.0);

        orient_normals(&mut mesh);
        assert!(mesh.signed_volume() > 0.99);
    }

    #[test]
    fn test_disconnected_components() {
        let mut mesh = Mesh::new();

        // Component 1: two triangles sharing edge (0, 1), second flipped
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, -1.0, 0.0));
        mesh.facets.push(Facet::triangle(0, 1, 2));
        mesh.facets.push(Facet::triangle(0, 1, 3)); // wrong direction on (0,1)

        // Component 2: same shape, far away
        mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(11.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.5, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.5, -1.0, 0.0));
        mesh.facets.push(Facet::triangle(4, 5, 6));
        mesh.facets.push(Facet::triangle(4, 5, 7));

        orient_normals(&mut mesh);

        for (edge, pair) in [((0u32, 1u32), (0usize, 1usize)), ((4, 5), (2, 3))] {
            let d0 =
                edge_direction_in_facet(&mesh.facets[pair.0].vertices, edge.0, edge.1);
            let d1 =
                edge_direction_in_facet(&mesh.facets[pair.1].vertices, edge.0, edge.1);
            assert_ne!(d0, d1, "edge {:?} should be traversed both ways", edge);
        }
    }

    #[test]
    fn test_terminates_on_nonmanifold_fan() {
        // Three triangles around one edge cannot be mutually consistent;
        // the pass must terminate and leave a valid mesh
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, -1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 0.0, 1.0));
        mesh.facets.push(Facet::triangle(0, 1, 2));
        mesh.facets.push(Facet::triangle(0, 1, 3));
        mesh.facets.push(Facet::triangle(0, 1, 4));

        orient_normals(&mut mesh);
        assert_eq!(mesh.facet_count(), 3);
    }
}
