//! End-to-end pipeline tests on small constructed meshes.

use mesh_atlas::{
    AtlasParams, DecimateParams, Facet, IntersectionParams, Mesh, PipelineConfig, RepairParams,
    Vertex, VertexColor, bake_facet_normals, bake_vertex_colors, colocate_vertices, decimate_mesh,
    detect_self_intersections, make_atlas, process_mesh, remove_small_components,
    repair_mesh_with_config, resolve_self_intersections, show_stats,
};

/// Unit cube, 8 vertices, 12 triangles, CCW winding viewed from outside.
fn unit_cube() -> Mesh {
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

/// Planar grid of 2n^2 triangles with per-vertex colors.
fn colored_grid(n: u32) -> Mesh {
    let mut mesh = Mesh::new();
    for j in 0..=n {
        for i in 0..=n {
            let mut v = Vertex::from_coords(i as f64, j as f64, 0.0);
            v.color = Some(VertexColor::from_float(
                i as f32 / n as f32,
                j as f32 / n as f32,
                0.5,
            ));
            mesh.vertices.push(v);
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

fn assert_no_dangling_indices(mesh: &Mesh) {
    for facet in &mesh.facets {
        for &v in &facet.vertices {
            assert!(
                (v as usize) < mesh.vertex_count(),
                "facet references vertex {} but mesh has {}",
                v,
                mesh.vertex_count()
            );
        }
    }
}

#[test]
fn colocation_is_idempotent() {
    let mut mesh = unit_cube();
    // Shift one facet's corner onto a near-duplicate vertex
    mesh.vertices.push(Vertex::from_coords(1.0 + 1e-5, 0.0, 0.0));
    mesh.facets[4].vertices[1] = 8;

    let first = colocate_vertices(&mut mesh, 1e-3);
    assert_eq!(first, 1);

    let vertices_after = mesh.vertex_count();
    let facets_after = mesh.facets.clone();

    let second = colocate_vertices(&mut mesh, 1e-3);
    assert_eq!(second, 0, "second pass must merge nothing");
    assert_eq!(mesh.vertex_count(), vertices_after);
    assert_eq!(mesh.facets, facets_after);
}

#[test]
fn no_dangling_indices_after_each_stage() {
    let mut mesh = unit_cube();
    mesh.vertices.push(Vertex::from_coords(0.5, 0.5, 2.0));
    mesh.vertices.push(Vertex::from_coords(0.6, 0.5, 2.0));
    mesh.vertices.push(Vertex::from_coords(0.5, 0.6, 2.0));
    mesh.facets.push(Facet::triangle(8, 9, 10));

    repair_mesh_with_config(
        &mut mesh,
        &RepairParams {
            colocate_tolerance: Some(1e-3),
            ..Default::default()
        },
    )
    .unwrap();
    assert_no_dangling_indices(&mesh);

    decimate_mesh(&mut mesh, &DecimateParams::with_bins(8));
    assert_no_dangling_indices(&mesh);

    mesh_atlas::orient_normals(&mut mesh);
    assert_no_dangling_indices(&mesh);

    make_atlas(&mut mesh, &AtlasParams::default()).unwrap();
    assert_no_dangling_indices(&mesh);
}

#[test]
fn pruning_preserves_area_fraction() {
    // Large quad plus several bits of debris
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(10.0, 10.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(0.0, 10.0, 0.0));
    mesh.facets.push(Facet::triangle(0, 1, 2));
    mesh.facets.push(Facet::triangle(0, 2, 3));

    for k in 0..3 {
        let base = mesh.vertex_count() as u32;
        let x = 50.0 + k as f64;
        mesh.vertices.push(Vertex::from_coords(x, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(x + 0.2, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(x, 0.2, 0.0));
        mesh.facets.push(Facet::triangle(base, base + 1, base + 2));
    }

    for tau in [0.001, 0.01, 0.1] {
        let mut m = mesh.clone();
        let area_before = m.surface_area();
        remove_small_components(&mut m, tau);
        let area_after = m.surface_area();

        assert!(
            area_after >= (1.0 - tau) * area_before,
            "tau={}: area {} -> {}",
            tau,
            area_before,
            area_after
        );
        assert!(m.facet_count() >= 2, "largest component must survive");
    }
}

#[test]
fn decimation_vertex_count_bounded_by_occupied_cells() {
    let mut mesh = colored_grid(12);
    let result = decimate_mesh(&mut mesh, &DecimateParams::with_bins(5));

    assert!(result.final_vertices <= result.occupied_cells);
    assert_no_dangling_indices(&mesh);
}

#[test]
fn packing_is_valid_for_decimated_grid() {
    let mut mesh = colored_grid(6);
    decimate_mesh(&mut mesh, &DecimateParams::with_bins(4));
    let atlas = make_atlas(&mut mesh, &AtlasParams::default()).unwrap();

    for chart in &atlas.charts {
        for p in chart.uv.values() {
            assert!((0.0..=1.0).contains(&p.x));
            assert!((0.0..=1.0).contains(&p.y));
        }
    }

    let bounds: Vec<_> = atlas.charts.iter().map(|c| c.uv_bounds()).collect();
    for i in 0..bounds.len() {
        for j in (i + 1)..bounds.len() {
            let (min_a, max_a) = bounds[i];
            let (min_b, max_b) = bounds[j];
            let overlap = min_a.x < max_b.x
                && max_a.x > min_b.x
                && min_a.y < max_b.y
                && max_a.y > min_b.y;
            assert!(!overlap, "packed charts {} and {} overlap", i, j);
        }
    }
}

#[test]
fn bake_output_is_deterministic() {
    let mut mesh = colored_grid(4);
    let atlas = make_atlas(&mut mesh, &AtlasParams::default()).unwrap();

    let normals_a = bake_facet_normals(&mesh, &atlas, 256);
    let normals_b = bake_facet_normals(&mesh, &atlas, 256);
    assert_eq!(normals_a, normals_b);

    let colors_a = bake_vertex_colors(&mesh, &atlas, 256);
    let colors_b = bake_vertex_colors(&mesh, &atlas, 256);
    assert_eq!(colors_a, colors_b);
}

#[test]
fn repair_restores_cube_with_duplicates_and_sliver() {
    // Cube whose facets reference two duplicate coincident vertices, plus a
    // zero-area sliver facet between the duplicates
    let mut mesh = unit_cube();
    mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0)); // 8, dup of 1
    mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 1.0)); // 9, dup of 6
    mesh.facets[4].vertices[1] = 8; // [0, 8, 5]
    mesh.facets[11].vertices[1] = 9; // [1, 9, 5]
    mesh.facets.push(Facet::triangle(1, 8, 5)); // sliver: 8 == 1 after merge,
    // and (1, 5) already bounds facet 4

    repair_mesh_with_config(
        &mut mesh,
        &RepairParams {
            colocate_tolerance: Some(1e-3),
            resolve_intersections: true,
            min_component_area: 0.01,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(mesh.vertex_count(), 8);
    assert_eq!(mesh.facet_count(), 12);
    assert!(mesh.is_triangulated());

    let stats = show_stats(&mesh, "repaired cube");
    assert_eq!(stats.components, 1);
}

#[test]
fn intersection_resolution_removes_interior_crossings() {
    // Two triangles forming an X-shaped crossing
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(-1.0, -1.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(1.0, -1.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(-1.0, 0.0, -1.0));
    mesh.vertices.push(Vertex::from_coords(1.0, 0.0, -1.0));
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
    mesh.facets.push(Facet::triangle(0, 1, 2));
    mesh.facets.push(Facet::triangle(3, 4, 5));

    let before = detect_self_intersections(&mesh, &IntersectionParams::default());
    assert!(!before.is_clean());

    resolve_self_intersections(&mut mesh, &IntersectionParams::default());
    assert_no_dangling_indices(&mesh);

    let after = detect_self_intersections(&mesh, &IntersectionParams::default());
    assert!(
        after.is_clean(),
        "{} crossing(s) survived resolution",
        after.intersection_count
    );
}

#[test]
fn full_pipeline_cube_to_baked_atlas() {
    let mut mesh = unit_cube();
    for v in &mut mesh.vertices {
        v.color = Some(VertexColor::new(200, 100, 50));
    }

    let config = PipelineConfig {
        decimate_bins: Some(50),
        texture_size: 128,
        ..Default::default()
    };

    let atlas = process_mesh(&mut mesh, &config).unwrap();

    // Cube survives intact at this grid resolution
    assert_eq!(mesh.facet_count(), 12);
    assert!(mesh.signed_volume() > 0.9);
    assert_eq!(atlas.chart_count(), 6);

    let texture = bake_vertex_colors(&mesh, &atlas, config.texture_size);
    let lit = texture
        .data
        .chunks_exact(3)
        .filter(|px| *px != [0, 0, 0])
        .count();
    assert!(lit > 0, "texture bake covered no pixels");
}
