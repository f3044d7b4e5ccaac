//! Mesh file I/O for STL, OBJ, and PLY formats.
//!
//! Loading builds a fresh mesh or fails without partial state; saving
//! serializes the current mesh as-is. OBJ output can carry the UV atlas
//! (one `vt` per vertex-in-chart) and a companion MTL referencing the baked
//! texture.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::atlas::Atlas;
use crate::error::{MeshError, MeshResult};
use crate::types::{Facet, Mesh, Vertex, VertexColor};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Obj,
    Ply,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "stl" => Some(MeshFormat::Stl),
                "obj" => Some(MeshFormat::Obj),
                "ply" => Some(MeshFormat::Ply),
                _ => None,
            })
    }
}

/// Load a mesh from file, auto-detecting format from extension.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let format = MeshFormat::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
        extension: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;

    info!("Loading mesh from {:?} (format: {:?})", path, format);

    let mesh = match format {
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Ply => load_ply(path)?,
    };

    if mesh.vertices.is_empty() || mesh.facets.is_empty() {
        return Err(MeshError::EmptyMesh {
            details: format!("{:?} contains no usable geometry", path),
        });
    }

    validate_mesh(&mesh)?;

    info!(
        "Loaded mesh: {} vertices, {} facets",
        mesh.vertex_count(),
        mesh.facet_count()
    );

    Ok(mesh)
}

/// Check index bounds and coordinate finiteness.
fn validate_mesh(mesh: &Mesh) -> MeshResult<()> {
    for (vi, vertex) in mesh.vertices.iter().enumerate() {
        for (name, value) in [
            ("x", vertex.position.x),
            ("y", vertex.position.y),
            ("z", vertex.position.z),
        ] {
            if !value.is_finite() {
                return Err(MeshError::InvalidCoordinate {
                    vertex_index: vi,
                    coordinate: name,
                    value,
                });
            }
        }
    }

    let vertex_count = mesh.vertices.len();
    for (fi, facet) in mesh.facets.iter().enumerate() {
        for &v in &facet.vertices {
            if v as usize >= vertex_count {
                return Err(MeshError::InvalidVertexIndex {
                    facet_index: fi,
                    vertex_index: v,
                    vertex_count,
                });
            }
        }
    }

    Ok(())
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::parse(path, e.to_string()))?;

    debug!(
        "STL contains {} vertices, {} triangles",
        stl.vertices.len(),
        stl.faces.len()
    );

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());

    for v in &stl.vertices {
        mesh.vertices.push(Vertex::from_coords(
            v.0[0] as f64,
            v.0[1] as f64,
            v.0[2] as f64,
        ));
    }

    for face in &stl.faces {
        let indices = [
            face.vertices[0] as u32,
            face.vertices[1] as u32,
            face.vertices[2] as u32,
        ];
        if indices[0] != indices[1] && indices[1] != indices[2] && indices[0] != indices[2] {
            mesh.facets
                .push(Facet::triangle(indices[0], indices[1], indices[2]));
        }
    }

    Ok(mesh)
}

/// Load mesh from OBJ file, preserving polygonal facets and vertex colors.
fn load_obj(path: &Path) -> MeshResult<Mesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: false,
            single_index: false,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::parse(path, e.to_string()))?;

    let mut mesh = Mesh::new();

    for model in &models {
        let m = &model.mesh;
        let base = mesh.vertices.len() as u32;
        let has_colors = m.vertex_color.len() == m.positions.len();

        for i in 0..m.positions.len() / 3 {
            let mut vertex = Vertex::from_coords(
                m.positions[3 * i] as f64,
                m.positions[3 * i + 1] as f64,
                m.positions[3 * i + 2] as f64,
            );
            if has_colors {
                vertex.color = Some(VertexColor::from_float(
                    m.vertex_color[3 * i],
                    m.vertex_color[3 * i + 1],
                    m.vertex_color[3 * i + 2],
                ));
            }
            mesh.vertices.push(vertex);
        }

        if m.face_arities.is_empty() {
            // Already triangulated by the source
            for tri in m.indices.chunks_exact(3) {
                mesh.facets
                    .push(Facet::triangle(base + tri[0], base + tri[1], base + tri[2]));
            }
        } else {
            let mut cursor = 0usize;
            for &arity in &m.face_arities {
                let arity = arity as usize;
                let ring: Vec<u32> = m.indices[cursor..cursor + arity]
                    .iter()
                    .map(|&i| base + i)
                    .collect();
                cursor += arity;
                if ring.len() >= 3 {
                    mesh.facets.push(Facet::new(ring));
                }
            }
        }
    }

    Ok(mesh)
}

/// Load mesh from PLY file, including per-vertex colors when present.
fn load_ply(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let parser = ply_rs::parser::Parser::<ply_rs::ply::DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| MeshError::parse(path, e.to_string()))?;

    let mut mesh = Mesh::new();

    if let Some(vertices) = ply.payload.get("vertex") {
        for element in vertices {
            let x = prop_f64(element.get("x")).unwrap_or(0.0);
            let y = prop_f64(element.get("y")).unwrap_or(0.0);
            let z = prop_f64(element.get("z")).unwrap_or(0.0);

            let mut vertex = Vertex::from_coords(x, y, z);

            if let (Some(r), Some(g), Some(b)) = (
                prop_f64(element.get("red")),
                prop_f64(element.get("green")),
                prop_f64(element.get("blue")),
            ) {
                vertex.color = Some(VertexColor::new(r as u8, g as u8, b as u8));
            }

            mesh.vertices.push(vertex);
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for element in faces {
            let indices = element
                .get("vertex_indices")
                .or_else(|| element.get("vertex_index"))
                .and_then(prop_index_list);

            if let Some(ring) = indices {
                if ring.len() >= 3 {
                    mesh.facets.push(Facet::new(ring));
                }
            }
        }
    }

    Ok(mesh)
}

/// Numeric PLY property as f64.
fn prop_f64(prop: Option<&ply_rs::ply::Property>) -> Option<f64> {
    use ply_rs::ply::Property;
    match prop? {
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        _ => None,
    }
}

/// PLY list property as vertex indices.
fn prop_index_list(prop: &ply_rs::ply::Property) -> Option<Vec<u32>> {
    use ply_rs::ply::Property;
    match prop {
        Property::ListChar(v) => Some(v.iter().map(|&i| i as u32).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&i| i as u32).collect()),
        Property::ListShort(v) => Some(v.iter().map(|&i| i as u32).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&i| i as u32).collect()),
        Property::ListInt(v) => Some(v.iter().map(|&i| i as u32).collect()),
        Property::ListUInt(v) => Some(v.clone()),
        _ => None,
    }
}

/// Save a mesh without texture information.
pub fn save_mesh(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    save_mesh_with_texture(mesh, None, path, None)
}

/// Save a mesh, optionally with its UV atlas and a texture reference.
///
/// Only OBJ carries UVs and the material link; other formats save geometry
/// and log that the texture reference was dropped.
pub fn save_mesh_with_texture(
    mesh: &Mesh,
    atlas: Option<&Atlas>,
    path: &Path,
    texture: Option<&Path>,
) -> MeshResult<()> {
    let format = MeshFormat::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
        extension: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;

    info!("Saving mesh to {:?} (format: {:?})", path, format);

    match format {
        MeshFormat::Obj => save_obj(mesh, atlas, path, texture),
        MeshFormat::Ply => {
            if texture.is_some() {
                warn!("PLY output drops the texture reference");
            }
            save_ply(mesh, path)
        }
        MeshFormat::Stl => {
            if texture.is_some() {
                warn!("STL output drops the texture reference");
            }
            save_stl(mesh, path)
        }
    }
}

/// Save mesh as OBJ with optional UVs and MTL texture reference.
fn save_obj(
    mesh: &Mesh,
    atlas: Option<&Atlas>,
    path: &Path,
    texture: Option<&Path>,
) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut w = BufWriter::new(file);

    let write_err = |e: std::io::Error| MeshError::io_write(path, e);

    writeln!(w, "# {} vertices, {} facets", mesh.vertex_count(), mesh.facet_count())
        .map_err(write_err)?;

    // Companion material when a texture is referenced
    let mtl_path = path.with_extension("mtl");
    if let Some(texture) = texture {
        let mtl_name = mtl_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("material.mtl");
        writeln!(w, "mtllib {}", mtl_name).map_err(write_err)?;
        writeln!(w, "usemtl baked").map_err(write_err)?;

        write_mtl(&mtl_path, texture)?;
    }

    for vertex in &mesh.vertices {
        let p = &vertex.position;
        match vertex.color {
            Some(c) => {
                let (r, g, b) = c.to_float();
                writeln!(w, "v {} {} {} {} {} {}", p.x, p.y, p.z, r, g, b).map_err(write_err)?;
            }
            None => writeln!(w, "v {} {} {}", p.x, p.y, p.z).map_err(write_err)?,
        }
    }

    // One vt per (vertex, chart) pair; facets reference them via their chart
    let mut vt_index: HashMap<(u32, u32), usize> = HashMap::new();
    if let Some(atlas) = atlas {
        let mut next = 1usize; // OBJ indices are 1-based
        for (chart_id, chart) in atlas.charts.iter().enumerate() {
            let mut vertices: Vec<u32> = chart.uv.keys().copied().collect();
            vertices.sort_unstable();
            for v in vertices {
                let uv = chart.uv[&v];
                writeln!(w, "vt {} {}", uv.x, uv.y).map_err(write_err)?;
                vt_index.insert((chart_id as u32, v), next);
                next += 1;
            }
        }
    }

    for facet in &mesh.facets {
        write!(w, "f").map_err(write_err)?;
        for &v in &facet.vertices {
            match facet.chart.and_then(|c| vt_index.get(&(c, v))) {
                Some(&vt) => write!(w, " {}/{}", v + 1, vt).map_err(write_err)?,
                None => write!(w, " {}", v + 1).map_err(write_err)?,
            }
        }
        writeln!(w).map_err(write_err)?;
    }

    w.flush().map_err(write_err)?;
    Ok(())
}

/// Write a minimal MTL file pointing at the baked texture.
fn write_mtl(path: &Path, texture: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut w = BufWriter::new(file);

    let texture_name = texture
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("texture.png");

    writeln!(w, "newmtl baked").map_err(|e| MeshError::io_write(path, e))?;
    writeln!(w, "Kd 1.0 1.0 1.0").map_err(|e| MeshError::io_write(path, e))?;
    writeln!(w, "map_Kd {}", texture_name).map_err(|e| MeshError::io_write(path, e))?;
    w.flush().map_err(|e| MeshError::io_write(path, e))?;
    Ok(())
}

/// Save mesh as ASCII PLY, with vertex colors when present.
fn save_ply(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut w = BufWriter::new(file);
    let write_err = |e: std::io::Error| MeshError::io_write(path, e);

    let with_colors = mesh.has_vertex_colors();

    writeln!(w, "ply").map_err(write_err)?;
    writeln!(w, "format ascii 1.0").map_err(write_err)?;
    writeln!(w, "element vertex {}", mesh.vertex_count()).map_err(write_err)?;
    writeln!(w, "property double x").map_err(write_err)?;
    writeln!(w, "property double y").map_err(write_err)?;
    writeln!(w, "property double z").map_err(write_err)?;
    if with_colors {
        writeln!(w, "property uchar red").map_err(write_err)?;
        writeln!(w, "property uchar green").map_err(write_err)?;
        writeln!(w, "property uchar blue").map_err(write_err)?;
    }
    writeln!(w, "element face {}", mesh.facet_count()).map_err(write_err)?;
    writeln!(w, "property list uchar uint vertex_indices").map_err(write_err)?;
    writeln!(w, "end_header").map_err(write_err)?;

    for vertex in &mesh.vertices {
        let p = &vertex.position;
        if with_colors {
            let c = vertex.color.unwrap();
            writeln!(w, "{} {} {} {} {} {}", p.x, p.y, p.z, c.r, c.g, c.b).map_err(write_err)?;
        } else {
            writeln!(w, "{} {} {}", p.x, p.y, p.z).map_err(write_err)?;
        }
    }

    for facet in &mesh.facets {
        write!(w, "{}", facet.degree()).map_err(write_err)?;
        for &v in &facet.vertices {
            write!(w, " {}", v).map_err(write_err)?;
        }
        writeln!(w).map_err(write_err)?;
    }

    w.flush().map_err(write_err)?;
    Ok(())
}

/// Save mesh as binary STL. Polygonal facets are fan-triangulated on write.
fn save_stl(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let mut triangles = Vec::new();

    for tri in mesh.triangles() {
        let normal = tri
            .normal()
            .map(|n| [n.x as f32, n.y as f32, n.z as f32])
            .unwrap_or([0.0, 0.0, 0.0]);

        triangles.push(stl_io::Triangle {
            normal: stl_io::Normal::new(normal),
            vertices: [
                stl_io::Vertex::new([tri.v0.x as f32, tri.v0.y as f32, tri.v0.z as f32]),
                stl_io::Vertex::new([tri.v1.x as f32, tri.v1.y as f32, tri.v1.z as f32]),
                stl_io::Vertex::new([tri.v2.x as f32, tri.v2.y as f32, tri.v2.z as f32]),
            ],
        });
    }

    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter())
        .map_err(|e| MeshError::io_write(path, e))?;

    Ok(())
}
