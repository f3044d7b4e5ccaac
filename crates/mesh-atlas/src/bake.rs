//! Attribute baking: rasterize mesh attributes into atlas-aligned images.
//!
//! For every chart, triangles are mapped from UV space to pixel space and
//! each covered pixel receives the barycentric interpolation of the source
//! attribute. Chart footprints are disjoint, so the output does not depend on
//! chart processing order; pixels outside every chart keep the background
//! value (black).

use std::path::Path;

use tracing::{debug, info, warn};

use crate::atlas::Atlas;
use crate::error::{MeshError, MeshResult};
use crate::types::Mesh;

/// A dense RGB image with 3 bytes per pixel, row-major.
///
/// Row 0 corresponds to v = 0 (OBJ texture convention, origin bottom-left);
/// [`save_image`] flips rows for PNG encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Create a black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
        }
    }

    /// Write one pixel.
    #[inline]
    pub fn put(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let idx = ((y * self.width + x) * 3) as usize;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// Read one pixel.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * self.width + x) * 3) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

/// Bake flat facet normals into an image.
///
/// Normals are encoded as `rgb = n * 0.5 + 0.5`, the usual object-space
/// normal map convention.
pub fn bake_facet_normals(mesh: &Mesh, atlas: &Atlas, size: u32) -> Image {
    info!("Baking facet normals into {}x{} image", size, size);

    rasterize(mesh, atlas, size, |mesh, facet_idx, _bary| {
        match mesh.facet_normal(facet_idx) {
            Some(n) => [
                ((n.x * 0.5 + 0.5) * 255.0) as u8,
                ((n.y * 0.5 + 0.5) * 255.0) as u8,
                ((n.z * 0.5 + 0.5) * 255.0) as u8,
            ],
            None => [128, 128, 128],
        }
    })
}

/// Bake smooth per-vertex colors into an image.
///
/// Vertices without a color contribute white, so meshes loaded from formats
/// without color data still produce a usable texture.
pub fn bake_vertex_colors(mesh: &Mesh, atlas: &Atlas, size: u32) -> Image {
    info!("Baking vertex colors into {}x{} image", size, size);

    if !mesh.has_vertex_colors() {
        warn!("Mesh has no complete vertex color attribute; missing entries bake as white");
    }

    rasterize(mesh, atlas, size, |mesh, facet_idx, bary| {
        let ring = &mesh.facets[facet_idx].vertices;
        let mut rgb = [0.0f32; 3];
        for (corner, &w) in bary.iter().enumerate() {
            let (r, g, b) = mesh.vertices[ring[corner] as usize]
                .color
                .map(|c| c.to_float())
                .unwrap_or((1.0, 1.0, 1.0));
            rgb[0] += r * w as f32;
            rgb[1] += g * w as f32;
            rgb[2] += b * w as f32;
        }
        [
            (rgb[0].clamp(0.0, 1.0) * 255.0) as u8,
            (rgb[1].clamp(0.0, 1.0) * 255.0) as u8,
            (rgb[2].clamp(0.0, 1.0) * 255.0) as u8,
        ]
    })
}

/// Scanline rasterizer over atlas charts.
///
/// The shader receives the facet index and the barycentric weights of the
/// pixel center within that facet's UV triangle.
fn rasterize(
    mesh: &Mesh,
    atlas: &Atlas,
    size: u32,
    shade: impl Fn(&Mesh, usize, [f64; 3]) -> [u8; 3],
) -> Image {
    let mut image = Image::new(size, size);
    if size == 0 {
        return image;
    }
    let sizef = size as f64;

    let mut covered = 0u64;

    for chart in &atlas.charts {
        for &facet_idx in &chart.facets {
            let ring = &mesh.facets[facet_idx as usize].vertices;
            if ring.len() != 3 {
                continue;
            }

            let Some(uv) = ring
                .iter()
                .map(|v| chart.uv.get(v).copied())
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };

            // Pixel-space corners
            let px: Vec<(f64, f64)> = uv.iter().map(|p| (p.x * sizef, p.y * sizef)).collect();

            let min_x = px.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
            let max_x = px.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
            let min_y = px.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
            let max_y = px.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

            let x0 = (min_x - 0.5).floor().max(0.0) as u32;
            let x1 = ((max_x + 0.5).ceil() as i64).min(size as i64 - 1).max(0) as u32;
            let y0 = (min_y - 0.5).floor().max(0.0) as u32;
            let y1 = ((max_y + 0.5).ceil() as i64).min(size as i64 - 1).max(0) as u32;

            let (ax, ay) = px[0];
            let (bx, by) = px[1];
            let (cx, cy) = px[2];

            let denom = (by - cy) * (ax - cx) + (cx - bx) * (ay - cy);
            if denom.abs() < f64::EPSILON {
                continue; // UV-degenerate triangle covers no pixels
            }

            for y in y0..=y1 {
                for x in x0..=x1 {
                    let pxc = x as f64 + 0.5;
                    let pyc = y as f64 + 0.5;

                    let w0 = ((by - cy) * (pxc - cx) + (cx - bx) * (pyc - cy)) / denom;
                    let w1 = ((cy - ay) * (pxc - cx) + (ax - cx) * (pyc - cy)) / denom;
                    let w2 = 1.0 - w0 - w1;

                    const EPS: f64 = 1e-9;
                    if w0 >= -EPS && w1 >= -EPS && w2 >= -EPS {
                        image.put(x, y, shade(mesh, facet_idx as usize, [w0, w1, w2]));
                        covered += 1;
                    }
                }
            }
        }
    }

    debug!(
        "Rasterized {} pixel writes over {} chart(s)",
        covered,
        atlas.chart_count()
    );

    image
}

/// Encode an image as PNG.
///
/// Rows are flipped so that v = 0 lands at the bottom of the file, matching
/// the OBJ texture coordinate convention.
pub fn save_image(path: &Path, image: &Image) -> MeshResult<()> {
    let mut flipped = Vec::with_capacity(image.data.len());
    for y in (0..image.height).rev() {
        let start = (y * image.width * 3) as usize;
        let end = start + (image.width * 3) as usize;
        flipped.extend_from_slice(&image.data[start..end]);
    }

    image::save_buffer(
        path,
        &flipped,
        image.width,
        image.height,
        image::ExtendedColorType::Rgb8,
    )
    .map_err(|e| MeshError::IoWrite {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;

    info!("Saved {}x{} image to {:?}", image.width, image.height, path);
    Ok(())
}
