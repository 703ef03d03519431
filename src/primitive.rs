//! Mesh generation for the three projection formats.
//!
//! Meshes are built in a +Z-forward convention; `projection::model_matrix`
//! turns them to face the viewer. Every emitted triangle is front-facing
//! (counter-clockwise) from the side the viewer looks at: the near face of
//! the screen quad and the inside of the spheres.

use crate::config::Format;
use std::f32::consts::{PI, TAU};
use thiserror::Error;

pub const MIN_SEGMENTS: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("mesh tessellation needs at least {MIN_SEGMENTS} segments, got {0}")]
    TooFewSegments(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.triangles.iter().flatten().copied()
    }
}

pub fn generate(format: Format, segments: u32) -> Result<Mesh, MeshError> {
    if segments < MIN_SEGMENTS {
        return Err(MeshError::TooFewSegments(segments));
    }

    let mesh = match format {
        Format::Screen => square(),
        Format::Half => sphere(segments, segments, PI),
        // same angular step as the hemisphere over twice the range
        Format::Full => sphere(segments, 2 * segments, TAU),
    };

    log::debug!(
        "[primitive] {} mesh: {} vertices, {} triangles",
        format,
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

fn square() -> Mesh {
    let positions = vec![
        [-1.0, 1.0, 0.0],
        [-1.0, -1.0, 0.0],
        [1.0, -1.0, 0.0],
        [1.0, 1.0, 0.0],
    ];
    // u runs against x: the base half-turn about Y mirrors the quad.
    let uvs = positions
        .iter()
        .map(|[x, y, _]| [(1.0 - x) * 0.5, (1.0 - y) * 0.5])
        .collect();

    Mesh {
        positions,
        uvs,
        normals: vec![[0.0, 0.0, -1.0]; 4],
        triangles: vec![[0, 2, 1], [0, 3, 2]],
    }
}

/// Unit sphere section spanning `azimuth_range` radians around Y, with
/// `segments` polar steps and `azimuth_steps` steps per ring.
fn sphere(segments: u32, azimuth_steps: u32, azimuth_range: f32) -> Mesh {
    let ring_width = azimuth_steps + 1;
    let vertex_count = ((segments + 1) * ring_width) as usize;

    let mut positions = Vec::with_capacity(vertex_count);
    let mut uvs = Vec::with_capacity(vertex_count);
    let mut normals = Vec::with_capacity(vertex_count);

    for ring in 0..=segments {
        let v = ring as f32 / segments as f32;
        let (sin_polar, cos_polar) = (v * PI).sin_cos();

        for step in 0..=azimuth_steps {
            let u = step as f32 / azimuth_steps as f32;
            let (sin_azimuth, cos_azimuth) = (u * azimuth_range).sin_cos();

            let position = [
                sin_polar * sin_azimuth,
                cos_polar,
                -sin_polar * cos_azimuth,
            ];
            positions.push(position);
            normals.push(position);
            uvs.push([u, v]);
        }
    }

    let mut triangles = Vec::with_capacity((2 * segments * azimuth_steps) as usize);
    for ring in 0..segments {
        for step in 0..azimuth_steps {
            let a = ring * ring_width + step;
            let b = a + 1;
            let c = a + ring_width;
            let d = c + 1;

            // a and b coincide on the north pole, c and d on the south pole.
            if ring != 0 {
                triangles.push([a, c, b]);
            }
            if ring != segments - 1 {
                triangles.push([b, c, d]);
            }
        }
    }

    Mesh {
        positions,
        uvs,
        normals,
        triangles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use proptest::prelude::*;

    const FORMATS: [Format; 3] = [Format::Screen, Format::Half, Format::Full];

    fn face_normal(mesh: &Mesh, triangle: [u32; 3]) -> Vec3 {
        let [a, b, c] = triangle.map(|index| Vec3::from(mesh.positions[index as usize]));
        (b - a).cross(c - a)
    }

    #[test]
    fn rejects_degenerate_segment_counts() {
        for format in FORMATS {
            assert_eq!(generate(format, 1), Err(MeshError::TooFewSegments(1)));
            assert_eq!(generate(format, 0), Err(MeshError::TooFewSegments(0)));
        }
    }

    #[test]
    fn square_faces_the_viewer() {
        let mesh = generate(Format::Screen, 2).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangles, vec![[0, 2, 1], [0, 3, 2]]);
        for &triangle in &mesh.triangles {
            let normal = face_normal(&mesh, triangle);
            assert!(normal.dot(Vec3::NEG_Z) > 0.0);
        }
    }

    #[test]
    fn square_uvs_put_row_zero_on_top() {
        let mesh = generate(Format::Screen, 2).unwrap();
        // top-left of the quad as seen after the half-turn is mesh (+1, +1)
        assert_eq!(mesh.uvs[3], [0.0, 0.0]);
        assert_eq!(mesh.uvs[1], [1.0, 1.0]);
    }

    #[test]
    fn sphere_rings_share_layout() {
        let segments = 8;
        let rings = (segments + 1) as usize;
        for (format, steps) in [(Format::Half, segments), (Format::Full, 2 * segments)] {
            let mesh = generate(format, segments).unwrap();
            let width = (steps + 1) as usize;
            assert_eq!(mesh.vertex_count(), rings * width);
            // two triangles per quad, minus one collapsed triangle per pole quad
            let quads = (segments * steps) as usize;
            assert_eq!(mesh.triangle_count(), 2 * quads - 2 * steps as usize);
            assert_eq!(mesh.uvs[width - 1], [1.0, 0.0]);
            assert_eq!(mesh.uvs[rings * width - 1], [1.0, 1.0]);
        }
    }

    #[test]
    fn hemisphere_is_centred_on_positive_x() {
        let mesh = generate(Format::Half, 4).unwrap();
        let centroid = mesh
            .positions
            .iter()
            .fold(Vec3::ZERO, |acc, p| acc + Vec3::from(*p))
            / mesh.vertex_count() as f32;
        assert!(centroid.x > 0.2);
        assert!(centroid.z.abs() < 1e-5);
    }

    #[test]
    fn sphere_vertices_lie_on_unit_sphere() {
        let mesh = generate(Format::Full, 12).unwrap();
        for position in &mesh.positions {
            assert!((Vec3::from(*position).length() - 1.0).abs() < 1e-5);
        }
    }

    proptest! {
        #[test]
        fn indices_stay_in_range(segments in 2u32..48, format_index in 0usize..3) {
            let mesh = generate(FORMATS[format_index], segments).unwrap();
            prop_assert!(mesh.triangle_count() > 0);
            let count = mesh.vertex_count() as u32;
            prop_assert!(mesh.indices().all(|index| index < count));
        }

        #[test]
        fn winding_is_uniform(segments in 2u32..48, format_index in 0usize..3) {
            let mesh = generate(FORMATS[format_index], segments).unwrap();
            let mut signs = mesh.triangles.iter().filter_map(|&triangle| {
                let normal = face_normal(&mesh, triangle);
                let outward = Vec3::from(mesh.normals[triangle[0] as usize])
                    + Vec3::from(mesh.normals[triangle[1] as usize])
                    + Vec3::from(mesh.normals[triangle[2] as usize]);
                (normal.length_squared() > 1e-12).then_some(normal.dot(outward) > 0.0)
            });
            let first = signs.next().unwrap();
            prop_assert!(signs.all(|sign| sign == first));
        }

        #[test]
        fn sphere_triangles_face_the_centre(segments in 2u32..48, full in any::<bool>()) {
            let format = if full { Format::Full } else { Format::Half };
            let mesh = generate(format, segments).unwrap();
            for &triangle in &mesh.triangles {
                let normal = face_normal(&mesh, triangle);
                prop_assert!(normal.length_squared() > 0.0, "collapsed triangle {:?}", triangle);
                let centroid = triangle
                    .iter()
                    .fold(Vec3::ZERO, |acc, &index| acc + Vec3::from(mesh.positions[index as usize]));
                prop_assert!(normal.dot(centroid) < 0.0);
            }
        }
    }
}
