use crate::config::Format;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Size and distance of the flat screen, in scene units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenPlacement {
    /// Half of the screen's visible height; the unit quad is scaled by it.
    pub height: f32,
    /// Distance from the viewer along the forward axis.
    pub distance: f32,
}

impl Default for ScreenPlacement {
    fn default() -> Self {
        Self {
            height: 1.0,
            distance: 1.0,
        }
    }
}

impl ScreenPlacement {
    pub fn new(height: f32) -> Self {
        Self {
            height,
            distance: height,
        }
    }
}

/// Half-turn about Y: meshes are built +Z-forward, the viewer looks down −Z.
pub fn base_rotation() -> Mat4 {
    Mat4::from_rotation_y(PI)
}

pub fn model_matrix(format: Format, aspect_ratio: f32) -> Mat4 {
    model_matrix_with(format, aspect_ratio, &ScreenPlacement::default())
}

pub fn model_matrix_with(format: Format, aspect_ratio: f32, placement: &ScreenPlacement) -> Mat4 {
    let base = base_rotation();
    match format {
        Format::Screen => {
            let height = placement.height;
            base * Mat4::from_translation(Vec3::new(0.0, 0.0, placement.distance))
                * Mat4::from_scale(Vec3::new(height * aspect_ratio, height, 1.0))
        }
        // the hemisphere is built around +X; turn its middle onto forward
        Format::Half => base * Mat4::from_rotation_y(-FRAC_PI_2),
        Format::Full => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4Swizzles;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn screen_sits_in_front_of_viewer() {
        let model = model_matrix(Format::Screen, 16.0 / 9.0);
        assert_ne!(model, base_rotation());

        let centre = model.transform_point3(Vec3::ZERO);
        assert!(approx(centre, Vec3::new(0.0, 0.0, -1.0)));

        // mesh +X ends up on the viewer's left after the half-turn
        let edge = model.transform_point3(Vec3::X);
        assert!(approx(edge, Vec3::new(-16.0 / 9.0, 0.0, -1.0)));
    }

    #[test]
    fn screen_respects_placement() {
        let placement = ScreenPlacement {
            height: 2.0,
            distance: 5.0,
        };
        let model = model_matrix_with(Format::Screen, 1.0, &placement);
        assert!(approx(model.w_axis.xyz(), Vec3::new(0.0, 0.0, -5.0)));
        assert!(approx(model.transform_point3(Vec3::Y), Vec3::new(0.0, 2.0, -5.0)));
    }

    #[test]
    fn full_sphere_is_pure_rotation() {
        let model = model_matrix(Format::Full, 2.0);
        assert!((model.determinant() - 1.0).abs() < 1e-5);
        assert!(approx(model.w_axis.xyz(), Vec3::ZERO));
        // equirect centre (mesh +Z) maps to forward
        assert!(approx(model.transform_vector3(Vec3::Z), Vec3::NEG_Z));
    }

    #[test]
    fn hemisphere_centre_faces_forward() {
        let model = model_matrix(Format::Half, 1.0);
        assert!((model.determinant() - 1.0).abs() < 1e-5);
        assert!(approx(model.transform_vector3(Vec3::X), Vec3::NEG_Z));
        // the u = 0 edge (mesh −Z) is on the viewer's left
        assert!(approx(model.transform_vector3(Vec3::NEG_Z), Vec3::NEG_X));
    }
}
