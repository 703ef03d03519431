//! Texture-coordinate partitioning of stereo-packed video frames.
//!
//! Each eye samples `uv * scale + offset`. Stereo layouts split the frame at
//! exactly 0.5 in normalized coordinates. For odd pixel sizes the middle
//! column (or row) straddles the split, so nearest sampling reads it from
//! both eyes.

use crate::config::{Eye, Layout};
use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoordTransform {
    pub scale: Vec2,
    pub offset: Vec2,
}

impl TexCoordTransform {
    pub const IDENTITY: Self = Self::new(Vec2::ONE, Vec2::ZERO);

    pub const fn new(scale: Vec2, offset: Vec2) -> Self {
        Self { scale, offset }
    }

    pub fn apply(&self, uv: Vec2) -> Vec2 {
        uv * self.scale + self.offset
    }

    /// `(scale.x, scale.y, offset.x, offset.y)`, the shader uniform layout.
    pub fn to_array(&self) -> [f32; 4] {
        [self.scale.x, self.scale.y, self.offset.x, self.offset.y]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeTransforms {
    pub left: TexCoordTransform,
    pub right: TexCoordTransform,
}

impl EyeTransforms {
    pub fn for_eye(&self, eye: Eye) -> TexCoordTransform {
        match eye {
            Eye::Left | Eye::None => self.left,
            Eye::Right => self.right,
        }
    }
}

pub fn tex_coord_transforms(layout: Layout, flip: bool) -> EyeTransforms {
    let (first, second) = match layout {
        Layout::Mono => (TexCoordTransform::IDENTITY, TexCoordTransform::IDENTITY),
        Layout::StereoLeftRight => (
            TexCoordTransform::new(Vec2::new(0.5, 1.0), Vec2::ZERO),
            TexCoordTransform::new(Vec2::new(0.5, 1.0), Vec2::new(0.5, 0.0)),
        ),
        Layout::StereoTopBottom => (
            TexCoordTransform::new(Vec2::new(1.0, 0.5), Vec2::ZERO),
            TexCoordTransform::new(Vec2::new(1.0, 0.5), Vec2::new(0.0, 0.5)),
        ),
    };

    if flip {
        EyeTransforms {
            left: second,
            right: first,
        }
    } else {
        EyeTransforms {
            left: first,
            right: second,
        }
    }
}

/// Displayed aspect ratio of one eye's image.
pub fn aspect_ratio(layout: Layout, raw_width: u32, raw_height: u32) -> f32 {
    let width = raw_width as f32;
    let height = raw_height as f32;
    match layout {
        Layout::Mono => width / height,
        Layout::StereoLeftRight => (width * 0.5) / height,
        Layout::StereoTopBottom => (width / height) * 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoFrame;

    const LAYOUTS: [Layout; 3] = [Layout::Mono, Layout::StereoLeftRight, Layout::StereoTopBottom];

    #[test]
    fn mono_ignores_flip() {
        assert_eq!(
            tex_coord_transforms(Layout::Mono, false),
            tex_coord_transforms(Layout::Mono, true)
        );
        let eyes = tex_coord_transforms(Layout::Mono, false);
        assert_eq!(eyes.left, TexCoordTransform::IDENTITY);
    }

    #[test]
    fn left_right_partitions_columns() {
        let eyes = tex_coord_transforms(Layout::StereoLeftRight, false);
        assert_eq!(eyes.left.offset.x, 0.0);
        assert_eq!(eyes.left.scale.x, 0.5);
        assert_eq!(eyes.right.offset.x, 0.5);
        assert_eq!(eyes.right.scale.x, 0.5);
        for eye in [eyes.left, eyes.right] {
            assert_eq!(eye.scale.y, 1.0);
            assert_eq!(eye.offset.y, 0.0);
        }
        // the halves meet without a gap or overlap
        assert_eq!(eyes.left.apply(Vec2::ONE).x, eyes.right.apply(Vec2::ZERO).x);
        assert_eq!(eyes.right.apply(Vec2::ONE), Vec2::ONE);
    }

    #[test]
    fn odd_width_middle_column_is_shared() {
        let frame = VideoFrame::from_fn(5, 1, |x, _| [x as u8, 0, 0, 255]).unwrap();
        let eyes = tex_coord_transforms(Layout::StereoLeftRight, false);
        let column = |eye: TexCoordTransform, u: f32| frame.sample_nearest(eye.apply(Vec2::new(u, 0.5)))[0];

        assert_eq!(column(eyes.left, 0.0), 0);
        assert_eq!(column(eyes.left, 0.999), 2);
        assert_eq!(column(eyes.right, 0.0), 2);
        assert_eq!(column(eyes.right, 0.999), 4);
    }

    #[test]
    fn top_bottom_partitions_rows() {
        let eyes = tex_coord_transforms(Layout::StereoTopBottom, false);
        assert_eq!(eyes.left.to_array(), [1.0, 0.5, 0.0, 0.0]);
        assert_eq!(eyes.right.to_array(), [1.0, 0.5, 0.0, 0.5]);
        assert_eq!(eyes.left.apply(Vec2::ONE).y, eyes.right.apply(Vec2::ZERO).y);
    }

    #[test]
    fn flip_swaps_eyes() {
        for layout in LAYOUTS {
            let straight = tex_coord_transforms(layout, false);
            let flipped = tex_coord_transforms(layout, true);
            assert_eq!(straight.left, flipped.right);
            assert_eq!(straight.right, flipped.left);
        }
    }

    #[test]
    fn mono_view_uses_left_transform() {
        let eyes = tex_coord_transforms(Layout::StereoLeftRight, true);
        assert_eq!(eyes.for_eye(Eye::None), eyes.left);
        assert_eq!(eyes.for_eye(Eye::Right), eyes.right);
    }

    #[test]
    fn aspect_ratio_accounts_for_packing() {
        let expected = 1920.0 / 1080.0;
        assert!((aspect_ratio(Layout::StereoLeftRight, 3840, 1080) - expected).abs() < 1e-3);
        assert!((aspect_ratio(Layout::Mono, 1920, 1080) - expected).abs() < 1e-3);
        assert!((aspect_ratio(Layout::StereoTopBottom, 1920, 2160) - 0.444).abs() < 1e-3);
        assert!((aspect_ratio(Layout::StereoLeftRight, 3840, 1080) - 1.778).abs() < 1e-3);
    }
}
