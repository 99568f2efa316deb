use glam::{Quat, Vec3};
use openxr::sys;
use serde::{Deserialize, Serialize};

use crate::{SpaceId, SwapchainId};

/// A quad composition layer for the current frame.
///
/// Layers only live for one frame: they are built after the image is rendered, handed to
/// [`crate::Session::add_layer`] and submitted by [`crate::Session::end_frame`].
#[derive(Debug, Clone, Copy)]
pub struct Layer {
    /// Pose of the quad's centre, in `space`
    pub pose: sys::Posef,
    /// Size of the quad in metres
    pub size: sys::Extent2Df,
    /// The swapchain that holds the pixels
    pub swapchain: SwapchainId,
    /// The space `pose` is expressed in
    pub space: SpaceId,
}

impl Layer {
    /// A quad showing the whole of `swapchain`.
    pub fn quad(
        swapchain: SwapchainId,
        space: SpaceId,
        pose: sys::Posef,
        width: f32,
        height: f32,
    ) -> Self {
        Self {
            pose,
            size: sys::Extent2Df { width, height },
            swapchain,
            space,
        }
    }
}

/// Where the quad sits relative to the reference space origin when the renderer doesn't say.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadLayout {
    /// Quad width in metres
    pub width: f32,
    /// Quad height in metres
    pub height: f32,
    /// Distance in front of the origin, in metres
    pub distance: f32,
    /// Height of the quad's centre above the origin, in metres
    pub elevation: f32,
    /// Rotation about the vertical axis, in degrees
    pub yaw_degrees: f32,
}

impl Default for QuadLayout {
    fn default() -> Self {
        Self {
            width: 1.6,
            height: 0.9,
            distance: 2.0,
            elevation: 0.0,
            yaw_degrees: 0.0,
        }
    }
}

impl QuadLayout {
    /// The quad faces back towards the origin; OpenXR's forward is -Z.
    pub fn pose(&self) -> sys::Posef {
        let rotation = Quat::from_rotation_y(self.yaw_degrees.to_radians());
        let translation = rotation * Vec3::new(0.0, self.elevation, -self.distance);
        sys::Posef {
            orientation: mint::Quaternion::from(rotation).into(),
            position: mint::Vector3::from(translation).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    pub fn test_default_layout_is_straight_ahead() {
        let pose = QuadLayout::default().pose();
        assert_relative_eq!(pose.position.x, 0.0);
        assert_relative_eq!(pose.position.y, 0.0);
        assert_relative_eq!(pose.position.z, -2.0);
        assert_relative_eq!(pose.orientation.w, 1.0);
    }

    #[test]
    pub fn test_yawed_layout_stays_at_distance() {
        let layout = QuadLayout {
            distance: 3.0,
            elevation: 1.5,
            yaw_degrees: 90.0,
            ..Default::default()
        };
        let pose = layout.pose();

        // A quarter turn to the left puts the quad on the -X axis.
        assert_relative_eq!(pose.position.x, -3.0, epsilon = 1e-5);
        assert_relative_eq!(pose.position.y, 1.5, epsilon = 1e-5);
        assert_relative_eq!(pose.position.z, 0.0, epsilon = 1e-5);
    }
}
