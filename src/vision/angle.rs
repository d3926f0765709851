use super::focus::FocusPoint;

/// Real-world angle implied by a focus point; positive x is right, positive y is up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AngleOffset {
    pub x_deg: f64,
    pub y_deg: f64,
}

/// Maps pixel-space focus points to angles using the camera field of view.
#[derive(Clone, Copy, Debug)]
pub struct AngleMapper {
    pub fov_x_deg: f64,
    pub fov_y_deg: f64,
}

impl AngleMapper {
    pub fn new(fov_x_deg: f64, fov_y_deg: f64) -> Self {
        Self {
            fov_x_deg,
            fov_y_deg,
        }
    }

    /// The image centre maps to `(0, 0)`. Pixel y grows downward, so its sign is flipped.
    pub fn offset(&self, point: &FocusPoint) -> AngleOffset {
        let width = point.frame_width as f64;
        let height = point.frame_height as f64;
        let x = (point.x - width / 2.0) / (width / self.fov_x_deg);
        let y = -(point.y - height / 2.0) / (height / self.fov_y_deg);
        AngleOffset {
            x_deg: normalize_degrees(x),
            y_deg: normalize_degrees(y),
        }
    }
}

/// Minimal signed representation of an angle, in `(-180, 180]`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}
