//! Rigid solid obstacles described by signed-distance functions.
//!
//! Bodies are a closed set of shapes dispatched by a small match, so the hot
//! divergence and boundary kernels never go through an indirect call. Each
//! body carries its own rigid motion state; the driver advances it between
//! solver steps.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Sign with zero mapping to +1, so degenerate points still pick a face.
#[inline]
fn nsgn(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// The shape of a solid body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// Axis-aligned box in the body frame, extents given by the scale.
    Box,
    /// Sphere of diameter equal to the x scale; rotation has no effect on
    /// its distance field.
    Sphere,
}

/// A rigid solid obstacle with linear and angular motion.
///
/// Distances are negative inside the body. All queries take world-space
/// positions; the y axis points down the image, matching the grid layout.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SolidBody {
    shape: Shape,
    position: DVec2,
    scale: DVec2,
    rotation: f64,
    velocity: DVec2,
    angular_velocity: f64,
}

impl SolidBody {
    /// Create a box of the given full extents, rotated by `rotation`.
    pub fn new_box(
        position: DVec2,
        size: DVec2,
        rotation: f64,
        velocity: DVec2,
        angular_velocity: f64,
    ) -> Self {
        Self {
            shape: Shape::Box,
            position,
            scale: size,
            rotation,
            velocity,
            angular_velocity,
        }
    }

    /// Create a sphere of the given diameter.
    pub fn new_sphere(
        position: DVec2,
        diameter: f64,
        rotation: f64,
        velocity: DVec2,
        angular_velocity: f64,
    ) -> Self {
        Self {
            shape: Shape::Sphere,
            position,
            scale: DVec2::splat(diameter),
            rotation,
            velocity,
            angular_velocity,
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn position(&self) -> DVec2 {
        self.position
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Map a world point into the unit body frame (translated, rotated and
    /// scaled).
    fn to_local(&self, p: DVec2) -> DVec2 {
        DVec2::from_angle(self.rotation).rotate(p - self.position) / self.scale
    }

    /// Inverse of [`Self::to_local`].
    fn to_world(&self, p: DVec2) -> DVec2 {
        DVec2::from_angle(-self.rotation).rotate(p * self.scale) + self.position
    }

    /// Signed distance from `p` to the body surface; negative inside.
    pub fn distance(&self, p: DVec2) -> f64 {
        match self.shape {
            Shape::Box => {
                let local = DVec2::from_angle(self.rotation).rotate(p - self.position);
                let d = local.abs() - 0.5 * self.scale;
                if d.x >= 0.0 || d.y >= 0.0 {
                    d.max(DVec2::ZERO).length()
                } else {
                    d.x.max(d.y)
                }
            }
            Shape::Sphere => (p - self.position).length() - 0.5 * self.scale.x,
        }
    }

    /// Closest point on the body surface to `p`, in world space.
    pub fn closest_surface_point(&self, p: DVec2) -> DVec2 {
        match self.shape {
            Shape::Box => {
                let mut local = DVec2::from_angle(self.rotation).rotate(p - self.position);
                let d = local.abs() - 0.5 * self.scale;
                if d.x > d.y {
                    local.x = nsgn(local.x) * 0.5 * self.scale.x;
                } else {
                    local.y = nsgn(local.y) * 0.5 * self.scale.y;
                }
                DVec2::from_angle(-self.rotation).rotate(local) + self.position
            }
            Shape::Sphere => {
                let local = self.to_local(p);
                let r = local.length();
                // Degenerate center point maps to an arbitrary fixed spot on
                // the surface.
                let surface = if r < 1e-4 {
                    DVec2::new(0.5, 0.0)
                } else {
                    local / (2.0 * r)
                };
                self.to_world(surface)
            }
        }
    }

    /// Outward unit normal of the body at `p`.
    pub fn normal(&self, p: DVec2) -> DVec2 {
        match self.shape {
            Shape::Box => {
                let local = DVec2::from_angle(self.rotation).rotate(p - self.position);
                let n = if local.x.abs() - 0.5 * self.scale.x > local.y.abs() - 0.5 * self.scale.y {
                    DVec2::new(nsgn(local.x), 0.0)
                } else {
                    DVec2::new(0.0, nsgn(local.y))
                };
                DVec2::from_angle(-self.rotation).rotate(n)
            }
            Shape::Sphere => {
                let rel = p - self.position;
                let r = rel.length();
                if r < 1e-4 {
                    DVec2::new(1.0, 0.0)
                } else {
                    rel / r
                }
            }
        }
    }

    /// Rigid-body velocity of the body material at world point `p`.
    pub fn velocity_at(&self, p: DVec2) -> DVec2 {
        DVec2::new(
            (self.position.y - p.y) * self.angular_velocity + self.velocity.x,
            (p.x - self.position.x) * self.angular_velocity + self.velocity.y,
        )
    }

    /// Euler-advance position and rotation by one timestep.
    pub fn update(&mut self, dt: f64) {
        self.position += self.velocity * dt;
        self.rotation += self.angular_velocity * dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn still_box(position: DVec2, size: DVec2, rotation: f64) -> SolidBody {
        SolidBody::new_box(position, size, rotation, DVec2::ZERO, 0.0)
    }

    #[test]
    fn test_box_distance_axis_aligned() {
        let body = still_box(DVec2::ZERO, DVec2::new(2.0, 1.0), 0.0);

        // Outside along +x: surface at x = 1.
        assert!((body.distance(DVec2::new(2.0, 0.0)) - 1.0).abs() < 1e-12);
        // Inside at the center: distance to the closest face (y = ±0.5).
        assert!((body.distance(DVec2::ZERO) + 0.5).abs() < 1e-12);
        // Corner region: diagonal distance.
        let d = body.distance(DVec2::new(2.0, 1.5));
        assert!((d - 2.0f64.sqrt()).abs() < 1e-12, "got {}", d);
    }

    #[test]
    fn test_box_distance_rotated() {
        // A unit box rotated by 90 degrees has the same distance field.
        let straight = still_box(DVec2::ZERO, DVec2::splat(1.0), 0.0);
        let rotated = still_box(DVec2::ZERO, DVec2::splat(1.0), PI / 2.0);
        for p in [
            DVec2::new(1.0, 0.3),
            DVec2::new(-0.2, 0.1),
            DVec2::new(0.7, 0.9),
        ] {
            assert!((straight.distance(p) - rotated.distance(p)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_box_normal_points_outward() {
        let body = still_box(DVec2::ZERO, DVec2::new(2.0, 1.0), 0.0);
        assert_eq!(body.normal(DVec2::new(3.0, 0.1)), DVec2::new(1.0, 0.0));
        assert_eq!(body.normal(DVec2::new(-3.0, 0.1)), DVec2::new(-1.0, 0.0));
        assert_eq!(body.normal(DVec2::new(0.1, 4.0)), DVec2::new(0.0, 1.0));
    }

    #[test]
    fn test_box_closest_surface_point() {
        let body = still_box(DVec2::ZERO, DVec2::new(2.0, 1.0), 0.0);
        let s = body.closest_surface_point(DVec2::new(3.0, 0.2));
        assert!((s.x - 1.0).abs() < 1e-12);
        assert!((s.y - 0.2).abs() < 1e-12);
        assert!(body.distance(s).abs() < 1e-9);
    }

    #[test]
    fn test_sphere_distance_and_normal() {
        let body = SolidBody::new_sphere(DVec2::new(1.0, 1.0), 1.0, 0.0, DVec2::ZERO, 0.0);

        assert!((body.distance(DVec2::new(3.0, 1.0)) - 1.5).abs() < 1e-12);
        assert!((body.distance(DVec2::new(1.0, 1.0)) + 0.5).abs() < 1e-12);

        let n = body.normal(DVec2::new(3.0, 1.0));
        assert!((n - DVec2::new(1.0, 0.0)).length() < 1e-12);
        // Degenerate center falls back to a fixed direction.
        assert_eq!(body.normal(DVec2::new(1.0, 1.0)), DVec2::new(1.0, 0.0));
    }

    #[test]
    fn test_sphere_closest_surface_point() {
        let body = SolidBody::new_sphere(DVec2::ZERO, 2.0, 0.0, DVec2::ZERO, 0.0);
        let s = body.closest_surface_point(DVec2::new(0.2, 0.0));
        assert!((s.length() - 1.0).abs() < 1e-9, "got {:?}", s);
        assert!(body.distance(s).abs() < 1e-9);
    }

    #[test]
    fn test_rigid_velocity_field() {
        // Pure rotation about (1, 1): a point to the right moves down (+y),
        // a point above moves right.
        let body = SolidBody::new_sphere(DVec2::new(1.0, 1.0), 1.0, 0.0, DVec2::ZERO, 2.0);
        let v = body.velocity_at(DVec2::new(2.0, 1.0));
        assert!((v - DVec2::new(0.0, 2.0)).length() < 1e-12);
        let v = body.velocity_at(DVec2::new(1.0, 0.0));
        assert!((v - DVec2::new(2.0, 0.0)).length() < 1e-12);

        // Linear velocity adds on top.
        let body = SolidBody::new_sphere(DVec2::ZERO, 1.0, 0.0, DVec2::new(0.5, -0.25), 0.0);
        assert_eq!(body.velocity_at(DVec2::new(7.0, 3.0)), DVec2::new(0.5, -0.25));
    }

    #[test]
    fn test_update_advances_pose() {
        let mut body =
            SolidBody::new_box(DVec2::ZERO, DVec2::ONE, 0.0, DVec2::new(1.0, 2.0), 0.5);
        body.update(0.1);
        assert!((body.position() - DVec2::new(0.1, 0.2)).length() < 1e-12);
        assert!((body.rotation() - 0.05).abs() < 1e-12);
    }
}
