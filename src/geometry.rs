//! Planar geometry shared by the kinematics, the drivetrain, and the pose estimator.
//!
//! Angles are always compared through [`wrap_angle`], which maps into (-PI, PI].
//! Field coordinates: +x away from the blue driver station, +y to the left, CCW positive.

use crate::constants::drivetrain::ZERO_COMMAND_EPSILON;
use nalgebra::{Rotation2, Vector2, Vector3};
use std::f64::consts::PI;
use uom::si::angle::radian;
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity, Length, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

/// Wraps radians into (-PI, PI].
pub fn wrap_radians(radians: f64) -> f64 {
    let wrapped = radians.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

/// Wraps an angle into (-PI, PI].
pub fn wrap_angle(angle: Angle) -> Angle {
    Angle::new::<radian>(wrap_radians(angle.get::<radian>()))
}

/// ## Where the robot is on the field.
/// The angle is wrapped on construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose2d {
    pub x: Length,
    pub y: Length,
    pub angle: Angle,
}

/// A rigid transform expressed in the frame of the pose it is applied to.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// A constant-curvature motion expressed in the robot frame (meters, radians).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Twist2d {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Twist2d {
        Self { dx, dy, dtheta }
    }

    pub fn scale(&self, factor: f64) -> Twist2d {
        Twist2d::new(self.dx * factor, self.dy * factor, self.dtheta * factor)
    }
}

impl Pose2d {
    pub fn new(x: Length, y: Length, angle: Angle) -> Pose2d {
        Self {
            x,
            y,
            angle: wrap_angle(angle),
        }
    }

    pub fn from_meters(x: f64, y: f64, radians: f64) -> Pose2d {
        Pose2d::new(
            Length::new::<meter>(x),
            Length::new::<meter>(y),
            Angle::new::<radian>(radians),
        )
    }

    pub fn origin() -> Pose2d {
        Pose2d::from_meters(0.0, 0.0, 0.0)
    }

    /// Translation in meters.
    pub fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.x.get::<meter>(), self.y.get::<meter>())
    }

    pub fn radians(&self) -> f64 {
        self.angle.get::<radian>()
    }

    /// Applies a transform expressed in this pose's frame.
    pub fn plus(&self, transform: &Transform2d) -> Pose2d {
        let offset = Rotation2::new(self.radians()) * Vector2::new(transform.dx, transform.dy);
        let translation = self.translation() + offset;
        Pose2d::from_meters(
            translation.x,
            translation.y,
            self.radians() + transform.dtheta,
        )
    }

    /// The transform that takes `other` to `self`, expressed in `other`'s frame.
    pub fn minus(&self, other: &Pose2d) -> Transform2d {
        let delta = Rotation2::new(-other.radians()) * (self.translation() - other.translation());
        Transform2d {
            dx: delta.x,
            dy: delta.y,
            dtheta: wrap_radians(self.radians() - other.radians()),
        }
    }

    /// Follows a twist from this pose along a constant-curvature arc.
    pub fn exp(&self, twist: &Twist2d) -> Pose2d {
        let (sin_theta, cos_theta) = twist.dtheta.sin_cos();

        // series expansion near zero to avoid dividing by a tiny dtheta
        let (s, c) = if twist.dtheta.abs() < 1e-9 {
            (
                1.0 - twist.dtheta * twist.dtheta / 6.0,
                0.5 * twist.dtheta,
            )
        } else {
            (sin_theta / twist.dtheta, (1.0 - cos_theta) / twist.dtheta)
        };

        self.plus(&Transform2d {
            dx: twist.dx * s - twist.dy * c,
            dy: twist.dx * c + twist.dy * s,
            dtheta: twist.dtheta,
        })
    }

    /// The twist that takes this pose to `end`. Inverse of [`Pose2d::exp`].
    pub fn log(&self, end: &Pose2d) -> Twist2d {
        let transform = end.minus(self);
        let dtheta = transform.dtheta;
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = dtheta.cos() - 1.0;

        let half_theta_by_tan_of_half_dtheta = if cos_minus_one.abs() < 1e-9 {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * dtheta.sin()) / cos_minus_one
        };

        let a = half_theta_by_tan_of_half_dtheta;
        Twist2d::new(
            a * transform.dx + half_dtheta * transform.dy,
            -half_dtheta * transform.dx + a * transform.dy,
            dtheta,
        )
    }

    /// Interpolates along the twist between this pose and `end`. `t` is clamped to [0, 1].
    pub fn interpolate(&self, end: &Pose2d, t: f64) -> Pose2d {
        if t <= 0.0 {
            *self
        } else if t >= 1.0 {
            *end
        } else {
            self.exp(&self.log(end).scale(t))
        }
    }
}

/// ## Chassis velocity.
/// Robot-relative unless a function says otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChassisSpeeds {
    pub vx: Velocity,
    pub vy: Velocity,
    pub omega: AngularVelocity,
}

impl ChassisSpeeds {
    pub fn new(vx: Velocity, vy: Velocity, omega: AngularVelocity) -> ChassisSpeeds {
        Self { vx, vy, omega }
    }

    pub fn from_meters_per_second(vx: f64, vy: f64, omega: f64) -> ChassisSpeeds {
        ChassisSpeeds::new(
            Velocity::new::<meter_per_second>(vx),
            Velocity::new::<meter_per_second>(vy),
            AngularVelocity::new::<radian_per_second>(omega),
        )
    }

    pub fn zero() -> ChassisSpeeds {
        ChassisSpeeds::from_meters_per_second(0.0, 0.0, 0.0)
    }

    /// (vx m/s, vy m/s, omega rad/s)
    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(
            self.vx.get::<meter_per_second>(),
            self.vy.get::<meter_per_second>(),
            self.omega.get::<radian_per_second>(),
        )
    }

    /// Converts field-relative speeds into robot-relative speeds for a robot facing `heading`.
    pub fn from_field_relative(field_relative: ChassisSpeeds, heading: Angle) -> ChassisSpeeds {
        let v = field_relative.as_vector();
        let rotated = Rotation2::new(-heading.get::<radian>()) * Vector2::new(v.x, v.y);
        ChassisSpeeds::from_meters_per_second(rotated.x, rotated.y, v.z)
    }

    /// Converts these robot-relative speeds into field-relative speeds for a robot facing `heading`.
    pub fn to_field_relative(&self, heading: Angle) -> ChassisSpeeds {
        let v = self.as_vector();
        let rotated = Rotation2::new(heading.get::<radian>()) * Vector2::new(v.x, v.y);
        ChassisSpeeds::from_meters_per_second(rotated.x, rotated.y, v.z)
    }

    pub fn translation_speed(&self) -> Velocity {
        let v = self.as_vector();
        Velocity::new::<meter_per_second>(v.x.hypot(v.y))
    }

    /// True when there is nothing to do: no translation and no rotation.
    pub fn is_zero(&self) -> bool {
        self.as_vector().amax() < ZERO_COMMAND_EPSILON
    }
}
