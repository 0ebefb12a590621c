use crate::config::AutoConfig;
use crate::geometry::{wrap_angle, ChassisSpeeds, Pose2d};
use uom::si::angle::radian;

/// ## One sample of a path: where to be and how fast to be going there.
/// `velocity` is field-relative and used as feed-forward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathSetpoint {
    pub pose: Pose2d,
    pub velocity: ChassisSpeeds,
}

/// A path as setpoints keyed by seconds since the path started, in time order.
#[derive(Clone, Debug, Default)]
pub struct TimedPath {
    setpoints: Vec<(f64, PathSetpoint)>,
}

impl TimedPath {
    pub fn new(mut setpoints: Vec<(f64, PathSetpoint)>) -> TimedPath {
        setpoints.sort_by(|a, b| a.0.total_cmp(&b.0));
        TimedPath { setpoints }
    }

    /// Seconds until the last setpoint.
    pub fn duration(&self) -> f64 {
        self.setpoints.last().map_or(0.0, |(time, _)| *time)
    }

    /// The latest setpoint at or before `elapsed`; the first one before the path starts.
    pub fn sample(&self, elapsed: f64) -> Option<&PathSetpoint> {
        self.setpoints
            .iter()
            .rev()
            .find(|(time, _)| *time <= elapsed)
            .or_else(|| self.setpoints.first())
            .map(|(_, setpoint)| setpoint)
    }
}

/// ## Proportional holonomic controller.
/// Feed-forward velocity plus P on translation and heading error, all in the field frame,
/// then converted to robot-relative speeds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HolonomicController {
    translation_kp: f64,
    rotation_kp: f64,
}

impl HolonomicController {
    pub fn new(config: &AutoConfig) -> HolonomicController {
        HolonomicController {
            translation_kp: config.translation_kp,
            rotation_kp: config.rotation_kp,
        }
    }

    pub fn calculate(&self, current: Pose2d, setpoint: &PathSetpoint) -> ChassisSpeeds {
        let translation_error = setpoint.pose.translation() - current.translation();
        let heading_error = wrap_angle(setpoint.pose.angle - current.angle).get::<radian>();
        let feed_forward = setpoint.velocity.as_vector();

        let field_relative = ChassisSpeeds::from_meters_per_second(
            feed_forward.x + self.translation_kp * translation_error.x,
            feed_forward.y + self.translation_kp * translation_error.y,
            feed_forward.z + self.rotation_kp * heading_error,
        );

        ChassisSpeeds::from_field_relative(field_relative, current.angle)
    }
}

#[cfg(test)]
mod follower_tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    fn setpoint(x: f64, y: f64, angle: f64, vx: f64) -> PathSetpoint {
        PathSetpoint {
            pose: Pose2d::from_meters(x, y, angle),
            velocity: ChassisSpeeds::from_meters_per_second(vx, 0.0, 0.0),
        }
    }

    #[test]
    fn on_target_is_pure_feed_forward() {
        let controller = HolonomicController::new(&AutoConfig::default());
        let speeds = controller
            .calculate(Pose2d::from_meters(1.0, 1.0, 0.0), &setpoint(1.0, 1.0, 0.0, 0.8))
            .as_vector();

        assert_approx_eq!(f64, speeds.x, 0.8, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn error_is_corrected_in_robot_frame() {
        let controller = HolonomicController::new(&AutoConfig::default());

        // robot faces +y and is 0.5 m short in x, so it has to strafe right
        let speeds = controller
            .calculate(Pose2d::from_meters(0.5, 0.0, FRAC_PI_2), &setpoint(1.0, 0.0, FRAC_PI_2, 0.0))
            .as_vector();

        assert_approx_eq!(f64, speeds.x, 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, -0.95, epsilon = 1e-9);
    }

    #[test]
    fn heading_error_takes_the_short_way() {
        let controller = HolonomicController::new(&AutoConfig::default());
        let speeds = controller
            .calculate(Pose2d::from_meters(0.0, 0.0, 3.0), &setpoint(0.0, 0.0, -3.0, 0.0))
            .as_vector();

        assert!(speeds.z > 0.0);
        assert_approx_eq!(f64, speeds.z, 1.4 * (2.0 * std::f64::consts::PI - 6.0), epsilon = 1e-9);
    }

    #[test]
    fn path_sampling() {
        let path = TimedPath::new(vec![
            (1.0, setpoint(1.0, 0.0, 0.0, 1.0)),
            (0.0, setpoint(0.0, 0.0, 0.0, 1.0)),
            (2.0, setpoint(2.0, 0.0, 0.0, 0.0)),
        ]);

        assert_approx_eq!(f64, path.duration(), 2.0);
        assert_eq!(path.sample(-1.0), Some(&setpoint(0.0, 0.0, 0.0, 1.0)));
        assert_eq!(path.sample(1.5), Some(&setpoint(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(path.sample(9.0), Some(&setpoint(2.0, 0.0, 0.0, 0.0)));
        assert_eq!(TimedPath::default().sample(0.0), None);
    }
}
