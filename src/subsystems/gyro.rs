use crate::geometry::wrap_angle;
use std::cell::RefCell;
use std::rc::Rc;
use uom::si::angle::{degree, radian};
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity};

/// ## Heading reference.
/// Yaw is CCW positive and wrapped to (-PI, PI].
/// Readings are last-known-good values, they never block.
pub trait Gyro {
    fn is_connected(&self) -> bool;
    fn heading(&self) -> Angle;
    fn yaw_rate(&self) -> AngularVelocity;
    fn reset_heading(&mut self, heading: Angle);
    fn set_heading_degrees(&mut self, degrees: f64);
}

#[derive(Debug)]
struct SimGyroState {
    connected: bool,
    heading: f64,
    yaw_rate: f64,
}

/// Simulated gyro. Clones share state, so a test or the sim loop can keep a handle
/// after giving one to the drivetrain.
#[derive(Clone, Debug)]
pub struct SimGyro {
    state: Rc<RefCell<SimGyroState>>,
}

impl Default for SimGyro {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGyro {
    pub fn new() -> SimGyro {
        SimGyro {
            state: Rc::new(RefCell::new(SimGyroState {
                connected: true,
                heading: 0.0,
                yaw_rate: 0.0,
            })),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.borrow_mut().connected = connected;
    }

    pub fn set_yaw_rate(&self, yaw_rate: AngularVelocity) {
        self.state.borrow_mut().yaw_rate = yaw_rate.get::<radian_per_second>();
    }

    /// Advances the heading by the current yaw rate.
    pub fn integrate(&self, dt_seconds: f64) {
        let mut state = self.state.borrow_mut();
        state.heading += state.yaw_rate * dt_seconds;
    }
}

impl Gyro for SimGyro {
    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn heading(&self) -> Angle {
        wrap_angle(Angle::new::<radian>(self.state.borrow().heading))
    }

    fn yaw_rate(&self) -> AngularVelocity {
        AngularVelocity::new::<radian_per_second>(self.state.borrow().yaw_rate)
    }

    fn reset_heading(&mut self, heading: Angle) {
        self.state.borrow_mut().heading = heading.get::<radian>();
    }

    fn set_heading_degrees(&mut self, degrees: f64) {
        self.reset_heading(Angle::new::<degree>(degrees));
    }
}

#[cfg(test)]
mod gyro_tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn heading_is_wrapped() {
        let mut gyro = SimGyro::new();
        gyro.set_heading_degrees(270.0);
        assert_approx_eq!(f64, gyro.heading().get::<radian>(), -PI / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn clones_share_state() {
        let gyro = SimGyro::new();
        let handle = gyro.clone();
        handle.set_yaw_rate(AngularVelocity::new::<radian_per_second>(1.0));
        handle.integrate(0.5);
        assert_approx_eq!(f64, gyro.heading().get::<radian>(), 0.5, epsilon = 1e-9);

        handle.set_connected(false);
        assert!(!gyro.is_connected());
    }
}
