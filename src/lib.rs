use crate::subsystems::swerve::drivetrain::Drivetrain;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub mod auto;
pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod subsystems;
pub mod telemetry;

/// One cycle of driver input, already scaled to m/s and rad/s.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriverCommand {
    pub forward: f64,
    pub sideways: f64,
    pub rotation: f64,
    pub field_relative: bool,
    /// Driver re-zero of the heading reference.
    pub zero_heading: bool,
}

#[derive(Clone)]
pub struct Robot {
    pub drivetrain: Rc<RefCell<Drivetrain>>,
    //other subsystems here
    pub dt: Duration,
}

impl Robot {
    pub fn new(drivetrain: Drivetrain) -> Self {
        Robot {
            drivetrain: Rc::new(RefCell::new(drivetrain)),
            dt: Duration::from_millis(0),
        }
    }

    pub fn stop(&self) {
        if let Ok(mut drivetrain) = self.drivetrain.try_borrow_mut() {
            drivetrain.stop();
        }
        // other subsystems here
    }
}

pub fn teleop(robot: &mut Robot, command: &DriverCommand) {
    // run drivetrain functions each frame
    if let Ok(mut drivetrain) = robot.drivetrain.try_borrow_mut() {
        if command.zero_heading {
            drivetrain.reset_heading();
        }
        drivetrain.drive(
            command.forward,
            command.sideways,
            command.rotation,
            command.field_relative,
        );
    }

    // other subsystem logic here
}
