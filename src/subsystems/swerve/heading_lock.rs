use crate::config::HeadingLockConfig;
use crate::geometry::wrap_angle;
use uom::si::angle::radian;
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity, Velocity};
use uom::si::velocity::meter_per_second;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HeadingLockState {
    Unlocked,
    Locked { heading: Angle },
}

/// ## Holds the robot's heading while the driver translates without rotating.
/// Evaluated once per cycle against the driver's rotation command.
/// Does nothing (and unlocks) when disabled, when barely translating, or when there is no heading to hold.
#[derive(Clone, Debug)]
pub struct HeadingLock {
    config: HeadingLockConfig,
    enabled: bool,
    state: HeadingLockState,
}

impl HeadingLock {
    pub fn new(config: HeadingLockConfig) -> HeadingLock {
        HeadingLock {
            enabled: config.enabled,
            config,
            state: HeadingLockState::Unlocked,
        }
    }

    pub fn state(&self) -> HeadingLockState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enabling or disabling always releases the current lock.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.state = HeadingLockState::Unlocked;
    }

    /// ## Returns the rotation to command this cycle.
    /// `translation` is the commanded translational speed, `heading` the current heading if one is available.
    /// The cycle that captures a lock passes `rotation` through unchanged.
    pub fn update(
        &mut self,
        rotation: AngularVelocity,
        translation: Velocity,
        heading: Option<Angle>,
    ) -> AngularVelocity {
        let translating =
            translation.get::<meter_per_second>().abs() > self.config.translation_threshold_mps;

        let heading = match heading {
            Some(heading) if self.enabled && translating => heading,
            _ => {
                self.reset();
                return rotation;
            }
        };

        if rotation.get::<radian_per_second>().abs() > self.config.rotation_deadband_radps {
            self.reset();
            return rotation;
        }

        match self.state {
            HeadingLockState::Unlocked => {
                self.state = HeadingLockState::Locked { heading };
                rotation
            }
            HeadingLockState::Locked { heading: locked } => {
                let error = wrap_angle(locked - heading).get::<radian>();
                let correction = self.config.kp * error;

                // too small to bother, the lock yields to the driver
                if correction.abs() < self.config.min_output_radps {
                    rotation
                } else {
                    AngularVelocity::new::<radian_per_second>(correction.clamp(
                        -self.config.max_output_radps,
                        self.config.max_output_radps,
                    ))
                }
            }
        }
    }
}
