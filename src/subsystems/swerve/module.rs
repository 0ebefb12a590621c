use crate::config::DrivetrainConfig;
use crate::geometry::{wrap_angle, wrap_radians};
use crate::subsystems::swerve::io::{ModuleIo, ModuleSensorReading};
use crate::telemetry::Telemetry;
use log::{info, warn};
use std::f64::consts::PI;
use uom::si::angle::{degree, radian};
use uom::si::f64::{Angle, Length, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

/// Speed and direction of one wheel. The angle is wrapped to (-PI, PI].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModuleState {
    pub speed: Velocity,
    pub angle: Angle,
}

/// Distance one wheel has rolled and the direction it is pointing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModulePosition {
    pub distance: Length,
    pub angle: Angle,
}

impl ModuleState {
    pub fn new(speed: Velocity, angle: Angle) -> ModuleState {
        Self {
            speed,
            angle: wrap_angle(angle),
        }
    }

    pub fn from_meters_per_second(speed: f64, radians: f64) -> ModuleState {
        ModuleState::new(
            Velocity::new::<meter_per_second>(speed),
            Angle::new::<radian>(radians),
        )
    }
}

impl ModulePosition {
    pub fn new(distance: Length, angle: Angle) -> ModulePosition {
        Self {
            distance,
            angle: wrap_angle(angle),
        }
    }
}

/// ## Optimizes a module setpoint.
/// For example, instead of turning to 135 degrees from 0 degrees, turn to -45 degrees and invert speed.
/// A target more than `threshold` away from `current` is flipped, so the module never turns further than `threshold` in one go.
pub fn optimize(desired: ModuleState, current: Angle, threshold: Angle) -> ModuleState {
    let delta = wrap_angle(desired.angle - current);

    if delta.get::<radian>().abs() > threshold.get::<radian>() {
        ModuleState::new(-desired.speed, desired.angle + Angle::new::<radian>(PI))
    } else {
        desired
    }
}

/// Scales `speed` by the cosine of how far the wheel still has to turn, clamped below at `floor`.
/// A wheel pointing the wrong way does not drive.
pub fn cosine_compensate(speed: Velocity, error: Angle, floor: f64) -> Velocity {
    let scale = wrap_radians(error.get::<radian>()).cos().max(floor);
    speed * scale
}

/// Per-module tunables, pulled out of [`DrivetrainConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModuleSettings {
    pub wheel_radius: Length,
    pub optimize: bool,
    pub optimization_threshold: Angle,
    pub cosine_compensation: bool,
    pub cosine_floor: f64,
    pub at_rest_threshold: f64,
}

impl ModuleSettings {
    pub fn from_config(config: &DrivetrainConfig) -> ModuleSettings {
        ModuleSettings {
            wheel_radius: Length::new::<meter>(config.wheel_radius_m),
            optimize: config.optimize_modules,
            optimization_threshold: Angle::new::<degree>(config.optimization_threshold_deg),
            cosine_compensation: config.cosine_compensation,
            cosine_floor: config.cosine_compensation_floor,
            at_rest_threshold: config.at_rest_threshold,
        }
    }
}

impl Default for ModuleSettings {
    fn default() -> Self {
        ModuleSettings::from_config(&DrivetrainConfig::default())
    }
}

/// ## One swerve module.
/// Owns its hardware and the reading cached from it this cycle.
/// The continuous absolute encoder is what odometry trusts; the relative encoder is what the turn motor
/// closes its loop on, so it gets re-seeded from the absolute encoder whenever the module is at rest.
pub struct SwerveModule {
    name: String,
    io: Box<dyn ModuleIo>,
    reading: ModuleSensorReading,
    settings: ModuleSettings,
    target: ModuleState,
    connected: bool,
}

impl SwerveModule {
    /// Builds the module and seeds both settable turn encoders from the absolutely-absolute reading.
    pub fn new(name: impl Into<String>, io: Box<dyn ModuleIo>, settings: ModuleSettings) -> SwerveModule {
        let mut module = SwerveModule {
            name: name.into(),
            io,
            reading: ModuleSensorReading::default(),
            settings,
            target: ModuleState::from_meters_per_second(0.0, 0.0),
            connected: true,
        };

        module.periodic();
        module.seed_from_absolutely_absolute();
        module.target = ModuleState::new(Velocity::new::<meter_per_second>(0.0), module.turn_absolute_angle());
        module
    }

    fn seed_from_absolutely_absolute(&mut self) {
        if !self.reading.turn_connected {
            warn!("{}: turn sensors not connected, encoders left unseeded", self.name);
            return;
        }

        let ground_truth = Angle::new::<radian>(self.reading.absolutely_absolute_position_rad);
        self.io.set_absolute_encoder_position(ground_truth);
        self.io.set_turn_encoder_position(ground_truth);
        self.periodic();

        info!(
            "{}: seeded turn encoders to {:.4} rad",
            self.name,
            ground_truth.get::<radian>()
        );
    }

    /// Refreshes the cached reading. Call once per cycle before anything reads the module.
    pub fn periodic(&mut self) {
        self.io.update_inputs(&mut self.reading);

        let connected = self.reading.drive_connected && self.reading.turn_connected;
        if connected != self.connected {
            if connected {
                info!("{}: module reconnected", self.name);
            } else {
                warn!("{}: module disconnected, holding last readings", self.name);
            }
            self.connected = connected;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reading(&self) -> &ModuleSensorReading {
        &self.reading
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn turn_relative_angle(&self) -> Angle {
        wrap_angle(Angle::new::<radian>(self.reading.turn_position_rad))
    }

    pub fn turn_absolute_angle(&self) -> Angle {
        wrap_angle(Angle::new::<radian>(self.reading.turn_absolute_position_rad))
    }

    pub fn absolutely_absolute_angle(&self) -> Angle {
        wrap_angle(Angle::new::<radian>(self.reading.absolutely_absolute_position_rad))
    }

    pub fn drive_distance(&self) -> Length {
        self.settings.wheel_radius * self.reading.drive_position_rad
    }

    pub fn drive_velocity(&self) -> Velocity {
        Velocity::new::<meter_per_second>(
            self.reading.drive_velocity_rad_per_sec * self.settings.wheel_radius.get::<meter>(),
        )
    }

    pub fn drive_current(&self) -> f64 {
        self.reading.drive_current_amps
    }

    /// State keyed on the continuous absolute encoder. This is what odometry uses.
    pub fn absolute_module_state(&self) -> ModuleState {
        ModuleState::new(self.drive_velocity(), self.turn_absolute_angle())
    }

    pub fn absolute_module_position(&self) -> ModulePosition {
        ModulePosition::new(self.drive_distance(), self.turn_absolute_angle())
    }

    /// State keyed on the relative encoder. Debugging only.
    pub fn relative_module_state(&self) -> ModuleState {
        ModuleState::new(self.drive_velocity(), self.turn_relative_angle())
    }

    pub fn relative_module_position(&self) -> ModulePosition {
        ModulePosition::new(self.drive_distance(), self.turn_relative_angle())
    }

    pub fn absolutely_absolute_module_state(&self) -> ModuleState {
        ModuleState::new(self.drive_velocity(), self.absolutely_absolute_angle())
    }

    /// The last state sent to the hardware, after optimization and compensation.
    pub fn target_state(&self) -> ModuleState {
        self.target
    }

    /// ## Commands a wheel speed and direction.
    /// Angles are measured against the continuous absolute encoder.
    pub fn set_desired_state(&mut self, desired: ModuleState, optimize_state: bool) {
        let current = self.turn_absolute_angle();

        let mut state = ModuleState::new(desired.speed, desired.angle);
        if optimize_state && self.settings.optimize {
            state = optimize(state, current, self.settings.optimization_threshold);
        }
        if self.settings.cosine_compensation {
            state.speed = cosine_compensate(state.speed, state.angle - current, self.settings.cosine_floor);
        }

        let at_rest = state.speed.get::<meter_per_second>().abs() < self.settings.at_rest_threshold
            && self.reading.turn_velocity_rad_per_sec.abs() < self.settings.at_rest_threshold;
        if at_rest {
            self.reset_encoders_to_absolute_value();
        }

        self.io.set_drive_velocity(state.speed);
        self.io.set_turn_position(state.angle);
        self.target = state;
    }

    /// Forces the relative turn encoder to the absolute reading.
    pub fn reset_encoders_to_absolute_value(&mut self) {
        let absolute = self.reading.turn_absolute_position_rad;
        self.io.set_turn_encoder_position(Angle::new::<radian>(absolute));
        self.reading.turn_position_rad = absolute;
    }

    /// Points the wheel at zero without moving it.
    pub fn rotate_to_absolute_zero(&mut self) {
        self.set_desired_state(ModuleState::from_meters_per_second(0.0, 0.0), false);
    }

    pub fn set_voltages(&mut self, drive_volts: f64, turn_volts: f64) {
        self.io.set_drive_voltage(drive_volts);
        self.io.set_turn_voltage(turn_volts);
    }

    /// Open-loop drive, duty cycle in [-1, 1].
    pub fn direct_drive(&mut self, output: f64) {
        self.io.set_drive_open_loop(output);
    }

    /// Open-loop turn, duty cycle in [-1, 1].
    pub fn direct_turn(&mut self, output: f64) {
        self.io.set_turn_open_loop(output);
    }

    /// Zero volts on both motors.
    pub fn stop(&mut self) {
        self.io.set_drive_voltage(0.0);
        self.io.set_turn_voltage(0.0);
        self.target.speed = Velocity::new::<meter_per_second>(0.0);
    }

    pub fn publish(&self, telemetry: &dyn Telemetry) {
        let key = |channel: &str| format!("{}/{}", self.name, channel);

        telemetry.put_number(&key("target_speed"), self.target.speed.get::<meter_per_second>());
        telemetry.put_number(&key("target_angle"), self.target.angle.get::<radian>());
        telemetry.put_number(&key("relative_angle"), self.turn_relative_angle().get::<radian>());
        telemetry.put_number(&key("absolute_angle"), self.turn_absolute_angle().get::<radian>());
        telemetry.put_number(&key("drive_amps"), self.drive_current());
    }
}

#[cfg(test)]
mod module_tests {
    use super::*;
    use crate::subsystems::swerve::io::SimModuleIo;
    use crate::telemetry::recording::RecordingTelemetry;
    use float_cmp::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    fn sim_module() -> (SwerveModule, SimModuleIo) {
        let io = SimModuleIo::new(0.0508, 3.5);
        let module = SwerveModule::new("fl", Box::new(io.clone()), ModuleSettings::default());
        (module, io)
    }

    #[test]
    fn optimize_never_turns_past_threshold() {
        let threshold = Angle::new::<degree>(90.0);
        for desired_step in -36..=36 {
            for current_step in -36..=36 {
                let desired = ModuleState::from_meters_per_second(2.0, desired_step as f64 * 0.1);
                let current = Angle::new::<radian>(current_step as f64 * 0.1);

                let delta = wrap_angle(desired.angle - current).get::<radian>();
                let optimized = optimize(desired, current, threshold);
                let optimized_delta = wrap_angle(optimized.angle - current).get::<radian>();

                assert!(optimized_delta.abs() <= FRAC_PI_2 + 1e-12);
                let flipped = optimized.speed.get::<meter_per_second>() < 0.0;
                assert_eq!(flipped, delta.abs() > FRAC_PI_2);
            }
        }
    }

    #[test]
    fn optimize_135_to_minus_45() {
        let optimized = optimize(
            ModuleState::new(Velocity::new::<meter_per_second>(1.0), Angle::new::<degree>(135.0)),
            Angle::new::<degree>(0.0),
            Angle::new::<degree>(90.0),
        );
        println!("optimized: {:?}", optimized);
        assert_approx_eq!(f64, optimized.angle.get::<degree>(), -45.0, epsilon = 1e-9);
        assert_approx_eq!(f64, optimized.speed.get::<meter_per_second>(), -1.0);
    }

    #[test]
    fn cosine_compensation_keeps_sign_and_shrinks() {
        for speed in [-3.0, -0.4, 0.0, 0.7, 3.5] {
            for step in -63..=63 {
                let input = Velocity::new::<meter_per_second>(speed);
                let compensated = cosine_compensate(input, Angle::new::<radian>(step as f64 * 0.1), 0.0)
                    .get::<meter_per_second>();

                assert!(compensated.abs() <= speed.abs() + 1e-12);
                assert!(compensated * speed >= 0.0);
            }
        }
    }

    #[test]
    fn construction_seeds_from_absolutely_absolute() {
        let io = SimModuleIo::new(0.0508, 3.5);
        io.set_turn_angle(2.0);
        io.drift_relative(0.5);
        io.skew_absolute(-1.2);

        let module = SwerveModule::new("br", Box::new(io.clone()), ModuleSettings::default());
        assert_approx_eq!(f64, module.turn_absolute_angle().get::<radian>(), 2.0, epsilon = 1e-9);
        assert_approx_eq!(f64, module.turn_relative_angle().get::<radian>(), 2.0, epsilon = 1e-9);
        assert_approx_eq!(f64, module.target_state().angle.get::<radian>(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn desired_state_is_optimized_and_compensated() {
        let (mut module, io) = sim_module();
        module.set_desired_state(
            ModuleState::new(Velocity::new::<meter_per_second>(1.0), Angle::new::<degree>(170.0)),
            true,
        );

        let commanded_velocity = io.commanded_velocity().unwrap();
        let commanded_position = io.commanded_position().unwrap();
        println!("commanded: {} m/s at {} rad", commanded_velocity, commanded_position);
        assert_approx_eq!(f64, commanded_velocity, -(10.0_f64.to_radians().cos()), epsilon = 1e-9);
        assert_approx_eq!(f64, commanded_position, (-10.0_f64).to_radians(), epsilon = 1e-9);
    }

    #[test]
    fn unoptimized_state_is_not_flipped() {
        let (mut module, io) = sim_module();
        module.set_desired_state(ModuleState::from_meters_per_second(1.0, PI), false);

        // facing backwards: cosine compensation stops the wheel until it turns around
        assert_approx_eq!(f64, io.commanded_velocity().unwrap(), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, io.commanded_position().unwrap(), PI, epsilon = 1e-12);
    }

    #[test]
    fn resting_module_reseeds_relative_encoder() {
        let (mut module, io) = sim_module();
        io.drift_relative(0.2);
        module.periodic();
        assert_approx_eq!(f64, module.turn_relative_angle().get::<radian>(), 0.2, epsilon = 1e-9);

        module.set_desired_state(ModuleState::from_meters_per_second(0.0, 0.0), true);
        assert_approx_eq!(
            f64,
            module.turn_relative_angle().get::<radian>(),
            module.turn_absolute_angle().get::<radian>()
        );

        module.periodic();
        assert_approx_eq!(f64, module.turn_relative_angle().get::<radian>(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn moving_module_keeps_relative_encoder() {
        let (mut module, io) = sim_module();
        io.drift_relative(0.2);
        module.periodic();

        module.set_desired_state(ModuleState::from_meters_per_second(1.0, 0.0), true);
        module.periodic();
        assert_approx_eq!(f64, module.turn_relative_angle().get::<radian>(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn stop_commands_zero_volts() {
        let (mut module, io) = sim_module();
        module.set_desired_state(ModuleState::from_meters_per_second(1.0, 0.0), true);
        module.stop();

        assert_eq!(io.commanded_velocity(), None);
        assert_eq!(io.commanded_position(), None);
        assert_approx_eq!(f64, module.target_state().speed.get::<meter_per_second>(), 0.0);
    }

    #[test]
    fn publishes_under_its_own_name() {
        let (mut module, _io) = sim_module();
        module.set_desired_state(ModuleState::from_meters_per_second(1.5, 0.0), true);

        let telemetry = RecordingTelemetry::default();
        module.publish(&telemetry);
        assert_eq!(telemetry.get("fl/target_speed"), Some(1.5));
        assert_eq!(telemetry.get("fl/absolute_angle"), Some(0.0));
        assert!(telemetry.get("fr/target_speed").is_none());
    }
}
