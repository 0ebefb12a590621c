use crate::auto::follower::{HolonomicController, PathSetpoint};
use crate::config::{AutoConfig, DrivetrainConfig};
use crate::constants::config::LOOP_PERIOD_MS;
use crate::error::DriveError;
use crate::geometry::{ChassisSpeeds, Pose2d};
use crate::subsystems::gyro::Gyro;
use crate::subsystems::swerve::heading_lock::{HeadingLock, HeadingLockState};
use crate::subsystems::swerve::io::ModuleIo;
use crate::subsystems::swerve::kinematics::{desaturate, Kinematics};
use crate::subsystems::swerve::module::{ModulePosition, ModuleSettings, ModuleState, SwerveModule};
use crate::subsystems::swerve::odometry::PoseEstimator;
use crate::subsystems::vision::{AprilTagCamera, PoseTracker};
use crate::telemetry::Telemetry;
use log::{info, warn};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use uom::si::angle::{degree, radian};
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

/// Module names in kinematics order. Each module publishes telemetry under its name.
pub const MODULE_NAMES: [&str; 4] = ["fl", "fr", "bl", "br"];

/// Everything the drivetrain talks to. Modules are ordered FL, FR, BL, BR.
pub struct DrivetrainHardware {
    pub modules: [Box<dyn ModuleIo>; 4],
    pub gyro: Box<dyn Gyro>,
    pub apriltag_camera: Box<dyn AprilTagCamera>,
    pub quest: Box<dyn PoseTracker>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZeroingOutcome {
    Completed,
    TimedOut,
}

/// Drivetrain struct.
/// Owns the four modules, the heading reference, both vision sources, and the pose estimator.
/// offset is the operator perspective: the angle between the heading reference's zero and the driver's forward.
pub struct Drivetrain {
    pub(in crate::subsystems::swerve) config: DrivetrainConfig,
    pub(in crate::subsystems::swerve) kinematics: Kinematics,
    pub(in crate::subsystems::swerve) modules: [SwerveModule; 4],

    pub(in crate::subsystems::swerve) gyro: Box<dyn Gyro>,
    pub(in crate::subsystems::swerve) gyro_connected: bool,
    /// Field heading minus gyro heading, as of the last cycle the gyro was connected.
    pub(in crate::subsystems::swerve) gyro_to_field: Angle,

    pub(in crate::subsystems::swerve) estimator: PoseEstimator,
    pub(in crate::subsystems::swerve) apriltag_camera: Box<dyn AprilTagCamera>,
    pub(in crate::subsystems::swerve) camera_connected: bool,
    pub(in crate::subsystems::swerve) last_tag_timestamp: Option<f64>,
    pub(in crate::subsystems::swerve) quest: Box<dyn PoseTracker>,
    pub(in crate::subsystems::swerve) quest_connected: bool,
    pub(in crate::subsystems::swerve) last_quest_timestamp: Option<f64>,

    pub(in crate::subsystems::swerve) heading_lock: HeadingLock,
    pub offset: Angle,
    follower: Option<HolonomicController>,
    commanded: ChassisSpeeds,
}

impl Drivetrain {
    /// ## Returns a new Drivetrain.
    /// Seeds every module's turn encoders, then puts the robot at `starting_pose`.
    /// Without an `AutoConfig`, path following is disabled for the session.
    pub fn new(
        config: DrivetrainConfig,
        hardware: DrivetrainHardware,
        starting_pose: Pose2d,
        auto: Option<AutoConfig>,
    ) -> Result<Drivetrain, DriveError> {
        config.validate()?;
        let kinematics = Kinematics::from_config(&config)?;
        let settings = ModuleSettings::from_config(&config);

        let DrivetrainHardware {
            modules,
            gyro,
            apriltag_camera,
            quest,
        } = hardware;

        let mut names = MODULE_NAMES.iter();
        let modules = modules.map(|io| {
            let name = names.next().copied().unwrap_or("module");
            SwerveModule::new(name, io, settings)
        });

        let positions = modules.each_ref().map(|module| module.absolute_module_position());
        let gyro_connected = gyro.is_connected();
        let heading = gyro_connected.then(|| gyro.heading());

        let estimator = PoseEstimator::new(
            kinematics.clone(),
            heading,
            positions,
            starting_pose,
            config.localization.state_std_devs,
            config.localization.pose_buffer_s,
        );

        if auto.is_none() {
            warn!("no auto config, path following disabled");
        }

        let mut drivetrain = Drivetrain {
            heading_lock: HeadingLock::new(config.heading_lock.clone()),
            offset: Angle::new::<degree>(config.operator_perspective_deg),
            follower: auto.as_ref().map(HolonomicController::new),
            commanded: ChassisSpeeds::zero(),

            kinematics,
            modules,

            gyro,
            gyro_connected,
            gyro_to_field: Angle::new::<radian>(0.0),

            estimator,
            apriltag_camera,
            camera_connected: true,
            last_tag_timestamp: None,
            quest,
            quest_connected: true,
            last_quest_timestamp: None,

            config,
        };
        drivetrain.set_pose(starting_pose);

        Ok(drivetrain)
    }

    /// Refreshes every module's reading. [`Drivetrain::periodic`] does this; call it directly outside the loop.
    pub fn update_inputs(&mut self) {
        for module in self.modules.iter_mut() {
            module.periodic();
        }
    }

    /// ## Runs once per control cycle, before any commands.
    /// Reads sensors, then runs odometry and vision fusion. `timestamp` is seconds on the loop clock.
    pub fn periodic(&mut self, timestamp: f64) {
        self.update_inputs();

        let gyro_connected = self.gyro.is_connected();
        if gyro_connected != self.gyro_connected {
            if gyro_connected {
                info!("gyro reconnected");
            } else {
                warn!("gyro disconnected, using wheel odometry for rotation");
            }
            self.gyro_connected = gyro_connected;
        }

        self.update_odometry(timestamp);
        self.fuse_vision();
    }

    /// Stops the drivetrain.
    pub fn stop(&mut self) {
        for module in self.modules.iter_mut() {
            module.stop();
        }
        self.commanded = ChassisSpeeds::zero();
    }

    pub fn modules(&self) -> &[SwerveModule; 4] {
        &self.modules
    }

    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    pub fn heading_lock_state(&self) -> HeadingLockState {
        self.heading_lock.state()
    }

    /// Enabled at teleop start. Either way the current lock is released.
    pub fn set_heading_lock_enabled(&mut self, enabled: bool) {
        self.heading_lock.set_enabled(enabled);
    }

    pub fn follower_enabled(&self) -> bool {
        self.follower.is_some()
    }

    /// The last robot-relative chassis speeds sent to the kinematics.
    pub fn commanded_chassis_speeds(&self) -> ChassisSpeeds {
        self.commanded
    }

    /// Heading in the gyro's frame. Falls back to the estimate when the gyro is out.
    pub fn heading(&self) -> Angle {
        if self.gyro_connected {
            self.gyro.heading()
        } else {
            self.estimator.estimated_position().angle - self.gyro_to_field
        }
    }

    fn yaw_rate(&self) -> AngularVelocity {
        if self.gyro_connected {
            self.gyro.yaw_rate()
        } else {
            self.robot_relative_chassis_speeds().omega
        }
    }

    pub fn absolute_module_states(&self) -> [ModuleState; 4] {
        self.modules.each_ref().map(|module| module.absolute_module_state())
    }

    pub fn absolute_module_positions(&self) -> [ModulePosition; 4] {
        self.modules.each_ref().map(|module| module.absolute_module_position())
    }

    /// Measured robot-relative chassis speeds.
    pub fn robot_relative_chassis_speeds(&self) -> ChassisSpeeds {
        self.kinematics.to_chassis_speeds(&self.absolute_module_states())
    }

    /// ## Re-zeroes the heading reference so the robot's current facing is the driver's forward.
    /// The estimate does not move; odometry re-anchors to the new zero on the next cycle.
    pub fn reset_heading(&mut self) {
        self.gyro.reset_heading(Angle::new::<radian>(0.0));
        self.estimator.reanchor_heading();
        self.heading_lock.reset();
        info!("heading reset");
    }

    /// ## Drive with driver inputs.
    /// Speeds are m/s and rad/s. With `field_relative`, forward/sideways are in the driver's frame.
    /// Heading lock and skew correction only ever apply here, never to autonomous commands.
    pub fn drive(&mut self, forward: f64, sideways: f64, rotation: f64, field_relative: bool) {
        let translation = Velocity::new::<meter_per_second>(forward.hypot(sideways));
        let lock_heading = self.gyro_connected.then(|| self.gyro.heading());
        let rotation = self.heading_lock.update(
            AngularVelocity::new::<radian_per_second>(rotation),
            translation,
            lock_heading,
        );

        let requested = ChassisSpeeds::new(
            Velocity::new::<meter_per_second>(forward),
            Velocity::new::<meter_per_second>(sideways),
            rotation,
        );

        let heading = self.heading() + self.offset;
        let mut speeds = if field_relative {
            ChassisSpeeds::from_field_relative(requested, heading)
        } else {
            requested
        };

        if self.config.skew_correction.enabled {
            // re-derive against where the robot will be facing when the command lands
            let field = speeds.to_field_relative(heading);
            let lookahead = Angle::new::<radian>(
                self.yaw_rate().get::<radian_per_second>() * self.config.skew_correction.coefficient,
            );
            speeds = ChassisSpeeds::from_field_relative(field, heading + lookahead);
        }

        self.consume_chassis_speeds(speeds);
    }

    /// ## Robot-relative chassis speeds to the modules.
    /// Desaturated to the max speed. A zero command holds every module at its current angle.
    pub fn consume_chassis_speeds(&mut self, speeds: ChassisSpeeds) {
        self.commanded = speeds;

        if speeds.is_zero() {
            for module in self.modules.iter_mut() {
                let hold = ModuleState::new(Velocity::new::<meter_per_second>(0.0), module.turn_absolute_angle());
                module.set_desired_state(hold, false);
            }
            return;
        }

        let mut states = self.kinematics.to_module_states(speeds);
        desaturate(
            &mut states,
            Velocity::new::<meter_per_second>(self.config.max_speed_mps),
        );
        self.consume_raw_module_states(states);
    }

    /// Module states straight to the modules, optimized but not desaturated.
    pub fn consume_raw_module_states(&mut self, states: [ModuleState; 4]) {
        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_desired_state(state, true);
        }
    }

    /// ## Drives toward one path setpoint.
    /// Returns false and does nothing if path following is disabled.
    pub fn follow_setpoint(&mut self, setpoint: &PathSetpoint) -> bool {
        let speeds = match &self.follower {
            Some(follower) => follower.calculate(self.pose(), setpoint),
            None => return false,
        };
        self.consume_chassis_speeds(speeds);
        true
    }

    /// Open-loop drive on every module, duty cycle in [-1, 1].
    pub fn direct_drive_speed(&mut self, output: f64) {
        for module in self.modules.iter_mut() {
            module.direct_drive(output);
        }
    }

    /// Open-loop turn on every module, duty cycle in [-1, 1].
    pub fn direct_turn_speed(&mut self, output: f64) {
        for module in self.modules.iter_mut() {
            module.direct_turn(output);
        }
    }

    pub fn direct_drive_voltage(&mut self, drive_volts: f64, turn_volts: f64) {
        for module in self.modules.iter_mut() {
            module.set_voltages(drive_volts, turn_volts);
        }
    }

    /// ## Points every wheel at absolute zero.
    /// Polls until every module is within tolerance or the timeout runs out. Either way, every relative
    /// encoder is re-seeded from its absolute encoder before returning.
    pub async fn rotate_to_absolute_zero(&mut self) -> ZeroingOutcome {
        let start = Instant::now();
        let timeout = Duration::from_secs_f64(self.config.zeroing.timeout_s);
        let tolerance = self.config.zeroing.tolerance_rad;

        let outcome = loop {
            self.update_inputs();
            for module in self.modules.iter_mut() {
                module.rotate_to_absolute_zero();
            }

            let zeroed = self
                .modules
                .iter()
                .all(|module| module.turn_absolute_angle().get::<radian>().abs() <= tolerance);
            if zeroed {
                break ZeroingOutcome::Completed;
            }

            if start.elapsed() >= timeout {
                let worst = self
                    .modules
                    .iter()
                    .map(|module| module.turn_absolute_angle().get::<radian>().abs())
                    .fold(0.0, f64::max);
                warn!(
                    "zeroing timed out after {:?}, worst module {:.3} rad from zero",
                    start.elapsed(),
                    worst
                );
                break ZeroingOutcome::TimedOut;
            }

            sleep(Duration::from_millis(LOOP_PERIOD_MS)).await;
        };

        for module in self.modules.iter_mut() {
            module.reset_encoders_to_absolute_value();
        }
        info!("zeroing finished: {:?}", outcome);

        outcome
    }

    pub fn post_odo(&self, telemetry: &dyn Telemetry) {
        let pose = self.pose();
        telemetry.put_number("odo_x", pose.x.get::<meter>());
        telemetry.put_number("odo_y", pose.y.get::<meter>());
        telemetry.put_number("odo_heading", pose.angle.get::<radian>());

        for module in self.modules.iter() {
            module.publish(telemetry);
        }
    }
}

#[cfg(test)]
pub(crate) mod drivetrain_tests {
    use super::*;
    use crate::subsystems::gyro::SimGyro;
    use crate::subsystems::swerve::io::SimModuleIo;
    use crate::subsystems::vision::{SimAprilTagCamera, SimQuestHeadset};
    use crate::telemetry::recording::RecordingTelemetry;
    use float_cmp::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    /// Handles to the simulated hardware behind a test drivetrain.
    pub(crate) struct SimHandles {
        pub(crate) modules: [SimModuleIo; 4],
        pub(crate) gyro: SimGyro,
        pub(crate) camera: SimAprilTagCamera,
        pub(crate) quest: SimQuestHeadset,
    }

    pub(crate) fn sim_drivetrain_with(
        config: DrivetrainConfig,
        turn_angles: [f64; 4],
        step: Option<f64>,
    ) -> (Drivetrain, SimHandles) {
        let modules: [SimModuleIo; 4] = std::array::from_fn(|i| {
            let io = SimModuleIo::new(config.wheel_radius_m, config.max_speed_mps);
            io.set_turn_angle(turn_angles[i]);
            match step {
                Some(dt) => io.step_on_update(dt),
                None => io,
            }
        });
        let handles = SimHandles {
            modules: modules.clone(),
            gyro: SimGyro::new(),
            camera: SimAprilTagCamera::new(),
            quest: SimQuestHeadset::new(),
        };

        let hardware = DrivetrainHardware {
            modules: modules.map(|io| Box::new(io) as Box<dyn ModuleIo>),
            gyro: Box::new(handles.gyro.clone()),
            apriltag_camera: Box::new(handles.camera.clone()),
            quest: Box::new(handles.quest.clone()),
        };

        let drivetrain = Drivetrain::new(config, hardware, Pose2d::origin(), Some(AutoConfig::default())).unwrap();
        (drivetrain, handles)
    }

    pub(crate) fn sim_drivetrain() -> (Drivetrain, SimHandles) {
        sim_drivetrain_with(DrivetrainConfig::default(), [0.0; 4], None)
    }

    #[test]
    fn forward_from_rest_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        drivetrain.periodic(0.0);
        drivetrain.drive(0.0, 1.0, 0.0, true);

        let speeds = drivetrain.commanded_chassis_speeds().as_vector();
        println!("commanded: {:?}", speeds);
        assert_approx_eq!(f64, speeds.x, 1.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.z, 0.0, epsilon = 1e-9);

        for (module, io) in drivetrain.modules().iter().zip(handles.modules.iter()) {
            assert_approx_eq!(f64, module.target_state().angle.get::<radian>(), 0.0, epsilon = 1e-9);
            assert_approx_eq!(f64, io.commanded_velocity().unwrap(), 1.0, epsilon = 1e-9);
            assert_approx_eq!(f64, io.commanded_position().unwrap(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn robot_relative_ignores_heading_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        handles.gyro.clone().set_heading_degrees(45.0);
        drivetrain.periodic(0.0);
        drivetrain.drive(0.0, 1.0, 0.0, false);

        let speeds = drivetrain.commanded_chassis_speeds().as_vector();
        assert_approx_eq!(f64, speeds.x, 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_command_holds_module_angles_test() {
        let (mut drivetrain, handles) =
            sim_drivetrain_with(DrivetrainConfig::default(), [0.3, -0.7, 1.2, 2.5], None);
        drivetrain.periodic(0.0);
        drivetrain.drive(0.0, 0.0, 0.0, true);

        for (io, angle) in handles.modules.iter().zip([0.3, -0.7, 1.2, 2.5]) {
            assert_approx_eq!(f64, io.commanded_velocity().unwrap(), 0.0);
            assert_approx_eq!(f64, io.commanded_position().unwrap(), angle, epsilon = 1e-9);
        }
    }

    #[test]
    fn fast_command_is_desaturated_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        drivetrain.periodic(0.0);
        drivetrain.consume_chassis_speeds(ChassisSpeeds::from_meters_per_second(5.0, 0.0, 0.0));

        for io in handles.modules.iter() {
            assert_approx_eq!(f64, io.commanded_velocity().unwrap(), 3.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn raw_states_are_not_desaturated_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        drivetrain.periodic(0.0);
        drivetrain.consume_raw_module_states([ModuleState::from_meters_per_second(5.0, 0.0); 4]);

        for io in handles.modules.iter() {
            assert_approx_eq!(f64, io.commanded_velocity().unwrap(), 5.0);
        }
    }

    #[test]
    fn heading_lock_engages_while_translating_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        drivetrain.periodic(0.0);
        drivetrain.drive(1.0, 0.0, 0.0, true);
        assert_eq!(
            drivetrain.heading_lock_state(),
            HeadingLockState::Locked {
                heading: Angle::new::<radian>(0.0)
            }
        );

        // robot got knocked 0.1 rad CCW, the lock pulls it back
        handles.gyro.clone().reset_heading(Angle::new::<radian>(0.1));
        drivetrain.periodic(0.02);
        drivetrain.drive(1.0, 0.0, 0.0, true);
        assert_approx_eq!(
            f64,
            drivetrain.commanded_chassis_speeds().omega.get::<radian_per_second>(),
            -0.1,
            epsilon = 1e-9
        );

        drivetrain.drive(1.0, 0.0, 0.5, true);
        assert_eq!(drivetrain.heading_lock_state(), HeadingLockState::Unlocked);
    }

    #[test]
    fn heading_lock_skipped_without_gyro_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        handles.gyro.set_connected(false);
        drivetrain.periodic(0.0);
        drivetrain.drive(1.0, 0.0, 0.0, true);
        assert_eq!(drivetrain.heading_lock_state(), HeadingLockState::Unlocked);

        // field-relative still works off the estimate
        let speeds = drivetrain.commanded_chassis_speeds().as_vector();
        assert_approx_eq!(f64, speeds.x, 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn skew_correction_leads_rotation_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        handles
            .gyro
            .set_yaw_rate(AngularVelocity::new::<radian_per_second>(1.0));
        drivetrain.periodic(0.0);
        drivetrain.drive(0.0, 1.0, 1.0, true);

        // 1 rad/s * 0.3 s of lookahead
        let speeds = drivetrain.commanded_chassis_speeds().as_vector();
        assert_approx_eq!(f64, speeds.x, 0.3_f64.cos(), epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, -(0.3_f64.sin()), epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn skew_correction_robot_relative_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        handles
            .gyro
            .set_yaw_rate(AngularVelocity::new::<radian_per_second>(1.0));
        drivetrain.periodic(0.0);
        drivetrain.drive(0.0, 1.0, 1.0, false);

        // robot-relative commands lead the rotation too
        let speeds = drivetrain.commanded_chassis_speeds().as_vector();
        println!("commanded: {:?}", speeds);
        assert_approx_eq!(f64, speeds.x, 0.3_f64.sin(), epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, 0.3_f64.cos(), epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn skew_correction_disabled_test() {
        let mut config = DrivetrainConfig::default();
        config.skew_correction.enabled = false;
        let (mut drivetrain, handles) = sim_drivetrain_with(config, [0.0; 4], None);
        handles
            .gyro
            .set_yaw_rate(AngularVelocity::new::<radian_per_second>(1.0));
        drivetrain.periodic(0.0);
        drivetrain.drive(0.0, 1.0, 1.0, false);

        let speeds = drivetrain.commanded_chassis_speeds().as_vector();
        assert_approx_eq!(f64, speeds.x, 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn skew_correction_not_used_by_follower_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        handles
            .gyro
            .set_yaw_rate(AngularVelocity::new::<radian_per_second>(1.0));
        drivetrain.periodic(0.0);

        let setpoint = PathSetpoint {
            pose: Pose2d::origin(),
            velocity: ChassisSpeeds::from_meters_per_second(1.0, 0.0, 0.0),
        };
        assert!(drivetrain.follow_setpoint(&setpoint));
        let speeds = drivetrain.commanded_chassis_speeds().as_vector();
        assert_approx_eq!(f64, speeds.x, 1.0, epsilon = 1e-9);
        assert_approx_eq!(f64, speeds.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn follower_disabled_without_auto_config_test() {
        let hardware = DrivetrainHardware {
            modules: std::array::from_fn(|_| Box::new(SimModuleIo::new(0.0508, 3.5)) as Box<dyn ModuleIo>),
            gyro: Box::new(SimGyro::new()),
            apriltag_camera: Box::new(SimAprilTagCamera::new()),
            quest: Box::new(SimQuestHeadset::new()),
        };
        let mut drivetrain =
            Drivetrain::new(DrivetrainConfig::default(), hardware, Pose2d::origin(), None).unwrap();

        assert!(!drivetrain.follower_enabled());
        let setpoint = PathSetpoint {
            pose: Pose2d::from_meters(1.0, 0.0, 0.0),
            velocity: ChassisSpeeds::zero(),
        };
        assert!(!drivetrain.follow_setpoint(&setpoint));
    }

    #[test]
    fn degenerate_geometry_is_rejected_test() {
        let mut config = DrivetrainConfig::default();
        config.module_offsets_m = [[0.0, 0.0]; 4];
        let hardware = DrivetrainHardware {
            modules: std::array::from_fn(|_| Box::new(SimModuleIo::new(0.0508, 3.5)) as Box<dyn ModuleIo>),
            gyro: Box::new(SimGyro::new()),
            apriltag_camera: Box::new(SimAprilTagCamera::new()),
            quest: Box::new(SimQuestHeadset::new()),
        };

        let result = Drivetrain::new(config, hardware, Pose2d::origin(), None);
        assert!(matches!(result, Err(DriveError::DegenerateGeometry(_))));
    }

    #[test]
    fn measured_speeds_follow_modules_test() {
        let (mut drivetrain, _handles) =
            sim_drivetrain_with(DrivetrainConfig::default(), [0.0; 4], Some(0.02));
        drivetrain.periodic(0.0);
        drivetrain.consume_chassis_speeds(ChassisSpeeds::from_meters_per_second(0.0, 0.0, 1.0));

        // turn the wheels into place, then let the drive catch up
        for i in 1..30 {
            drivetrain.periodic(i as f64 * 0.02);
            drivetrain.consume_chassis_speeds(ChassisSpeeds::from_meters_per_second(0.0, 0.0, 1.0));
        }
        drivetrain.periodic(0.6);

        let measured = drivetrain.robot_relative_chassis_speeds().as_vector();
        println!("measured: {:?}", measured);
        assert_approx_eq!(f64, measured.x, 0.0, epsilon = 1e-6);
        assert_approx_eq!(f64, measured.y, 0.0, epsilon = 1e-6);
        assert_approx_eq!(f64, measured.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn stop_and_debug_commands_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        drivetrain.direct_drive_speed(0.5);
        drivetrain.direct_turn_speed(-0.25);
        for io in handles.modules.iter() {
            assert_eq!(io.drive_command(), crate::subsystems::swerve::io::DriveCommand::Voltage(6.0));
            assert_eq!(io.turn_command(), crate::subsystems::swerve::io::TurnCommand::Voltage(-3.0));
        }

        drivetrain.direct_drive_voltage(2.0, 1.0);
        assert_eq!(
            handles.modules[0].drive_command(),
            crate::subsystems::swerve::io::DriveCommand::Voltage(2.0)
        );

        drivetrain.stop();
        for io in handles.modules.iter() {
            assert_eq!(io.drive_command(), crate::subsystems::swerve::io::DriveCommand::Voltage(0.0));
            assert_eq!(io.turn_command(), crate::subsystems::swerve::io::TurnCommand::Voltage(0.0));
        }
    }

    #[test]
    fn reset_heading_keeps_estimate_test() {
        let (mut drivetrain, handles) = sim_drivetrain();
        handles.gyro.clone().reset_heading(Angle::new::<radian>(FRAC_PI_2));
        drivetrain.periodic(0.0);
        drivetrain.drive(1.0, 0.0, 0.0, true);
        assert!(matches!(drivetrain.heading_lock_state(), HeadingLockState::Locked { .. }));

        let before = drivetrain.pose();
        drivetrain.reset_heading();
        assert_eq!(drivetrain.heading_lock_state(), HeadingLockState::Unlocked);
        assert_approx_eq!(f64, drivetrain.heading().get::<radian>(), 0.0);

        drivetrain.periodic(0.02);
        assert_approx_eq!(f64, drivetrain.pose().radians(), before.radians(), epsilon = 1e-9);
    }

    #[test]
    fn publishes_odometry_and_modules_test() {
        let (mut drivetrain, _handles) = sim_drivetrain();
        drivetrain.periodic(0.0);

        let telemetry = RecordingTelemetry::default();
        drivetrain.post_odo(&telemetry);
        assert_approx_eq!(f64, telemetry.get("odo_x").unwrap(), 0.0, epsilon = 1e-9);
        assert_approx_eq!(f64, telemetry.get("odo_heading").unwrap(), 0.0, epsilon = 1e-9);
        for name in MODULE_NAMES {
            assert!(telemetry.get(&format!("{}/drive_amps", name)).is_some());
        }
    }

    #[tokio::test]
    async fn zeroing_completes_when_already_zeroed_test() {
        let (mut drivetrain, handles) =
            sim_drivetrain_with(DrivetrainConfig::default(), [0.02, -0.015, 0.01, -0.02], None);

        let start = Instant::now();
        let outcome = drivetrain.rotate_to_absolute_zero().await;
        assert_eq!(outcome, ZeroingOutcome::Completed);
        assert!(start.elapsed() < Duration::from_secs(1));

        for (module, io) in drivetrain.modules().iter().zip(handles.modules.iter()) {
            assert_approx_eq!(
                f64,
                module.turn_relative_angle().get::<radian>(),
                module.turn_absolute_angle().get::<radian>()
            );
            assert_eq!(io.commanded_position(), Some(0.0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zeroing_converges_test() {
        let (mut drivetrain, _handles) =
            sim_drivetrain_with(DrivetrainConfig::default(), [1.0, -2.0, 0.5, 3.0], Some(0.02));

        let outcome = drivetrain.rotate_to_absolute_zero().await;
        assert_eq!(outcome, ZeroingOutcome::Completed);
        for module in drivetrain.modules() {
            assert!(module.turn_absolute_angle().get::<radian>().abs() <= 0.04);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zeroing_times_out_and_still_reseeds_test() {
        // the turn motors never move
        let (mut drivetrain, handles) =
            sim_drivetrain_with(DrivetrainConfig::default(), [1.0, -2.0, 0.5, 3.0], None);
        for io in handles.modules.iter() {
            io.drift_relative(0.4);
        }

        let start = Instant::now();
        let outcome = drivetrain.rotate_to_absolute_zero().await;
        assert_eq!(outcome, ZeroingOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));

        drivetrain.update_inputs();
        for module in drivetrain.modules() {
            assert_approx_eq!(
                f64,
                module.turn_relative_angle().get::<radian>(),
                module.turn_absolute_angle().get::<radian>(),
                epsilon = 1e-9
            );
        }
    }
}
