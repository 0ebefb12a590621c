use crate::geometry::wrap_radians;
use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;
use uom::si::angle::radian;
use uom::si::f64::{Angle, Velocity};
use uom::si::velocity::meter_per_second;

const NOMINAL_VOLTAGE: f64 = 12.0;

/// ## One cycle of raw readings from a swerve module.
/// Three turn sensors that disagree:
/// - `turn_position_rad`: relative encoder on the turn motor. Continuous, drifts.
/// - `turn_absolute_position_rad`: absolute encoder, continuous and settable in software.
/// - `absolutely_absolute_position_rad`: the same magnet read raw. Wrapped, never settable; ground truth at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModuleSensorReading {
    pub drive_connected: bool,
    pub drive_position_rad: f64,
    pub drive_velocity_rad_per_sec: f64,
    pub drive_applied_volts: f64,
    pub drive_current_amps: f64,

    pub turn_connected: bool,
    pub turn_position_rad: f64,
    pub turn_velocity_rad_per_sec: f64,
    pub turn_absolute_position_rad: f64,
    pub absolutely_absolute_position_rad: f64,
    pub turn_applied_volts: f64,
    pub turn_current_amps: f64,
}

/// Hardware behind one swerve module. Setters are fire-and-forget.
pub trait ModuleIo {
    fn update_inputs(&mut self, reading: &mut ModuleSensorReading);

    /// Closed-loop wheel surface speed.
    fn set_drive_velocity(&mut self, velocity: Velocity);
    /// Closed-loop turn position, in the relative encoder's frame.
    fn set_turn_position(&mut self, angle: Angle);

    fn set_drive_voltage(&mut self, volts: f64);
    fn set_turn_voltage(&mut self, volts: f64);

    /// Duty cycle in [-1, 1].
    fn set_drive_open_loop(&mut self, output: f64);
    /// Duty cycle in [-1, 1].
    fn set_turn_open_loop(&mut self, output: f64);

    fn set_turn_encoder_position(&mut self, angle: Angle);
    fn set_absolute_encoder_position(&mut self, angle: Angle);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DriveCommand {
    Velocity(f64),
    Voltage(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TurnCommand {
    Position(f64),
    Voltage(f64),
}

#[derive(Debug)]
struct SimModuleState {
    wheel_radius_m: f64,
    max_speed_mps: f64,
    max_turn_rate: f64,
    step_on_update: Option<f64>,

    drive_position_rad: f64,
    drive_velocity_rad_per_sec: f64,
    drive_command: DriveCommand,

    /// Physical steering angle, unwrapped.
    turn_angle: f64,
    turn_velocity: f64,
    turn_command: TurnCommand,
    relative_offset: f64,
    absolute_offset: f64,

    connected: bool,
}

/// ## Simulated module hardware.
/// Drive follows its setpoint instantly, turn slews toward its setpoint at a fixed rate.
/// Clones share state so a test can keep a handle after the module takes ownership.
#[derive(Clone, Debug)]
pub struct SimModuleIo {
    state: Rc<RefCell<SimModuleState>>,
}

impl SimModuleIo {
    pub fn new(wheel_radius_m: f64, max_speed_mps: f64) -> SimModuleIo {
        SimModuleIo {
            state: Rc::new(RefCell::new(SimModuleState {
                wheel_radius_m,
                max_speed_mps,
                max_turn_rate: 4.0 * PI,
                step_on_update: None,

                drive_position_rad: 0.0,
                drive_velocity_rad_per_sec: 0.0,
                drive_command: DriveCommand::Voltage(0.0),

                turn_angle: 0.0,
                turn_velocity: 0.0,
                turn_command: TurnCommand::Voltage(0.0),
                relative_offset: 0.0,
                absolute_offset: 0.0,

                connected: true,
            })),
        }
    }

    /// Steps the physics by `dt_seconds` every time inputs are read.
    pub fn step_on_update(self, dt_seconds: f64) -> SimModuleIo {
        self.state.borrow_mut().step_on_update = Some(dt_seconds);
        self
    }

    /// Places the wheel at `radians` without moving through the angles in between.
    /// The relative and absolute encoders keep their offsets, like a wheel turned by hand while off.
    pub fn set_turn_angle(&self, radians: f64) {
        self.state.borrow_mut().turn_angle = radians;
    }

    pub fn turn_angle(&self) -> f64 {
        self.state.borrow().turn_angle
    }

    /// Makes the relative encoder read `radians` off from the wheel.
    pub fn drift_relative(&self, radians: f64) {
        self.state.borrow_mut().relative_offset += radians;
    }

    /// Makes the continuous absolute encoder read `radians` off from the wheel.
    pub fn skew_absolute(&self, radians: f64) {
        self.state.borrow_mut().absolute_offset += radians;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.borrow_mut().connected = connected;
    }

    pub fn drive_command(&self) -> DriveCommand {
        self.state.borrow().drive_command
    }

    pub fn turn_command(&self) -> TurnCommand {
        self.state.borrow().turn_command
    }

    /// Commanded wheel speed in m/s, if the drive is in velocity mode.
    pub fn commanded_velocity(&self) -> Option<f64> {
        match self.state.borrow().drive_command {
            DriveCommand::Velocity(velocity) => Some(velocity),
            DriveCommand::Voltage(_) => None,
        }
    }

    /// Commanded turn position in the relative frame, if the turn is in position mode.
    pub fn commanded_position(&self) -> Option<f64> {
        match self.state.borrow().turn_command {
            TurnCommand::Position(position) => Some(position),
            TurnCommand::Voltage(_) => None,
        }
    }

    pub fn step(&self, dt_seconds: f64) {
        self.state.borrow_mut().step(dt_seconds);
    }
}

impl SimModuleState {
    fn relative(&self) -> f64 {
        self.turn_angle + self.relative_offset
    }

    fn drive_volts(&self) -> f64 {
        match self.drive_command {
            DriveCommand::Velocity(velocity) => velocity / self.max_speed_mps * NOMINAL_VOLTAGE,
            DriveCommand::Voltage(volts) => volts,
        }
    }

    fn turn_volts(&self) -> f64 {
        match self.turn_command {
            TurnCommand::Position(_) => self.turn_velocity / self.max_turn_rate * NOMINAL_VOLTAGE,
            TurnCommand::Voltage(volts) => volts,
        }
    }

    fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }

        let surface_speed = match self.drive_command {
            DriveCommand::Velocity(velocity) => velocity,
            DriveCommand::Voltage(volts) => volts / NOMINAL_VOLTAGE * self.max_speed_mps,
        };
        self.drive_velocity_rad_per_sec = surface_speed / self.wheel_radius_m;
        self.drive_position_rad += self.drive_velocity_rad_per_sec * dt;

        let max_step = self.max_turn_rate * dt;
        let turn_step = match self.turn_command {
            // the controller closes the loop on its own encoder, taking the short way round
            TurnCommand::Position(target) => {
                wrap_radians(target - self.relative()).clamp(-max_step, max_step)
            }
            TurnCommand::Voltage(volts) => volts / NOMINAL_VOLTAGE * max_step,
        };
        self.turn_velocity = turn_step / dt;
        self.turn_angle += turn_step;
    }
}

impl ModuleIo for SimModuleIo {
    fn update_inputs(&mut self, reading: &mut ModuleSensorReading) {
        let mut state = self.state.borrow_mut();
        if let Some(dt) = state.step_on_update {
            state.step(dt);
        }

        reading.drive_connected = state.connected;
        reading.turn_connected = state.connected;
        if !state.connected {
            return;
        }

        let drive_volts = state.drive_volts();
        let turn_volts = state.turn_volts();

        reading.drive_position_rad = state.drive_position_rad;
        reading.drive_velocity_rad_per_sec = state.drive_velocity_rad_per_sec;
        reading.drive_applied_volts = drive_volts;
        reading.drive_current_amps = drive_volts.abs() * 3.0;

        reading.turn_position_rad = state.relative();
        reading.turn_velocity_rad_per_sec = state.turn_velocity;
        reading.turn_absolute_position_rad = state.turn_angle + state.absolute_offset;
        reading.absolutely_absolute_position_rad = wrap_radians(state.turn_angle);
        reading.turn_applied_volts = turn_volts;
        reading.turn_current_amps = turn_volts.abs() * 1.5;
    }

    fn set_drive_velocity(&mut self, velocity: Velocity) {
        self.state.borrow_mut().drive_command =
            DriveCommand::Velocity(velocity.get::<meter_per_second>());
    }

    fn set_turn_position(&mut self, angle: Angle) {
        self.state.borrow_mut().turn_command = TurnCommand::Position(angle.get::<radian>());
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        self.state.borrow_mut().drive_command =
            DriveCommand::Voltage(volts.clamp(-NOMINAL_VOLTAGE, NOMINAL_VOLTAGE));
    }

    fn set_turn_voltage(&mut self, volts: f64) {
        self.state.borrow_mut().turn_command =
            TurnCommand::Voltage(volts.clamp(-NOMINAL_VOLTAGE, NOMINAL_VOLTAGE));
    }

    fn set_drive_open_loop(&mut self, output: f64) {
        self.set_drive_voltage(output.clamp(-1.0, 1.0) * NOMINAL_VOLTAGE);
    }

    fn set_turn_open_loop(&mut self, output: f64) {
        self.set_turn_voltage(output.clamp(-1.0, 1.0) * NOMINAL_VOLTAGE);
    }

    fn set_turn_encoder_position(&mut self, angle: Angle) {
        let mut state = self.state.borrow_mut();
        state.relative_offset = angle.get::<radian>() - state.turn_angle;
    }

    fn set_absolute_encoder_position(&mut self, angle: Angle) {
        let mut state = self.state.borrow_mut();
        state.absolute_offset = angle.get::<radian>() - state.turn_angle;
    }
}
