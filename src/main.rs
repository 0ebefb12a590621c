use log::{error, info, warn};
use std::cell::Cell;
use std::env;
use std::rc::Rc;
use swerve_drive::auto::follower::{PathSetpoint, TimedPath};
use swerve_drive::config::{AutoConfig, DrivetrainConfig};
use swerve_drive::constants::config::{LOOP_PERIOD_MS, WATCHDOG_OVERRUN_MS};
use swerve_drive::geometry::{ChassisSpeeds, Pose2d, Twist2d};
use swerve_drive::subsystems::gyro::SimGyro;
use swerve_drive::subsystems::swerve::drivetrain::{Drivetrain, DrivetrainHardware};
use swerve_drive::subsystems::swerve::io::{ModuleIo, SimModuleIo};
use swerve_drive::subsystems::vision::{SimAprilTagCamera, SimQuestHeadset};
use swerve_drive::telemetry::{LogTelemetry, Telemetry};
use swerve_drive::{teleop, DriverCommand, Robot};
use tokio::task::{self, spawn_local};
use tokio::time::{sleep, Duration, Instant};
use uom::si::angle::degree;
use uom::si::f64::Length;
use uom::si::length::meter;

/// How long the scripted run lasts.
const RUN_SECONDS: f64 = 5.0;
const AUTO_SECONDS: f64 = 1.0;
/// Where the only tag sits on the sim field (x, y meters).
const TAG_POSITION: (f64, f64) = (1.5, 0.5);
/// The camera loses the tag past this.
const TAG_RANGE_METERS: f64 = 2.0;
/// Headset drift, meters per second along x.
const QUEST_DRIFT: f64 = 0.01;

/// Simulated world the drivetrain drives around in.
struct SimWorld {
    modules: [SimModuleIo; 4],
    gyro: SimGyro,
    camera: SimAprilTagCamera,
    quest: SimQuestHeadset,
    truth: Pose2d,
}

impl SimWorld {
    fn new(config: &DrivetrainConfig) -> SimWorld {
        let dt = LOOP_PERIOD_MS as f64 / 1000.0;
        let modules = std::array::from_fn(|i| {
            let io = SimModuleIo::new(config.wheel_radius_m, config.max_speed_mps).step_on_update(dt);
            // wheels sit wherever they were left at power off
            io.set_turn_angle(0.4 * i as f64 - 0.6);
            io
        });

        SimWorld {
            modules,
            gyro: SimGyro::new(),
            camera: SimAprilTagCamera::new(),
            quest: SimQuestHeadset::new(),
            truth: Pose2d::origin(),
        }
    }

    fn hardware(&self) -> DrivetrainHardware {
        DrivetrainHardware {
            modules: self
                .modules
                .clone()
                .map(|io| Box::new(io) as Box<dyn ModuleIo>),
            gyro: Box::new(self.gyro.clone()),
            apriltag_camera: Box::new(self.camera.clone()),
            quest: Box::new(self.quest.clone()),
        }
    }

    /// Moves the true pose by what the wheels actually did, then updates every sensor.
    fn step(&mut self, measured: ChassisSpeeds, dt: f64, timestamp: f64) {
        let speeds = measured.as_vector();
        self.truth = self
            .truth
            .exp(&Twist2d::new(speeds.x * dt, speeds.y * dt, speeds.z * dt));

        self.gyro.set_yaw_rate(measured.omega);
        self.gyro.integrate(dt);

        let to_tag = nalgebra::Vector2::new(TAG_POSITION.0, TAG_POSITION.1) - self.truth.translation();
        let distance = to_tag.norm();
        if distance < TAG_RANGE_METERS {
            self.camera
                .see_tag(self.truth, Length::new::<meter>(distance), timestamp);
        } else {
            self.camera.lose_tag();
        }

        let drift = Length::new::<meter>(QUEST_DRIFT * timestamp);
        self.quest.track(
            Pose2d::new(self.truth.x + drift, self.truth.y, self.truth.angle),
            timestamp,
        );
    }
}

fn demo_path() -> TimedPath {
    TimedPath::new(
        (0..=50)
            .map(|i| {
                let t = i as f64 * 0.02;
                let setpoint = PathSetpoint {
                    pose: Pose2d::from_meters(0.5 * t, 0.0, 0.0),
                    velocity: ChassisSpeeds::from_meters_per_second(0.5, 0.0, 0.0),
                };
                (t, setpoint)
            })
            .collect(),
    )
}

/// Scripted driver for everything after auto.
fn driver(elapsed: f64) -> DriverCommand {
    if elapsed < 3.0 {
        DriverCommand {
            forward: 1.0,
            sideways: 0.5,
            field_relative: true,
            zero_heading: elapsed < AUTO_SECONDS + 0.01,
            ..Default::default()
        }
    } else if elapsed < 4.0 {
        DriverCommand {
            rotation: 1.0,
            field_relative: true,
            ..Default::default()
        }
    } else {
        DriverCommand::default()
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start runtime: {}", err);
            return;
        }
    };
    let local = task::LocalSet::new();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => DrivetrainConfig::load(&path).unwrap_or_else(|err| {
            warn!("{}, using default drivetrain config", err);
            DrivetrainConfig::default()
        }),
        None => DrivetrainConfig::default(),
    };
    let auto = match args.next() {
        Some(path) => match AutoConfig::load(&path) {
            Ok(auto) => Some(auto),
            Err(err) => {
                warn!("{}, path following disabled", err);
                None
            }
        },
        None => Some(AutoConfig::default()),
    };

    let mut world = SimWorld::new(&config);
    let drivetrain = match Drivetrain::new(config, world.hardware(), Pose2d::origin(), auto) {
        Ok(drivetrain) => drivetrain,
        Err(err) => {
            error!("failed to build drivetrain: {}", err);
            return;
        }
    };
    let mut robot = Robot::new(drivetrain);

    runtime.block_on(local.run_until(async move {
        let zeroing = {
            let mut drivetrain = robot.drivetrain.borrow_mut();
            drivetrain.rotate_to_absolute_zero().await
        };
        info!("startup zeroing: {:?}", zeroing);

        // Watchdog setup
        let last_loop = Rc::new(Cell::new(Instant::now()));
        let watchdog_last_loop = Rc::clone(&last_loop);
        let watchdog_robot = robot.clone();

        // Spawn watchdog task
        let watchdog = spawn_local(async move {
            loop {
                sleep(Duration::from_millis(LOOP_PERIOD_MS)).await;
                let since = watchdog_last_loop.get().elapsed();

                // if the loop has not checked in for too long, stop the motors
                if since > Duration::from_millis(WATCHDOG_OVERRUN_MS) {
                    warn!("loop overrun: {:?}, stopping drivetrain", since);
                    watchdog_robot.stop();
                }
            }
        });

        let path = demo_path();
        let telemetry = LogTelemetry;
        let period = Duration::from_millis(LOOP_PERIOD_MS);
        let start = Instant::now();
        let mut previous = start;
        let mut tick: u64 = 0;

        loop {
            let now = Instant::now();
            // the sim world runs on loop ticks so a slow host does not change the physics
            let elapsed = tick as f64 * period.as_secs_f64();
            if elapsed >= RUN_SECONDS {
                break;
            }
            robot.dt = now - previous;
            previous = now;

            let mut auto_running = false;
            if let Ok(mut drivetrain) = robot.drivetrain.try_borrow_mut() {
                drivetrain.periodic(elapsed);

                if elapsed < AUTO_SECONDS {
                    auto_running = true;
                    let following = path
                        .sample(elapsed)
                        .is_some_and(|setpoint| drivetrain.follow_setpoint(setpoint));
                    if !following {
                        drivetrain.stop();
                    }
                } else if elapsed < AUTO_SECONDS + 0.01 {
                    drivetrain.set_heading_lock_enabled(true);
                }
            }

            if !auto_running {
                teleop(&mut robot, &driver(elapsed));
            }

            if let Ok(drivetrain) = robot.drivetrain.try_borrow() {
                drivetrain.post_odo(&telemetry);
                world.step(
                    drivetrain.robot_relative_chassis_speeds(),
                    period.as_secs_f64(),
                    elapsed,
                );
            }

            // post our loop rate to telemetry
            if robot.dt > Duration::ZERO {
                telemetry.put_number("loop_rate", 1. / robot.dt.as_secs_f64());
            }

            last_loop.set(Instant::now());
            tick += 1;

            sleep(period.saturating_sub(now.elapsed())).await;
        }

        watchdog.abort();
        robot.stop();

        if let Ok(drivetrain) = robot.drivetrain.try_borrow() {
            let pose = drivetrain.pose();
            info!(
                "finished after {:.2}s: estimate ({:.3} m, {:.3} m, {:.1} deg), truth ({:.3} m, {:.3} m, {:.1} deg)",
                start.elapsed().as_secs_f64(),
                pose.x.get::<meter>(),
                pose.y.get::<meter>(),
                pose.angle.get::<degree>(),
                world.truth.x.get::<meter>(),
                world.truth.y.get::<meter>(),
                world.truth.angle.get::<degree>(),
            );
        }
    }));
}
