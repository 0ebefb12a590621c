pub mod config {
    /// Wheel-Wheel width of robot.
    pub const WHEELBASE_WIDTH_INCHES: f64 = 22.75;
    /// Wheel-Wheel length of robot.
    pub const WHEELBASE_LENGTH_INCHES: f64 = 22.75;

    /// Control loop period. Everything in the drivetrain runs once per period.
    pub const LOOP_PERIOD_MS: u64 = 20;
    /// If a loop takes longer than this the watchdog stops the drivetrain.
    pub const WATCHDOG_OVERRUN_MS: u64 = 150;

    /// Angle between the heading reference's zero and the driver's forward axis.
    /// The gyro is zeroed with the robot facing the side wall, so the driver's forward is a quarter turn off.
    pub const OPERATOR_PERSPECTIVE_DEGREES: f64 = 90.0;
}

pub mod drivetrain {
    pub const SWERVE_WHEEL_DIAMETER_INCHES: f64 = 4.0;

    /// Hardware speed ceiling, wheel speeds get desaturated to this.
    pub const MAX_SPEED_METERS_PER_SECOND: f64 = 3.5;

    /// A target more than this far from the current module angle gets flipped (negate speed, rotate 180).
    /// Must stay in [90, 180].
    pub const SWERVE_ROTATION_OPTIMIZATION_THRESHOLD_DEGREES: f64 = 90.0;
    /// Lower clamp on the cosine compensation scalar.
    pub const COSINE_COMPENSATION_FLOOR: f64 = 0.0;

    /// Below this commanded speed (m/s) and turn velocity (rad/s) a module counts as at rest
    /// and its relative turn encoder is re-seeded from the absolute encoder.
    pub const AT_REST_THRESHOLD: f64 = 0.01;

    /// Chassis commands with every component below this are treated as "no command".
    pub const ZERO_COMMAND_EPSILON: f64 = 1e-9;

    /// Skew correction: heading is advanced by yaw rate * this before re-deriving robot-relative speeds.
    pub const SKEW_CORRECTION_COEFFICIENT: f64 = 0.3;
}

pub mod heading_lock {
    /// Minimum translational speed (m/s) for heading lock to be evaluated at all.
    pub const TRANSLATION_THRESHOLD_METERS_PER_SECOND: f64 = 0.1;
    /// Driver rotation (rad/s) above this means the driver is actively turning.
    pub const ROTATION_DEADBAND_RADIANS_PER_SECOND: f64 = 0.01;
    pub const KP: f64 = 1.0;
    /// Heading lock output is clamped to +/- this (rad/s).
    pub const MAX_OUTPUT_RADIANS_PER_SECOND: f64 = 0.3;
    /// Corrections smaller than this (rad/s) are not worth fighting the driver over.
    pub const MIN_OUTPUT_RADIANS_PER_SECOND: f64 = 0.005;
}

pub mod zeroing {
    /// All modules within this of zero (radians) counts as zeroed.
    pub const TOLERANCE_RADIANS: f64 = 0.04;
    pub const TIMEOUT_SECONDS: f64 = 1.0;
}

pub mod vision {
    /// (exclusive upper distance in meters, standard deviation, re-seeds headset)
    /// Nearer tags are trusted more. Readings past the last tier are dropped.
    pub const APRILTAG_TRUST_TIERS: [(f64, f64, bool); 6] = [
        (0.6, 0.001, true),
        (0.75, 0.0025, true),
        (1.0, 0.005, true),
        (1.3, 0.0075, true),
        (1.5, 0.01, false),
        (2.0, 0.015, false),
    ];

    /// Headset pose trust (x meters, y meters, heading radians).
    pub const QUEST_STD_DEVS: [f64; 3] = [0.005, 0.005, 0.1];
}

pub mod odometry {
    /// Odometry trust (x meters, y meters, heading radians) used as the Kalman process noise.
    pub const STATE_STD_DEVS: [f64; 3] = [0.1, 0.1, 0.1];
    /// How far back (seconds) vision measurements can be applied.
    pub const POSE_BUFFER_SECONDS: f64 = 1.5;
}

pub mod auto {
    pub const TRANSLATION_KP: f64 = 1.9;
    pub const ROTATION_KP: f64 = 1.4;
}
