//! Runtime configuration. Every field defaults to the value in [`crate::constants`],
//! so a config file only has to name what it changes.

use crate::constants::{auto, config, drivetrain, heading_lock, odometry, vision, zeroing};
use crate::error::DriveError;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uom::si::f64::Length;
use uom::si::length::{inch, meter};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    /// Module offsets from the chassis center in meters, ordered FL, FR, BL, BR.
    pub module_offsets_m: [[f64; 2]; 4],
    pub wheel_radius_m: f64,
    pub max_speed_mps: f64,

    pub optimize_modules: bool,
    pub optimization_threshold_deg: f64,
    pub cosine_compensation: bool,
    pub cosine_compensation_floor: f64,
    pub at_rest_threshold: f64,

    pub operator_perspective_deg: f64,

    pub heading_lock: HeadingLockConfig,
    pub skew_correction: SkewCorrectionConfig,
    pub zeroing: ZeroingConfig,
    pub localization: LocalizationConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingLockConfig {
    pub enabled: bool,
    pub translation_threshold_mps: f64,
    pub rotation_deadband_radps: f64,
    pub kp: f64,
    pub max_output_radps: f64,
    /// Below this the lock yields and the driver's rotation passes through.
    pub min_output_radps: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewCorrectionConfig {
    pub enabled: bool,
    pub coefficient: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroingConfig {
    pub tolerance_rad: f64,
    pub timeout_s: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    pub use_apriltags: bool,
    pub use_quest: bool,
    pub state_std_devs: [f64; 3],
    pub quest_std_devs: [f64; 3],
    pub pose_buffer_s: f64,
}

/// Gains for the autonomous path follower.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    pub translation_kp: f64,
    pub rotation_kp: f64,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        let half_width = Length::new::<inch>(config::WHEELBASE_WIDTH_INCHES / 2.0).get::<meter>();
        let half_length =
            Length::new::<inch>(config::WHEELBASE_LENGTH_INCHES / 2.0).get::<meter>();

        DrivetrainConfig {
            module_offsets_m: [
                [half_length, half_width],   // FL
                [half_length, -half_width],  // FR
                [-half_length, half_width],  // BL
                [-half_length, -half_width], // BR
            ],
            wheel_radius_m: Length::new::<inch>(drivetrain::SWERVE_WHEEL_DIAMETER_INCHES / 2.0)
                .get::<meter>(),
            max_speed_mps: drivetrain::MAX_SPEED_METERS_PER_SECOND,

            optimize_modules: true,
            optimization_threshold_deg: drivetrain::SWERVE_ROTATION_OPTIMIZATION_THRESHOLD_DEGREES,
            cosine_compensation: true,
            cosine_compensation_floor: drivetrain::COSINE_COMPENSATION_FLOOR,
            at_rest_threshold: drivetrain::AT_REST_THRESHOLD,

            operator_perspective_deg: config::OPERATOR_PERSPECTIVE_DEGREES,

            heading_lock: HeadingLockConfig::default(),
            skew_correction: SkewCorrectionConfig::default(),
            zeroing: ZeroingConfig::default(),
            localization: LocalizationConfig::default(),
        }
    }
}

impl Default for HeadingLockConfig {
    fn default() -> Self {
        HeadingLockConfig {
            enabled: true,
            translation_threshold_mps: heading_lock::TRANSLATION_THRESHOLD_METERS_PER_SECOND,
            rotation_deadband_radps: heading_lock::ROTATION_DEADBAND_RADIANS_PER_SECOND,
            kp: heading_lock::KP,
            max_output_radps: heading_lock::MAX_OUTPUT_RADIANS_PER_SECOND,
            min_output_radps: heading_lock::MIN_OUTPUT_RADIANS_PER_SECOND,
        }
    }
}

impl Default for SkewCorrectionConfig {
    fn default() -> Self {
        SkewCorrectionConfig {
            enabled: true,
            coefficient: drivetrain::SKEW_CORRECTION_COEFFICIENT,
        }
    }
}

impl Default for ZeroingConfig {
    fn default() -> Self {
        ZeroingConfig {
            tolerance_rad: zeroing::TOLERANCE_RADIANS,
            timeout_s: zeroing::TIMEOUT_SECONDS,
        }
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        LocalizationConfig {
            use_apriltags: true,
            use_quest: true,
            state_std_devs: odometry::STATE_STD_DEVS,
            quest_std_devs: vision::QUEST_STD_DEVS,
            pose_buffer_s: odometry::POSE_BUFFER_SECONDS,
        }
    }
}

impl Default for AutoConfig {
    fn default() -> Self {
        AutoConfig {
            translation_kp: auto::TRANSLATION_KP,
            rotation_kp: auto::ROTATION_KP,
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, DriveError> {
    let text = fs::read_to_string(path).map_err(|source| DriveError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&text).map_err(|source| DriveError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(message: impl Into<String>) -> DriveError {
    DriveError::InvalidConfig(message.into())
}

impl DrivetrainConfig {
    /// ## Loads and validates a drivetrain config from a JSON file.
    /// Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<DrivetrainConfig, DriveError> {
        let config: DrivetrainConfig = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges. Module geometry is checked by the kinematics when it is built.
    pub fn validate(&self) -> Result<(), DriveError> {
        if !(self.max_speed_mps > 0.0) {
            return Err(invalid("max_speed_mps must be positive"));
        }
        if !(self.wheel_radius_m > 0.0) {
            return Err(invalid("wheel_radius_m must be positive"));
        }
        if !(90.0..=180.0).contains(&self.optimization_threshold_deg) {
            return Err(invalid("optimization_threshold_deg must be within [90, 180]"));
        }
        if !(0.0..=1.0).contains(&self.cosine_compensation_floor) {
            return Err(invalid("cosine_compensation_floor must be within [0, 1]"));
        }
        if !(self.at_rest_threshold >= 0.0) {
            return Err(invalid("at_rest_threshold must not be negative"));
        }
        if !self.operator_perspective_deg.is_finite() {
            return Err(invalid("operator_perspective_deg must be finite"));
        }
        if self
            .module_offsets_m
            .iter()
            .flatten()
            .any(|value| !value.is_finite())
        {
            return Err(invalid("module_offsets_m must be finite"));
        }

        let lock = &self.heading_lock;
        if !(lock.max_output_radps >= 0.0) || !(lock.min_output_radps >= 0.0) {
            return Err(invalid("heading lock output limits must not be negative"));
        }
        if !(lock.translation_threshold_mps >= 0.0) || !(lock.rotation_deadband_radps >= 0.0) {
            return Err(invalid("heading lock thresholds must not be negative"));
        }
        if !lock.kp.is_finite() {
            return Err(invalid("heading lock kp must be finite"));
        }

        if !self.skew_correction.coefficient.is_finite() {
            return Err(invalid("skew correction coefficient must be finite"));
        }

        if !(self.zeroing.timeout_s > 0.0) {
            return Err(invalid("zeroing timeout must be positive"));
        }
        if !(self.zeroing.tolerance_rad > 0.0) {
            return Err(invalid("zeroing tolerance must be positive"));
        }

        let localization = &self.localization;
        if localization
            .state_std_devs
            .iter()
            .chain(localization.quest_std_devs.iter())
            .any(|std_dev| !(*std_dev > 0.0) || !std_dev.is_finite())
        {
            return Err(invalid("standard deviations must be positive and finite"));
        }
        if !(localization.pose_buffer_s > 0.0) {
            return Err(invalid("pose_buffer_s must be positive"));
        }

        Ok(())
    }

    /// Module offsets in meters, FL, FR, BL, BR.
    pub fn module_translations(&self) -> [Vector2<f64>; 4] {
        self.module_offsets_m.map(|[x, y]| Vector2::new(x, y))
    }
}

impl AutoConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<AutoConfig, DriveError> {
        let config: AutoConfig = read_json(path.as_ref())?;
        if !config.translation_kp.is_finite() || !config.rotation_kp.is_finite() {
            return Err(invalid("auto gains must be finite"));
        }
        Ok(config)
    }
}
