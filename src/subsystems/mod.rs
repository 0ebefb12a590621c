pub mod gyro;
pub mod swerve;
pub mod vision;
