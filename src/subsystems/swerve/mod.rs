pub mod drivetrain;
pub mod heading_lock;
pub mod io;
pub mod kinematics;
mod localization;
pub mod module;
pub mod odometry;
