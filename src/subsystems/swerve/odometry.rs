use crate::geometry::{wrap_angle, Pose2d, Twist2d};
use crate::subsystems::swerve::kinematics::Kinematics;
use crate::subsystems::swerve::module::ModulePosition;
use log::debug;
use nalgebra::Vector3;
use std::collections::VecDeque;
use uom::si::angle::radian;
use uom::si::f64::Angle;

/// ## Robot odometry.
/// Integrates wheel displacements into a field pose.
/// Rotation comes from the heading reference when there is one, so wheel slip only corrupts translation.
/// Without it, the wheel-derived rotation is integrated instead; when the heading reference comes back its offset
/// is re-anchored to the current pose so the estimate does not jump.
#[derive(Clone, Debug)]
pub struct SwerveOdometry {
    pose: Pose2d,
    gyro_offset: Option<Angle>,
    previous_angle: Angle,
    previous_positions: [ModulePosition; 4],
}

impl SwerveOdometry {
    pub fn new(heading: Option<Angle>, positions: [ModulePosition; 4], pose: Pose2d) -> SwerveOdometry {
        SwerveOdometry {
            pose,
            gyro_offset: heading.map(|heading| pose.angle - heading),
            previous_angle: pose.angle,
            previous_positions: positions,
        }
    }

    pub fn reset(&mut self, heading: Option<Angle>, positions: [ModulePosition; 4], pose: Pose2d) {
        *self = SwerveOdometry::new(heading, positions, pose);
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Forgets the heading reference's offset. The next update re-anchors it to the current pose,
    /// so the heading reference can be re-zeroed without moving the estimate.
    pub fn reanchor_heading(&mut self) {
        self.gyro_offset = None;
    }

    /// Adds this cycle's module positions and returns the new pose.
    pub fn update(
        &mut self,
        kinematics: &Kinematics,
        heading: Option<Angle>,
        positions: &[ModulePosition; 4],
    ) -> Pose2d {
        let deltas: [ModulePosition; 4] = std::array::from_fn(|i| {
            ModulePosition::new(
                positions[i].distance - self.previous_positions[i].distance,
                positions[i].angle,
            )
        });
        let mut twist = kinematics.to_twist(&deltas);

        let angle = match heading {
            Some(heading) => {
                let previous_angle = self.previous_angle;
                let offset = *self
                    .gyro_offset
                    .get_or_insert_with(|| previous_angle - heading);
                let angle = wrap_angle(heading + offset);
                twist.dtheta = wrap_angle(angle - self.previous_angle).get::<radian>();
                angle
            }
            None => {
                self.gyro_offset = None;
                wrap_angle(self.previous_angle + Angle::new::<radian>(twist.dtheta))
            }
        };

        let moved = self.pose.exp(&twist);
        self.pose = Pose2d::new(moved.x, moved.y, angle);
        self.previous_angle = angle;
        self.previous_positions = *positions;
        self.pose
    }
}

/// A vision correction as it stood when it was applied.
#[derive(Clone, Copy, Debug, PartialEq)]
struct VisionUpdate {
    vision_pose: Pose2d,
    odometry_pose: Pose2d,
}

impl VisionUpdate {
    /// Moves `pose` by however much odometry has moved since the correction.
    fn compensate(&self, pose: &Pose2d) -> Pose2d {
        self.vision_pose.plus(&pose.minus(&self.odometry_pose))
    }
}

/// ## Recursive pose estimator.
/// Odometry runs every cycle; vision measurements are blended in with a per-axis Kalman gain and can be
/// applied retroactively, as long as their capture time is still inside the odometry history.
/// Timestamps are seconds on the control loop's clock.
#[derive(Clone, Debug)]
pub struct PoseEstimator {
    kinematics: Kinematics,
    odometry: SwerveOdometry,
    state_variance: Vector3<f64>,
    buffer_duration: f64,
    odometry_history: VecDeque<(f64, Pose2d)>,
    vision_updates: Vec<(f64, VisionUpdate)>,
    estimate: Pose2d,
}

impl PoseEstimator {
    pub fn new(
        kinematics: Kinematics,
        heading: Option<Angle>,
        positions: [ModulePosition; 4],
        pose: Pose2d,
        state_std_devs: [f64; 3],
        buffer_duration: f64,
    ) -> PoseEstimator {
        PoseEstimator {
            kinematics,
            odometry: SwerveOdometry::new(heading, positions, pose),
            state_variance: Vector3::from(state_std_devs.map(|std_dev| std_dev * std_dev)),
            buffer_duration,
            odometry_history: VecDeque::new(),
            vision_updates: Vec::new(),
            estimate: pose,
        }
    }

    pub fn estimated_position(&self) -> Pose2d {
        self.estimate
    }

    pub fn odometry_pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    pub fn reanchor_heading(&mut self) {
        self.odometry.reanchor_heading();
    }

    /// Throws away all history and starts from `pose`.
    pub fn reset_pose(&mut self, heading: Option<Angle>, positions: [ModulePosition; 4], pose: Pose2d) {
        self.odometry.reset(heading, positions, pose);
        self.odometry_history.clear();
        self.vision_updates.clear();
        self.estimate = pose;
    }

    /// Runs odometry for one cycle and returns the new estimate.
    pub fn update_with_time(
        &mut self,
        timestamp: f64,
        heading: Option<Angle>,
        positions: &[ModulePosition; 4],
    ) -> Pose2d {
        let odometry_pose = self.odometry.update(&self.kinematics, heading, positions);

        while matches!(self.odometry_history.back(), Some((time, _)) if *time >= timestamp) {
            self.odometry_history.pop_back();
        }
        self.odometry_history.push_back((timestamp, odometry_pose));
        while matches!(self.odometry_history.front(), Some((time, _)) if *time < timestamp - self.buffer_duration)
        {
            self.odometry_history.pop_front();
        }

        self.estimate = match self.vision_updates.last() {
            Some((_, update)) => update.compensate(&odometry_pose),
            None => odometry_pose,
        };
        self.estimate
    }

    /// ## Blends in a vision pose captured at `timestamp`.
    /// `std_devs` are the measurement's (x, y, heading) standard deviations; smaller is trusted more.
    /// Returns false when the measurement could not be applied: too old, no odometry yet, or nonsense std devs.
    pub fn add_vision_measurement(&mut self, pose: Pose2d, timestamp: f64, std_devs: [f64; 3]) -> bool {
        if std_devs.iter().any(|std_dev| !std_dev.is_finite() || *std_dev < 0.0) {
            debug!("vision measurement rejected, std devs {:?}", std_devs);
            return false;
        }

        let newest = match self.odometry_history.back() {
            Some((time, _)) => *time,
            None => return false,
        };
        if newest - self.buffer_duration > timestamp {
            debug!("vision measurement from {:.3}s is older than the pose history", timestamp);
            return false;
        }

        self.clean_up_vision_updates();

        let odometry_sample = match self.sample_odometry(timestamp) {
            Some(sample) => sample,
            None => return false,
        };
        let vision_sample = self.sample_at(timestamp, &odometry_sample);

        let twist = vision_sample.log(&pose);
        let gain = self.kalman_gain(std_devs);
        let scaled = Twist2d::new(
            gain.x * twist.dx,
            gain.y * twist.dy,
            gain.z * twist.dtheta,
        );

        let update = VisionUpdate {
            vision_pose: vision_sample.exp(&scaled),
            odometry_pose: odometry_sample,
        };

        // anything captured after this measurement was computed without it
        self.vision_updates.retain(|(time, _)| *time < timestamp);
        self.vision_updates.push((timestamp, update));

        self.estimate = update.compensate(&self.odometry.pose());
        true
    }

    /// Per-axis gain `q / (q + sqrt(q * r))`.
    fn kalman_gain(&self, std_devs: [f64; 3]) -> Vector3<f64> {
        Vector3::from_fn(|i, _| {
            let q = self.state_variance[i];
            let r = std_devs[i] * std_devs[i];
            if q == 0.0 {
                0.0
            } else {
                q / (q + (q * r).sqrt())
            }
        })
    }

    /// Drops vision updates that can no longer be the base for a new measurement.
    fn clean_up_vision_updates(&mut self) {
        let oldest_odometry = match self.odometry_history.front() {
            Some((time, _)) => *time,
            None => return,
        };

        // keep the newest update at or before the oldest odometry sample, drop everything before it
        let newest_needed = self
            .vision_updates
            .iter()
            .rev()
            .find(|(time, _)| *time <= oldest_odometry)
            .map(|(time, _)| *time);

        if let Some(newest_needed) = newest_needed {
            self.vision_updates.retain(|(time, _)| *time >= newest_needed);
        }
    }

    /// Odometry pose at `timestamp`, interpolated between samples and clamped to the ends of the history.
    fn sample_odometry(&self, timestamp: f64) -> Option<Pose2d> {
        let (first_time, first) = *self.odometry_history.front()?;
        let (last_time, last) = *self.odometry_history.back()?;

        if timestamp <= first_time {
            return Some(first);
        }
        if timestamp >= last_time {
            return Some(last);
        }

        let after = self
            .odometry_history
            .iter()
            .position(|(time, _)| *time > timestamp)?;
        let (before_time, before_pose) = self.odometry_history[after - 1];
        let (after_time, after_pose) = self.odometry_history[after];

        let t = (timestamp - before_time) / (after_time - before_time);
        Some(before_pose.interpolate(&after_pose, t))
    }

    /// The fused estimate as it was at `timestamp`.
    fn sample_at(&self, timestamp: f64, odometry_sample: &Pose2d) -> Pose2d {
        match self
            .vision_updates
            .iter()
            .rev()
            .find(|(time, _)| *time <= timestamp)
        {
            Some((_, update)) => update.compensate(odometry_sample),
            None => *odometry_sample,
        }
    }
}
