use crate::geometry::{wrap_angle, Pose2d};
use crate::subsystems::swerve::drivetrain::Drivetrain;
use crate::subsystems::vision::apriltag_trust;
use log::{debug, info, warn};
use uom::si::angle::degree;
use uom::si::f64::Angle;
use uom::si::length::meter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    AprilTag,
    Quest,
}

/// One reading worth handing to the estimator this cycle.
#[derive(Clone, Copy, Debug)]
struct Measurement {
    source: Source,
    pose: Pose2d,
    timestamp: f64,
    std_devs: [f64; 3],
    reseeds_headset: bool,
}

impl Drivetrain {
    /// The fused field pose.
    pub fn pose(&self) -> Pose2d {
        self.estimator.estimated_position()
    }

    /// Wheel and gyro only, without vision.
    pub fn odometry_pose(&self) -> Pose2d {
        self.estimator.odometry_pose()
    }

    /// ## Hard reset of the estimate, for pre-match alignment.
    /// The gyro and the headset are re-seeded to match, and all pose history is dropped.
    pub fn set_pose(&mut self, pose: Pose2d) {
        self.gyro.reset_heading(pose.angle);
        self.quest.reset_pose(pose);

        let heading = self.gyro_connected.then(|| self.gyro.heading());
        let positions = self.absolute_module_positions();
        self.estimator.reset_pose(heading, positions, pose);
        self.gyro_to_field = Angle::new::<degree>(0.0);
        self.heading_lock.reset();

        info!(
            "pose set to ({:.3} m, {:.3} m, {:.1} deg)",
            pose.x.get::<meter>(),
            pose.y.get::<meter>(),
            pose.angle.get::<degree>()
        );
    }

    /// Re-seeds the field heading everywhere, keeping the current translation.
    pub fn set_heading(&mut self, heading: Angle) {
        let heading = wrap_angle(heading);
        self.gyro.set_heading_degrees(heading.get::<degree>());
        self.quest.reset_heading(heading);

        let current = self.pose();
        let gyro_heading = self.gyro_connected.then(|| self.gyro.heading());
        let positions = self.absolute_module_positions();
        self.estimator
            .reset_pose(gyro_heading, positions, Pose2d::new(current.x, current.y, heading));
        self.gyro_to_field = Angle::new::<degree>(0.0);
        self.heading_lock.reset();
    }

    pub(in crate::subsystems::swerve) fn update_odometry(&mut self, timestamp: f64) {
        let heading = self.gyro_connected.then(|| self.gyro.heading());
        let positions = self.absolute_module_positions();
        let pose = self.estimator.update_with_time(timestamp, heading, &positions);

        if let Some(heading) = heading {
            self.gyro_to_field = wrap_angle(pose.angle - heading);
        }
    }

    /// ## Hands this cycle's vision readings to the estimator.
    /// Each source contributes at most its newest reading, and only once.
    /// A tag close enough to re-seed the headset wins over the headset for the cycle.
    pub(in crate::subsystems::swerve) fn fuse_vision(&mut self) {
        let tag = self.apriltag_measurement();
        let mut quest = self.quest_measurement();
        if tag.is_some_and(|tag| tag.reseeds_headset) {
            quest = None;
        }

        let mut measurements: Vec<Measurement> = tag.into_iter().chain(quest).collect();
        measurements.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        for measurement in measurements {
            let applied = self.estimator.add_vision_measurement(
                measurement.pose,
                measurement.timestamp,
                measurement.std_devs,
            );
            if !applied {
                debug!(
                    "{:?} reading from {:.3}s not applied",
                    measurement.source, measurement.timestamp
                );
                continue;
            }

            if measurement.reseeds_headset && self.config.localization.use_quest {
                let estimate = self.estimator.estimated_position();
                self.quest.reset_pose(estimate);
                debug!("headset re-seeded from tag at {:.3}s", measurement.timestamp);
            }
        }
    }

    fn apriltag_measurement(&mut self) -> Option<Measurement> {
        if !self.config.localization.use_apriltags {
            return None;
        }

        let connected = self.apriltag_camera.is_connected();
        if connected != self.camera_connected {
            if connected {
                info!("apriltag camera reconnected");
            } else {
                warn!("apriltag camera disconnected, skipping tag updates");
            }
            self.camera_connected = connected;
        }
        if !connected {
            return None;
        }

        let reading = self.apriltag_camera.latest_reading();
        if !reading.exists || self.last_tag_timestamp == Some(reading.timestamp) {
            return None;
        }
        self.last_tag_timestamp = Some(reading.timestamp);

        let Some(trust) = apriltag_trust(reading.distance) else {
            debug!(
                "tag at {:.2} m is too far to trust",
                reading.distance.get::<meter>()
            );
            return None;
        };

        Some(Measurement {
            source: Source::AprilTag,
            pose: reading.pose,
            timestamp: reading.timestamp,
            std_devs: [trust.std_dev; 3],
            reseeds_headset: trust.reseeds_headset,
        })
    }

    fn quest_measurement(&mut self) -> Option<Measurement> {
        if !self.config.localization.use_quest {
            return None;
        }

        let connected = self.quest.is_connected();
        if connected != self.quest_connected {
            if connected {
                info!("quest reconnected");
            } else {
                warn!("quest disconnected, skipping headset updates");
            }
            self.quest_connected = connected;
        }
        if !connected {
            return None;
        }

        let timestamp = self.quest.timestamp();
        if self.last_quest_timestamp == Some(timestamp) {
            return None;
        }
        self.last_quest_timestamp = Some(timestamp);

        Some(Measurement {
            source: Source::Quest,
            pose: self.quest.pose(),
            timestamp,
            std_devs: self.config.localization.quest_std_devs,
            reseeds_headset: false,
        })
    }
}
