use crate::constants::vision::APRILTAG_TRUST_TIERS;
use crate::geometry::Pose2d;
use std::cell::RefCell;
use std::rc::Rc;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

/// The latest robot pose solved from AprilTags.
/// `exists` is false when no tag was in view for this frame; the rest of the fields are then stale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AprilTagReading {
    pub pose: Pose2d,
    /// Distance from the camera to the tag the pose was solved from.
    pub distance: Length,
    /// Capture time in seconds, on the same clock as the control loop.
    pub timestamp: f64,
    pub exists: bool,
}

impl AprilTagReading {
    pub fn none() -> AprilTagReading {
        AprilTagReading {
            pose: Pose2d::origin(),
            distance: Length::new::<meter>(0.0),
            timestamp: 0.0,
            exists: false,
        }
    }
}

/// Tag-based localization camera.
pub trait AprilTagCamera {
    fn is_connected(&self) -> bool;
    fn latest_reading(&self) -> AprilTagReading;
}

/// ## Headset-style pose tracker (Quest).
/// High rate and smooth, but it drifts, so it gets re-seeded from good tag readings.
pub trait PoseTracker {
    fn is_connected(&self) -> bool;
    fn pose(&self) -> Pose2d;
    /// Capture time of [`PoseTracker::pose`] in seconds.
    fn timestamp(&self) -> f64;
    fn reset_pose(&mut self, pose: Pose2d);
    fn reset_heading(&mut self, heading: Angle);
}

/// How much to trust a tag reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TagTrust {
    /// Standard deviation applied to x, y, and heading.
    pub std_dev: f64,
    /// Close enough that the headset should be snapped to the fused pose.
    pub reseeds_headset: bool,
}

/// ## Picks the trust tier for a tag seen at `distance`.
/// Returns None past the farthest tier, or for a distance that is negative or NaN.
pub fn apriltag_trust(distance: Length) -> Option<TagTrust> {
    let meters = distance.get::<meter>();
    if !(meters >= 0.0) {
        return None;
    }

    APRILTAG_TRUST_TIERS
        .iter()
        .find(|(max_distance, _, _)| meters < *max_distance)
        .map(|&(_, std_dev, reseeds_headset)| TagTrust {
            std_dev,
            reseeds_headset,
        })
}

#[derive(Debug)]
struct SimAprilTagState {
    connected: bool,
    reading: AprilTagReading,
}

/// Simulated tag camera. Clones share state.
#[derive(Clone, Debug)]
pub struct SimAprilTagCamera {
    state: Rc<RefCell<SimAprilTagState>>,
}

impl Default for SimAprilTagCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SimAprilTagCamera {
    pub fn new() -> SimAprilTagCamera {
        SimAprilTagCamera {
            state: Rc::new(RefCell::new(SimAprilTagState {
                connected: true,
                reading: AprilTagReading::none(),
            })),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.borrow_mut().connected = connected;
    }

    pub fn see_tag(&self, pose: Pose2d, distance: Length, timestamp: f64) {
        self.state.borrow_mut().reading = AprilTagReading {
            pose,
            distance,
            timestamp,
            exists: true,
        };
    }

    pub fn lose_tag(&self) {
        self.state.borrow_mut().reading.exists = false;
    }
}

impl AprilTagCamera for SimAprilTagCamera {
    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn latest_reading(&self) -> AprilTagReading {
        self.state.borrow().reading
    }
}

#[derive(Debug)]
struct SimQuestState {
    connected: bool,
    pose: Pose2d,
    timestamp: f64,
    resets: usize,
}

/// Simulated headset. Clones share state.
#[derive(Clone, Debug)]
pub struct SimQuestHeadset {
    state: Rc<RefCell<SimQuestState>>,
}

impl Default for SimQuestHeadset {
    fn default() -> Self {
        Self::new()
    }
}

impl SimQuestHeadset {
    pub fn new() -> SimQuestHeadset {
        SimQuestHeadset {
            state: Rc::new(RefCell::new(SimQuestState {
                connected: true,
                pose: Pose2d::origin(),
                timestamp: 0.0,
                resets: 0,
            })),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.borrow_mut().connected = connected;
    }

    /// Reports a new tracked pose.
    pub fn track(&self, pose: Pose2d, timestamp: f64) {
        let mut state = self.state.borrow_mut();
        state.pose = pose;
        state.timestamp = timestamp;
    }

    /// How many times the pose has been reset.
    pub fn resets(&self) -> usize {
        self.state.borrow().resets
    }
}

impl PoseTracker for SimQuestHeadset {
    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn pose(&self) -> Pose2d {
        self.state.borrow().pose
    }

    fn timestamp(&self) -> f64 {
        self.state.borrow().timestamp
    }

    fn reset_pose(&mut self, pose: Pose2d) {
        let mut state = self.state.borrow_mut();
        state.pose = pose;
        state.resets += 1;
    }

    fn reset_heading(&mut self, heading: Angle) {
        let mut state = self.state.borrow_mut();
        state.pose = Pose2d::new(state.pose.x, state.pose.y, heading);
    }
}
