use crate::config::DrivetrainConfig;
use crate::error::DriveError;
use crate::geometry::{ChassisSpeeds, Twist2d};
use crate::subsystems::swerve::module::{ModulePosition, ModuleState};
use nalgebra::{SMatrix, SVector, Vector2};
use uom::si::angle::radian;
use uom::si::f64::{Angle, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

const RANK_EPSILON: f64 = 1e-9;

/// ## Swerve kinematics for four modules.
/// Module order is FL, FR, BL, BR everywhere.
/// Each module at (x, y) contributes two rows to the inverse kinematics matrix:
/// `[1, 0, -y]` for its x velocity and `[0, 1, x]` for its y velocity.
/// Forward kinematics is the least-squares pseudo-inverse of that matrix, computed once.
#[derive(Clone, Debug)]
pub struct Kinematics {
    module_translations: [Vector2<f64>; 4],
    inverse: SMatrix<f64, 8, 3>,
    forward: SMatrix<f64, 3, 8>,
}

impl Kinematics {
    /// Fails if the module positions cannot resolve all three chassis degrees of freedom.
    pub fn new(module_translations: [Vector2<f64>; 4]) -> Result<Kinematics, DriveError> {
        let mut inverse = SMatrix::<f64, 8, 3>::zeros();
        for (i, translation) in module_translations.iter().enumerate() {
            inverse[(2 * i, 0)] = 1.0;
            inverse[(2 * i, 2)] = -translation.y;
            inverse[(2 * i + 1, 1)] = 1.0;
            inverse[(2 * i + 1, 2)] = translation.x;
        }

        if inverse.rank(RANK_EPSILON) < 3 {
            return Err(DriveError::DegenerateGeometry(
                "module positions do not span rotation",
            ));
        }

        let forward = inverse
            .pseudo_inverse(RANK_EPSILON)
            .map_err(DriveError::DegenerateGeometry)?;

        Ok(Kinematics {
            module_translations,
            inverse,
            forward,
        })
    }

    pub fn from_config(config: &DrivetrainConfig) -> Result<Kinematics, DriveError> {
        Kinematics::new(config.module_translations())
    }

    pub fn module_translations(&self) -> &[Vector2<f64>; 4] {
        &self.module_translations
    }

    /// ## Robot-relative chassis speeds to module states.
    /// A module with no velocity points at 0 rad; callers that care hold the current angle instead.
    pub fn to_module_states(&self, speeds: ChassisSpeeds) -> [ModuleState; 4] {
        let module_velocities = self.inverse * speeds.as_vector();

        std::array::from_fn(|i| {
            let vx = module_velocities[2 * i];
            let vy = module_velocities[2 * i + 1];
            ModuleState::new(
                Velocity::new::<meter_per_second>(vx.hypot(vy)),
                Angle::new::<radian>(vy.atan2(vx)),
            )
        })
    }

    /// Least-squares robot-relative chassis speeds from measured module states.
    pub fn to_chassis_speeds(&self, states: &[ModuleState; 4]) -> ChassisSpeeds {
        let chassis = self.forward
            * split_polar(states.map(|state| {
                (
                    state.speed.get::<meter_per_second>(),
                    state.angle.get::<radian>(),
                )
            }));

        ChassisSpeeds::from_meters_per_second(chassis.x, chassis.y, chassis.z)
    }

    /// ## Robot-frame twist from wheel displacements.
    /// Each `ModulePosition` holds the distance rolled since the last sample and the current wheel angle.
    pub fn to_twist(&self, deltas: &[ModulePosition; 4]) -> Twist2d {
        let twist = self.forward
            * split_polar(deltas.map(|delta| {
                (
                    delta.distance.get::<meter>(),
                    delta.angle.get::<radian>(),
                )
            }));

        Twist2d::new(twist.x, twist.y, twist.z)
    }
}

fn split_polar(polar: [(f64, f64); 4]) -> SVector<f64, 8> {
    let mut components = SVector::<f64, 8>::zeros();
    for (i, (magnitude, angle)) in polar.iter().enumerate() {
        components[2 * i] = magnitude * angle.cos();
        components[2 * i + 1] = magnitude * angle.sin();
    }
    components
}

/// ## Scales every module speed down by the same ratio so none exceeds `max_speed`.
/// Angles are untouched, so the commanded direction is preserved.
pub fn desaturate(states: &mut [ModuleState; 4], max_speed: Velocity) {
    let max = max_speed.get::<meter_per_second>();
    let fastest = states
        .iter()
        .map(|state| state.speed.get::<meter_per_second>().abs())
        .fold(0.0, f64::max);

    if fastest > max {
        let ratio = max / fastest;
        for state in states.iter_mut() {
            state.speed = state.speed * ratio;
        }
    }
}
