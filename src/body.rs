// ==============================================================================
// body.rs — VEHICLE RIGID BODY MIRROR
// ------------------------------------------------------------------------------
// `VehicleBody` mirrors the chassis rigid body between solver steps:
// - state (pose, velocities) is synced from the solver before each tick,
// - forces/torques are accumulated during the tick and flushed to the solver,
// - damping is split into a configured base and an additive extra, so the
//   effective value can never drop below the base.
//
// Frames: chassis-local forward is -Z, up +Y, right +X (see wheel.rs).
// ==============================================================================

use crate::wheel::FORWARD_LOCAL;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleBody {
    pub mass: f32,                          // kg
    pub position: Vector3<f32>,             // world, m
    pub orientation: UnitQuaternion<f32>,
    pub linvel: Vector3<f32>,               // m/s
    pub angvel: Vector3<f32>,               // rad/s

    base_linear_damping: f32,
    base_angular_damping: f32,
    extra_linear_damping: f32,
    extra_angular_damping: f32,

    force: Vector3<f32>,                    // world, accumulated this tick
    torque: Vector3<f32>,                   // world, accumulated this tick
}

impl VehicleBody {
    pub fn new(mass: f32, base_linear_damping: f32, base_angular_damping: f32) -> Self {
        Self {
            mass,
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
            base_linear_damping: base_linear_damping.max(0.0),
            base_angular_damping: base_angular_damping.max(0.0),
            extra_linear_damping: 0.0,
            extra_angular_damping: 0.0,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    pub fn at(mut self, position: Vector3<f32>) -> Self {
        self.position = position;
        self
    }

    // --------------------------------------------------------------
    // Derived kinematics
    // --------------------------------------------------------------

    /// Horizontal speed; vertical motion never feeds speed-dependent scaling.
    pub fn speed(&self) -> f32 {
        (self.linvel.x * self.linvel.x + self.linvel.z * self.linvel.z).sqrt()
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.orientation * FORWARD_LOCAL
    }

    pub fn right(&self) -> Vector3<f32> {
        self.orientation * Vector3::x()
    }

    pub fn up(&self) -> Vector3<f32> {
        self.orientation * Vector3::y()
    }

    /// Rotation about world Y, 0 when facing -Z, positive turning left.
    pub fn yaw(&self) -> f32 {
        let f = self.forward();
        if f.x.abs() < 1e-6 && f.z.abs() < 1e-6 {
            return 0.0;
        }
        (-f.x).atan2(-f.z)
    }

    /// Signed speed along the chassis forward axis.
    pub fn forward_speed(&self) -> f32 {
        self.linvel.dot(&self.forward())
    }

    /// Signed speed along the chassis right axis.
    pub fn lateral_speed(&self) -> f32 {
        self.linvel.dot(&self.right())
    }

    pub fn isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    // --------------------------------------------------------------
    // Forces
    // --------------------------------------------------------------

    pub fn apply_force(&mut self, world: Vector3<f32>) {
        self.force += world;
    }

    pub fn apply_local_force(&mut self, local: Vector3<f32>) {
        self.force += self.orientation * local;
    }

    pub fn apply_torque(&mut self, world: Vector3<f32>) {
        self.torque += world;
    }

    pub fn apply_local_torque(&mut self, local: Vector3<f32>) {
        self.torque += self.orientation * local;
    }

    pub fn pending_force(&self) -> Vector3<f32> {
        self.force
    }

    pub fn pending_torque(&self) -> Vector3<f32> {
        self.torque
    }

    /// Hands the accumulated force/torque to the solver and clears them.
    pub fn take_forces(&mut self) -> (Vector3<f32>, Vector3<f32>) {
        let out = (self.force, self.torque);
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
        out
    }

    // --------------------------------------------------------------
    // Damping
    // --------------------------------------------------------------

    pub fn linear_damping(&self) -> f32 {
        self.base_linear_damping + self.extra_linear_damping
    }

    pub fn angular_damping(&self) -> f32 {
        self.base_angular_damping + self.extra_angular_damping
    }

    pub fn base_linear_damping(&self) -> f32 {
        self.base_linear_damping
    }

    pub fn base_angular_damping(&self) -> f32 {
        self.base_angular_damping
    }

    pub fn set_extra_linear_damping(&mut self, extra: f32) {
        self.extra_linear_damping = finite_non_negative(extra);
    }

    pub fn set_extra_angular_damping(&mut self, extra: f32) {
        self.extra_angular_damping = finite_non_negative(extra);
    }

    /// Scales only the additive part, so the base stays a hard floor.
    pub fn scale_extra_angular_damping(&mut self, factor: f32) {
        self.extra_angular_damping = finite_non_negative(self.extra_angular_damping * factor);
    }

    pub fn reset_damping(&mut self) {
        self.extra_linear_damping = 0.0;
        self.extra_angular_damping = 0.0;
    }

    pub fn set_base_damping(&mut self, linear: f32, angular: f32) {
        self.base_linear_damping = finite_non_negative(linear);
        self.base_angular_damping = finite_non_negative(angular);
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.linvel.iter().all(|v| v.is_finite())
            && self.angvel.iter().all(|v| v.is_finite())
    }
}

fn finite_non_negative(v: f32) -> f32 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}
