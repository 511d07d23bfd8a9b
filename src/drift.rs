// ==============================================================================
// drift.rs — DRIFT STATE MACHINE
// ------------------------------------------------------------------------------
// Normal → Drifting → Normal, nothing else.
//
// Entry needs all four at once (speed, yaw rate, lateral speed, handbrake);
// losing any one of them exits. Enter/exit hooks run exactly once per
// transition; the in-state correction runs every tick while Drifting:
//
//   τ_yaw   = -ω_y * stability * gain                 (damper, not a clamp)
//   μ_rear  = μ_drift * max(min_factor, 1 - |v_lat| / lateral_scale)
//   F_boost = momentum_force * min(speed / v_init, max_factor)   (throttle only)
//
// Everything here is a pure function of the current body/wheel state and the
// tick's input; nothing can fail.
// ==============================================================================

use crate::body::VehicleBody;
use crate::config::{DriftConfig, FrictionConfig};
use crate::input::ControlInput;
use crate::wheel::{restore_friction, Wheels, FORWARD_LOCAL};
use nalgebra::Vector3;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DriftState {
    #[default]
    Normal,
    Drifting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftTransition {
    Entered,
    Exited,
}

/// Scalars only meaningful while drifting, kept for the debug overlay.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DriftTelemetry {
    pub threshold_crossed: bool, // yaw rate above the angle threshold this tick
    pub stability_factor: f32,
    pub momentum_factor: f32,
    pub friction_factor: f32,
    pub corrective_torque: f32,
}

#[derive(Debug, Clone)]
pub struct DriftStateMachine {
    state: DriftState,
    drift: DriftConfig,
    friction: FrictionConfig,
    telemetry: DriftTelemetry,
}

impl DriftStateMachine {
    pub fn new(drift: DriftConfig, friction: FrictionConfig) -> Self {
        Self {
            state: DriftState::Normal,
            drift,
            friction,
            telemetry: DriftTelemetry::default(),
        }
    }

    pub fn set_config(&mut self, drift: DriftConfig, friction: FrictionConfig) {
        self.drift = drift;
        self.friction = friction;
    }

    pub fn state(&self) -> DriftState {
        self.state
    }

    pub fn is_drifting(&self) -> bool {
        self.state == DriftState::Drifting
    }

    pub fn telemetry(&self) -> DriftTelemetry {
        self.telemetry
    }

    /// Multiplier the controller applies to turn-resistance damping.
    pub fn damping_scale(&self) -> f32 {
        if self.is_drifting() { self.drift.stability_factor } else { 1.0 }
    }

    /// All entry conditions, evaluated against the current state.
    pub fn conditions_hold(&self, body: &VehicleBody, input: &ControlInput) -> bool {
        body.speed() > self.drift.initiation_speed
            && body.angvel.y.abs() > self.drift.angle_threshold
            && body.lateral_speed().abs() > self.drift.lateral_threshold
            && input.handbrake
    }

    pub fn update(
        &mut self,
        input: &ControlInput,
        body: &mut VehicleBody,
        wheels: &mut Wheels,
    ) -> Option<DriftTransition> {
        self.telemetry.threshold_crossed = body.angvel.y.abs() > self.drift.angle_threshold;
        let want = self.conditions_hold(body, input);

        let transition = match (self.state, want) {
            (DriftState::Normal, true) => {
                self.enter(body, wheels);
                Some(DriftTransition::Entered)
            }
            (DriftState::Drifting, false) => {
                self.exit(body, wheels);
                Some(DriftTransition::Exited)
            }
            _ => None,
        };

        if self.is_drifting() {
            self.sustain(input, body, wheels);
        }
        transition
    }

    /// Leaves Drifting immediately (vehicle reset, teardown).
    pub fn reset(&mut self, body: &mut VehicleBody, wheels: &mut Wheels) {
        if self.is_drifting() {
            self.exit(body, wheels);
        }
        self.telemetry = DriftTelemetry::default();
    }

    fn enter(&mut self, body: &mut VehicleBody, wheels: &mut Wheels) {
        self.state = DriftState::Drifting;
        for w in wheels.iter_mut().filter(|w| !w.is_front_wheel) {
            w.friction_slip = self.friction.drift_rear;
        }
        body.scale_extra_angular_damping(self.drift.stability_factor);
        self.telemetry.stability_factor = self.drift.stability_factor;

        debug!(speed = body.speed(), yaw_rate = body.angvel.y, "drift entered");
    }

    fn exit(&mut self, body: &mut VehicleBody, wheels: &mut Wheels) {
        self.state = DriftState::Normal;
        restore_friction(wheels, &self.friction);
        body.set_extra_angular_damping(0.0);
        self.telemetry.stability_factor = 0.0;
        self.telemetry.momentum_factor = 0.0;
        self.telemetry.friction_factor = 0.0;
        self.telemetry.corrective_torque = 0.0;

        debug!(speed = body.speed(), "drift exited");
    }

    fn sustain(&mut self, input: &ControlInput, body: &mut VehicleBody, wheels: &mut Wheels) {
        let cfg = &self.drift;

        // yaw damper
        let torque = -body.angvel.y * cfg.stability_factor * cfg.correction_gain;
        body.apply_torque(Vector3::new(0.0, torque, 0.0));

        // more slide at higher lateral speed
        let lateral = body.lateral_speed().abs();
        let friction_factor =
            (1.0 - lateral / cfg.lateral_friction_scale).max(cfg.min_friction_factor);
        for w in wheels.iter_mut().filter(|w| !w.is_front_wheel) {
            w.friction_slip = self.friction.drift_rear * friction_factor;
        }

        // keep momentum through the slide, ratio capped at max_momentum_factor
        let momentum = if input.throttle_forward {
            let m = (body.speed() / cfg.initiation_speed).min(cfg.max_momentum_factor);
            body.apply_local_force(FORWARD_LOCAL * cfg.momentum_force * m);
            m
        } else {
            0.0
        };

        self.telemetry.friction_factor = friction_factor;
        self.telemetry.momentum_factor = momentum;
        self.telemetry.corrective_torque = torque;
    }
}
