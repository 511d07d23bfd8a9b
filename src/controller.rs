// ==============================================================================
// controller.rs — VEHICLE CONTROLLER (ONE FIXED TICK)
// ------------------------------------------------------------------------------
// Per tick, from a ControlInput snapshot and the synced body/wheel state:
//   1) engine force       speed-scaled drive, 70/30 rear/front, engine braking
//   2) brakes / handbrake rear-only brake + reduced rear grip
//   3) steering           speed-decaying authority, rate limited, turn damping
//   4) aerodynamics       speed² terms, gated by a minimum speed
//   5) drift              DriftStateMachine::update
//
// After the solver step, `sync_visuals` derives what the renderer sees:
//   - wheel visuals       steering yaw then rolling pitch
//   - render pose         lerp/slerp toward the physics pose
//
// Without an attached chassis `step` does nothing: it is routinely called while
// the vehicle is still loading.
// ==============================================================================

use crate::body::VehicleBody;
use crate::config::{AeroConfig, EngineConfig, SteeringConfig, VehicleConfig, KMH_PER_MPS};
use crate::drift::{DriftState, DriftStateMachine, DriftTelemetry, DriftTransition};
use crate::input::ControlInput;
use crate::wheel::{restore_friction, Wheels};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Below this horizontal speed engine braking is skipped (no creep reversal).
const ENGINE_BRAKE_MIN_SPEED: f32 = 0.1;

/// Force-curve multiplier: `max(min, 1 - v_kmh / max_kmh)`.
pub fn speed_factor(speed: f32, engine: &EngineConfig) -> f32 {
    let kmh = speed.max(0.0) * KMH_PER_MPS;
    (1.0 - kmh / engine.max_speed_kmh).clamp(engine.min_speed_factor, 1.0)
}

/// Steering authority: `max(min, (1 - v_kmh / max_kmh)^power)`.
/// The base is clamped first so speeds past the limit never raise a negative
/// number to a fractional power.
pub fn steer_factor(speed: f32, steering: &SteeringConfig) -> f32 {
    let kmh = speed.max(0.0) * KMH_PER_MPS;
    let base = (1.0 - kmh / steering.max_steering_speed_kmh).clamp(0.0, 1.0);
    base.powf(steering.power_factor).max(steering.min_factor).min(1.0)
}

/// Per-wheel engine force `[FL, FR, RL, RR]`, positive = forward.
pub fn drive_forces(
    engine: &EngineConfig,
    input: &ControlInput,
    speed: f32,
    forward_speed: f32,
) -> [f32; 4] {
    let total = if input.throttle_forward {
        engine.max_force * speed_factor(speed, engine)
    } else if input.throttle_reverse {
        -engine.max_force * speed_factor(speed, engine) * engine.reverse_power_ratio
    } else if speed > ENGINE_BRAKE_MIN_SPEED && forward_speed.abs() > ENGINE_BRAKE_MIN_SPEED {
        let braking = (speed * engine.engine_brake_per_mps)
            .min(engine.max_force * engine.engine_brake_cap);
        -forward_speed.signum() * braking
    } else {
        0.0
    };

    let front = total * (1.0 - engine.rear_share) * 0.5;
    let rear = total * engine.rear_share * 0.5;
    [front, front, rear, rear]
}

#[derive(Debug, Clone)]
pub struct Chassis {
    pub body: VehicleBody,
    pub wheels: Wheels,
}

pub struct VehicleController {
    config: VehicleConfig,
    chassis: Option<Chassis>,
    drift: DriftStateMachine,
    steer_angle: f32,
    render_pose: Isometry3<f32>,
    last_transition: Option<DriftTransition>,
    rng: StdRng,
}

impl VehicleController {
    pub fn new(config: VehicleConfig) -> Self {
        let drift = DriftStateMachine::new(config.drift, config.friction);
        Self {
            config,
            chassis: None,
            drift,
            steer_angle: 0.0,
            render_pose: Isometry3::identity(),
            last_transition: None,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    pub fn attach(&mut self, body: VehicleBody, wheels: Wheels) {
        self.render_pose = body.isometry();
        self.steer_angle = 0.0;
        self.chassis = Some(Chassis { body, wheels });
    }

    pub fn detach(&mut self) -> Option<Chassis> {
        self.chassis.take()
    }

    pub fn is_attached(&self) -> bool {
        self.chassis.is_some()
    }

    pub fn chassis(&self) -> Option<&Chassis> {
        self.chassis.as_ref()
    }

    pub fn chassis_mut(&mut self) -> Option<&mut Chassis> {
        self.chassis.as_mut()
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    /// Installs a new config snapshot. Damping bases follow immediately; the
    /// friction constants take effect on the next tick's brake pass.
    pub fn update_config(&mut self, config: VehicleConfig) {
        self.drift.set_config(config.drift, config.friction);
        if let Some(c) = self.chassis.as_mut() {
            c.body.set_base_damping(config.damping.base_linear, config.damping.base_angular);
        }
        self.config = config;
    }

    // --------------------------------------------------------------
    // Queries
    // --------------------------------------------------------------

    pub fn speed(&self) -> f32 {
        self.chassis.as_ref().map_or(0.0, |c| c.body.speed())
    }

    pub fn position(&self) -> Option<Vector3<f32>> {
        self.chassis.as_ref().map(|c| c.body.position)
    }

    pub fn rotation(&self) -> Option<UnitQuaternion<f32>> {
        self.chassis.as_ref().map(|c| c.body.orientation)
    }

    pub fn render_pose(&self) -> Isometry3<f32> {
        self.render_pose
    }

    pub fn steer_angle(&self) -> f32 {
        self.steer_angle
    }

    pub fn drift_state(&self) -> DriftState {
        self.drift.state()
    }

    pub fn is_drifting(&self) -> bool {
        self.drift.is_drifting()
    }

    pub fn drift_telemetry(&self) -> DriftTelemetry {
        self.drift.telemetry()
    }

    pub fn last_transition(&self) -> Option<DriftTransition> {
        self.last_transition
    }

    // --------------------------------------------------------------
    // Tick
    // --------------------------------------------------------------

    pub fn step(&mut self, input: &ControlInput, dt: f32) {
        let Self { config, chassis, drift, steer_angle, last_transition, rng, .. } = self;
        let Some(Chassis { body, wheels }) = chassis.as_mut() else {
            return;
        };

        let speed = body.speed();

        // 1) engine
        let forces = drive_forces(&config.engine, input, speed, body.forward_speed());
        for (w, f) in wheels.iter_mut().zip(forces) {
            w.engine_force = f;
        }

        // 2) brakes
        if input.handbrake {
            for w in wheels.iter_mut() {
                if w.is_front_wheel {
                    w.friction_slip = config.friction.front;
                    w.brake = 0.0;
                } else {
                    w.friction_slip = config.friction.handbrake_rear;
                    w.brake = config.friction.handbrake_brake;
                }
            }
        } else {
            restore_friction(wheels, &config.friction);
            for w in wheels.iter_mut() {
                w.brake = 0.0;
            }
        }

        // 3) steering
        let target = input.steer_direction()
            * config.steering.max_angle
            * steer_factor(speed, &config.steering);
        let max_step = config.steering.rate * dt.max(0.0);
        *steer_angle += (target - *steer_angle).clamp(-max_step, max_step);
        for w in wheels.iter_mut() {
            w.steering_angle = if w.is_front_wheel { *steer_angle } else { 0.0 };
        }
        apply_turn_damping(config, input, *steer_angle, drift.damping_scale(), body);

        // 4) aerodynamics
        let ride_height = ride_height(wheels);
        apply_aero(&config.aero, body, ride_height, rng);

        // 5) drift
        *last_transition = drift.update(input, body, wheels);
    }

    /// Wheel model poses and the smoothed chassis pose, from the state the
    /// solver just wrote back. Physics state is left untouched.
    pub fn sync_visuals(&mut self) {
        let Some(c) = self.chassis.as_mut() else { return };
        for w in c.wheels.iter_mut() {
            w.render = w.visual_pose(&c.body.orientation);
        }
        self.render_pose =
            smooth_pose(&self.render_pose, &c.body.isometry(), self.config.render_smoothing);
    }

    /// Back to the given pose at rest: drift cleared, grip and damping restored.
    pub fn reset(&mut self, position: Vector3<f32>) {
        let Some(c) = self.chassis.as_mut() else { return };
        self.drift.reset(&mut c.body, &mut c.wheels);
        c.body.position = position;
        c.body.orientation = UnitQuaternion::identity();
        c.body.linvel = Vector3::zeros();
        c.body.angvel = Vector3::zeros();
        c.body.reset_damping();
        c.body.take_forces();
        restore_friction(&mut c.wheels, &self.config.friction);
        for w in c.wheels.iter_mut() {
            w.brake = 0.0;
            w.engine_force = 0.0;
            w.steering_angle = 0.0;
        }
        self.steer_angle = 0.0;
        self.render_pose = c.body.isometry();
        self.last_transition = None;
    }
}

fn apply_turn_damping(
    config: &VehicleConfig,
    input: &ControlInput,
    steer_angle: f32,
    drift_scale: f32,
    body: &mut VehicleBody,
) {
    let d = &config.damping;
    let speed = body.speed();
    let steering = input.is_steering() && steer_angle.abs() > 1e-3;

    let turn = if steering {
        (steer_angle.abs() * speed * d.turn_coefficient).min(d.max_turn_extra) * drift_scale
    } else {
        0.0
    };
    body.set_extra_angular_damping(turn);

    let scrub = if steering && speed > d.scrub_min_speed {
        (body.lateral_speed().abs() * d.scrub_coefficient).min(d.max_scrub_extra)
    } else {
        0.0
    };
    body.set_extra_linear_damping(scrub);
}

/// Mean suspension length of the wheels touching ground, if any.
fn ride_height(wheels: &Wheels) -> Option<f32> {
    let (sum, n) = wheels
        .iter()
        .filter(|w| w.in_contact)
        .fold((0.0, 0u32), |(s, n), w| (s + w.suspension_length, n + 1));
    (n > 0).then(|| sum / n as f32)
}

fn apply_aero(aero: &AeroConfig, body: &mut VehicleBody, ride_height: Option<f32>, rng: &mut StdRng) {
    let speed = body.speed();
    if speed <= aero.min_speed || speed <= f32::EPSILON {
        return;
    }
    let s2 = speed * speed;

    // downforce + ground effect (body-local, pressing into the track)
    body.apply_local_force(Vector3::new(0.0, -aero.downforce * s2, 0.0));
    if let Some(h) = ride_height {
        let ground = aero.ground_effect * s2 / h.max(aero.min_ride_height);
        body.apply_local_force(Vector3::new(0.0, -ground, 0.0));
    }

    // quadratic drag against horizontal travel
    let travel = Vector3::new(body.linvel.x, 0.0, body.linvel.z) / speed;
    body.apply_force(-travel * aero.drag * s2);

    // lift
    body.apply_local_force(Vector3::new(0.0, aero.lift * s2, 0.0));

    // turbulence
    let gust = Vector3::new(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-0.5..0.5),
        rng.gen_range(-1.0..1.0),
    );
    body.apply_force(gust * aero.turbulence * s2);

    // lateral wind resistance
    let lateral = body.lateral_speed() / speed;
    let right = body.right();
    body.apply_force(-right * aero.lateral_resistance * s2 * lateral);
}

fn smooth_pose(current: &Isometry3<f32>, target: &Isometry3<f32>, t: f32) -> Isometry3<f32> {
    let t = t.clamp(0.0, 1.0);
    let translation = current.translation.vector.lerp(&target.translation.vector, t);
    let rotation = current
        .rotation
        .try_slerp(&target.rotation, t, 1.0e-6)
        .unwrap_or(target.rotation);
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wheel::{WheelSlot, WheelState};
    use nalgebra::Point3;

    fn attached() -> VehicleController {
        let cfg = VehicleConfig::default();
        let mut ctl = VehicleController::new(cfg.clone());
        let body = VehicleBody::new(cfg.mass, cfg.damping.base_linear, cfg.damping.base_angular);
        let wheels = WheelSlot::ALL.map(|slot| {
            WheelState::new(slot, Point3::origin(), &cfg.suspension, &cfg.friction)
        });
        ctl.attach(body, wheels);
        ctl
    }

    fn body(ctl: &mut VehicleController) -> &mut VehicleBody {
        &mut ctl.chassis_mut().unwrap().body
    }

    fn wheels(ctl: &VehicleController) -> &Wheels {
        &ctl.chassis().unwrap().wheels
    }

    #[test]
    fn speed_factor_is_bounded_and_monotone() {
        let e = EngineConfig::default();
        let mut prev = f32::INFINITY;
        for i in 0..400 {
            let s = i as f32 * 0.25;
            let f = speed_factor(s, &e);
            assert!((e.min_speed_factor..=1.0).contains(&f));
            assert!(f <= prev);
            prev = f;
        }
        assert_eq!(speed_factor(0.0, &e), 1.0);
        assert_eq!(speed_factor(1000.0, &e), e.min_speed_factor);
    }

    #[test]
    fn steer_factor_never_nan_past_limit() {
        let s = SteeringConfig::default();
        assert_eq!(steer_factor(0.0, &s), 1.0);
        let fast = steer_factor(500.0, &s);
        assert!(!fast.is_nan());
        assert_eq!(fast, s.min_factor);
        assert!(steer_factor(20.0, &s) < 1.0);
    }

    #[test]
    fn drive_split_is_seventy_thirty() {
        let e = EngineConfig::default();
        let fwd = ControlInput { throttle_forward: true, ..Default::default() };
        let f = drive_forces(&e, &fwd, 0.0, 0.0);
        let total: f32 = f.iter().sum();
        assert!((total - e.max_force).abs() < 1e-2);
        assert!(((f[2] + f[3]) / total - 0.7).abs() < 1e-5);
        assert!(f.iter().all(|&x| x > 0.0));
    }

    #[test]
    fn reverse_is_weaker_than_forward() {
        let e = EngineConfig::default();
        let fwd = ControlInput { throttle_forward: true, ..Default::default() };
        let rev = ControlInput { throttle_reverse: true, ..Default::default() };
        let f: f32 = drive_forces(&e, &fwd, 3.0, 3.0).iter().sum();
        let r: f32 = drive_forces(&e, &rev, 3.0, 3.0).iter().sum();
        assert!(r < 0.0);
        assert!(r.abs() < f);
    }

    #[test]
    fn coasting_opposes_travel_and_is_capped() {
        let e = EngineConfig::default();
        let none = ControlInput::default();

        let ahead: f32 = drive_forces(&e, &none, 10.0, 10.0).iter().sum();
        assert!((ahead + 600.0).abs() < 1e-2);

        let backing: f32 = drive_forces(&e, &none, 10.0, -10.0).iter().sum();
        assert!(backing > 0.0);

        let fast: f32 = drive_forces(&e, &none, 80.0, 80.0).iter().sum();
        assert!((fast + e.max_force * e.engine_brake_cap).abs() < 1e-2);

        assert_eq!(drive_forces(&e, &none, 0.0, 0.0), [0.0; 4]);
    }

    #[test]
    fn step_without_chassis_is_a_noop() {
        let mut ctl = VehicleController::new(VehicleConfig::default());
        let input = ControlInput { throttle_forward: true, ..Default::default() };
        ctl.step(&input, 1.0 / 60.0);
        assert!(!ctl.is_attached());
        assert_eq!(ctl.speed(), 0.0);
        assert!(ctl.position().is_none());
    }

    #[test]
    fn rear_wheels_never_steer() {
        let mut ctl = attached();
        let cases = [
            ControlInput { steer_left: true, ..Default::default() },
            ControlInput { steer_right: true, ..Default::default() },
            ControlInput { steer_left: true, handbrake: true, ..Default::default() },
        ];
        for input in cases {
            for _ in 0..30 {
                ctl.step(&input, 1.0 / 60.0);
                let w = wheels(&ctl);
                assert_eq!(w[2].steering_angle, 0.0);
                assert_eq!(w[3].steering_angle, 0.0);
            }
        }
        let left = ControlInput { steer_left: true, ..Default::default() };
        ctl.step(&left, 1.0);
        assert!(wheels(&ctl)[0].steering_angle > 0.0);
    }

    #[test]
    fn steering_is_rate_limited() {
        let mut ctl = attached();
        let left = ControlInput { steer_left: true, ..Default::default() };
        ctl.step(&left, 1.0 / 60.0);
        let rate = ctl.config().steering.rate;
        assert!((ctl.steer_angle() - rate / 60.0).abs() < 1e-6);
    }

    #[test]
    fn handbrake_only_touches_the_rear() {
        let mut ctl = attached();
        let cfg = ctl.config().clone();
        let hb = ControlInput { handbrake: true, ..Default::default() };
        ctl.step(&hb, 1.0 / 60.0);
        let w = wheels(&ctl);
        assert_eq!(w[0].brake, 0.0);
        assert_eq!(w[0].friction_slip, cfg.friction.front);
        assert_eq!(w[2].brake, cfg.friction.handbrake_brake);
        assert_eq!(w[3].friction_slip, cfg.friction.handbrake_rear);

        ctl.step(&ControlInput::default(), 1.0 / 60.0);
        let w = wheels(&ctl);
        assert!(w.iter().all(|w| w.brake == 0.0));
        assert_eq!(w[2].friction_slip, cfg.friction.rear);
        assert_eq!(w[1].friction_slip, cfg.friction.front);
    }

    #[test]
    fn turning_adds_damping_above_base_then_resets() {
        let mut ctl = attached();
        body(&mut ctl).linvel = Vector3::new(0.0, 0.0, -8.0);
        let left = ControlInput { steer_left: true, ..Default::default() };
        for _ in 0..10 {
            ctl.step(&left, 1.0 / 60.0);
        }
        let b = &ctl.chassis().unwrap().body;
        assert!(b.angular_damping() > b.base_angular_damping());

        ctl.step(&ControlInput::default(), 1.0 / 60.0);
        let b = &ctl.chassis().unwrap().body;
        assert_eq!(b.angular_damping(), b.base_angular_damping());
        assert_eq!(b.linear_damping(), b.base_linear_damping());
    }

    #[test]
    fn aero_is_silent_at_rest() {
        let mut ctl = attached();
        ctl.step(&ControlInput::default(), 1.0 / 60.0);
        let (f, t) = body(&mut ctl).take_forces();
        assert_eq!(f, Vector3::zeros());
        assert_eq!(t, Vector3::zeros());
    }

    #[test]
    fn aero_drags_at_speed() {
        let mut ctl = attached();
        body(&mut ctl).linvel = Vector3::new(0.0, 0.0, -50.0);
        ctl.step(&ControlInput::default(), 1.0 / 60.0);
        let (f, _) = body(&mut ctl).take_forces();
        // drag pushes back toward +Z, downforce beats lift
        assert!(f.z > 0.0);
        assert!(f.y < 0.0);
    }

    #[test]
    fn drift_enters_and_exits_within_one_tick() {
        let mut ctl = attached();
        {
            let b = body(&mut ctl);
            b.linvel = Vector3::new(12.0, 0.0, -38.0);
            b.angvel = Vector3::new(0.0, 1.0, 0.0);
        }
        let slide = ControlInput { handbrake: true, steer_left: true, ..Default::default() };
        ctl.step(&slide, 1.0 / 60.0);
        assert_eq!(ctl.drift_state(), DriftState::Drifting);
        assert_eq!(ctl.last_transition(), Some(DriftTransition::Entered));

        let release = ControlInput { steer_left: true, ..Default::default() };
        ctl.step(&release, 1.0 / 60.0);
        assert_eq!(ctl.drift_state(), DriftState::Normal);
        let cfg = ctl.config().clone();
        let w = wheels(&ctl);
        assert_eq!(w[2].friction_slip, cfg.friction.rear);
        assert_eq!(w[0].friction_slip, cfg.friction.front);
    }

    #[test]
    fn render_pose_converges_without_moving_physics() {
        let mut ctl = attached();
        body(&mut ctl).position = Vector3::new(10.0, 0.0, 0.0);
        ctl.step(&ControlInput::default(), 1.0 / 60.0);
        assert_eq!(ctl.render_pose().translation.vector.x, 0.0);
        ctl.sync_visuals();

        let x = ctl.render_pose().translation.vector.x;
        assert!((x - 8.0).abs() < 1e-4);
        assert_eq!(ctl.position().unwrap().x, 10.0);

        for _ in 0..20 {
            ctl.step(&ControlInput::default(), 1.0 / 60.0);
            ctl.sync_visuals();
        }
        assert!((ctl.render_pose().translation.vector.x - 10.0).abs() < 1e-3);
    }

    #[test]
    fn wheel_visuals_wait_for_the_solver_output() {
        let mut ctl = attached();
        ctl.chassis_mut().unwrap().wheels[0].center = Point3::new(1.0, 0.3, -1.5);
        ctl.step(&ControlInput { steer_left: true, ..Default::default() }, 1.0 / 60.0);
        assert_eq!(wheels(&ctl)[0].render, Isometry3::identity());

        ctl.sync_visuals();
        let w = &wheels(&ctl)[0];
        assert_eq!(w.render.translation.vector, Vector3::new(1.0, 0.3, -1.5));
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), w.steering_angle);
        assert!(w.render.rotation.angle_to(&expected) < 1e-5);
    }

    #[test]
    fn update_config_swaps_snapshot() {
        let mut ctl = attached();
        let next = ctl.config().patched(&crate::config::VehiclePatch {
            rear_friction: Some(2.0),
            ..Default::default()
        });
        ctl.update_config(next);
        ctl.step(&ControlInput::default(), 1.0 / 60.0);
        assert_eq!(wheels(&ctl)[3].friction_slip, 2.0);
    }

    #[test]
    fn reset_clears_motion_and_drift() {
        let mut ctl = attached();
        {
            let b = body(&mut ctl);
            b.linvel = Vector3::new(12.0, 0.0, -38.0);
            b.angvel = Vector3::new(0.0, 1.0, 0.0);
        }
        let slide = ControlInput { handbrake: true, ..Default::default() };
        ctl.step(&slide, 1.0 / 60.0);
        assert!(ctl.is_drifting());

        ctl.reset(Vector3::new(0.0, 2.0, 0.0));
        assert!(!ctl.is_drifting());
        assert_eq!(ctl.speed(), 0.0);
        assert_eq!(ctl.position(), Some(Vector3::new(0.0, 2.0, 0.0)));
        assert!(wheels(&ctl).iter().all(|w| w.brake == 0.0));
    }
}
