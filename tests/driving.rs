//! End-to-end driving scenarios against the rapier-backed `Simulation`.
//!
//! Each test builds the built-in car on flat ground, settles it on its
//! suspension, then drives it through the public API only.

use drift_physics::camera::CameraMode;
use drift_physics::config::{Config, SchedulerConfig};
use drift_physics::input::Action;
use drift_physics::scene::MeshData;
use drift_physics::simulation::Simulation;

// ============================================================================
// Helpers
// ============================================================================

fn spawn() -> Simulation {
    let mut sim = Simulation::new(&Config::default());
    let ticket = sim.begin_load();
    sim.attach_physics(ticket, MeshData::builtin_car())
        .expect("built-in car attaches");
    settle(&mut sim, 90);
    sim
}

fn settle(sim: &mut Simulation, ticks: usize) {
    for _ in 0..ticks {
        sim.step_fixed();
    }
}

fn yaw(sim: &Simulation) -> f32 {
    let q = sim.rotation().expect("attached");
    let f = q * nalgebra::Vector3::new(0.0, 0.0, -1.0);
    (-f.x).atan2(-f.z)
}

// ============================================================================
// Throttle
// ============================================================================

#[test]
fn throttle_from_rest_accelerates_every_tick() {
    let mut sim = spawn();
    assert!(sim.speed() < 0.2, "not settled: {}", sim.speed());

    sim.handle_key("w", true);
    let mut prev = sim.speed();
    for tick in 0..10 {
        sim.step_fixed();
        let now = sim.speed();
        assert!(now > prev, "tick {tick}: {now} <= {prev}");
        prev = now;
    }
}

#[test]
fn forward_is_minus_z_and_reverse_backs_up() {
    let mut sim = spawn();
    let z0 = sim.position().unwrap().z;

    sim.handle_key("ArrowUp", true);
    settle(&mut sim, 60);
    assert!(sim.position().unwrap().z < z0 - 0.5);
    sim.handle_key("ArrowUp", false);

    let mut sim = spawn();
    sim.handle_key("s", true);
    settle(&mut sim, 60);
    assert!(sim.position().unwrap().z > z0 + 0.2);
}

#[test]
fn blur_while_throttle_held_coasts_down() {
    let mut sim = spawn();
    sim.handle_key("w", true);
    settle(&mut sim, 60);
    let at_blur = sim.speed();

    sim.blur();
    assert!(!sim.input().is_pressed(Action::ThrottleForward));

    settle(&mut sim, 60);
    assert!(sim.speed() < at_blur);
}

#[test]
fn steering_left_turns_left() {
    let mut sim = spawn();
    sim.handle_key("w", true);
    settle(&mut sim, 60);

    sim.handle_key("a", true);
    settle(&mut sim, 60);
    assert!(yaw(&sim) > 0.05, "yaw = {}", yaw(&sim));
}

#[test]
fn handbrake_turn_at_speed_drifts_and_recovers() {
    let mut sim = spawn();
    sim.handle_key("w", true);
    settle(&mut sim, 360);
    assert!(sim.speed() > 12.0, "only reached {} m/s", sim.speed());

    sim.handle_key("w", false);
    sim.handle_key(" ", true);
    sim.handle_key("a", true);
    let mut entered = None;
    for tick in 0..180 {
        sim.step_fixed();
        if sim.is_drifting() {
            entered = Some(tick);
            break;
        }
    }
    assert!(entered.is_some(), "no drift; speed {} m/s", sim.speed());
    assert!(sim.debug_overlay().unwrap().drift.telemetry.threshold_crossed);

    // the handbrake alone vetoes the slide on the very next tick
    sim.handle_key(" ", false);
    sim.step_fixed();
    assert!(!sim.is_drifting());

    let cfg = Config::default().vehicle;
    let overlay = sim.debug_overlay().unwrap();
    for w in &overlay.wheels {
        assert_eq!(w.friction_slip, if w.id.starts_with('F') { cfg.friction.front } else { cfg.friction.rear });
    }
    assert_eq!(sim.reset_count(), 0);
    assert!(sim.position().unwrap().iter().all(|c| c.is_finite()));
}

#[test]
fn solver_speed_agrees_with_the_driving_direction() {
    let mut sim = spawn();
    sim.handle_key("w", true);
    settle(&mut sim, 60);
    assert!(sim.debug_overlay().unwrap().solver_speed > 0.5);
}

// ============================================================================
// Scheduler
// ============================================================================

#[test]
fn stalled_frame_runs_bounded_steps() {
    let mut sim = spawn();
    let before = sim.scheduler().total_steps();
    let steps = sim.frame(5.0);
    assert!(steps <= SchedulerConfig::default().max_steps_per_frame());
    assert_eq!(sim.scheduler().total_steps() - before, steps as u64);
    assert!(sim.scheduler().accumulator() < sim.scheduler().fixed_timestep());
}

#[test]
fn frames_drive_physics() {
    let mut sim = spawn();
    sim.handle_key("w", true);
    let mut steps = 0;
    for _ in 0..30 {
        steps += sim.frame(1.0 / 30.0);
    }
    assert!(steps >= 58 && steps <= 60);
    assert!(sim.speed() > 1.0);
}

// ============================================================================
// Reset, camera, teardown
// ============================================================================

#[test]
fn reset_returns_to_spawn_at_rest() {
    let mut sim = spawn();
    sim.handle_key("w", true);
    settle(&mut sim, 60);
    assert!(sim.speed() > 1.0);

    sim.handle_key("r", true);
    assert_eq!(sim.speed(), 0.0);
    let spawn = Config::default().vehicle.spawn_position;
    let p = sim.position().unwrap();
    assert!((p.x - spawn[0]).abs() < 1e-5 && (p.z - spawn[2]).abs() < 1e-5);
    assert!(!sim.is_drifting());
}

#[test]
fn camera_trails_the_car() {
    let mut sim = spawn();
    sim.handle_key("w", true);
    for _ in 0..120 {
        sim.frame(1.0 / 60.0);
    }
    let car = sim.position().unwrap();
    let cam = sim.camera().position();
    assert_eq!(sim.camera_mode(), CameraMode::Following);
    // facing -Z: the camera sits behind (+Z) and above
    assert!(cam.z > car.z);
    assert!(cam.y > car.y);
}

#[test]
fn disposed_simulation_stops_stepping() {
    let mut sim = spawn();
    sim.dispose();
    assert_eq!(sim.frame(0.5), 0);
    assert!(!sim.is_attached());
    assert!(sim.debug_overlay().is_none());
}
