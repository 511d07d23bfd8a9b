// ==============================================================================
// simulation.rs — ONE VEHICLE, ONE WORLD, ONE CAMERA
// ------------------------------------------------------------------------------
// Per frame:
//   scheduler.advance(frame_delta) → [ input snapshot → controller.step(dt)
//                                      → world.step(dt) → visuals ]*
//   → camera.update(vehicle pose)
//
// Vehicle lifecycle is two-phase:
//   1) begin_load()             hands out a ticket for the current generation
//   2) attach_physics(ticket)   builds wheels + chassis from the loaded mesh
// dispose() bumps the generation and closes the scheduler gate, so a load that
// resolves afterwards is recognised as stale and dropped.
// ==============================================================================

use crate::body::VehicleBody;
use crate::camera::{CameraMode, CameraPose, ChaseCamera};
use crate::config::{Config, VehicleConfig, VehiclePatch};
use crate::controller::VehicleController;
use crate::debug_builders::{build_overlay, DebugDrift, DebugOverlay};
use crate::error::{ConfigError, VehicleError};
use crate::input::{ControlInput, InputState};
use crate::physics::{out_of_bounds, PhysicsWorld};
use crate::scene::{MeshData, MeshSource};
use crate::scheduler::PhysicsScheduler;
use crate::wheel::{build_wheels, discover_wheel_mounts, is_wheel_node};
use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use tracing::{error, info, warn};

pub const RESET_KEY: &str = "r";
pub const CAMERA_KEY: &str = "c";

/// Proof that an attach belongs to the load that was started last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

pub struct Simulation {
    input: InputState,
    controller: VehicleController,
    world: PhysicsWorld,
    camera: ChaseCamera,
    scheduler: PhysicsScheduler,
    spawn: Vector3<f32>,
    generation: u64,
    disposed: bool,
    resets: u64,
}

impl Simulation {
    pub fn new(config: &Config) -> Self {
        Self {
            input: InputState::new(),
            controller: VehicleController::new(config.vehicle.clone()),
            world: PhysicsWorld::new(),
            camera: ChaseCamera::new(config.camera),
            scheduler: PhysicsScheduler::new(config.scheduler),
            spawn: Vector3::from(config.vehicle.spawn_position),
            generation: 0,
            disposed: false,
            resets: 0,
        }
    }

    // --------------------------------------------------------------
    // Lifecycle
    // --------------------------------------------------------------

    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket { generation: self.generation }
    }

    /// Phase two. Stale tickets and disposed simulations are rejected before
    /// any state is touched; configuration errors leave the vehicle without a
    /// body.
    pub fn attach_physics(&mut self, ticket: LoadTicket, mesh: MeshData) -> Result<(), VehicleError> {
        if self.disposed || ticket.generation != self.generation {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                disposed = self.disposed,
                "discarding stale vehicle load"
            );
            return Err(VehicleError::Disposed);
        }

        match self.build_vehicle(&mesh) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "vehicle configuration error; no physics body attached");
                Err(e)
            }
        }
    }

    /// Both phases back to back, for callers that own the simulation outright.
    pub async fn load<S: MeshSource + ?Sized>(&mut self, source: &S) -> Result<(), VehicleError> {
        let ticket = self.begin_load();
        let mesh = source.load().await?;
        self.attach_physics(ticket, mesh)
    }

    fn build_vehicle(&mut self, mesh: &MeshData) -> Result<(), VehicleError> {
        let config = self.controller.config().clone();
        let mounts = discover_wheel_mounts(mesh)?;
        let chassis = mesh.mesh_bounds(is_wheel_node).ok_or(VehicleError::MissingChassis)?;

        let wheels = build_wheels(&mounts, &config.suspension, &config.friction);
        let body = VehicleBody::new(config.mass, config.damping.base_linear, config.damping.base_angular)
            .at(self.spawn);

        self.world.attach_vehicle(&body, &wheels, &chassis);
        self.camera.snap_to(&body.position, body.yaw());
        self.controller.attach(body, wheels);

        let names: Vec<String> = mounts.iter().map(|m| format!("{}={}", m.slot, m.name)).collect();
        info!(wheels = ?names, "vehicle ready");
        Ok(())
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.generation += 1;
        self.scheduler.dispose();
        self.input.disable();
        self.controller.detach();
        self.world.detach_vehicle();
        info!("simulation disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_attached(&self) -> bool {
        self.controller.is_attached()
    }

    // --------------------------------------------------------------
    // Frame
    // --------------------------------------------------------------

    /// Advances physics by however many fixed steps `frame_delta` allows,
    /// then moves the camera. Returns the number of fixed steps.
    pub fn frame(&mut self, frame_delta: f32) -> usize {
        let Self { input, controller, world, scheduler, spawn, resets, .. } = self;

        let steps = scheduler.advance(frame_delta, |dt| {
            let snapshot = input.snapshot();
            fixed_tick(controller, world, &snapshot, dt, spawn, resets);
        });

        if let Some(c) = self.controller.chassis() {
            self.camera.update(&c.body.position, c.body.yaw());
        }
        steps
    }

    /// Runs exactly one fixed step regardless of the accumulator.
    pub fn step_fixed(&mut self) {
        if self.disposed {
            return;
        }
        let dt = self.scheduler.fixed_timestep();
        let snapshot = self.input.snapshot();
        fixed_tick(&mut self.controller, &mut self.world, &snapshot, dt, &self.spawn, &mut self.resets);
        if let Some(c) = self.controller.chassis() {
            self.camera.update(&c.body.position, c.body.yaw());
        }
    }

    // --------------------------------------------------------------
    // Input
    // --------------------------------------------------------------

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Driving keys go to `InputState`; `r` resets the car and `c` toggles the
    /// camera on key-down. Returns false for keys with no binding.
    pub fn handle_key(&mut self, key: &str, down: bool) -> bool {
        if key.eq_ignore_ascii_case(RESET_KEY) {
            if down {
                self.reset_vehicle();
            }
            return true;
        }
        if key.eq_ignore_ascii_case(CAMERA_KEY) {
            if down {
                self.camera.toggle();
            }
            return true;
        }
        if down { self.input.key_down(key) } else { self.input.key_up(key) }
    }

    pub fn blur(&mut self) {
        self.input.disable();
    }

    pub fn focus(&mut self) {
        self.input.enable();
    }

    // --------------------------------------------------------------
    // Vehicle
    // --------------------------------------------------------------

    pub fn reset_vehicle(&mut self) {
        reset_chassis(&mut self.controller, &mut self.world, &self.spawn);
        self.resets += 1;
        if let Some(c) = self.controller.chassis() {
            self.camera.snap_to(&c.body.position, c.body.yaw());
        }
    }

    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    /// Validates and installs a new tuning snapshot built from `patch`.
    pub fn update_config(&mut self, patch: &VehiclePatch) -> Result<(), ConfigError> {
        let next = self.controller.config().patched(patch);
        next.validate()?;
        self.controller.update_config(next);
        Ok(())
    }

    pub fn vehicle_config(&self) -> &VehicleConfig {
        self.controller.config()
    }

    // --------------------------------------------------------------
    // Queries
    // --------------------------------------------------------------

    /// Horizontal speed, m/s.
    pub fn speed(&self) -> f32 {
        self.controller.speed()
    }

    pub fn position(&self) -> Option<Vector3<f32>> {
        self.controller.position()
    }

    pub fn rotation(&self) -> Option<UnitQuaternion<f32>> {
        self.controller.rotation()
    }

    pub fn render_pose(&self) -> Isometry3<f32> {
        self.controller.render_pose()
    }

    pub fn is_drifting(&self) -> bool {
        self.controller.is_drifting()
    }

    pub fn controller(&self) -> &VehicleController {
        &self.controller
    }

    pub fn scheduler(&self) -> &PhysicsScheduler {
        &self.scheduler
    }

    pub fn camera(&self) -> &ChaseCamera {
        &self.camera
    }

    pub fn camera_mode(&self) -> CameraMode {
        self.camera.mode()
    }

    pub fn camera_pose(&self) -> CameraPose {
        self.camera.pose()
    }

    pub fn orbit_camera(&mut self, delta_yaw: f32, delta_pitch: f32, zoom: f32) {
        self.camera.orbit(delta_yaw, delta_pitch, zoom);
    }

    pub fn toggle_camera(&mut self) -> CameraMode {
        self.camera.toggle()
    }

    pub fn debug_overlay(&self) -> Option<DebugOverlay> {
        let c = self.controller.chassis()?;
        let half = self.world.chassis_half_extents()?;
        let drift = DebugDrift {
            state: self.controller.drift_state(),
            telemetry: self.controller.drift_telemetry(),
        };
        let mut overlay = build_overlay(&c.body, &c.wheels, half, drift, self.controller.steer_angle());
        overlay.solver_speed = self.world.solver_forward_speed().unwrap_or(0.0);
        Some(overlay)
    }
}

fn fixed_tick(
    controller: &mut VehicleController,
    world: &mut PhysicsWorld,
    input: &ControlInput,
    dt: f32,
    spawn: &Vector3<f32>,
    resets: &mut u64,
) {
    controller.step(input, dt);
    let Some(c) = controller.chassis_mut() else { return };
    world.step(dt, &mut c.body, &mut c.wheels);

    if out_of_bounds(&c.body) {
        warn!(position = ?c.body.position, "vehicle left the world; resetting");
        reset_chassis(controller, world, spawn);
        *resets += 1;
    }
    controller.sync_visuals();
}

fn reset_chassis(controller: &mut VehicleController, world: &mut PhysicsWorld, spawn: &Vector3<f32>) {
    controller.reset(*spawn);
    if let Some(c) = controller.chassis() {
        world.place_vehicle(&c.body);
    }
}
