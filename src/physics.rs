// ==============================================================================
// physics.rs — RIGID-BODY WORLD (rapier3d)
// ------------------------------------------------------------------------------
// The only place that talks to rapier. Owns the pipeline, the static ground and
// at most one raycast vehicle. Each fixed step:
//
//   1) push   wheel commands, accumulated forces, damping → rapier
//   2) solve  query pipeline refresh → vehicle raycasts → pipeline.step
//   3) pull   pose, velocities, raycast feedback → VehicleBody / Wheels
//
// The controller never sees a rapier handle; it works on the mirrors only.
// ==============================================================================

use crate::body::VehicleBody;
use crate::scene::Bounds;
use crate::wheel::{Wheels, WHEEL_COUNT};
use rapier3d::control::{DynamicRayCastVehicleController, WheelTuning};
use rapier3d::prelude::*;
use tracing::{debug, info};

const GROUP_GROUND: Group  = Group::GROUP_1;
const GROUP_CHASSIS: Group = Group::GROUP_2;

/// Anything past this distance from the origin is treated as blown up.
pub const WORLD_LIMIT: f32 = 1_000.0;

pub const GRAVITY: f32 = -9.81;

struct RaycastVehicle {
    chassis: RigidBodyHandle,
    controller: DynamicRayCastVehicleController,
    half_extents: Vector<Real>,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>, // gravity vector
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline, // wheel raycasts
    vehicle: Option<RaycastVehicle>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Static ground slab, top surface exactly at y = 0.
        let ground = bodies.insert(
            RigidBodyBuilder::fixed()
                .translation(vector![0.0, -0.1, 0.0])
                .build(),
        );
        let ground_collider = ColliderBuilder::cuboid(500.0, 0.1, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.0)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground, &mut bodies);

        debug!(bodies = bodies.len(), colliders = colliders.len(), "ground inserted");

        Self {
            gravity: vector![0.0, GRAVITY, 0.0],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            vehicle: None,
        }
    }

    pub fn has_vehicle(&self) -> bool {
        self.vehicle.is_some()
    }

    /// Chassis collider half extents of the attached vehicle.
    pub fn chassis_half_extents(&self) -> Option<Vector<Real>> {
        self.vehicle.as_ref().map(|v| v.half_extents)
    }

    /// Creates the chassis rigid body (box collider sized to `chassis`) and
    /// registers one raycast wheel per slot. Replaces any previous vehicle.
    pub fn attach_vehicle(&mut self, body: &VehicleBody, wheels: &Wheels, chassis: &Bounds) {
        self.detach_vehicle();

        let rb = RigidBodyBuilder::dynamic()
            .translation(body.position)
            .rotation(body.orientation.scaled_axis())
            .linvel(body.linvel)
            .angvel(body.angvel)
            .linear_damping(body.linear_damping())
            .angular_damping(body.angular_damping())
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(rb);

        let half = chassis.half_extents();
        let collider = ColliderBuilder::cuboid(half.x, half.y, half.z)
            .translation(chassis.center().coords)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .mass(body.mass)
            .friction(0.0) // wheels carry all the grip
            .restitution(0.0)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);

        let mut controller = DynamicRayCastVehicleController::new(handle);
        // Chassis +Z is the solver's forward axis, but the car drives toward -Z
        // (wheel forward = contact normal x axle). `current_vehicle_speed` is
        // therefore negated on the way out; see `solver_forward_speed`.
        controller.index_up_axis = 1;
        controller.index_forward_axis = 2;

        for w in wheels.iter() {
            let tuning = WheelTuning {
                suspension_stiffness: w.suspension_stiffness,
                suspension_compression: w.damping_compression,
                suspension_damping: w.damping_relaxation,
                max_suspension_travel: w.max_suspension_travel,
                friction_slip: w.friction_slip,
                max_suspension_force: w.max_suspension_force,
                ..WheelTuning::default()
            };
            controller.add_wheel(
                w.chassis_connection_point,
                -Vector::y(),
                Vector::x(),
                w.suspension_rest_length,
                w.radius,
                &tuning,
            );
        }

        info!(
            mass = body.mass,
            half_extents = ?[half.x, half.y, half.z],
            wheels = WHEEL_COUNT,
            "vehicle attached"
        );

        self.vehicle = Some(RaycastVehicle { chassis: handle, controller, half_extents: half });
    }

    pub fn detach_vehicle(&mut self) {
        let Some(v) = self.vehicle.take() else { return };
        self.bodies.remove(
            v.chassis,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        debug!("vehicle detached");
    }

    /// Signed chassis speed as the raycast solver saw it at the start of the
    /// last step, m/s, positive toward -Z (the driving direction).
    pub fn solver_forward_speed(&self) -> Option<Real> {
        self.vehicle.as_ref().map(|v| -v.controller.current_vehicle_speed)
    }

    /// Teleports the chassis to the mirror's pose and velocities.
    pub fn place_vehicle(&mut self, body: &VehicleBody) {
        let Some(v) = self.vehicle.as_ref() else { return };
        if let Some(rb) = self.bodies.get_mut(v.chassis) {
            rb.set_position(body.isometry(), true);
            rb.set_linvel(body.linvel, true);
            rb.set_angvel(body.angvel, true);
            rb.reset_forces(true);
            rb.reset_torques(true);
        }
    }

    /// Copies rapier state into the mirrors without stepping.
    pub fn pull(&self, body: &mut VehicleBody, wheels: &mut Wheels) {
        let Some(v) = self.vehicle.as_ref() else { return };
        if let Some(rb) = self.bodies.get(v.chassis) {
            body.position = *rb.translation();
            body.orientation = *rb.rotation();
            body.linvel = *rb.linvel();
            body.angvel = *rb.angvel();
        }
        for (state, wheel) in wheels.iter_mut().zip(v.controller.wheels()) {
            let ray = wheel.raycast_info();
            state.suspension_length = ray.suspension_length;
            state.in_contact = ray.is_in_contact;
            state.side_impulse = wheel.side_impulse;
            state.forward_impulse = wheel.forward_impulse;
            state.rotation = wheel.rotation;
            state.center = wheel.center();
        }
    }

    fn push(&mut self, body: &mut VehicleBody, wheels: &Wheels) {
        let Some(v) = self.vehicle.as_mut() else { return };

        for (wheel, cmd) in v.controller.wheels_mut().iter_mut().zip(wheels.iter()) {
            wheel.steering = cmd.steering_angle;
            wheel.engine_force = cmd.engine_force;
            wheel.brake = cmd.brake;
            wheel.friction_slip = cmd.friction_slip;
        }

        // rapier user forces persist across steps; re-seed them every tick
        let (force, torque) = body.take_forces();
        if let Some(rb) = self.bodies.get_mut(v.chassis) {
            rb.reset_forces(false);
            rb.reset_torques(false);
            rb.add_force(force, true);
            rb.add_torque(torque, true);
            rb.set_linear_damping(body.linear_damping());
            rb.set_angular_damping(body.angular_damping());
        }
    }

    /// One fixed step. Without a vehicle only the world advances.
    pub fn step(&mut self, dt: Real, body: &mut VehicleBody, wheels: &mut Wheels) {
        self.push(body, wheels);

        // Wheel rays need current collider positions before the first solve.
        self.query_pipeline.update(&self.colliders);
        if let Some(v) = self.vehicle.as_mut() {
            v.controller.update_vehicle(
                dt,
                &mut self.bodies,
                &self.colliders,
                &self.query_pipeline,
                QueryFilter::default().exclude_rigid_body(v.chassis),
            );
        }

        self.step_world(dt);
        self.pull(body, wheels);
    }

    pub fn step_world(&mut self, dt: Real) {
        let hooks = ();
        let events = ();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &events,
        );
    }
}

/// True when the chassis has gone non-finite or left the playable volume.
pub fn out_of_bounds(body: &VehicleBody) -> bool {
    !body.is_finite() || body.position.iter().any(|c| c.abs() > WORLD_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleConfig;
    use crate::scene::MeshData;
    use crate::wheel::{build_wheels, discover_wheel_mounts};
    use nalgebra::Vector3;

    fn spawn() -> (PhysicsWorld, VehicleBody, Wheels) {
        let cfg = VehicleConfig::default();
        let mesh = MeshData::builtin_car();
        let mounts = discover_wheel_mounts(&mesh).unwrap();
        let wheels = build_wheels(&mounts, &cfg.suspension, &cfg.friction);
        let bounds = mesh.mesh_bounds(crate::wheel::is_wheel_node).unwrap();
        let body = VehicleBody::new(cfg.mass, cfg.damping.base_linear, cfg.damping.base_angular)
            .at(Vector3::from(cfg.spawn_position));

        let mut world = PhysicsWorld::new();
        world.attach_vehicle(&body, &wheels, &bounds);
        (world, body, wheels)
    }

    #[test]
    fn chassis_settles_on_its_wheels() {
        let (mut world, mut body, mut wheels) = spawn();
        for _ in 0..120 {
            world.step(1.0 / 60.0, &mut body, &mut wheels);
        }
        assert!(wheels.iter().all(|w| w.in_contact));
        assert!(body.position.y > 0.3 && body.position.y < 1.0);
        assert!(body.speed() < 0.5);
    }

    #[test]
    fn forces_do_not_leak_into_the_next_step() {
        let (mut world, mut body, mut wheels) = spawn();
        body.apply_force(Vector3::new(0.0, 0.0, -50_000.0));
        world.step(1.0 / 60.0, &mut body, &mut wheels);
        let after_push = body.linvel.z;
        assert!(after_push < 0.0);

        assert_eq!(body.pending_force(), Vector3::zeros());

        // with nothing re-applied the big push must not repeat
        for _ in 0..5 {
            world.step(1.0 / 60.0, &mut body, &mut wheels);
        }
        assert!(body.linvel.z > after_push - 1.0);
    }

    #[test]
    fn solver_speed_is_positive_when_driving_forward() {
        let (mut world, mut body, mut wheels) = spawn();
        for _ in 0..60 {
            world.step(1.0 / 60.0, &mut body, &mut wheels);
        }
        for _ in 0..3 {
            body.apply_force(Vector3::new(0.0, 0.0, -40_000.0));
            world.step(1.0 / 60.0, &mut body, &mut wheels);
        }
        assert!(body.linvel.z < -0.5);
        let speed = world.solver_forward_speed().unwrap();
        assert!(speed > 0.5, "solver speed = {speed}");

        for _ in 0..3 {
            body.apply_force(Vector3::new(0.0, 0.0, 80_000.0));
            world.step(1.0 / 60.0, &mut body, &mut wheels);
        }
        assert!(body.linvel.z > 0.5);
        assert!(world.solver_forward_speed().unwrap() < 0.0);
    }

    #[test]
    fn detach_removes_the_chassis() {
        let (mut world, _, _) = spawn();
        assert_eq!(world.bodies.len(), 2);
        world.detach_vehicle();
        assert!(!world.has_vehicle());
        assert_eq!(world.bodies.len(), 1);
    }

    #[test]
    fn out_of_bounds_catches_nan_and_distance() {
        let mut body = VehicleBody::new(800.0, 0.1, 0.5);
        assert!(!out_of_bounds(&body));
        body.position.x = 2_000.0;
        assert!(out_of_bounds(&body));
        body.position.x = 0.0;
        body.linvel.y = f32::NAN;
        assert!(out_of_bounds(&body));
    }
}
