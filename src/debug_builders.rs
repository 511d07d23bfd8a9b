// ==============================================================================
// debug_builders.rs — DEBUG OVERLAY PRIMITIVES (SERVER -> CLIENT)
// ------------------------------------------------------------------------------
// Serializable debug primitives:
// - DebugChassis: physics pose + collider half extents
// - DebugRay: suspension raycasts (hard point → contact)
// - DebugWheel: per-wheel numeric state (grounded, compression, friction...)
// - DebugDrift: drift flag plus the in-state correction scalars
//
// build_overlay() assembles everything from one synced chassis. This file is
// purely visualization scaffolding and has no physics side effects.
// ==============================================================================

use crate::body::VehicleBody;
use crate::config::KMH_PER_MPS;
use crate::drift::{DriftState, DriftTelemetry};
use crate::wheel::{WheelState, Wheels};
use nalgebra::{Point3, Vector3};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugOverlay {
    pub chassis: Option<DebugChassis>,
    pub suspension_rays: Vec<DebugRay>,
    pub wheels: Vec<DebugWheel>,
    pub drift: DebugDrift,
    pub speed_kmh: f32,
    pub solver_speed: f32,          // m/s along the driving direction, as the raycast solver saw it
    pub steer_angle: f32,
    pub chassis_right: [f32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugChassis {
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion x, y, z, w
    pub half_extents: [f32; 3],
    pub linear_damping: f32,
    pub angular_damping: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugRay {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    pub length: f32,
    pub hit: Option<[f32; 3]>,
    pub color: [f32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugWheel {
    pub id: &'static str,           // "FL", "FR", "RL", "RR"

    pub center: [f32; 3],           // in world space
    pub radius: f32,
    pub grounded: bool,
    pub compression: f32,           // rest - current, m
    pub steer: f32,
    pub engine_force: f32,
    pub brake: f32,
    pub friction_slip: f32,
    pub side_impulse: f32,
    pub forward_impulse: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugDrift {
    pub state: DriftState,
    #[serde(flatten)]
    pub telemetry: DriftTelemetry,
}

const RAY_GROUNDED: [f32; 3] = [0.2, 0.9, 0.2];
const RAY_AIRBORNE: [f32; 3] = [0.9, 0.2, 0.2];

#[inline] fn v3(v: Vector3<f32>) -> [f32; 3] { [v.x, v.y, v.z] }
#[inline] fn p3(p: Point3<f32>)  -> [f32; 3] { [p.x, p.y, p.z] }

pub fn build_wheel_ray(body: &VehicleBody, wheel: &WheelState) -> DebugRay {
    let origin = body.isometry() * wheel.chassis_connection_point;
    let direction = -body.up();
    let reach = wheel.suspension_length + wheel.radius;
    let max = wheel.suspension_rest_length + wheel.radius;

    DebugRay {
        origin: p3(origin),
        direction: v3(direction),
        length: if wheel.in_contact { reach } else { max },
        hit: wheel.in_contact.then(|| p3(origin + direction * reach)),
        color: if wheel.in_contact { RAY_GROUNDED } else { RAY_AIRBORNE },
    }
}

pub fn push_wheel_debug(overlay: &mut DebugOverlay, wheel: &WheelState) {
    overlay.wheels.push(DebugWheel {
        id: wheel.slot.as_str(),
        center: p3(wheel.center),
        radius: wheel.radius,
        grounded: wheel.in_contact,
        compression: wheel.suspension_rest_length - wheel.suspension_length,
        steer: wheel.steering_angle,
        engine_force: wheel.engine_force,
        brake: wheel.brake,
        friction_slip: wheel.friction_slip,
        side_impulse: wheel.side_impulse,
        forward_impulse: wheel.forward_impulse,
    });
}

pub fn build_overlay(
    body: &VehicleBody,
    wheels: &Wheels,
    half_extents: Vector3<f32>,
    drift: DebugDrift,
    steer_angle: f32,
) -> DebugOverlay {
    let q = body.orientation.coords;
    let mut overlay = DebugOverlay {
        chassis: Some(DebugChassis {
            position: v3(body.position),
            rotation: [q.x, q.y, q.z, q.w],
            half_extents: v3(half_extents),
            linear_damping: body.linear_damping(),
            angular_damping: body.angular_damping(),
        }),
        drift,
        speed_kmh: body.speed() * KMH_PER_MPS,
        steer_angle,
        chassis_right: v3(body.right()),
        ..DebugOverlay::default()
    };

    for wheel in wheels {
        overlay.suspension_rays.push(build_wheel_ray(body, wheel));
        push_wheel_debug(&mut overlay, wheel);
    }
    overlay
}
