// ==============================================================================
// wheel.rs — WHEEL MODEL + MOUNT DISCOVERY
// ------------------------------------------------------------------------------
// Exactly four wheels per vehicle. Slots 0-1 are front (steerable), 2-3 are
// rear (drive bias + handbrake). The drift logic indexes these slots directly,
// so any other wheel count is a fatal configuration error.
//
// Per tick the controller writes the command half of `WheelState` (steering,
// engine force, brake, friction) and the solver writes back the raycast half
// (suspension length, contact, impulses, center, rolling angle).
// ==============================================================================

use crate::config::{FrictionConfig, SuspensionConfig};
use crate::error::VehicleError;
use crate::scene::{MeshData, SceneNode, Visit};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::Serialize;
use std::fmt;

pub const WHEEL_COUNT: usize = 4;

/// Chassis-local forward axis. Up is +Y, right is +X.
pub const FORWARD_LOCAL: Vector3<f32> = Vector3::new(0.0, 0.0, -1.0);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum WheelSlot {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelSlot {
    pub const ALL: [WheelSlot; WHEEL_COUNT] = [
        WheelSlot::FrontLeft,
        WheelSlot::FrontRight,
        WheelSlot::RearLeft,
        WheelSlot::RearRight,
    ];

    pub fn index(self) -> usize {
        match self {
            WheelSlot::FrontLeft => 0,
            WheelSlot::FrontRight => 1,
            WheelSlot::RearLeft => 2,
            WheelSlot::RearRight => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WheelSlot::FrontLeft => "FL",
            WheelSlot::FrontRight => "FR",
            WheelSlot::RearLeft => "RL",
            WheelSlot::RearRight => "RR",
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, WheelSlot::FrontLeft | WheelSlot::FrontRight)
    }

    fn from_sides(front: bool, left: bool) -> Self {
        match (front, left) {
            (true, true) => WheelSlot::FrontLeft,
            (true, false) => WheelSlot::FrontRight,
            (false, true) => WheelSlot::RearLeft,
            (false, false) => WheelSlot::RearRight,
        }
    }
}

impl fmt::Display for WheelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelState {
    pub slot: WheelSlot,
    pub is_front_wheel: bool,

    // --- tuning (fixed after attach) ---
    pub radius: f32,
    pub suspension_rest_length: f32,
    pub suspension_stiffness: f32,
    pub damping_compression: f32,
    pub damping_relaxation: f32,
    pub roll_influence: f32,
    pub max_suspension_travel: f32,
    pub max_suspension_force: f32,
    #[serde(skip)]
    pub chassis_connection_point: Point3<f32>, // chassis-local

    // --- commands (controller → solver) ---
    pub steering_angle: f32,  // rad, +left; always 0 on the rear axle
    pub engine_force: f32,    // N, + forward
    pub brake: f32,           // impulse cap
    pub friction_slip: f32,

    // --- raycast feedback (solver → controller) ---
    pub suspension_length: f32,
    pub in_contact: bool,
    pub side_impulse: f32,
    pub forward_impulse: f32,
    pub rotation: f32,        // rolling angle about the axle
    #[serde(skip)]
    pub center: Point3<f32>,  // world

    #[serde(skip)]
    pub render: Isometry3<f32>, // world pose for the wheel model
}

impl WheelState {
    pub fn new(
        slot: WheelSlot,
        connection: Point3<f32>,
        suspension: &SuspensionConfig,
        friction: &FrictionConfig,
    ) -> Self {
        let is_front_wheel = slot.is_front();
        Self {
            slot,
            is_front_wheel,
            radius: suspension.radius,
            suspension_rest_length: suspension.rest_length,
            suspension_stiffness: suspension.stiffness,
            damping_compression: suspension.damping_compression,
            damping_relaxation: suspension.damping_relaxation,
            roll_influence: suspension.roll_influence,
            max_suspension_travel: suspension.max_travel,
            max_suspension_force: suspension.max_force,
            chassis_connection_point: connection,
            steering_angle: 0.0,
            engine_force: 0.0,
            brake: 0.0,
            friction_slip: if is_front_wheel { friction.front } else { friction.rear },
            suspension_length: suspension.rest_length,
            in_contact: false,
            side_impulse: 0.0,
            forward_impulse: 0.0,
            rotation: 0.0,
            center: connection - Vector3::y() * suspension.rest_length,
            render: Isometry3::identity(),
        }
    }

    /// World pose of the wheel model: chassis rotation, then steering yaw,
    /// then rolling pitch. Rear wheels never get a steering yaw.
    pub fn visual_pose(&self, chassis_rotation: &UnitQuaternion<f32>) -> Isometry3<f32> {
        let steer = if self.is_front_wheel {
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.steering_angle)
        } else {
            UnitQuaternion::identity()
        };
        let roll = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.rotation);
        Isometry3::from_parts(
            Translation3::from(self.center.coords),
            chassis_rotation * steer * roll,
        )
    }
}

pub type Wheels = [WheelState; WHEEL_COUNT];

pub fn build_wheels(
    mounts: &[WheelMount; WHEEL_COUNT],
    suspension: &SuspensionConfig,
    friction: &FrictionConfig,
) -> Wheels {
    std::array::from_fn(|i| WheelState::new(mounts[i].slot, mounts[i].offset, suspension, friction))
}

/// Puts every wheel back on its normal friction constant. Brakes are untouched.
pub fn restore_friction(wheels: &mut Wheels, friction: &FrictionConfig) {
    for w in wheels.iter_mut() {
        w.friction_slip = if w.is_front_wheel { friction.front } else { friction.rear };
    }
}

// ------------------------------------------------------------------
// Mount discovery
// ------------------------------------------------------------------

const WHEEL_TOKENS: [&str; 5] = ["wheel", "roue", "tire", "tyre", "pneu"];
const FRONT_TOKENS: [&str; 2] = ["front", "avant"];
const BACK_TOKENS: [&str; 4] = ["back", "rear", "arriere", "arrière"];
const LEFT_TOKENS: [&str; 2] = ["left", "gauche"];
const RIGHT_TOKENS: [&str; 2] = ["right", "droit"];

#[derive(Debug, Clone, PartialEq)]
pub struct WheelMount {
    pub slot: WheelSlot,
    pub name: String,
    pub offset: Point3<f32>, // chassis-local
}

pub fn is_wheel_node(node: &SceneNode) -> bool {
    let name = node.name.to_lowercase();
    WHEEL_TOKENS.iter().any(|t| name.contains(t))
}

/// Slot implied by the node name, if it names both an axle and a side.
pub fn slot_from_name(name: &str) -> Option<WheelSlot> {
    let name = name.to_lowercase();
    let has = |tokens: &[&str]| tokens.iter().any(|t| name.contains(t));

    let front = match (has(&FRONT_TOKENS), has(&BACK_TOKENS)) {
        (true, false) => true,
        (false, true) => false,
        _ => return None,
    };
    let left = match (has(&LEFT_TOKENS), has(&RIGHT_TOKENS)) {
        (true, false) => true,
        (false, true) => false,
        _ => return None,
    };
    Some(WheelSlot::from_sides(front, left))
}

/// Finds the four wheel mounts in a loaded vehicle, ordered by slot.
pub fn discover_wheel_mounts(mesh: &MeshData) -> Result<[WheelMount; WHEEL_COUNT], VehicleError> {
    let mut found: Vec<(String, Point3<f32>)> = Vec::new();
    mesh.root.walk(&mut |node: &SceneNode, to_root: &Isometry3<f32>| {
        if is_wheel_node(node) {
            found.push((node.name.clone(), Point3::from(to_root.translation.vector)));
            Visit::SkipChildren
        } else {
            Visit::Continue
        }
    });

    if found.len() != WHEEL_COUNT {
        return Err(VehicleError::WheelCount { found: found.len() });
    }

    if found.iter().all(|(name, _)| slot_from_name(name).is_some()) {
        return assign_by_name(found);
    }
    assign_by_position(found)
}

fn assign_by_name(
    found: Vec<(String, Point3<f32>)>,
) -> Result<[WheelMount; WHEEL_COUNT], VehicleError> {
    let mut slots: [Option<WheelMount>; WHEEL_COUNT] = Default::default();
    for (name, offset) in found {
        let Some(slot) = slot_from_name(&name) else { continue };
        let entry = &mut slots[slot.index()];
        if entry.is_some() {
            return Err(VehicleError::AmbiguousWheel { slot: slot.as_str(), name });
        }
        *entry = Some(WheelMount { slot, name, offset });
    }

    let filled = slots.iter().filter(|s| s.is_some()).count();
    let [Some(fl), Some(fr), Some(rl), Some(rr)] = slots else {
        return Err(VehicleError::WheelCount { found: filled });
    };
    Ok([fl, fr, rl, rr])
}

/// Front = larger coordinate along the forward axis, left = smaller x.
fn assign_by_position(
    mut found: Vec<(String, Point3<f32>)>,
) -> Result<[WheelMount; WHEEL_COUNT], VehicleError> {
    let forward = |p: &Point3<f32>| p.coords.dot(&FORWARD_LOCAL);
    found.sort_by(|a, b| forward(&b.1).total_cmp(&forward(&a.1)));

    let (front, rear) = found.split_at_mut(2);
    front.sort_by(|a, b| a.1.x.total_cmp(&b.1.x));
    rear.sort_by(|a, b| a.1.x.total_cmp(&b.1.x));

    let count = found.len();
    let mounts: Vec<WheelMount> = found
        .into_iter()
        .zip(WheelSlot::ALL)
        .map(|((name, offset), slot)| WheelMount { slot, name, offset })
        .collect();
    mounts.try_into().map_err(|_| VehicleError::WheelCount { found: count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeTransform;

    fn car_with(wheels: Vec<SceneNode>) -> MeshData {
        let mut children = vec![SceneNode::mesh("body", NodeTransform::default(), [0.9, 0.3, 2.0])];
        children.extend(wheels);
        MeshData { root: SceneNode::group("car", NodeTransform::default(), children) }
    }

    fn wheel(name: &str, at: [f32; 3]) -> SceneNode {
        SceneNode::group(
            name,
            NodeTransform::at(at),
            vec![SceneNode::mesh("tire", NodeTransform::default(), [0.1, 0.3, 0.3])],
        )
    }

    #[test]
    fn names_resolve_in_english_and_french() {
        assert_eq!(slot_from_name("Wheel_Front_Left"), Some(WheelSlot::FrontLeft));
        assert_eq!(slot_from_name("ROUE_AVANT_DROITE"), Some(WheelSlot::FrontRight));
        assert_eq!(slot_from_name("roue-arrière-gauche"), Some(WheelSlot::RearLeft));
        assert_eq!(slot_from_name("RearRightTire"), Some(WheelSlot::RearRight));
        assert_eq!(slot_from_name("wheel.003"), None);
        assert_eq!(slot_from_name("wheel_front"), None);
    }

    #[test]
    fn builtin_car_mounts_by_name() {
        let mounts = discover_wheel_mounts(&MeshData::builtin_car()).unwrap();
        for (i, m) in mounts.iter().enumerate() {
            assert_eq!(m.slot.index(), i);
        }
        assert_eq!(mounts[0].offset, Point3::new(-0.8, -0.1, -1.4));
        assert_eq!(mounts[3].offset, Point3::new(0.8, -0.1, 1.4));
    }

    #[test]
    fn unnamed_wheels_fall_back_to_position() {
        let mesh = car_with(vec![
            wheel("wheel.000", [0.8, -0.1, 1.4]),
            wheel("wheel.001", [-0.8, -0.1, -1.4]),
            wheel("wheel.002", [-0.8, -0.1, 1.4]),
            wheel("wheel.003", [0.8, -0.1, -1.4]),
        ]);
        let mounts = discover_wheel_mounts(&mesh).unwrap();
        assert_eq!(mounts[0].name, "wheel.001");
        assert_eq!(mounts[1].name, "wheel.003");
        assert_eq!(mounts[2].name, "wheel.002");
        assert_eq!(mounts[3].name, "wheel.000");
    }

    #[test]
    fn wrong_wheel_count_is_fatal() {
        let mesh = car_with(vec![
            wheel("wheel_front_left", [-0.8, 0.0, -1.4]),
            wheel("wheel_front_right", [0.8, 0.0, -1.4]),
            wheel("wheel_rear_left", [-0.8, 0.0, 1.4]),
        ]);
        let err = discover_wheel_mounts(&mesh).unwrap_err();
        assert!(matches!(err, VehicleError::WheelCount { found: 3 }));
    }

    #[test]
    fn duplicate_slot_is_rejected() {
        let mesh = car_with(vec![
            wheel("wheel_front_left", [-0.8, 0.0, -1.4]),
            wheel("roue_avant_gauche", [0.8, 0.0, -1.4]),
            wheel("wheel_rear_left", [-0.8, 0.0, 1.4]),
            wheel("wheel_rear_right", [0.8, 0.0, 1.4]),
        ]);
        let err = discover_wheel_mounts(&mesh).unwrap_err();
        assert!(matches!(err, VehicleError::AmbiguousWheel { slot: "FL", .. }));
    }

    #[test]
    fn visual_pose_applies_steering_before_roll_on_front_only() {
        let mut front = WheelState::new(
            WheelSlot::FrontLeft,
            Point3::origin(),
            &SuspensionConfig::default(),
            &FrictionConfig::default(),
        );
        front.steering_angle = 0.4;
        front.rotation = 1.0;
        let mut rear = front.clone();
        rear.slot = WheelSlot::RearLeft;
        rear.is_front_wheel = false;

        let id = UnitQuaternion::identity();
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.4)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 1.0);
        assert!(front.visual_pose(&id).rotation.angle_to(&expected) < 1e-5);

        let rolled_only = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 1.0);
        assert!(rear.visual_pose(&id).rotation.angle_to(&rolled_only) < 1e-5);
    }
}
