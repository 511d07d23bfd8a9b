// ==============================================================================
// camera.rs — CHASE CAMERA (FOLLOWING / ORBITING)
// ------------------------------------------------------------------------------
// Following:
//   desired  = vehicle - forward(vehicle_yaw) * distance + up * height
//   position = lerp(position, desired, smoothness)
//   target   = vehicle + up * look_offset
// The desired point is rebuilt from the vehicle's yaw every update, never from
// the camera's own history.
//
// Orbiting hands the eye to `OrbitControls` (yaw / pitch / distance around the
// vehicle), seeded from wherever Following left the camera. Mode changes only
// happen on an explicit toggle.
// ==============================================================================

use crate::config::CameraConfig;
use nalgebra::{Isometry3, Point3, Vector3};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CameraMode {
    #[default]
    Following,
    Orbiting,
}

/// Horizontal forward vector for a yaw about +Y (0 faces -Z).
pub fn forward_from_yaw(yaw: f32) -> Vector3<f32> {
    Vector3::new(-yaw.sin(), 0.0, -yaw.cos())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPose {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub mode: CameraMode,
}

// ------------------------------------------------------------------
// Free orbit
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    pub yaw: f32,      // rad about +Y, 0 = eye on +Z side of the target
    pub pitch: f32,    // rad above the horizon
    pub distance: f32, // m
    min_distance: f32,
    max_distance: f32,
    min_pitch: f32,
    max_pitch: f32,
}

impl OrbitControls {
    /// Spherical coordinates of `eye` around `target`. Limits are applied on
    /// the first user input, not here, so seeding never moves the eye.
    pub fn from_eye(target: Point3<f32>, eye: Point3<f32>, config: &CameraConfig) -> Self {
        let offset = eye - target;
        let distance = offset.norm();
        let (yaw, pitch, distance) = if distance > 1e-4 {
            let pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();
            (offset.x.atan2(offset.z), pitch, distance)
        } else {
            (0.0, config.orbit_min_pitch, config.orbit_min_distance)
        };
        Self {
            target,
            yaw,
            pitch,
            distance,
            min_distance: config.orbit_min_distance,
            max_distance: config.orbit_max_distance,
            min_pitch: config.orbit_min_pitch,
            max_pitch: config.orbit_max_pitch,
        }
    }

    pub fn eye(&self) -> Point3<f32> {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        self.target + Vector3::new(cp * sy, sp, cp * cy) * self.distance
    }

    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw = (self.yaw + delta_yaw).rem_euclid(std::f32::consts::TAU);
        self.pitch = (self.pitch + delta_pitch).clamp(self.min_pitch, self.max_pitch);
    }

    /// Positive zooms in.
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance - delta).clamp(self.min_distance, self.max_distance);
    }
}

// ------------------------------------------------------------------
// Chase camera
// ------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChaseCamera {
    config: CameraConfig,
    mode: CameraMode,
    position: Point3<f32>,
    desired: Point3<f32>,
    target: Point3<f32>,
    orbit: Option<OrbitControls>,
}

impl ChaseCamera {
    pub fn new(config: CameraConfig) -> Self {
        let position = Point3::new(0.0, config.base_height, config.base_distance);
        Self {
            config,
            mode: CameraMode::Following,
            position,
            desired: position,
            target: Point3::new(0.0, config.look_offset, 0.0),
            orbit: None,
        }
    }

    pub fn set_config(&mut self, config: CameraConfig) {
        self.config = config;
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn desired_position(&self) -> Point3<f32> {
        self.desired
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    pub fn orbit_controls(&self) -> Option<&OrbitControls> {
        self.orbit.as_ref()
    }

    pub fn desired_for(&self, vehicle: &Vector3<f32>, yaw: f32) -> Point3<f32> {
        Point3::from(
            vehicle - forward_from_yaw(yaw) * self.config.base_distance
                + Vector3::y() * self.config.base_height,
        )
    }

    fn look_target(&self, vehicle: &Vector3<f32>) -> Point3<f32> {
        Point3::from(vehicle + Vector3::y() * self.config.look_offset)
    }

    /// Places the camera on its desired point with no smoothing (spawn, reset).
    pub fn snap_to(&mut self, vehicle: &Vector3<f32>, yaw: f32) {
        self.desired = self.desired_for(vehicle, yaw);
        self.position = self.desired;
        self.target = self.look_target(vehicle);
        if let Some(orbit) = self.orbit.as_mut() {
            orbit.target = self.target;
            self.position = orbit.eye();
        }
    }

    pub fn update(&mut self, vehicle: &Vector3<f32>, yaw: f32) {
        self.target = self.look_target(vehicle);
        match (self.mode, self.orbit.as_mut()) {
            (CameraMode::Orbiting, Some(orbit)) => {
                orbit.target = self.target;
                self.position = orbit.eye();
            }
            _ => {
                self.desired = self.desired_for(vehicle, yaw);
                let t = self.config.smoothness.clamp(0.0, 1.0);
                self.position = self.position + (self.desired - self.position) * t;
            }
        }
    }

    pub fn set_mode(&mut self, mode: CameraMode) {
        if mode == self.mode {
            return;
        }
        self.orbit = match mode {
            CameraMode::Orbiting => {
                Some(OrbitControls::from_eye(self.target, self.position, &self.config))
            }
            CameraMode::Following => None,
        };
        self.mode = mode;
    }

    pub fn toggle(&mut self) -> CameraMode {
        let next = match self.mode {
            CameraMode::Following => CameraMode::Orbiting,
            CameraMode::Orbiting => CameraMode::Following,
        };
        self.set_mode(next);
        next
    }

    /// Orbit input; ignored while Following.
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32, zoom: f32) {
        let Some(orbit) = self.orbit.as_mut() else { return };
        orbit.rotate(delta_yaw, delta_pitch);
        orbit.zoom(zoom);
        self.position = orbit.eye();
    }

    /// World-to-camera transform.
    pub fn view(&self) -> Isometry3<f32> {
        if (self.target - self.position).norm_squared() < 1e-8 {
            return Isometry3::translation(-self.position.x, -self.position.y, -self.position.z);
        }
        Isometry3::look_at_rh(&self.position, &self.target, &Vector3::y())
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: [self.position.x, self.position.y, self.position.z],
            target: [self.target.x, self.target.y, self.target.z],
            mode: self.mode,
        }
    }
}
