// ==============================================================================
// config.rs — IMMUTABLE TUNING SNAPSHOTS
// ------------------------------------------------------------------------------
// Every component holds its own copy of the config it needs. Runtime tuning
// produces a fresh snapshot (`VehicleConfig::patched`) that is handed over
// through a single setter; nothing mutates a shared config in place.
//
// Units: forces in N, speeds in m/s unless the field ends in `_kmh`, angles in
// radians, damping coefficients as rapier expects them (1/s).
// ==============================================================================

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const KMH_PER_MPS: f32 = 3.6;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vehicle: VehicleConfig,
    pub camera: CameraConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Reads a TOML file; missing sections fall back to the built-in tuning.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vehicle.validate()?;
        self.camera.validate()?;
        self.scheduler.validate()
    }
}

// ------------------------------------------------------------------
// Vehicle
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub mass: f32,                   // kg
    pub spawn_position: [f32; 3],    // chassis center at spawn
    pub render_smoothing: f32,       // per-tick lerp/slerp factor toward the physics pose
    pub engine: EngineConfig,
    pub steering: SteeringConfig,
    pub damping: DampingConfig,
    pub friction: FrictionConfig,
    pub suspension: SuspensionConfig,
    pub aero: AeroConfig,
    pub drift: DriftConfig,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            mass: 800.0,
            spawn_position: [0.0, 0.75, 0.0],
            render_smoothing: 0.8,
            engine: EngineConfig::default(),
            steering: SteeringConfig::default(),
            damping: DampingConfig::default(),
            friction: FrictionConfig::default(),
            suspension: SuspensionConfig::default(),
            aero: AeroConfig::default(),
            drift: DriftConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_force: f32,              // N, total at standstill
    pub max_speed_kmh: f32,          // speed at which the force curve bottoms out
    pub min_speed_factor: f32,       // floor of the force curve
    pub reverse_power_ratio: f32,    // reverse force relative to forward
    pub rear_share: f32,             // share of drive force on the rear axle
    pub engine_brake_per_mps: f32,   // N per m/s when coasting
    pub engine_brake_cap: f32,       // fraction of max_force
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_force: 4000.0,
            max_speed_kmh: 200.0,
            min_speed_factor: 0.1,
            reverse_power_ratio: 0.5,
            rear_share: 0.7,
            engine_brake_per_mps: 60.0,
            engine_brake_cap: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub max_angle: f32,              // rad at standstill
    pub max_steering_speed_kmh: f32, // authority reaches its floor here
    pub min_factor: f32,
    pub power_factor: f32,           // exponent of the authority curve
    pub rate: f32,                   // rad/s the wheels may turn
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_angle: 0.5,
            max_steering_speed_kmh: 180.0,
            min_factor: 0.3,
            power_factor: 1.5,
            rate: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampingConfig {
    pub base_linear: f32,
    pub base_angular: f32,
    pub turn_coefficient: f32,       // extra angular per (rad * m/s) of steering
    pub max_turn_extra: f32,
    pub scrub_coefficient: f32,      // extra linear per m/s of lateral velocity
    pub scrub_min_speed: f32,        // m/s
    pub max_scrub_extra: f32,
}

impl Default for DampingConfig {
    fn default() -> Self {
        Self {
            base_linear: 0.1,
            base_angular: 0.5,
            turn_coefficient: 0.05,
            max_turn_extra: 3.0,
            scrub_coefficient: 0.02,
            scrub_min_speed: 5.0,
            max_scrub_extra: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrictionConfig {
    pub front: f32,
    pub rear: f32,
    pub handbrake_rear: f32,
    pub drift_rear: f32,
    pub handbrake_brake: f32,        // brake impulse cap on the rear wheels
}

impl Default for FrictionConfig {
    fn default() -> Self {
        Self {
            front: 3.0,
            rear: 3.0,
            handbrake_rear: 1.2,
            drift_rear: 0.9,
            handbrake_brake: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionConfig {
    pub radius: f32,
    pub rest_length: f32,
    pub stiffness: f32,              // mass-relative, as the raycast vehicle expects
    pub damping_compression: f32,
    pub damping_relaxation: f32,
    pub roll_influence: f32,
    pub max_travel: f32,
    pub max_force: f32,              // N
}

impl Default for SuspensionConfig {
    fn default() -> Self {
        Self {
            radius: 0.35,
            rest_length: 0.35,
            stiffness: 30.0,
            damping_compression: 4.4,
            damping_relaxation: 2.3,
            roll_influence: 0.1,
            max_travel: 0.3,
            max_force: 100_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AeroConfig {
    pub min_speed: f32,              // m/s, nothing below this
    pub downforce: f32,              // N per (m/s)^2
    pub ground_effect: f32,          // N per (m/s)^2 per 1/m of ride height
    pub min_ride_height: f32,        // m, floor for the ground-effect divisor
    pub drag: f32,
    pub lift: f32,
    pub turbulence: f32,             // amplitude per (m/s)^2
    pub lateral_resistance: f32,
}

impl Default for AeroConfig {
    fn default() -> Self {
        Self {
            min_speed: 10.0,
            downforce: 0.8,
            ground_effect: 0.05,
            min_ride_height: 0.05,
            drag: 0.35,
            lift: 0.05,
            turbulence: 0.02,
            lateral_resistance: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub initiation_speed: f32,       // m/s
    pub angle_threshold: f32,        // rad/s of yaw rate
    pub lateral_threshold: f32,      // m/s
    pub stability_factor: f32,       // < 1
    pub correction_gain: f32,        // N*m per rad/s of yaw rate
    pub lateral_friction_scale: f32, // m/s of lateral speed that removes all extra grip
    pub min_friction_factor: f32,
    pub momentum_force: f32,         // N at initiation speed
    pub max_momentum_factor: f32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            initiation_speed: 8.0,
            angle_threshold: 0.3,
            lateral_threshold: 5.0,
            stability_factor: 0.6,
            correction_gain: 1500.0,
            lateral_friction_scale: 30.0,
            min_friction_factor: 0.3,
            momentum_force: 600.0,
            max_momentum_factor: 3.0,
        }
    }
}

impl VehicleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("vehicle.mass", self.mass)?;
        unit("vehicle.render_smoothing", self.render_smoothing)?;

        positive("vehicle.engine.max_force", self.engine.max_force)?;
        positive("vehicle.engine.max_speed_kmh", self.engine.max_speed_kmh)?;
        unit("vehicle.engine.min_speed_factor", self.engine.min_speed_factor)?;
        unit("vehicle.engine.reverse_power_ratio", self.engine.reverse_power_ratio)?;
        unit("vehicle.engine.rear_share", self.engine.rear_share)?;
        unit("vehicle.engine.engine_brake_cap", self.engine.engine_brake_cap)?;

        positive("vehicle.steering.max_angle", self.steering.max_angle)?;
        positive("vehicle.steering.max_steering_speed_kmh", self.steering.max_steering_speed_kmh)?;
        unit("vehicle.steering.min_factor", self.steering.min_factor)?;
        positive("vehicle.steering.power_factor", self.steering.power_factor)?;
        positive("vehicle.steering.rate", self.steering.rate)?;

        non_negative("vehicle.damping.base_linear", self.damping.base_linear)?;
        non_negative("vehicle.damping.base_angular", self.damping.base_angular)?;

        positive("vehicle.friction.front", self.friction.front)?;
        positive("vehicle.friction.rear", self.friction.rear)?;
        positive("vehicle.friction.handbrake_rear", self.friction.handbrake_rear)?;
        positive("vehicle.friction.drift_rear", self.friction.drift_rear)?;

        positive("vehicle.suspension.radius", self.suspension.radius)?;
        positive("vehicle.suspension.rest_length", self.suspension.rest_length)?;

        positive("vehicle.drift.initiation_speed", self.drift.initiation_speed)?;
        unit("vehicle.drift.stability_factor", self.drift.stability_factor)?;
        unit("vehicle.drift.min_friction_factor", self.drift.min_friction_factor)?;
        positive("vehicle.drift.lateral_friction_scale", self.drift.lateral_friction_scale)?;
        Ok(())
    }

    /// Returns a new snapshot with the patch's fields applied.
    pub fn patched(&self, patch: &VehiclePatch) -> VehicleConfig {
        let mut next = self.clone();
        let VehiclePatch {
            max_force,
            max_speed_kmh,
            min_speed_factor,
            reverse_power_ratio,
            max_steer_angle,
            max_steering_speed_kmh,
            min_steering_factor,
            steering_power_factor,
            steer_rate,
            front_friction,
            rear_friction,
            handbrake_friction,
        } = *patch;

        if let Some(v) = max_force { next.engine.max_force = v; }
        if let Some(v) = max_speed_kmh { next.engine.max_speed_kmh = v; }
        if let Some(v) = min_speed_factor { next.engine.min_speed_factor = v; }
        if let Some(v) = reverse_power_ratio { next.engine.reverse_power_ratio = v; }
        if let Some(v) = max_steer_angle { next.steering.max_angle = v; }
        if let Some(v) = max_steering_speed_kmh { next.steering.max_steering_speed_kmh = v; }
        if let Some(v) = min_steering_factor { next.steering.min_factor = v; }
        if let Some(v) = steering_power_factor { next.steering.power_factor = v; }
        if let Some(v) = steer_rate { next.steering.rate = v; }
        if let Some(v) = front_friction { next.friction.front = v; }
        if let Some(v) = rear_friction { next.friction.rear = v; }
        if let Some(v) = handbrake_friction { next.friction.handbrake_rear = v; }
        next
    }
}

/// Partial runtime tuning (speed, acceleration and steering constants).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehiclePatch {
    pub max_force: Option<f32>,
    pub max_speed_kmh: Option<f32>,
    pub min_speed_factor: Option<f32>,
    pub reverse_power_ratio: Option<f32>,
    pub max_steer_angle: Option<f32>,
    pub max_steering_speed_kmh: Option<f32>,
    pub min_steering_factor: Option<f32>,
    pub steering_power_factor: Option<f32>,
    pub steer_rate: Option<f32>,
    pub front_friction: Option<f32>,
    pub rear_friction: Option<f32>,
    pub handbrake_friction: Option<f32>,
}

// ------------------------------------------------------------------
// Camera / scheduler / server
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub base_distance: f32,          // m behind the vehicle
    pub base_height: f32,            // m above the vehicle
    pub look_offset: f32,            // m above the vehicle origin
    pub smoothness: f32,             // 0..1 lerp factor per update
    pub orbit_min_distance: f32,
    pub orbit_max_distance: f32,
    pub orbit_min_pitch: f32,        // rad above the horizon
    pub orbit_max_pitch: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            base_distance: 8.0,
            base_height: 3.0,
            look_offset: 1.0,
            smoothness: 0.1,
            orbit_min_distance: 3.0,
            orbit_max_distance: 30.0,
            orbit_min_pitch: 0.05,
            orbit_max_pitch: 1.45,
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("camera.base_distance", self.base_distance)?;
        unit("camera.smoothness", self.smoothness)?;
        positive("camera.orbit_min_distance", self.orbit_min_distance)?;
        if self.orbit_max_distance < self.orbit_min_distance {
            return Err(ConfigError::Invalid {
                field: "camera.orbit_max_distance",
                reason: "must not be below orbit_min_distance".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub fixed_timestep: f32,         // s
    pub min_delta: f32,              // s, lower clamp of a frame delta
    pub max_delta: f32,              // s, upper clamp of a frame delta
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            min_delta: 0.0,
            max_delta: 0.1,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("scheduler.fixed_timestep", self.fixed_timestep)?;
        non_negative("scheduler.min_delta", self.min_delta)?;
        if self.max_delta < self.fixed_timestep || self.max_delta < self.min_delta {
            return Err(ConfigError::Invalid {
                field: "scheduler.max_delta",
                reason: "must be at least fixed_timestep and min_delta".into(),
            });
        }
        Ok(())
    }

    /// Upper bound on fixed steps a single frame can trigger.
    pub fn max_steps_per_frame(&self) -> usize {
        (self.max_delta / self.fixed_timestep).ceil() as usize + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub frame_interval_ms: u64,
    pub scene: Option<PathBuf>,      // JSON scene; the built-in car when absent
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9001".to_string(),
            frame_interval_ms: 16,
            scene: None,
        }
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason: format!("{value} must be > 0") })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason: format!("{value} must be >= 0") })
    }
}

fn unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, reason: format!("{value} must be within [0, 1]") })
    }
}
