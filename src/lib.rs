//! Arcade raycast-vehicle physics: fixed-step scheduling, a four-wheel
//! raycast car on rapier3d, a drift state machine and a chase camera.
//!
//! `simulation::Simulation` ties the pieces together; `state` and `net` host
//! one simulation per websocket client for the `drift-server` binary.

pub mod body;
pub mod camera;
pub mod config;
pub mod controller;
pub mod debug_builders;
pub mod drift;
pub mod error;
pub mod input;
pub mod net;
pub mod physics;
pub mod scene;
pub mod scheduler;
pub mod simulation;
pub mod state;
pub mod wheel;
