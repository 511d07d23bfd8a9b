// ==============================================================================
// state.rs — SERVER SESSIONS + TELEMETRY SNAPSHOTS
// ------------------------------------------------------------------------------
// One `Simulation` per websocket connection, keyed by a v4 uuid. The ticker in
// main.rs calls `frame_all(delta)` then `broadcast_snapshot()`; each session
// receives the snapshot of its own car over its outgoing channel.
// ==============================================================================

use crate::camera::CameraPose;
use crate::config::{Config, KMH_PER_MPS};
use crate::debug_builders::DebugOverlay;
use crate::simulation::{LoadTicket, Simulation};
use nalgebra::Isometry3;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use uuid::Uuid;

pub struct Session {
    pub id: Uuid,
    pub sim: Simulation,
    pub tx: UnboundedSender<String>,
    pub debug: bool, // attach the debug overlay to snapshots
}

#[derive(Serialize)]
pub struct WheelSnapshot {
    pub id: &'static str,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

#[derive(Serialize)]
pub struct VehicleSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tick: u64,
    pub id: Uuid,
    pub attached: bool,
    pub speed_kmh: f32,
    pub position: [f32; 3],  // smoothed render pose
    pub rotation: [f32; 4],
    pub drifting: bool,
    pub camera: CameraPose,
    pub wheels: Vec<WheelSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugOverlay>,
}

fn pose_parts(iso: &Isometry3<f32>) -> ([f32; 3], [f32; 4]) {
    let t = iso.translation.vector;
    let q = iso.rotation.coords;
    ([t.x, t.y, t.z], [q.x, q.y, q.z, q.w])
}

impl Session {
    pub fn snapshot(&self, tick: u64) -> VehicleSnapshot {
        let (position, rotation) = pose_parts(&self.sim.render_pose());
        let wheels = self
            .sim
            .controller()
            .chassis()
            .map(|c| {
                c.wheels
                    .iter()
                    .map(|w| {
                        let (position, rotation) = pose_parts(&w.render);
                        WheelSnapshot { id: w.slot.as_str(), position, rotation }
                    })
                    .collect()
            })
            .unwrap_or_default();

        VehicleSnapshot {
            kind: "snapshot",
            tick,
            id: self.id,
            attached: self.sim.is_attached(),
            speed_kmh: self.sim.speed() * KMH_PER_MPS,
            position,
            rotation,
            drifting: self.sim.is_drifting(),
            camera: self.sim.camera_pose(),
            wheels,
            debug: if self.debug { self.sim.debug_overlay() } else { None },
        }
    }
}

pub struct SharedGameState {
    pub tick: u64,
    pub config: Config,
    pub sessions: HashMap<Uuid, Session>,
}

impl SharedGameState {
    pub fn new(config: Config) -> Self {
        Self {
            tick: 0,
            config,
            sessions: HashMap::new(),
        }
    }

    /// Registers a connection and opens its vehicle load.
    pub fn add_session(&mut self, tx: UnboundedSender<String>) -> (Uuid, LoadTicket) {
        let id = Uuid::new_v4();
        let mut sim = Simulation::new(&self.config);
        let ticket = sim.begin_load();
        self.sessions.insert(id, Session { id, sim, tx, debug: false });
        info!(%id, sessions = self.sessions.len(), "session added");
        (id, ticket)
    }

    pub fn remove_session(&mut self, id: &Uuid) {
        if let Some(mut session) = self.sessions.remove(id) {
            session.sim.dispose();
            info!(%id, sessions = self.sessions.len(), "session removed");
        }
    }

    pub fn session_mut(&mut self, id: &Uuid) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// One render-style frame for every session; returns total fixed steps.
    pub fn frame_all(&mut self, frame_delta: f32) -> usize {
        self.tick += 1;
        self.sessions.values_mut().map(|s| s.sim.frame(frame_delta)).sum()
    }

    /// Build and send each session its own snapshot.
    pub fn broadcast_snapshot(&self) {
        for session in self.sessions.values() {
            match serde_json::to_string(&session.snapshot(self.tick)) {
                Ok(json) => {
                    let _ = session.tx.send(json);
                }
                Err(e) => debug!(id = %session.id, error = %e, "snapshot encode failed"),
            }
        }
    }
}
