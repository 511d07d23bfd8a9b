// ==============================================================================
// error.rs — ERROR TAXONOMY
// ------------------------------------------------------------------------------
// Configuration errors are fatal at vehicle construction: the vehicle is left
// without a physics body and never retried. Transient absence (stepping before
// physics is attached) is not an error at all and never reaches this module.
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Failures while building or attaching a vehicle.
#[derive(Error, Debug)]
pub enum VehicleError {
    /// The scene did not yield exactly four wheel mounts.
    #[error("expected exactly 4 wheel mounts, found {found}")]
    WheelCount {
        /// Number of wheel candidates discovered
        found: usize,
    },

    /// Two nodes resolved to the same wheel slot.
    #[error("wheel slot {slot} claimed twice (node `{name}`)")]
    AmbiguousWheel {
        /// Slot label ("FL", "FR", "RL", "RR")
        slot: &'static str,
        /// Offending node name
        name: String,
    },

    /// No chassis geometry left once wheels are removed.
    #[error("scene has no chassis geometry")]
    MissingChassis,

    /// Attach attempted after disposal or with a stale load ticket.
    #[error("simulation was disposed before physics could attach")]
    Disposed,

    /// Reading a scene file failed.
    #[error("failed to read scene `{path}`: {source}")]
    SceneIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A scene file was not valid JSON for the scene graph.
    #[error("failed to parse scene `{path}`: {source}")]
    SceneParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside the range the simulation can work with.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
