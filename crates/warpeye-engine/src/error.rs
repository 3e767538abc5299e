use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The `resources/` folder could not be found.
    #[error("could not locate resources/ starting from {}", start_dir.display())]
    AssetsNotFound { start_dir: PathBuf },

    /// I/O error reading or writing a file.
    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error for a file.
    #[error("JSON parse error for {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Config is syntactically valid but semantically invalid.
    #[error("invalid config {}: {msg}", path.display())]
    InvalidConfig { path: PathBuf, msg: String },

    /// A scene manifest references a file that does not exist.
    #[error("missing resource {}", path.display())]
    MissingResource { path: PathBuf },

    /// A scene manifest could not be interpreted.
    #[error("invalid scene manifest {}: {msg}", path.display())]
    InvalidManifest { path: PathBuf, msg: String },

    /// `start` was asked for a variant the manifest does not define.
    #[error("scene {} has no variant '{variant}'", scene.display())]
    UnknownVariant { scene: PathBuf, variant: String },

    /// Decoding failed even after rewinding the source once.
    #[error("playback failed for {}: {msg}", path.display())]
    Playback { path: PathBuf, msg: String },

    /// No MIDI backend or no input device on this machine. Recoverable: the
    /// controller runs without hardware.
    #[error("MIDI unavailable: {0}")]
    MidiUnavailable(String),

    /// MIDI hardware is present but the driver failed.
    #[error("MIDI driver error: {0}")]
    Midi(String),

    #[error("OSC error: {0}")]
    Osc(String),

    #[error("unknown warp mode '{0}' (expected one of: parameter, none)")]
    UnknownWarp(String),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn playback(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Playback {
            path: path.into(),
            msg: msg.into(),
        }
    }

    /// True for configuration-time failures that exclude a scene from rotation
    /// rather than stopping the process.
    pub fn is_scene_config(&self) -> bool {
        matches!(
            self,
            EngineError::MissingResource { .. }
                | EngineError::InvalidManifest { .. }
                | EngineError::Json { .. }
                | EngineError::Io { .. }
        )
    }
}
