//! Typed view of `resources/warpeye.json`.
//!
//! Every key is optional. The file itself is optional: when it is missing the
//! built-in defaults are used, matching a stock LPD8 on program 2.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::assets::{read_to_string_result, AssetsRoot};
use crate::error::EngineError;
use crate::logw;

/// How strictly to interpret the config file.
///
/// - `Lenient` is forward-compatible: unknown fields are ignored, a broken file
///   falls back to defaults with a warning.
/// - `Strict` is fail-fast: unknown fields and parse failures become errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Tick rate used when the active video does not report one.
    #[serde(default = "default_fps")]
    pub fps_default: f32,

    /// Window size when not fullscreen.
    #[serde(default = "default_resolution")]
    pub resolution: [u32; 2],

    /// Scene switch interval in showreel mode.
    #[serde(default = "default_showreel_secs")]
    pub showreel_secs: u64,

    /// Scene root, relative to the resources folder.
    #[serde(default = "default_scenes_dir")]
    pub scenes_dir: PathBuf,

    /// Persisted knob values, relative to the working directory.
    #[serde(default = "default_defaults_file")]
    pub defaults_file: PathBuf,

    #[serde(default)]
    pub midi: MidiConfig,

    #[serde(default)]
    pub osc: OscConfig,

    /// Pad id (1-based) -> action name. See `PadAction::parse`.
    #[serde(default = "default_pads")]
    pub pads: BTreeMap<u8, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MidiConfig {
    #[serde(default)]
    pub preferred_device_contains: Option<String>,

    /// Only accept messages on this channel (0-15). None = any channel.
    #[serde(default)]
    pub channel: Option<u8>,

    /// CC number per knob; knob index = position in this list.
    #[serde(default = "default_knob_ccs")]
    pub knob_ccs: Vec<u8>,

    /// Note number per pad; pad id = position in this list + 1.
    #[serde(default = "default_pad_notes")]
    pub pad_notes: Vec<u8>,

    /// Soft takeover: a knob restored from defaults ignores the hardware until the
    /// physical knob reaches the stored value.
    #[serde(default = "default_true")]
    pub sticky: bool,

    /// Fire pad actions on release instead of press.
    #[serde(default = "default_true")]
    pub pad_on_release: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OscConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_osc_bind")]
    pub bind: String,

    #[serde(default = "default_osc_prefix")]
    pub prefix: String,
}

fn default_fps() -> f32 {
    25.0
}
fn default_resolution() -> [u32; 2] {
    [1920, 1080]
}
fn default_showreel_secs() -> u64 {
    60 * 5
}
fn default_scenes_dir() -> PathBuf {
    PathBuf::from("scenes")
}
fn default_defaults_file() -> PathBuf {
    PathBuf::from("controller.json")
}
fn default_true() -> bool {
    true
}
fn default_knob_ccs() -> Vec<u8> {
    (1..=8).collect()
}
// LPD8 program 2 pads, re-programmed to a C major scale.
fn default_pad_notes() -> Vec<u8> {
    vec![60, 62, 64, 65, 67, 69, 71, 72]
}
fn default_osc_bind() -> String {
    "0.0.0.0:9000".into()
}
fn default_osc_prefix() -> String {
    "/warpeye".into()
}
fn default_pads() -> BTreeMap<u8, String> {
    BTreeMap::from([
        (1, "scene_prev".to_string()),
        (2, "scene_next".to_string()),
        (3, "cycle_warp".to_string()),
        (4, "toggle_points".to_string()),
    ])
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fps_default: default_fps(),
            resolution: default_resolution(),
            showreel_secs: default_showreel_secs(),
            scenes_dir: default_scenes_dir(),
            defaults_file: default_defaults_file(),
            midi: MidiConfig::default(),
            osc: OscConfig::default(),
            pads: default_pads(),
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            preferred_device_contains: None,
            channel: None,
            knob_ccs: default_knob_ccs(),
            pad_notes: default_pad_notes(),
            sticky: true,
            pad_on_release: true,
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_osc_bind(),
            prefix: default_osc_prefix(),
        }
    }
}

/// What a pad press does in the frame loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PadAction {
    ScenePrev,
    SceneNext,
    CycleWarp,
    TogglePoints,
    SaveDefaults,
    LoadDefaults,
    /// Restart the current scene on a named variant.
    Variant(String),
}

impl PadAction {
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(v) = name.strip_prefix("variant:") {
            let v = v.trim();
            return (!v.is_empty()).then(|| PadAction::Variant(v.to_string()));
        }
        match name {
            "scene_prev" => Some(PadAction::ScenePrev),
            "scene_next" => Some(PadAction::SceneNext),
            "cycle_warp" => Some(PadAction::CycleWarp),
            "toggle_points" => Some(PadAction::TogglePoints),
            "save_defaults" => Some(PadAction::SaveDefaults),
            "load_defaults" => Some(PadAction::LoadDefaults),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Resolve the `pads` table, warning about (and skipping) unknown action names.
    pub fn pad_actions(&self) -> BTreeMap<u8, PadAction> {
        let mut out = BTreeMap::new();
        for (pad, name) in &self.pads {
            match PadAction::parse(name) {
                Some(action) => {
                    out.insert(*pad, action);
                }
                None => logw!("CONFIG", "pads.{pad}: unknown action '{name}' (ignored)"),
            }
        }
        out
    }

    /// Frame period derived from an optional source fps, falling back to `fps_default`.
    pub fn tick_secs(&self, source_fps: Option<f32>) -> f32 {
        let fps = source_fps
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(self.fps_default)
            .max(1.0);
        1.0 / fps
    }
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "fps_default",
    "resolution",
    "showreel_secs",
    "scenes_dir",
    "defaults_file",
    "midi",
    "osc",
    "pads",
];
const MIDI_KEYS: &[&str] = &[
    "preferred_device_contains",
    "channel",
    "knob_ccs",
    "pad_notes",
    "sticky",
    "pad_on_release",
];
const OSC_KEYS: &[&str] = &["enabled", "bind", "prefix"];

fn unknown_keys(value: &Value, known: &[&str], base: &str, out: &mut Vec<String>) {
    if let Some(obj) = value.as_object() {
        for k in obj.keys() {
            if !known.contains(&k.as_str()) {
                out.push(format!("{base}{k}"));
            }
        }
    }
}

/// Load `warpeye(.<os>).json` from the assets root.
pub fn load_app_config(assets: &AssetsRoot, mode: ConfigMode) -> Result<AppConfig, EngineError> {
    let path = assets.pick_platform_json("warpeye");
    load_app_config_from(&path, mode)
}

pub fn load_app_config_from(path: &Path, mode: ConfigMode) -> Result<AppConfig, EngineError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let parsed = read_to_string_result(path).and_then(|src| {
        serde_json::from_str::<Value>(&src).map_err(|e| EngineError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    });

    let value = match (parsed, mode) {
        (Ok(v), _) => v,
        (Err(e), ConfigMode::Strict) => return Err(e),
        (Err(e), ConfigMode::Lenient) => {
            logw!("CONFIG", "{e}. Using defaults.");
            return Ok(AppConfig::default());
        }
    };

    if mode == ConfigMode::Strict {
        if !value.is_object() {
            return Err(EngineError::InvalidConfig {
                path: path.to_path_buf(),
                msg: "top level must be a JSON object".into(),
            });
        }
        let mut unknown = Vec::new();
        unknown_keys(&value, TOP_LEVEL_KEYS, "", &mut unknown);
        if let Some(m) = value.get("midi") {
            unknown_keys(m, MIDI_KEYS, "midi.", &mut unknown);
        }
        if let Some(o) = value.get("osc") {
            unknown_keys(o, OSC_KEYS, "osc.", &mut unknown);
        }
        if !unknown.is_empty() {
            return Err(EngineError::InvalidConfig {
                path: path.to_path_buf(),
                msg: format!("unknown keys: {}", unknown.join(", ")),
            });
        }
    }

    match serde_json::from_value::<AppConfig>(value) {
        Ok(cfg) => Ok(cfg),
        Err(e) if mode == ConfigMode::Strict => Err(EngineError::Json {
            path: path.to_path_buf(),
            source: e,
        }),
        Err(e) => {
            logw!("CONFIG", "{}: {e}. Using defaults.", path.display());
            Ok(AppConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let p = dir.join("warpeye.json");
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_app_config_from(&dir.path().join("nope.json"), ConfigMode::Strict).unwrap();
        assert_eq!(cfg.fps_default, 25.0);
        assert_eq!(cfg.midi.knob_ccs, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(cfg.midi.pad_on_release);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), r#"{ "fps_default": 30, "midi": { "sticky": false } }"#);
        let cfg = load_app_config_from(&p, ConfigMode::Lenient).unwrap();
        assert_eq!(cfg.fps_default, 30.0);
        assert!(!cfg.midi.sticky);
        assert_eq!(cfg.midi.pad_notes.len(), 8);
        assert_eq!(cfg.showreel_secs, 300);
    }

    #[test]
    fn strict_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), r#"{ "midi": { "chanel": 1 }, "fsp": 3 }"#);
        let err = load_app_config_from(&p, ConfigMode::Strict).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("midi.chanel"));
        assert!(msg.contains("fsp"));

        assert!(load_app_config_from(&p, ConfigMode::Lenient).is_ok());
    }

    #[test]
    fn lenient_survives_broken_json() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(dir.path(), "{ not json");
        let cfg = load_app_config_from(&p, ConfigMode::Lenient).unwrap();
        assert_eq!(cfg.resolution, [1920, 1080]);
        assert!(load_app_config_from(&p, ConfigMode::Strict).is_err());
    }

    #[test]
    fn pad_actions_parse_and_skip_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            r#"{ "pads": { "1": "scene_next", "5": "variant:night", "6": "explode" } }"#,
        );
        let cfg = load_app_config_from(&p, ConfigMode::Lenient).unwrap();
        let actions = cfg.pad_actions();
        assert_eq!(actions.get(&1), Some(&PadAction::SceneNext));
        assert_eq!(actions.get(&5), Some(&PadAction::Variant("night".into())));
        assert!(!actions.contains_key(&6));
        assert!(!actions.contains_key(&2));
    }

    #[test]
    fn tick_prefers_source_fps() {
        let cfg = AppConfig::default();
        assert!((cfg.tick_secs(Some(50.0)) - 0.02).abs() < 1e-6);
        assert!((cfg.tick_secs(None) - 0.04).abs() < 1e-6);
        assert!((cfg.tick_secs(Some(0.0)) - 0.04).abs() < 1e-6);
    }
}
