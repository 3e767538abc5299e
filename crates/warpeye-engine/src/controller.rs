//! Controller state: knobs, pads and their persisted defaults.
//!
//! Lifecycle: `new` (loads defaults) -> `start` (attach MIDI, optional OSC) -> `poll` once
//! per frame -> `stop` (also on drop).
//!
//! Transports never touch this struct. They push `ControllerEvent`s onto a channel and
//! `poll` drains it on the render thread, so everything downstream reads plain fields.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, MidiConfig, OscConfig};
use crate::error::EngineError;
use crate::events::{ControllerEvent, EventSource};
use crate::midi::{self, MidiInputHandle};
use crate::osc::{self, OscHandle};
use crate::{logd, loge, logi, logw};

/// Number of knobs on the controller (LPD8).
pub const KNOB_COUNT: usize = 8;

// Half a MIDI step either side of the stored value counts as "reached".
const PICKUP_TOLERANCE: f32 = 1.0 / 127.0 + 1e-4;

/// Linear interpolation by a normalized control value: `v1` at `i == 0`, `v2` at `i == 1`.
/// With `invert`, `1 - i` is used instead.
pub fn interpolate(v1: f32, v2: f32, i: f32, invert: bool) -> f32 {
    let i = if invert { 1.0 - i } else { i };
    (v2 - v1) * i + v1
}

/// Read access to normalized knob values.
pub trait KnobSource {
    /// Knob value in [0,1]; unknown indices read as 0.
    fn knob(&self, index: usize) -> f32;

    /// Interpolate `v1..v2` by the value of knob `knob_index`.
    fn interpolate(&self, v1: f32, v2: f32, knob_index: usize, invert: bool) -> f32 {
        interpolate(v1, v2, self.knob(knob_index), invert)
    }
}

impl KnobSource for [f32; KNOB_COUNT] {
    fn knob(&self, index: usize) -> f32 {
        self.get(index).copied().unwrap_or(0.0)
    }
}

/// Which pad transition enqueues a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadEdge {
    Press,
    Release,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub sticky: bool,
    pub pad_edge: PadEdge,
    pub defaults_path: PathBuf,
}

impl ControllerOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            sticky: cfg.midi.sticky,
            pad_edge: if cfg.midi.pad_on_release {
                PadEdge::Release
            } else {
                PadEdge::Press
            },
            defaults_path: cfg.defaults_file.clone(),
        }
    }
}

/// The hardware side of the controller.
pub enum Hardware {
    Midi(MidiInputHandle),
    /// No MIDI on this machine (or not started yet). Values stay at their defaults.
    Absent { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pickup {
    Tracking,
    /// Waiting for the physical knob to reach the stored value; `last` is the previous
    /// hardware reading, used to detect a crossing between two messages.
    Waiting { last: Option<f32> },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    knobs: Option<Vec<f32>>,
}

pub struct ControllerState {
    opts: ControllerOptions,
    knobs: [f32; KNOB_COUNT],
    pickup: [Pickup; KNOB_COUNT],
    changed: bool,
    pads: Vec<u8>,
    // pads currently held down
    held: BTreeSet<u8>,
    tx: Sender<ControllerEvent>,
    rx: Receiver<ControllerEvent>,
    hardware: Hardware,
    osc: Option<OscHandle>,
}

impl ControllerState {
    /// Build the controller with all knobs at zero, then restore the persisted defaults.
    pub fn new(opts: ControllerOptions) -> Self {
        let (tx, rx) = unbounded();
        let mut state = Self {
            opts,
            knobs: [0.0; KNOB_COUNT],
            pickup: [Pickup::Tracking; KNOB_COUNT],
            changed: false,
            pads: Vec::new(),
            held: BTreeSet::new(),
            tx,
            rx,
            hardware: Hardware::Absent {
                reason: "not started".into(),
            },
            osc: None,
        };
        state.load_defaults();
        state
    }

    /// Queue handle for transports (and tests) to push events.
    pub fn sender(&self) -> Sender<ControllerEvent> {
        self.tx.clone()
    }

    /// Connect the MIDI hardware.
    pub fn start(&mut self, midi_cfg: &MidiConfig) -> Result<(), EngineError> {
        let res = midi::connect(midi_cfg, self.tx.clone());
        self.attach_hardware(res)
    }

    /// Install the result of a MIDI connection attempt.
    ///
    /// `MidiUnavailable` degrades to the no-op backend; any other error is returned so
    /// startup can abort.
    pub fn attach_hardware(
        &mut self,
        res: Result<MidiInputHandle, EngineError>,
    ) -> Result<(), EngineError> {
        match res {
            Ok(handle) => {
                logi!("CTRL", "hardware: {}", handle.port_name());
                self.hardware = Hardware::Midi(handle);
                Ok(())
            }
            Err(EngineError::MidiUnavailable(reason)) => {
                logw!("CTRL", "running without controller hardware ({reason})");
                self.hardware = Hardware::Absent { reason };
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Start the OSC listener if enabled in config.
    pub fn start_osc(&mut self, cfg: &OscConfig) -> Result<(), EngineError> {
        if cfg.enabled && self.osc.is_none() {
            self.osc = Some(osc::connect(cfg, self.tx.clone())?);
        }
        Ok(())
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    pub fn has_hardware(&self) -> bool {
        matches!(self.hardware, Hardware::Midi(_))
    }

    /// Drain pending transport events into the snapshot. Never blocks.
    pub fn poll(&mut self) {
        while let Ok(ev) = self.rx.try_recv() {
            self.apply(ev);
        }
    }

    fn apply(&mut self, ev: ControllerEvent) {
        match ev {
            ControllerEvent::Knob {
                index,
                value,
                source,
            } => {
                if index >= KNOB_COUNT || !value.is_finite() {
                    return;
                }
                let value = value.clamp(0.0, 1.0);
                match source {
                    EventSource::Midi => self.apply_hardware_knob(index, value),
                    EventSource::Osc => {
                        self.set_knob(index, value);
                        // The physical knob no longer matches; make it pick up again.
                        if self.opts.sticky {
                            self.pickup[index] = Pickup::Waiting { last: None };
                        }
                    }
                }
            }
            ControllerEvent::Pad { pad, on } => {
                // `insert`/`remove` report whether the pad actually changed state
                let flipped = if on { self.held.insert(pad) } else { self.held.remove(&pad) };
                if !flipped {
                    logd!("CTRL", "pad {pad} on={on} repeated");
                    return;
                }
                self.changed = true;
                let fire = match self.opts.pad_edge {
                    PadEdge::Press => on,
                    PadEdge::Release => !on,
                };
                if fire {
                    self.pads.push(pad);
                }
                logd!("CTRL", "pad {pad} on={on} fire={fire}");
            }
        }
    }

    fn apply_hardware_knob(&mut self, index: usize, value: f32) {
        if let Pickup::Waiting { last } = self.pickup[index] {
            let stored = self.knobs[index];
            let reached = (value - stored).abs() <= PICKUP_TOLERANCE;
            let crossed = last
                .map(|prev| (prev - stored).signum() != (value - stored).signum())
                .unwrap_or(false);
            if !(reached || crossed) {
                self.pickup[index] = Pickup::Waiting { last: Some(value) };
                logd!("CTRL", "knob {} waiting for pickup ({value:.3} vs {stored:.3})", index + 1);
                return;
            }
            self.pickup[index] = Pickup::Tracking;
        }
        self.set_knob(index, value);
    }

    fn set_knob(&mut self, index: usize, value: f32) {
        self.knobs[index] = value;
        self.changed = true;
        logd!("CTRL", "knob {} = {value:.3}", index + 1);
    }

    /// Latest value of knob `index` (0-based).
    pub fn value(&self, index: usize) -> f32 {
        self.knobs.knob(index)
    }

    pub fn knobs(&self) -> &[f32; KNOB_COUNT] {
        &self.knobs
    }

    /// True exactly once after any knob or pad change.
    pub fn consume_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Pads that fired on the configured edge since the last call, in arrival order.
    pub fn drain_triggered_pads(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pads)
    }

    pub fn defaults_path(&self) -> &Path {
        &self.opts.defaults_path
    }

    /// Restore knob values from the defaults file.
    ///
    /// Knobs reset to 0 first, so a missing file, missing entries, or a read or parse
    /// failure all leave zeros. Failures are logged, never returned.
    pub fn load_defaults(&mut self) {
        let path = self.opts.defaults_path.clone();
        self.knobs = [0.0; KNOB_COUNT];
        match read_persisted(&path) {
            Ok(Some(values)) => {
                for (dst, v) in self.knobs.iter_mut().zip(values) {
                    *dst = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
                }
                logi!("CTRL", "loaded defaults from {}", path.display());
            }
            Ok(None) => logd!("CTRL", "no defaults at {}", path.display()),
            Err(e) => loge!("CTRL", "{e}"),
        }

        if self.opts.sticky {
            self.pickup = [Pickup::Waiting { last: None }; KNOB_COUNT];
        }
        self.changed = true;
    }

    /// Write the current knob values to the defaults file. Failures are logged only.
    pub fn save_defaults(&self) {
        let data = PersistedValues {
            knobs: Some(self.knobs.to_vec()),
        };
        let path = &self.opts.defaults_path;
        let res = serde_json::to_string(&data)
            .map_err(|e| e.to_string())
            .and_then(|s| std::fs::write(path, s).map_err(|e| e.to_string()));
        match res {
            Ok(()) => logi!("CTRL", "saved defaults to {}", path.display()),
            Err(e) => loge!("CTRL", "failed to save defaults to {}: {e}", path.display()),
        }
    }

    /// Release the hardware. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Hardware::Midi(handle) = &mut self.hardware {
            handle.close();
        }
        if !matches!(self.hardware, Hardware::Absent { .. }) {
            self.hardware = Hardware::Absent {
                reason: "stopped".into(),
            };
        }
        self.osc = None;
    }
}

impl KnobSource for ControllerState {
    fn knob(&self, index: usize) -> f32 {
        self.value(index)
    }
}

impl Drop for ControllerState {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_persisted(path: &Path) -> Result<Option<Vec<f32>>, EngineError> {
    let src = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::io(path, e)),
    };
    let data: PersistedValues = serde_json::from_str(&src).map_err(|e| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(data.knobs)
}
