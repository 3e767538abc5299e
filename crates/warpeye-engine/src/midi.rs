//! MIDI transport (midir).
//!
//! The midir callback runs on the driver's thread. It only decodes bytes and pushes a
//! `ControllerEvent` onto the controller queue; all state lives on the render thread.

use crossbeam_channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection};

use crate::config::MidiConfig;
use crate::error::EngineError;
use crate::events::{ControllerEvent, EventSource};
use crate::{logd, logi};

const CLIENT_NAME: &str = "warpeye-midi";

/// A live midir input connection. Dropping it closes the port.
pub struct MidiInputHandle {
    conn: Option<MidiInputConnection<()>>,
    port_name: String,
}

impl MidiInputHandle {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Close the port. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.close();
            logi!("MIDI", "closed input: {}", self.port_name);
        }
    }
}

impl Drop for MidiInputHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decode one raw MIDI message into a controller event.
///
/// - CC on a configured knob CC -> `Knob` with value `cc / 127`.
/// - Note-on on a configured pad note -> `Pad { on: true }`; note-off, or note-on with
///   velocity 0 -> `Pad { on: false }`. Pad ids are 1-based.
pub fn decode_message(msg: &[u8], cfg: &MidiConfig) -> Option<ControllerEvent> {
    if msg.len() != 3 {
        return None;
    }
    let status = msg[0] & 0xF0;
    let ch = msg[0] & 0x0F;
    if let Some(want) = cfg.channel {
        if want & 0x0F != ch {
            return None;
        }
    }

    match status {
        0xB0 => {
            let index = cfg.knob_ccs.iter().position(|&cc| cc == msg[1])?;
            Some(ControllerEvent::Knob {
                index,
                value: f32::from(msg[2].min(127)) / 127.0,
                source: EventSource::Midi,
            })
        }
        0x90 | 0x80 => {
            let pos = cfg.pad_notes.iter().position(|&n| n == msg[1])?;
            let on = status == 0x90 && msg[2] > 0;
            Some(ControllerEvent::Pad {
                pad: u8::try_from(pos + 1).ok()?,
                on,
            })
        }
        _ => None,
    }
}

/// Connect to the preferred (or first) MIDI input and forward decoded events to `tx`.
///
/// Errors:
/// - `MidiUnavailable` when this machine has no usable MIDI backend (e.g. WSL2 without
///   `/dev/snd/seq`) or no input ports. Callers treat this as "run without hardware".
/// - `Midi` when a port exists but connecting to it fails.
pub fn connect(cfg: &MidiConfig, tx: Sender<ControllerEvent>) -> Result<MidiInputHandle, EngineError> {
    let mut midi_in =
        MidiInput::new(CLIENT_NAME).map_err(|e| EngineError::MidiUnavailable(e.to_string()))?;
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(EngineError::MidiUnavailable("no MIDI input ports detected".into()));
    }

    let preferred = cfg
        .preferred_device_contains
        .as_ref()
        .map(|s| s.to_lowercase());

    let mut chosen = ports.first().cloned();

    if let Some(pref) = preferred {
        match ports.iter().find(|p| {
            midi_in
                .port_name(p)
                .map(|name| name.to_lowercase().contains(&pref))
                .unwrap_or(false)
        }) {
            Some(p) => chosen = Some(p.clone()),
            None => logi!("MIDI", "no port matching '{pref}', using the first port"),
        }
    }

    let in_port = chosen.ok_or_else(|| EngineError::MidiUnavailable("no MIDI input port".into()))?;
    let port_name = midi_in
        .port_name(&in_port)
        .unwrap_or_else(|_| "Unknown".into());
    logi!("MIDI", "connecting input: {port_name}");

    let decode_cfg = cfg.clone();
    let conn = midi_in
        .connect(
            &in_port,
            "warpeye-midi-in",
            move |_ts, msg, _| match decode_message(msg, &decode_cfg) {
                Some(ev) => {
                    logd!("MIDI", "{ev:?}");
                    // Receiver gone means the controller was stopped; nothing to do.
                    let _ = tx.send(ev);
                }
                None => logd!("MIDI", "ignored {msg:02x?}"),
            },
            (),
        )
        .map_err(|e| EngineError::Midi(format!("failed to connect '{port_name}': {e}")))?;

    Ok(MidiInputHandle {
        conn: Some(conn),
        port_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cc_maps_to_knob_index() {
        let cfg = MidiConfig::default();
        let ev = decode_message(&[0xB0, 3, 127], &cfg).unwrap();
        assert_eq!(
            ev,
            ControllerEvent::Knob {
                index: 2,
                value: 1.0,
                source: EventSource::Midi
            }
        );
    }

    #[test]
    fn unmapped_cc_is_ignored() {
        let cfg = MidiConfig::default();
        assert!(decode_message(&[0xB0, 42, 64], &cfg).is_none());
    }

    #[test]
    fn note_on_and_off_map_to_pad_edges() {
        let cfg = MidiConfig::default();
        assert_eq!(
            decode_message(&[0x90, 64, 100], &cfg),
            Some(ControllerEvent::Pad { pad: 3, on: true })
        );
        assert_eq!(
            decode_message(&[0x80, 64, 0], &cfg),
            Some(ControllerEvent::Pad { pad: 3, on: false })
        );
        // running-status style note-off
        assert_eq!(
            decode_message(&[0x90, 72, 0], &cfg),
            Some(ControllerEvent::Pad { pad: 8, on: false })
        );
    }

    #[test]
    fn channel_filter_applies() {
        let cfg = MidiConfig {
            channel: Some(1),
            ..MidiConfig::default()
        };
        assert!(decode_message(&[0xB0, 1, 10], &cfg).is_none());
        assert!(decode_message(&[0xB1, 1, 10], &cfg).is_some());
    }

    #[test]
    fn short_messages_are_ignored() {
        let cfg = MidiConfig::default();
        assert!(decode_message(&[0xB0, 1], &cfg).is_none());
        assert!(decode_message(&[0xF8], &cfg).is_none());
    }
}
