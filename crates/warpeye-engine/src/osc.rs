//! OSC transport (UDP, rosc).
//!
//! Addresses, with the configured prefix (default `/warpeye`):
//! - `/warpeye/knob/<n> <float>`: knob n (1-based), clamped to [0,1]
//! - `/warpeye/pad/<n> <on>`: pad n (1-based); any non-zero / true argument means pressed

use std::net::UdpSocket;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use rosc::{OscPacket, OscType};

use crate::config::OscConfig;
use crate::controller::KNOB_COUNT;
use crate::error::EngineError;
use crate::events::{ControllerEvent, EventSource};
use crate::{logd, logi};

/// Background listener. Dropping it stops and joins the thread.
pub struct OscHandle {
    stop_tx: crossbeam_channel::Sender<()>,
    join: Option<JoinHandle<()>>,
    bind: String,
}

impl OscHandle {
    pub fn bind(&self) -> &str {
        &self.bind
    }
}

impl Drop for OscHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
        logi!("OSC", "listener on {} stopped", self.bind);
    }
}

fn arg_as_f32(arg: &OscType) -> Option<f32> {
    match arg {
        OscType::Float(v) => Some(*v),
        OscType::Double(v) => Some(*v as f32),
        OscType::Int(v) => Some(*v as f32),
        OscType::Long(v) => Some(*v as f32),
        OscType::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Map one OSC message to a controller event.
pub fn decode_message(prefix: &str, addr: &str, args: &[OscType]) -> Option<ControllerEvent> {
    let rest = addr.strip_prefix(prefix)?;
    // the prefix must end on a segment boundary
    if !(prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let mut parts = rest.trim_start_matches('/').split('/');
    let kind = parts.next()?;
    let n: usize = parts.next()?.parse().ok()?;
    if parts.next().is_some() || n == 0 {
        return None;
    }
    let v = args.first().and_then(arg_as_f32)?;

    match kind {
        "knob" if n <= KNOB_COUNT => Some(ControllerEvent::Knob {
            index: n - 1,
            value: v.clamp(0.0, 1.0),
            source: EventSource::Osc,
        }),
        "pad" => Some(ControllerEvent::Pad {
            pad: u8::try_from(n).ok()?,
            on: v != 0.0,
        }),
        _ => None,
    }
}

fn forward_packet(pkt: OscPacket, prefix: &str, tx: &Sender<ControllerEvent>) {
    match pkt {
        OscPacket::Message(msg) => match decode_message(prefix, &msg.addr, &msg.args) {
            Some(ev) => {
                let _ = tx.send(ev);
            }
            None => logd!("OSC", "ignored {} {:?}", msg.addr, msg.args),
        },
        OscPacket::Bundle(bundle) => {
            for p in bundle.content {
                forward_packet(p, prefix, tx);
            }
        }
    }
}

/// Bind the UDP socket and start the listener thread.
pub fn connect(cfg: &OscConfig, tx: Sender<ControllerEvent>) -> Result<OscHandle, EngineError> {
    let bind = cfg.bind.clone();
    let prefix = cfg.prefix.trim_end_matches('/').to_string();

    let sock = UdpSocket::bind(&bind).map_err(|e| EngineError::Osc(format!("failed to bind {bind}: {e}")))?;
    // Short read timeout so the thread notices the stop signal.
    sock.set_read_timeout(Some(Duration::from_millis(100)))
        .map_err(|e| EngineError::Osc(format!("socket setup failed: {e}")))?;

    logi!("OSC", "listening on {bind} prefix={prefix}");
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

    let join = std::thread::Builder::new()
        .name("osc".to_string())
        .spawn(move || {
            let mut buf = [0u8; rosc::decoder::MTU];
            loop {
                if stop_rx.try_recv().is_ok() {
                    break;
                }
                match sock.recv_from(&mut buf) {
                    Ok((sz, _from)) => match rosc::decoder::decode_udp(&buf[..sz]) {
                        Ok((_rest, pkt)) => forward_packet(pkt, &prefix, &tx),
                        Err(e) => logd!("OSC", "decode error: {e:?}"),
                    },
                    Err(e)
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) => {}
                    Err(e) => {
                        logd!("OSC", "recv error: {e}");
                        std::thread::sleep(Duration::from_millis(10));
                    }
                }
            }
        })
        .map_err(|e| EngineError::Osc(format!("failed to spawn listener: {e}")))?;

    Ok(OscHandle {
        stop_tx,
        join: Some(join),
        bind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knob_address_is_one_based_and_clamped() {
        let ev = decode_message("/warpeye", "/warpeye/knob/3", &[OscType::Float(1.5)]);
        assert_eq!(
            ev,
            Some(ControllerEvent::Knob {
                index: 2,
                value: 1.0,
                source: EventSource::Osc
            })
        );
    }

    #[test]
    fn pad_address_maps_truthiness() {
        assert_eq!(
            decode_message("/warpeye", "/warpeye/pad/2", &[OscType::Int(1)]),
            Some(ControllerEvent::Pad { pad: 2, on: true })
        );
        assert_eq!(
            decode_message("/warpeye", "/warpeye/pad/2", &[OscType::Bool(false)]),
            Some(ControllerEvent::Pad { pad: 2, on: false })
        );
    }

    #[test]
    fn rejects_foreign_or_malformed_addresses() {
        let args = [OscType::Float(0.5)];
        assert!(decode_message("/warpeye", "/other/knob/1", &args).is_none());
        assert!(decode_message("/warpeye", "/warpeyeknob/1", &args).is_none());
        assert!(decode_message("/warpeye", "/warpeye2/knob/1", &args).is_none());
        assert!(decode_message("/warpeye", "/warpeye/knob/0", &args).is_none());
        assert!(decode_message("/warpeye", "/warpeye/knob/9", &args).is_none());
        assert!(decode_message("/warpeye", "/warpeye/knob/1/x", &args).is_none());
        assert!(decode_message("/warpeye", "/warpeye/knob/1", &[]).is_none());
    }

    #[test]
    fn listener_forwards_udp_messages() {
        // Grab a free port, then hand it to the listener.
        let spare = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = spare.local_addr().unwrap();
        drop(spare);
        let cfg = OscConfig {
            enabled: true,
            bind: addr.to_string(),
            prefix: "/warpeye".into(),
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = connect(&cfg, tx).unwrap();

        let msg = rosc::encoder::encode(&OscPacket::Message(rosc::OscMessage {
            addr: "/warpeye/knob/1".into(),
            args: vec![OscType::Float(0.25)],
        }))
        .unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&msg, addr).unwrap();

        let ev = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            ev,
            ControllerEvent::Knob {
                index: 0,
                value: 0.25,
                source: EventSource::Osc
            }
        );
        drop(handle);
    }
}
