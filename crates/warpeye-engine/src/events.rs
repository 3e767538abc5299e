/// Where a controller event came from.
///
/// Soft takeover only applies to physical knobs; OSC values are absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Midi,
    Osc,
}

/// One raw input event, pushed by a transport thread and drained by
/// `ControllerState::poll` on the render thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Knob `index` (0-based) moved to `value` in [0,1].
    Knob {
        index: usize,
        value: f32,
        source: EventSource,
    },

    /// Pad `pad` (1-based) changed to on/off.
    Pad { pad: u8, on: bool },
}
