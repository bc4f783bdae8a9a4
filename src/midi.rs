//! Raw MIDI message parsing and the mapping of MIDI messages to plugin parameters.

use crate::parameter::{PluginParameterId, PluginParameters};

// -------------------------------------------------------------------------------------------------

/// A decoded MIDI channel or system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOff { channel: u8, key: u8, velocity: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    Aftertouch { channel: u8, key: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// Pitch bend with a signed, centered value in range `-8192..=8191`.
    PitchBend { channel: u8, value: i16 },
    System { status: u8 },
}

impl MidiMessage {
    /// Decode a raw MIDI message. Returns `None` for running status or truncated messages.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status & 0x80 == 0 {
            return None;
        }
        let channel = status & 0x0F;
        let data_byte = |index: usize| data.get(index).map(|byte| byte & 0x7F);
        let message = match status & 0xF0 {
            0x80 => Self::NoteOff {
                channel,
                key: data_byte(0)?,
                velocity: data_byte(1)?,
            },
            0x90 => Self::NoteOn {
                channel,
                key: data_byte(0)?,
                velocity: data_byte(1)?,
            },
            0xA0 => Self::Aftertouch {
                channel,
                key: data_byte(0)?,
                pressure: data_byte(1)?,
            },
            0xB0 => Self::ControlChange {
                channel,
                controller: data_byte(0)?,
                value: data_byte(1)?,
            },
            0xC0 => Self::ProgramChange {
                channel,
                program: data_byte(0)?,
            },
            0xD0 => Self::ChannelPressure {
                channel,
                pressure: data_byte(0)?,
            },
            0xE0 => {
                let lsb = data_byte(0)? as i16;
                let msb = data_byte(1)? as i16;
                Self::PitchBend {
                    channel,
                    value: ((msb << 7) | lsb) - 8192,
                }
            }
            _ => Self::System { status },
        };
        Some(message)
    }
}

// -------------------------------------------------------------------------------------------------

/// A raw, timestamped MIDI message as passed in by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset within the processed host buffer at which the event applies.
    pub sample_offset: usize,
    data: [u8; 3],
    len: u8,
}

impl MidiEvent {
    /// Create a new event from raw MIDI bytes. Bytes past the first three are ignored.
    pub fn new(sample_offset: usize, bytes: &[u8]) -> Self {
        let mut data = [0; 3];
        let len = bytes.len().min(data.len());
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            sample_offset,
            data,
            len: len as u8,
        }
    }

    /// The event's raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Decode the event's message.
    pub fn message(&self) -> Option<MidiMessage> {
        MidiMessage::parse(self.bytes())
    }
}

// -------------------------------------------------------------------------------------------------

/// The parameter a MIDI continuous controller is mapped to, if any.
pub const fn cc_parameter(controller: u8) -> Option<PluginParameterId> {
    match controller {
        2 => Some(PluginParameterId::Pitch),
        7 | 11 => Some(PluginParameterId::Volume),
        10 => Some(PluginParameterId::Pan),
        _ => None,
    }
}

/// Apply a MIDI message to the plugin's parameters.
///
/// Note on and off messages and aftertouch control the volume, continuous controllers are
/// scaled into the range of the parameter they are mapped to.
pub fn apply_midi_message(parameters: &PluginParameters, message: &MidiMessage) {
    match *message {
        MidiMessage::NoteOn { velocity, .. } => {
            parameters.set(PluginParameterId::Volume, velocity as f32 / 127.0);
        }
        MidiMessage::NoteOff { .. } => {
            parameters.set(PluginParameterId::Volume, 0.0);
        }
        MidiMessage::Aftertouch { pressure, .. } => {
            parameters.set(PluginParameterId::Volume, pressure as f32 / 127.0);
        }
        MidiMessage::ControlChange {
            controller, value, ..
        } => {
            if let Some(id) = cc_parameter(controller) {
                let description = id.description();
                let range = description.range();
                let value = range.start() + (range.end() - range.start()) * value as f32 / 127.0;
                parameters.set(id, value);
            }
        }
        MidiMessage::ProgramChange { .. }
        | MidiMessage::ChannelPressure { .. }
        | MidiMessage::PitchBend { .. }
        | MidiMessage::System { .. } => {
            log::debug!("Ignoring MIDI message: {message:?}");
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!(
            MidiMessage::parse(&[0x93, 60, 100]),
            Some(MidiMessage::NoteOn {
                channel: 3,
                key: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiMessage::parse(&[0xB0, 7, 127]),
            Some(MidiMessage::ControlChange {
                channel: 0,
                controller: 7,
                value: 127
            })
        );
        assert_eq!(
            MidiMessage::parse(&[0xE1, 0x00, 0x40]),
            Some(MidiMessage::PitchBend {
                channel: 1,
                value: 0
            })
        );
        assert_eq!(
            MidiMessage::parse(&[0xF8]),
            Some(MidiMessage::System { status: 0xF8 })
        );
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
        assert_eq!(MidiMessage::parse(&[60, 100]), None);
        assert_eq!(MidiMessage::parse(&[]), None);

        let event = MidiEvent::new(12, &[0x80, 60, 0, 0xFF]);
        assert_eq!(event.bytes(), &[0x80, 60, 0]);
        assert!(matches!(
            event.message(),
            Some(MidiMessage::NoteOff { key: 60, .. })
        ));
    }

    #[test]
    fn parameter_mapping() {
        let parameters = PluginParameters::new(0.0);
        let apply = |bytes: &[u8]| {
            apply_midi_message(&parameters, &MidiMessage::parse(bytes).unwrap());
        };

        apply(&[0x90, 60, 127]);
        assert_eq!(parameters.read(PluginParameterId::Volume), 1.0);
        apply(&[0x80, 60, 64]);
        assert_eq!(parameters.read(PluginParameterId::Volume), 0.0);
        apply(&[0xA0, 60, 127]);
        assert_eq!(parameters.read(PluginParameterId::Volume), 1.0);

        apply(&[0xB5, 10, 0]);
        assert_eq!(parameters.read(PluginParameterId::Pan), 0.0);
        apply(&[0xB0, 2, 127]);
        assert_eq!(parameters.read(PluginParameterId::Pitch), 24.0);
        apply(&[0xB0, 11, 0]);
        assert_eq!(parameters.read(PluginParameterId::Volume), 0.0);

        // unmapped controllers and other messages are ignored
        apply(&[0xB0, 1, 127]);
        apply(&[0xE0, 0x7F, 0x7F]);
        assert_eq!(parameters.read(PluginParameterId::Volume), 0.0);
        assert_eq!(parameters.read(PluginParameterId::Pitch), 24.0);
    }
}
