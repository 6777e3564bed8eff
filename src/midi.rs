use crate::error::{Error, Result};

/// MIDI note number (0-127)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MidiNote(u8);

impl MidiNote {
    pub fn new(note: u8) -> Result<Self> {
        if note > 127 {
            return Err(Error::InvalidMidiMessage(format!(
                "Note number {} out of range (0-127)",
                note
            )));
        }
        Ok(Self(note))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Get the octave number (-1 to 9)
    pub fn octave(&self) -> i8 {
        (self.0 as i8 / 12) - 1
    }

    /// Get the note name (C, C#, D, etc.)
    pub fn name(&self) -> &'static str {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        NAMES[self.0 as usize % 12]
    }

    /// Get full note name with octave (e.g., "C4", "A#3")
    pub fn full_name(&self) -> String {
        format!("{}{}", self.name(), self.octave())
    }

    /// Whether this note sits on a black key
    pub fn is_black(&self) -> bool {
        matches!(self.0 % 12, 1 | 3 | 6 | 8 | 10)
    }
}

impl std::fmt::Display for MidiNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Largest value a 7-bit MIDI data byte can carry
pub const DATA_MAX: u8 = 0x7F;

/// A MIDI channel voice message, or anything else passed through verbatim.
///
/// Channels are 0-based here and shown 1-based by [`MidiMessage::description`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn {
        channel: u8,
        note: MidiNote,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: MidiNote,
        velocity: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    Other(Vec<u8>),
}

impl MidiMessage {
    pub fn note_on(channel: u8, note: MidiNote, velocity: u8) -> Self {
        Self::NoteOn {
            channel: channel & 0x0F,
            note,
            velocity: velocity & DATA_MAX,
        }
    }

    pub fn note_off(channel: u8, note: MidiNote, velocity: u8) -> Self {
        Self::NoteOff {
            channel: channel & 0x0F,
            note,
            velocity: velocity & DATA_MAX,
        }
    }

    /// Control Change; out-of-range controller numbers and values are masked to 7 bits
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::ControlChange {
            channel: channel & 0x0F,
            controller: controller & DATA_MAX,
            value: value & DATA_MAX,
        }
    }

    /// Parse a raw MIDI message
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(&status) = data.first() else {
            return Err(Error::InvalidMidiMessage("Empty message".to_string()));
        };

        let message_type = status & 0xF0;
        let channel = status & 0x0F;

        match message_type {
            0x80 | 0x90 | 0xB0 if data.len() < 3 => Err(Error::InvalidMidiMessage(format!(
                "Message too short: {} bytes for status 0x{:02X}",
                data.len(),
                status
            ))),
            0x80 => Ok(Self::NoteOff {
                channel,
                note: MidiNote::new(data[1])?,
                velocity: data[2],
            }),
            0x90 => {
                // Note On with velocity 0 is a Note Off
                let note = MidiNote::new(data[1])?;
                let velocity = data[2];
                if velocity == 0 {
                    Ok(Self::NoteOff {
                        channel,
                        note,
                        velocity,
                    })
                } else {
                    Ok(Self::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xB0 => Ok(Self::ControlChange {
                channel,
                controller: data[1] & DATA_MAX,
                value: data[2] & DATA_MAX,
            }),
            _ => Ok(Self::Other(data.to_vec())),
        }
    }

    /// Encode into wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | channel, note.value(), *velocity],
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | channel, note.value(), *velocity],
            Self::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | channel, *controller, *value],
            Self::Other(bytes) => bytes.clone(),
        }
    }

    /// One-line human readable description, used by the monitor
    pub fn description(&self) -> String {
        match self {
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => format!(
                "Note on {} Velocity {} Channel {}",
                note,
                velocity,
                channel + 1
            ),
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => format!(
                "Note off {} Velocity {} Channel {}",
                note,
                velocity,
                channel + 1
            ),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => format!("Controller {}: {} Channel {}", controller, value, channel + 1),
            Self::Other(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
                format!("Raw {}", hex.join(" "))
            }
        }
    }
}

impl std::fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}
