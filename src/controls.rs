use crate::midi::{DATA_MAX, MidiMessage};

/// Control Change value sent when a toggle button switches on
pub const CC_ON: u8 = DATA_MAX;
/// Control Change value sent when a toggle button switches off
pub const CC_OFF: u8 = 0;
/// Knob position at startup
pub const KNOB_DEFAULT: u8 = 63;
/// All pedal controls talk on MIDI channel 1
pub const CONTROL_CHANNEL: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
}

impl Button {
    pub const ALL: [Button; 2] = [Button::A, Button::B];

    pub fn index(self) -> usize {
        match self {
            Button::A => 0,
            Button::B => 1,
        }
    }

    pub fn controller(self) -> u8 {
        16 + self.index() as u8
    }

    /// Key of this button's caption in the label set
    pub fn label_key(self) -> &'static str {
        match self {
            Button::A => "buttonA",
            Button::B => "buttonB",
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Knob {
    One,
    Two,
    Three,
    Four,
}

impl Knob {
    pub const ALL: [Knob; 4] = [Knob::One, Knob::Two, Knob::Three, Knob::Four];

    pub fn index(self) -> usize {
        match self {
            Knob::One => 0,
            Knob::Two => 1,
            Knob::Three => 2,
            Knob::Four => 3,
        }
    }

    pub fn controller(self) -> u8 {
        20 + self.index() as u8
    }

    pub fn label_key(self) -> &'static str {
        match self {
            Knob::One => "knob1",
            Knob::Two => "knob2",
            Knob::Three => "knob3",
            Knob::Four => "knob4",
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            Knob::One => "KNOB 1",
            Knob::Two => "KNOB 2",
            Knob::Three => "KNOB 3",
            Knob::Four => "KNOB 4",
        }
    }
}

/// Current position of every pedal control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    knobs: [u8; 4],
    buttons: [bool; 2],
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            knobs: [KNOB_DEFAULT; 4],
            buttons: [false; 2],
        }
    }
}

impl ControlState {
    pub fn knob(&self, knob: Knob) -> u8 {
        self.knobs[knob.index()]
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons[button.index()]
    }

    /// Move a knob. Returns the message to send, or `None` if the position didn't change.
    pub fn set_knob(&mut self, knob: Knob, value: u8) -> Option<MidiMessage> {
        let value = value.min(DATA_MAX);
        let slot = &mut self.knobs[knob.index()];
        if *slot == value {
            return None;
        }
        *slot = value;
        Some(MidiMessage::control_change(
            CONTROL_CHANNEL,
            knob.controller(),
            value,
        ))
    }

    /// Set a toggle button. Always produces a message, matching a click on the pedal.
    pub fn set_button(&mut self, button: Button, on: bool) -> MidiMessage {
        self.buttons[button.index()] = on;
        MidiMessage::control_change(
            CONTROL_CHANNEL,
            button.controller(),
            if on { CC_ON } else { CC_OFF },
        )
    }
}
