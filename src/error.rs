use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI error: {0}")]
    Midi(#[from] midir::InitError),

    #[error("MIDI input connection error: {0}")]
    MidiInputConnection(#[from] midir::ConnectError<midir::MidiInput>),

    #[error("MIDI output connection error: {0}")]
    MidiOutputConnection(#[from] midir::ConnectError<midir::MidiOutput>),

    #[error("MIDI send error: {0}")]
    MidiSend(#[from] midir::SendError),

    #[error("Invalid MIDI message: {0}")]
    InvalidMidiMessage(String),

    #[error("Device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
