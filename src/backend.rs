use crate::error::{Error, Result};
use crate::relay::{Envelope, RelaySender};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};

/// Whether a device concerns MIDI input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// An open input. Messages flow into the relay until the handle is closed.
pub trait InputHandle {
    /// Stop delivery and release the device
    fn close(self: Box<Self>);
}

/// An open output
pub trait OutputHandle {
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Release the device
    fn close(self: Box<Self>);
}

/// The platform MIDI subsystem
pub trait MidiBackend {
    fn list_inputs(&self) -> Result<Vec<String>>;

    fn list_outputs(&self) -> Result<Vec<String>>;

    /// Open the input called `name`; every message it receives is pushed into `relay`
    fn open_input(&mut self, name: &str, relay: RelaySender) -> Result<Box<dyn InputHandle>>;

    fn open_output(&mut self, name: &str) -> Result<Box<dyn OutputHandle>>;

    fn list(&self, direction: Direction) -> Result<Vec<String>> {
        match direction {
            Direction::Input => self.list_inputs(),
            Direction::Output => self.list_outputs(),
        }
    }
}

/// [`MidiBackend`] on top of midir
pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn find_input_port(midi_in: &MidiInput, name: &str) -> Result<MidiInputPort> {
        midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
    }

    fn find_output_port(midi_out: &MidiOutput, name: &str) -> Result<MidiOutputPort> {
        midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
    }
}

impl MidiBackend for MidirBackend {
    fn list_inputs(&self) -> Result<Vec<String>> {
        let midi_in = MidiInput::new(&format!("{}-probe", self.client_name))?;
        let mut devices = Vec::new();

        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                devices.push(name);
            }
        }

        Ok(devices)
    }

    fn list_outputs(&self) -> Result<Vec<String>> {
        let midi_out = MidiOutput::new(&format!("{}-probe", self.client_name))?;
        let mut devices = Vec::new();

        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                devices.push(name);
            }
        }

        Ok(devices)
    }

    fn open_input(&mut self, name: &str, relay: RelaySender) -> Result<Box<dyn InputHandle>> {
        let mut midi_in = MidiInput::new(&self.client_name)?;
        midi_in.ignore(Ignore::None);

        // Resolve by name now; the port index may have moved since the last enumeration
        let port = Self::find_input_port(&midi_in, name)?;
        let source = name.to_string();

        let connection = midi_in.connect(
            &port,
            &format!("{}-input", self.client_name),
            move |timestamp, data, _| {
                if !relay.push(Envelope {
                    timestamp,
                    source: source.clone(),
                    data: data.to_vec(),
                }) {
                    tracing::trace!("Relay full, dropped message from '{}'", source);
                }
            },
            (),
        )?;

        tracing::info!("Opened MIDI input '{}'", name);
        Ok(Box::new(MidirInput {
            connection,
            name: name.to_string(),
        }))
    }

    fn open_output(&mut self, name: &str) -> Result<Box<dyn OutputHandle>> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        let port = Self::find_output_port(&midi_out, name)?;

        let connection = midi_out.connect(&port, &format!("{}-output", self.client_name))?;

        tracing::info!("Opened MIDI output '{}'", name);
        Ok(Box::new(MidirOutput {
            connection,
            name: name.to_string(),
        }))
    }
}

struct MidirInput {
    connection: MidiInputConnection<()>,
    name: String,
}

impl InputHandle for MidirInput {
    fn close(self: Box<Self>) {
        let MidirInput { connection, name } = *self;
        // closing the connection stops the callback before the port is released
        let _ = connection.close();
        tracing::info!("Closed MIDI input '{}'", name);
    }
}

struct MidirOutput {
    connection: MidiOutputConnection,
    name: String,
}

impl OutputHandle for MidirOutput {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.connection.send(data)?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        let MidirOutput { connection, name } = *self;
        let _ = connection.close();
        tracing::info!("Closed MIDI output '{}'", name);
    }
}
