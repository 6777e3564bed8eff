//! Owns the device lists, the relay and the monitor, and applies every user action.

use crate::backend::{Direction, MidiBackend};
use crate::config::AppConfig;
use crate::controls::{Button, ControlState, Knob};
use crate::devices::{DeviceDirectory, RefreshOutcome, Selection};
use crate::labels::LabelSet;
use crate::midi::{MidiMessage, MidiNote};
use crate::relay::{Envelope, RelayReceiver, RelaySender, relay};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

/// Everything the user can do to the application
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    KeyPressed(MidiNote),
    KeyReleased(MidiNote),
    KnobChanged { knob: Knob, value: u8 },
    ButtonToggled { button: Button, on: bool },
    SelectionChanged {
        direction: Direction,
        selection: Selection,
    },
    LabelEdited { name: String, text: String },
    SaveLabels(PathBuf),
    LoadLabels(PathBuf),
    RefreshDevices,
    ClearLog,
}

/// Bounded list of monitor lines, oldest first
#[derive(Debug)]
pub struct Monitor {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Monitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Monitor line for one incoming message
pub fn format_envelope(envelope: &Envelope) -> String {
    let description = match MidiMessage::parse(&envelope.data) {
        Ok(msg) => msg.description(),
        Err(e) => format!("{} ({})", MidiMessage::Other(envelope.data.clone()), e),
    };
    format!("{:.3}s  {}", envelope.timestamp_secs(), description)
}

pub struct Controller<B: MidiBackend> {
    backend: B,
    inputs: DeviceDirectory,
    outputs: DeviceDirectory,
    relay_tx: RelaySender,
    relay_rx: RelayReceiver,
    monitor: Monitor,
    labels: LabelSet,
    controls: ControlState,
    config: AppConfig,
    last_refresh: Option<Instant>,
    status: String,
}

impl<B: MidiBackend> Controller<B> {
    pub fn new(backend: B, config: AppConfig) -> Self {
        let (relay_tx, relay_rx) = relay(config.relay_capacity);
        Self {
            backend,
            inputs: DeviceDirectory::new(Direction::Input),
            outputs: DeviceDirectory::new(Direction::Output),
            relay_tx,
            relay_rx,
            monitor: Monitor::new(config.log_capacity),
            labels: LabelSet::default(),
            controls: ControlState::default(),
            config,
            last_refresh: None,
            status: "Ready".to_string(),
        }
    }

    /// Run `waker` whenever an input delivers a message. Affects inputs opened afterwards.
    pub fn set_relay_waker(&mut self, waker: impl Fn() + Send + Sync + 'static) {
        self.relay_tx = self.relay_tx.clone().with_waker(waker);
    }

    pub fn directory(&self, direction: Direction) -> &DeviceDirectory {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn controls(&self) -> &ControlState {
        &self.controls
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Messages lost because the relay was full
    pub fn dropped_messages(&self) -> u64 {
        self.relay_rx.dropped()
    }

    fn log(&mut self, message: String) {
        tracing::info!("{}", message);
        self.monitor.push(message);
    }

    /// Periodic work: re-read the device lists when due, then deliver incoming messages.
    /// Returns the number of messages delivered to the monitor.
    pub fn tick(&mut self, now: Instant) -> usize {
        let due = self
            .last_refresh
            .is_none_or(|last| now.duration_since(last) >= self.config.refresh_interval());
        if due {
            self.last_refresh = Some(now);
            self.refresh_devices();
        }
        self.drain_incoming()
    }

    /// Reconcile inputs, then outputs, against the OS
    pub fn refresh_devices(&mut self) {
        for direction in [Direction::Input, Direction::Output] {
            let directory = match direction {
                Direction::Input => &mut self.inputs,
                Direction::Output => &mut self.outputs,
            };
            match directory.refresh(&self.backend) {
                Ok(RefreshOutcome::Unchanged) => {}
                Ok(RefreshOutcome::Updated { closed, .. }) => {
                    let count = directory.len();
                    for name in closed {
                        self.log(format!("{} '{}' disconnected", direction, name));
                    }
                    tracing::debug!("{} {} device(s) available", count, direction);
                }
                Err(e) => {
                    tracing::error!("Error listing {} devices: {}", direction, e);
                    self.status = format!("Error listing {} devices", direction);
                }
            }
        }
    }

    /// Move every queued incoming message into the monitor, in arrival order
    pub fn drain_incoming(&mut self) -> usize {
        let monitor = &mut self.monitor;
        self.relay_rx
            .drain(|envelope| monitor.push(format_envelope(&envelope)))
    }

    /// Apply one user action
    pub fn update(&mut self, event: AppEvent) {
        match event {
            AppEvent::KeyPressed(note) => {
                let msg = MidiMessage::note_on(
                    self.config.keyboard_channel,
                    note,
                    self.config.keyboard_velocity,
                );
                self.send_to_outputs(&msg);
            }
            AppEvent::KeyReleased(note) => {
                let msg = MidiMessage::note_off(self.config.keyboard_channel, note, 0);
                self.send_to_outputs(&msg);
            }
            AppEvent::KnobChanged { knob, value } => {
                if let Some(msg) = self.controls.set_knob(knob, value) {
                    self.send_to_outputs(&msg);
                }
            }
            AppEvent::ButtonToggled { button, on } => {
                let msg = self.controls.set_button(button, on);
                self.send_to_outputs(&msg);
            }
            AppEvent::SelectionChanged {
                direction,
                selection,
            } => self.change_selection(direction, selection),
            AppEvent::LabelEdited { name, text } => {
                self.labels.set(name, text);
            }
            AppEvent::SaveLabels(path) => match self.labels.to_file(&path) {
                Ok(()) => {
                    self.status = format!("Saved labels to {}", path.display());
                    tracing::info!("{}", self.status);
                }
                Err(e) => self.log(format!("Error saving labels: {}", e)),
            },
            AppEvent::LoadLabels(path) => match LabelSet::from_file(&path) {
                Ok(labels) => {
                    self.labels = labels;
                    self.status = format!("Loaded labels from {}", path.display());
                    tracing::info!("{}", self.status);
                }
                Err(e) => self.log(format!("Error loading labels: {}", e)),
            },
            AppEvent::RefreshDevices => self.refresh_devices(),
            AppEvent::ClearLog => self.monitor.clear(),
        }
    }

    fn change_selection(&mut self, direction: Direction, selection: Selection) {
        let directory = match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        };
        let failures = directory.on_selection_changed(&mut self.backend, &self.relay_tx, selection);
        let open = directory.selection().len();

        for (name, e) in failures {
            self.log(format!("Could not open {} '{}': {}", direction, name, e));
        }
        self.status = format!(
            "{} input(s), {} output(s) open",
            self.inputs.selection().len(),
            self.outputs.selection().len()
        );
        tracing::debug!("{} {} device(s) open", open, direction);
    }

    /// Send `msg` to every open output
    pub fn send_to_outputs(&mut self, msg: &MidiMessage) {
        tracing::debug!("Sending: {}", msg);
        for (name, e) in self.outputs.send_to_open(&msg.to_bytes()) {
            tracing::warn!("Error sending to '{}': {}", name, e);
            self.status = format!("Send to '{}' failed", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use std::time::Duration;

    fn controller(backend: &FakeBackend) -> Controller<FakeBackend> {
        Controller::new(backend.clone(), AppConfig::default())
    }

    fn selection(indices: &[usize]) -> Selection {
        indices.iter().copied().collect()
    }

    fn note(n: u8) -> MidiNote {
        MidiNote::new(n).unwrap()
    }

    #[test]
    fn test_incoming_messages_reach_monitor_in_order() {
        let backend = FakeBackend::with_devices(&["SynthA"], &[]);
        let mut app = controller(&backend);
        app.refresh_devices();
        app.update(AppEvent::SelectionChanged {
            direction: Direction::Input,
            selection: selection(&[0]),
        });

        assert!(backend.emit("SynthA", 1_000_000, &[0x90, 60, 100]));
        assert!(backend.emit("SynthA", 1_500_000, &[0x90, 62, 100]));
        assert_eq!(app.drain_incoming(), 2);

        let lines: Vec<&str> = app.monitor().lines().collect();
        assert_eq!(
            lines,
            vec![
                "1.000s  Note on C4 Velocity 100 Channel 1",
                "1.500s  Note on D4 Velocity 100 Channel 1",
            ]
        );
    }

    #[test]
    fn test_closed_input_stops_delivering() {
        let backend = FakeBackend::with_devices(&["SynthA"], &[]);
        let mut app = controller(&backend);
        app.refresh_devices();
        app.update(AppEvent::SelectionChanged {
            direction: Direction::Input,
            selection: selection(&[0]),
        });
        app.update(AppEvent::SelectionChanged {
            direction: Direction::Input,
            selection: selection(&[]),
        });

        assert!(!backend.emit("SynthA", 0, &[0x90, 60, 100]));
        assert_eq!(app.drain_incoming(), 0);
    }

    #[test]
    fn test_unplug_scenario() {
        let backend = FakeBackend::with_devices(&["SynthA", "SynthB"], &[]);
        let mut app = controller(&backend);
        app.refresh_devices();
        app.update(AppEvent::SelectionChanged {
            direction: Direction::Input,
            selection: selection(&[0]),
        });
        assert_eq!(backend.opened(Direction::Input), vec!["SynthA"]);

        backend.set_inputs(&["SynthB"]);
        app.refresh_devices();

        let inputs = app.directory(Direction::Input);
        assert_eq!(inputs.names().collect::<Vec<_>>(), vec!["SynthB"]);
        assert!(inputs.selection().is_empty());
        assert_eq!(backend.closed(Direction::Input), vec!["SynthA"]);
        assert!(app.monitor().lines().any(|l| l.contains("'SynthA' disconnected")));
    }

    #[test]
    fn test_tick_refreshes_on_interval() {
        let backend = FakeBackend::with_devices(&["A"], &["B"]);
        let mut app = controller(&backend);
        let start = Instant::now();

        app.tick(start);
        assert_eq!(backend.state.borrow().list_calls, 2);

        app.tick(start + Duration::from_millis(100));
        assert_eq!(backend.state.borrow().list_calls, 2);

        app.tick(start + Duration::from_millis(500));
        assert_eq!(backend.state.borrow().list_calls, 4);
        assert_eq!(app.directory(Direction::Output).len(), 1);
    }

    #[test]
    fn test_controls_go_to_open_outputs_only() {
        let backend = FakeBackend::with_devices(&[], &["Out1", "Out2"]);
        let mut app = controller(&backend);
        app.refresh_devices();
        app.update(AppEvent::SelectionChanged {
            direction: Direction::Output,
            selection: selection(&[1]),
        });

        app.update(AppEvent::KnobChanged {
            knob: Knob::One,
            value: 90,
        });
        app.update(AppEvent::ButtonToggled {
            button: Button::A,
            on: true,
        });
        app.update(AppEvent::KeyPressed(note(60)));
        app.update(AppEvent::KeyReleased(note(60)));

        let sent = backend.state.borrow().sent.clone();
        assert!(sent.iter().all(|(name, _)| name == "Out2"));
        let bytes: Vec<Vec<u8>> = sent.into_iter().map(|(_, b)| b).collect();
        assert_eq!(
            bytes,
            vec![
                vec![0xB0, 20, 90],
                vec![0xB0, 16, 127],
                vec![0x90, 60, 100],
                vec![0x80, 60, 0],
            ]
        );
        assert_eq!(app.controls().knob(Knob::One), 90);
    }

    #[test]
    fn test_open_failure_is_logged_and_rolled_back() {
        let backend = FakeBackend::with_devices(&[], &["Busy"]);
        backend.state.borrow_mut().fail_open.insert("Busy".to_string());
        let mut app = controller(&backend);
        app.refresh_devices();
        app.update(AppEvent::SelectionChanged {
            direction: Direction::Output,
            selection: selection(&[0]),
        });

        assert!(app.directory(Direction::Output).selection().is_empty());
        assert!(app.monitor().lines().any(|l| l.starts_with("Could not open output 'Busy'")));
    }

    #[test]
    fn test_send_failure_does_not_stop_other_outputs() {
        let backend = FakeBackend::with_devices(&[], &["Flaky", "Good"]);
        let mut app = controller(&backend);
        app.refresh_devices();
        app.update(AppEvent::SelectionChanged {
            direction: Direction::Output,
            selection: selection(&[0, 1]),
        });

        backend.state.borrow_mut().fail_open.insert("Flaky".to_string());
        app.update(AppEvent::ButtonToggled {
            button: Button::B,
            on: true,
        });

        let sent = backend.state.borrow().sent.clone();
        assert_eq!(sent, vec![("Good".to_string(), vec![0xB0, 17, 127])]);
        assert_eq!(app.status(), "Send to 'Flaky' failed");
    }

    #[test]
    fn test_labels_edit_save_load() {
        let path = std::env::temp_dir().join(format!("midi-pedal-ctl-{}.json", std::process::id()));
        let backend = FakeBackend::default();
        let mut app = controller(&backend);

        app.update(AppEvent::LabelEdited {
            name: "knob4".to_string(),
            text: "Reverb".to_string(),
        });
        app.update(AppEvent::SaveLabels(path.clone()));
        app.update(AppEvent::LabelEdited {
            name: "knob4".to_string(),
            text: "Something else".to_string(),
        });
        app.update(AppEvent::LoadLabels(path.clone()));
        std::fs::remove_file(&path).unwrap();

        assert_eq!(app.labels().knob(Knob::Four), "Reverb");

        app.update(AppEvent::LoadLabels(path));
        assert!(app.monitor().lines().any(|l| l.starts_with("Error loading labels")));
        assert_eq!(app.labels().knob(Knob::Four), "Reverb");
    }

    #[test]
    fn test_monitor_is_bounded() {
        let mut monitor = Monitor::new(2);
        monitor.push("a".to_string());
        monitor.push("b".to_string());
        monitor.push("c".to_string());
        assert_eq!(monitor.lines().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_format_unparseable_envelope() {
        let line = format_envelope(&Envelope {
            timestamp: 0,
            source: "A".to_string(),
            data: vec![0x90, 60],
        });
        assert!(line.starts_with("0.000s  Raw 90 3C"));
    }
}
