//! Tracks the OS device list for one direction and keeps open connections in step with it.

use crate::backend::{Direction, InputHandle, MidiBackend, OutputHandle};
use crate::error::{Error, Result};
use crate::relay::RelaySender;
use std::collections::{BTreeSet, HashSet};

/// Positions of selected rows in a device list
pub type Selection = BTreeSet<usize>;

/// One device as last reported by the OS, plus its connection if open
pub struct DeviceRecord {
    name: String,
    input: Option<Box<dyn InputHandle>>,
    output: Option<Box<dyn OutputHandle>>,
}

impl DeviceRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            input: None,
            output: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some() || self.output.is_some()
    }

    fn close(&mut self) {
        // inputs stop delivering before the port goes away
        if let Some(input) = self.input.take() {
            input.close();
        }
        if let Some(output) = self.output.take() {
            output.close();
        }
    }
}

impl std::fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

/// What a refresh did to the list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshOutcome {
    /// Same names in the same order; nothing was touched
    #[default]
    Unchanged,
    Updated {
        /// Devices that disappeared while open and were closed
        closed: Vec<String>,
        /// Names seen for the first time
        added: Vec<String>,
        /// Names that disappeared
        removed: Vec<String>,
    },
}

/// The device list for one direction, in OS enumeration order
pub struct DeviceDirectory {
    direction: Direction,
    devices: Vec<DeviceRecord>,
    selection: Selection,
    generation: u64,
}

impl DeviceDirectory {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            devices: Vec::new(),
            selection: Selection::new(),
            generation: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name())
    }

    /// Rows the list widget should show as selected
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Bumped every time the list is replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.name == name)
    }

    /// Re-read the OS device list and reconcile against it
    pub fn refresh(&mut self, backend: &dyn MidiBackend) -> Result<RefreshOutcome> {
        let names = backend.list(self.direction)?;
        Ok(self.reconcile(names))
    }

    /// Make the list match `current_names`. Never opens anything.
    pub fn reconcile(&mut self, current_names: Vec<String>) -> RefreshOutcome {
        let current_names = self.dedup(current_names);

        if self.devices.len() == current_names.len()
            && self
                .devices
                .iter()
                .zip(&current_names)
                .all(|(d, n)| d.name == *n)
        {
            return RefreshOutcome::Unchanged;
        }

        let present: HashSet<&str> = current_names.iter().map(String::as_str).collect();
        let mut closed = Vec::new();
        let mut removed = Vec::new();

        let mut survivors: Vec<DeviceRecord> = Vec::with_capacity(self.devices.len());
        for mut device in self.devices.drain(..) {
            if present.contains(device.name.as_str()) {
                survivors.push(device);
                continue;
            }
            if device.is_open() {
                tracing::info!("{} '{}' was unplugged, closing it", self.direction, device.name);
                device.close();
                closed.push(device.name.clone());
            }
            removed.push(device.name);
        }

        let mut added = Vec::new();
        let mut devices = Vec::with_capacity(current_names.len());
        for name in current_names {
            match survivors.iter().position(|d| d.name == name) {
                Some(i) => devices.push(survivors.swap_remove(i)),
                None => {
                    added.push(name.clone());
                    devices.push(DeviceRecord::new(name));
                }
            }
        }

        self.devices = devices;
        self.generation += 1;
        self.sync_selection();

        tracing::debug!(
            "{} list now has {} device(s): +{:?} -{:?}",
            self.direction,
            self.devices.len(),
            added,
            removed
        );

        RefreshOutcome::Updated {
            closed,
            added,
            removed,
        }
    }

    /// The list widget's selection was edited by the user.
    ///
    /// Rows that left the selection are closed and rows that joined it are opened.
    /// Rows that fail to open are dropped from the selection and reported back.
    pub fn on_selection_changed(
        &mut self,
        backend: &mut dyn MidiBackend,
        relay: &RelaySender,
        new_selection: Selection,
    ) -> Vec<(String, Error)> {
        let len = self.devices.len();
        debug_assert!(
            new_selection.iter().all(|&i| i < len),
            "selection {:?} out of range for {} {} device(s)",
            new_selection,
            len,
            self.direction
        );
        let new_selection: Selection = new_selection.into_iter().filter(|&i| i < len).collect();

        if new_selection == self.selection {
            return Vec::new();
        }

        let to_close: Vec<usize> = self.selection.difference(&new_selection).copied().collect();
        let to_open: Vec<usize> = new_selection.difference(&self.selection).copied().collect();

        for index in to_close {
            self.close(index);
        }

        let mut failures = Vec::new();
        for index in to_open {
            if let Err(e) = self.open(backend, relay, index) {
                failures.push((self.devices[index].name.clone(), e));
            }
        }

        self.sync_selection();
        failures
    }

    /// Open the device at `index`
    pub fn open(
        &mut self,
        backend: &mut dyn MidiBackend,
        relay: &RelaySender,
        index: usize,
    ) -> Result<()> {
        let direction = self.direction;
        let device = self.devices.get_mut(index).ok_or_else(|| {
            Error::Device(format!("no {} device at position {}", direction, index))
        })?;
        debug_assert!(!device.is_open(), "'{}' is already open", device.name);
        if device.is_open() {
            return Ok(());
        }

        match direction {
            Direction::Input => {
                device.input = Some(backend.open_input(&device.name, relay.clone())?);
            }
            Direction::Output => {
                device.output = Some(backend.open_output(&device.name)?);
            }
        }

        self.selection.insert(index);
        Ok(())
    }

    /// Close the device at `index`. Closing never fails.
    pub fn close(&mut self, index: usize) {
        if let Some(device) = self.devices.get_mut(index) {
            debug_assert!(device.is_open(), "'{}' is not open", device.name);
            device.close();
        }
        self.selection.remove(&index);
    }

    pub fn close_all(&mut self) {
        for device in &mut self.devices {
            device.close();
        }
        self.selection.clear();
    }

    /// Send `data` to every open output. Failures on one device don't stop the rest.
    pub fn send_to_open(&mut self, data: &[u8]) -> Vec<(String, Error)> {
        let mut failures = Vec::new();
        for device in &mut self.devices {
            if let Some(output) = device.output.as_mut() {
                if let Err(e) = output.send(data) {
                    failures.push((device.name.clone(), e));
                }
            }
        }
        failures
    }

    fn sync_selection(&mut self) {
        self.selection = self
            .devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_open())
            .map(|(i, _)| i)
            .collect();
    }

    fn dedup(&self, names: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(names.len());
        for name in names {
            if seen.insert(name.clone()) {
                unique.push(name);
            } else {
                tracing::warn!("Ignoring duplicate {} device name '{}'", self.direction, name);
            }
        }
        unique
    }
}

impl Drop for DeviceDirectory {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::relay::relay;

    fn names(dir: &DeviceDirectory) -> Vec<&str> {
        dir.names().collect()
    }

    fn selection(indices: &[usize]) -> Selection {
        indices.iter().copied().collect()
    }

    #[test]
    fn test_refresh_follows_snapshots() {
        let backend = FakeBackend::with_devices(&["A", "B"], &[]);
        let mut dir = DeviceDirectory::new(Direction::Input);

        for snapshot in [
            vec!["A", "B"],
            vec!["B", "A"],
            vec!["C"],
            vec![],
            vec!["C", "A", "B"],
        ] {
            backend.set_inputs(&snapshot);
            dir.refresh(&backend).unwrap();
            assert_eq!(names(&dir), snapshot);
            assert!(dir.selection().is_empty());
        }
        assert!(backend.opened(Direction::Input).is_empty());
    }

    #[test]
    fn test_unplugged_open_device_is_closed_once() {
        let mut backend = FakeBackend::with_devices(&["SynthA", "SynthB"], &[]);
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Input);
        dir.refresh(&backend).unwrap();

        let failures = dir.on_selection_changed(&mut backend, &tx, selection(&[0]));
        assert!(failures.is_empty());
        assert_eq!(backend.opened(Direction::Input), vec!["SynthA"]);
        assert_eq!(dir.selection(), &selection(&[0]));

        backend.set_inputs(&["SynthB"]);
        let outcome = dir.refresh(&backend).unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome::Updated {
                closed: vec!["SynthA".to_string()],
                added: vec![],
                removed: vec!["SynthA".to_string()],
            }
        );
        assert_eq!(names(&dir), vec!["SynthB"]);
        assert!(dir.selection().is_empty());
        assert_eq!(backend.closed(Direction::Input), vec!["SynthA"]);

        // the name coming back does not reopen it
        backend.set_inputs(&["SynthA", "SynthB"]);
        dir.refresh(&backend).unwrap();
        assert_eq!(backend.opened(Direction::Input), vec!["SynthA"]);
        assert!(dir.selection().is_empty());
        assert_eq!(backend.closed(Direction::Input), vec!["SynthA"]);
    }

    #[test]
    fn test_open_device_survives_reorder() {
        let mut backend = FakeBackend::with_devices(&[], &["Out1", "Out2"]);
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Output);
        dir.refresh(&backend).unwrap();
        dir.on_selection_changed(&mut backend, &tx, selection(&[1]));

        backend.set_outputs(&["New", "Out2", "Out1"]);
        dir.refresh(&backend).unwrap();

        assert_eq!(names(&dir), vec!["New", "Out2", "Out1"]);
        assert_eq!(dir.selection(), &selection(&[1]));
        assert!(dir.devices()[1].is_open());
        assert_eq!(backend.opened(Direction::Output), vec!["Out2"]);
        assert!(backend.closed(Direction::Output).is_empty());

        // the kept handle is the same connection
        assert!(dir.send_to_open(&[0xB0, 20, 1]).is_empty());
        assert_eq!(backend.state.borrow().sent.len(), 1);
        assert_eq!(backend.state.borrow().sent[0].0, "Out2");
    }

    #[test]
    fn test_identical_refresh_is_noop() {
        let backend = FakeBackend::with_devices(&["A", "B"], &[]);
        let mut dir = DeviceDirectory::new(Direction::Input);

        assert!(matches!(
            dir.refresh(&backend).unwrap(),
            RefreshOutcome::Updated { .. }
        ));
        let generation = dir.generation();

        assert_eq!(dir.refresh(&backend).unwrap(), RefreshOutcome::Unchanged);
        assert_eq!(dir.generation(), generation);
        assert!(backend.opened(Direction::Input).is_empty());
        assert!(backend.closed(Direction::Input).is_empty());
    }

    #[test]
    fn test_selection_diff_opens_and_closes() {
        let mut backend = FakeBackend::with_devices(&["A", "B", "C"], &[]);
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Input);
        dir.refresh(&backend).unwrap();

        dir.on_selection_changed(&mut backend, &tx, selection(&[0, 1]));
        dir.on_selection_changed(&mut backend, &tx, selection(&[1, 2]));

        assert_eq!(backend.opened(Direction::Input), vec!["A", "B", "C"]);
        assert_eq!(backend.closed(Direction::Input), vec!["A"]);
        assert_eq!(dir.selection(), &selection(&[1, 2]));

        // same selection again changes nothing
        dir.on_selection_changed(&mut backend, &tx, selection(&[1, 2]));
        assert_eq!(backend.opened(Direction::Input).len(), 3);
    }

    #[test]
    fn test_failed_open_rolls_back_selection() {
        let mut backend = FakeBackend::with_devices(&["A", "Busy"], &[]);
        backend.state.borrow_mut().fail_open.insert("Busy".to_string());
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Input);
        dir.refresh(&backend).unwrap();

        let failures = dir.on_selection_changed(&mut backend, &tx, selection(&[0, 1]));

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "Busy");
        assert_eq!(dir.selection(), &selection(&[0]));
        assert!(!dir.devices()[1].is_open());
    }

    #[test]
    fn test_device_gone_between_enumeration_and_open() {
        let mut backend = FakeBackend::with_devices(&[], &["Out1"]);
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Output);
        dir.refresh(&backend).unwrap();

        backend.set_outputs(&[]);
        let failures = dir.on_selection_changed(&mut backend, &tx, selection(&[0]));
        assert!(matches!(failures[0].1, Error::DeviceNotFound(_)));
        assert!(dir.selection().is_empty());
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let mut dir = DeviceDirectory::new(Direction::Input);
        dir.reconcile(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(names(&dir), vec!["A", "B"]);
    }

    #[test]
    fn test_enumeration_failure_leaves_list() {
        let backend = FakeBackend::with_devices(&["A"], &[]);
        let mut dir = DeviceDirectory::new(Direction::Input);
        dir.refresh(&backend).unwrap();

        backend.state.borrow_mut().fail_list = true;
        assert!(dir.refresh(&backend).is_err());
        assert_eq!(names(&dir), vec!["A"]);
    }

    #[test]
    fn test_drop_closes_everything() {
        let mut backend = FakeBackend::with_devices(&[], &["Out1", "Out2"]);
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Output);
        dir.refresh(&backend).unwrap();
        dir.on_selection_changed(&mut backend, &tx, selection(&[0, 1]));

        drop(dir);
        assert_eq!(backend.closed(Direction::Output), vec!["Out1", "Out2"]);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_out_of_range_selection_ignored_in_release() {
        let mut backend = FakeBackend::with_devices(&["A"], &[]);
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Input);
        dir.refresh(&backend).unwrap();

        dir.on_selection_changed(&mut backend, &tx, selection(&[0, 5]));
        assert_eq!(dir.selection(), &selection(&[0]));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_selection_panics_in_debug() {
        let mut backend = FakeBackend::with_devices(&["A"], &[]);
        let (tx, _rx) = relay(16);
        let mut dir = DeviceDirectory::new(Direction::Input);
        dir.refresh(&backend).unwrap();

        dir.on_selection_changed(&mut backend, &tx, selection(&[5]));
    }
}
