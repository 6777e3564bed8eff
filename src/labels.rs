use crate::controls::{Button, Knob};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// User-editable captions of the pedal controls, keyed by control name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet {
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.labels.insert(name.into(), text.into());
    }

    pub fn knob(&self, knob: Knob) -> &str {
        self.get(knob.label_key()).unwrap_or(knob.default_label())
    }

    pub fn button(&self, button: Button) -> &str {
        self.get(button.label_key()).unwrap_or(button.default_label())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Load from JSON file, on top of the defaults
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let loaded: BTreeMap<String, String> = serde_json::from_str(&content)?;

        let mut labels = Self::default();
        labels.labels.extend(loaded);
        Ok(labels)
    }

    /// Save to JSON file
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        let mut labels = BTreeMap::new();
        for knob in Knob::ALL {
            labels.insert(knob.label_key().to_string(), knob.default_label().to_string());
        }
        for button in Button::ALL {
            labels.insert(
                button.label_key().to_string(),
                button.default_label().to_string(),
            );
        }
        Self { labels }
    }
}
