pub mod backend;
pub mod config;
pub mod controller;
pub mod controls;
pub mod devices;
pub mod error;
pub mod labels;
pub mod midi;
pub mod relay;

pub use error::{Error, Result};
