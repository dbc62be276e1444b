//! Configuration management for preset-inject
//!
//! A single JSON settings file describing the camera package, its store
//! locations and the directories used for backups and scratch copies.

pub mod settings;

pub use settings::Settings;
