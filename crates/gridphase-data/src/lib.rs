//! Gridphase Data -- network fixtures and trace configuration from RON, TOML or JSON.
//!
//! [`load_network`] reads a [`schema::NetworkData`] file and resolves it into
//! a [`gridphase_core::network::Network`]. [`load_config`] reads a
//! [`gridphase_core::config::SetPhasesConfig`]. [`load_study`] reads both
//! from one directory.

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, StudyData, load_config, load_network, load_study};
