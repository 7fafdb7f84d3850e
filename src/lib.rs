//! Factorio server mod management: a cached client for the mod portal,
//! dependency-aware installation, the server's `mod-list.json` and update
//! detection against the server's game version.

pub mod access;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dependency;
pub mod error;
pub mod file_store;
pub mod installer;
pub mod logging;
pub mod manager;
pub mod mod_list;
pub mod models;
pub mod portal;
pub mod update;
pub mod version;

#[cfg(test)]
mod testing;

pub use error::{ModError, ModResult};
pub use manager::ModManager;
