//! Host and interface event loops of the lantern browser shell.

pub mod bridge;
pub mod config;
pub mod host;
pub mod persistence;
pub mod runtime;
pub mod server;
pub mod views;
