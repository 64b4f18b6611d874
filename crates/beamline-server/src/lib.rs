//! `beamline-server`
//!
//! Composition root of the beamline service: loads the layered
//! configuration, initialises tracing, enumerates the hardware repository
//! into the adapter registry and wires the control manager to the shared
//! change broadcaster.
//!
//! - [`config`]: figment-based [`ServiceConfig`](config::ServiceConfig)
//! - [`logging`]: `tracing-subscriber` initialisation
//! - [`app`]: the running [`App`](app::App) and its client write path

pub mod app;
pub mod config;
pub mod logging;

pub use app::{App, RequestError};
pub use config::ServiceConfig;
