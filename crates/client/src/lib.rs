pub mod api;
pub mod config;
pub mod controller;

pub use api::{Credentials, WarzoneClient};
pub use config::{Config, ConfigError};
pub use controller::{Controller, Event, Job, Outcome, Progress};

#[cfg(test)]
mod tests;
