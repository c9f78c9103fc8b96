pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod health;
pub mod installer;
pub mod io;
pub mod launch;
pub mod monitor;
pub mod orchestrator;
pub mod paths;
pub mod probe;
pub mod procs;
pub mod signals;
pub mod state;
pub mod steps;
pub mod supervisor;
pub mod tool_runner;
pub mod types;

pub use error::{Mt5dError, Result};
