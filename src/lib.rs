// Library surface for the CLI, headless tests and reuse.
// Terminal rendering stays in the binary.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod lessons;
pub mod logging;
pub mod practice;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod storage;
pub mod store;
pub mod typing_policy;
pub mod util;

pub use error::{Error, Result};
