// Library exports for the herder process supervisor

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod report;
pub mod signals;

pub use error::{HerderError, Result};
pub use process::{Inspection, Manager, OutputHandler, OutputKind, Process, Program};
