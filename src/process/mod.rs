// Process module - replica lifecycle and fleet supervision

mod inspection;
mod instance;
mod manager;
mod output;
mod program;
pub mod restart;
pub mod spawner;
mod types;

pub use inspection::{Inspection, Inspector};
pub use instance::Process;
pub use manager::Manager;
pub use output::OutputHandler;
pub use program::Program;
pub use restart::Backoff;
pub use types::{OutputKind, ProcessState};
