//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Client::close → Shutdown::trigger → in-flight dial cycles and the
//!     config watcher observe the signal and exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → CLI stops long-running commands, closes the client
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
