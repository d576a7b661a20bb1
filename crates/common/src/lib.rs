//! Shared plumbing for the CTAPHID relay daemon: error type, logging setup,
//! and the acknowledged shutdown signal used to close the listening endpoint.

pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use shutdown::{ShutdownHandle, ShutdownListener, shutdown_pair};
