//! OS signal handling.
//!
//! SIGINT and SIGTERM both set the shutdown flag. The handlers only store to
//! an atomic, so they are async-signal-safe.

use std::io;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use crate::lifecycle::Shutdown;

/// Route SIGINT and SIGTERM to `shutdown`.
pub fn install(shutdown: &Shutdown) -> io::Result<()> {
    for signal in [SIGINT, SIGTERM] {
        flag::register(signal, shutdown.flag())?;
    }
    tracing::debug!("Signal handlers installed");
    Ok(())
}
