//! OS signal handling.
//!
//! SIGINT and SIGTERM mean shut down; SIGHUP means reload the config file.
//! On non-Unix targets only Ctrl+C is observed.

use std::io;

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Reload,
}

/// Wait for the next signal of interest.
#[cfg(unix)]
pub async fn next_signal() -> io::Result<Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| Signal::Terminate),
        _ = term.recv() => Ok(Signal::Terminate),
        _ = hup.recv() => Ok(Signal::Reload),
    }
}

#[cfg(not(unix))]
pub async fn next_signal() -> io::Result<Signal> {
    tokio::signal::ctrl_c().await.map(|_| Signal::Terminate)
}
