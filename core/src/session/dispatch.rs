// Fire-and-forget dispatch of user callbacks
//
// Transport events arrive on the transport library's worker threads. User
// callbacks may block, so each one runs on the tokio blocking pool instead
// of the event path. No ordering is kept between dispatched callbacks.

use crate::error::{BotError, Result};
use tokio::runtime::Handle;
use tracing::trace;

#[derive(Clone, Debug)]
enum Mode {
    Runtime(Handle),
    Inline,
}

/// Submits callback invocations for execution off the event path
#[derive(Clone, Debug)]
pub struct CallbackDispatcher {
    mode: Mode,
}

impl CallbackDispatcher {
    /// Dispatch onto the blocking pool of the given runtime
    pub fn new(runtime: Handle) -> Self {
        Self {
            mode: Mode::Runtime(runtime),
        }
    }

    /// Dispatch onto the runtime the caller is running in
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| BotError::Config(format!("no tokio runtime available: {}", e)))
    }

    /// Run callbacks on the calling thread. For single-threaded embedders and
    /// tests; a blocking callback stalls the transport.
    pub fn inline() -> Self {
        Self { mode: Mode::Inline }
    }

    pub fn dispatch<F>(&self, label: &'static str, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        trace!("Dispatching {} callback", label);
        match &self.mode {
            Mode::Runtime(handle) => {
                // Detached: nobody waits on the join handle.
                drop(handle.spawn_blocking(callback));
            }
            Mode::Inline => callback(),
        }
    }
}
