//! Ctrl+C routing for the chat REPL.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Exit status for a Ctrl+C at the idle prompt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Tracks the operation Ctrl+C should cancel, if any.
///
/// One watcher serves the whole process: while work is in flight a signal
/// cancels it, otherwise the signal asks the caller to exit.
#[derive(Clone, Default)]
pub struct Interrupts {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark work as in flight and return the token that cancels it.
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock() = Some(token.clone());
        token
    }

    /// Mark the REPL idle again.
    pub fn finish(&self) {
        self.lock().take();
    }

    /// Cancel in-flight work. Returns false when there was none.
    pub fn interrupt(&self) -> bool {
        match self.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run `fut` until it finishes or Ctrl+C cancels it.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        let token = self.begin();
        let output = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = fut => Some(output),
        };
        self.finish();
        output
    }

    /// Listen for Ctrl+C for the rest of the process.
    pub fn watch(&self) {
        let interrupts = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if interrupts.interrupt() {
                    debug!("interrupted in-flight work");
                } else {
                    println!();
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
