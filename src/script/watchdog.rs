//! Statement timeout for backends that cannot carry one in the SQL text.
//!
//! When the timer fires before the statement finishes, a second short-lived
//! connection kills the primary session. Delivery is best effort.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::ConnectOptions;
use crate::driver;
use crate::error::{Error, Result};
use crate::session::Session;

pub(super) struct Watchdog {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start the timer for the statement about to run on `session`.
    ///
    /// `None` when the backend exposes no session id or kill statement.
    pub(super) fn arm(session: &mut Session, timeout: Duration) -> Option<Self> {
        let session_id = match session.driver_mut().session_id() {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(error = %err, "no session id, statement runs without a watchdog");
                return None;
            }
        };
        let kill_sql = session.codec().dialect().kill_sql(&session_id)?;
        let options = session.options().clone();
        let (disarm, fired) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = fired.recv_timeout(timeout) {
                tracing::debug!(session = %session_id, ?timeout, "statement timed out");
                if let Err(err) = kill(&options, &kill_sql) {
                    let advisory = Error::TimeoutAdvisory(err.to_string());
                    tracing::warn!(session = %session_id, "{}", advisory);
                }
            }
        });
        Some(Self {
            disarm: Some(disarm),
            handle: Some(handle),
        })
    }
}

fn kill(options: &ConnectOptions, kill_sql: &str) -> Result<()> {
    let mut secondary = driver::connect(options)?;
    let result = secondary.run(kill_sql).map(|_| ());
    if let Err(err) = secondary.close() {
        tracing::debug!(error = %err, "closing kill connection");
    }
    result
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Dropping the sender wakes the timer thread.
        self.disarm.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::debug!("watchdog thread panicked");
            }
        }
    }
}
