//! Thread-safe access to one backend
//!
//! A backend serves one operation at a time. [`SharedBackend`] puts it
//! behind a mutex so callers on different threads are serialized, and offers
//! deadline-bounded calls for callers that cannot wait on a slow device.
//!
//! A physical operation is never aborted. When a deadline passes, the caller
//! gets `SessionExpired` at once; an operation already issued keeps running on
//! its worker thread and the backend is closed as soon as it returns. An
//! operation still queued behind other callers is never started; the backend
//! is closed when its turn comes.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{SigFactoryError, SigFactoryResult};
use crate::ports::{CredentialSession, SignatureBackend};

/// Progress of a deadline-bounded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Running,
    Done,
    Abandoned,
}

#[derive(Clone)]
pub struct SharedBackend {
    backend: Arc<Mutex<Box<dyn SignatureBackend>>>,
    deadline: Option<Duration>,
}

impl SharedBackend {
    pub fn new(backend: Box<dyn SignatureBackend>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            deadline: None,
        }
    }

    /// Bound every [`SharedBackend::run`] call by `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run `op` with exclusive access, waiting as long as it takes
    pub fn with_backend<T>(
        &self,
        op: impl FnOnce(&mut dyn SignatureBackend) -> SigFactoryResult<T>,
    ) -> SigFactoryResult<T> {
        let mut backend = self.backend.lock();
        op(backend.as_mut())
    }

    /// Run `op` under the configured deadline, if any
    pub fn run<T, F>(&self, op: F) -> SigFactoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SignatureBackend) -> SigFactoryResult<T> + Send + 'static,
    {
        match self.deadline {
            Some(deadline) => self.call_with_deadline(deadline, op),
            None => self.with_backend(op),
        }
    }

    /// Run `op` on a worker thread, giving up after `deadline`
    ///
    /// The deadline includes the time spent waiting for other callers.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Expired` if `op` has not finished in time; the
    /// backend is then closed once `op` returns, and must be replaced.
    pub fn call_with_deadline<T, F>(&self, deadline: Duration, op: F) -> SigFactoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SignatureBackend) -> SigFactoryResult<T> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let call = Arc::new(Mutex::new(CallState::Running));

        let backend = Arc::clone(&self.backend);
        let worker_call = Arc::clone(&call);
        thread::spawn(move || {
            let mut backend = backend.lock();
            if *worker_call.lock() == CallState::Abandoned {
                warn!("operation overdue before it started, closing backend");
                let _ = backend.close_session();
                return;
            }
            let result = op(backend.as_mut());

            let mut state = worker_call.lock();
            if *state == CallState::Abandoned {
                warn!("overdue operation finished, closing backend");
                let _ = backend.close_session();
                return;
            }
            *state = CallState::Done;
            // the receiver only goes away after observing Done
            let _ = sender.send(result);
        });

        match receiver.recv_timeout(deadline) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let mut state = call.lock();
                if *state == CallState::Done {
                    drop(state);
                    return receiver.recv().unwrap_or_else(|_| Err(worker_lost()));
                }
                *state = CallState::Abandoned;
                debug!(?deadline, "operation overdue");
                Err(SigFactoryError::expired(format!(
                    "operation exceeded its {deadline:?} deadline"
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(worker_lost()),
        }
    }
}

fn worker_lost() -> SigFactoryError {
    SigFactoryError::expired("operation worker ended without a result")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ContainerBackend;
    use crate::error::ErrorKind;
    use crate::model::{Credential, Mechanism, Role, SessionState, TokenIndex};
    use crate::ports::{CryptoExecutor, TokenDirectory};
    use crate::test_support::{write_container, Usage, PASSWORD};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn shared(dir: &TempDir) -> SharedBackend {
        let path = dir.path().join("keys.pem");
        write_container(&path, &[("Signing Key 1", Usage::Signing, 0)], PASSWORD);
        let mut backend = ContainerBackend::new(path, None);
        backend.init().unwrap();
        SharedBackend::new(Box::new(backend))
    }

    #[test]
    fn test_serialized_calls_from_threads() {
        let dir = TempDir::new().unwrap();
        let shared = shared(&dir);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    shared.with_backend(|backend| {
                        let session = backend.authenticate(
                            TokenIndex(0),
                            &Credential::new(PASSWORD)?,
                            Role::Signing,
                        )?;
                        let signature = backend.sign(&session, &[7u8; 32], Mechanism::RSA_SHA256)?;
                        backend.reset()?;
                        Ok(signature)
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().len(), 256);
        }
    }

    #[test]
    fn test_call_within_deadline() {
        let dir = TempDir::new().unwrap();
        let shared = shared(&dir);

        let tokens = shared
            .call_with_deadline(Duration::from_secs(5), |backend| backend.list_all_tokens())
            .unwrap();
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_overdue_call_expires_and_closes() {
        let dir = TempDir::new().unwrap();
        let shared = shared(&dir);
        let (started_tx, started_rx) = mpsc::channel();

        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || {
                // blocks until the worker has released the backend
                started_rx.recv().unwrap();
                shared.with_backend(|backend| Ok(backend.state())).unwrap()
            })
        };

        let err = shared
            .call_with_deadline(Duration::from_millis(20), move |backend| {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(300));
                backend.list_all_tokens()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionExpired);

        // the worker holds the lock from before `started` until it has closed the backend
        assert_eq!(waiter.join().unwrap(), SessionState::Closed);
    }

    #[test]
    fn test_queued_call_past_deadline_never_runs() {
        let dir = TempDir::new().unwrap();
        let shared = shared(&dir);
        let ran = Arc::new(AtomicBool::new(false));
        let (held_tx, held_rx) = mpsc::channel();

        let holder = {
            let shared = shared.clone();
            thread::spawn(move || {
                shared
                    .with_backend(|_| {
                        held_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(300));
                        Ok(())
                    })
                    .unwrap();
            })
        };
        held_rx.recv().unwrap();

        let op_ran = Arc::clone(&ran);
        let err = shared
            .call_with_deadline(Duration::from_millis(20), move |backend| {
                op_ran.store(true, Ordering::SeqCst);
                let session = backend.authenticate(
                    TokenIndex(0),
                    &Credential::new(PASSWORD)?,
                    Role::Signing,
                )?;
                backend.sign(&session, &[7u8; 32], Mechanism::RSA_SHA256)
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionExpired);
        holder.join().unwrap();

        // the queued worker takes the lock only after the holder, then closes
        let state = loop {
            let state = shared.with_backend(|backend| Ok(backend.state())).unwrap();
            if state == SessionState::Closed {
                break state;
            }
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(state, SessionState::Closed);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_run_uses_configured_deadline() {
        let dir = TempDir::new().unwrap();
        let shared = shared(&dir).with_deadline(Some(Duration::from_millis(20)));

        let err = shared
            .run(|backend| {
                thread::sleep(Duration::from_millis(300));
                Ok(backend.state())
            })
            .unwrap_err();
        assert!(err.kind().recoverable_by_reauthentication());
    }
}
