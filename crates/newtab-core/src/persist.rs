//! Background writer for the storage collaborator.
//!
//! Every write goes through a single worker thread fed by a channel, so
//! writes are applied in the order they were requested. Two writes to the
//! same key can therefore never land out of order.

use crate::storage::{KeyValueStore, StorageError};
use serde_json::Value;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub type Completion = Box<dyn FnOnce(Result<(), StorageError>) + Send + 'static>;

enum PersistRequest {
    Write {
        key: String,
        value: Value,
        on_complete: Option<Completion>,
    },
    Flush {
        reply: mpsc::Sender<()>,
    },
    Shutdown,
}

fn set_shared_error(target: &Arc<Mutex<Option<String>>>, message: String) {
    let mut guard = target.lock().unwrap_or_else(|err| err.into_inner());
    *guard = Some(message);
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct PersistQueue {
    sender: mpsc::Sender<PersistRequest>,
    thread: Mutex<Option<JoinHandle<()>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl PersistQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (sender, receiver) = mpsc::channel::<PersistRequest>();
        let last_error = Arc::new(Mutex::new(None));
        let thread_errors = Arc::clone(&last_error);
        let handle = std::thread::spawn(move || {
            enum ThreadControl {
                Continue,
                Shutdown,
            }
            loop {
                let request = match receiver.recv() {
                    Ok(request) => request,
                    Err(_) => break,
                };
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    match request {
                        PersistRequest::Write {
                            key,
                            value,
                            on_complete,
                        } => {
                            let result = store.set(&key, &value);
                            match &result {
                                Ok(()) => debug!(key = %key, "persisted"),
                                Err(err) => {
                                    warn!(key = %key, error = %err, "storage write failed");
                                    set_shared_error(
                                        &thread_errors,
                                        format!("storage-failure: {key}: {err}"),
                                    );
                                }
                            }
                            if let Some(on_complete) = on_complete {
                                on_complete(result);
                            }
                            ThreadControl::Continue
                        }
                        PersistRequest::Flush { reply } => {
                            let _ = reply.send(());
                            ThreadControl::Continue
                        }
                        PersistRequest::Shutdown => ThreadControl::Shutdown,
                    }
                }));

                match result {
                    Ok(ThreadControl::Continue) => {}
                    Ok(ThreadControl::Shutdown) => break,
                    Err(panic) => {
                        set_shared_error(
                            &thread_errors,
                            format!("storage-failure: writer panicked: {}", panic_message(panic)),
                        );
                        break;
                    }
                }
            }
        });
        Self {
            sender,
            thread: Mutex::new(Some(handle)),
            last_error,
        }
    }

    /// Fire-and-forget write.
    pub fn write(&self, key: &str, value: Value) {
        self.submit(key, value, None);
    }

    /// Write with a callback that receives the outcome on the writer thread.
    pub fn write_with<F>(&self, key: &str, value: Value, on_complete: F)
    where
        F: FnOnce(Result<(), StorageError>) + Send + 'static,
    {
        self.submit(key, value, Some(Box::new(on_complete)));
    }

    fn submit(&self, key: &str, value: Value, on_complete: Option<Completion>) {
        let request = PersistRequest::Write {
            key: key.to_string(),
            value,
            on_complete,
        };
        if let Err(mpsc::SendError(request)) = self.sender.send(request) {
            let message = format!("storage-failure: {key}: writer unavailable");
            warn!(key = %key, "storage writer unavailable");
            set_shared_error(&self.last_error, message.clone());
            if let PersistRequest::Write {
                on_complete: Some(on_complete),
                ..
            } = request
            {
                on_complete(Err(StorageError::Rejected(message)));
            }
        }
    }

    /// Blocks until every write submitted before this call has been applied.
    pub fn flush(&self) -> Result<(), StorageError> {
        let (reply, recv) = mpsc::channel();
        self.sender
            .send(PersistRequest::Flush { reply })
            .map_err(|_| StorageError::Rejected("writer unavailable".to_string()))?;
        recv.recv()
            .map_err(|_| StorageError::Rejected("writer disconnected".to_string()))
    }

    pub fn last_error(&self) -> Option<String> {
        let guard = self.last_error.lock().unwrap_or_else(|err| err.into_inner());
        guard.clone()
    }

    pub fn clear_error(&self) {
        let mut guard = self.last_error.lock().unwrap_or_else(|err| err.into_inner());
        *guard = None;
    }

    /// Drains pending writes and joins the worker.
    pub fn shutdown(&self) {
        let mut handle = self.thread.lock().unwrap_or_else(|err| err.into_inner());
        if handle.is_none() {
            return;
        }
        let _ = self.sender.send(PersistRequest::Shutdown);
        if let Some(handle) = handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PersistQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::PersistQueue;
    use crate::storage::{KeyValueStore, MemoryStore, StorageError};
    use serde_json::{json, Value};
    use std::sync::{mpsc, Arc, Mutex};

    #[test]
    fn writes_land_in_submission_order() {
        let store = Arc::new(MemoryStore::new());
        let queue = PersistQueue::new(store.clone());
        for ix in 0..50 {
            queue.write("accentColor", json!(format!("#0000{ix:02}")));
        }
        queue.flush().expect("flush");
        assert_eq!(store.get("accentColor").expect("get"), Some(json!("#000049")));
    }

    #[test]
    fn completion_reports_success_and_failure() {
        let store = Arc::new(MemoryStore::new());
        let queue = PersistQueue::new(store.clone());
        let (tx, rx) = mpsc::channel();

        let ok_tx = tx.clone();
        queue.write_with("tiles", json!([]), move |result| {
            let _ = ok_tx.send(result.is_ok());
        });
        queue.flush().expect("flush");
        store.set_fail_writes(true);
        queue.write_with("tiles", json!([1]), move |result| {
            let _ = tx.send(matches!(result, Err(StorageError::Rejected(_))));
        });

        assert!(rx.recv().expect("first"));
        assert!(rx.recv().expect("second"));
        queue.flush().expect("flush");
        let error = queue.last_error().expect("recorded error");
        assert!(error.starts_with("storage-failure: tiles"));
        assert_eq!(store.get("tiles").expect("get"), Some(json!([])));

        queue.clear_error();
        assert!(queue.last_error().is_none());
    }

    #[test]
    fn drop_drains_pending_writes() {
        let store = Arc::new(MemoryStore::new());
        {
            let queue = PersistQueue::new(store.clone());
            queue.write("accentColor", json!("#abcdef"));
        }
        assert_eq!(store.get("accentColor").expect("get"), Some(json!("#abcdef")));
    }

    #[test]
    fn writes_after_shutdown_are_reported() {
        let queue = PersistQueue::new(Arc::new(MemoryStore::new()));
        queue.shutdown();
        let seen: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        queue.write_with("tiles", Value::Null, move |result| {
            *slot.lock().expect("lock") = Some(result.is_err());
        });
        assert_eq!(*seen.lock().expect("lock"), Some(true));
        assert!(queue.flush().is_err());
        assert!(queue.last_error().is_some());
    }
}
