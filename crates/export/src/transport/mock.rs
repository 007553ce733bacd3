use std::sync::{Arc, Mutex, MutexGuard};

use tally_core::error::{Result, TallyError};
use tally_core::model::Datum;

use crate::driver::BatchTransport;
use crate::routed::RecordTransport;

#[derive(Default)]
struct MockState {
    fail_connect: bool,
    fail_send_at: Option<usize>,
    send_attempts: usize,
    close_calls: usize,
    batches: Vec<(String, Vec<Datum>)>,
    records: Vec<(String, Option<String>, String)>,
}

#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    /// Makes the send with this zero-based attempt index fail.
    pub fn fail_send_at(&self, attempt: usize) {
        self.lock().fail_send_at = Some(attempt);
    }

    pub fn batches(&self) -> Vec<(String, Vec<Datum>)> {
        self.lock().batches.clone()
    }

    pub fn records(&self) -> Vec<(String, Option<String>, String)> {
        self.lock().records.clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.lock().send_attempts
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    fn connect(&self) -> Result<()> {
        if self.lock().fail_connect {
            return Err(TallyError::Connection("mock refused".to_string()));
        }
        Ok(())
    }

    fn attempt(&self) -> Result<()> {
        let mut state = self.lock();
        let attempt = state.send_attempts;
        state.send_attempts += 1;
        if state.fail_send_at == Some(attempt) {
            return Err(TallyError::Transport(format!("mock send {attempt} failed")));
        }
        Ok(())
    }
}

pub struct MockBatchTransport {
    handle: MockHandle,
}

impl MockBatchTransport {
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl BatchTransport for MockBatchTransport {
    async fn connect(&mut self) -> Result<()> {
        self.handle.connect()
    }

    async fn send_batch(&mut self, namespace: &str, batch: &[Datum]) -> Result<()> {
        self.handle.attempt()?;
        self.handle
            .lock()
            .batches
            .push((namespace.to_string(), batch.to_vec()));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.handle.lock().close_calls += 1;
        Ok(())
    }
}

pub struct MockRecordTransport {
    handle: MockHandle,
}

impl MockRecordTransport {
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl RecordTransport for MockRecordTransport {
    async fn connect(&mut self) -> Result<()> {
        self.handle.connect()
    }

    async fn send_record(&mut self, topic: &str, key: Option<&str>, payload: &str) -> Result<()> {
        self.handle.attempt()?;
        self.handle.lock().records.push((
            topic.to_string(),
            key.map(str::to_string),
            payload.to_string(),
        ));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.handle.lock().close_calls += 1;
        Ok(())
    }
}
