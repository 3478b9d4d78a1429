//! Scriptable in-memory backend for unit tests

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures_util::stream;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::backend::{AgentBackend, AgentClient, ClientConfig, FragmentStream};

/// Pause point a test can hold a backend call at
#[derive(Default)]
pub(crate) struct Gate {
    armed: AtomicBool,
    entered: Notify,
    open: Notify,
}

impl Gate {
    /// Hold the next call that reaches this gate
    pub(crate) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn open(&self) {
        self.open.notify_one();
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.open.notified().await;
        }
    }
}

#[derive(Default)]
pub(crate) struct MockState {
    connects: AtomicUsize,
    releases: AtomicUsize,
    events: Mutex<Vec<String>>,
    fail_next_connect: AtomicBool,
    fail_release: AtomicBool,
    fail_submit: AtomicBool,
    hang_submit: AtomicBool,
    submit_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub(crate) connect_gate: Gate,
    pub(crate) release_gate: Gate,
}

impl MockState {
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn fail_next_connect(&self) {
        self.fail_next_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn hang_submit(&self, hang: bool) {
        self.hang_submit.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> Arc<MockState> {
        self.state.clone()
    }
}

#[async_trait]
impl AgentBackend for MockBackend {
    fn backend_name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, config: &ClientConfig) -> Result<Box<dyn AgentClient>> {
        self.state.connect_gate.pass().await;
        if self.state.fail_next_connect.swap(false, Ordering::SeqCst) {
            self.state.push("connect-failed".to_string());
            bail!("backend unavailable");
        }
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.push(format!("connect:{}", id));
        Ok(Box::new(MockClient {
            id,
            state: self.state.clone(),
            _system_prompt: config.system_prompt.clone(),
            pending: Vec::new(),
        }))
    }
}

struct MockClient {
    id: usize,
    state: Arc<MockState>,
    _system_prompt: String,
    pending: Vec<String>,
}

#[async_trait]
impl AgentClient for MockClient {
    async fn submit(&mut self, prompt: &str) -> Result<()> {
        if self.state.fail_submit.load(Ordering::SeqCst) {
            bail!("stream closed unexpectedly");
        }
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.state.hang_submit.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = self.state.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.state.push(format!("submit:{}", self.id));
        self.pending = vec![
            " ".to_string(),
            format!("client #{}", self.id),
            format!("echo: {}", prompt),
            "\n".to_string(),
        ];
        Ok(())
    }

    fn receive_response(&mut self) -> FragmentStream<'_> {
        Box::pin(stream::iter(self.pending.drain(..).map(Ok::<_, anyhow::Error>)))
    }

    async fn release(&mut self) -> Result<()> {
        self.state.push(format!("release:{}", self.id));
        self.state.release_gate.pass().await;
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_release.load(Ordering::SeqCst) {
            bail!("process already exited");
        }
        Ok(())
    }
}
