//! Connection manager integration tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use mcp_hub::backend::{ConnectedBackend, ConnectionManager};
use mcp_hub::config::{BackendDescriptor, TransportSpec};
use mcp_hub::protocol::{JsonRpcResponse, RequestId};
use mcp_hub::transport::{Transport, TransportFactory};
use mcp_hub::{Error, Result};

/// Per-backend counters shared between the factory and its transports
#[derive(Default)]
struct Counters {
    opens: Mutex<HashMap<String, usize>>,
    closes: Mutex<HashMap<String, usize>>,
}

impl Counters {
    fn opens(&self, name: &str) -> usize {
        *self.opens.lock().unwrap().get(name).unwrap_or(&0)
    }

    fn closes(&self, name: &str) -> usize {
        *self.closes.lock().unwrap().get(name).unwrap_or(&0)
    }
}

/// Scripted transport: fails its first `fail_opens` open attempts
/// (counted across re-constructions), then succeeds
struct ScriptedTransport {
    name: String,
    fail_opens: usize,
    fail_requests: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self) -> Result<()> {
        let attempt = {
            let mut opens = self.counters.opens.lock().unwrap();
            let count = opens.entry(self.name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if attempt <= self.fail_opens {
            Err(Error::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn request(&self, _method: &str, _params: Option<Value>) -> Result<JsonRpcResponse> {
        if self.fail_requests {
            return Err(Error::Transport("request failed".to_string()));
        }
        Ok(JsonRpcResponse::success(
            RequestId::Number(1),
            json!({"tools": []}),
        ))
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        *self
            .counters
            .closes
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}

/// Factory scripted per backend name (the descriptor's stdio command)
#[derive(Default)]
struct ScriptedFactory {
    /// Failing open attempts per backend before success
    fail_opens: HashMap<String, usize>,
    /// Backends whose transport construction fails outright
    broken: HashSet<String>,
    /// Backends whose requests fail after a successful open
    fail_requests: HashSet<String>,
    counters: Arc<Counters>,
}

impl TransportFactory for ScriptedFactory {
    fn create(&self, spec: &TransportSpec) -> Result<Arc<dyn Transport>> {
        let TransportSpec::Stdio { command, .. } = spec else {
            return Err(Error::Config("test factory only scripts stdio".to_string()));
        };

        if self.broken.contains(command) {
            return Err(Error::Config("invalid command".to_string()));
        }

        Ok(Arc::new(ScriptedTransport {
            name: command.clone(),
            fail_opens: self.fail_opens.get(command).copied().unwrap_or(0),
            fail_requests: self.fail_requests.contains(command),
            counters: Arc::clone(&self.counters),
        }))
    }
}

fn descriptor(name: &str) -> BackendDescriptor {
    BackendDescriptor {
        name: name.to_string(),
        transport: TransportSpec::Stdio {
            command: name.to_string(),
            args: vec![],
            env: vec![],
        },
        allowed_tools: None,
    }
}

fn names(backends: &[Arc<ConnectedBackend>]) -> Vec<&str> {
    backends.iter().map(|b| b.name.as_str()).collect()
}

#[tokio::test]
async fn connect_all_preserves_descriptor_order() {
    let factory = Arc::new(ScriptedFactory::default());
    let manager = ConnectionManager::new(factory);

    let backends = manager
        .connect_all(&[descriptor("alpha"), descriptor("beta"), descriptor("gamma")])
        .await;

    assert_eq!(names(&backends), vec!["alpha", "beta", "gamma"]);
}

#[tokio::test(start_paused = true)]
async fn failing_backend_does_not_block_later_ones() {
    let factory = Arc::new(ScriptedFactory {
        fail_opens: HashMap::from([("bad".to_string(), usize::MAX)]),
        ..Default::default()
    });
    let counters = Arc::clone(&factory.counters);
    let manager = ConnectionManager::new(factory);

    let backends = manager
        .connect_all(&[descriptor("bad"), descriptor("good")])
        .await;

    assert_eq!(names(&backends), vec!["good"]);
    assert_eq!(counters.opens("bad"), 3);
    assert_eq!(counters.opens("good"), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_three_attempts_with_two_fixed_delays() {
    let factory = Arc::new(ScriptedFactory {
        fail_opens: HashMap::from([("down".to_string(), usize::MAX)]),
        ..Default::default()
    });
    let counters = Arc::clone(&factory.counters);
    let manager = ConnectionManager::new(factory);

    let start = tokio::time::Instant::now();
    let backends = manager.connect_all(&[descriptor("down")]).await;

    assert!(backends.is_empty());
    assert_eq!(counters.opens("down"), 3);
    // Two inter-attempt waits of 2500ms; no delay after the last attempt.
    assert_eq!(start.elapsed(), Duration::from_millis(5000));
    // Partial state is released after every failed attempt.
    assert_eq!(counters.closes("down"), 3);
}

#[tokio::test(start_paused = true)]
async fn second_attempt_success_yields_one_backend() {
    let factory = Arc::new(ScriptedFactory {
        fail_opens: HashMap::from([("slow".to_string(), 1)]),
        ..Default::default()
    });
    let counters = Arc::clone(&factory.counters);
    let manager = ConnectionManager::new(factory);

    let start = tokio::time::Instant::now();
    let backends = manager.connect_all(&[descriptor("slow")]).await;

    assert_eq!(names(&backends), vec!["slow"]);
    assert_eq!(counters.opens("slow"), 2);
    assert_eq!(start.elapsed(), Duration::from_millis(2500));
}

#[tokio::test]
async fn construction_failure_skips_backend_without_attempts() {
    let factory = Arc::new(ScriptedFactory {
        broken: HashSet::from(["bogus".to_string()]),
        ..Default::default()
    });
    let counters = Arc::clone(&factory.counters);
    let manager = ConnectionManager::new(factory);

    let backends = manager
        .connect_all(&[descriptor("bogus"), descriptor("fine")])
        .await;

    assert_eq!(names(&backends), vec!["fine"]);
    assert_eq!(counters.opens("bogus"), 0);
}

#[tokio::test]
async fn diagnostic_catalog_failure_does_not_drop_backend() {
    let factory = Arc::new(ScriptedFactory {
        fail_requests: HashSet::from(["quiet".to_string()]),
        ..Default::default()
    });
    let manager = ConnectionManager::new(factory);

    let backends = manager.connect_all(&[descriptor("quiet")]).await;

    assert_eq!(names(&backends), vec!["quiet"]);
}

#[tokio::test]
async fn backend_close_is_idempotent() {
    let counters = Arc::new(Counters::default());
    let transport = Arc::new(ScriptedTransport {
        name: "once".to_string(),
        fail_opens: 0,
        fail_requests: false,
        counters: Arc::clone(&counters),
    });

    let backend = ConnectedBackend::new("once", transport, None);

    backend.close().await.unwrap();
    backend.close().await.unwrap();

    assert_eq!(counters.closes("once"), 1);
}
