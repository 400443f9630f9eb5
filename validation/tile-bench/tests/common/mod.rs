//! Shared test helpers: an in-memory transport driven by a per-URL script.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tile_bench::{
    ClientPool, RequestDescriptor, Transport, TransportError, TransportResponse, Workload,
};

/// How the scripted server answers a given request index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Ok,
    /// Every attempt fails at the transport level
    Unreachable,
    Status(u16),
}

/// Counters shared by every client of one scripted pool.
#[derive(Default)]
pub struct ScriptState {
    pub sends: AtomicU64,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub unreachable: HashSet<u64>,
    pub statuses: Vec<(u64, u16)>,
    pub latency: Duration,
}

impl ScriptState {
    fn script_for(&self, index: u64) -> Script {
        if self.unreachable.contains(&index) {
            return Script::Unreachable;
        }
        match self.statuses.iter().find(|(i, _)| *i == index) {
            Some((_, status)) => Script::Status(*status),
            None => Script::Ok,
        }
    }
}

/// A pooled client that answers from the shared script.
#[derive(Clone)]
pub struct ScriptedClient {
    pub state: Arc<ScriptState>,
}

#[async_trait]
impl Transport for ScriptedClient {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        self.state.sends.fetch_add(1, Ordering::SeqCst);
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.state.latency.is_zero() {
            tokio::time::sleep(self.state.latency).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let index = request_index(&request.url);
        match self.state.script_for(index) {
            Script::Ok => Ok(TransportResponse {
                status: 200,
                body: Bytes::from_static(b"png"),
            }),
            Script::Unreachable => Err(TransportError::Connection(format!(
                "connection refused for request {}",
                index
            ))),
            Script::Status(status) => Ok(TransportResponse {
                status,
                body: Bytes::from(format!("status {}", status)),
            }),
        }
    }
}

fn request_index(url: &str) -> u64 {
    url.rsplit('/')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(u64::MAX)
}

/// Workload whose URLs end with the request index, so scripts can target single requests.
pub struct IndexedWorkload {
    pub expansion: u64,
}

impl Workload for IndexedWorkload {
    fn name(&self) -> &str {
        "TEST"
    }

    fn request(&self, index: u64) -> RequestDescriptor {
        RequestDescriptor::get(format!("http://scripted.local/req/{}", index))
    }

    fn expansion(&self) -> u64 {
        self.expansion
    }
}

/// A pool of `size` scripted clients sharing `state`.
pub fn scripted_pool(size: usize, state: Arc<ScriptState>) -> Arc<ClientPool<ScriptedClient>> {
    let clients = (0..size)
        .map(|_| ScriptedClient {
            state: Arc::clone(&state),
        })
        .collect();
    ClientPool::new(clients).unwrap()
}
