//! In-memory `NodeFetcher` used by the engine's unit tests.

use crate::api::{FetchError, FetchErrorKind, NodeFetcher};
use crate::internal::models::{Node, NodeKind};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

pub fn comment(id: u32, kids: &[u32], time: i64) -> Node {
    Node {
        id,
        author: Some(format!("user{}", id)),
        text: Some(format!("comment {}", id)),
        created_at: Some(time),
        kind: NodeKind::Comment,
        child_ids: kids.to_vec(),
        title: None,
        url: None,
        score: None,
    }
}

/// Root with `count` leaf comments (ids 1..=count) whose timestamps descend.
pub fn flat_thread(count: u32) -> Vec<Node> {
    let kids: Vec<u32> = (1..=count).collect();
    let mut nodes = vec![comment(0, &kids, 0)];
    nodes.extend(kids.iter().map(|&id| comment(id, &[], 10_000 - id as i64)));
    nodes
}

#[derive(Default)]
pub struct FixtureFetcher {
    nodes: HashMap<u32, Node>,
    failures: HashMap<u32, FetchErrorKind>,
    flaky: Mutex<HashMap<u32, u32>>,
    calls: Mutex<HashMap<u32, usize>>,
    gates: HashMap<u32, watch::Receiver<bool>>,
    jitter: bool,
}

impl FixtureFetcher {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
            ..Default::default()
        }
    }

    /// Every fetch of `id` fails with `kind`.
    pub fn failing(mut self, id: u32, kind: FetchErrorKind) -> Self {
        self.failures.insert(id, kind);
        self
    }

    /// The first `times` fetches of `id` fail transiently.
    pub fn flaky(self, id: u32, times: u32) -> Self {
        self.flaky.lock().unwrap().insert(id, times);
        self
    }

    /// Fetches of `id` wait until the returned sender publishes `true`.
    pub fn gated(mut self, id: u32) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        self.gates.insert(id, rx);
        (self, tx)
    }

    /// Delay every fetch by a few id-dependent milliseconds so completions
    /// arrive out of request order.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn calls(&self, id: u32) -> usize {
        self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl NodeFetcher for FixtureFetcher {
    async fn fetch(&self, id: u32) -> Result<Node, FetchError> {
        *self.calls.lock().unwrap().entry(id).or_default() += 1;

        if let Some(gate) = self.gates.get(&id) {
            let mut gate = gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
        if self.jitter {
            tokio::time::sleep(Duration::from_millis(u64::from(id.wrapping_mul(7) % 5))).await;
        }

        if let Some(kind) = self.failures.get(&id) {
            return Err(FetchError {
                kind: *kind,
                id,
                message: "fixture failure".to_string(),
            });
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(&id)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(FetchError::transient(id, "fixture flake"));
            }
        }

        self.nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| FetchError::permanent(id, "item not found"))
    }
}
