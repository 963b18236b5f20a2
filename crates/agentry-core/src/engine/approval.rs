//! Resuming approval-suspended tasks from an external signal source.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use agentry_state::ApprovalSignal;

use crate::domain::AgentConfig;
use crate::task::Task;

use super::error::EngineResult;
use super::runtime::AgentEngine;

/// Agent configurations keyed by pack id.
#[derive(Debug, Clone, Default)]
pub struct PackRegistry {
    packs: HashMap<String, AgentConfig>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the config for `agent.pack_id`.
    pub fn insert(&mut self, agent: AgentConfig) {
        self.packs.insert(agent.pack_id.clone(), agent);
    }

    pub fn get(&self, pack_id: &str) -> Option<&AgentConfig> {
        self.packs.get(pack_id)
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}

impl FromIterator<AgentConfig> for PackRegistry {
    fn from_iter<I: IntoIterator<Item = AgentConfig>>(iter: I) -> Self {
        let mut registry = Self::new();
        for agent in iter {
            registry.insert(agent);
        }
        registry
    }
}

impl AgentEngine {
    /// Resume a suspended task using the config registered for its pack.
    pub async fn resume_registered(
        &self,
        packs: &PackRegistry,
        signal: ApprovalSignal,
    ) -> EngineResult<Task> {
        let (_cancel_tx, cancel) = watch::channel(false);
        self.resume_with(signal, |pack_id| packs.get(pack_id), cancel)
            .await
    }
}

/// Apply approval signals as they arrive, one at a time, until every sender
/// is dropped.
///
/// Errors are logged and the listener moves on. A signal that fails
/// validation leaves its task suspended.
pub fn spawn_approval_listener(
    engine: Arc<AgentEngine>,
    packs: Arc<PackRegistry>,
    mut signals: mpsc::Receiver<ApprovalSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            let task_id = signal.task_id;
            match engine.resume_registered(&packs, signal).await {
                Ok(task) => info!(
                    task_id = %task_id,
                    state = %task.state(),
                    "approval signal applied"
                ),
                Err(err) => warn!(task_id = %task_id, error = %err, "approval signal dropped"),
            }
        }
    })
}
