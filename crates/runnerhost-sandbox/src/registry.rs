//! Published runners by id.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, instrument};

use crate::error::{Result, SandboxError};
use crate::facade::Runner;
use crate::intents::{Capability, RunnerIntents};
use runnerhost_store::RunnerRecordStore;

#[derive(Default)]
pub struct RunnerRegistry {
    runners: DashMap<String, Arc<Runner>>,
    records: Option<RunnerRecordStore>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer capability questions for unloaded runners from their records.
    pub fn with_records(mut self, records: RunnerRecordStore) -> Self {
        self.records = Some(records);
        self
    }

    /// Make a runner available. Ids are unique.
    pub fn publish(&self, runner: Runner) -> Result<Arc<Runner>> {
        match self.runners.entry(runner.id().to_string()) {
            Entry::Occupied(entry) => Err(SandboxError::AlreadyLoaded {
                runner_id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let runner = Arc::new(runner);
                entry.insert(Arc::clone(&runner));
                info!(runner = runner.id(), environment = %runner.environment(), "runner published");
                Ok(runner)
            }
        }
    }

    pub fn get(&self, runner_id: &str) -> Option<Arc<Runner>> {
        self.runners.get(runner_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, runner_id: &str) -> bool {
        self.runners.contains_key(runner_id)
    }

    /// Loaded ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runners.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Remove a runner and shut its sandbox down.
    #[instrument(skip(self))]
    pub async fn unload(&self, runner_id: &str) -> Result<()> {
        let Some((_, runner)) = self.runners.remove(runner_id) else {
            return Err(SandboxError::RunnerNotLoaded {
                runner_id: runner_id.to_string(),
            });
        };
        runner.handle().shutdown().await;
        info!("runner unloaded");
        Ok(())
    }

    pub async fn unload_all(&self) {
        for runner_id in self.ids() {
            let _ = self.unload(&runner_id).await;
        }
    }

    /// Whether `runner_id` supports `capability`, from the live runner or,
    /// when it is not loaded, from its persisted record.
    pub async fn supports(&self, runner_id: &str, capability: Capability) -> Result<bool> {
        if let Some(runner) = self.get(runner_id) {
            return Ok(runner.handle().intents().supports(capability));
        }
        let not_loaded = || SandboxError::RunnerNotLoaded {
            runner_id: runner_id.to_string(),
        };
        let Some(records) = &self.records else {
            return Err(not_loaded());
        };
        match records.get(runner_id).await? {
            Some(record) => Ok(RunnerIntents::from_flags(&record.intents).supports(capability)),
            None => Err(not_loaded()),
        }
    }
}
