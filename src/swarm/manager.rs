//! Worker pool supervisor
//!
//! Launches one tokio task per agent. Each task owns its own store handle and
//! work source; the database file is the only thing the agents share.

use super::agent::AgentWorker;
use super::pacer::{Pacer, TokioPacer};
use crate::config::SimulationConfig;
use crate::store::EventStore;
use crate::work::{IssueTableSource, WorkSource};
use crate::{Result, WistecError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running worker
struct WorkerHandle {
    agent_id: String,
    handle: JoinHandle<()>,
}

/// Supervisor for the agent swarm
///
/// Workers run until [`WorkerPool::stop`] is called or the process exits.
pub struct WorkerPool {
    store_path: PathBuf,
    workers: Vec<WorkerHandle>,
    stop_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Deploy the swarm against an existing database
    ///
    /// Workers read candidate beads from the database's `issues` table and
    /// pause for real.
    pub fn start(store_path: impl Into<PathBuf>, config: SimulationConfig) -> Result<Self> {
        Self::start_with(store_path, config, TokioPacer, |path: &Path| {
            IssueTableSource::new(path)
        })
    }

    /// Deploy the swarm with a custom pacer and work source
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`WistecError::StoreNotFound`] before spawning anything when the
    /// database file is missing.
    pub fn start_with<P, W, F>(
        store_path: impl Into<PathBuf>,
        config: SimulationConfig,
        pacer: P,
        make_source: F,
    ) -> Result<Self>
    where
        P: Pacer + Clone + 'static,
        W: WorkSource + 'static,
        F: Fn(&Path) -> W,
    {
        let store_path = store_path.into();
        if config.agents == 0 {
            return Err(WistecError::Config(
                "At least one agent must be deployed".to_string(),
            ));
        }

        // Schema exists before any worker writes
        EventStore::open(&store_path)?.ensure_schema()?;

        info!(
            agents = config.agents,
            failure_rate = config.failure_rate,
            path = %store_path.display(),
            "Deploying agents"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let config = Arc::new(config);
        let mut workers = Vec::with_capacity(config.agents);

        for n in 1..=config.agents {
            let agent_id = config.agent_id(n);
            let store = match EventStore::open(&store_path) {
                Ok(store) => store,
                Err(e) => {
                    // Don't leave a partial swarm running
                    let _ = stop_tx.send(true);
                    return Err(e);
                }
            };
            let rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(n as u64)),
                None => StdRng::from_os_rng(),
            };

            let worker = AgentWorker::new(
                agent_id.clone(),
                store,
                make_source(&store_path),
                pacer.clone(),
                rng,
                Arc::clone(&config),
            );
            let handle = tokio::spawn(worker.run(stop_rx.clone()));
            workers.push(WorkerHandle { agent_id, handle });
        }

        Ok(Self {
            store_path,
            workers,
            stop_tx,
        })
    }

    /// Number of deployed workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Agent ids in launch order
    pub fn agent_ids(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.agent_id.as_str()).collect()
    }

    /// Database the swarm writes to
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Ask every worker to stop after its current cycle and wait for them
    ///
    /// Returns the number of workers that exited cleanly.
    pub async fn stop(self) -> usize {
        info!(agents = self.workers.len(), "Stopping agents");
        // Receivers outlive this send because the workers hold them
        let _ = self.stop_tx.send(true);

        let mut clean = 0;
        for worker in self.workers {
            match worker.handle.await {
                Ok(()) => clean += 1,
                Err(e) => warn!(agent_id = %worker.agent_id, error = %e, "Agent task failed"),
            }
        }
        clean
    }
}
