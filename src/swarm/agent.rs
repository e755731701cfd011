//! Agent worker state machine
//!
//! One worker loops forever over
//! `SelectWork → Analysis → Execution → {Completion | Healing → Retry → Completion}`,
//! appending one telemetry event per transition. A failed execution always
//! heals and retries exactly once; the retry never fails.

use super::pacer::Pacer;
use crate::config::SimulationConfig;
use crate::metrics;
use crate::store::{EventStore, SharedEventStore};
use crate::telemetry::{LogicBranch, NewEvent, NodeType};
use crate::work::{select_bead, BeadId, WorkSource};
use crate::{Result, WistecError};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Event shape of a cycle whose execution succeeded first time
pub const SUCCESS_SEQUENCE: [(NodeType, LogicBranch); 3] = [
    (NodeType::Analysis, LogicBranch::Normal),
    (NodeType::Execution, LogicBranch::Normal),
    (NodeType::Completion, LogicBranch::Normal),
];

/// Event shape of a cycle that failed, healed and retried
pub const HEALED_SEQUENCE: [(NodeType, LogicBranch); 5] = [
    (NodeType::Analysis, LogicBranch::Normal),
    (NodeType::Execution, LogicBranch::Loop),
    (NodeType::Healing, LogicBranch::Loop),
    (NodeType::Execution, LogicBranch::Retry),
    (NodeType::Completion, LogicBranch::Normal),
];

/// How a cycle's execution went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Execution succeeded on the first attempt
    Success,
    /// Execution failed, was healed, and the retry succeeded
    Healed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Healed => "healed",
        }
    }

    /// The event shape this outcome produces
    pub fn sequence(&self) -> &'static [(NodeType, LogicBranch)] {
        match self {
            CycleOutcome::Success => &SUCCESS_SEQUENCE,
            CycleOutcome::Healed => &HEALED_SEQUENCE,
        }
    }
}

/// One transition attempted during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedStep {
    pub node_type: NodeType,
    pub logic_branch: LogicBranch,
    pub token_burn: u32,
    /// Store-assigned id, or `None` when the insert failed
    pub event_id: Option<i64>,
}

/// Everything one cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub bead_id: BeadId,
    pub outcome: CycleOutcome,
    pub steps: Vec<EmittedStep>,
}

impl CycleReport {
    /// Total burn attempted in this cycle
    pub fn token_burn(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.token_burn)).sum()
    }

    /// Number of steps whose insert failed
    pub fn failed_writes(&self) -> usize {
        self.steps.iter().filter(|s| s.event_id.is_none()).count()
    }

    /// The (stage, branch) shape of the cycle
    pub fn shape(&self) -> Vec<(NodeType, LogicBranch)> {
        self.steps
            .iter()
            .map(|s| (s.node_type, s.logic_branch))
            .collect()
    }
}

/// A simulated agent bound to its own store handle
pub struct AgentWorker<W, P, R> {
    agent_id: String,
    store: SharedEventStore,
    work: Arc<Mutex<W>>,
    pacer: P,
    rng: R,
    config: Arc<SimulationConfig>,
}

impl<W, P, R> AgentWorker<W, P, R>
where
    W: WorkSource + 'static,
    P: Pacer,
    R: Rng + Send,
{
    pub fn new(
        agent_id: impl Into<String>,
        store: EventStore,
        work: W,
        pacer: P,
        rng: R,
        config: Arc<SimulationConfig>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            store: SharedEventStore::new(store),
            work: Arc::new(Mutex::new(work)),
            pacer,
            rng,
            config,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Run one full cycle from bead selection through Completion
    ///
    /// Insert failures are logged and counted; the cycle carries on so the
    /// worker's sequence stays well-formed for every event that did land.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let candidates = match fetch_actionable(Arc::clone(&self.work)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "Work source failed, going idle");
                Vec::new()
            }
        };
        let bead_id = select_bead(&candidates, &mut self.rng, &self.config.idle_bead);
        let mut steps = Vec::with_capacity(HEALED_SEQUENCE.len());

        let burn = self.config.analysis_burn.sample(&mut self.rng);
        steps.push(self.emit(&bead_id, NodeType::Analysis, LogicBranch::Normal, burn).await);
        let think = self.think_delay();
        self.pacer.pause(think).await;

        let failed = self.rng.random::<f64>() < self.config.failure_rate;
        let outcome = if failed {
            steps.push(self.emit(&bead_id, NodeType::Execution, LogicBranch::Loop, 0).await);
            self.pacer.pause(self.config.failure_delay()).await;

            let burn = self.config.healing_burn.sample(&mut self.rng);
            steps.push(self.emit(&bead_id, NodeType::Healing, LogicBranch::Loop, burn).await);
            self.pacer.pause(self.config.healing_delay()).await;

            let burn = self.config.execution_burn.sample(&mut self.rng);
            steps.push(self.emit(&bead_id, NodeType::Execution, LogicBranch::Retry, burn).await);
            CycleOutcome::Healed
        } else {
            let burn = self.config.execution_burn.sample(&mut self.rng);
            steps.push(self.emit(&bead_id, NodeType::Execution, LogicBranch::Normal, burn).await);
            CycleOutcome::Success
        };

        let settle = self.think_delay();
        self.pacer.pause(settle).await;

        steps.push(self.emit(&bead_id, NodeType::Completion, LogicBranch::Normal, 0).await);
        metrics::record_cycle(outcome.as_str());

        CycleReport {
            bead_id,
            outcome,
            steps,
        }
    }

    /// Loop until `stop` flips to true or its sender goes away
    ///
    /// The flag is only checked between cycles, so a stopped worker never
    /// leaves a half-written cycle behind.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(agent_id = %self.agent_id, "Agent activated");
        metrics::worker_started();

        loop {
            if *stop.borrow() {
                break;
            }

            let report = self.run_cycle().await;
            debug!(
                agent_id = %self.agent_id,
                bead_id = %report.bead_id,
                outcome = report.outcome.as_str(),
                token_burn = report.token_burn(),
                failed_writes = report.failed_writes(),
                "Cycle complete"
            );

            let stopped = tokio::select! {
                _ = self.pacer.pause(self.config.cycle_delay()) => false,
                changed = stop.changed() => changed.is_err() || *stop.borrow(),
            };
            if stopped {
                break;
            }
        }

        metrics::worker_stopped();
        info!(agent_id = %self.agent_id, "Agent stopped");
    }

    fn think_delay(&mut self) -> Duration {
        Duration::from_millis(self.config.think_delay_ms.sample(&mut self.rng))
    }

    // `&mut self` keeps the future Send without requiring `Self: Sync`
    async fn emit(
        &mut self,
        bead_id: &BeadId,
        node_type: NodeType,
        logic_branch: LogicBranch,
        token_burn: u32,
    ) -> EmittedStep {
        let event = NewEvent::new(
            &self.agent_id,
            bead_id.as_str(),
            node_type,
            logic_branch,
            token_burn,
        );

        let event_id = match self.store.append_async(event).await {
            Ok(id) => {
                debug!(
                    agent_id = %self.agent_id,
                    bead_id = %bead_id,
                    node_type = %node_type,
                    logic_branch = %logic_branch,
                    token_burn,
                    event_id = id,
                    "Telemetry event"
                );
                metrics::record_event(node_type, logic_branch, token_burn);
                Some(id)
            }
            Err(e) => {
                warn!(
                    agent_id = %self.agent_id,
                    node_type = %node_type,
                    error = %e,
                    "Error logging telemetry"
                );
                metrics::record_write_failure();
                None
            }
        };

        EmittedStep {
            node_type,
            logic_branch,
            token_burn,
            event_id,
        }
    }
}

/// List candidate beads on the blocking pool
async fn fetch_actionable<W>(work: Arc<Mutex<W>>) -> Result<Vec<BeadId>>
where
    W: WorkSource + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut source = work
            .lock()
            .map_err(|_| WistecError::Other("work source poisoned".to_string()))?;
        source.actionable()
    })
    .await
    .map_err(|e| WistecError::Other(format!("join error: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bounds;
    use crate::swarm::{NoDelay, TokioPacer};
    use crate::work::{StaticWorkSource, IDLE_BEAD_ID};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Instant;
    use tempfile::NamedTempFile;

    /// Records requested delays instead of sleeping
    #[derive(Clone, Default)]
    struct RecordingPacer {
        pauses: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self, duration: Duration) {
            self.pauses.lock().unwrap().push(duration);
        }
    }

    fn test_store() -> (EventStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = EventStore::open(temp_file.path()).unwrap();
        store.ensure_schema().unwrap();
        (store, temp_file)
    }

    fn worker<P: Pacer>(
        store: EventStore,
        work: StaticWorkSource,
        pacer: P,
        config: SimulationConfig,
        seed: u64,
    ) -> AgentWorker<StaticWorkSource, P, StdRng> {
        AgentWorker::new(
            "Agent-1",
            store,
            work,
            pacer,
            StdRng::seed_from_u64(seed),
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn test_success_cycle() {
        let (store, temp) = test_store();
        let config = SimulationConfig::default().with_failure_rate(0.0);
        let mut agent = worker(store, StaticWorkSource::new(["bd-1"]), NoDelay, config, 1);

        let report = agent.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Success);
        assert_eq!(report.shape(), SUCCESS_SEQUENCE.to_vec());
        assert_eq!(report.bead_id.as_str(), "bd-1");
        assert_eq!(report.failed_writes(), 0);

        let burns: Vec<u32> = report.steps.iter().map(|s| s.token_burn).collect();
        assert!((50..=150).contains(&burns[0]));
        assert!((200..=500).contains(&burns[1]));
        assert_eq!(burns[2], 0);

        let reader = EventStore::open_read_only(temp.path()).unwrap();
        let events = reader.events_for_agent("Agent-1").unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.bead_id == "bd-1"));
        assert_eq!(events[0].token_burn, i64::from(burns[0]));
    }

    #[tokio::test]
    async fn test_healed_cycle() {
        let (store, _temp) = test_store();
        let config = SimulationConfig::default().with_failure_rate(1.0);
        let mut agent = worker(store, StaticWorkSource::new(["bd-1"]), NoDelay, config, 2);

        let report = agent.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Healed);
        assert_eq!(report.shape(), HEALED_SEQUENCE.to_vec());

        let burns: Vec<u32> = report.steps.iter().map(|s| s.token_burn).collect();
        assert!((50..=150).contains(&burns[0]));
        assert_eq!(burns[1], 0);
        assert!((100..=300).contains(&burns[2]));
        assert!((200..=500).contains(&burns[3]));
        assert_eq!(burns[4], 0);
    }

    #[tokio::test]
    async fn test_failure_path_costs_more() {
        let (store, _temp) = test_store();
        let mut config = SimulationConfig::default().with_failure_rate(1.0);
        config.analysis_burn = Bounds::new(100, 100);
        config.healing_burn = Bounds::new(200, 200);
        config.execution_burn = Bounds::new(300, 300);
        let mut healed = worker(store, StaticWorkSource::empty(), NoDelay, config.clone(), 3);

        let (store, _temp2) = test_store();
        let mut clean = worker(
            store,
            StaticWorkSource::empty(),
            NoDelay,
            config.with_failure_rate(0.0),
            3,
        );

        let healed_burn = healed.run_cycle().await.token_burn();
        let clean_burn = clean.run_cycle().await.token_burn();
        assert_eq!(healed_burn, 600);
        assert_eq!(clean_burn, 400);
    }

    #[tokio::test]
    async fn test_idle_bead_when_no_work() {
        let (store, _temp) = test_store();
        let mut agent = worker(
            store,
            StaticWorkSource::empty(),
            NoDelay,
            SimulationConfig::default(),
            4,
        );

        let report = agent.run_cycle().await;
        assert_eq!(report.bead_id.as_str(), IDLE_BEAD_ID);
    }

    #[tokio::test]
    async fn test_delay_sequence() {
        let mut config = SimulationConfig::default().with_failure_rate(1.0);
        config.think_delay_ms = Bounds::new(700, 700);
        let pacer = RecordingPacer::default();

        let (store, _temp) = test_store();
        let mut agent = worker(store, StaticWorkSource::empty(), pacer.clone(), config, 5);
        agent.run_cycle().await;

        let pauses = pacer.pauses.lock().unwrap().clone();
        assert_eq!(
            pauses,
            vec![
                Duration::from_millis(700),
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(700),
            ]
        );
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let config = SimulationConfig::default();

        let (store_a, _ta) = test_store();
        let (store_b, _tb) = test_store();
        let work = StaticWorkSource::new(["bd-1", "bd-2", "bd-3"]);
        let mut a = worker(store_a, work.clone(), NoDelay, config.clone(), 99);
        let mut b = worker(store_b, work, NoDelay, config, 99);

        for _ in 0..10 {
            let ra = a.run_cycle().await;
            let rb = b.run_cycle().await;
            assert_eq!(ra.bead_id, rb.bead_id);
            assert_eq!(ra.shape(), rb.shape());
            assert_eq!(ra.token_burn(), rb.token_burn());
        }
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_cycle() {
        let temp_file = NamedTempFile::new().unwrap();
        // No schema: every insert fails
        let store = EventStore::open(temp_file.path()).unwrap();
        let config = SimulationConfig::default().with_failure_rate(0.0);
        let mut agent = worker(store, StaticWorkSource::empty(), NoDelay, config, 6);

        let first = agent.run_cycle().await;
        assert_eq!(first.failed_writes(), 3);
        assert_eq!(first.shape(), SUCCESS_SEQUENCE.to_vec());

        let second = agent.run_cycle().await;
        assert_eq!(second.failed_writes(), 3);
    }

    #[tokio::test]
    async fn test_run_stops_between_cycles() {
        let (store, temp) = test_store();
        let config = SimulationConfig::default();
        let agent = worker(store, StaticWorkSource::empty(), NoDelay, config, 7);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(agent.run(stop_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let reader = EventStore::open_read_only(temp.path()).unwrap();
        let events = reader.events_for_agent("Agent-1").unwrap();
        assert!(!events.is_empty());
        assert_eq!(
            events.last().unwrap().step(),
            Some((NodeType::Completion, LogicBranch::Normal))
        );
    }

    #[tokio::test]
    async fn test_locked_database_does_not_stall_runtime() {
        let (store, temp) = test_store();
        // Another writer holds the lock, so the agent's first insert waits
        let blocker = rusqlite::Connection::open(temp.path()).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        let config = SimulationConfig::default().with_uniform_delay(1);
        let agent = worker(store, StaticWorkSource::empty(), TokioPacer, config, 8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(agent.run(stop_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let elapsed = started.elapsed();

        blocker.execute_batch("COMMIT").unwrap();
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(
            elapsed < Duration::from_secs(1),
            "10ms timer took {:?} while the agent waited on the lock",
            elapsed
        );
        let reader = EventStore::open_read_only(temp.path()).unwrap();
        assert!(!reader.events_for_agent("Agent-1").unwrap().is_empty());
    }
}
