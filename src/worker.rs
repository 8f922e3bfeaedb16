//! Scoring worker - FIFO queue and single background consumer
//!
//! Callers enqueue submission ids from any context; one task drains the
//! queue in order and drives each record `pending → running → terminal`.
//!
//! The worker module does NOT:
//! - Create submissions (the request layer does)
//! - Cancel a scoring pass in flight
//! - Run more than one consumer

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, OwnedMutexGuard};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::core::{Submission, SubmissionId, SubmissionStatus};
use crate::error::{StoreError, WorkerError};
use crate::scoring::ScoringService;
use crate::store::{SubmissionQueue, SubmissionStore};

#[derive(Debug)]
enum QueueMessage {
    Score(SubmissionId),
    Stop,
}

type Receiver = mpsc::UnboundedReceiver<QueueMessage>;

/// State shared with the consumer task
struct Processor {
    service: Arc<ScoringService>,
    store: Arc<dyn SubmissionStore>,
    /// Items enqueued but not yet acknowledged
    pending: watch::Sender<usize>,
    /// Submission the consumer is working on right now
    in_flight: watch::Sender<Option<SubmissionId>>,
}

pub struct ScoringWorker {
    processor: Arc<Processor>,
    sender: mpsc::UnboundedSender<QueueMessage>,
    receiver: Arc<Mutex<Receiver>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stop_timeout: Duration,
}

impl ScoringWorker {
    pub fn new(
        service: Arc<ScoringService>,
        store: Arc<dyn SubmissionStore>,
        stop_timeout: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0);
        let (in_flight, _) = watch::channel(None);
        Self {
            processor: Arc::new(Processor {
                service,
                store,
                pending,
                in_flight,
            }),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            handle: Mutex::new(None),
            stop_timeout,
        }
    }

    /// Spawn the consumer task. No-op while it is already running.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Scoring worker already running");
            return;
        }

        let processor = self.processor.clone();
        let receiver = self.receiver.clone();
        *handle = Some(tokio::spawn(async move {
            // A previous consumer that outlived its stop bound still holds this
            let receiver = receiver.lock_owned().await;
            run_loop(processor, receiver).await;
        }));
        info!("Scoring worker started");
    }

    /// Push the stop sentinel and wait, bounded, for the consumer to exit.
    ///
    /// Items queued behind the sentinel stay queued for the next `start()`.
    pub async fn stop(&self) {
        let Some(handle) = self.handle.lock().await.take() else {
            return;
        };
        if handle.is_finished() {
            return;
        }

        if self.sender.send(QueueMessage::Stop).is_err() {
            warn!("Scoring queue closed before stop");
        }
        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(Ok(())) => info!("Scoring worker stopped"),
            Ok(Err(e)) => error!("Scoring worker task failed: {}", e),
            Err(_) => warn!(
                "Scoring worker did not stop within {:?}; leaving it to drain",
                self.stop_timeout
            ),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Queue a submission id. Never blocks; items wait if the worker is stopped.
    pub fn enqueue(&self, id: SubmissionId) {
        self.processor.pending.send_modify(|n| *n += 1);
        if self.sender.send(QueueMessage::Score(id)).is_err() {
            self.processor.pending.send_modify(|n| *n = n.saturating_sub(1));
            error!("Scoring queue closed; dropping submission {}", id);
        }
    }

    /// Wait until every enqueued item has been processed.
    ///
    /// Blocks indefinitely while items are queued and the worker is stopped.
    pub async fn flush(&self) {
        let mut pending = self.processor.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = pending.wait_for(|n| *n == 0).await;
    }

    /// Enqueue ids from `queue` until `shutdown` becomes true.
    ///
    /// The flag is only checked between pops. A pop is never abandoned
    /// halfway, so every id the queue hands out gets enqueued.
    pub async fn pull_from(
        &self,
        queue: &mut dyn SubmissionQueue,
        shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            if let Some(id) = queue.next_id().await {
                debug!("Received submission {}", id);
                self.enqueue(id);
            }
        }
    }

    /// Persist a new pending submission and queue it
    pub async fn submit(&self, submission: &Submission) -> Result<SubmissionId, WorkerError> {
        self.processor.store.save(submission).await?;
        self.enqueue(submission.id);
        Ok(submission.id)
    }

    /// Reset a submission to `pending`, optionally with new code, and queue it again.
    ///
    /// A `running` record is refused while the worker is scoring it. One left
    /// `running` by an interrupted cycle is reset like any other.
    pub async fn rescore(&self, id: SubmissionId, code: Option<String>) -> Result<(), WorkerError> {
        let mut submission = self
            .processor
            .store
            .load(id)
            .await?
            .ok_or(WorkerError::NotFound(id))?;

        if submission.status == SubmissionStatus::Running {
            if *self.processor.in_flight.borrow() == Some(id) {
                return Err(WorkerError::InvalidTransition {
                    id,
                    from: submission.status,
                    to: SubmissionStatus::Pending,
                });
            }
            warn!("Submission {} was left running; resetting it", id);
        }

        submission.reset_for_rescore(code);
        self.processor.store.save(&submission).await?;
        self.enqueue(id);
        info!("Submission {} queued for rescoring", id);
        Ok(())
    }
}

async fn run_loop(processor: Arc<Processor>, mut receiver: OwnedMutexGuard<Receiver>) {
    while let Some(message) = receiver.recv().await {
        match message {
            QueueMessage::Stop => {
                debug!("Stop sentinel received");
                break;
            }
            QueueMessage::Score(id) => {
                processor.process(id).await;
                processor.pending.send_modify(|n| *n = n.saturating_sub(1));
            }
        }
    }
}

impl Processor {
    async fn process(&self, id: SubmissionId) {
        self.in_flight.send_replace(Some(id));
        if let Err(e) = self.try_process(id).await {
            error!("Failed to score submission {}: {}", id, e);
        }
        self.in_flight.send_replace(None);
    }

    async fn try_process(&self, id: SubmissionId) -> Result<(), StoreError> {
        let Some(mut submission) = self.store.load(id).await? else {
            warn!("Submission {} missing; skipping scoring.", id);
            return Ok(());
        };

        if !submission.status.can_transition_to(SubmissionStatus::Running) {
            warn!(
                "Submission {} is {}, not pending; skipping scoring.",
                id, submission.status
            );
            return Ok(());
        }

        info!("Scoring submission {} ({})", id, submission.challenge_slug);
        submission.mark_running();
        self.store.save(&submission).await?;

        // Run the pass in its own task so a panic cannot take down the loop
        let service = self.service.clone();
        let snapshot = submission.clone();
        let scored = tokio::spawn(async move { service.score(&snapshot).await }).await;

        match scored {
            Ok(result) if submission.status.can_transition_to(result.status) => {
                submission.apply(result)
            }
            Ok(result) => {
                let fault = format!("invalid status transition to {}", result.status);
                error!("Submission {}: {}", id, fault);
                submission.mark_error(&fault);
            }
            Err(e) => {
                let fault = panic_message(e);
                error!("Scoring pass for {} failed: {}", id, fault);
                submission.mark_error(&fault);
            }
        }

        self.persist_result(&mut submission).await?;
        info!(
            "Submission {} completed: status={}, score={:?}",
            id, submission.status, submission.score
        );
        Ok(())
    }

    /// Save the outcome of a pass so the record does not stay `running`.
    ///
    /// Retries once, then stores an `error` record naming the failure.
    async fn persist_result(&self, submission: &mut Submission) -> Result<(), StoreError> {
        let Err(e) = self.store.save(submission).await else {
            return Ok(());
        };
        warn!("Failed to store result for {}: {}. Retrying...", submission.id, e);

        if let Err(e) = self.store.save(submission).await {
            error!("Result for {} could not be stored: {}", submission.id, e);
            submission.mark_error(&format!("failed to store result: {}", e));
            self.store.save(submission).await?;
        }
        Ok(())
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "scoring task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "scoring task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::Analyzer;
    use crate::config::ScoringConfig;
    use crate::core::AnalysisIssue;
    use crate::rules::RuleEngine;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::ops::Range;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::time::Instant;
    use uuid::Uuid;

    const SAFE_SQL: &str = "db.execute(\"SELECT * FROM users WHERE name = ?\", (name,))\n";

    /// Panics on snippets containing "boom"; stamps a counter otherwise
    struct TripwireAnalyzer {
        counter: AtomicUsize,
    }

    #[async_trait]
    impl Analyzer for TripwireAnalyzer {
        fn name(&self) -> &'static str {
            "tripwire"
        }

        async fn analyze(&self, code: &str) -> Vec<AnalysisIssue> {
            if code.contains("boom") {
                panic!("analyzer exploded");
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            vec![AnalysisIssue::new("tripwire", format!("pass {}", n), "info")]
        }
    }

    /// Sleeps before reporting nothing on snippets containing "slow"
    struct SlowAnalyzer {
        delay: Duration,
    }

    #[async_trait]
    impl Analyzer for SlowAnalyzer {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn analyze(&self, code: &str) -> Vec<AnalysisIssue> {
            if code.contains("slow") {
                tokio::time::sleep(self.delay).await;
            }
            Vec::new()
        }
    }

    /// Memory store that records every save
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        saves: StdMutex<Vec<(SubmissionId, SubmissionStatus)>>,
    }

    #[async_trait]
    impl SubmissionStore for RecordingStore {
        async fn load(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
            self.inner.load(id).await
        }

        async fn save(&self, submission: &Submission) -> Result<(), StoreError> {
            self.saves
                .lock()
                .unwrap()
                .push((submission.id, submission.status));
            self.inner.save(submission).await
        }
    }

    /// Memory store whose saves fail while their sequence number is in `failing`
    struct FlakyStore {
        inner: MemoryStore,
        saves: AtomicUsize,
        failing: Range<usize>,
    }

    impl FlakyStore {
        fn failing(failing: Range<usize>) -> Self {
            Self {
                inner: MemoryStore::new(),
                saves: AtomicUsize::new(0),
                failing,
            }
        }
    }

    #[async_trait]
    impl SubmissionStore for FlakyStore {
        async fn load(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
            self.inner.load(id).await
        }

        async fn save(&self, submission: &Submission) -> Result<(), StoreError> {
            let n = self.saves.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&n) {
                let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
                return Err(StoreError::Serialization(err));
            }
            self.inner.save(submission).await
        }
    }

    /// Hands out ids in order and raises the shutdown flag while giving out the last
    struct ScriptedQueue {
        ids: VecDeque<SubmissionId>,
        shutdown: watch::Sender<bool>,
        pops: usize,
    }

    #[async_trait]
    impl SubmissionQueue for ScriptedQueue {
        async fn next_id(&mut self) -> Option<SubmissionId> {
            self.pops += 1;
            let id = self.ids.pop_front();
            if self.ids.is_empty() {
                self.shutdown.send_replace(true);
            }
            tokio::task::yield_now().await;
            id
        }
    }

    fn service_with(analyzer: Box<dyn Analyzer>) -> Arc<ScoringService> {
        let policy = ScoringConfig::default();
        Arc::new(ScoringService::new(vec![analyzer], RuleEngine::new(policy), None, policy))
    }

    fn tripwire() -> Box<dyn Analyzer> {
        Box::new(TripwireAnalyzer {
            counter: AtomicUsize::new(0),
        })
    }

    fn worker_with(store: Arc<RecordingStore>) -> ScoringWorker {
        ScoringWorker::new(service_with(tripwire()), store, Duration::from_secs(5))
    }

    async fn wait_for_status(
        store: &dyn SubmissionStore,
        id: SubmissionId,
        status: SubmissionStatus,
    ) {
        for _ in 0..200 {
            if store.load(id).await.unwrap().map(|s| s.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("submission {} never reached {}", id, status);
    }

    async fn seed(store: &RecordingStore, slug: &str, code: &str) -> SubmissionId {
        let submission = Submission::new(slug, code, None).unwrap();
        store.inner.save(&submission).await.unwrap();
        submission.id
    }

    async fn stored(store: &RecordingStore, id: SubmissionId) -> Submission {
        store.inner.load(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_flush_waits_for_all_in_fifo_order() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        worker.start().await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(seed(&store, "sqli_001", SAFE_SQL).await);
        }
        for id in &ids {
            worker.enqueue(*id);
        }
        worker.flush().await;

        for (n, id) in ids.iter().enumerate() {
            let submission = stored(&store, *id).await;
            assert!(submission.status.is_terminal());
            assert_eq!(submission.status, SubmissionStatus::Passed);
            assert_eq!(submission.issues[0].message, format!("pass {}", n));
        }

        let running_order: Vec<_> = store
            .saves
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, status)| *status == SubmissionStatus::Running)
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(running_order, ids);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_missing_record_is_skipped() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        worker.start().await;

        worker.enqueue(Uuid::new_v4());
        let id = seed(&store, "cmdi_001", "os.system(cmd)").await;
        worker.enqueue(id);
        worker.flush().await;

        assert_eq!(stored(&store, id).await.status, SubmissionStatus::Failed);
        assert_eq!(store.saves.lock().unwrap().len(), 2);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_panic_is_isolated_to_one_submission() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        worker.start().await;

        let bad = seed(&store, "sqli_001", "boom").await;
        let good = seed(&store, "sqli_001", SAFE_SQL).await;
        worker.enqueue(bad);
        worker.enqueue(good);
        worker.flush().await;

        let failed = stored(&store, bad).await;
        assert_eq!(failed.status, SubmissionStatus::Error);
        assert_eq!(failed.score, None);
        assert_eq!(failed.feedback.as_deref(), Some("Scoring failure: analyzer exploded"));
        assert_eq!(failed.issues, vec![AnalysisIssue::new("scoring", "analyzer exploded", "error")]);

        assert_eq!(stored(&store, good).await.status, SubmissionStatus::Passed);
        assert!(worker.is_running().await);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_restart() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());

        worker.start().await;
        worker.start().await;
        assert!(worker.is_running().await);

        worker.stop().await;
        assert!(!worker.is_running().await);
        worker.stop().await;

        // Enqueue succeeds while stopped; the item waits
        let id = seed(&store, "xss_001", "return escape(name)\n").await;
        worker.enqueue(id);
        tokio::task::yield_now().await;
        assert_eq!(stored(&store, id).await.status, SubmissionStatus::Pending);

        worker.start().await;
        worker.flush().await;
        assert_eq!(stored(&store, id).await.status, SubmissionStatus::Passed);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_terminal_record_is_not_rescored_without_reset() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        worker.start().await;

        let id = seed(&store, "sqli_001", SAFE_SQL).await;
        worker.enqueue(id);
        worker.enqueue(id);
        worker.flush().await;

        assert_eq!(stored(&store, id).await.status, SubmissionStatus::Passed);
        assert_eq!(store.saves.lock().unwrap().len(), 2);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_rescore_resets_and_requeues() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        worker.start().await;

        let submission = Submission::new("sqli_001", SAFE_SQL, None).unwrap();
        let id = worker.submit(&submission).await.unwrap();
        worker.flush().await;
        assert_eq!(stored(&store, id).await.status, SubmissionStatus::Passed);

        let new_code = "cursor.execute(\"SELECT * FROM users WHERE id = \" + uid)\n";
        worker.rescore(id, Some(new_code.into())).await.unwrap();
        worker.flush().await;

        let rescored = stored(&store, id).await;
        assert_eq!(rescored.code, new_code);
        assert_eq!(rescored.status, SubmissionStatus::Failed);
        assert_eq!(rescored.score, Some(0));

        let statuses: Vec<_> = store.saves.lock().unwrap().iter().map(|(_, s)| *s).collect();
        assert_eq!(
            statuses,
            vec![
                SubmissionStatus::Pending,
                SubmissionStatus::Running,
                SubmissionStatus::Passed,
                SubmissionStatus::Pending,
                SubmissionStatus::Running,
                SubmissionStatus::Failed,
            ]
        );
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_rescore_of_missing_record() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());

        let missing = Uuid::new_v4();
        assert!(matches!(
            worker.rescore(missing, None).await,
            Err(WorkerError::NotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_rescore_refuses_only_the_item_in_flight() {
        let store = Arc::new(RecordingStore::default());
        let slow = SlowAnalyzer {
            delay: Duration::from_millis(200),
        };
        let worker = ScoringWorker::new(
            service_with(Box::new(slow)),
            store.clone(),
            Duration::from_secs(5),
        );
        worker.start().await;

        let id = seed(&store, "sqli_001", &format!("{}# slow\n", SAFE_SQL)).await;
        worker.enqueue(id);
        wait_for_status(store.as_ref(), id, SubmissionStatus::Running).await;
        assert!(matches!(
            worker.rescore(id, None).await,
            Err(WorkerError::InvalidTransition { from: SubmissionStatus::Running, .. })
        ));
        worker.flush().await;
        assert_eq!(stored(&store, id).await.status, SubmissionStatus::Passed);

        // Left running by a cycle that never finished
        let mut stale = Submission::new("sqli_001", SAFE_SQL, None).unwrap();
        stale.mark_running();
        store.inner.save(&stale).await.unwrap();
        worker.rescore(stale.id, None).await.unwrap();
        worker.flush().await;
        assert_eq!(stored(&store, stale.id).await.status, SubmissionStatus::Passed);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_failed_result_save_is_retried() {
        // Save 0 marks running; save 1 is the first attempt at the result
        let store = Arc::new(FlakyStore::failing(1..2));
        let worker =
            ScoringWorker::new(service_with(tripwire()), store.clone(), Duration::from_secs(5));
        worker.start().await;

        let submission = Submission::new("sqli_001", SAFE_SQL, None).unwrap();
        store.inner.save(&submission).await.unwrap();
        worker.enqueue(submission.id);
        worker.flush().await;

        let loaded = store.inner.load(submission.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Passed);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_unstorable_result_becomes_error_record() {
        let store = Arc::new(FlakyStore::failing(1..3));
        let worker =
            ScoringWorker::new(service_with(tripwire()), store.clone(), Duration::from_secs(5));
        worker.start().await;

        let submission = Submission::new("sqli_001", SAFE_SQL, None).unwrap();
        store.inner.save(&submission).await.unwrap();
        worker.enqueue(submission.id);
        worker.flush().await;

        let loaded = store.inner.load(submission.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Error);
        assert_eq!(loaded.score, None);
        assert!(loaded
            .feedback
            .unwrap()
            .starts_with("Scoring failure: failed to store result"));
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_record_stuck_running_can_be_rescored() {
        // Every save after the running mark fails
        let store = Arc::new(FlakyStore::failing(1..4));
        let worker =
            ScoringWorker::new(service_with(tripwire()), store.clone(), Duration::from_secs(5));
        worker.start().await;

        let submission = Submission::new("sqli_001", SAFE_SQL, None).unwrap();
        store.inner.save(&submission).await.unwrap();
        worker.enqueue(submission.id);
        worker.flush().await;
        let stuck = store.inner.load(submission.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, SubmissionStatus::Running);

        worker.rescore(submission.id, None).await.unwrap();
        worker.flush().await;
        let loaded = store.inner.load(submission.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Passed);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_bounded_stop_then_restart_drains_with_one_consumer() {
        let store = Arc::new(RecordingStore::default());
        let slow = SlowAnalyzer {
            delay: Duration::from_millis(300),
        };
        let worker = ScoringWorker::new(
            service_with(Box::new(slow)),
            store.clone(),
            Duration::from_millis(50),
        );
        worker.start().await;

        let first = seed(&store, "sqli_001", &format!("{}# slow\n", SAFE_SQL)).await;
        worker.enqueue(first);
        wait_for_status(store.as_ref(), first, SubmissionStatus::Running).await;

        let started = Instant::now();
        worker.stop().await;
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(!worker.is_running().await);
        assert_eq!(stored(&store, first).await.status, SubmissionStatus::Running);

        // Queued behind the stop sentinel
        let second = seed(&store, "sqli_001", SAFE_SQL).await;
        worker.enqueue(second);
        worker.start().await;
        worker.flush().await;

        assert_eq!(stored(&store, first).await.status, SubmissionStatus::Passed);
        assert_eq!(stored(&store, second).await.status, SubmissionStatus::Passed);
        assert_eq!(
            *store.saves.lock().unwrap(),
            vec![
                (first, SubmissionStatus::Running),
                (first, SubmissionStatus::Passed),
                (second, SubmissionStatus::Running),
                (second, SubmissionStatus::Passed),
            ]
        );
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_id_popped_as_shutdown_arrives_is_still_scored() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        worker.start().await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(seed(&store, "sqli_001", SAFE_SQL).await);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut queue = ScriptedQueue {
            ids: ids.iter().copied().collect(),
            shutdown: shutdown_tx,
            pops: 0,
        };

        worker.pull_from(&mut queue, shutdown_rx).await;
        worker.flush().await;

        assert_eq!(queue.pops, 3);
        for id in ids {
            assert_eq!(stored(&store, id).await.status, SubmissionStatus::Passed);
        }
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_pull_from_does_not_pop_after_shutdown() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        let mut queue = ScriptedQueue {
            ids: VecDeque::from([Uuid::new_v4()]),
            shutdown: shutdown_tx,
            pops: 0,
        };

        worker.pull_from(&mut queue, shutdown_rx).await;

        assert_eq!(queue.pops, 0);
        assert_eq!(queue.ids.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_challenge_stays_pending() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(store.clone());
        worker.start().await;

        let id = seed(&store, "ssrf_001", "requests.get(url)").await;
        worker.enqueue(id);
        worker.flush().await;

        let submission = stored(&store, id).await;
        assert_eq!(submission.status, SubmissionStatus::Pending);
        assert_eq!(submission.score, None);
        worker.stop().await;
    }
}
