//! Channel lifecycle against the video pipeline service
//!
//! The orchestrator launches every channel on a fixed stagger, polls decode
//! status for frame counts while the run lasts, and stops whatever is still
//! running when `stop_all` is called. Channel records live behind the
//! orchestrator's lock, which is never held across a service call.

pub mod channel;

pub use channel::Channel;

use crate::{
    client::{DecodeRequest, DecodeStatus, PipelineClient, StopAck},
    error::{AppError, Result},
    logging::ServiceLogger,
    models::{ChannelReport, ErrorOperation, ErrorRecord, TestConfig},
    store::TelemetryStore,
    types::{ChannelEvent, ChannelState},
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant, MissedTickBehavior};

type ChannelTable = BTreeMap<String, Channel>;

/// What `stop_all` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopSummary {
    /// Pending channels that never launched
    pub cancelled: usize,
    /// Channels the service confirmed stopped (or no longer knew)
    pub stopped: usize,
    /// Stop requests that failed or ran past the grace period
    pub failed: usize,
}

struct Shared {
    config: Arc<TestConfig>,
    client: Arc<dyn PipelineClient>,
    store: Arc<TelemetryStore>,
    logger: ServiceLogger,
    channels: Mutex<ChannelTable>,
    in_flight: StdMutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    /// Apply an event and publish the new state. Illegal events return false.
    async fn transition(&self, channels: &mut ChannelTable, channel_id: &str, event: ChannelEvent) -> bool {
        let Some(channel) = channels.get_mut(channel_id) else {
            return false;
        };
        match channel.apply(event) {
            Some((from, to)) => {
                self.store.publish_channel(channel_id, to, channel.frame_count).await;
                self.logger.log_transition(channel_id, from, to).await;
                true
            }
            None => false,
        }
    }

    /// Record an error once, on the channel and in the shared log
    async fn record_failure(&self, channels: &mut ChannelTable, channel_id: &str, operation: ErrorOperation, message: String) {
        let record = ErrorRecord::new(channel_id, operation, message);
        if let Some(channel) = channels.get_mut(channel_id) {
            channel.push_error(&record);
        }
        self.logger
            .logger()
            .warn(&format!("{} {} failed", operation, channel_id))
            .field("channel_id", channel_id)
            .field("error", &record.message)
            .log()
            .await;
        self.store.record_error(record).await;
    }

    async fn start_channel(self: Arc<Self>, channel_id: String, source_url: String) {
        let request = DecodeRequest::new(&channel_id, &source_url, self.config.fps, self.config.hardware_accel);
        let outcome = self.client.start_decode(&request).await;

        let mut channels = self.channels.lock().await;
        match outcome {
            Ok(_) => {
                self.transition(&mut channels, &channel_id, ChannelEvent::Acknowledged).await;
            }
            Err(e) => {
                // a channel already being stopped keeps its Stopping state
                if self.transition(&mut channels, &channel_id, ChannelEvent::StartFailed).await {
                    self.record_failure(&mut channels, &channel_id, ErrorOperation::Start, e.to_string())
                        .await;
                }
            }
        }
    }

    async fn launch(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let launched_at = Instant::now();
        let delay = self.config.start_delay();
        let ids = self.config.channel_ids();

        for (index, channel_id) in ids.into_iter().enumerate() {
            let due = launched_at + delay.saturating_mul(index as u32);
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return,
                _ = tokio::time::sleep_until(due) => {}
            }

            let source_url = {
                let mut channels = self.channels.lock().await;
                if !self.transition(&mut channels, &channel_id, ChannelEvent::BeginStart).await {
                    continue;
                }
                channels
                    .get(&channel_id)
                    .map(|c| c.source_url.clone())
                    .unwrap_or_default()
            };

            let task = tokio::spawn(self.clone().start_channel(channel_id, source_url));
            if let Ok(mut in_flight) = self.in_flight.lock() {
                in_flight.push(task);
            }
        }
    }

    async fn poll_frames(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.monitor_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return,
                _ = ticker.tick() => {}
            }

            let active: Vec<String> = {
                let channels = self.channels.lock().await;
                channels
                    .values()
                    .filter(|c| c.state.is_active())
                    .map(|c| c.id.clone())
                    .collect()
            };
            if active.is_empty() {
                continue;
            }

            let statuses = join_all(active.iter().map(|id| self.client.decode_status(id))).await;
            let mut channels = self.channels.lock().await;
            for (channel_id, status) in active.iter().zip(statuses) {
                match status {
                    Ok(status) => self.apply_status(&mut channels, channel_id, status).await,
                    Err(e) => {
                        self.logger
                            .logger()
                            .debug("decode status unavailable")
                            .field("channel_id", channel_id)
                            .field("error", e.to_string())
                            .log()
                            .await;
                    }
                }
            }
        }
    }

    async fn apply_status(&self, channels: &mut ChannelTable, channel_id: &str, status: DecodeStatus) {
        let Some(channel) = channels.get_mut(channel_id) else {
            return;
        };
        channel.observe_frames(status.frame_count);
        let (state, frames) = (channel.state, channel.frame_count);

        if status.is_error() {
            if self.transition(channels, channel_id, ChannelEvent::Faulted).await {
                let message = status
                    .last_error
                    .unwrap_or_else(|| "service reported decode error".to_string());
                self.record_failure(channels, channel_id, ErrorOperation::Status, message)
                    .await;
            }
        } else {
            self.store.publish_channel(channel_id, state, frames).await;
        }
    }
}

/// Handle to a running set of channels
pub struct ChannelOrchestrator {
    shared: Arc<Shared>,
    cancel: watch::Sender<bool>,
    launcher: StdMutex<Option<JoinHandle<()>>>,
    poller: StdMutex<Option<JoinHandle<()>>>,
    stopping: AtomicBool,
}

impl ChannelOrchestrator {
    /// Register every channel as Pending and begin the staggered launch.
    /// Returns at once; progress is visible through the store.
    pub async fn start(
        config: Arc<TestConfig>,
        client: Arc<dyn PipelineClient>,
        store: Arc<TelemetryStore>,
        logger: ServiceLogger,
    ) -> Result<Self> {
        if config.rtsp_urls.len() != config.channel_count {
            return Err(AppError::config(format!(
                "{} source URLs for {} channels",
                config.rtsp_urls.len(),
                config.channel_count
            )));
        }

        let mut table = ChannelTable::new();
        for (channel_id, source_url) in config.channel_ids().iter().zip(&config.rtsp_urls) {
            store.publish_channel(channel_id, ChannelState::Pending, 0).await;
            table.insert(channel_id.clone(), Channel::new(channel_id, source_url));
        }

        let shared = Arc::new(Shared {
            config,
            client,
            store,
            logger,
            channels: Mutex::new(table),
            in_flight: StdMutex::new(Vec::new()),
        });

        let (cancel, cancelled) = watch::channel(false);
        let launcher = tokio::spawn(shared.clone().launch(cancelled.clone()));
        let poller = tokio::spawn(shared.clone().poll_frames(cancelled));

        Ok(Self {
            shared,
            cancel,
            launcher: StdMutex::new(Some(launcher)),
            poller: StdMutex::new(Some(poller)),
            stopping: AtomicBool::new(false),
        })
    }

    /// Stop everything that was started. Safe to call more than once; later
    /// calls do nothing.
    ///
    /// Waiting for in-flight starts and the stop requests share one deadline,
    /// so the whole call is bounded by the grace period.
    pub async fn stop_all(&self) -> StopSummary {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return StopSummary::default();
        }

        let logger = self.shared.logger.logger();
        let correlation_id = logger.start_operation("stop_all").await;
        let summary = self.stop_channels().await;
        logger
            .end_operation(&correlation_id, "stop_all", summary.failed == 0)
            .await;
        summary
    }

    async fn stop_channels(&self) -> StopSummary {
        let shared = &self.shared;
        let grace = shared.config.stop_grace_period();
        let deadline = Instant::now() + grace;
        let mut summary = StopSummary::default();
        let _ = self.cancel.send(true);

        if let Some(poller) = take(&self.poller) {
            poller.abort();
            let _ = poller.await;
        }
        if let Some(launcher) = take(&self.launcher) {
            let _ = launcher.await;
        }

        // never-launched channels
        {
            let mut channels = shared.channels.lock().await;
            let pending: Vec<String> = channels
                .values()
                .filter(|c| c.state == ChannelState::Pending)
                .map(|c| c.id.clone())
                .collect();
            for channel_id in pending {
                if shared.transition(&mut channels, &channel_id, ChannelEvent::Cancel).await {
                    summary.cancelled += 1;
                }
            }
        }

        // in-flight starts get the grace period to land
        let mut in_flight = shared
            .in_flight
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        if !in_flight.is_empty() && timeout_at(deadline, join_all(in_flight.iter_mut())).await.is_err() {
            shared
                .logger
                .logger()
                .warn("start requests still in flight after grace period")
                .field("grace_secs", grace.as_secs_f64())
                .log()
                .await;
        }
        for task in &in_flight {
            task.abort();
        }

        let targets: Vec<String> = {
            let mut channels = shared.channels.lock().await;
            let running: Vec<String> = channels
                .values()
                .filter(|c| matches!(c.state, ChannelState::Starting | ChannelState::Active))
                .map(|c| c.id.clone())
                .collect();
            let mut targets = Vec::with_capacity(running.len());
            for channel_id in running {
                if shared.transition(&mut channels, &channel_id, ChannelEvent::BeginStop).await {
                    targets.push(channel_id);
                }
            }
            targets
        };

        let outcomes = join_all(targets.iter().map(|channel_id| async move {
            match timeout_at(deadline, shared.client.stop_decode(channel_id)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::timeout(format!(
                    "stop did not complete within {:.1}s",
                    grace.as_secs_f64()
                ))),
            }
        }))
        .await;

        let mut channels = shared.channels.lock().await;
        for (channel_id, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(StopAck::Stopped) | Ok(StopAck::NotRunning) => summary.stopped += 1,
                Err(e) => {
                    summary.failed += 1;
                    shared
                        .record_failure(&mut channels, channel_id, ErrorOperation::Stop, e.to_string())
                        .await;
                }
            }
            shared
                .transition(&mut channels, channel_id, ChannelEvent::StopFinished)
                .await;
        }

        summary
    }

    /// Snapshot of every channel in id order
    pub async fn channels(&self) -> Vec<Channel> {
        self.shared.channels.lock().await.values().cloned().collect()
    }

    pub async fn reports(&self) -> Vec<ChannelReport> {
        self.shared.channels.lock().await.values().map(Channel::report).collect()
    }

    pub async fn state(&self, channel_id: &str) -> Option<ChannelState> {
        self.shared.channels.lock().await.get(channel_id).map(|c| c.state)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn grace_period(&self) -> Duration {
        self.shared.config.stop_grace_period()
    }
}

impl Drop for ChannelOrchestrator {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
        for slot in [&self.launcher, &self.poller] {
            if let Some(task) = take(slot) {
                task.abort();
            }
        }
    }
}

/// Resolves once cancellation is signalled or the orchestrator is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        let done = *rx.borrow_and_update();
        if done || rx.changed().await.is_err() {
            return;
        }
    }
}

fn take(slot: &StdMutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock().ok().and_then(|mut guard| guard.take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DecodeStatus, StartAck};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as TestMutex;

    /// In-process service double
    #[derive(Default)]
    struct FakeService {
        failing_starts: HashSet<String>,
        failing_stops: HashSet<String>,
        start_delay: Option<Duration>,
        stop_delay: Option<Duration>,
        frames: u64,
        faulted: HashSet<String>,
        started: TestMutex<Vec<String>>,
        stopped: TestMutex<Vec<String>>,
    }

    #[async_trait]
    impl PipelineClient for FakeService {
        async fn health(&self) -> Result<()> {
            Ok(())
        }

        async fn start_decode(&self, request: &DecodeRequest) -> Result<StartAck> {
            if let Some(delay) = self.start_delay {
                tokio::time::sleep(delay).await;
            }
            self.started.lock().unwrap().push(request.camera_id.clone());
            if self.failing_starts.contains(&request.camera_id) {
                return Err(AppError::http_request("HTTP 500: decoder unavailable"));
            }
            Ok(StartAck::Started)
        }

        async fn stop_decode(&self, camera_id: &str) -> Result<StopAck> {
            if let Some(delay) = self.stop_delay {
                tokio::time::sleep(delay).await;
            }
            self.stopped.lock().unwrap().push(camera_id.to_string());
            if self.failing_stops.contains(camera_id) {
                return Err(AppError::http_request("HTTP 500: stop failed"));
            }
            Ok(StopAck::Stopped)
        }

        async fn decode_status(&self, camera_id: &str) -> Result<DecodeStatus> {
            let faulted = self.faulted.contains(camera_id);
            Ok(DecodeStatus {
                camera_id: camera_id.to_string(),
                status: if faulted { "error" } else { "running" }.to_string(),
                frame_count: self.frames,
                last_error: faulted.then(|| "Process exited with code 1".to_string()),
            })
        }
    }

    fn config(channels: usize, start_delay: f64) -> Arc<TestConfig> {
        let mut config = TestConfig {
            channel_count: channels,
            channel_start_delay: start_delay,
            monitor_interval: 1.0,
            stop_grace_period: 5.0,
            ..TestConfig::default()
        };
        config.normalize_sources();
        Arc::new(config)
    }

    async fn start(service: Arc<FakeService>, config: Arc<TestConfig>) -> (ChannelOrchestrator, Arc<TelemetryStore>) {
        let store = Arc::new(TelemetryStore::new());
        let orchestrator = ChannelOrchestrator::start(config, service, store.clone(), ServiceLogger::quiet())
            .await
            .unwrap();
        (orchestrator, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_channels_start_then_stop() {
        let service = Arc::new(FakeService::default());
        let (orchestrator, store) = start(service.clone(), config(3, 1.0)).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.active_count().await, 3);

        let summary = orchestrator.stop_all().await;
        assert_eq!(summary, StopSummary { cancelled: 0, stopped: 3, failed: 0 });
        assert!(orchestrator
            .channels()
            .await
            .iter()
            .all(|c| c.state == ChannelState::Stopped && c.started_at.is_some()));
        assert_eq!(store.active_count().await, 0);
        assert_eq!(service.stopped.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_staggered() {
        let service = Arc::new(FakeService::default());
        let (orchestrator, _store) = start(service.clone(), config(3, 2.0)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(orchestrator.state("camera_001").await, Some(ChannelState::Active));
        assert_eq!(orchestrator.state("camera_002").await, Some(ChannelState::Pending));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(orchestrator.state("camera_002").await, Some(ChannelState::Active));
        assert_eq!(orchestrator.state("camera_003").await, Some(ChannelState::Pending));

        orchestrator.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_recorded_once() {
        let service = Arc::new(FakeService {
            failing_starts: HashSet::from(["camera_002".to_string()]),
            ..FakeService::default()
        });
        let (orchestrator, store) = start(service.clone(), config(3, 0.0)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(orchestrator.state("camera_002").await, Some(ChannelState::Failed));
        assert_eq!(store.active_count().await, 2);

        let summary = orchestrator.stop_all().await;
        assert_eq!(summary.stopped, 2);

        let errors = store.errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].channel_id, "camera_002");
        assert_eq!(errors[0].operation, ErrorOperation::Start);

        // failed channels are not asked to stop
        assert!(!service.stopped.lock().unwrap().contains(&"camera_002".to_string()));
        assert_eq!(orchestrator.state("camera_002").await, Some(ChannelState::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_cancels_pending_and_is_idempotent() {
        let service = Arc::new(FakeService::default());
        let (orchestrator, _store) = start(service.clone(), config(4, 10.0)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let summary = orchestrator.stop_all().await;
        assert_eq!(summary, StopSummary { cancelled: 3, stopped: 1, failed: 0 });
        assert_eq!(service.started.lock().unwrap().len(), 1);

        assert_eq!(orchestrator.stop_all().await, StopSummary::default());
        assert_eq!(service.stopped.lock().unwrap().len(), 1);

        // nothing launches after stop
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(service.started.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_recorded_and_channel_stopped() {
        let service = Arc::new(FakeService {
            failing_stops: HashSet::from(["camera_001".to_string()]),
            ..FakeService::default()
        });
        let (orchestrator, store) = start(service.clone(), config(2, 0.0)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let summary = orchestrator.stop_all().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.stopped, 1);

        let reports = orchestrator.reports().await;
        assert!(reports.iter().all(|r| r.state == ChannelState::Stopped));
        assert_eq!(reports[0].errors.len(), 1);
        assert_eq!(store.errors().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_start_waits_for_grace() {
        let service = Arc::new(FakeService {
            start_delay: Some(Duration::from_secs(2)),
            ..FakeService::default()
        });
        let (orchestrator, _store) = start(service.clone(), config(1, 0.0)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(orchestrator.state("camera_001").await, Some(ChannelState::Starting));

        let summary = orchestrator.stop_all().await;
        assert_eq!(summary.stopped, 1);
        assert_eq!(service.stopped.lock().unwrap().as_slice(), ["camera_001"]);
        assert_eq!(orchestrator.state("camera_001").await, Some(ChannelState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_bounded_by_one_grace_period() {
        let service = Arc::new(FakeService {
            start_delay: Some(Duration::from_secs(4)),
            stop_delay: Some(Duration::from_secs(4)),
            ..FakeService::default()
        });
        let (orchestrator, store) = start(service.clone(), config(1, 0.0)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let began = Instant::now();
        let summary = orchestrator.stop_all().await;
        assert!(began.elapsed() <= orchestrator.grace_period());

        // the start landed, leaving too little of the grace period for the stop
        assert_eq!(summary, StopSummary { cancelled: 0, stopped: 0, failed: 1 });
        let errors = store.errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, ErrorOperation::Stop);
        assert_eq!(orchestrator.state("camera_001").await, Some(ChannelState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_polling_and_fault() {
        let service = Arc::new(FakeService {
            frames: 25,
            faulted: HashSet::from(["camera_002".to_string()]),
            ..FakeService::default()
        });
        let (orchestrator, store) = start(service.clone(), config(2, 0.0)).await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.channel("camera_001").await.map(|v| v.frames), Some(25));
        assert_eq!(orchestrator.state("camera_002").await, Some(ChannelState::Failed));

        let errors = store.errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, ErrorOperation::Status);
        assert!(errors[0].message.contains("exited"));

        orchestrator.stop_all().await;
        assert_eq!(store.total_frames().await, 50);
    }

    #[tokio::test]
    async fn test_rejects_unnormalized_sources() {
        let config = Arc::new(TestConfig {
            channel_count: 3,
            rtsp_urls: vec!["rtsp://a/1".to_string()],
            ..TestConfig::default()
        });
        let result = ChannelOrchestrator::start(
            config,
            Arc::new(FakeService::default()),
            Arc::new(TelemetryStore::new()),
            ServiceLogger::quiet(),
        )
        .await;
        assert!(result.is_err());
    }
}
