//! Fixed-cadence host resource sampling

use crate::error::{AppError, Result};
use crate::logging::ServiceLogger;
use crate::models::MetricSample;
use crate::store::TelemetryStore;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Instantaneous host figures for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_mb: f64,
}

impl HostReading {
    /// Reject NaN or infinite figures, which cannot be stored in an artifact
    pub fn check_finite(&self) -> Result<()> {
        for (name, value) in [
            ("cpu_percent", self.cpu_percent),
            ("memory_percent", self.memory_percent),
            ("memory_mb", self.memory_mb),
        ] {
            if !value.is_finite() {
                return Err(AppError::sampling(format!("non-finite {} reading: {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Source of host readings
pub trait HostSampler: Send {
    fn sample(&mut self) -> Result<HostReading>;
}

/// System-wide CPU and memory usage via `sysinfo`
pub struct SysinfoSampler {
    system: System,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime it so the first tick is meaningful
        system.refresh_specifics(Self::refresh_kind());
        Self { system }
    }

    fn refresh_kind() -> RefreshKind {
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything())
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<HostReading> {
        self.system.refresh_specifics(Self::refresh_kind());

        let total_memory = self.system.total_memory();
        if total_memory == 0 {
            return Err(AppError::sampling("host reported zero total memory"));
        }
        let used_memory = self.system.used_memory();

        Ok(HostReading {
            cpu_percent: f64::from(self.system.global_cpu_usage()),
            memory_percent: used_memory as f64 / total_memory as f64 * 100.0,
            memory_mb: used_memory as f64 / 1024.0 / 1024.0,
        })
    }
}

/// Sampler returning the same reading on every tick
#[derive(Debug, Clone, Copy)]
pub struct StaticSampler(pub HostReading);

impl HostSampler for StaticSampler {
    fn sample(&mut self) -> Result<HostReading> {
        Ok(self.0)
    }
}

/// Called with every appended sample, e.g. to print progress
pub type SampleCallback = Box<dyn Fn(&MetricSample) + Send + Sync>;

/// Samples the host on a fixed schedule and appends to the store
pub struct MetricsMonitor<S: HostSampler> {
    store: Arc<TelemetryStore>,
    sampler: S,
    interval: Duration,
    logger: ServiceLogger,
    on_sample: Option<SampleCallback>,
}

impl<S: HostSampler + 'static> MetricsMonitor<S> {
    pub fn new(store: Arc<TelemetryStore>, sampler: S, interval: Duration, logger: ServiceLogger) -> Self {
        Self {
            store,
            sampler,
            // tokio intervals reject a zero period
            interval: interval.max(Duration::from_millis(1)),
            logger,
            on_sample: None,
        }
    }

    pub fn on_sample(mut self, callback: SampleCallback) -> Self {
        self.on_sample = Some(callback);
        self
    }

    /// Run on a background task until `shutdown` flips to true
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Sampling loop. Ticks follow a fixed schedule from the first tick, so
    /// time spent sampling does not shift later ticks.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut previous: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                scheduled = ticker.tick() => {
                    if let Some(prev) = previous {
                        let skipped = skipped_ticks(scheduled - prev, self.interval);
                        if skipped > 0 {
                            record_gaps(&self.store, &self.logger, skipped, "host stalled past the sampling schedule")
                                .await;
                        }
                    }
                    previous = Some(scheduled);
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&mut self) {
        let recorded = match sample_host(&mut self.sampler) {
            Ok(reading) => self.store.record_tick(reading, unix_now()).await,
            Err(e) => Err(e),
        };
        match recorded {
            Ok(sample) => {
                self.logger.log_sample(&sample).await;
                if let Some(callback) = &self.on_sample {
                    callback(&sample);
                }
            }
            Err(e) => record_gaps(&self.store, &self.logger, 1, &e.to_string()).await,
        }
    }
}

/// Take a reading, moving the blocking `/proc` refresh off the async
/// scheduler when the runtime has workers to spare.
fn sample_host<S: HostSampler>(sampler: &mut S) -> Result<HostReading> {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| sampler.sample()),
        _ => sampler.sample(),
    }
}

async fn record_gaps(store: &TelemetryStore, logger: &ServiceLogger, count: u64, reason: &str) {
    let mut total = 0;
    for _ in 0..count {
        total = store.record_gap().await;
    }
    logger.log_gap(total, reason).await;
}

/// Number of scheduled ticks that fell between two delivered ticks
fn skipped_ticks(elapsed: Duration, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 0;
    }
    let periods = (elapsed.as_secs_f64() / interval.as_secs_f64()).round();
    if periods > 1.0 {
        periods as u64 - 1
    } else {
        0
    }
}

/// Current wall-clock time as unix seconds
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
