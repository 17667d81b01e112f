use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::limits::{ResourceKind, ResourceLimits, ResourceUsage, UsageStats, Violation};
use super::sampler::{NullSampler, ProcSampler, Sample, UsageSampler};
use crate::event_bus::{Event, EventEmitter};

/// Tuning for the sampling task.
///
/// The 100 ms interval and 0.8 warning fraction are the product defaults;
/// deployments override them through the engine configuration.
#[derive(Clone, Copy, Debug)]
pub struct MonitorConfig {
    pub sample_interval: Duration,
    pub warn_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(100),
            warn_threshold: 0.8,
        }
    }
}

/// Outcome of an operation executed under the monitor.
#[derive(Debug)]
pub enum Monitored<T> {
    /// The operation finished before any limit was exceeded.
    Completed { value: T, stats: UsageStats },
    /// A limit was exceeded first; the operation was abandoned.
    Violated { violation: Violation, stats: UsageStats },
}

impl<T> Monitored<T> {
    /// Final usage statistics, whichever way the operation ended.
    #[must_use]
    pub fn stats(&self) -> &UsageStats {
        match self {
            Monitored::Completed { stats, .. } | Monitored::Violated { stats, .. } => stats,
        }
    }

    /// The violation, if the operation was cut short.
    #[must_use]
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Monitored::Completed { .. } => None,
            Monitored::Violated { violation, .. } => Some(violation),
        }
    }
}

#[derive(Debug, Default)]
struct UsageTrack {
    cpu_ms: u64,
    peak_memory_mb: u64,
    threads: u64,
    file_handles: u64,
}

impl UsageTrack {
    fn absorb(&mut self, sample: &Sample, cpu_baseline_ms: u64) {
        if let Some(cpu) = sample.cpu_ms {
            self.cpu_ms = cpu.saturating_sub(cpu_baseline_ms);
        }
        if let Some(mem) = sample.memory_mb {
            self.peak_memory_mb = self.peak_memory_mb.max(mem);
        }
        if let Some(threads) = sample.threads {
            self.threads = self.threads.max(threads);
        }
        if let Some(fds) = sample.file_handles {
            self.file_handles = self.file_handles.max(fds);
        }
    }
}

/// Periodic usage sampling with early-warning and violation reporting.
///
/// A dedicated task samples at the configured interval, publishes
/// [`Event::Resource`] snapshots, warns once per dimension when usage
/// crosses the threshold fraction of a limit, and trips a violation flag
/// when a limit is exceeded. The guarded future races that flag: the first
/// violation short-circuits the execution.
///
/// The sampling task never blocks the monitored execution.
pub struct ResourceMonitor {
    emitter: Option<Arc<dyn EventEmitter>>,
    sampler: Arc<dyn UsageSampler>,
    config: MonitorConfig,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::unobserved()
    }
}

impl ResourceMonitor {
    /// Monitor that publishes resource events through `emitter`.
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            emitter: Some(emitter),
            sampler: Arc::new(ProcSampler),
            config: MonitorConfig::default(),
        }
    }

    /// Monitor that enforces limits without publishing events.
    #[must_use]
    pub fn unobserved() -> Self {
        Self {
            emitter: None,
            sampler: Arc::new(ProcSampler),
            config: MonitorConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn UsageSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Monitor enforcing only wall-time, independent of the platform.
    #[must_use]
    pub fn wall_clock_only(mut self) -> Self {
        self.sampler = Arc::new(NullSampler);
        self
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Execute `fut` under this monitor.
    ///
    /// Completion yields `Monitored::Completed` with final usage and
    /// efficiency ratios; the first limit violation abandons the future and
    /// yields `Monitored::Violated`. Unlimited dimensions are never checked.
    pub async fn run<T, F>(
        &self,
        execution_id: &str,
        limits: ResourceLimits,
        fut: F,
    ) -> Monitored<T>
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let cpu_baseline_ms = self.sampler.sample().cpu_ms.unwrap_or(0);
        let track = Arc::new(Mutex::new(UsageTrack::default()));
        let (violation_tx, mut violation_rx) = watch::channel::<Option<Violation>>(None);

        let sampler_task = self.spawn_sampler(
            execution_id.to_string(),
            limits,
            start,
            cpu_baseline_ms,
            Arc::clone(&track),
            violation_tx,
        );

        let fut = std::pin::pin!(fut);
        let outcome = tokio::select! {
            value = fut => Ok(value),
            violation = Self::first_violation(&mut violation_rx) => Err(violation),
        };

        sampler_task.abort();
        let usage = Self::final_usage(execution_id, limits, start, &track);
        let stats = UsageStats::from_usage(usage);
        match outcome {
            Ok(value) => Monitored::Completed { value, stats },
            Err(violation) => Monitored::Violated { violation, stats },
        }
    }

    async fn first_violation(rx: &mut watch::Receiver<Option<Violation>>) -> Violation {
        loop {
            if let Some(v) = rx.borrow_and_update().clone() {
                return v;
            }
            if rx.changed().await.is_err() {
                // Sampler gone without a violation; stay pending so the
                // guarded future wins the select.
                std::future::pending::<()>().await;
            }
        }
    }

    fn spawn_sampler(
        &self,
        execution_id: String,
        limits: ResourceLimits,
        start: Instant,
        cpu_baseline_ms: u64,
        track: Arc<Mutex<UsageTrack>>,
        violation_tx: watch::Sender<Option<Violation>>,
    ) -> tokio::task::JoinHandle<()> {
        let sampler = Arc::clone(&self.sampler);
        let emitter = self.emitter.clone();
        let config = self.config;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.sample_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick of tokio's interval fires immediately; skip it so
            // the earliest reading lands one interval in.
            ticker.tick().await;

            let mut warned: FxHashSet<ResourceKind> = FxHashSet::default();
            loop {
                ticker.tick().await;
                let sample = sampler.sample();
                let usage = {
                    let mut guard = track.lock();
                    guard.absorb(&sample, cpu_baseline_ms);
                    ResourceUsage {
                        execution_id: execution_id.clone(),
                        wall_ms: start.elapsed().as_millis() as u64,
                        cpu_ms: guard.cpu_ms,
                        peak_memory_mb: guard.peak_memory_mb,
                        threads: guard.threads,
                        file_handles: guard.file_handles,
                        limits,
                        at: Utc::now(),
                    }
                };

                if let Some(emitter) = &emitter {
                    let _ = emitter.emit(Event::resource_usage(usage.clone()));
                }

                const CHECKED: [ResourceKind; 5] = [
                    ResourceKind::Memory,
                    ResourceKind::CpuTime,
                    ResourceKind::WallTime,
                    ResourceKind::Threads,
                    ResourceKind::FileHandles,
                ];
                for kind in CHECKED {
                    let Some(limit) = limits.limit_for(kind) else {
                        continue;
                    };
                    let current = usage.value_for(kind);
                    if current > limit {
                        let violation = Violation::new(kind, current, limit);
                        if let Some(emitter) = &emitter {
                            let _ = emitter.emit(Event::resource_violation(violation.clone()));
                        }
                        tracing::warn!(
                            target: "pipewright::monitor",
                            execution = %execution_id,
                            %violation,
                            "resource limit violated"
                        );
                        let _ = violation_tx.send(Some(violation));
                        return;
                    }
                    let threshold = (limit as f64 * config.warn_threshold) as u64;
                    if current >= threshold && warned.insert(kind) {
                        if let Some(emitter) = &emitter {
                            let _ = emitter.emit(Event::resource_warning(
                                kind,
                                current,
                                limit,
                                config.warn_threshold,
                            ));
                        }
                    }
                }
            }
        })
    }

    fn final_usage(
        execution_id: &str,
        limits: ResourceLimits,
        start: Instant,
        track: &Mutex<UsageTrack>,
    ) -> ResourceUsage {
        let guard = track.lock();
        ResourceUsage {
            execution_id: execution_id.to_string(),
            wall_ms: start.elapsed().as_millis() as u64,
            cpu_ms: guard.cpu_ms,
            peak_memory_mb: guard.peak_memory_mb,
            threads: guard.threads,
            file_handles: guard.file_handles,
            limits,
            at: Utc::now(),
        }
    }
}
