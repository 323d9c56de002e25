//! Resource monitoring for benchmark runs
//!
//! Tracks process memory around engine load and the peak reached while a
//! workflow runs.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Sampling interval for peak memory tracking
const SAMPLE_INTERVAL_MS: u64 = 50;

/// Memory and load-time figures for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub engine_load_time_secs: f64,
    pub baseline_memory_mb: f64,
    /// Memory added by loading the engine
    pub engine_memory_mb: f64,
    pub peak_memory_mb: f64,
}

impl ResourceUsage {
    pub fn format_summary(&self) -> String {
        format!(
            "Load: {:.2}s | Baseline: {:.0}MB | Engine: {:.0}MB | Peak: {:.0}MB",
            self.engine_load_time_secs, self.baseline_memory_mb, self.engine_memory_mb, self.peak_memory_mb
        )
    }
}

/// Monitor for tracking resource usage during a run
pub struct ResourceMonitor {
    system: System,
    pid: Pid,
    baseline_memory_mb: f64,
    engine_memory_mb: f64,
    engine_load_time: Option<Duration>,
    peak_memory_mb: Arc<AtomicU64>,
    sampling_active: Arc<AtomicBool>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        Self {
            system,
            pid,
            baseline_memory_mb: 0.0,
            engine_memory_mb: 0.0,
            engine_load_time: None,
            peak_memory_mb: Arc::new(AtomicU64::new(0f64.to_bits())),
            sampling_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current process RSS in MB
    fn process_memory_mb(&mut self) -> f64 {
        self.system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system
            .process(self.pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    /// Snapshot baseline memory before engine load
    pub fn snapshot_baseline(&mut self) {
        self.baseline_memory_mb = self.process_memory_mb();
        self.peak_memory_mb
            .store(self.baseline_memory_mb.to_bits(), Ordering::SeqCst);
        tracing::debug!("Baseline memory: {:.1} MB", self.baseline_memory_mb);
    }

    /// Record memory after the engine is loaded
    pub fn record_engine_loaded(&mut self, load_duration: Duration) {
        let current = self.process_memory_mb();
        self.engine_memory_mb = (current - self.baseline_memory_mb).max(0.0);
        self.engine_load_time = Some(load_duration);
        update_peak(&self.peak_memory_mb, current);

        tracing::debug!(
            "Engine loaded: {:.1} MB (delta: {:.1} MB) in {:?}",
            current,
            self.engine_memory_mb,
            load_duration
        );
    }

    /// Start background memory sampling
    ///
    /// Sampling stops when the returned handle is dropped.
    pub fn start_sampling(&self) -> SamplingHandle {
        self.sampling_active.store(true, Ordering::SeqCst);

        let peak_memory = Arc::clone(&self.peak_memory_mb);
        let sampling_active = Arc::clone(&self.sampling_active);
        let pid = self.pid;

        let handle = std::thread::spawn(move || {
            let mut system = System::new();
            while sampling_active.load(Ordering::SeqCst) {
                system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                if let Some(process) = system.process(pid) {
                    update_peak(&peak_memory, process.memory() as f64 / (1024.0 * 1024.0));
                }
                std::thread::sleep(Duration::from_millis(SAMPLE_INTERVAL_MS));
            }
        });

        SamplingHandle {
            sampling_active: Arc::clone(&self.sampling_active),
            _thread: Some(handle),
        }
    }

    /// Stop sampling and collect the figures
    pub fn finalize(mut self) -> ResourceUsage {
        self.sampling_active.store(false, Ordering::SeqCst);

        let final_memory = self.process_memory_mb();
        update_peak(&self.peak_memory_mb, final_memory);

        ResourceUsage {
            engine_load_time_secs: self.engine_load_time.map(|d| d.as_secs_f64()).unwrap_or(0.0),
            baseline_memory_mb: self.baseline_memory_mb,
            engine_memory_mb: self.engine_memory_mb,
            peak_memory_mb: f64::from_bits(self.peak_memory_mb.load(Ordering::SeqCst)),
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Raise the stored peak to `current_mb` if it is higher
fn update_peak(peak: &AtomicU64, current_mb: f64) {
    let current_bits = current_mb.to_bits();
    let mut peak_bits = peak.load(Ordering::SeqCst);
    while current_mb > f64::from_bits(peak_bits) {
        match peak.compare_exchange(peak_bits, current_bits, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => break,
            Err(actual) => peak_bits = actual,
        }
    }
}

/// Handle for background memory sampling
///
/// Sampling continues while this handle is held. Drop to stop sampling.
pub struct SamplingHandle {
    sampling_active: Arc<AtomicBool>,
    _thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for SamplingHandle {
    fn drop(&mut self) {
        // The thread exits on its next wake-up; not joined
        self.sampling_active.store(false, Ordering::SeqCst);
    }
}
