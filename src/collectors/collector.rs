use crate::collectors::backend::Backend;
use crate::collectors::error::CollectError;
use crate::collectors::Snapshot;
use crate::state::{DiskIoCounters, DiskIoStatus};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorPhase {
    Uninitialized,
    Primed,
}

/// Cumulative disk-I/O totals from the previous sample.
#[derive(Debug, Clone, Copy)]
struct DiskBaseline {
    read_bytes: u64,
    write_bytes: u64,
    at: Instant,
}

/// Samples every backend capability once per call and keeps the disk-I/O
/// baseline between calls.
pub struct Collector {
    backend: Arc<dyn Backend>,
    baseline: Mutex<Option<DiskBaseline>>,
}

impl Collector {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            baseline: Mutex::new(None),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn phase(&self) -> CollectorPhase {
        match *self.baseline.lock().await {
            Some(_) => CollectorPhase::Primed,
            None => CollectorPhase::Uninitialized,
        }
    }

    pub async fn collect(&self, timestamp_unix: i64) -> Snapshot {
        self.collect_at(Instant::now(), timestamp_unix).await
    }

    /// One sampling pass. Capabilities run concurrently; a failed capability
    /// leaves its field at the zero value and is recorded in `errors`.
    pub async fn collect_at(&self, now: Instant, timestamp_unix: i64) -> Snapshot {
        let (batteries, thermal, sensors, disks, disk_io, memory) = tokio::join!(
            self.guarded("battery", |b| async move { b.collect_batteries().await }),
            self.guarded("thermal", |b| async move { Ok(b.collect_thermal().await) }),
            self.guarded("sensors", |b| async move { b.collect_sensors().await }),
            self.guarded("disks", |b| async move { b.collect_disks().await }),
            self.sample_disk_io(now),
            self.guarded("memory", |b| async move {
                Ok(b.collect_memory_details().await)
            }),
        );

        let mut errors = BTreeMap::new();
        let mut snapshot = Snapshot {
            timestamp_unix,
            backend: self.backend.name(),
            ..Snapshot::default()
        };
        snapshot.batteries = settle("battery", batteries, &mut errors);
        snapshot.thermal = settle("thermal", thermal, &mut errors);
        snapshot.sensors = settle("sensors", sensors, &mut errors);
        snapshot.disks = settle("disks", disks, &mut errors);
        snapshot.disk_io = settle("disk_io", disk_io, &mut errors);
        snapshot.memory = settle("memory", memory, &mut errors);
        snapshot.errors = errors;
        snapshot
    }

    async fn sample_disk_io(&self, now: Instant) -> Result<DiskIoStatus, CollectError> {
        // Held across the backend call so overlapping passes serialize here.
        let mut baseline = self.baseline.lock().await;
        let counters = self
            .guarded("disk_io", |b| async move { b.collect_disk_io_raw().await })
            .await?;
        let (read_bytes, write_bytes) = sum_counters(&counters);

        let status = match *baseline {
            None => {
                debug!("disk I/O baseline primed");
                DiskIoStatus::default()
            }
            Some(prev) => {
                let elapsed = now.saturating_duration_since(prev.at).as_secs_f64();
                DiskIoStatus {
                    read_rate: derive_rate(prev.read_bytes, read_bytes, elapsed),
                    write_rate: derive_rate(prev.write_bytes, write_bytes, elapsed),
                }
            }
        };
        *baseline = Some(DiskBaseline {
            read_bytes,
            write_bytes,
            at: now,
        });
        Ok(status)
    }

    /// Runs one capability on its own task so a panic inside the backend
    /// surfaces as `CollectError::Fault` instead of tearing down the pass.
    async fn guarded<T, F, Fut>(&self, capability: &'static str, call: F) -> Result<T, CollectError>
    where
        F: FnOnce(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T, CollectError>> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(call(Arc::clone(&self.backend))).await {
            Ok(result) => result,
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "task cancelled".to_string()
                };
                warn!(capability, reason = %reason, "capability fault");
                Err(CollectError::Fault { capability, reason })
            }
        }
    }
}

/// MiB/s between two cumulative byte counters. Counter resets clamp to zero;
/// a non-positive elapsed time counts as one second.
pub fn derive_rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    let elapsed = if elapsed_secs > 0.0 { elapsed_secs } else { 1.0 };
    current.saturating_sub(previous) as f64 / BYTES_PER_MIB / elapsed
}

fn sum_counters(counters: &[DiskIoCounters]) -> (u64, u64) {
    counters.iter().fold((0, 0), |(r, w), c| {
        (r.saturating_add(c.read_bytes), w.saturating_add(c.write_bytes))
    })
}

fn settle<T: Default>(
    capability: &'static str,
    result: Result<T, CollectError>,
    errors: &mut BTreeMap<&'static str, String>,
) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            debug!(capability, error = %err, "capability unavailable");
            errors.insert(capability, err.to_string());
            T::default()
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
