use crate::collectors::disks::DiskLimits;
use crate::collectors::error::CollectError;
use crate::collectors::generic::GenericBackend;
use crate::collectors::linux::LinuxBackend;
use crate::collectors::runner::ToolRunner;
use crate::collectors::windows::WindowsBackend;
use crate::config::{BackendKind, ToolTimeouts};
use crate::state::{
    BatteryStatus, DiskIoCounters, DiskStatus, MemoryDetails, SensorReading, ThermalStatus,
};
use async_trait::async_trait;
use std::sync::Arc;

/// The per-OS capability set.
///
/// Every method is independent: a platform without a capability returns an
/// empty or zero result (or `Unsupported`) instead of failing the others.
/// All byte values are in bytes and temperatures in Celsius.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `NoData` covers both "no battery" and "battery query returned nothing".
    async fn collect_batteries(&self) -> Result<Vec<BatteryStatus>, CollectError>;

    async fn collect_thermal(&self) -> ThermalStatus;

    async fn collect_sensors(&self) -> Result<Vec<SensorReading>, CollectError>;

    async fn collect_disks(&self) -> Result<Vec<DiskStatus>, CollectError>;

    /// Cumulative counters since boot; rates are derived by the collector.
    async fn collect_disk_io_raw(&self) -> Result<Vec<DiskIoCounters>, CollectError>;

    async fn collect_memory_details(&self) -> MemoryDetails;
}

pub fn select_backend(
    kind: BackendKind,
    runner: Arc<dyn ToolRunner>,
    timeouts: ToolTimeouts,
    limits: DiskLimits,
) -> Arc<dyn Backend> {
    match kind.resolve() {
        BackendKind::Windows => Arc::new(WindowsBackend::new(runner, timeouts, limits)),
        BackendKind::Linux => Arc::new(LinuxBackend::new("/", limits)),
        BackendKind::Generic | BackendKind::Auto => Arc::new(GenericBackend::new(limits)),
    }
}
