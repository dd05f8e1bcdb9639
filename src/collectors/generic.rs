//! Fallback for platforms without a dedicated backend: only what `sysinfo`
//! exposes portably.

use crate::collectors::backend::Backend;
use crate::collectors::components;
use crate::collectors::disks::{self, DiskLimits};
use crate::collectors::error::CollectError;
use crate::state::{
    BatteryStatus, DiskIoCounters, DiskStatus, MemoryDetails, SensorReading, ThermalStatus,
};
use async_trait::async_trait;

pub struct GenericBackend {
    limits: DiskLimits,
}

impl GenericBackend {
    pub fn new(limits: DiskLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Backend for GenericBackend {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn collect_batteries(&self) -> Result<Vec<BatteryStatus>, CollectError> {
        Err(CollectError::NoData("battery"))
    }

    async fn collect_thermal(&self) -> ThermalStatus {
        components::cpu_temperature(&components::temperature_readings())
            .map(ThermalStatus::celsius)
            .unwrap_or_default()
    }

    async fn collect_sensors(&self) -> Result<Vec<SensorReading>, CollectError> {
        Ok(components::temperature_readings())
    }

    async fn collect_disks(&self) -> Result<Vec<DiskStatus>, CollectError> {
        Ok(disks::select_disks(disks::list_partitions(), self.limits))
    }

    async fn collect_disk_io_raw(&self) -> Result<Vec<DiskIoCounters>, CollectError> {
        Ok(Vec::new())
    }

    async fn collect_memory_details(&self) -> MemoryDetails {
        MemoryDetails::default()
    }
}
