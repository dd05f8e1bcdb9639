pub mod backend;
pub mod collector;
pub mod components;
pub mod disks;
pub mod error;
pub mod generic;
pub mod linux;
pub mod parse;
pub mod runner;
pub mod windows;

use crate::state::{
    BatteryStatus, DiskIoStatus, DiskStatus, MemoryDetails, SensorReading, ThermalStatus,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// One sampling pass. Every field is independently valid; `errors` names the
/// capabilities that failed and were left at their zero value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub timestamp_unix: i64,
    pub backend: &'static str,
    pub batteries: Vec<BatteryStatus>,
    pub thermal: ThermalStatus,
    pub sensors: Vec<SensorReading>,
    pub disks: Vec<DiskStatus>,
    pub disk_io: DiskIoStatus,
    pub memory: MemoryDetails,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<&'static str, String>,
}
