use crate::state::DiskStatus;
use std::collections::HashSet;
use sysinfo::{DiskExt, System, SystemExt};

pub const GIB: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLimits {
    pub max_disks: usize,
    pub min_total_bytes: u64,
}

impl Default for DiskLimits {
    fn default() -> Self {
        Self {
            max_disks: 3,
            min_total_bytes: GIB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub mount: String,
    pub device: String,
    pub fs_type: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub removable: bool,
}

pub fn list_partitions() -> Vec<Partition> {
    let mut system = System::new();
    system.refresh_disks_list();
    system.refresh_disks();

    system
        .disks()
        .iter()
        .map(|d| {
            let mount = d.mount_point().to_string_lossy().to_string();
            Partition {
                device: partition_device(
                    &d.name().to_string_lossy(),
                    &mount,
                    cfg!(target_os = "windows"),
                ),
                mount,
                fs_type: String::from_utf8_lossy(d.file_system()).to_string(),
                total_bytes: d.total_space(),
                available_bytes: d.available_space(),
                removable: d.is_removable(),
            }
        })
        .collect()
}

/// On Windows sysinfo reports the volume label as the disk name, so the drive
/// letter (`C:`) identifies the device instead. Elsewhere an empty name falls
/// back to the mount point.
fn partition_device(name: &str, mount: &str, windows: bool) -> String {
    if windows {
        if let Some(letter) = drive_letter(mount) {
            return letter;
        }
    }
    if name.trim().is_empty() {
        mount.to_string()
    } else {
        name.to_string()
    }
}

fn drive_letter(mount: &str) -> Option<String> {
    let prefix = mount.get(..2)?;
    let mut chars = prefix.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
            Some(prefix.to_ascii_uppercase())
        }
        _ => None,
    }
}

/// Drops network shares, empty and small volumes and repeated devices, then
/// keeps the largest `max_disks` by total size.
pub fn select_disks(partitions: Vec<Partition>, limits: DiskLimits) -> Vec<DiskStatus> {
    let mut seen_device = HashSet::new();
    let mut disks = Vec::new();

    for part in partitions {
        if part.device.starts_with("\\\\") || part.device.starts_with("//") {
            continue;
        }
        if seen_device.contains(&part.device) {
            continue;
        }
        if part.total_bytes == 0 || part.total_bytes < limits.min_total_bytes {
            continue;
        }

        let used = part.total_bytes.saturating_sub(part.available_bytes);
        disks.push(DiskStatus {
            used_bytes: used,
            total_bytes: part.total_bytes,
            used_percent: used as f64 / part.total_bytes as f64 * 100.0,
            fs_type: part.fs_type,
            external: part.removable,
            mount: part.mount,
            device: part.device.clone(),
        });
        seen_device.insert(part.device);
    }

    disks.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));
    disks.truncate(limits.max_disks);
    disks
}
