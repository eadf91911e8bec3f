//! Validation of I/O throttling and capacity parameters

use crate::error::{EngineError, Result};
use vdcflow_cloud::{CapacityLimits, IoTune, UNLIMITED};

/// A total limit and the per-direction limits it excludes
struct ExclusivePair {
    total: &'static str,
    read: &'static str,
    write: &'static str,
    get: fn(&IoTune) -> Triple,
}

type Triple = (Option<u64>, Option<u64>, Option<u64>);

fn iops(t: &IoTune) -> Triple {
    (t.total_iops_sec, t.read_iops_sec, t.write_iops_sec)
}

fn bytes(t: &IoTune) -> Triple {
    (t.total_bytes_sec, t.read_bytes_sec, t.write_bytes_sec)
}

fn bytes_max(t: &IoTune) -> Triple {
    (
        t.total_bytes_sec_max,
        t.read_bytes_sec_max,
        t.write_bytes_sec_max,
    )
}

fn iops_max(t: &IoTune) -> Triple {
    (
        t.total_iops_sec_max,
        t.read_iops_sec_max,
        t.write_iops_sec_max,
    )
}

const EXCLUSIVE_PAIRS: [ExclusivePair; 4] = [
    ExclusivePair {
        total: "totalIopsSec",
        read: "readIopsSec",
        write: "writeIopsSec",
        get: iops,
    },
    ExclusivePair {
        total: "totalBytesSec",
        read: "readBytesSec",
        write: "writeBytesSec",
        get: bytes,
    },
    ExclusivePair {
        total: "totalBytesSecMax",
        read: "readBytesSecMax",
        write: "writeBytesSecMax",
        get: bytes_max,
    },
    ExclusivePair {
        total: "totalIopsSecMax",
        read: "readIopsSecMax",
        write: "writeIopsSecMax",
        get: iops_max,
    },
];

/// A total limit cannot be combined with its read/write limits
pub fn validate_io_tune(tune: &IoTune) -> Result<()> {
    for pair in &EXCLUSIVE_PAIRS {
        let (total, read, write) = (pair.get)(tune);
        if total.is_some() && (read.is_some() || write.is_some()) {
            return Err(EngineError::validation(
                format!("{}/{}", pair.total, pair.read),
                format!(
                    "{} cannot be set together with {} or {}",
                    pair.total, pair.read, pair.write
                ),
            ));
        }
    }
    Ok(())
}

/// A capacity ceiling is -1 (unlimited) or a non-negative amount
pub fn validate_capacity_value(field: &str, value: f64) -> Result<()> {
    if value.is_nan() || value < UNLIMITED as f64 {
        return Err(EngineError::validation(
            field,
            format!("{} is below -1, use -1 for unlimited", value),
        ));
    }
    Ok(())
}

pub fn validate_capacity(limits: &CapacityLimits) -> Result<()> {
    validate_capacity_value("maxMemoryCapacity", limits.max_memory_capacity)?;
    validate_capacity_value("maxCPUCapacity", limits.max_cpu_capacity as f64)?;
    validate_capacity_value("maxVDiskCapacity", limits.max_vdisk_capacity as f64)?;
    validate_capacity_value("maxNumPublicIP", limits.max_num_public_ip as f64)?;
    Ok(())
}

/// Partial change of capacity ceilings; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Deserialize)]
pub struct CapacityChanges {
    #[serde(rename = "maxMemoryCapacity")]
    pub max_memory_capacity: Option<f64>,
    #[serde(rename = "maxCPUCapacity")]
    pub max_cpu_capacity: Option<i64>,
    #[serde(rename = "maxVDiskCapacity")]
    pub max_vdisk_capacity: Option<i64>,
    #[serde(rename = "maxNumPublicIP")]
    pub max_num_public_ip: Option<i64>,
}

impl CapacityChanges {
    /// `current` with the non-null changes applied
    pub fn merged(&self, current: &CapacityLimits) -> CapacityLimits {
        CapacityLimits {
            max_memory_capacity: self
                .max_memory_capacity
                .unwrap_or(current.max_memory_capacity),
            max_cpu_capacity: self.max_cpu_capacity.unwrap_or(current.max_cpu_capacity),
            max_vdisk_capacity: self.max_vdisk_capacity.unwrap_or(current.max_vdisk_capacity),
            max_num_public_ip: self.max_num_public_ip.unwrap_or(current.max_num_public_ip),
        }
    }
}

/// `current` with every limit set in `changes` overridden
pub fn merge_io_tune(current: &IoTune, changes: &IoTune) -> IoTune {
    IoTune {
        total_bytes_sec: changes.total_bytes_sec.or(current.total_bytes_sec),
        read_bytes_sec: changes.read_bytes_sec.or(current.read_bytes_sec),
        write_bytes_sec: changes.write_bytes_sec.or(current.write_bytes_sec),
        total_iops_sec: changes.total_iops_sec.or(current.total_iops_sec),
        read_iops_sec: changes.read_iops_sec.or(current.read_iops_sec),
        write_iops_sec: changes.write_iops_sec.or(current.write_iops_sec),
        total_bytes_sec_max: changes.total_bytes_sec_max.or(current.total_bytes_sec_max),
        read_bytes_sec_max: changes.read_bytes_sec_max.or(current.read_bytes_sec_max),
        write_bytes_sec_max: changes.write_bytes_sec_max.or(current.write_bytes_sec_max),
        total_iops_sec_max: changes.total_iops_sec_max.or(current.total_iops_sec_max),
        read_iops_sec_max: changes.read_iops_sec_max.or(current.read_iops_sec_max),
        write_iops_sec_max: changes.write_iops_sec_max.or(current.write_iops_sec_max),
    }
}
