//! Window history and logging helpers.
//!
//! Every completed window is condensed into a [`WindowRecord`], kept in a
//! fixed-capacity ring for inspection from a debugger, and mirrored to defmt
//! (or stdout on host builds) as one `telemetry:window` line.

use heapless::{HistoryBuf, OldestOrdered};
use node_core::{SampleStatus, WindowReport};

/// Number of windows retained in memory.
pub const WINDOW_HISTORY_CAPACITY: usize = 32;

pub type WindowRing = HistoryBuf<WindowRecord, WINDOW_HISTORY_CAPACITY>;

pub type WindowId = u32;

/// Condensed outcome of one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowRecord {
    pub id: WindowId,
    pub timestamp_ms: u64,
    pub status: SampleStatus,
    pub distance: u16,
    pub transmitted: bool,
    pub failed_writes: u16,
}

/// Records window outcomes and logs them as they arrive.
pub struct TelemetryRecorder {
    ring: WindowRing,
    next_id: WindowId,
    consecutive_invalid: u32,
}

impl TelemetryRecorder {
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_id: 0,
            consecutive_invalid: 0,
        }
    }

    pub fn oldest_first(&self) -> OldestOrdered<'_, WindowRecord> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&WindowRecord> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Windows in a row that ended without a valid sample.
    pub const fn consecutive_invalid(&self) -> u32 {
        self.consecutive_invalid
    }

    /// Condenses `report`, stores it, and emits a log line.
    pub fn record_window(&mut self, report: &WindowReport, timestamp_ms: u64) -> WindowId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let status = if report.valid_samples > 0 {
            SampleStatus::Valid
        } else {
            report.last_status
        };
        if status == SampleStatus::Valid {
            self.consecutive_invalid = 0;
        } else {
            self.consecutive_invalid = self.consecutive_invalid.saturating_add(1);
        }

        let record = WindowRecord {
            id,
            timestamp_ms,
            status,
            distance: report.distance,
            transmitted: report.transmitted(),
            failed_writes: report.transmit.map_or(0, |transmit| transmit.failed),
        };
        self.ring.write(record);

        emit_log(&record, self.consecutive_invalid);
        if let Some(fault) = report.power_fault {
            emit_power_fault(fault.rail);
        }
        id
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "none")]
fn emit_log(record: &WindowRecord, consecutive_invalid: u32) {
    if record.status == SampleStatus::Valid {
        defmt::info!(
            "telemetry:window #{} t={}ms distance={}cm sent={} failed={}",
            record.id,
            record.timestamp_ms,
            record.distance,
            record.transmitted,
            record.failed_writes
        );
    } else {
        defmt::warn!(
            "telemetry:window #{} t={}ms {} sentinel={}cm sent={} streak={}",
            record.id,
            record.timestamp_ms,
            record.status,
            record.distance,
            record.transmitted,
            consecutive_invalid
        );
    }
    if record.failed_writes > 0 {
        defmt::warn!(
            "telemetry:radio #{} {} writes failed",
            record.id,
            record.failed_writes
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(record: &WindowRecord, consecutive_invalid: u32) {
    if record.status == SampleStatus::Valid {
        println!(
            "telemetry:window #{} t={}ms distance={}cm sent={} failed={}",
            record.id,
            record.timestamp_ms,
            record.distance,
            record.transmitted,
            record.failed_writes
        );
    } else {
        println!(
            "telemetry:window #{} t={}ms {} sentinel={}cm sent={} streak={}",
            record.id,
            record.timestamp_ms,
            record.status,
            record.distance,
            record.transmitted,
            consecutive_invalid
        );
    }
    if record.failed_writes > 0 {
        println!(
            "telemetry:radio #{} {} writes failed",
            record.id, record.failed_writes
        );
    }
}

#[cfg(target_os = "none")]
fn emit_power_fault(rail: usize) {
    defmt::warn!("telemetry:power rail {} did not switch", rail);
}

#[cfg(not(target_os = "none"))]
fn emit_power_fault(rail: usize) {
    println!("telemetry:power rail {rail} did not switch");
}
