/*
[INPUT]:  Registry snapshot (ordered task records)
[OUTPUT]: Global completion percentage and pending flag
[POS]:    Read model - aggregate progress, recomputed on every query
[UPDATE]: When the weighting of tasks in the aggregate changes
*/

use serde::Serialize;

use crate::record::{TaskRecord, TaskStatus};

/// Aggregate progress over every tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub has_pending: bool,
    /// Whole percent in `0..=100`
    pub percentage: u8,
}

/// Derive the global progress from a snapshot.
///
/// A task contributes its processed size (or original size while still
/// pre-processing) to the total, and its transferred bytes to the done count
/// only once its processed size is known. With nothing pending the result is
/// 100, including the empty registry.
pub fn aggregate(records: &[TaskRecord]) -> ProgressSummary {
    let has_pending = records
        .iter()
        .any(|record| record.status == TaskStatus::InProgress);

    if !has_pending {
        return ProgressSummary {
            has_pending,
            percentage: 100,
        };
    }

    let (done, total) = records.iter().fold((0u128, 0u128), |(done, total), record| {
        let (numerator, denominator) = match record.processed_size {
            Some(size) => (record.transferred_bytes, size),
            None => (0, record.original_size),
        };
        (done + u128::from(numerator), total + u128::from(denominator))
    });

    ProgressSummary {
        has_pending,
        percentage: rounded_percent(done, total),
    }
}

/// `round(100 * done / total)` with halves rounded up, clamped to 100.
fn rounded_percent(done: u128, total: u128) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (done * 200 + total) / (total * 2);
    percent.min(100) as u8
}
