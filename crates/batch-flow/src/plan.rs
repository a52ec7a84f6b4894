//! Batch partitioning

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// One contiguous slice of the work list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// 1-based, counted over the whole sequence
    pub batch_number: usize,
    pub start_index: usize,
    pub size: usize,
    /// The slice starts from a saved cursor rather than the first item
    pub is_resume: bool,
}

impl BatchPlan {
    pub fn end_index(&self) -> usize {
        self.start_index + self.size
    }

    pub fn last_index(&self) -> usize {
        self.end_index() - 1
    }

    pub fn indices(&self) -> Range<usize> {
        self.start_index..self.end_index()
    }

    pub fn is_last_item(&self, index: usize) -> bool {
        index == self.last_index()
    }
}

/// Ordered batches covering `[first_index, total_items)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSchedule {
    pub total_items: usize,
    pub batch_size: usize,
    pub first_index: usize,
    pub total_batches: usize,
    pub batches: Vec<BatchPlan>,
}

impl BatchSchedule {
    pub fn remaining_items(&self) -> usize {
        self.total_items - self.first_index
    }
}

/// Partition `[first_index, total_items)` into batches of `batch_size`.
///
/// Batches after the first always resume from the previous batch's
/// checkpoint. The first one resumes only when `resuming` is set.
pub fn plan_batches(
    total_items: usize,
    batch_size: usize,
    first_index: usize,
    resuming: bool,
) -> Result<BatchSchedule, FlowError> {
    if batch_size == 0 {
        return Err(FlowError::InvalidPlan("batch size must be at least 1".into()));
    }
    if first_index >= total_items {
        return Err(FlowError::InvalidPlan(format!(
            "start index {} is outside a work list of {} items",
            first_index, total_items
        )));
    }

    let offset = first_index / batch_size;
    let batches: Vec<BatchPlan> = (first_index..total_items)
        .step_by(batch_size)
        .enumerate()
        .map(|(i, start)| BatchPlan {
            batch_number: offset + i + 1,
            start_index: start,
            size: batch_size.min(total_items - start),
            is_resume: i > 0 || resuming,
        })
        .collect();

    Ok(BatchSchedule {
        total_items,
        batch_size,
        first_index,
        total_batches: offset + batches.len(),
        batches,
    })
}
