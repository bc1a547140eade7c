use serde::Serialize;

use crate::error::GribError;
use crate::registry::ModelDescriptor;

pub const SPARSE_STRIDE: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepPlan {
    steps: Vec<u32>,
}

impl StepPlan {
    // The dense phase stops short of `effective_max` below the breakpoint.
    pub fn with_cadence(effective_max: u32, breakpoint: u32) -> Self {
        let dense_end = effective_max.min(breakpoint);
        let mut steps: Vec<u32> = (0..dense_end).collect();
        if effective_max >= breakpoint {
            steps.extend((breakpoint..=effective_max).step_by(SPARSE_STRIDE));
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<u32> {
        self.steps.last().copied()
    }
}

pub fn plan(
    model: &ModelDescriptor,
    run_hour: u32,
    requested_max: i64,
) -> Result<StepPlan, GribError> {
    let cap = model
        .step_cap(run_hour)
        .ok_or_else(|| GribError::UnpublishedRunHour {
            model: model.name.to_string(),
            hour: run_hour,
        })?;
    if requested_max < 0 {
        return Ok(StepPlan::default());
    }
    let effective_max = u32::try_from(requested_max).unwrap_or(u32::MAX).min(cap);
    Ok(StepPlan::with_cadence(effective_max, model.breakpoint))
}
