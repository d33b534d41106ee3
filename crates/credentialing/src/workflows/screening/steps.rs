//! Step configuration and the linear progression over `configured_step_types`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{ScreeningProcess, ScreeningProcessStep, ScreeningStatus, StepStatus, StepType};
use super::service::ScreeningError;
use crate::ids::UserId;

/// Result of moving past the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    Next(StepType),
    Finished,
}

/// Validates the requested step list and instantiates the steps, the first one in progress.
///
/// `None` selects every step. Client validation is dropped when the organization disabled it.
pub(crate) fn configure_steps(
    requested: Option<&[StepType]>,
    optional: &[StepType],
    client_validation_enabled: bool,
    now: DateTime<Utc>,
) -> Result<(Vec<StepType>, Vec<ScreeningProcessStep>), ScreeningError> {
    let mut step_types: Vec<StepType> = requested
        .map(<[StepType]>::to_vec)
        .unwrap_or_else(|| StepType::ALL.to_vec());

    let mut seen = BTreeSet::new();
    for step_type in &step_types {
        if !seen.insert(*step_type) {
            return Err(ScreeningError::InvalidConfiguration(format!(
                "step {} is configured twice",
                step_type.label()
            )));
        }
    }
    if step_types.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(ScreeningError::InvalidConfiguration(
            "steps must follow the canonical order".to_string(),
        ));
    }
    if seen.contains(&StepType::DocumentReview) && !seen.contains(&StepType::DocumentUpload) {
        return Err(ScreeningError::InvalidConfiguration(
            "document_review requires document_upload".to_string(),
        ));
    }
    if optional.contains(&StepType::Conversation) {
        return Err(ScreeningError::InvalidConfiguration(
            "conversation cannot be optional".to_string(),
        ));
    }

    if !client_validation_enabled && seen.contains(&StepType::ClientValidation) {
        debug!("client validation disabled for organization; dropping step");
        step_types.retain(|step_type| *step_type != StepType::ClientValidation);
    }

    if step_types.is_empty() {
        return Err(ScreeningError::InvalidConfiguration(
            "at least one step must be configured".to_string(),
        ));
    }

    let steps = step_types
        .iter()
        .enumerate()
        .map(|(index, step_type)| {
            let mut step =
                ScreeningProcessStep::new(*step_type, index as u8 + 1, !optional.contains(step_type));
            if index == 0 {
                step.status = StepStatus::InProgress;
                step.started_at = Some(now);
            }
            step
        })
        .collect();

    Ok((step_types, steps))
}

impl ScreeningProcess {
    pub(crate) fn ensure_active(&self) -> Result<(), ScreeningError> {
        if self.is_terminal() {
            return Err(ScreeningError::Terminal {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Checks that `step_type` is the current, open step of an active process.
    pub(crate) fn ensure_current(&self, step_type: StepType) -> Result<(), ScreeningError> {
        self.ensure_active()?;
        if !self.configured_step_types.contains(&step_type) {
            return Err(ScreeningError::StepNotConfigured(step_type));
        }
        let open = self
            .step(step_type)
            .map(|step| step.status.is_open())
            .unwrap_or(false);
        if self.current_step_type != step_type || !open {
            return Err(ScreeningError::StepNotCurrent {
                expected: step_type,
                current: self.current_step_type,
            });
        }
        Ok(())
    }

    pub(crate) fn close_step(
        &mut self,
        step_type: StepType,
        status: StepStatus,
        actor: &UserId,
        now: DateTime<Utc>,
    ) {
        if let Some(step) = self.step_mut(step_type) {
            step.status = status;
            step.completed_at = Some(now);
            step.completed_by = Some(actor.clone());
        }
        self.updated_at = now;
    }

    /// Opens the configured step after the current one.
    pub(crate) fn advance(&mut self, now: DateTime<Utc>) -> Advance {
        let next = self
            .configured_step_types
            .iter()
            .skip_while(|step_type| **step_type != self.current_step_type)
            .nth(1)
            .copied();

        self.updated_at = now;
        let Some(next) = next else {
            return Advance::Finished;
        };

        if let Some(step) = self.step_mut(next) {
            step.status = StepStatus::InProgress;
            step.started_at.get_or_insert(now);
            step.completed_at = None;
            step.completed_by = None;
        }
        self.current_step_type = next;
        if self.status == ScreeningStatus::Draft {
            self.status = ScreeningStatus::InProgress;
        }
        Advance::Next(next)
    }

    /// Moves the process into a terminal status, closing whatever step is still open.
    pub(crate) fn terminate(
        &mut self,
        status: ScreeningStatus,
        step_status: StepStatus,
        now: DateTime<Utc>,
    ) {
        let current = self.current_step_type;
        for step in self.steps.iter_mut().filter(|step| step.status.is_open()) {
            step.status = if step.step_type == current {
                step_status
            } else {
                StepStatus::Skipped
            };
            step.completed_at = Some(now);
        }
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
