use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{ScreeningProcess, ScreeningStatus};
use crate::ids::{OrganizationId, ScreeningProcessId};
use crate::storage::RepositoryError;

/// Storage abstraction for screening processes. Steps and documents are stored with their process.
pub trait ScreeningRepository: Send + Sync {
    fn insert(&self, process: ScreeningProcess) -> Result<ScreeningProcess, RepositoryError>;
    fn update(&self, process: ScreeningProcess) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ScreeningProcessId) -> Result<Option<ScreeningProcess>, RepositoryError>;
    fn find_by_token(&self, token: &str) -> Result<Option<ScreeningProcess>, RepositoryError>;
    /// Processes of an organization, oldest first.
    fn list(
        &self,
        organization_id: &OrganizationId,
        status: Option<ScreeningStatus>,
    ) -> Result<Vec<ScreeningProcess>, RepositoryError>;
    /// The non-terminal process for this CPF within the organization, if any.
    fn active_for_cpf(
        &self,
        organization_id: &OrganizationId,
        cpf: &str,
    ) -> Result<Option<ScreeningProcess>, RepositoryError>;
    fn non_terminal(&self) -> Result<Vec<ScreeningProcess>, RepositoryError>;
}

/// Outbound message channel (email, chat) for professionals and staff.
pub trait ScreeningNotifier: Send + Sync {
    fn publish(&self, notification: ScreeningNotification) -> Result<(), NotificationError>;
}

pub const TEMPLATE_INVITATION: &str = "screening_invitation";
pub const TEMPLATE_CORRECTION_NEEDED: &str = "documents_correction_needed";
pub const TEMPLATE_APPROVED: &str = "screening_approved";
pub const TEMPLATE_REJECTED: &str = "screening_rejected";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningNotification {
    pub template: String,
    pub process_id: ScreeningProcessId,
    pub recipient: Option<String>,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
