use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{
    DocumentId, OrganizationId, ProfessionalId, ScreeningProcessId, SpecialtyId, UserId, VersionId,
};
use crate::workflows::professionals::ProfessionalType;

/// Overall status of a screening process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Draft,
    InProgress,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

impl ScreeningStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ScreeningStatus::Draft => "draft",
            ScreeningStatus::InProgress => "in_progress",
            ScreeningStatus::Approved => "approved",
            ScreeningStatus::Rejected => "rejected",
            ScreeningStatus::Expired => "expired",
            ScreeningStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ScreeningStatus::Approved
                | ScreeningStatus::Rejected
                | ScreeningStatus::Expired
                | ScreeningStatus::Cancelled
        )
    }
}

/// Step kinds in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Conversation,
    ProfessionalData,
    DocumentUpload,
    DocumentReview,
    PaymentInfo,
    ClientValidation,
}

impl StepType {
    pub const ALL: [StepType; 6] = [
        StepType::Conversation,
        StepType::ProfessionalData,
        StepType::DocumentUpload,
        StepType::DocumentReview,
        StepType::PaymentInfo,
        StepType::ClientValidation,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            StepType::Conversation => "conversation",
            StepType::ProfessionalData => "professional_data",
            StepType::DocumentUpload => "document_upload",
            StepType::DocumentReview => "document_review",
            StepType::PaymentInfo => "payment_info",
            StepType::ClientValidation => "client_validation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Approved,
    Rejected,
    Skipped,
    CorrectionNeeded,
}

impl StepStatus {
    pub const fn label(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Approved => "approved",
            StepStatus::Rejected => "rejected",
            StepStatus::Skipped => "skipped",
            StepStatus::CorrectionNeeded => "correction_needed",
        }
    }

    /// Whether work can still be done on a step in this status.
    pub const fn is_open(self) -> bool {
        matches!(self, StepStatus::InProgress | StepStatus::CorrectionNeeded)
    }
}

/// Outcome recorded by steps that end in a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    PendingUpload,
    Uploaded,
    Approved,
    Rejected,
    CorrectionNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    Approved,
    Rejected,
    CorrectionRequested,
    Resubmitted,
}

/// Entry of a document's review history. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNote {
    pub user_id: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub action: NoteAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningProcessStep {
    pub step_type: StepType,
    pub order: u8,
    pub is_required: bool,
    pub status: StepStatus,
    pub data_references: Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<UserId>,
    pub conversation_notes: Option<String>,
    pub conversation_outcome: Option<StepOutcome>,
    pub review_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub client_validation_outcome: Option<StepOutcome>,
    pub client_validation_notes: Option<String>,
    pub validated_by: Option<UserId>,
}

impl ScreeningProcessStep {
    pub(crate) fn new(step_type: StepType, order: u8, is_required: bool) -> Self {
        Self {
            step_type,
            order,
            is_required,
            status: StepStatus::Pending,
            data_references: Value::Object(Default::default()),
            started_at: None,
            completed_at: None,
            completed_by: None,
            conversation_notes: None,
            conversation_outcome: None,
            review_notes: None,
            rejection_reason: None,
            client_validation_outcome: None,
            client_validation_notes: None,
            validated_by: None,
        }
    }
}

/// Document the professional must provide during the upload step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningRequiredDocument {
    pub id: DocumentId,
    pub document_type: String,
    pub is_required: bool,
    pub status: DocumentStatus,
    pub file_reference: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub review_notes: Vec<ReviewNote>,
}

/// One onboarding attempt of a professional within an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningProcess {
    pub id: ScreeningProcessId,
    pub organization_id: OrganizationId,
    pub professional_id: Option<ProfessionalId>,
    pub professional_cpf: String,
    pub professional_name: String,
    pub professional_email: Option<String>,
    pub status: ScreeningStatus,
    pub current_step_type: StepType,
    pub configured_step_types: Vec<StepType>,
    pub owner_id: UserId,
    pub current_actor_id: Option<UserId>,
    pub supervisor_id: Option<UserId>,
    pub expected_professional_type: Option<ProfessionalType>,
    pub expected_specialty_id: Option<SpecialtyId>,
    /// Only serialized through [`IssuedScreening`].
    #[serde(default, skip_serializing)]
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub pending_version_id: Option<VersionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<ScreeningProcessStep>,
    pub required_documents: Vec<ScreeningRequiredDocument>,
}

impl ScreeningProcess {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, step_type: StepType) -> Option<&ScreeningProcessStep> {
        self.steps.iter().find(|step| step.step_type == step_type)
    }

    pub(crate) fn step_mut(&mut self, step_type: StepType) -> Option<&mut ScreeningProcessStep> {
        self.steps.iter_mut().find(|step| step.step_type == step_type)
    }

    pub fn current_step(&self) -> Option<&ScreeningProcessStep> {
        self.step(self.current_step_type)
    }

    pub fn document(&self, id: &DocumentId) -> Option<&ScreeningRequiredDocument> {
        self.required_documents.iter().find(|doc| &doc.id == id)
    }

    pub(crate) fn document_mut(&mut self, id: &DocumentId) -> Option<&mut ScreeningRequiredDocument> {
        self.required_documents.iter_mut().find(|doc| &doc.id == id)
    }

    /// Staff representation that also carries the access token, returned when a token is issued.
    pub fn into_issued(self) -> IssuedScreening {
        let access_token = self.access_token.clone();
        IssuedScreening {
            process: self,
            access_token,
        }
    }

    /// View handed to the professional through the access token.
    pub fn access_view(&self) -> ScreeningAccessView {
        ScreeningAccessView {
            process_id: self.id,
            professional_name: self.professional_name.clone(),
            status: self.status.label(),
            current_step_type: self.current_step_type.label(),
            access_token_expires_at: self.access_token_expires_at,
            required_documents: self
                .required_documents
                .iter()
                .map(|doc| DocumentView {
                    id: doc.id,
                    document_type: doc.document_type.clone(),
                    is_required: doc.is_required,
                    status: doc.status,
                    latest_note: doc.review_notes.last().map(|note| note.text.clone()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedScreening {
    #[serde(flatten)]
    pub process: ScreeningProcess,
    pub access_token: String,
}

/// Sanitized representation of a process for token-authenticated professionals.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningAccessView {
    pub process_id: ScreeningProcessId,
    pub professional_name: String,
    pub status: &'static str,
    pub current_step_type: &'static str,
    pub access_token_expires_at: DateTime<Utc>,
    pub required_documents: Vec<DocumentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub document_type: String,
    pub is_required: bool,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_note: Option<String>,
}
