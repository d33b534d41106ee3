use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    DocumentStatus, NoteAction, ReviewNote, ScreeningProcess, ScreeningRequiredDocument,
    ScreeningStatus, StepOutcome, StepStatus, StepType,
};
use super::repository::{
    ScreeningNotification, ScreeningNotifier, ScreeningRepository,
    TEMPLATE_APPROVED, TEMPLATE_CORRECTION_NEEDED, TEMPLATE_INVITATION, TEMPLATE_REJECTED,
};
use super::steps::{configure_steps, Advance};
use crate::config::ScreeningConfig;
use crate::ids::{
    DocumentId, OrganizationId, ProfessionalId, ScreeningProcessId, SpecialtyId, UserId, VersionId,
};
use crate::storage::{RepositoryError, WriteGate};
use crate::tenancy::{Organization, OrganizationDirectory};
use crate::validation::{normalize_cnpj, normalize_cpf, normalize_email, require_text, ValidationError};
use crate::workflows::professionals::{
    BankAccountSnapshot, CompanySnapshot, NewProfessional, NewVersion, ProfessionalError,
    ProfessionalRepository, ProfessionalService, ProfessionalSnapshot, ProfessionalType,
    VersionSourceType, VersionStatus,
};

/// Payload opening a screening process.
#[derive(Debug, Clone, Deserialize)]
pub struct NewScreeningProcess {
    pub organization_id: OrganizationId,
    pub professional_name: String,
    pub professional_cpf: String,
    #[serde(default)]
    pub professional_email: Option<String>,
    #[serde(default)]
    pub professional_phone: Option<String>,
    /// Steps to run, in canonical order. Omitted means every step.
    #[serde(default)]
    pub step_types: Option<Vec<StepType>>,
    #[serde(default)]
    pub optional_steps: Vec<StepType>,
    #[serde(default)]
    pub expected_professional_type: Option<ProfessionalType>,
    #[serde(default)]
    pub expected_specialty_id: Option<SpecialtyId>,
    #[serde(default)]
    pub supervisor_id: Option<UserId>,
    #[serde(default)]
    pub required_documents: Vec<DocumentRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRequirement {
    pub document_type: String,
    #[serde(default = "default_required")]
    pub is_required: bool,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInfo {
    pub bank_accounts: Vec<BankAccountSnapshot>,
    #[serde(default)]
    pub companies: Vec<CompanySnapshot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub current_actor_id: Option<UserId>,
    #[serde(default)]
    pub supervisor_id: Option<UserId>,
}

/// Drives screening processes through their configured steps.
pub struct ScreeningService<S, R, O, N> {
    repository: Arc<S>,
    professionals: Arc<ProfessionalService<R, O>>,
    notifier: Arc<N>,
    config: ScreeningConfig,
    writes: WriteGate,
}

fn new_access_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
}

impl<S, R, O, N> ScreeningService<S, R, O, N>
where
    S: ScreeningRepository + 'static,
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
    N: ScreeningNotifier + 'static,
{
    pub fn new(
        repository: Arc<S>,
        professionals: Arc<ProfessionalService<R, O>>,
        notifier: Arc<N>,
        config: ScreeningConfig,
    ) -> Self {
        Self {
            repository,
            professionals,
            notifier,
            config,
            writes: WriteGate::default(),
        }
    }

    pub fn professionals(&self) -> &Arc<ProfessionalService<R, O>> {
        &self.professionals
    }

    /// Open a process: link or register the professional, instantiate the steps, issue a token.
    pub fn create(
        &self,
        request: NewScreeningProcess,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let organization = self.professionals.organization(&request.organization_id)?;
        let cpf = normalize_cpf(&request.professional_cpf)?;
        let name = require_text("professional_name", &request.professional_name)?;
        let email = clean_note(request.professional_email.clone())
            .map(|email| normalize_email(&email))
            .transpose()?;

        if let Some(specialty_id) = request.expected_specialty_id {
            if !self.professionals.catalog().contains(&specialty_id) {
                return Err(ProfessionalError::UnknownSpecialty(specialty_id).into());
            }
        }
        let _writes = self.writes.enter()?;
        if let Some(existing) = self.repository.active_for_cpf(&organization.id, &cpf)? {
            return Err(ScreeningError::ActiveProcessExists {
                existing: existing.id,
            });
        }

        let now = Utc::now();
        let (configured_step_types, steps) = configure_steps(
            request.step_types.as_deref(),
            &request.optional_steps,
            organization.settings.client_validation_enabled,
            now,
        )?;
        let first_step = steps
            .first()
            .map(|step| step.step_type)
            .ok_or_else(|| {
                ScreeningError::InvalidConfiguration("no steps configured".to_string())
            })?;
        let required_documents = build_documents(&request.required_documents)?;

        let professional = self.professionals.find_or_register(
            NewProfessional {
                organization_id: organization.id,
                full_name: name.clone(),
                cpf: cpf.clone(),
                email: email.clone(),
                phone: request.professional_phone.clone(),
                birth_date: None,
            },
            actor,
        )?;

        let process = ScreeningProcess {
            id: ScreeningProcessId::new(),
            organization_id: organization.id,
            professional_id: Some(professional.id()),
            professional_cpf: cpf.clone(),
            professional_name: name,
            professional_email: email.or_else(|| professional.professional.email.clone()),
            status: ScreeningStatus::Draft,
            current_step_type: first_step,
            configured_step_types,
            owner_id: actor.clone(),
            current_actor_id: Some(actor.clone()),
            supervisor_id: request.supervisor_id,
            expected_professional_type: request.expected_professional_type,
            expected_specialty_id: request.expected_specialty_id,
            access_token: new_access_token(),
            access_token_expires_at: now + self.token_ttl(&organization),
            rejection_reason: None,
            cancellation_reason: None,
            pending_version_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            steps,
            required_documents,
        };

        let process = match self.repository.insert(process) {
            Ok(process) => process,
            Err(RepositoryError::Conflict) => {
                let existing = self
                    .repository
                    .active_for_cpf(&organization.id, &cpf)?
                    .ok_or(RepositoryError::Conflict)?;
                return Err(ScreeningError::ActiveProcessExists {
                    existing: existing.id,
                });
            }
            Err(error) => return Err(error.into()),
        };
        info!(
            process_id = %process.id,
            organization_id = %process.organization_id,
            steps = process.configured_step_types.len(),
            "screening process created"
        );

        let mut details = BTreeMap::new();
        details.insert("access_token".to_string(), process.access_token.clone());
        details.insert(
            "expires_at".to_string(),
            process.access_token_expires_at.to_rfc3339(),
        );
        details.insert("organization".to_string(), organization.name.clone());
        self.notify(&process, TEMPLATE_INVITATION, details);

        Ok(process)
    }

    pub fn get(&self, id: &ScreeningProcessId) -> Result<ScreeningProcess, ScreeningError> {
        self.repository.fetch(id)?.ok_or(ScreeningError::NotFound)
    }

    pub fn list(
        &self,
        organization_id: &OrganizationId,
        status: Option<ScreeningStatus>,
    ) -> Result<Vec<ScreeningProcess>, ScreeningError> {
        Ok(self.repository.list(organization_id, status)?)
    }

    pub fn complete_conversation(
        &self,
        id: &ScreeningProcessId,
        outcome: StepOutcome,
        notes: Option<String>,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_current(StepType::Conversation)?;
        let now = Utc::now();
        let notes = clean_note(notes);

        if let Some(step) = process.step_mut(StepType::Conversation) {
            step.conversation_outcome = Some(outcome);
            step.conversation_notes = notes.clone();
        }

        match outcome {
            StepOutcome::Approve => {
                process.close_step(StepType::Conversation, StepStatus::Approved, actor, now);
                self.advance_and_store(process, actor, now)
            }
            StepOutcome::Reject => {
                let reason = notes.unwrap_or_else(|| "rejected during conversation".to_string());
                if let Some(step) = process.step_mut(StepType::Conversation) {
                    step.rejection_reason = Some(reason.clone());
                }
                process.close_step(StepType::Conversation, StepStatus::Rejected, actor, now);
                self.finish_rejected(process, reason, actor, now)
            }
        }
    }

    /// Record the professional's data as a pending screening version.
    pub fn complete_professional_data(
        &self,
        id: &ScreeningProcessId,
        snapshot: ProfessionalSnapshot,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_current(StepType::ProfessionalData)?;

        let cpf = normalize_cpf(&snapshot.personal_info.cpf)?;
        if cpf != process.professional_cpf {
            return Err(ScreeningError::InvalidStepData(
                "personal info CPF does not match the screened professional".to_string(),
            ));
        }
        if snapshot.qualifications.is_empty() {
            return Err(ScreeningError::InvalidStepData(
                "at least one qualification is required".to_string(),
            ));
        }
        if let Some(expected) = process.expected_professional_type {
            if !snapshot
                .qualifications
                .iter()
                .any(|qualification| qualification.professional_type == expected)
            {
                return Err(ScreeningError::InvalidStepData(format!(
                    "a {expected} qualification is required"
                )));
            }
        }
        if let Some(expected) = process.expected_specialty_id {
            let present = snapshot
                .qualifications
                .iter()
                .flat_map(|qualification| qualification.specialties.iter())
                .any(|specialty| specialty.specialty_id == expected);
            if !present {
                return Err(ScreeningError::InvalidStepData(format!(
                    "specialty {expected} is required"
                )));
            }
        }
        for specialty in snapshot
            .qualifications
            .iter()
            .flat_map(|qualification| qualification.specialties.iter())
        {
            if !self.professionals.catalog().contains(&specialty.specialty_id) {
                return Err(ProfessionalError::UnknownSpecialty(specialty.specialty_id).into());
            }
        }

        let professional_id = linked_professional(&process)?;
        let version_id = self.record_version(&mut process, professional_id, snapshot, actor)?;

        let now = Utc::now();
        if let Some(step) = process.step_mut(StepType::ProfessionalData) {
            step.data_references = json!({ "version_id": version_id });
        }
        process.close_step(StepType::ProfessionalData, StepStatus::Completed, actor, now);
        self.advance_and_store(process, actor, now)
    }

    /// Add document types the professional must upload. Existing types only update `is_required`.
    pub fn select_required_documents(
        &self,
        id: &ScreeningProcessId,
        requirements: Vec<DocumentRequirement>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_active()?;
        if !process
            .configured_step_types
            .contains(&StepType::DocumentUpload)
        {
            return Err(ScreeningError::StepNotConfigured(StepType::DocumentUpload));
        }
        let upload_open = process
            .step(StepType::DocumentUpload)
            .map(|step| step.status == StepStatus::Pending || step.status.is_open())
            .unwrap_or(false);
        if !upload_open {
            return Err(ScreeningError::StepNotCurrent {
                expected: StepType::DocumentUpload,
                current: process.current_step_type,
            });
        }
        if requirements.is_empty() {
            return Err(ScreeningError::InvalidStepData(
                "no document types given".to_string(),
            ));
        }

        for document in build_documents(&requirements)? {
            let existing = process
                .required_documents
                .iter()
                .position(|existing| existing.document_type == document.document_type);
            match existing {
                Some(index) => process.required_documents[index].is_required = document.is_required,
                None => process.required_documents.push(document),
            }
        }

        process.updated_at = Utc::now();
        self.repository.update(process.clone())?;
        Ok(process)
    }

    pub fn upload_document(
        &self,
        id: &ScreeningProcessId,
        document_id: &DocumentId,
        file_reference: &str,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        upload_into(&mut process, document_id, file_reference, actor, Utc::now())?;
        self.repository.update(process.clone())?;
        Ok(process)
    }

    /// Upload performed by the professional through the access token.
    pub fn upload_with_token(
        &self,
        token: &str,
        document_id: &DocumentId,
        file_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.authenticate_locked(token, now)?;
        let actor = UserId::new(format!("professional:{}", process.professional_cpf));
        upload_into(&mut process, document_id, file_reference, &actor, now)?;
        self.repository.update(process.clone())?;
        Ok(process)
    }

    pub fn complete_document_upload(
        &self,
        id: &ScreeningProcessId,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_current(StepType::DocumentUpload)?;

        if process.required_documents.is_empty() {
            return Err(ScreeningError::IncompleteStep(
                "no documents have been selected".to_string(),
            ));
        }
        let missing: Vec<&str> = process
            .required_documents
            .iter()
            .filter(|document| {
                document.is_required
                    && !matches!(
                        document.status,
                        DocumentStatus::Uploaded | DocumentStatus::Approved
                    )
            })
            .map(|document| document.document_type.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ScreeningError::IncompleteStep(format!(
                "documents not uploaded: {}",
                missing.join(", ")
            )));
        }

        let now = Utc::now();
        process.close_step(StepType::DocumentUpload, StepStatus::Completed, actor, now);
        self.advance_and_store(process, actor, now)
    }

    pub fn review_document(
        &self,
        id: &ScreeningProcessId,
        document_id: &DocumentId,
        decision: StepOutcome,
        note: Option<String>,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_current(StepType::DocumentReview)?;
        let note = clean_note(note);
        if decision == StepOutcome::Reject && note.is_none() {
            return Err(ScreeningError::InvalidStepData(
                "rejecting a document requires a note".to_string(),
            ));
        }

        let now = Utc::now();
        let document = process
            .document_mut(document_id)
            .ok_or(ScreeningError::DocumentNotFound(*document_id))?;
        if !matches!(
            document.status,
            DocumentStatus::Uploaded | DocumentStatus::Approved | DocumentStatus::Rejected
        ) {
            return Err(ScreeningError::InvalidStepData(format!(
                "document {} has not been uploaded",
                document.document_type
            )));
        }

        let (status, action, default_text) = match decision {
            StepOutcome::Approve => (DocumentStatus::Approved, NoteAction::Approved, "approved"),
            StepOutcome::Reject => (DocumentStatus::Rejected, NoteAction::Rejected, "rejected"),
        };
        document.status = status;
        document.review_notes.push(ReviewNote {
            user_id: actor.clone(),
            text: note.unwrap_or_else(|| default_text.to_string()),
            timestamp: now,
            action,
        });

        process.updated_at = now;
        self.repository.update(process.clone())?;
        Ok(process)
    }

    /// Close the review. Any rejected document sends the process back to the upload step and
    /// the call fails with [`ScreeningError::DocumentsRejected`] after persisting that state.
    pub fn complete_document_review(
        &self,
        id: &ScreeningProcessId,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_current(StepType::DocumentReview)?;

        let unreviewed: Vec<&str> = process
            .required_documents
            .iter()
            .filter(|document| document.status == DocumentStatus::Uploaded)
            .map(|document| document.document_type.as_str())
            .collect();
        if !unreviewed.is_empty() {
            return Err(ScreeningError::IncompleteStep(format!(
                "documents awaiting review: {}",
                unreviewed.join(", ")
            )));
        }

        let now = Utc::now();
        let rejected: Vec<DocumentId> = process
            .required_documents
            .iter()
            .filter(|document| document.status == DocumentStatus::Rejected)
            .map(|document| document.id)
            .collect();

        if rejected.is_empty() {
            process.close_step(StepType::DocumentReview, StepStatus::Approved, actor, now);
            return self.advance_and_store(process, actor, now);
        }

        let mut rejected_types = Vec::with_capacity(rejected.len());
        for document in process
            .required_documents
            .iter_mut()
            .filter(|document| document.status == DocumentStatus::Rejected)
        {
            document.status = DocumentStatus::CorrectionNeeded;
            document.review_notes.push(ReviewNote {
                user_id: actor.clone(),
                text: "correction requested".to_string(),
                timestamp: now,
                action: NoteAction::CorrectionRequested,
            });
            rejected_types.push(document.document_type.clone());
        }
        if let Some(step) = process.step_mut(StepType::DocumentReview) {
            step.status = StepStatus::CorrectionNeeded;
            step.review_notes = Some(format!("{} document(s) rejected", rejected.len()));
            step.completed_by = Some(actor.clone());
        }
        if let Some(step) = process.step_mut(StepType::DocumentUpload) {
            step.status = StepStatus::CorrectionNeeded;
            step.completed_at = None;
            step.completed_by = None;
        }
        process.current_step_type = StepType::DocumentUpload;
        process.updated_at = now;

        self.repository.update(process.clone())?;
        warn!(
            process_id = %process.id,
            rejected = rejected.len(),
            "documents rejected; correction requested"
        );

        let mut details = BTreeMap::new();
        details.insert("documents".to_string(), rejected_types.join(", "));
        details.insert("access_token".to_string(), process.access_token.clone());
        self.notify(&process, TEMPLATE_CORRECTION_NEEDED, details);

        Err(ScreeningError::DocumentsRejected { rejected })
    }

    /// Record bank accounts and companies on a new screening version, superseding the pending one.
    pub fn complete_payment_info(
        &self,
        id: &ScreeningProcessId,
        payment: PaymentInfo,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_current(StepType::PaymentInfo)?;

        let PaymentInfo {
            mut bank_accounts,
            companies,
        } = payment;
        if bank_accounts.is_empty() {
            return Err(ScreeningError::InvalidStepData(
                "at least one bank account is required".to_string(),
            ));
        }
        if let [only] = bank_accounts.as_mut_slice() {
            only.is_primary = true;
        } else if bank_accounts.iter().filter(|account| account.is_primary).count() != 1 {
            return Err(ScreeningError::InvalidStepData(
                "exactly one bank account must be primary".to_string(),
            ));
        }
        for company in &companies {
            normalize_cnpj(&company.cnpj)?;
        }

        let professional_id = linked_professional(&process)?;
        let mut snapshot = self.base_snapshot(&process, &professional_id)?;
        snapshot.bank_accounts = bank_accounts;
        snapshot.companies = companies;

        let version_id = self.record_version(&mut process, professional_id, snapshot, actor)?;

        let now = Utc::now();
        if let Some(step) = process.step_mut(StepType::PaymentInfo) {
            step.data_references = json!({ "version_id": version_id });
        }
        process.close_step(StepType::PaymentInfo, StepStatus::Completed, actor, now);
        self.advance_and_store(process, actor, now)
    }

    pub fn complete_client_validation(
        &self,
        id: &ScreeningProcessId,
        outcome: StepOutcome,
        notes: Option<String>,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_current(StepType::ClientValidation)?;
        let now = Utc::now();
        let notes = clean_note(notes);

        if let Some(step) = process.step_mut(StepType::ClientValidation) {
            step.client_validation_outcome = Some(outcome);
            step.client_validation_notes = notes.clone();
            step.validated_by = Some(actor.clone());
        }

        match outcome {
            StepOutcome::Approve => {
                process.close_step(StepType::ClientValidation, StepStatus::Approved, actor, now);
                self.advance_and_store(process, actor, now)
            }
            StepOutcome::Reject => {
                let reason = notes.unwrap_or_else(|| "rejected by client".to_string());
                if let Some(step) = process.step_mut(StepType::ClientValidation) {
                    step.rejection_reason = Some(reason.clone());
                }
                process.close_step(StepType::ClientValidation, StepStatus::Rejected, actor, now);
                self.finish_rejected(process, reason, actor, now)
            }
        }
    }

    /// Skip the current step when it is not required.
    pub fn skip_step(
        &self,
        id: &ScreeningProcessId,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        let current = process.current_step_type;
        process.ensure_current(current)?;
        if process.current_step().map(|step| step.is_required).unwrap_or(true) {
            return Err(ScreeningError::StepRequired(current));
        }

        let now = Utc::now();
        process.close_step(current, StepStatus::Skipped, actor, now);
        self.advance_and_store(process, actor, now)
    }

    pub fn reject(
        &self,
        id: &ScreeningProcessId,
        reason: &str,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_active()?;
        let reason = require_text("reason", reason)?;
        let current = process.current_step_type;
        if let Some(step) = process.step_mut(current) {
            step.rejection_reason = Some(reason.clone());
            step.completed_by = Some(actor.clone());
        }
        self.finish_rejected(process, reason, actor, Utc::now())
    }

    pub fn cancel(
        &self,
        id: &ScreeningProcessId,
        reason: &str,
        actor: &UserId,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_active()?;
        let reason = require_text("reason", reason)?;

        self.discard_pending_version(&mut process, "screening cancelled", actor)?;
        process.terminate(ScreeningStatus::Cancelled, StepStatus::Skipped, Utc::now());
        process.cancellation_reason = Some(reason);
        self.repository.update(process.clone())?;

        info!(process_id = %process.id, cancelled_by = %actor, "screening process cancelled");
        Ok(process)
    }

    /// Resolve an access token. A stale token on an active process expires the process.
    pub fn authenticate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        self.authenticate_locked(token, now)
    }

    /// Expire every active process whose token is past its deadline.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<ScreeningProcessId>, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut expired = Vec::new();
        for mut process in self.repository.non_terminal()? {
            if process.access_token_expires_at <= now {
                self.expire(&mut process, now)?;
                expired.push(process.id);
            }
        }
        Ok(expired)
    }

    fn authenticate_locked(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let mut process = self
            .repository
            .find_by_token(token.trim())?
            .ok_or(ScreeningError::InvalidToken)?;

        match process.status {
            ScreeningStatus::Expired => return Err(ScreeningError::TokenExpired),
            status if status.is_terminal() => return Err(ScreeningError::InvalidToken),
            _ => {}
        }

        if process.access_token_expires_at <= now {
            self.expire(&mut process, now)?;
            return Err(ScreeningError::TokenExpired);
        }
        Ok(process)
    }

    /// Issue a fresh token and send a new invitation.
    pub fn renew_access_token(
        &self,
        id: &ScreeningProcessId,
        now: DateTime<Utc>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_active()?;
        let organization = self.professionals.organization(&process.organization_id)?;

        process.access_token = new_access_token();
        process.access_token_expires_at = now + self.token_ttl(&organization);
        process.updated_at = now;
        self.repository.update(process.clone())?;

        let mut details = BTreeMap::new();
        details.insert("access_token".to_string(), process.access_token.clone());
        details.insert(
            "expires_at".to_string(),
            process.access_token_expires_at.to_rfc3339(),
        );
        details.insert("organization".to_string(), organization.name);
        self.notify(&process, TEMPLATE_INVITATION, details);

        Ok(process)
    }

    pub fn assign(
        &self,
        id: &ScreeningProcessId,
        assignment: Assignment,
    ) -> Result<ScreeningProcess, ScreeningError> {
        let _writes = self.writes.enter()?;
        let mut process = self.get(id)?;
        process.ensure_active()?;
        if let Some(actor) = assignment.current_actor_id {
            process.current_actor_id = Some(actor);
        }
        if let Some(supervisor) = assignment.supervisor_id {
            process.supervisor_id = Some(supervisor);
        }
        process.updated_at = Utc::now();
        self.repository.update(process.clone())?;
        Ok(process)
    }

    fn token_ttl(&self, organization: &Organization) -> Duration {
        let hours = organization
            .settings
            .token_ttl_hours
            .unwrap_or(self.config.token_ttl_hours);
        Duration::hours(i64::from(hours))
    }

    fn advance_and_store(
        &self,
        mut process: ScreeningProcess,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        match process.advance(now) {
            Advance::Next(step_type) => {
                self.repository.update(process.clone())?;
                info!(
                    process_id = %process.id,
                    step = step_type.label(),
                    "screening step started"
                );
                Ok(process)
            }
            Advance::Finished => self.approve(process, actor, now),
        }
    }

    /// Final transition: push the pending version into the live rows and close the process.
    fn approve(
        &self,
        mut process: ScreeningProcess,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        if let Some(version_id) = process.pending_version_id {
            self.professionals.apply_version(&version_id, actor)?;
        }

        process.status = ScreeningStatus::Approved;
        process.completed_at = Some(now);
        process.updated_at = now;
        self.repository.update(process.clone())?;

        info!(process_id = %process.id, "screening process approved");
        let mut details = BTreeMap::new();
        details.insert("professional".to_string(), process.professional_name.clone());
        self.notify(&process, TEMPLATE_APPROVED, details);
        Ok(process)
    }

    fn finish_rejected(
        &self,
        mut process: ScreeningProcess,
        reason: String,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ScreeningProcess, ScreeningError> {
        self.discard_pending_version(&mut process, "screening rejected", actor)?;
        process.terminate(ScreeningStatus::Rejected, StepStatus::Rejected, now);
        process.rejection_reason = Some(reason.clone());
        self.repository.update(process.clone())?;

        info!(process_id = %process.id, rejected_by = %actor, "screening process rejected");
        let mut details = BTreeMap::new();
        details.insert("reason".to_string(), reason);
        self.notify(&process, TEMPLATE_REJECTED, details);
        Ok(process)
    }

    fn expire(&self, process: &mut ScreeningProcess, now: DateTime<Utc>) -> Result<(), ScreeningError> {
        let system = UserId::new("system");
        self.discard_pending_version(process, "screening expired", &system)?;
        process.terminate(ScreeningStatus::Expired, StepStatus::Skipped, now);
        self.repository.update(process.clone())?;
        warn!(process_id = %process.id, "screening access token expired");
        Ok(())
    }

    /// Snapshot a payment step builds on: the pending screening version if any, else live state.
    fn base_snapshot(
        &self,
        process: &ScreeningProcess,
        professional_id: &ProfessionalId,
    ) -> Result<ProfessionalSnapshot, ScreeningError> {
        if let Some(version_id) = process.pending_version_id {
            let version = self.professionals.version(&version_id)?;
            if version.status == VersionStatus::Pending {
                return ProfessionalSnapshot::from_value(&version.data_snapshot).map_err(|error| {
                    ProfessionalError::InvalidSnapshot(error.to_string()).into()
                });
            }
        }
        Ok(self.professionals.snapshot(professional_id)?)
    }

    fn record_version(
        &self,
        process: &mut ScreeningProcess,
        professional_id: ProfessionalId,
        snapshot: ProfessionalSnapshot,
        actor: &UserId,
    ) -> Result<VersionId, ScreeningError> {
        let outcome = self.professionals.create_version(NewVersion {
            professional_id,
            snapshot,
            source_type: VersionSourceType::Screening,
            source_id: Some(process.id.to_string()),
            created_by: actor.clone(),
        })?;
        self.discard_pending_version(process, "superseded by a newer screening version", actor)?;
        process.pending_version_id = Some(outcome.version.id);
        Ok(outcome.version.id)
    }

    fn discard_pending_version(
        &self,
        process: &mut ScreeningProcess,
        reason: &str,
        actor: &UserId,
    ) -> Result<(), ScreeningError> {
        let Some(version_id) = process.pending_version_id.take() else {
            return Ok(());
        };
        let version = self.professionals.version(&version_id)?;
        if version.status == VersionStatus::Pending {
            self.professionals
                .reject_version(&version_id, reason, actor)?;
        }
        Ok(())
    }

    /// Delivery failures are logged; the stored state stands.
    fn notify(&self, process: &ScreeningProcess, template: &str, details: BTreeMap<String, String>) {
        let notification = ScreeningNotification {
            template: template.to_string(),
            process_id: process.id,
            recipient: process.professional_email.clone(),
            details,
        };
        if let Err(error) = self.notifier.publish(notification) {
            warn!(process_id = %process.id, template, %error, "screening notification not delivered");
        }
    }
}

fn linked_professional(process: &ScreeningProcess) -> Result<ProfessionalId, ScreeningError> {
    process.professional_id.ok_or_else(|| {
        ScreeningError::InvalidStepData("process has no linked professional".to_string())
    })
}

fn build_documents(
    requirements: &[DocumentRequirement],
) -> Result<Vec<ScreeningRequiredDocument>, ScreeningError> {
    let mut documents: Vec<ScreeningRequiredDocument> = Vec::with_capacity(requirements.len());
    for requirement in requirements {
        let document_type = require_text("document_type", &requirement.document_type)?.to_lowercase();
        if documents
            .iter()
            .any(|document| document.document_type == document_type)
        {
            continue;
        }
        documents.push(ScreeningRequiredDocument {
            id: DocumentId::new(),
            document_type,
            is_required: requirement.is_required,
            status: DocumentStatus::PendingUpload,
            file_reference: None,
            uploaded_at: None,
            review_notes: Vec::new(),
        });
    }
    Ok(documents)
}

fn upload_into(
    process: &mut ScreeningProcess,
    document_id: &DocumentId,
    file_reference: &str,
    actor: &UserId,
    now: DateTime<Utc>,
) -> Result<(), ScreeningError> {
    process.ensure_current(StepType::DocumentUpload)?;
    let file_reference = require_text("file_reference", file_reference)?;

    let document = process
        .document_mut(document_id)
        .ok_or(ScreeningError::DocumentNotFound(*document_id))?;
    match document.status {
        DocumentStatus::Approved => {
            return Err(ScreeningError::InvalidStepData(format!(
                "document {} is already approved",
                document.document_type
            )));
        }
        DocumentStatus::CorrectionNeeded | DocumentStatus::Rejected => {
            document.review_notes.push(ReviewNote {
                user_id: actor.clone(),
                text: "document resubmitted".to_string(),
                timestamp: now,
                action: NoteAction::Resubmitted,
            });
        }
        DocumentStatus::PendingUpload | DocumentStatus::Uploaded => {}
    }

    document.status = DocumentStatus::Uploaded;
    document.file_reference = Some(file_reference);
    document.uploaded_at = Some(now);
    process.updated_at = now;
    Ok(())
}

/// Error raised by the screening service.
#[derive(Debug, thiserror::Error)]
pub enum ScreeningError {
    #[error("screening process not found")]
    NotFound,
    #[error("an active screening process already exists for this professional ({existing})")]
    ActiveProcessExists { existing: ScreeningProcessId },
    #[error("invalid step configuration: {0}")]
    InvalidConfiguration(String),
    #[error("screening process is {}", .status.label())]
    Terminal { status: ScreeningStatus },
    #[error("step {} is not current (current step is {})", .expected.label(), .current.label())]
    StepNotCurrent { expected: StepType, current: StepType },
    #[error("step {} is not configured for this process", .0.label())]
    StepNotConfigured(StepType),
    #[error("step {} is required and cannot be skipped", .0.label())]
    StepRequired(StepType),
    #[error("invalid step data: {0}")]
    InvalidStepData(String),
    #[error("step incomplete: {0}")]
    IncompleteStep(String),
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("{} document(s) rejected; correction requested", .rejected.len())]
    DocumentsRejected { rejected: Vec<DocumentId> },
    #[error("invalid access token")]
    InvalidToken,
    #[error("access token expired")]
    TokenExpired,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Professional(#[from] ProfessionalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
