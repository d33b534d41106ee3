use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::diff::diff_snapshots;
use super::domain::{
    CouncilRegistration, EntityKind, Professional, ProfessionalChangeDiff,
    ProfessionalRecord, ProfessionalVersion, VersionSourceType, VersionStatus,
};
use super::repository::ProfessionalRepository;
use super::snapshot::ProfessionalSnapshot;
use super::sync::{SnapshotSync, SyncReport};
use crate::catalog::SpecialtyCatalog;
use crate::ids::{
    DiffId, OrganizationId, ProfessionalId, QualificationId, SpecialtyId, UserId, VersionId,
};
use crate::storage::{RepositoryError, WriteGate};
use crate::tenancy::{family_scope, Organization, OrganizationDirectory, OrganizationScope};
use crate::validation::{normalize_cpf, normalize_email, require_text, ValidationError};

/// Registration payload for a professional.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProfessional {
    pub organization_id: OrganizationId,
    pub full_name: String,
    pub cpf: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

/// Field-by-field personal info update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalInfoPatch {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

impl PersonalInfoPatch {
    fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.cpf.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.birth_date.is_none()
    }
}

/// Request to record a new version of a professional's data.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub professional_id: ProfessionalId,
    pub snapshot: ProfessionalSnapshot,
    pub source_type: VersionSourceType,
    pub source_id: Option<String>,
    pub created_by: UserId,
}

/// A version together with the diff recorded at creation and, once applied, the sync counts.
#[derive(Debug, Clone, Serialize)]
pub struct VersionOutcome {
    pub version: ProfessionalVersion,
    pub diffs: Vec<ProfessionalChangeDiff>,
    pub sync: Option<SyncReport>,
}

/// Service owning professional registration, versioning and the live-row sync.
pub struct ProfessionalService<R, O> {
    repository: Arc<R>,
    organizations: Arc<O>,
    catalog: Arc<SpecialtyCatalog>,
    writes: WriteGate,
}

impl<R, O> ProfessionalService<R, O>
where
    R: ProfessionalRepository + 'static,
    O: OrganizationDirectory + 'static,
{
    pub fn new(repository: Arc<R>, organizations: Arc<O>, catalog: Arc<SpecialtyCatalog>) -> Self {
        Self {
            repository,
            organizations,
            catalog,
            writes: WriteGate::default(),
        }
    }

    pub fn catalog(&self) -> &SpecialtyCatalog {
        &self.catalog
    }

    pub fn organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Organization, ProfessionalError> {
        self.organizations
            .fetch(organization_id)?
            .ok_or(ProfessionalError::UnknownOrganization(*organization_id))
    }

    /// Uniqueness scope of an organization (its family when it has one).
    pub fn scope_for(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<OrganizationScope, ProfessionalError> {
        let organization = self.organization(organization_id)?;
        Ok(family_scope(self.organizations.as_ref(), &organization)?)
    }

    /// Register a professional and record its initial applied version.
    pub fn register(
        &self,
        request: NewProfessional,
        actor: &UserId,
    ) -> Result<ProfessionalRecord, ProfessionalError> {
        let _writes = self.writes.enter()?;
        self.register_locked(request, actor)
    }

    fn register_locked(
        &self,
        request: NewProfessional,
        actor: &UserId,
    ) -> Result<ProfessionalRecord, ProfessionalError> {
        let scope = self.scope_for(&request.organization_id)?;
        let full_name = require_text("full_name", &request.full_name)?;
        let cpf = normalize_cpf(&request.cpf)?;
        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(normalize_email)
            .transpose()?;

        if let Some(existing) = self.repository.find_by_cpf(&scope, &cpf, None)? {
            return Err(ProfessionalError::DuplicateCpf {
                cpf,
                existing: existing.id,
            });
        }
        if let Some(email) = email.as_deref() {
            if let Some(existing) = self.repository.find_by_email(&scope, email, None)? {
                return Err(ProfessionalError::DuplicateEmail {
                    email: email.to_string(),
                    existing: existing.id,
                });
            }
        }

        let now = Utc::now();
        let record = ProfessionalRecord::new(Professional {
            id: ProfessionalId::new(),
            organization_id: request.organization_id,
            full_name,
            cpf,
            email,
            phone: request
                .phone
                .map(|phone| phone.trim().to_string())
                .filter(|phone| !phone.is_empty()),
            birth_date: request.birth_date,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });
        let record = self.repository.insert(record)?;

        let snapshot = self.capture(&record)?;
        self.repository.insert_version(ProfessionalVersion {
            id: VersionId::new(),
            professional_id: record.id(),
            version_number: 1,
            data_snapshot: snapshot.to_value().map_err(invalid_snapshot)?,
            source_type: VersionSourceType::Direct,
            source_id: None,
            status: VersionStatus::Applied,
            is_current: true,
            rejection_reason: None,
            created_by: actor.clone(),
            created_at: now,
            applied_at: Some(now),
            applied_by: Some(actor.clone()),
        })?;

        info!(
            professional_id = %record.id(),
            organization_id = %record.professional.organization_id,
            "professional registered"
        );
        Ok(record)
    }

    /// Looks a CPF up in the organization's family scope.
    pub fn find_by_cpf(
        &self,
        organization_id: &OrganizationId,
        cpf: &str,
    ) -> Result<Option<ProfessionalRecord>, ProfessionalError> {
        let scope = self.scope_for(organization_id)?;
        let cpf = normalize_cpf(cpf)?;
        match self.repository.find_by_cpf(&scope, &cpf, None)? {
            Some(professional) => Ok(self.repository.fetch(&professional.id)?),
            None => Ok(None),
        }
    }

    pub fn find_or_register(
        &self,
        request: NewProfessional,
        actor: &UserId,
    ) -> Result<ProfessionalRecord, ProfessionalError> {
        let _writes = self.writes.enter()?;
        match self.find_by_cpf(&request.organization_id, &request.cpf)? {
            Some(record) => Ok(record),
            None => self.register_locked(request, actor),
        }
    }

    pub fn get(&self, id: &ProfessionalId) -> Result<ProfessionalRecord, ProfessionalError> {
        self.repository
            .fetch(id)?
            .filter(|record| record.professional.deleted_at.is_none())
            .ok_or(ProfessionalError::NotFound)
    }

    /// Snapshot of the live state of a professional.
    pub fn snapshot(&self, id: &ProfessionalId) -> Result<ProfessionalSnapshot, ProfessionalError> {
        let record = self.get(id)?;
        self.capture(&record)
    }

    fn capture(&self, record: &ProfessionalRecord) -> Result<ProfessionalSnapshot, ProfessionalError> {
        let mut companies = BTreeMap::new();
        for link in record.live_company_links() {
            if let Some(company) = self.repository.company(&link.company_id)? {
                companies.insert(company.id, company);
            }
        }
        Ok(ProfessionalSnapshot::capture(record, &companies))
    }

    /// Record a version diffed against the live state. `Direct` versions apply immediately.
    pub fn create_version(&self, request: NewVersion) -> Result<VersionOutcome, ProfessionalError> {
        let _writes = self.writes.enter()?;
        self.create_version_locked(request)
    }

    fn create_version_locked(&self, request: NewVersion) -> Result<VersionOutcome, ProfessionalError> {
        let record = self.get(&request.professional_id)?;
        let current = self.capture(&record)?.to_value().map_err(invalid_snapshot)?;
        let proposed = request.snapshot.to_value().map_err(invalid_snapshot)?;

        let version_number = self
            .repository
            .versions_for(&record.id())?
            .last()
            .map(|version| version.version_number + 1)
            .unwrap_or(1);

        let mut version = ProfessionalVersion {
            id: VersionId::new(),
            professional_id: record.id(),
            version_number,
            data_snapshot: proposed,
            source_type: request.source_type,
            source_id: request.source_id,
            status: VersionStatus::Pending,
            is_current: false,
            rejection_reason: None,
            created_by: request.created_by.clone(),
            created_at: Utc::now(),
            applied_at: None,
            applied_by: None,
        };

        let diffs: Vec<ProfessionalChangeDiff> =
            diff_snapshots(&current, &version.data_snapshot)
                .into_iter()
                .map(|change| ProfessionalChangeDiff {
                    id: DiffId::new(),
                    version_id: version.id,
                    change_type: change.change_type,
                    entity_type: change.entity_type,
                    entity_id: change.entity_id,
                    field_path: change.field_path,
                    old_value: change.old_value,
                    new_value: change.new_value,
                })
                .collect();

        let sync = if version.source_type == VersionSourceType::Direct {
            Some(self.sync_into_live(&mut version, &request.created_by, Utc::now())?)
        } else {
            None
        };

        let version = self.repository.insert_version(version)?;
        self.repository.insert_diffs(diffs.clone())?;

        info!(
            professional_id = %version.professional_id,
            version_id = %version.id,
            version_number = version.version_number,
            status = version.status.label(),
            changes = diffs.len(),
            "professional version created"
        );

        Ok(VersionOutcome {
            version,
            diffs,
            sync,
        })
    }

    /// Apply a pending version to the live rows.
    pub fn apply_version(
        &self,
        version_id: &VersionId,
        actor: &UserId,
    ) -> Result<VersionOutcome, ProfessionalError> {
        let _writes = self.writes.enter()?;
        let mut version = self.version(version_id)?;
        let report = self.sync_into_live(&mut version, actor, Utc::now())?;
        self.repository.update_version(version.clone())?;
        let diffs = self.repository.diffs_for(version_id)?;

        info!(
            professional_id = %version.professional_id,
            version_id = %version.id,
            inserted = report.inserted,
            updated = report.updated,
            soft_deleted = report.soft_deleted,
            "professional version applied"
        );

        Ok(VersionOutcome {
            version,
            diffs,
            sync: Some(report),
        })
    }

    pub fn reject_version(
        &self,
        version_id: &VersionId,
        reason: &str,
        actor: &UserId,
    ) -> Result<ProfessionalVersion, ProfessionalError> {
        let _writes = self.writes.enter()?;
        let mut version = self.version(version_id)?;
        if version.status != VersionStatus::Pending {
            return Err(ProfessionalError::VersionNotPending {
                status: version.status,
            });
        }

        version.status = VersionStatus::Rejected;
        version.rejection_reason = Some(reason.trim().to_string());
        self.repository.update_version(version.clone())?;

        info!(
            version_id = %version.id,
            rejected_by = %actor,
            "professional version rejected"
        );
        Ok(version)
    }

    pub fn versions(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<ProfessionalVersion>, ProfessionalError> {
        self.get(professional_id)?;
        Ok(self.repository.versions_for(professional_id)?)
    }

    pub fn version(&self, version_id: &VersionId) -> Result<ProfessionalVersion, ProfessionalError> {
        self.repository
            .fetch_version(version_id)?
            .ok_or(ProfessionalError::VersionNotFound)
    }

    pub fn diffs(
        &self,
        version_id: &VersionId,
    ) -> Result<Vec<ProfessionalChangeDiff>, ProfessionalError> {
        self.version(version_id)?;
        Ok(self.repository.diffs_for(version_id)?)
    }

    /// Patch personal info through a `Direct` version.
    pub fn update_personal_info(
        &self,
        professional_id: &ProfessionalId,
        patch: PersonalInfoPatch,
        actor: &UserId,
    ) -> Result<VersionOutcome, ProfessionalError> {
        if patch.is_empty() {
            return Err(ValidationError::Blank {
                field: "personal_info",
            }
            .into());
        }

        let _writes = self.writes.enter()?;
        let mut snapshot = self.snapshot(professional_id)?;
        let info = &mut snapshot.personal_info;
        if let Some(full_name) = patch.full_name {
            info.full_name = full_name;
        }
        if let Some(cpf) = patch.cpf {
            info.cpf = cpf;
        }
        if let Some(email) = patch.email {
            info.email = Some(email);
        }
        if let Some(phone) = patch.phone {
            info.phone = Some(phone);
        }
        if let Some(birth_date) = patch.birth_date {
            info.birth_date = Some(birth_date);
        }

        self.create_version_locked(NewVersion {
            professional_id: *professional_id,
            snapshot,
            source_type: VersionSourceType::Direct,
            source_id: None,
            created_by: actor.clone(),
        })
    }

    /// Returns the holder of a live council registration within the organization's scope.
    pub fn check_council_registration(
        &self,
        organization_id: &OrganizationId,
        registration: &CouncilRegistration,
        exclude: Option<&QualificationId>,
    ) -> Result<Option<(ProfessionalId, QualificationId)>, ProfessionalError> {
        let scope = self.scope_for(organization_id)?;
        Ok(self
            .repository
            .find_council_registration(&scope, registration, exclude)?)
    }

    /// Runs the natural-key sync for a pending version and persists the live rows.
    ///
    /// The version itself is marked applied in memory; the caller stores it.
    fn sync_into_live(
        &self,
        version: &mut ProfessionalVersion,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, ProfessionalError> {
        if version.status != VersionStatus::Pending {
            return Err(ProfessionalError::VersionNotPending {
                status: version.status,
            });
        }

        let snapshot = ProfessionalSnapshot::from_value(&version.data_snapshot)
            .map_err(invalid_snapshot)?;
        let mut record = self.get(&version.professional_id)?;
        let scope = self.scope_for(&record.professional.organization_id)?;

        let outcome = SnapshotSync {
            repository: self.repository.as_ref(),
            catalog: self.catalog.as_ref(),
            scope: &scope,
            now,
        }
        .apply(&mut record, &snapshot)?;

        for company in outcome.companies {
            self.repository.upsert_company(company)?;
        }
        self.repository.update(record)?;

        for mut previous in self.repository.versions_for(&version.professional_id)? {
            if previous.is_current && previous.id != version.id {
                previous.is_current = false;
                self.repository.update_version(previous)?;
            }
        }

        version.status = VersionStatus::Applied;
        version.is_current = true;
        version.applied_at = Some(now);
        version.applied_by = Some(actor.clone());

        Ok(outcome.report)
    }
}

fn invalid_snapshot(error: serde_json::Error) -> ProfessionalError {
    ProfessionalError::InvalidSnapshot(error.to_string())
}

/// Error raised by the professional service.
#[derive(Debug, thiserror::Error)]
pub enum ProfessionalError {
    #[error("professional not found")]
    NotFound,
    #[error("professional version not found")]
    VersionNotFound,
    #[error("organization {0} not found")]
    UnknownOrganization(OrganizationId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cpf {cpf} is already registered to professional {existing}")]
    DuplicateCpf {
        cpf: String,
        existing: ProfessionalId,
    },
    #[error("email {email} is already registered to professional {existing}")]
    DuplicateEmail {
        email: String,
        existing: ProfessionalId,
    },
    #[error("council registration {registration} is already held by professional {owner}")]
    DuplicateCouncilRegistration {
        registration: CouncilRegistration,
        owner: ProfessionalId,
    },
    #[error("specialty {0} is not in the catalog")]
    UnknownSpecialty(SpecialtyId),
    #[error("duplicate {entity:?} entry '{key}' in snapshot")]
    DuplicateNaturalKey { entity: EntityKind, key: String },
    #[error("version is {} and can no longer change", .status.label())]
    VersionNotPending { status: VersionStatus },
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
