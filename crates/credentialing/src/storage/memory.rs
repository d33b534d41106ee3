//! Mutex-guarded in-memory adapters used by the server, the demo and the tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::RepositoryError;
use crate::ids::{CompanyId, OrganizationId, ProfessionalId, QualificationId, ScreeningProcessId, VersionId};
use crate::tenancy::{Organization, OrganizationDirectory, OrganizationScope};
use crate::workflows::professionals::{
    Company, CouncilRegistration, Professional, ProfessionalChangeDiff, ProfessionalRecord,
    ProfessionalRepository, ProfessionalVersion,
};
use crate::workflows::screening::{
    NotificationError, ScreeningNotification, ScreeningNotifier, ScreeningProcess,
    ScreeningRepository, ScreeningStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
}

#[derive(Default, Clone)]
pub struct InMemoryOrganizationDirectory {
    organizations: Arc<Mutex<HashMap<OrganizationId, Organization>>>,
}

impl OrganizationDirectory for InMemoryOrganizationDirectory {
    fn insert(&self, organization: Organization) -> Result<Organization, RepositoryError> {
        let mut guard = lock(&self.organizations)?;
        if guard.contains_key(&organization.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(organization.id, organization.clone());
        Ok(organization)
    }

    fn fetch(&self, id: &OrganizationId) -> Result<Option<Organization>, RepositoryError> {
        Ok(lock(&self.organizations)?.get(id).cloned())
    }

    fn children_of(&self, id: &OrganizationId) -> Result<Vec<Organization>, RepositoryError> {
        let guard = lock(&self.organizations)?;
        let mut children: Vec<Organization> = guard
            .values()
            .filter(|organization| organization.parent_id.as_ref() == Some(id))
            .cloned()
            .collect();
        children.sort_by_key(|organization| organization.created_at);
        Ok(children)
    }
}

#[derive(Default)]
struct ProfessionalTables {
    records: HashMap<ProfessionalId, ProfessionalRecord>,
    companies: HashMap<CompanyId, Company>,
    versions: HashMap<VersionId, ProfessionalVersion>,
    diffs: Vec<ProfessionalChangeDiff>,
}

impl ProfessionalTables {
    fn live_in<'a>(
        &'a self,
        scope: &'a OrganizationScope,
        exclude: Option<&'a ProfessionalId>,
    ) -> impl Iterator<Item = &'a ProfessionalRecord> + 'a {
        self.records.values().filter(move |record| {
            let professional = &record.professional;
            professional.deleted_at.is_none()
                && scope.contains(&professional.organization_id)
                && Some(&professional.id) != exclude
        })
    }
}

#[derive(Default, Clone)]
pub struct InMemoryProfessionalRepository {
    tables: Arc<Mutex<ProfessionalTables>>,
}

impl InMemoryProfessionalRepository {
    pub fn companies(&self) -> Result<Vec<Company>, RepositoryError> {
        Ok(lock(&self.tables)?.companies.values().cloned().collect())
    }
}

impl ProfessionalRepository for InMemoryProfessionalRepository {
    fn insert(&self, record: ProfessionalRecord) -> Result<ProfessionalRecord, RepositoryError> {
        let mut guard = lock(&self.tables)?;
        if guard.records.contains_key(&record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.records.insert(record.id(), record.clone());
        Ok(record)
    }

    fn update(&self, record: ProfessionalRecord) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.tables)?;
        match guard.records.get_mut(&record.id()) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ProfessionalId) -> Result<Option<ProfessionalRecord>, RepositoryError> {
        Ok(lock(&self.tables)?.records.get(id).cloned())
    }

    fn find_by_cpf(
        &self,
        scope: &OrganizationScope,
        cpf: &str,
        exclude: Option<&ProfessionalId>,
    ) -> Result<Option<Professional>, RepositoryError> {
        let guard = lock(&self.tables)?;
        let found = guard
            .live_in(scope, exclude)
            .find(|record| record.professional.cpf == cpf)
            .map(|record| record.professional.clone());
        Ok(found)
    }

    fn find_by_email(
        &self,
        scope: &OrganizationScope,
        email: &str,
        exclude: Option<&ProfessionalId>,
    ) -> Result<Option<Professional>, RepositoryError> {
        let guard = lock(&self.tables)?;
        let found = guard
            .live_in(scope, exclude)
            .find(|record| record.professional.email.as_deref() == Some(email))
            .map(|record| record.professional.clone());
        Ok(found)
    }

    fn find_council_registration(
        &self,
        scope: &OrganizationScope,
        registration: &CouncilRegistration,
        exclude: Option<&QualificationId>,
    ) -> Result<Option<(ProfessionalId, QualificationId)>, RepositoryError> {
        let guard = lock(&self.tables)?;
        let found = guard.live_in(scope, None).find_map(|record| {
            record
                .live_qualifications()
                .find(|qualification| {
                    Some(&qualification.id) != exclude
                        && qualification.registration() == *registration
                })
                .map(|qualification| (record.id(), qualification.id))
        });
        Ok(found)
    }

    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        Ok(lock(&self.tables)?.companies.get(id).cloned())
    }

    fn company_by_cnpj(&self, cnpj: &str) -> Result<Option<Company>, RepositoryError> {
        let guard = lock(&self.tables)?;
        Ok(guard
            .companies
            .values()
            .find(|company| company.cnpj == cnpj)
            .cloned())
    }

    fn upsert_company(&self, mut company: Company) -> Result<Company, RepositoryError> {
        let mut guard = lock(&self.tables)?;
        if let Some(stored) = guard
            .companies
            .values()
            .find(|stored| stored.cnpj == company.cnpj)
        {
            company.id = stored.id;
            company.created_at = stored.created_at;
        }
        guard.companies.insert(company.id, company.clone());
        Ok(company)
    }

    fn insert_version(
        &self,
        version: ProfessionalVersion,
    ) -> Result<ProfessionalVersion, RepositoryError> {
        let mut guard = lock(&self.tables)?;
        if guard.versions.contains_key(&version.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.versions.insert(version.id, version.clone());
        Ok(version)
    }

    fn update_version(&self, version: ProfessionalVersion) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.tables)?;
        match guard.versions.get_mut(&version.id) {
            Some(slot) => {
                *slot = version;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_version(&self, id: &VersionId) -> Result<Option<ProfessionalVersion>, RepositoryError> {
        Ok(lock(&self.tables)?.versions.get(id).cloned())
    }

    fn versions_for(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<ProfessionalVersion>, RepositoryError> {
        let guard = lock(&self.tables)?;
        let mut versions: Vec<ProfessionalVersion> = guard
            .versions
            .values()
            .filter(|version| &version.professional_id == professional_id)
            .cloned()
            .collect();
        versions.sort_by_key(|version| version.version_number);
        Ok(versions)
    }

    fn insert_diffs(&self, diffs: Vec<ProfessionalChangeDiff>) -> Result<(), RepositoryError> {
        lock(&self.tables)?.diffs.extend(diffs);
        Ok(())
    }

    fn diffs_for(&self, version_id: &VersionId) -> Result<Vec<ProfessionalChangeDiff>, RepositoryError> {
        let guard = lock(&self.tables)?;
        Ok(guard
            .diffs
            .iter()
            .filter(|diff| &diff.version_id == version_id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryScreeningRepository {
    processes: Arc<Mutex<HashMap<ScreeningProcessId, ScreeningProcess>>>,
}

impl ScreeningRepository for InMemoryScreeningRepository {
    fn insert(&self, process: ScreeningProcess) -> Result<ScreeningProcess, RepositoryError> {
        let mut guard = lock(&self.processes)?;
        let duplicate = guard.values().any(|stored| {
            stored.id == process.id
                || (!stored.is_terminal()
                    && !process.is_terminal()
                    && stored.organization_id == process.organization_id
                    && stored.professional_cpf == process.professional_cpf)
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(process.id, process.clone());
        Ok(process)
    }

    fn update(&self, process: ScreeningProcess) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.processes)?;
        match guard.get_mut(&process.id) {
            Some(slot) => {
                *slot = process;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ScreeningProcessId) -> Result<Option<ScreeningProcess>, RepositoryError> {
        Ok(lock(&self.processes)?.get(id).cloned())
    }

    fn find_by_token(&self, token: &str) -> Result<Option<ScreeningProcess>, RepositoryError> {
        let guard = lock(&self.processes)?;
        Ok(guard
            .values()
            .find(|process| process.access_token == token)
            .cloned())
    }

    fn list(
        &self,
        organization_id: &OrganizationId,
        status: Option<ScreeningStatus>,
    ) -> Result<Vec<ScreeningProcess>, RepositoryError> {
        let guard = lock(&self.processes)?;
        let mut processes: Vec<ScreeningProcess> = guard
            .values()
            .filter(|process| &process.organization_id == organization_id)
            .filter(|process| status.map_or(true, |status| process.status == status))
            .cloned()
            .collect();
        processes.sort_by_key(|process| process.created_at);
        Ok(processes)
    }

    fn active_for_cpf(
        &self,
        organization_id: &OrganizationId,
        cpf: &str,
    ) -> Result<Option<ScreeningProcess>, RepositoryError> {
        let guard = lock(&self.processes)?;
        Ok(guard
            .values()
            .find(|process| {
                &process.organization_id == organization_id
                    && process.professional_cpf == cpf
                    && !process.is_terminal()
            })
            .cloned())
    }

    fn non_terminal(&self) -> Result<Vec<ScreeningProcess>, RepositoryError> {
        let guard = lock(&self.processes)?;
        Ok(guard
            .values()
            .filter(|process| !process.is_terminal())
            .cloned()
            .collect())
    }
}

/// Notifier that keeps every notification for inspection.
#[derive(Default, Clone)]
pub struct InMemoryNotifier {
    events: Arc<Mutex<Vec<ScreeningNotification>>>,
}

impl InMemoryNotifier {
    pub fn events(&self) -> Vec<ScreeningNotification> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn templates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.template)
            .collect()
    }
}

impl ScreeningNotifier for InMemoryNotifier {
    fn publish(&self, notification: ScreeningNotification) -> Result<(), NotificationError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| NotificationError::Transport("notifier mutex poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}
