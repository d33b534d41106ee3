use super::domain::{
    Company, CouncilRegistration, Professional, ProfessionalChangeDiff, ProfessionalRecord,
    ProfessionalVersion,
};
use crate::ids::{CompanyId, ProfessionalId, QualificationId, VersionId};
use crate::storage::RepositoryError;
use crate::tenancy::OrganizationScope;

/// Storage abstraction for professionals, their nested rows, global companies and versions.
///
/// Lookups that enforce uniqueness ignore soft-deleted rows and only consider professionals
/// whose organization belongs to `scope`.
pub trait ProfessionalRepository: Send + Sync {
    fn insert(&self, record: ProfessionalRecord) -> Result<ProfessionalRecord, RepositoryError>;
    fn update(&self, record: ProfessionalRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ProfessionalId) -> Result<Option<ProfessionalRecord>, RepositoryError>;

    fn find_by_cpf(
        &self,
        scope: &OrganizationScope,
        cpf: &str,
        exclude: Option<&ProfessionalId>,
    ) -> Result<Option<Professional>, RepositoryError>;

    fn find_by_email(
        &self,
        scope: &OrganizationScope,
        email: &str,
        exclude: Option<&ProfessionalId>,
    ) -> Result<Option<Professional>, RepositoryError>;

    /// Returns the owner of a live qualification with this registration, if any.
    fn find_council_registration(
        &self,
        scope: &OrganizationScope,
        registration: &CouncilRegistration,
        exclude: Option<&QualificationId>,
    ) -> Result<Option<(ProfessionalId, QualificationId)>, RepositoryError>;

    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    fn company_by_cnpj(&self, cnpj: &str) -> Result<Option<Company>, RepositoryError>;
    /// Inserts or replaces the company sharing this CNPJ, keeping the stored id.
    fn upsert_company(&self, company: Company) -> Result<Company, RepositoryError>;

    fn insert_version(
        &self,
        version: ProfessionalVersion,
    ) -> Result<ProfessionalVersion, RepositoryError>;
    fn update_version(&self, version: ProfessionalVersion) -> Result<(), RepositoryError>;
    fn fetch_version(&self, id: &VersionId) -> Result<Option<ProfessionalVersion>, RepositoryError>;
    /// Versions of a professional ordered by version number.
    fn versions_for(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<ProfessionalVersion>, RepositoryError>;
    fn insert_diffs(&self, diffs: Vec<ProfessionalChangeDiff>) -> Result<(), RepositoryError>;
    fn diffs_for(&self, version_id: &VersionId) -> Result<Vec<ProfessionalChangeDiff>, RepositoryError>;
}
