use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    BankAccountId, CompanyId, CompanyLinkId, DiffId, EducationId, OrganizationId, ProfessionalId,
    QualificationId, SpecialtyId, SpecialtyRowId, UserId, VersionId,
};

/// Regulated profession a qualification licenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfessionalType {
    Doctor,
    Nurse,
    NursingTechnician,
    Physiotherapist,
    Dentist,
    Pharmacist,
    Psychologist,
    Nutritionist,
}

impl ProfessionalType {
    pub const fn label(self) -> &'static str {
        match self {
            ProfessionalType::Doctor => "doctor",
            ProfessionalType::Nurse => "nurse",
            ProfessionalType::NursingTechnician => "nursing_technician",
            ProfessionalType::Physiotherapist => "physiotherapist",
            ProfessionalType::Dentist => "dentist",
            ProfessionalType::Pharmacist => "pharmacist",
            ProfessionalType::Psychologist => "psychologist",
            ProfessionalType::Nutritionist => "nutritionist",
        }
    }
}

impl fmt::Display for ProfessionalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProfessionalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Ok(Self::Doctor),
            "nurse" => Ok(Self::Nurse),
            "nursing_technician" => Ok(Self::NursingTechnician),
            "physiotherapist" => Ok(Self::Physiotherapist),
            "dentist" => Ok(Self::Dentist),
            "pharmacist" => Ok(Self::Pharmacist),
            "psychologist" => Ok(Self::Psychologist),
            "nutritionist" => Ok(Self::Nutritionist),
            other => Err(format!("unknown professional type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    Technical,
    Undergraduate,
    Specialization,
    Residency,
    Masters,
    Doctorate,
    Fellowship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Payment,
}

/// Professional registered within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professional {
    pub id: ProfessionalId,
    pub organization_id: OrganizationId,
    pub full_name: String,
    pub cpf: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Council registration (CRM, COREN, ...) held by a professional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    pub id: QualificationId,
    pub professional_id: ProfessionalId,
    pub professional_type: ProfessionalType,
    pub council_type: String,
    pub council_number: String,
    pub council_state: String,
    pub is_primary: bool,
    pub graduation_year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Qualification {
    pub fn registration(&self) -> CouncilRegistration {
        CouncilRegistration::new(&self.council_type, &self.council_number, &self.council_state)
    }
}

/// Natural key of a qualification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CouncilRegistration {
    pub council_type: String,
    pub council_number: String,
    pub council_state: String,
}

impl CouncilRegistration {
    pub fn new(council_type: &str, council_number: &str, council_state: &str) -> Self {
        Self {
            council_type: council_type.trim().to_ascii_uppercase(),
            council_number: council_number.trim().to_ascii_uppercase(),
            council_state: council_state.trim().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for CouncilRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}",
            self.council_type, self.council_number, self.council_state
        )
    }
}

/// Specialty held under a qualification; `specialty_id` points into the global catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specialty {
    pub id: SpecialtyRowId,
    pub qualification_id: QualificationId,
    pub specialty_id: SpecialtyId,
    pub rqe_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
    pub id: EducationId,
    pub qualification_id: QualificationId,
    pub level: EducationLevel,
    pub course_name: String,
    pub institution: String,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Company shared across tenants, unique by CNPJ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub cnpj: String,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Link between a professional and a company they invoice through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyLink {
    pub id: CompanyLinkId,
    pub professional_id: ProfessionalId,
    pub company_id: CompanyId,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: BankAccountId,
    pub professional_id: ProfessionalId,
    pub bank_code: String,
    pub bank_name: Option<String>,
    pub agency_number: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub pix_key: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Every row owned by a professional, soft-deleted ones included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionalRecord {
    pub professional: Professional,
    pub qualifications: Vec<Qualification>,
    pub specialties: Vec<Specialty>,
    pub educations: Vec<Education>,
    pub company_links: Vec<CompanyLink>,
    pub bank_accounts: Vec<BankAccount>,
}

impl ProfessionalRecord {
    pub fn new(professional: Professional) -> Self {
        Self {
            professional,
            qualifications: Vec::new(),
            specialties: Vec::new(),
            educations: Vec::new(),
            company_links: Vec::new(),
            bank_accounts: Vec::new(),
        }
    }

    pub fn id(&self) -> ProfessionalId {
        self.professional.id
    }

    pub fn live_qualifications(&self) -> impl Iterator<Item = &Qualification> {
        self.qualifications
            .iter()
            .filter(|row| row.deleted_at.is_none())
    }

    pub fn live_specialties_of<'a>(
        &'a self,
        qualification_id: &'a QualificationId,
    ) -> impl Iterator<Item = &'a Specialty> + 'a {
        self.specialties.iter().filter(move |row| {
            row.deleted_at.is_none() && &row.qualification_id == qualification_id
        })
    }

    pub fn live_educations_of<'a>(
        &'a self,
        qualification_id: &'a QualificationId,
    ) -> impl Iterator<Item = &'a Education> + 'a {
        self.educations.iter().filter(move |row| {
            row.deleted_at.is_none() && &row.qualification_id == qualification_id
        })
    }

    pub fn live_company_links(&self) -> impl Iterator<Item = &CompanyLink> {
        self.company_links
            .iter()
            .filter(|row| row.deleted_at.is_none())
    }

    pub fn live_bank_accounts(&self) -> impl Iterator<Item = &BankAccount> {
        self.bank_accounts
            .iter()
            .filter(|row| row.deleted_at.is_none())
    }
}

/// Where a version came from. Only `Direct` versions apply on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSourceType {
    Direct,
    Screening,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Pending,
    Applied,
    Rejected,
}

impl VersionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VersionStatus::Pending => "pending",
            VersionStatus::Applied => "applied",
            VersionStatus::Rejected => "rejected",
        }
    }
}

/// Immutable snapshot of professional data plus its review lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfessionalVersion {
    pub id: VersionId,
    pub professional_id: ProfessionalId,
    pub version_number: u32,
    pub data_snapshot: serde_json::Value,
    pub source_type: VersionSourceType,
    pub source_id: Option<String>,
    pub status: VersionStatus,
    pub is_current: bool,
    pub rejection_reason: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PersonalInfo,
    Qualification,
    Specialty,
    Education,
    Company,
    BankAccount,
}

/// Audit record of one difference between a version and the live state it was created against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfessionalChangeDiff {
    pub id: DiffId,
    pub version_id: VersionId,
    pub change_type: ChangeType,
    pub entity_type: EntityKind,
    pub entity_id: Option<String>,
    pub field_path: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}
