use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    AccountType, Company, EducationLevel, ProfessionalRecord, ProfessionalType,
};
use crate::ids::{
    BankAccountId, CompanyId, EducationId, QualificationId, SpecialtyId, SpecialtyRowId,
};

/// Nested document stored on a version. Entries carry the row `id` they were captured from;
/// entries without one are new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionalSnapshot {
    pub personal_info: PersonalInfo,
    #[serde(default)]
    pub qualifications: Vec<QualificationSnapshot>,
    #[serde(default)]
    pub companies: Vec<CompanySnapshot>,
    #[serde(default)]
    pub bank_accounts: Vec<BankAccountSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub full_name: String,
    pub cpf: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QualificationId>,
    pub professional_type: ProfessionalType,
    pub council_type: String,
    pub council_number: String,
    pub council_state: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub specialties: Vec<SpecialtySnapshot>,
    #[serde(default)]
    pub educations: Vec<EducationSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialtySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SpecialtyRowId>,
    pub specialty_id: SpecialtyId,
    #[serde(default)]
    pub rqe_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EducationId>,
    pub level: EducationLevel,
    pub course_name: String,
    pub institution: String,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CompanyId>,
    pub cnpj: String,
    pub legal_name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BankAccountId>,
    pub bank_code: String,
    #[serde(default)]
    pub bank_name: Option<String>,
    pub agency_number: String,
    pub account_number: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub pix_key: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl ProfessionalSnapshot {
    /// Captures the live (not soft-deleted) state of a professional.
    pub fn capture(record: &ProfessionalRecord, companies: &BTreeMap<CompanyId, Company>) -> Self {
        let professional = &record.professional;

        let qualifications = record
            .live_qualifications()
            .map(|qualification| QualificationSnapshot {
                id: Some(qualification.id),
                professional_type: qualification.professional_type,
                council_type: qualification.council_type.clone(),
                council_number: qualification.council_number.clone(),
                council_state: qualification.council_state.clone(),
                is_primary: qualification.is_primary,
                graduation_year: qualification.graduation_year,
                specialties: record
                    .live_specialties_of(&qualification.id)
                    .map(|specialty| SpecialtySnapshot {
                        id: Some(specialty.id),
                        specialty_id: specialty.specialty_id,
                        rqe_number: specialty.rqe_number.clone(),
                    })
                    .collect(),
                educations: record
                    .live_educations_of(&qualification.id)
                    .map(|education| EducationSnapshot {
                        id: Some(education.id),
                        level: education.level,
                        course_name: education.course_name.clone(),
                        institution: education.institution.clone(),
                        start_year: education.start_year,
                        end_year: education.end_year,
                        is_completed: education.is_completed,
                    })
                    .collect(),
            })
            .collect();

        let companies = record
            .live_company_links()
            .filter_map(|link| companies.get(&link.company_id))
            .map(|company| CompanySnapshot {
                id: Some(company.id),
                cnpj: company.cnpj.clone(),
                legal_name: company.legal_name.clone(),
                trade_name: company.trade_name.clone(),
            })
            .collect();

        let bank_accounts = record
            .live_bank_accounts()
            .map(|account| BankAccountSnapshot {
                id: Some(account.id),
                bank_code: account.bank_code.clone(),
                bank_name: account.bank_name.clone(),
                agency_number: account.agency_number.clone(),
                account_number: account.account_number.clone(),
                account_type: account.account_type,
                pix_key: account.pix_key.clone(),
                is_primary: account.is_primary,
            })
            .collect();

        Self {
            personal_info: PersonalInfo {
                full_name: professional.full_name.clone(),
                cpf: professional.cpf.clone(),
                email: professional.email.clone(),
                phone: professional.phone.clone(),
                birth_date: professional.birth_date,
            },
            qualifications,
            companies,
            bank_accounts,
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}
