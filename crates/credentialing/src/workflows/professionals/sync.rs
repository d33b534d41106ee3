//! Reconciles live rows with a snapshot by natural key.
//!
//! Entries whose natural key matches a live row update that row in place; unmatched entries
//! are validated and inserted; live rows absent from the snapshot are soft-deleted. Soft-deleted
//! rows never match, so re-adding a removed entry produces a new row. Change diffs recorded on
//! the version are not consulted here.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    BankAccount, Company, CompanyLink, CouncilRegistration, Education, EducationLevel, EntityKind,
    ProfessionalRecord, Qualification, Specialty,
};
use super::repository::ProfessionalRepository;
use super::service::ProfessionalError;
use super::snapshot::{
    BankAccountSnapshot, CompanySnapshot, EducationSnapshot, PersonalInfo, ProfessionalSnapshot,
    QualificationSnapshot, SpecialtySnapshot,
};
use crate::catalog::SpecialtyCatalog;
use crate::ids::{
    BankAccountId, CompanyId, CompanyLinkId, EducationId, QualificationId, SpecialtyId,
    SpecialtyRowId,
};
use crate::tenancy::OrganizationScope;
use crate::validation::{normalize_cnpj, normalize_cpf, normalize_email, require_text};

/// Row counts produced by one sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub soft_deleted: usize,
}

impl SyncReport {
    fn touch(&mut self, changed: bool) {
        if changed {
            self.updated += 1;
        } else {
            self.unchanged += 1;
        }
    }

    pub fn has_changes(&self) -> bool {
        self.inserted + self.updated + self.soft_deleted > 0
    }
}

pub(crate) struct SyncOutcome {
    pub(crate) report: SyncReport,
    /// Companies to upsert globally before the record is persisted.
    pub(crate) companies: Vec<Company>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EducationKey {
    level: EducationLevel,
    course_name: String,
    institution: String,
}

impl EducationKey {
    fn new(level: EducationLevel, course_name: &str, institution: &str) -> Self {
        Self {
            level,
            course_name: course_name.trim().to_lowercase(),
            institution: institution.trim().to_lowercase(),
        }
    }

    fn of(row: &Education) -> Self {
        Self::new(row.level, &row.course_name, &row.institution)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BankAccountKey {
    bank_code: String,
    agency_number: String,
    account_number: String,
}

impl BankAccountKey {
    fn new(bank_code: &str, agency_number: &str, account_number: &str) -> Self {
        let compact = |value: &str| -> String {
            value
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase()
        };
        Self {
            bank_code: compact(bank_code),
            agency_number: compact(agency_number),
            account_number: compact(account_number),
        }
    }

    fn of(row: &BankAccount) -> Self {
        Self::new(&row.bank_code, &row.agency_number, &row.account_number)
    }
}

fn assign<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn clean_optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) struct SnapshotSync<'a, R: ?Sized> {
    pub(crate) repository: &'a R,
    pub(crate) catalog: &'a SpecialtyCatalog,
    pub(crate) scope: &'a OrganizationScope,
    pub(crate) now: DateTime<Utc>,
}

impl<'a, R> SnapshotSync<'a, R>
where
    R: ProfessionalRepository + ?Sized,
{
    pub(crate) fn apply(
        &self,
        record: &mut ProfessionalRecord,
        snapshot: &ProfessionalSnapshot,
    ) -> Result<SyncOutcome, ProfessionalError> {
        let mut report = SyncReport::default();

        self.sync_personal_info(record, &snapshot.personal_info, &mut report)?;
        self.sync_qualifications(record, &snapshot.qualifications, &mut report)?;
        let companies = self.sync_companies(record, &snapshot.companies, &mut report)?;
        self.sync_bank_accounts(record, &snapshot.bank_accounts, &mut report)?;

        if report.has_changes() {
            record.professional.updated_at = self.now;
        }

        Ok(SyncOutcome { report, companies })
    }

    fn sync_personal_info(
        &self,
        record: &mut ProfessionalRecord,
        info: &PersonalInfo,
        report: &mut SyncReport,
    ) -> Result<(), ProfessionalError> {
        let full_name = require_text("full_name", &info.full_name)?;
        let cpf = normalize_cpf(&info.cpf)?;
        let email = clean_optional(&info.email)
            .map(|email| normalize_email(&email))
            .transpose()?;
        let phone = clean_optional(&info.phone);

        let professional = &mut record.professional;

        if let Some(existing) =
            self.repository
                .find_by_cpf(self.scope, &cpf, Some(&professional.id))?
        {
            return Err(ProfessionalError::DuplicateCpf {
                cpf,
                existing: existing.id,
            });
        }

        if let Some(email) = email.as_deref() {
            if let Some(existing) =
                self.repository
                    .find_by_email(self.scope, email, Some(&professional.id))?
            {
                return Err(ProfessionalError::DuplicateEmail {
                    email: email.to_string(),
                    existing: existing.id,
                });
            }
        }

        let changed = assign(&mut professional.full_name, full_name)
            | assign(&mut professional.cpf, cpf)
            | assign(&mut professional.email, email)
            | assign(&mut professional.phone, phone)
            | assign(&mut professional.birth_date, info.birth_date);
        report.touch(changed);
        Ok(())
    }

    fn sync_qualifications(
        &self,
        record: &mut ProfessionalRecord,
        entries: &[QualificationSnapshot],
        report: &mut SyncReport,
    ) -> Result<(), ProfessionalError> {
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            require_text("council_type", &entry.council_type)?;
            require_text("council_number", &entry.council_number)?;
            require_text("council_state", &entry.council_state)?;
            let key = CouncilRegistration::new(
                &entry.council_type,
                &entry.council_number,
                &entry.council_state,
            );
            if keys.contains(&key) {
                return Err(ProfessionalError::DuplicateNaturalKey {
                    entity: EntityKind::Qualification,
                    key: key.to_string(),
                });
            }
            keys.push(key);
        }

        let mut kept = Vec::with_capacity(entries.len());

        for (entry, key) in entries.iter().zip(keys) {
            let existing = record
                .qualifications
                .iter()
                .position(|row| row.deleted_at.is_none() && row.registration() == key);

            let qualification_id = match existing {
                Some(index) => {
                    let row = &mut record.qualifications[index];
                    let changed = assign(&mut row.professional_type, entry.professional_type)
                        | assign(&mut row.is_primary, entry.is_primary)
                        | assign(&mut row.graduation_year, entry.graduation_year);
                    if changed {
                        row.updated_at = self.now;
                    }
                    report.touch(changed);
                    row.id
                }
                None => {
                    if let Some((owner, _)) =
                        self.repository
                            .find_council_registration(self.scope, &key, None)?
                    {
                        if owner != record.id() {
                            return Err(ProfessionalError::DuplicateCouncilRegistration {
                                registration: key,
                                owner,
                            });
                        }
                    }

                    let row = Qualification {
                        id: QualificationId::new(),
                        professional_id: record.id(),
                        professional_type: entry.professional_type,
                        council_type: key.council_type,
                        council_number: key.council_number,
                        council_state: key.council_state,
                        is_primary: entry.is_primary,
                        graduation_year: entry.graduation_year,
                        created_at: self.now,
                        updated_at: self.now,
                        deleted_at: None,
                    };
                    let id = row.id;
                    record.qualifications.push(row);
                    report.inserted += 1;
                    id
                }
            };

            self.sync_specialties(record, qualification_id, &entry.specialties, report)?;
            self.sync_educations(record, qualification_id, &entry.educations, report)?;
            kept.push(qualification_id);
        }

        let mut reaped = Vec::new();
        for row in record
            .qualifications
            .iter_mut()
            .filter(|row| row.deleted_at.is_none() && !kept.contains(&row.id))
        {
            row.deleted_at = Some(self.now);
            reaped.push(row.id);
            report.soft_deleted += 1;
        }

        // children of a removed qualification go with it
        for row in record
            .specialties
            .iter_mut()
            .filter(|row| row.deleted_at.is_none() && reaped.contains(&row.qualification_id))
        {
            row.deleted_at = Some(self.now);
            report.soft_deleted += 1;
        }
        for row in record
            .educations
            .iter_mut()
            .filter(|row| row.deleted_at.is_none() && reaped.contains(&row.qualification_id))
        {
            row.deleted_at = Some(self.now);
            report.soft_deleted += 1;
        }

        Ok(())
    }

    fn sync_specialties(
        &self,
        record: &mut ProfessionalRecord,
        qualification_id: QualificationId,
        entries: &[SpecialtySnapshot],
        report: &mut SyncReport,
    ) -> Result<(), ProfessionalError> {
        let mut seen: BTreeSet<SpecialtyId> = BTreeSet::new();
        for entry in entries {
            if !seen.insert(entry.specialty_id) {
                return Err(ProfessionalError::DuplicateNaturalKey {
                    entity: EntityKind::Specialty,
                    key: entry.specialty_id.to_string(),
                });
            }
        }

        for entry in entries {
            let rqe_number = clean_optional(&entry.rqe_number);
            let existing = record.specialties.iter().position(|row| {
                row.deleted_at.is_none()
                    && row.qualification_id == qualification_id
                    && row.specialty_id == entry.specialty_id
            });

            match existing {
                Some(index) => {
                    let row = &mut record.specialties[index];
                    let changed = assign(&mut row.rqe_number, rqe_number);
                    if changed {
                        row.updated_at = self.now;
                    }
                    report.touch(changed);
                }
                None => {
                    if !self.catalog.contains(&entry.specialty_id) {
                        return Err(ProfessionalError::UnknownSpecialty(entry.specialty_id));
                    }
                    record.specialties.push(Specialty {
                        id: SpecialtyRowId::new(),
                        qualification_id,
                        specialty_id: entry.specialty_id,
                        rqe_number,
                        created_at: self.now,
                        updated_at: self.now,
                        deleted_at: None,
                    });
                    report.inserted += 1;
                }
            }
        }

        for row in record.specialties.iter_mut().filter(|row| {
            row.deleted_at.is_none()
                && row.qualification_id == qualification_id
                && !seen.contains(&row.specialty_id)
        }) {
            row.deleted_at = Some(self.now);
            report.soft_deleted += 1;
        }

        Ok(())
    }

    fn sync_educations(
        &self,
        record: &mut ProfessionalRecord,
        qualification_id: QualificationId,
        entries: &[EducationSnapshot],
        report: &mut SyncReport,
    ) -> Result<(), ProfessionalError> {
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            require_text("course_name", &entry.course_name)?;
            require_text("institution", &entry.institution)?;
            let key = EducationKey::new(entry.level, &entry.course_name, &entry.institution);
            if keys.contains(&key) {
                return Err(ProfessionalError::DuplicateNaturalKey {
                    entity: EntityKind::Education,
                    key: format!("{:?} {} @ {}", key.level, key.course_name, key.institution),
                });
            }
            keys.push(key);
        }

        for (entry, key) in entries.iter().zip(&keys) {
            let existing = record.educations.iter().position(|row| {
                row.deleted_at.is_none()
                    && row.qualification_id == qualification_id
                    && EducationKey::of(row) == *key
            });

            match existing {
                Some(index) => {
                    let row = &mut record.educations[index];
                    let changed = assign(&mut row.course_name, entry.course_name.trim().to_string())
                        | assign(&mut row.institution, entry.institution.trim().to_string())
                        | assign(&mut row.start_year, entry.start_year)
                        | assign(&mut row.end_year, entry.end_year)
                        | assign(&mut row.is_completed, entry.is_completed);
                    if changed {
                        row.updated_at = self.now;
                    }
                    report.touch(changed);
                }
                None => {
                    record.educations.push(Education {
                        id: EducationId::new(),
                        qualification_id,
                        level: entry.level,
                        course_name: entry.course_name.trim().to_string(),
                        institution: entry.institution.trim().to_string(),
                        start_year: entry.start_year,
                        end_year: entry.end_year,
                        is_completed: entry.is_completed,
                        created_at: self.now,
                        updated_at: self.now,
                        deleted_at: None,
                    });
                    report.inserted += 1;
                }
            }
        }

        for row in record.educations.iter_mut().filter(|row| {
            row.deleted_at.is_none()
                && row.qualification_id == qualification_id
                && !keys.contains(&EducationKey::of(row))
        }) {
            row.deleted_at = Some(self.now);
            report.soft_deleted += 1;
        }

        Ok(())
    }

    fn sync_companies(
        &self,
        record: &mut ProfessionalRecord,
        entries: &[CompanySnapshot],
        report: &mut SyncReport,
    ) -> Result<Vec<Company>, ProfessionalError> {
        let mut seen = BTreeSet::new();
        let mut upserts = Vec::new();
        let mut kept: Vec<CompanyId> = Vec::with_capacity(entries.len());

        for entry in entries {
            let cnpj = normalize_cnpj(&entry.cnpj)?;
            if !seen.insert(cnpj.clone()) {
                return Err(ProfessionalError::DuplicateNaturalKey {
                    entity: EntityKind::Company,
                    key: cnpj,
                });
            }
            let legal_name = require_text("legal_name", &entry.legal_name)?;
            let trade_name = clean_optional(&entry.trade_name);

            let (company, changed) = match self.repository.company_by_cnpj(&cnpj)? {
                Some(mut existing) => {
                    let changed = assign(&mut existing.legal_name, legal_name)
                        | assign(&mut existing.trade_name, trade_name);
                    if changed {
                        existing.updated_at = self.now;
                        upserts.push(existing.clone());
                    }
                    (existing, changed)
                }
                None => {
                    let company = Company {
                        id: CompanyId::new(),
                        cnpj,
                        legal_name,
                        trade_name,
                        created_at: self.now,
                        updated_at: self.now,
                    };
                    upserts.push(company.clone());
                    (company, true)
                }
            };

            let linked = record
                .company_links
                .iter()
                .any(|link| link.deleted_at.is_none() && link.company_id == company.id);
            if linked {
                report.touch(changed);
            } else {
                record.company_links.push(CompanyLink {
                    id: CompanyLinkId::new(),
                    professional_id: record.professional.id,
                    company_id: company.id,
                    created_at: self.now,
                    deleted_at: None,
                });
                report.inserted += 1;
            }
            kept.push(company.id);
        }

        for link in record
            .company_links
            .iter_mut()
            .filter(|link| link.deleted_at.is_none() && !kept.contains(&link.company_id))
        {
            link.deleted_at = Some(self.now);
            report.soft_deleted += 1;
        }

        Ok(upserts)
    }

    fn sync_bank_accounts(
        &self,
        record: &mut ProfessionalRecord,
        entries: &[BankAccountSnapshot],
        report: &mut SyncReport,
    ) -> Result<(), ProfessionalError> {
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            require_text("bank_code", &entry.bank_code)?;
            require_text("agency_number", &entry.agency_number)?;
            require_text("account_number", &entry.account_number)?;
            let key = BankAccountKey::new(
                &entry.bank_code,
                &entry.agency_number,
                &entry.account_number,
            );
            if keys.contains(&key) {
                return Err(ProfessionalError::DuplicateNaturalKey {
                    entity: EntityKind::BankAccount,
                    key: format!(
                        "{} {} {}",
                        key.bank_code, key.agency_number, key.account_number
                    ),
                });
            }
            keys.push(key);
        }

        for (entry, key) in entries.iter().zip(&keys) {
            let bank_name = clean_optional(&entry.bank_name);
            let pix_key = clean_optional(&entry.pix_key);
            let existing = record
                .bank_accounts
                .iter()
                .position(|row| row.deleted_at.is_none() && BankAccountKey::of(row) == *key);

            match existing {
                Some(index) => {
                    let row = &mut record.bank_accounts[index];
                    let changed = assign(&mut row.bank_name, bank_name)
                        | assign(&mut row.account_type, entry.account_type)
                        | assign(&mut row.pix_key, pix_key)
                        | assign(&mut row.is_primary, entry.is_primary);
                    if changed {
                        row.updated_at = self.now;
                    }
                    report.touch(changed);
                }
                None => {
                    record.bank_accounts.push(BankAccount {
                        id: BankAccountId::new(),
                        professional_id: record.professional.id,
                        bank_code: key.bank_code.clone(),
                        bank_name,
                        agency_number: key.agency_number.clone(),
                        account_number: key.account_number.clone(),
                        account_type: entry.account_type,
                        pix_key,
                        is_primary: entry.is_primary,
                        created_at: self.now,
                        updated_at: self.now,
                        deleted_at: None,
                    });
                    report.inserted += 1;
                }
            }
        }

        for row in record
            .bank_accounts
            .iter_mut()
            .filter(|row| row.deleted_at.is_none() && !keys.contains(&BankAccountKey::of(row)))
        {
            row.deleted_at = Some(self.now);
            report.soft_deleted += 1;
        }

        Ok(())
    }
}
