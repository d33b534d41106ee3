use std::sync::Arc;

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::catalog::{CatalogSpecialty, SpecialtyCatalog};
use crate::ids::{OrganizationId, SpecialtyId, UserId};
use crate::storage::memory::{InMemoryOrganizationDirectory, InMemoryProfessionalRepository};
use crate::tenancy::{Organization, OrganizationDirectory, OrganizationSettings};
use crate::workflows::professionals::{
    AccountType, BankAccountSnapshot, CompanySnapshot, EducationLevel, EducationSnapshot,
    NewProfessional, NewVersion, PersonalInfo, ProfessionalRecord, ProfessionalService,
    ProfessionalSnapshot, ProfessionalType, QualificationSnapshot, SpecialtySnapshot,
    VersionSourceType,
};

pub(super) type Service =
    ProfessionalService<InMemoryProfessionalRepository, InMemoryOrganizationDirectory>;

pub(super) struct Fixture {
    pub(super) service: Arc<Service>,
    pub(super) repository: InMemoryProfessionalRepository,
    pub(super) directory: InMemoryOrganizationDirectory,
    pub(super) cardiology: SpecialtyId,
    pub(super) dermatology: SpecialtyId,
}

pub(super) fn actor() -> UserId {
    UserId::new("staff-1")
}

pub(super) fn fixture() -> Fixture {
    let cardiology = SpecialtyId::new();
    let dermatology = SpecialtyId::new();
    let catalog = SpecialtyCatalog::new(vec![
        CatalogSpecialty {
            id: cardiology,
            name: "Cardiology".to_string(),
            professional_type: ProfessionalType::Doctor,
        },
        CatalogSpecialty {
            id: dermatology,
            name: "Dermatology".to_string(),
            professional_type: ProfessionalType::Doctor,
        },
    ]);

    let repository = InMemoryProfessionalRepository::default();
    let directory = InMemoryOrganizationDirectory::default();
    let service = Arc::new(ProfessionalService::new(
        Arc::new(repository.clone()),
        Arc::new(directory.clone()),
        Arc::new(catalog),
    ));

    Fixture {
        service,
        repository,
        directory,
        cardiology,
        dermatology,
    }
}

impl Fixture {
    pub(super) fn organization(&self, name: &str, parent: Option<OrganizationId>) -> Organization {
        self.directory
            .insert(Organization {
                id: OrganizationId::new(),
                name: name.to_string(),
                parent_id: parent,
                settings: OrganizationSettings::default(),
                created_at: Utc::now(),
            })
            .expect("organization stored")
    }

    pub(super) fn register(&self, organization: &Organization, cpf: &str) -> ProfessionalRecord {
        self.service
            .register(new_professional(organization.id, cpf), &actor())
            .expect("professional registered")
    }

    /// Applies `snapshot` through a direct version and returns the refreshed record.
    pub(super) fn apply(&self, record: &ProfessionalRecord, snapshot: ProfessionalSnapshot) -> ProfessionalRecord {
        self.service
            .create_version(NewVersion {
                professional_id: record.id(),
                snapshot,
                source_type: VersionSourceType::Direct,
                source_id: None,
                created_by: actor(),
            })
            .expect("version applied");
        self.service.get(&record.id()).expect("record")
    }
}

pub(super) fn new_professional(organization_id: OrganizationId, cpf: &str) -> NewProfessional {
    NewProfessional {
        organization_id,
        full_name: "Ana Souza".to_string(),
        cpf: cpf.to_string(),
        email: None,
        phone: None,
        birth_date: None,
    }
}

pub(super) fn personal_info(cpf: &str) -> PersonalInfo {
    PersonalInfo {
        full_name: "Ana Souza".to_string(),
        cpf: cpf.to_string(),
        email: None,
        phone: None,
        birth_date: None,
    }
}

pub(super) fn qualification(number: &str, specialties: &[SpecialtyId]) -> QualificationSnapshot {
    QualificationSnapshot {
        id: None,
        professional_type: ProfessionalType::Doctor,
        council_type: "CRM".to_string(),
        council_number: number.to_string(),
        council_state: "SP".to_string(),
        is_primary: true,
        graduation_year: Some(2012),
        specialties: specialties
            .iter()
            .map(|specialty_id| SpecialtySnapshot {
                id: None,
                specialty_id: *specialty_id,
                rqe_number: None,
            })
            .collect(),
        educations: vec![EducationSnapshot {
            id: None,
            level: EducationLevel::Undergraduate,
            course_name: "Medicine".to_string(),
            institution: "USP".to_string(),
            start_year: Some(2006),
            end_year: Some(2012),
            is_completed: true,
        }],
    }
}

pub(super) fn company(cnpj: &str) -> CompanySnapshot {
    CompanySnapshot {
        id: None,
        cnpj: cnpj.to_string(),
        legal_name: "Souza Servicos Medicos Ltda".to_string(),
        trade_name: None,
    }
}

pub(super) fn bank_account(account_number: &str, is_primary: bool) -> BankAccountSnapshot {
    BankAccountSnapshot {
        id: None,
        bank_code: "001".to_string(),
        bank_name: Some("Banco do Brasil".to_string()),
        agency_number: "1234".to_string(),
        account_number: account_number.to_string(),
        account_type: AccountType::Checking,
        pix_key: None,
        is_primary,
    }
}

pub(super) fn full_snapshot(fixture: &Fixture, cpf: &str) -> ProfessionalSnapshot {
    ProfessionalSnapshot {
        personal_info: personal_info(cpf),
        qualifications: vec![qualification("123456", &[fixture.cardiology])],
        companies: vec![company("11222333000181")],
        bank_accounts: vec![bank_account("98765-4", true)],
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
