use std::sync::Arc;

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::catalog::{CatalogSpecialty, SpecialtyCatalog};
use crate::config::ScreeningConfig;
use crate::ids::{DocumentId, OrganizationId, SpecialtyId, UserId};
use crate::storage::memory::{
    InMemoryNotifier, InMemoryOrganizationDirectory, InMemoryProfessionalRepository,
    InMemoryScreeningRepository,
};
use crate::tenancy::{Organization, OrganizationDirectory, OrganizationSettings};
use crate::workflows::professionals::{
    AccountType, BankAccountSnapshot, CompanySnapshot, PersonalInfo, ProfessionalService,
    ProfessionalSnapshot, ProfessionalType, QualificationSnapshot, SpecialtySnapshot,
};
use crate::workflows::screening::{
    DocumentRequirement, NewScreeningProcess, PaymentInfo, ScreeningProcess, ScreeningService,
    StepStatus, StepType,
};

pub(super) type Professionals =
    ProfessionalService<InMemoryProfessionalRepository, InMemoryOrganizationDirectory>;
pub(super) type Service = ScreeningService<
    InMemoryScreeningRepository,
    InMemoryProfessionalRepository,
    InMemoryOrganizationDirectory,
    InMemoryNotifier,
>;

pub(super) const CPF: &str = "52998224725";

pub(super) struct Fixture {
    pub(super) service: Arc<Service>,
    pub(super) professionals: Arc<Professionals>,
    pub(super) directory: InMemoryOrganizationDirectory,
    pub(super) notifier: InMemoryNotifier,
    pub(super) organization: Organization,
    pub(super) cardiology: SpecialtyId,
}

pub(super) fn staff() -> UserId {
    UserId::new("recruiter-1")
}

pub(super) fn fixture() -> Fixture {
    fixture_with(OrganizationSettings::default())
}

pub(super) fn fixture_with(settings: OrganizationSettings) -> Fixture {
    let cardiology = SpecialtyId::new();
    let catalog = SpecialtyCatalog::new(vec![CatalogSpecialty {
        id: cardiology,
        name: "Cardiology".to_string(),
        professional_type: ProfessionalType::Doctor,
    }]);

    let directory = InMemoryOrganizationDirectory::default();
    let notifier = InMemoryNotifier::default();
    let professionals = Arc::new(ProfessionalService::new(
        Arc::new(InMemoryProfessionalRepository::default()),
        Arc::new(directory.clone()),
        Arc::new(catalog),
    ));
    let service = Arc::new(ScreeningService::new(
        Arc::new(InMemoryScreeningRepository::default()),
        professionals.clone(),
        Arc::new(notifier.clone()),
        ScreeningConfig::default(),
    ));

    let organization = organization(&directory, "Clinic", settings);

    Fixture {
        service,
        professionals,
        directory,
        notifier,
        organization,
        cardiology,
    }
}

pub(super) fn organization(
    directory: &InMemoryOrganizationDirectory,
    name: &str,
    settings: OrganizationSettings,
) -> Organization {
    directory
        .insert(Organization {
            id: OrganizationId::new(),
            name: name.to_string(),
            parent_id: None,
            settings,
            created_at: Utc::now(),
        })
        .expect("organization stored")
}

pub(super) fn request(organization_id: OrganizationId, steps: Option<&[StepType]>) -> NewScreeningProcess {
    NewScreeningProcess {
        organization_id,
        professional_name: "Ana Souza".to_string(),
        professional_cpf: "529.982.247-25".to_string(),
        professional_email: Some("ana@example.com".to_string()),
        professional_phone: None,
        step_types: steps.map(<[StepType]>::to_vec),
        optional_steps: Vec::new(),
        expected_professional_type: None,
        expected_specialty_id: None,
        supervisor_id: None,
        required_documents: vec![
            DocumentRequirement {
                document_type: "RG".to_string(),
                is_required: true,
            },
            DocumentRequirement {
                document_type: "diploma".to_string(),
                is_required: true,
            },
        ],
    }
}

pub(super) fn data_snapshot(fixture: &Fixture) -> ProfessionalSnapshot {
    ProfessionalSnapshot {
        personal_info: PersonalInfo {
            full_name: "Ana Souza".to_string(),
            cpf: CPF.to_string(),
            email: Some("ana@example.com".to_string()),
            phone: None,
            birth_date: None,
        },
        qualifications: vec![QualificationSnapshot {
            id: None,
            professional_type: ProfessionalType::Doctor,
            council_type: "CRM".to_string(),
            council_number: "123456".to_string(),
            council_state: "SP".to_string(),
            is_primary: true,
            graduation_year: Some(2012),
            specialties: vec![SpecialtySnapshot {
                id: None,
                specialty_id: fixture.cardiology,
                rqe_number: None,
            }],
            educations: Vec::new(),
        }],
        companies: Vec::new(),
        bank_accounts: Vec::new(),
    }
}

pub(super) fn bank_account(account_number: &str, is_primary: bool) -> BankAccountSnapshot {
    BankAccountSnapshot {
        id: None,
        bank_code: "341".to_string(),
        bank_name: Some("Itau".to_string()),
        agency_number: "0001".to_string(),
        account_number: account_number.to_string(),
        account_type: AccountType::Checking,
        pix_key: None,
        is_primary,
    }
}

pub(super) fn payment() -> PaymentInfo {
    PaymentInfo {
        bank_accounts: vec![bank_account("12345-6", true)],
        companies: vec![CompanySnapshot {
            id: None,
            cnpj: "11.222.333/0001-81".to_string(),
            legal_name: "Souza Servicos Medicos Ltda".to_string(),
            trade_name: None,
        }],
    }
}

pub(super) fn document_id(process: &ScreeningProcess, document_type: &str) -> DocumentId {
    process
        .required_documents
        .iter()
        .find(|document| document.document_type == document_type)
        .map(|document| document.id)
        .expect("document configured")
}

/// Structural rules that must hold after every transition.
pub(super) fn assert_invariants(process: &ScreeningProcess) {
    assert!(process
        .configured_step_types
        .contains(&process.current_step_type));
    assert_eq!(process.steps.len(), process.configured_step_types.len());

    let in_progress = process
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::InProgress)
        .count();
    assert!(in_progress <= 1, "more than one step in progress");

    if process.is_terminal() {
        assert_eq!(in_progress, 0, "terminal process with a step in progress");
        assert!(process.completed_at.is_some());
    } else {
        let current = process.current_step().expect("current step exists");
        assert!(current.status.is_open(), "current step is not open");
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
