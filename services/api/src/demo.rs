use crate::infra::Services;
use chrono::Utc;
use clap::Args;
use credentialing::catalog::{CatalogSpecialty, SpecialtyCatalog};
use credentialing::config::ScreeningConfig;
use credentialing::error::AppError;
use credentialing::ids::{OrganizationId, SpecialtyId, UserId};
use credentialing::tenancy::{Organization, OrganizationDirectory, OrganizationSettings};
use credentialing::workflows::professionals::{
    AccountType, BankAccountSnapshot, CompanySnapshot, EducationLevel, EducationSnapshot,
    PersonalInfo, ProfessionalError, ProfessionalSnapshot, ProfessionalType,
    QualificationSnapshot, SpecialtySnapshot,
};
use credentialing::workflows::screening::{
    DocumentRequirement, NewScreeningProcess, PaymentInfo, ScreeningError, ScreeningProcess,
    StepOutcome, StepType,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEMO_CPF: &str = "529.982.247-25";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reject the diploma during review to show the correction loop
    #[arg(long)]
    pub(crate) with_correction: bool,
    /// Run the demo organization without the client validation step
    #[arg(long)]
    pub(crate) skip_client_validation: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CatalogCheckArgs {
    /// Specialty CSV with `id,name,professional_type` columns
    #[arg(long)]
    pub(crate) path: PathBuf,
}

pub(crate) fn run_catalog_check(args: CatalogCheckArgs) -> Result<(), AppError> {
    let catalog = SpecialtyCatalog::from_path(&args.path)?;

    let mut by_type: BTreeMap<ProfessionalType, usize> = BTreeMap::new();
    for entry in catalog.entries() {
        *by_type.entry(entry.professional_type).or_default() += 1;
    }

    println!("{}: {} specialties", args.path.display(), catalog.len());
    for (professional_type, count) in by_type {
        println!("  {:<20} {}", professional_type.label(), count);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let cardiology = SpecialtyId::new();
    let catalog = SpecialtyCatalog::new(vec![CatalogSpecialty {
        id: cardiology,
        name: "Cardiology".to_string(),
        professional_type: ProfessionalType::Doctor,
    }]);
    let services = Services::in_memory(catalog, ScreeningConfig::default());
    let staff = UserId::new("demo-recruiter");

    let organization = services
        .organizations
        .insert(Organization {
            id: OrganizationId::new(),
            name: "Hospital Central".to_string(),
            parent_id: None,
            settings: OrganizationSettings {
                client_validation_enabled: !args.skip_client_validation,
                token_ttl_hours: None,
            },
            created_at: Utc::now(),
        })
        .map_err(ProfessionalError::from)?;

    println!("Screening demo for {}", organization.name);
    let screenings = &services.screenings;

    let process = screenings.create(
        NewScreeningProcess {
            organization_id: organization.id,
            professional_name: "Ana Souza".to_string(),
            professional_cpf: DEMO_CPF.to_string(),
            professional_email: Some("ana.souza@example.com".to_string()),
            professional_phone: None,
            step_types: None,
            optional_steps: Vec::new(),
            expected_professional_type: Some(ProfessionalType::Doctor),
            expected_specialty_id: Some(cardiology),
            supervisor_id: None,
            required_documents: vec![
                DocumentRequirement {
                    document_type: "rg".to_string(),
                    is_required: true,
                },
                DocumentRequirement {
                    document_type: "diploma".to_string(),
                    is_required: true,
                },
            ],
        },
        &staff,
    )?;
    render_progress("created", &process);

    let process =
        screenings.complete_conversation(&process.id, StepOutcome::Approve, None, &staff)?;
    render_progress("conversation approved", &process);

    let process =
        screenings.complete_professional_data(&process.id, demo_snapshot(cardiology), &staff)?;
    render_progress("professional data recorded", &process);

    let token = process.access_token.clone();
    let documents: Vec<_> = process
        .required_documents
        .iter()
        .map(|document| (document.id, document.document_type.clone()))
        .collect();
    for (document_id, document_type) in &documents {
        screenings.upload_with_token(
            &token,
            document_id,
            &format!("uploads/{document_type}.pdf"),
            Utc::now(),
        )?;
    }
    let process = screenings.complete_document_upload(&process.id, &staff)?;
    render_progress("documents uploaded", &process);

    for (document_id, document_type) in &documents {
        let reject = args.with_correction && document_type == "diploma";
        let (decision, note) = if reject {
            (StepOutcome::Reject, Some("scan is illegible".to_string()))
        } else {
            (StepOutcome::Approve, None)
        };
        screenings.review_document(&process.id, document_id, decision, note, &staff)?;
    }

    let process = match screenings.complete_document_review(&process.id, &staff) {
        Ok(process) => process,
        Err(ScreeningError::DocumentsRejected { rejected }) => {
            println!("  {} document(s) sent back for correction", rejected.len());
            for document_id in &rejected {
                screenings.upload_with_token(
                    &token,
                    document_id,
                    "uploads/diploma-rescan.pdf",
                    Utc::now(),
                )?;
            }
            screenings.complete_document_upload(&process.id, &staff)?;
            for document_id in &rejected {
                screenings.review_document(
                    &process.id,
                    document_id,
                    StepOutcome::Approve,
                    None,
                    &staff,
                )?;
            }
            screenings.complete_document_review(&process.id, &staff)?
        }
        Err(err) => return Err(err.into()),
    };
    render_progress("documents reviewed", &process);

    let process = screenings.complete_payment_info(&process.id, demo_payment(), &staff)?;
    render_progress("payment info recorded", &process);

    let process = if process.configured_step_types.contains(&StepType::ClientValidation) {
        let process = screenings.complete_client_validation(
            &process.id,
            StepOutcome::Approve,
            Some("approved by the client".to_string()),
            &staff,
        )?;
        render_progress("client validation approved", &process);
        process
    } else {
        process
    };

    println!("\nFinal status: {}", process.status.label());
    println!("Steps:");
    for step in &process.steps {
        println!(
            "  {}. {:<18} {}",
            step.order,
            step.step_type.label(),
            step.status.label()
        );
    }

    if let Some(professional_id) = process.professional_id {
        let record = services.professionals.get(&professional_id)?;
        println!(
            "\nProfessional {} ({}): {} qualification(s), {} bank account(s), {} company link(s)",
            record.professional.full_name,
            record.professional.cpf,
            record.live_qualifications().count(),
            record.live_bank_accounts().count(),
            record.live_company_links().count()
        );
        println!("Versions:");
        for version in services.professionals.versions(&professional_id)? {
            println!(
                "  v{} {:<9} current={} source={:?}",
                version.version_number,
                version.status.label(),
                version.is_current,
                version.source_type
            );
        }
    }

    println!("Notifications:");
    for template in services.notifier.templates() {
        println!("  {template}");
    }

    Ok(())
}

fn render_progress(label: &str, process: &ScreeningProcess) {
    println!(
        "- {:<28} status={:<11} current={}",
        label,
        process.status.label(),
        process.current_step_type.label()
    );
}

fn demo_snapshot(cardiology: SpecialtyId) -> ProfessionalSnapshot {
    ProfessionalSnapshot {
        personal_info: PersonalInfo {
            full_name: "Ana Souza".to_string(),
            cpf: DEMO_CPF.to_string(),
            email: Some("ana.souza@example.com".to_string()),
            phone: Some("+55 11 98888-0000".to_string()),
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
                specialty_id: cardiology,
                rqe_number: Some("98765".to_string()),
            }],
            educations: vec![EducationSnapshot {
                id: None,
                level: EducationLevel::Undergraduate,
                course_name: "Medicine".to_string(),
                institution: "Universidade de Sao Paulo".to_string(),
                start_year: Some(2006),
                end_year: Some(2012),
                is_completed: true,
            }],
        }],
        companies: Vec::new(),
        bank_accounts: Vec::new(),
    }
}

fn demo_payment() -> PaymentInfo {
    PaymentInfo {
        bank_accounts: vec![BankAccountSnapshot {
            id: None,
            bank_code: "001".to_string(),
            bank_name: Some("Banco do Brasil".to_string()),
            agency_number: "1234".to_string(),
            account_number: "56789-0".to_string(),
            account_type: AccountType::Checking,
            pix_key: Some("ana.souza@example.com".to_string()),
            is_primary: true,
        }],
        companies: vec![CompanySnapshot {
            id: None,
            cnpj: "11.222.333/0001-81".to_string(),
            legal_name: "Souza Servicos Medicos Ltda".to_string(),
            trade_name: Some("Clinica Souza".to_string()),
        }],
    }
}
