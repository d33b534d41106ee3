use super::common::*;

use crate::ids::OrganizationId;
use crate::workflows::professionals::{
    ChangeType, EntityKind, NewProfessional, NewVersion, PersonalInfoPatch, ProfessionalError,
    ProfessionalSnapshot, VersionSourceType, VersionStatus,
};

const CPF: &str = "52998224725";

#[test]
fn register_records_an_applied_initial_version() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, "529.982.247-25");

    assert_eq!(record.professional.cpf, CPF);
    let versions = fixture.service.versions(&record.id()).expect("versions");
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_number, 1);
    assert_eq!(versions[0].status, VersionStatus::Applied);
    assert!(versions[0].is_current);
}

#[test]
fn cpf_is_unique_within_the_family_but_not_across_tenants() {
    let fixture = fixture();
    let parent = fixture.organization("Group", None);
    let child = fixture.organization("Branch", Some(parent.id));
    let other = fixture.organization("Other", None);

    let first = fixture.register(&parent, CPF);

    let error = fixture
        .service
        .register(new_professional(child.id, CPF), &actor())
        .expect_err("duplicate within family");
    match error {
        ProfessionalError::DuplicateCpf { existing, .. } => assert_eq!(existing, first.id()),
        other => panic!("unexpected error: {other:?}"),
    }

    fixture
        .service
        .register(new_professional(other.id, CPF), &actor())
        .expect("other tenant may reuse the cpf");

    let found = fixture
        .service
        .find_by_cpf(&child.id, CPF)
        .expect("lookup")
        .expect("found through family");
    assert_eq!(found.id(), first.id());
}

#[test]
fn register_rejects_invalid_cpf_and_unknown_organization() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);

    let invalid = fixture
        .service
        .register(new_professional(org.id, "11111111111"), &actor())
        .expect_err("invalid cpf");
    assert!(matches!(invalid, ProfessionalError::Validation(_)));

    let missing = fixture
        .service
        .register(new_professional(crate::ids::OrganizationId::new(), CPF), &actor())
        .expect_err("unknown organization");
    assert!(matches!(missing, ProfessionalError::UnknownOrganization(_)));
}

#[test]
fn find_or_register_reuses_the_existing_professional() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let first = fixture
        .service
        .find_or_register(new_professional(org.id, CPF), &actor())
        .expect("registered");
    let second = fixture
        .service
        .find_or_register(new_professional(org.id, "529.982.247-25"), &actor())
        .expect("found");
    assert_eq!(first.id(), second.id());
}

#[test]
fn pending_version_becomes_current_once_applied() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);

    let pending = fixture
        .service
        .create_version(NewVersion {
            professional_id: record.id(),
            snapshot: full_snapshot(&fixture, CPF),
            source_type: VersionSourceType::Screening,
            source_id: Some("screening-1".to_string()),
            created_by: actor(),
        })
        .expect("pending version");
    assert!(pending.sync.is_none());
    assert_eq!(pending.version.status, VersionStatus::Pending);
    assert_eq!(pending.version.version_number, 2);
    assert!(!pending.version.is_current);

    let untouched = fixture.service.get(&record.id()).expect("record");
    assert!(untouched.qualifications.is_empty());

    let applied = fixture
        .service
        .apply_version(&pending.version.id, &actor())
        .expect("applied");
    assert_eq!(applied.version.status, VersionStatus::Applied);
    assert!(applied.version.is_current);
    assert_eq!(applied.version.applied_by, Some(actor()));
    assert_eq!(applied.diffs.len(), pending.diffs.len());

    let versions = fixture.service.versions(&record.id()).expect("versions");
    let current: Vec<_> = versions.iter().filter(|version| version.is_current).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, pending.version.id);

    let live = fixture.service.get(&record.id()).expect("record");
    assert_eq!(live.live_qualifications().count(), 1);
}

#[test]
fn only_pending_versions_can_be_applied_or_rejected() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);
    let initial = fixture.service.versions(&record.id()).expect("versions")[0].clone();

    let error = fixture
        .service
        .reject_version(&initial.id, "too late", &actor())
        .expect_err("applied versions are final");
    assert!(matches!(
        error,
        ProfessionalError::VersionNotPending {
            status: VersionStatus::Applied
        }
    ));

    let pending = fixture
        .service
        .create_version(NewVersion {
            professional_id: record.id(),
            snapshot: full_snapshot(&fixture, CPF),
            source_type: VersionSourceType::Import,
            source_id: None,
            created_by: actor(),
        })
        .expect("pending version");
    let rejected = fixture
        .service
        .reject_version(&pending.version.id, " wrong council ", &actor())
        .expect("rejected");
    assert_eq!(rejected.status, VersionStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong council"));

    let error = fixture
        .service
        .apply_version(&pending.version.id, &actor())
        .expect_err("rejected versions cannot apply");
    assert!(matches!(
        error,
        ProfessionalError::VersionNotPending {
            status: VersionStatus::Rejected
        }
    ));
}

#[test]
fn diffs_are_stored_against_the_live_state_at_creation() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);

    let outcome = fixture
        .service
        .update_personal_info(
            &record.id(),
            PersonalInfoPatch {
                full_name: Some("Ana Paula Souza".to_string()),
                email: Some("ana@example.com".to_string()),
                ..PersonalInfoPatch::default()
            },
            &actor(),
        )
        .expect("personal info updated");

    assert_eq!(outcome.version.status, VersionStatus::Applied);
    let stored = fixture.service.diffs(&outcome.version.id).expect("diffs");
    assert_eq!(stored, outcome.diffs);

    let name = stored
        .iter()
        .find(|diff| diff.field_path == "personal_info.full_name")
        .expect("name diff");
    assert_eq!(name.change_type, ChangeType::Modified);
    assert_eq!(name.entity_type, EntityKind::PersonalInfo);
    assert_eq!(name.old_value, Some(serde_json::json!("Ana Souza")));
    assert_eq!(name.new_value, Some(serde_json::json!("Ana Paula Souza")));

    let live = fixture.service.get(&record.id()).expect("record");
    assert_eq!(live.professional.full_name, "Ana Paula Souza");
    assert_eq!(live.professional.email.as_deref(), Some("ana@example.com"));
}

#[test]
fn empty_personal_info_patch_is_rejected() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);

    let error = fixture
        .service
        .update_personal_info(&record.id(), PersonalInfoPatch::default(), &actor())
        .expect_err("nothing to change");
    assert!(matches!(error, ProfessionalError::Validation(_)));
}

#[test]
fn cpf_change_colliding_with_another_professional_fails() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let first = fixture.register(&org, CPF);
    let second = fixture.register(&org, "11144477735");

    let error = fixture
        .service
        .update_personal_info(
            &second.id(),
            PersonalInfoPatch {
                cpf: Some(CPF.to_string()),
                ..PersonalInfoPatch::default()
            },
            &actor(),
        )
        .expect_err("cpf taken");
    match error {
        ProfessionalError::DuplicateCpf { existing, .. } => assert_eq!(existing, first.id()),
        other => panic!("unexpected error: {other:?}"),
    }

    let versions = fixture.service.versions(&second.id()).expect("versions");
    assert_eq!(versions.len(), 1);
}

#[test]
fn unknown_ids_are_reported_as_not_found() {
    let fixture = fixture();
    assert!(matches!(
        fixture.service.get(&crate::ids::ProfessionalId::new()),
        Err(ProfessionalError::NotFound)
    ));
    assert!(matches!(
        fixture.service.version(&crate::ids::VersionId::new()),
        Err(ProfessionalError::VersionNotFound)
    ));
}

fn with_email(organization_id: OrganizationId, cpf: &str, email: &str) -> NewProfessional {
    NewProfessional {
        email: Some(email.to_string()),
        ..new_professional(organization_id, cpf)
    }
}

#[test]
fn email_is_unique_within_the_family_but_not_across_tenants() {
    let fixture = fixture();
    let parent = fixture.organization("Group", None);
    let child = fixture.organization("Branch", Some(parent.id));
    let other = fixture.organization("Other", None);

    let first = fixture
        .service
        .register(with_email(parent.id, CPF, "ana@example.com"), &actor())
        .expect("registered");

    let error = fixture
        .service
        .register(with_email(child.id, "11144477735", " Ana@Example.com "), &actor())
        .expect_err("email taken within the family");
    match error {
        ProfessionalError::DuplicateEmail { email, existing } => {
            assert_eq!(email, "ana@example.com");
            assert_eq!(existing, first.id());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let elsewhere = fixture
        .service
        .register(with_email(other.id, "11144477735", "ana@example.com"), &actor())
        .expect("other tenant may reuse the email");
    assert_eq!(elsewhere.professional.email.as_deref(), Some("ana@example.com"));
}

#[test]
fn email_change_colliding_with_a_family_member_fails() {
    let fixture = fixture();
    let parent = fixture.organization("Group", None);
    let child = fixture.organization("Branch", Some(parent.id));
    let first = fixture
        .service
        .register(with_email(parent.id, CPF, "ana@example.com"), &actor())
        .expect("registered");
    let second = fixture
        .service
        .register(with_email(child.id, "11144477735", "bia@example.com"), &actor())
        .expect("registered");

    let error = fixture
        .service
        .update_personal_info(
            &second.id(),
            PersonalInfoPatch {
                email: Some("ana@example.com".to_string()),
                ..PersonalInfoPatch::default()
            },
            &actor(),
        )
        .expect_err("email taken");
    match error {
        ProfessionalError::DuplicateEmail { existing, .. } => assert_eq!(existing, first.id()),
        other => panic!("unexpected error: {other:?}"),
    }

    let record = fixture.service.get(&second.id()).expect("record");
    assert_eq!(record.professional.email.as_deref(), Some("bia@example.com"));
    let versions = fixture.service.versions(&second.id()).expect("versions");
    assert_eq!(versions.len(), 1);
}

#[test]
fn resubmitting_the_own_email_is_not_a_collision() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture
        .service
        .register(with_email(org.id, CPF, "ana@example.com"), &actor())
        .expect("registered");

    let outcome = fixture
        .service
        .update_personal_info(
            &record.id(),
            PersonalInfoPatch {
                email: Some("ANA@example.com".to_string()),
                phone: Some("+55 11 99999-0000".to_string()),
                ..PersonalInfoPatch::default()
            },
            &actor(),
        )
        .expect("own email accepted");
    assert_eq!(outcome.version.status, VersionStatus::Applied);

    let record = fixture.service.get(&record.id()).expect("record");
    assert_eq!(record.professional.email.as_deref(), Some("ana@example.com"));
    assert_eq!(record.professional.phone.as_deref(), Some("+55 11 99999-0000"));
}

#[test]
fn snapshot_values_round_trip_through_stored_versions() {
    let fixture = fixture();
    let org = fixture.organization("Clinic", None);
    let record = fixture.register(&org, CPF);

    let snapshot = fixture.service.snapshot(&record.id()).expect("snapshot");
    let value = snapshot.to_value().expect("serializable");
    let versions = fixture.service.versions(&record.id()).expect("versions");
    assert_eq!(versions[0].data_snapshot, value);
    assert_eq!(
        ProfessionalSnapshot::from_value(&value).expect("parsed"),
        snapshot
    );
}
