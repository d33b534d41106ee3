//! Professional records, versioned snapshots and the natural-key sync onto live rows.

mod diff;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub mod snapshot;
mod sync;

#[cfg(test)]
mod tests;

pub use diff::{diff_snapshots, SnapshotChange};
pub use domain::{
    AccountType, BankAccount, ChangeType, Company, CompanyLink, CouncilRegistration, Education,
    EducationLevel, EntityKind, Professional, ProfessionalChangeDiff, ProfessionalRecord,
    ProfessionalType, ProfessionalVersion, Qualification, Specialty, VersionSourceType,
    VersionStatus,
};
pub use repository::ProfessionalRepository;
pub use router::professional_router;
pub use service::{
    NewProfessional, NewVersion, PersonalInfoPatch, ProfessionalError, ProfessionalService,
    VersionOutcome,
};
pub use snapshot::{
    BankAccountSnapshot, CompanySnapshot, EducationSnapshot, PersonalInfo, ProfessionalSnapshot,
    QualificationSnapshot, SpecialtySnapshot,
};
pub use sync::SyncReport;
