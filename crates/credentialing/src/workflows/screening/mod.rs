//! Multi-step screening of professionals: conversation, data collection, document upload and
//! review, payment info and client validation.
//!
//! Steps run in the canonical [`StepType`] order restricted to the steps configured for the
//! process. Two transitions break the linear flow: a rejected conversation ends the process
//! immediately, and a review with rejected documents reopens the upload step.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
mod steps;

#[cfg(test)]
mod tests;

pub use domain::{
    DocumentStatus, IssuedScreening, NoteAction, ReviewNote, ScreeningAccessView, ScreeningProcess,
    ScreeningProcessStep, ScreeningRequiredDocument, ScreeningStatus, StepOutcome, StepStatus,
    StepType,
};
pub use repository::{
    NotificationError, ScreeningNotification, ScreeningNotifier, ScreeningRepository,
};
pub use router::screening_router;
pub use service::{
    Assignment, DocumentRequirement, NewScreeningProcess, PaymentInfo, ScreeningError,
    ScreeningService,
};
