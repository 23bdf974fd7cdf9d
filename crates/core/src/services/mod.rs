//! Engine services.

#![allow(missing_docs)]

pub mod access;
pub mod batch;
pub mod cancel;
pub mod delivery;
pub mod email;
pub mod generation;
pub mod invitation;
pub mod providers;
pub mod scoring;
pub mod snapshot;
pub mod templates;
pub mod workflow;

pub use batch::{CompensatingBatch, persist_all};
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use delivery::{DispatchJob, DispatchOutcome, DispatchService, DispatchStatus, MailDispatch};
pub use email::{MailTransport, OutgoingEmail, SendError, SendErrorKind, classify_status};
pub use generation::{
    GeneratedQuestion, GenerationRequest, OpenAiQuestionGenerator, QuestionGenerator,
    validate_questions,
};
pub use invitation::{InvitationService, StudentQuestion, StudentQuizView};
pub use providers::{BrevoProvider, SendGridProvider, Sender, SmtpProvider};
pub use scoring::{ScoreCard, Scorer, SnapshotScorer};
pub use workflow::{
    RecipientFailure, WorkflowDependencies, WorkflowOrchestrator, WorkflowResult, WorkflowSettings,
};
