//! `PostgreSQL` implementations of the store traits.

mod invitation;
mod question;
mod quiz;
mod result;
mod workflow;

pub use invitation::InvitationRepository;
pub use question::QuestionRepository;
pub use quiz::QuizRepository;
pub use result::ResultRepository;
pub use workflow::WorkflowRepository;
