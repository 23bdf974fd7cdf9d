//! Database entities.

#![allow(missing_docs)]

pub mod answer_set;
pub mod invitation;
pub mod question;
pub mod quiz;
pub mod quiz_enrollment;
pub mod quiz_result;
pub mod student;
pub mod workflow_stage;

pub use answer_set::Entity as AnswerSet;
pub use invitation::Entity as Invitation;
pub use question::Entity as Question;
pub use quiz::Entity as Quiz;
pub use quiz_enrollment::Entity as QuizEnrollment;
pub use quiz_result::Entity as QuizResult;
pub use student::Entity as Student;
pub use workflow_stage::Entity as WorkflowStage;
