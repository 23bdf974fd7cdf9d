//! Storage traits the engine is written against.
//!
//! Each trait covers one aggregate. [`crate::memory::MemoryStore`] implements
//! all of them in-process; [`crate::repositories`] implements them on
//! `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quizflow_common::AppResult;

use crate::models::{
    AnswerSet, InsertMode, Invitation, Question, Quiz, RankedResult, StageRecord, Student,
    WorkflowRun,
};

/// Invitation persistence.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Insert a new invitation.
    ///
    /// The existence check and the insert are one atomic step: with
    /// [`InsertMode::Exclusive`] an existing active invitation for the same
    /// `(quiz_id, student_id)` yields `DuplicateActiveInvitation`; with
    /// [`InsertMode::Supersede`] it is retired in the same step.
    async fn insert(&self, invitation: Invitation, mode: InsertMode) -> AppResult<Invitation>;

    /// Find by id.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Invitation>>;

    /// Find by token, whatever its state.
    async fn find_by_token(&self, token: &str) -> AppResult<Option<Invitation>>;

    /// Newest non-superseded invitation for the pair, used or not.
    async fn find_current(&self, quiz_id: &str, student_id: &str)
    -> AppResult<Option<Invitation>>;

    /// All invitations for a quiz, oldest first.
    async fn list_by_quiz(&self, quiz_id: &str) -> AppResult<Vec<Invitation>>;

    /// Atomically flip `is_used` from false to true.
    ///
    /// Returns `true` only for the caller that performed the transition.
    /// Superseded invitations never transition.
    async fn mark_used(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool>;

    /// Undo the [`mark_used`](Self::mark_used) claim made at `used_at`.
    ///
    /// Returns `false` when the invitation is not used or was claimed at a
    /// different instant, leaving it untouched.
    async fn release_use(&self, id: &str, used_at: DateTime<Utc>) -> AppResult<bool>;

    /// Record successful delivery, clearing any previous send error.
    async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> AppResult<()>;

    /// Record a terminal delivery failure.
    async fn record_send_failure(&self, id: &str, error: &str) -> AppResult<()>;

    /// Remove an invitation.
    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// Question persistence.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Insert one question.
    async fn insert(&self, question: Question) -> AppResult<()>;

    /// Delete one question by id.
    async fn delete(&self, id: &str) -> AppResult<()>;

    /// Questions of a quiz ordered by `order`.
    async fn list_by_quiz(&self, quiz_id: &str) -> AppResult<Vec<Question>>;
}

/// Workflow run persistence.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Existing run, if any.
    async fn find(&self, quiz_id: &str) -> AppResult<Option<WorkflowRun>>;

    /// Existing run, or a fresh all-pending run persisted on first call.
    async fn load_or_create(&self, quiz_id: &str) -> AppResult<WorkflowRun>;

    /// Durably write one stage record.
    async fn save_stage(&self, quiz_id: &str, record: &StageRecord) -> AppResult<()>;
}

/// Read access to quizzes and their rosters.
#[async_trait]
pub trait QuizDirectory: Send + Sync {
    /// Find a quiz.
    async fn find_quiz(&self, quiz_id: &str) -> AppResult<Option<Quiz>>;

    /// Quizzes owned by an admin.
    async fn list_quizzes_by_admin(&self, admin_id: &str) -> AppResult<Vec<Quiz>>;

    /// Students enrolled in a quiz.
    async fn enrolled_students(&self, quiz_id: &str) -> AppResult<Vec<Student>>;

    /// Find a student.
    async fn find_student(&self, student_id: &str) -> AppResult<Option<Student>>;
}

/// Attempts, scores and ranks.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store a completed attempt.
    async fn record_answers(&self, answers: AnswerSet) -> AppResult<()>;

    /// Completed attempts for a quiz.
    async fn completed_answer_sets(&self, quiz_id: &str) -> AppResult<Vec<AnswerSet>>;

    /// Replace the ranking of a quiz.
    ///
    /// `notified_at` of an existing result for the same invitation is kept.
    async fn save_rankings(&self, quiz_id: &str, results: &[RankedResult]) -> AppResult<()>;

    /// Ranking of a quiz, best first.
    async fn rankings(&self, quiz_id: &str) -> AppResult<Vec<RankedResult>>;

    /// Record a delivered qualification email.
    async fn mark_notified(&self, result_id: &str, at: DateTime<Utc>) -> AppResult<()>;
}
