//! Typed domain records shared by every store implementation.
//!
//! Entities in [`crate::entities`] mirror the SQL schema; these records are
//! what the engine works with. Snapshot types are frozen at invitation time
//! and have no mutators.

use chrono::{DateTime, Utc};
use quizflow_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::entities::workflow_stage::{Stage, StageStatus};

/// Quiz difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(AppError::Validation(format!("unknown difficulty: {other}"))),
        }
    }
}

/// A quiz as owned by the quiz catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub admin_id: String,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub time_per_question: u32,
    pub total_questions: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An enrolled student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A persisted question belonging to a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub quiz_id: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub time_limit: u32,
    pub order: u32,
    pub created_at: DateTime<Utc>,
}

/// Quiz metadata frozen into an invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub title: String,
    pub description: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub time_per_question: u32,
    pub total_questions: u32,
}

/// One question frozen into an invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSnapshot {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub time_limit: u32,
    pub order: u32,
}

/// A token-gated, single-use grant for one student to take one quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub quiz_id: String,
    pub student_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub superseded_by: Option<String>,
    pub last_error: Option<String>,
    pub quiz_snapshot: QuizSnapshot,
    pub questions_snapshot: Vec<QuestionSnapshot>,
}

impl Invitation {
    /// Unused and not superseded.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_used && self.superseded_at.is_none()
    }

    /// Whether an email carrying this invitation has been delivered.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }
}

/// How an insert treats an existing active invitation for the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Reject with `DuplicateActiveInvitation`.
    #[default]
    Exclusive,
    /// Retire the existing one (kept for audit) and insert the new one.
    Supersede,
}

/// Status of one workflow stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StageRecord {
    /// A fresh pending record.
    #[must_use]
    pub const fn pending(stage: Stage, now: DateTime<Utc>) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            error: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Transition to done.
    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.status = StageStatus::Done;
        self.error = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Transition to failed with a reason.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = StageStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = None;
        self.updated_at = now;
    }

    /// Stay pending, optionally noting why.
    pub fn mark_pending(&mut self, note: Option<String>, now: DateTime<Utc>) {
        self.status = StageStatus::Pending;
        self.error = note;
        self.completed_at = None;
        self.updated_at = now;
    }
}

/// The per-quiz record of workflow stage statuses.
///
/// Always holds exactly one record per [`Stage`], in stage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub quiz_id: String,
    pub stages: Vec<StageRecord>,
}

impl WorkflowRun {
    /// All stages pending.
    #[must_use]
    pub fn new(quiz_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            stages: Stage::ALL
                .iter()
                .map(|stage| StageRecord::pending(*stage, now))
                .collect(),
        }
    }

    /// Build from stored records, filling absent stages as pending.
    #[must_use]
    pub fn from_records(
        quiz_id: impl Into<String>,
        records: Vec<StageRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let stages = Stage::ALL
            .iter()
            .map(|stage| {
                records
                    .iter()
                    .find(|r| r.stage == *stage)
                    .cloned()
                    .unwrap_or_else(|| StageRecord::pending(*stage, now))
            })
            .collect();
        Self {
            quiz_id: quiz_id.into(),
            stages,
        }
    }

    /// Record for one stage.
    #[must_use]
    pub fn record(&self, stage: Stage) -> &StageRecord {
        &self.stages[stage.index()]
    }

    /// Mutable record for one stage.
    pub fn record_mut(&mut self, stage: Stage) -> &mut StageRecord {
        &mut self.stages[stage.index()]
    }

    /// Status of one stage.
    #[must_use]
    pub fn status(&self, stage: Stage) -> StageStatus {
        self.record(stage).status
    }

    /// Stages with status done, in order.
    #[must_use]
    pub fn steps_completed(&self) -> Vec<Stage> {
        self.stages_with(StageStatus::Done)
    }

    /// Stages still pending, in order.
    #[must_use]
    pub fn pending_stages(&self) -> Vec<Stage> {
        self.stages_with(StageStatus::Pending)
    }

    /// `"<STAGE>: <error>"` for every failed stage.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|r| r.status == StageStatus::Failed)
            .map(|r| format!("{}: {}", r.stage, r.error.as_deref().unwrap_or("unknown error")))
            .collect()
    }

    /// No stage has failed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.stages.iter().all(|r| r.status != StageStatus::Failed)
    }

    fn stages_with(&self, status: StageStatus) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.stage)
            .collect()
    }
}

/// One answer submitted against a snapshot question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    /// `order` of the snapshot question being answered.
    pub question_order: u32,
    pub answer: String,
}

/// A student's completed quiz attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSet {
    pub id: String,
    pub quiz_id: String,
    pub student_id: String,
    pub invitation_id: String,
    pub answers: Vec<SubmittedAnswer>,
    pub completed_at: DateTime<Utc>,
}

/// A scored and ranked attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub id: String,
    pub quiz_id: String,
    pub student_id: String,
    pub invitation_id: String,
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
    /// 1-based.
    pub rank: u32,
    pub completed_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_all_pending() {
        let run = WorkflowRun::new("quiz1", Utc::now());

        assert_eq!(run.stages.len(), 5);
        assert_eq!(run.pending_stages(), Stage::ALL.to_vec());
        assert!(run.steps_completed().is_empty());
        assert!(run.is_healthy());
    }

    #[test]
    fn test_from_records_fills_gaps_in_order() {
        let now = Utc::now();
        let mut sent = StageRecord::pending(Stage::InvitationsSent, now);
        sent.mark_failed("no students", now);
        let mut generated = StageRecord::pending(Stage::QuestionsGenerated, now);
        generated.mark_done(now);

        let run = WorkflowRun::from_records("quiz1", vec![sent, generated], now);

        assert_eq!(run.stages[0].stage, Stage::QuestionsGenerated);
        assert_eq!(run.steps_completed(), vec![Stage::QuestionsGenerated]);
        assert_eq!(run.errors(), vec!["INVITATIONS_SENT: no students".to_string()]);
        assert!(!run.is_healthy());
        assert_eq!(run.status(Stage::Notified), StageStatus::Pending);
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
    }
}
