//! In-process store implementing every storage trait.
//!
//! All tables sit behind one `RwLock`, so every write (including the
//! check-and-insert of [`InvitationStore::insert`] and the compare-and-set of
//! [`InvitationStore::mark_used`]) is atomic with respect to other callers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quizflow_common::{AppError, AppResult};
use tokio::sync::RwLock;

use crate::models::{
    AnswerSet, InsertMode, Invitation, Question, Quiz, RankedResult, StageRecord, Student,
    WorkflowRun,
};
use crate::store::{InvitationStore, QuestionStore, QuizDirectory, ResultStore, WorkflowStore};

#[derive(Default)]
struct Tables {
    quizzes: HashMap<String, Quiz>,
    students: HashMap<String, Student>,
    enrollments: HashMap<String, Vec<String>>,
    questions: HashMap<String, Question>,
    invitations: HashMap<String, Invitation>,
    workflows: HashMap<String, WorkflowRun>,
    answer_sets: HashMap<String, AnswerSet>,
    results: HashMap<String, RankedResult>,
}

/// Shared in-memory store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a quiz.
    pub async fn add_quiz(&self, quiz: Quiz) {
        self.tables.write().await.quizzes.insert(quiz.id.clone(), quiz);
    }

    /// Add or replace a student.
    pub async fn add_student(&self, student: Student) {
        self.tables
            .write()
            .await
            .students
            .insert(student.id.clone(), student);
    }

    /// Enroll a student in a quiz. Enrolling twice is a no-op.
    pub async fn enroll(&self, quiz_id: &str, student_id: &str) {
        let mut tables = self.tables.write().await;
        let roster = tables.enrollments.entry(quiz_id.to_string()).or_default();
        if !roster.iter().any(|id| id == student_id) {
            roster.push(student_id.to_string());
        }
    }

    /// Number of stored invitations, any state.
    pub async fn invitation_count(&self) -> usize {
        self.tables.read().await.invitations.len()
    }
}

fn sort_invitations(list: &mut [Invitation]) {
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn insert(&self, invitation: Invitation, mode: InsertMode) -> AppResult<Invitation> {
        let mut tables = self.tables.write().await;

        if tables
            .invitations
            .values()
            .any(|i| i.token == invitation.token || i.id == invitation.id)
        {
            return Err(AppError::Conflict("invitation id or token already exists".to_string()));
        }

        let active_id = tables
            .invitations
            .values()
            .find(|i| {
                i.quiz_id == invitation.quiz_id
                    && i.student_id == invitation.student_id
                    && i.is_active()
            })
            .map(|i| i.id.clone());

        if let Some(active_id) = active_id {
            match mode {
                InsertMode::Exclusive => {
                    return Err(AppError::DuplicateActiveInvitation {
                        quiz_id: invitation.quiz_id,
                        student_id: invitation.student_id,
                    });
                }
                InsertMode::Supersede => {
                    if let Some(previous) = tables.invitations.get_mut(&active_id) {
                        previous.superseded_at = Some(invitation.created_at);
                        previous.superseded_by = Some(invitation.id.clone());
                    }
                }
            }
        }

        tables
            .invitations
            .insert(invitation.id.clone(), invitation.clone());
        Ok(invitation)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Invitation>> {
        Ok(self.tables.read().await.invitations.get(id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<Invitation>> {
        Ok(self
            .tables
            .read()
            .await
            .invitations
            .values()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn find_current(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> AppResult<Option<Invitation>> {
        Ok(self
            .tables
            .read()
            .await
            .invitations
            .values()
            .filter(|i| {
                i.quiz_id == quiz_id && i.student_id == student_id && i.superseded_at.is_none()
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn list_by_quiz(&self, quiz_id: &str) -> AppResult<Vec<Invitation>> {
        let mut list: Vec<Invitation> = self
            .tables
            .read()
            .await
            .invitations
            .values()
            .filter(|i| i.quiz_id == quiz_id)
            .cloned()
            .collect();
        sort_invitations(&mut list);
        Ok(list)
    }

    async fn mark_used(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let invitation = tables
            .invitations
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("invitation {id}")))?;

        if !invitation.is_active() {
            return Ok(false);
        }
        invitation.is_used = true;
        invitation.used_at = Some(at);
        Ok(true)
    }

    async fn release_use(&self, id: &str, used_at: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(invitation) = tables.invitations.get_mut(id) else {
            return Ok(false);
        };
        if !invitation.is_used || invitation.used_at != Some(used_at) {
            return Ok(false);
        }
        invitation.is_used = false;
        invitation.used_at = None;
        Ok(true)
    }

    async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let invitation = tables
            .invitations
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("invitation {id}")))?;
        invitation.sent_at = Some(at);
        invitation.last_error = None;
        Ok(())
    }

    async fn record_send_failure(&self, id: &str, error: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let invitation = tables
            .invitations
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("invitation {id}")))?;
        invitation.last_error = Some(error.to_string());
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.tables.write().await.invitations.remove(id);
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn insert(&self, question: Question) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.questions.contains_key(&question.id) {
            return Err(AppError::Conflict(format!("question {}", question.id)));
        }
        tables.questions.insert(question.id.clone(), question);
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.tables.write().await.questions.remove(id);
        Ok(())
    }

    async fn list_by_quiz(&self, quiz_id: &str) -> AppResult<Vec<Question>> {
        let mut list: Vec<Question> = self
            .tables
            .read()
            .await
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        list.sort_by_key(|q| q.order);
        Ok(list)
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn find(&self, quiz_id: &str) -> AppResult<Option<WorkflowRun>> {
        Ok(self.tables.read().await.workflows.get(quiz_id).cloned())
    }

    async fn load_or_create(&self, quiz_id: &str) -> AppResult<WorkflowRun> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .workflows
            .entry(quiz_id.to_string())
            .or_insert_with(|| WorkflowRun::new(quiz_id, Utc::now()))
            .clone())
    }

    async fn save_stage(&self, quiz_id: &str, record: &StageRecord) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let run = tables
            .workflows
            .entry(quiz_id.to_string())
            .or_insert_with(|| WorkflowRun::new(quiz_id, record.updated_at));
        *run.record_mut(record.stage) = record.clone();
        Ok(())
    }
}

#[async_trait]
impl QuizDirectory for MemoryStore {
    async fn find_quiz(&self, quiz_id: &str) -> AppResult<Option<Quiz>> {
        Ok(self.tables.read().await.quizzes.get(quiz_id).cloned())
    }

    async fn list_quizzes_by_admin(&self, admin_id: &str) -> AppResult<Vec<Quiz>> {
        let mut list: Vec<Quiz> = self
            .tables
            .read()
            .await
            .quizzes
            .values()
            .filter(|q| q.admin_id == admin_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn enrolled_students(&self, quiz_id: &str) -> AppResult<Vec<Student>> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .get(quiz_id)
            .map(|roster| {
                roster
                    .iter()
                    .filter_map(|id| tables.students.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_student(&self, student_id: &str) -> AppResult<Option<Student>> {
        Ok(self.tables.read().await.students.get(student_id).cloned())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn record_answers(&self, answers: AnswerSet) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.answer_sets.contains_key(&answers.invitation_id) {
            return Err(AppError::Conflict(format!(
                "answers already recorded for invitation {}",
                answers.invitation_id
            )));
        }
        tables
            .answer_sets
            .insert(answers.invitation_id.clone(), answers);
        Ok(())
    }

    async fn completed_answer_sets(&self, quiz_id: &str) -> AppResult<Vec<AnswerSet>> {
        let mut list: Vec<AnswerSet> = self
            .tables
            .read()
            .await
            .answer_sets
            .values()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(list)
    }

    async fn save_rankings(&self, quiz_id: &str, results: &[RankedResult]) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let notified: HashMap<String, DateTime<Utc>> = tables
            .results
            .values()
            .filter(|r| r.quiz_id == quiz_id)
            .filter_map(|r| r.notified_at.map(|at| (r.invitation_id.clone(), at)))
            .collect();
        tables.results.retain(|_, r| r.quiz_id != quiz_id);

        for result in results {
            let mut result = result.clone();
            if let Some(at) = notified.get(&result.invitation_id) {
                result.notified_at = Some(*at);
            }
            tables.results.insert(result.id.clone(), result);
        }
        Ok(())
    }

    async fn rankings(&self, quiz_id: &str) -> AppResult<Vec<RankedResult>> {
        let mut list: Vec<RankedResult> = self
            .tables
            .read()
            .await
            .results
            .values()
            .filter(|r| r.quiz_id == quiz_id)
            .cloned()
            .collect();
        list.sort_by_key(|r| r.rank);
        Ok(list)
    }

    async fn mark_notified(&self, result_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let result = tables
            .results
            .get_mut(result_id)
            .ok_or_else(|| AppError::NotFound(format!("result {result_id}")))?;
        result.notified_at = Some(at);
        Ok(())
    }
}
