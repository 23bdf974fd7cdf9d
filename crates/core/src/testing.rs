//! Fakes and fixtures for tests of the engine and the crates built on it.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quizflow_common::{AppError, AppResult};
use quizflow_db::MemoryStore;
use quizflow_db::models::{
    AnswerSet, Difficulty, Invitation, Question, Quiz, RankedResult, Student, SubmittedAnswer,
};
use quizflow_db::store::{QuestionStore, ResultStore};
use tokio::sync::Mutex;

use crate::services::cancel::{CancelHandle, CancelSignal};
use crate::services::delivery::{DispatchJob, DispatchOutcome, DispatchStatus, MailDispatch};
use crate::services::email::{MailTransport, OutgoingEmail, SendError};
use crate::services::generation::{GeneratedQuestion, GenerationRequest, QuestionGenerator};
use crate::services::snapshot::{freeze_questions, freeze_quiz};

// ==================== Fixtures ====================

/// A medium Rust quiz with 30 seconds per question.
#[must_use]
pub fn seed_quiz(id: &str, admin_id: &str, total_questions: u32) -> Quiz {
    Quiz {
        id: id.to_string(),
        admin_id: admin_id.to_string(),
        title: format!("Quiz {id}"),
        description: "Ownership, borrowing and lifetimes".to_string(),
        topic: "Rust".to_string(),
        difficulty: Difficulty::Medium,
        time_per_question: 30,
        total_questions,
        is_active: true,
        created_at: Utc::now(),
    }
}

/// A student whose email is `<id>@example.com`.
#[must_use]
pub fn seed_student(id: &str) -> Student {
    Student {
        id: id.to_string(),
        name: format!("Student {id}"),
        email: format!("{id}@example.com"),
    }
}

/// Add a quiz owned by `admin_id` with students `student-1..=n` enrolled.
pub async fn seed_roster(store: &MemoryStore, quiz_id: &str, admin_id: &str, students: usize) {
    store.add_quiz(seed_quiz(quiz_id, admin_id, 5)).await;
    for i in 1..=students {
        let student = seed_student(&format!("student-{i}"));
        store.enroll(quiz_id, &student.id).await;
        store.add_student(student).await;
    }
}

/// A valid generated question whose correct answer is `"Option A"`.
#[must_use]
pub fn valid_question(index: usize) -> GeneratedQuestion {
    GeneratedQuestion {
        question_text: format!("Question {}", index + 1),
        options: options(),
        correct_answer: "Option A".to_string(),
    }
}

/// Persisted questions `1..=n`, each answered by `"Option A"`.
#[must_use]
pub fn seed_questions(quiz_id: &str, count: u32) -> Vec<Question> {
    (1..=count)
        .map(|order| Question {
            id: format!("{quiz_id}-q{order}"),
            quiz_id: quiz_id.to_string(),
            question_text: format!("Question {order}"),
            options: options(),
            correct_answer: "Option A".to_string(),
            time_limit: 30,
            order,
            created_at: Utc::now(),
        })
        .collect()
}

/// An unsent invitation with `questions` seeded questions in its snapshot.
#[must_use]
pub fn seed_invitation(id: &str, quiz_id: &str, student_id: &str, questions: u32) -> Invitation {
    let quiz = seed_quiz(quiz_id, "admin1", questions);
    let questions = seed_questions(quiz_id, questions);
    Invitation {
        id: id.to_string(),
        quiz_id: quiz_id.to_string(),
        student_id: student_id.to_string(),
        token: format!("token-{id}"),
        created_at: Utc::now(),
        sent_at: None,
        is_used: false,
        used_at: None,
        superseded_at: None,
        superseded_by: None,
        last_error: None,
        quiz_snapshot: freeze_quiz(&quiz, questions.len()),
        questions_snapshot: freeze_questions(&questions),
    }
}

/// Answers for an invitation; `answers[i]` answers question `i + 1`.
#[must_use]
pub fn answer_set(invitation: &Invitation, answers: &[&str], completed_at: DateTime<Utc>) -> AnswerSet {
    AnswerSet {
        id: format!("answers-{}", invitation.id),
        quiz_id: invitation.quiz_id.clone(),
        student_id: invitation.student_id.clone(),
        invitation_id: invitation.id.clone(),
        answers: answers
            .iter()
            .zip(1u32..)
            .map(|(answer, order)| SubmittedAnswer {
                question_order: order,
                answer: (*answer).to_string(),
            })
            .collect(),
        completed_at,
    }
}

/// A rendered email to `to`.
#[must_use]
pub fn email_to(to: &str) -> OutgoingEmail {
    OutgoingEmail {
        to_email: to.to_string(),
        to_name: to.to_string(),
        subject: "Test".to_string(),
        html_body: "<p>Test</p>".to_string(),
    }
}

fn options() -> Vec<String> {
    ["Option A", "Option B", "Option C", "Option D"]
        .into_iter()
        .map(String::from)
        .collect()
}

// ==================== Question Generation ====================

/// Generator returning a fixed batch (or a fixed error) and counting calls.
pub struct ScriptedGenerator {
    result: Result<Vec<GeneratedQuestion>, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Always return `questions`.
    #[must_use]
    pub const fn returning(questions: Vec<GeneratedQuestion>) -> Self {
        Self {
            result: Ok(questions),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with an external service error.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `generate` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> AppResult<Vec<GeneratedQuestion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result
            .clone()
            .map_err(AppError::ExternalService)
    }
}

// ==================== Question Storage ====================

/// Question store that fails the insert at a given position.
///
/// `fail_at = Some(6)` lets six inserts succeed and fails the seventh.
pub struct FlakyQuestionStore {
    fail_at: Option<usize>,
    inserts: AtomicUsize,
    deletes_fail: AtomicBool,
    questions: Mutex<Vec<Question>>,
    deleted: Mutex<Vec<String>>,
}

impl FlakyQuestionStore {
    /// Create a store failing at `fail_at` (zero-based), or never.
    #[must_use]
    pub fn new(fail_at: Option<usize>) -> Self {
        Self {
            fail_at,
            inserts: AtomicUsize::new(0),
            deletes_fail: AtomicBool::new(false),
            questions: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Make every delete fail until switched back.
    pub fn fail_deletes(&self, fail: bool) {
        self.deletes_fail.store(fail, Ordering::SeqCst);
    }

    /// Ids deleted so far, in delete order.
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl QuestionStore for FlakyQuestionStore {
    async fn insert(&self, question: Question) -> AppResult<()> {
        let position = self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(position) {
            return Err(AppError::Database("connection reset".to_string()));
        }
        self.questions.lock().await.push(question);
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        if self.deletes_fail.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".to_string()));
        }
        self.questions.lock().await.retain(|q| q.id != id);
        self.deleted.lock().await.push(id.to_string());
        Ok(())
    }

    async fn list_by_quiz(&self, quiz_id: &str) -> AppResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .questions
            .lock()
            .await
            .iter()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }
}

// ==================== Result Storage ====================

/// Result store over a [`MemoryStore`] whose answer writes can be switched
/// to fail.
pub struct UnreliableResultStore {
    inner: MemoryStore,
    records_fail: AtomicBool,
}

impl UnreliableResultStore {
    /// Wrap `inner`, failing answer writes from the start.
    #[must_use]
    pub const fn failing(inner: MemoryStore) -> Self {
        Self {
            inner,
            records_fail: AtomicBool::new(true),
        }
    }

    /// Let answer writes through again.
    pub fn recover(&self) {
        self.records_fail.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResultStore for UnreliableResultStore {
    async fn record_answers(&self, answers: AnswerSet) -> AppResult<()> {
        if self.records_fail.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".to_string()));
        }
        self.inner.record_answers(answers).await
    }

    async fn completed_answer_sets(&self, quiz_id: &str) -> AppResult<Vec<AnswerSet>> {
        self.inner.completed_answer_sets(quiz_id).await
    }

    async fn save_rankings(&self, quiz_id: &str, results: &[RankedResult]) -> AppResult<()> {
        self.inner.save_rankings(quiz_id, results).await
    }

    async fn rankings(&self, quiz_id: &str) -> AppResult<Vec<RankedResult>> {
        self.inner.rankings(quiz_id).await
    }

    async fn mark_notified(&self, result_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        self.inner.mark_notified(result_id, at).await
    }
}

// ==================== Dispatch ====================

enum DispatchScript {
    Deliver,
    FailPermanently,
    FailFor(HashSet<String>),
}

/// In-process dispatcher that records delivered jobs.
pub struct RecordingDispatch {
    provider: String,
    script: DispatchScript,
    sent: Mutex<Vec<DispatchJob>>,
    cancel_on_dispatch: Mutex<Option<CancelHandle>>,
}

impl RecordingDispatch {
    fn with_script(provider: &str, script: DispatchScript) -> Self {
        Self {
            provider: provider.to_string(),
            script,
            sent: Mutex::new(Vec::new()),
            cancel_on_dispatch: Mutex::new(None),
        }
    }

    /// Deliver every job.
    #[must_use]
    pub fn delivering(provider: &str) -> Self {
        Self::with_script(provider, DispatchScript::Deliver)
    }

    /// Fail every job permanently.
    #[must_use]
    pub fn failing_permanently(provider: &str) -> Self {
        Self::with_script(provider, DispatchScript::FailPermanently)
    }

    /// Fail jobs to the listed addresses, deliver the rest.
    #[must_use]
    pub fn failing_for(provider: &str, recipients: &[&str]) -> Self {
        Self::with_script(
            provider,
            DispatchScript::FailFor(recipients.iter().map(|r| (*r).to_string()).collect()),
        )
    }

    /// Fire `handle` when the next batch arrives, before any job is handled.
    pub async fn cancel_before_dispatch(&self, handle: CancelHandle) {
        *self.cancel_on_dispatch.lock().await = Some(handle);
    }

    /// Jobs delivered so far.
    pub async fn sent(&self) -> Vec<DispatchJob> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailDispatch for RecordingDispatch {
    async fn dispatch(&self, jobs: Vec<DispatchJob>, cancel: &CancelSignal) -> Vec<DispatchOutcome> {
        if let Some(handle) = self.cancel_on_dispatch.lock().await.take() {
            handle.cancel();
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let status = if cancel.is_cancelled() {
                DispatchStatus::Abandoned
            } else {
                match &self.script {
                    DispatchScript::Deliver => DispatchStatus::Delivered {
                        provider: self.provider.clone(),
                    },
                    DispatchScript::FailPermanently => DispatchStatus::Failed {
                        error: format!("{}: recipient rejected", self.provider),
                        permanent: true,
                    },
                    DispatchScript::FailFor(failing) if failing.contains(&job.email.to_email) => {
                        DispatchStatus::Failed {
                            error: format!("{}: mailbox unavailable", self.provider),
                            permanent: false,
                        }
                    }
                    DispatchScript::FailFor(_) => DispatchStatus::Delivered {
                        provider: self.provider.clone(),
                    },
                }
            };

            let attempts = u32::from(!matches!(status, DispatchStatus::Abandoned));
            outcomes.push(DispatchOutcome {
                job_id: job.id.clone(),
                recipient: job.email.to_email.clone(),
                status: status.clone(),
                attempts,
                at: Utc::now(),
            });
            if matches!(status, DispatchStatus::Delivered { .. }) {
                self.sent.lock().await.push(job);
            }
        }
        outcomes
    }
}

// ==================== Transports ====================

/// Provider adapter replaying a scripted sequence of results.
///
/// Once the script runs out the last entry repeats; an empty script always
/// succeeds.
pub struct ScriptedTransport {
    name: String,
    script: Vec<Result<(), SendError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    recipients: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Replay `script` in order.
    #[must_use]
    pub fn new(name: &str, script: Vec<Result<(), SendError>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            delay: None,
            calls: AtomicUsize::new(0),
            recipients: Mutex::new(Vec::new()),
        })
    }

    /// Always succeed.
    #[must_use]
    pub fn healthy(name: &str) -> Arc<Self> {
        Self::new(name, Vec::new())
    }

    /// Always fail transiently.
    #[must_use]
    pub fn down(name: &str) -> Arc<Self> {
        Self::new(name, vec![Err(SendError::transient(name, "503 Service Unavailable"))])
    }

    /// Always fail permanently.
    #[must_use]
    pub fn rejecting(name: &str) -> Arc<Self> {
        Self::new(name, vec![Err(SendError::permanent(name, "550 invalid mailbox"))])
    }

    /// Sleep this long inside every send.
    #[must_use]
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Vec::new(),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            recipients: Mutex::new(Vec::new()),
        })
    }

    /// Number of `send` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Recipients of every `send` call, in call order.
    pub async fn recipients(&self) -> Vec<String> {
        self.recipients.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.recipients.lock().await.push(email.to_email.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.get(call).or_else(|| self.script.last()) {
            Some(result) => result.clone(),
            None => Ok(()),
        }
    }
}
