//! Workflow orchestrator.
//!
//! Drives a quiz through `QUESTIONS_GENERATED → INVITATIONS_SENT →
//! AWAITING_COMPLETION → SCORED → NOTIFIED`. Each stage record is written
//! after the stage's side effects are committed; a re-run skips stages that
//! are already done and stops at the first stage that does not finish.
//!
//! Runs for one quiz are serialized in-process by a per-quiz lock. Runs for
//! different quizzes proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use quizflow_common::config::WorkflowConfig;
use quizflow_common::{AdminIdentity, AppError, AppResult, IdGenerator};
use quizflow_db::models::{
    InsertMode, Invitation, Question, Quiz, Stage, StageStatus, Student, WorkflowRun,
};
use quizflow_db::store::{QuestionStore, QuizDirectory, ResultStore, WorkflowStore};
use serde::Serialize;
use tokio::sync::Mutex;

use super::access::owned_quiz;
use super::batch::persist_all;
use super::cancel::CancelSignal;
use super::delivery::{DispatchJob, DispatchOutcome, DispatchService, DispatchStatus};
use super::generation::{GenerationRequest, QuestionGenerator, validate_questions};
use super::invitation::InvitationService;
use super::scoring::{ScoredAttempt, Scorer, rank};
use super::snapshot::{freeze_questions, freeze_quiz};
use super::templates;

/// Tunables for a workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// How many top-ranked students get a qualification email.
    pub top_n: usize,
    /// Share of sent invitations that must be redeemed before scoring.
    pub min_completion_ratio: f64,
    /// Sender display name used in notification layouts.
    pub from_name: String,
}

impl WorkflowSettings {
    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &WorkflowConfig, from_name: impl Into<String>) -> Self {
        Self {
            top_n: config.top_n,
            min_completion_ratio: config.min_completion_ratio,
            from_name: from_name.into(),
        }
    }
}

/// Collaborators the orchestrator is wired with.
#[derive(Clone)]
pub struct WorkflowDependencies {
    pub workflows: Arc<dyn WorkflowStore>,
    pub questions: Arc<dyn QuestionStore>,
    pub directory: Arc<dyn QuizDirectory>,
    pub results: Arc<dyn ResultStore>,
    pub invitations: InvitationService,
    pub dispatch: DispatchService,
    pub generator: Arc<dyn QuestionGenerator>,
    pub scorer: Arc<dyn Scorer>,
}

/// A recipient whose email could not be delivered during a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientFailure {
    pub stage: Stage,
    pub recipient: String,
    pub error: String,
}

/// Operator-facing summary of a run.
///
/// `success`, `steps_completed`, `errors` and `pending_stages` mirror the
/// stored stage records at the time of return.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub quiz_id: String,
    pub success: bool,
    pub steps_completed: Vec<Stage>,
    pub errors: Vec<String>,
    pub pending_stages: Vec<Stage>,
    pub recipient_failures: Vec<RecipientFailure>,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<String>,
}

impl WorkflowResult {
    fn from_run(run: &WorkflowRun, ctx: RunContext, blocked: Option<String>) -> Self {
        Self {
            quiz_id: run.quiz_id.clone(),
            success: run.is_healthy(),
            steps_completed: run.steps_completed(),
            errors: run.errors(),
            pending_stages: run.pending_stages(),
            recipient_failures: ctx.recipient_failures,
            cancelled: ctx.cancelled,
            blocked,
        }
    }
}

enum StageOutcome {
    Done,
    Pending(Option<String>),
}

struct RunContext {
    quiz: Quiz,
    recipient_failures: Vec<RecipientFailure>,
    cancelled: bool,
}

impl RunContext {
    const fn new(quiz: Quiz) -> Self {
        Self {
            quiz,
            recipient_failures: Vec::new(),
            cancelled: false,
        }
    }
}

#[derive(Default)]
struct DispatchTally {
    delivered: usize,
    abandoned: usize,
    permanent_failures: usize,
    failures: usize,
}

/// Sequences the quiz lifecycle.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    deps: WorkflowDependencies,
    settings: WorkflowSettings,
    id_gen: IdGenerator,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl WorkflowOrchestrator {
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(deps: WorkflowDependencies, settings: WorkflowSettings) -> Self {
        Self {
            deps,
            settings,
            id_gen: IdGenerator::new(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // ==================== Triggers ====================

    /// Generate questions, send invitations and check completion.
    pub async fn run_complete(
        &self,
        admin: &AdminIdentity,
        quiz_id: &str,
        cancel: &CancelSignal,
    ) -> AppResult<WorkflowResult> {
        self.run(admin, quiz_id, &Stage::ALL[..=Stage::AwaitingCompletion.index()], cancel)
            .await
    }

    /// Check completion, score and notify.
    ///
    /// Blocks without side effects unless questions and invitations are done.
    pub async fn run_scoring(
        &self,
        admin: &AdminIdentity,
        quiz_id: &str,
        cancel: &CancelSignal,
    ) -> AppResult<WorkflowResult> {
        self.run(admin, quiz_id, &Stage::ALL[Stage::AwaitingCompletion.index()..], cancel)
            .await
    }

    /// Every stage in order.
    pub async fn run_automated(
        &self,
        admin: &AdminIdentity,
        quiz_id: &str,
        cancel: &CancelSignal,
    ) -> AppResult<WorkflowResult> {
        self.run(admin, quiz_id, &Stage::ALL, cancel).await
    }

    /// Current stage statuses without executing anything.
    pub async fn status(&self, admin: &AdminIdentity, quiz_id: &str) -> AppResult<WorkflowResult> {
        let quiz = owned_quiz(self.deps.directory.as_ref(), admin, quiz_id).await?;
        let run = match self.deps.workflows.find(quiz_id).await? {
            Some(run) => run,
            None => WorkflowRun::new(quiz_id, Utc::now()),
        };
        Ok(WorkflowResult::from_run(&run, RunContext::new(quiz), None))
    }

    /// Run the given stages in order.
    ///
    /// Stages already done are skipped. The loop stops at the first stage
    /// that fails or stays pending, so later stages never run against
    /// incomplete prerequisites.
    pub async fn run(
        &self,
        admin: &AdminIdentity,
        quiz_id: &str,
        stages: &[Stage],
        cancel: &CancelSignal,
    ) -> AppResult<WorkflowResult> {
        let quiz = owned_quiz(self.deps.directory.as_ref(), admin, quiz_id).await?;

        let lock = self.quiz_lock(quiz_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_stages(quiz_id, quiz, stages, cancel).await
        };
        self.release_quiz_lock(quiz_id, &lock).await;
        result
    }

    async fn run_stages(
        &self,
        quiz_id: &str,
        quiz: Quiz,
        stages: &[Stage],
        cancel: &CancelSignal,
    ) -> AppResult<WorkflowResult> {
        let mut run = self.deps.workflows.load_or_create(quiz_id).await?;
        let mut ctx = RunContext::new(quiz);
        let mut blocked = None;

        for &stage in stages {
            if run.status(stage) == StageStatus::Done {
                tracing::debug!(quiz_id, %stage, "Stage already done, skipping");
                continue;
            }
            if let Err(e) = check_prerequisites(&run, stage) {
                tracing::info!(quiz_id, %stage, reason = %e, "Stage blocked");
                blocked = Some(e.to_string());
                break;
            }
            if cancel.is_cancelled() {
                ctx.cancelled = true;
                break;
            }

            tracing::info!(quiz_id, %stage, "Running stage");
            let outcome = self.execute(stage, &mut ctx, cancel).await;
            let now = Utc::now();
            let record = run.record_mut(stage);
            match outcome {
                Ok(StageOutcome::Done) => {
                    record.mark_done(now);
                    tracing::info!(quiz_id, %stage, "Stage done");
                }
                Ok(StageOutcome::Pending(note)) => {
                    tracing::info!(quiz_id, %stage, note = ?note, "Stage pending");
                    record.mark_pending(note, now);
                }
                Err(e) => {
                    tracing::warn!(quiz_id, %stage, error = %e, "Stage failed");
                    record.mark_failed(e.to_string(), now);
                }
            }
            self.deps.workflows.save_stage(quiz_id, run.record(stage)).await?;

            if run.status(stage) != StageStatus::Done {
                break;
            }
        }

        Ok(WorkflowResult::from_run(&run, ctx, blocked))
    }

    async fn quiz_lock(&self, quiz_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(quiz_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other run holds or waits on it.
    async fn release_quiz_lock(&self, quiz_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(lock) == 2 {
            locks.remove(quiz_id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn execute(
        &self,
        stage: Stage,
        ctx: &mut RunContext,
        cancel: &CancelSignal,
    ) -> AppResult<StageOutcome> {
        match stage {
            Stage::QuestionsGenerated => self.generate_questions(&ctx.quiz).await,
            Stage::InvitationsSent => self.send_invitations(ctx, cancel).await,
            Stage::AwaitingCompletion => self.check_completion(&ctx.quiz).await,
            Stage::Scored => self.score(&ctx.quiz).await,
            Stage::Notified => self.notify(ctx, cancel).await,
        }
    }

    // ==================== Stages ====================

    async fn generate_questions(&self, quiz: &Quiz) -> AppResult<StageOutcome> {
        self.discard_leftover_questions(&quiz.id).await?;

        let generated = self
            .deps
            .generator
            .generate(&GenerationRequest::from(quiz))
            .await?;
        validate_questions(&generated)?;

        let now = Utc::now();
        let questions: Vec<Question> = generated
            .into_iter()
            .zip(1u32..)
            .map(|(q, order)| Question {
                id: self.id_gen.generate(),
                quiz_id: quiz.id.clone(),
                question_text: q.question_text,
                options: q.options,
                correct_answer: q.correct_answer,
                time_limit: quiz.time_per_question,
                order,
                created_at: now,
            })
            .collect();

        let mut batch_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        let written = persist_all(self.deps.questions.clone(), questions).await?;

        let mut stored_ids: Vec<String> = self
            .deps
            .questions
            .list_by_quiz(&quiz.id)
            .await?
            .into_iter()
            .map(|q| q.id)
            .collect();
        batch_ids.sort();
        stored_ids.sort();
        if stored_ids != batch_ids {
            return Err(AppError::Conflict(format!(
                "question set changed during generation: expected {}, found {}",
                batch_ids.len(),
                stored_ids.len()
            )));
        }

        tracing::info!(quiz_id = %quiz.id, written, "Questions persisted");
        Ok(StageOutcome::Done)
    }

    /// Questions present while the stage is not done belong to a batch that
    /// never completed. They are removed before generating again; if any
    /// cannot be removed the stage fails and nothing new is written.
    async fn discard_leftover_questions(&self, quiz_id: &str) -> AppResult<()> {
        let leftovers = self.deps.questions.list_by_quiz(quiz_id).await?;
        if leftovers.is_empty() {
            return Ok(());
        }

        tracing::warn!(
            quiz_id,
            count = leftovers.len(),
            "Discarding questions from an incomplete batch"
        );
        let mut remaining = 0usize;
        for question in &leftovers {
            if let Err(e) = self.deps.questions.delete(&question.id).await {
                tracing::error!(
                    quiz_id,
                    question_id = %question.id,
                    error = %e,
                    "Failed to discard question"
                );
                remaining += 1;
            }
        }
        if remaining > 0 {
            return Err(AppError::Database(format!(
                "{remaining} questions from an incomplete batch could not be removed"
            )));
        }
        Ok(())
    }

    async fn send_invitations(
        &self,
        ctx: &mut RunContext,
        cancel: &CancelSignal,
    ) -> AppResult<StageOutcome> {
        let quiz_id = ctx.quiz.id.clone();
        let questions = self.deps.questions.list_by_quiz(&quiz_id).await?;
        if questions.is_empty() {
            return Err(AppError::Validation(
                "quiz has no questions to snapshot".to_string(),
            ));
        }
        let students = self.deps.directory.enrolled_students(&quiz_id).await?;
        if students.is_empty() {
            return Err(AppError::Validation("no students enrolled".to_string()));
        }

        let quiz_snapshot = freeze_quiz(&ctx.quiz, questions.len());
        let questions_snapshot = freeze_questions(&questions);

        let mut jobs = Vec::with_capacity(students.len());
        let mut already_sent = 0usize;
        for student in &students {
            let invitation = match self.invitations().current_for(&quiz_id, &student.id).await? {
                Some(inv) if inv.is_used || inv.is_sent() => None,
                Some(inv) => Some(inv),
                None => {
                    match self
                        .invitations()
                        .create_invitation(
                            &quiz_id,
                            &student.id,
                            quiz_snapshot.clone(),
                            questions_snapshot.clone(),
                            InsertMode::Exclusive,
                        )
                        .await
                    {
                        Ok(inv) => Some(inv),
                        Err(AppError::DuplicateActiveInvitation { .. }) => self
                            .invitations()
                            .current_for(&quiz_id, &student.id)
                            .await?
                            .filter(|inv| !inv.is_used && !inv.is_sent()),
                        Err(e) => return Err(e),
                    }
                }
            };

            match invitation {
                Some(inv) => jobs.push(self.invitations().invitation_job(&inv, student)),
                None => {
                    tracing::debug!(quiz_id, student_id = %student.id, "Already invited, skipping");
                    already_sent += 1;
                }
            }
        }

        if jobs.is_empty() {
            return Ok(StageOutcome::Done);
        }

        let outcomes = self.deps.dispatch.dispatch(jobs, cancel).await;
        let mut tally = DispatchTally::default();
        for outcome in &outcomes {
            self.invitations()
                .record_outcome(&outcome.job_id, outcome)
                .await?;
            tally_outcome(&mut tally, ctx, Stage::InvitationsSent, outcome);
        }

        tracing::info!(
            quiz_id,
            delivered = tally.delivered,
            failed = tally.failures,
            abandoned = tally.abandoned,
            already_sent,
            "Invitation dispatch finished"
        );
        finish_dispatch(&tally, already_sent, "invitations")
    }

    async fn check_completion(&self, quiz: &Quiz) -> AppResult<StageOutcome> {
        let invitations = self.invitations().list_for_quiz(&quiz.id).await?;
        let current: Vec<&Invitation> = invitations
            .iter()
            .filter(|inv| inv.superseded_at.is_none())
            .collect();
        let sent = current.iter().filter(|inv| inv.is_sent() || inv.is_used).count();
        let used = current.iter().filter(|inv| inv.is_used).count();
        let required = required_completions(sent, self.settings.min_completion_ratio);

        if used >= required {
            tracing::info!(quiz_id = %quiz.id, used, sent, "Completion threshold reached");
            Ok(StageOutcome::Done)
        } else {
            Ok(StageOutcome::Pending(Some(format!("{used}/{required}"))))
        }
    }

    async fn score(&self, quiz: &Quiz) -> AppResult<StageOutcome> {
        let answer_sets = self.deps.results.completed_answer_sets(&quiz.id).await?;
        if answer_sets.is_empty() {
            return Err(AppError::Validation("no completed attempts to score".to_string()));
        }

        let invitations: HashMap<String, Invitation> = self
            .invitations()
            .list_for_quiz(&quiz.id)
            .await?
            .into_iter()
            .map(|inv| (inv.id.clone(), inv))
            .collect();

        let mut attempts = Vec::with_capacity(answer_sets.len());
        for answers in answer_sets {
            let invitation = invitations.get(&answers.invitation_id).ok_or_else(|| {
                AppError::NotFound(format!("Invitation {}", answers.invitation_id))
            })?;
            let score = self.deps.scorer.score(invitation, &answers).await?;
            attempts.push(ScoredAttempt { answers, score });
        }

        let ranked = rank(&quiz.id, attempts, &self.id_gen);
        self.deps.results.save_rankings(&quiz.id, &ranked).await?;
        tracing::info!(quiz_id = %quiz.id, ranked = ranked.len(), "Results ranked");
        Ok(StageOutcome::Done)
    }

    async fn notify(&self, ctx: &mut RunContext, cancel: &CancelSignal) -> AppResult<StageOutcome> {
        let rankings = self.deps.results.rankings(&ctx.quiz.id).await?;
        if rankings.is_empty() {
            return Err(AppError::Validation("no ranked results to notify".to_string()));
        }
        let participants = rankings.len();
        let top: Vec<_> = rankings.into_iter().take(self.settings.top_n).collect();
        let already_notified = top.iter().filter(|r| r.notified_at.is_some()).count();

        let mut jobs: Vec<DispatchJob> = Vec::new();
        for result in top.iter().filter(|r| r.notified_at.is_none()) {
            let Some(student) = self.find_student(&result.student_id).await? else {
                ctx.recipient_failures.push(RecipientFailure {
                    stage: Stage::Notified,
                    recipient: result.student_id.clone(),
                    error: "student not found".to_string(),
                });
                continue;
            };
            let email = templates::qualification_email(
                &ctx.quiz,
                &student,
                result,
                participants,
                &self.settings.from_name,
            );
            jobs.push(DispatchJob::new(result.id.clone(), email));
        }

        let outcomes = if jobs.is_empty() {
            Vec::new()
        } else {
            self.deps.dispatch.dispatch(jobs, cancel).await
        };

        let mut tally = DispatchTally::default();
        for outcome in &outcomes {
            if outcome.is_delivered() {
                self.deps.results.mark_notified(&outcome.job_id, outcome.at).await?;
            }
            tally_outcome(&mut tally, ctx, Stage::Notified, outcome);
        }

        tracing::info!(
            quiz_id = %ctx.quiz.id,
            delivered = tally.delivered,
            failed = tally.failures,
            already_notified,
            "Qualification notices finished"
        );
        finish_dispatch(&tally, already_notified, "notifications")
    }

    fn invitations(&self) -> &InvitationService {
        &self.deps.invitations
    }

    async fn find_student(&self, student_id: &str) -> AppResult<Option<Student>> {
        self.deps.directory.find_student(student_id).await
    }
}

/// Every stage before `stage` must be done.
fn check_prerequisites(run: &WorkflowRun, stage: Stage) -> AppResult<()> {
    for earlier in &Stage::ALL[..stage.index()] {
        let record = run.record(*earlier);
        match record.status {
            StageStatus::Done => {}
            StageStatus::Failed => {
                return Err(AppError::StageAlreadyFailed {
                    stage: earlier.to_string(),
                    error: record.error.clone().unwrap_or_default(),
                });
            }
            StageStatus::Pending => {
                return Err(AppError::Conflict(format!(
                    "{stage} requires {earlier} to be done"
                )));
            }
        }
    }
    Ok(())
}

/// `max(1, ceil(ratio × sent))`.
fn required_completions(sent: usize, ratio: f64) -> usize {
    let ratio = ratio.clamp(0.0, 1.0);
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let required = (sent as f64 * ratio).ceil() as usize;
    required.max(1)
}

fn tally_outcome(
    tally: &mut DispatchTally,
    ctx: &mut RunContext,
    stage: Stage,
    outcome: &DispatchOutcome,
) {
    match &outcome.status {
        DispatchStatus::Delivered { .. } => tally.delivered += 1,
        DispatchStatus::Failed { error, permanent } => {
            tally.failures += 1;
            if *permanent {
                tally.permanent_failures += 1;
            }
            ctx.recipient_failures.push(RecipientFailure {
                stage,
                recipient: outcome.recipient.clone(),
                error: error.clone(),
            });
        }
        DispatchStatus::Abandoned => {
            tally.abandoned += 1;
            ctx.cancelled = true;
        }
    }
}

/// Fold a dispatch tally into a stage outcome.
///
/// Abandoned sends keep the stage pending. The stage fails only when nothing
/// was delivered now or earlier.
fn finish_dispatch(
    tally: &DispatchTally,
    previously_delivered: usize,
    what: &str,
) -> AppResult<StageOutcome> {
    if tally.abandoned > 0 {
        return Ok(StageOutcome::Pending(Some("cancelled".to_string())));
    }
    if tally.delivered + previously_delivered > 0 {
        return Ok(StageOutcome::Done);
    }

    let message = format!("no {what} delivered ({} failed)", tally.failures);
    if tally.failures > 0 && tally.permanent_failures == tally.failures {
        Err(AppError::SendPermanent(message))
    } else {
        Err(AppError::SendTransient(message))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::cancel::cancel_pair;
    use crate::services::scoring::SnapshotScorer;
    use crate::testing::{
        FlakyQuestionStore, RecordingDispatch, ScriptedGenerator, seed_questions, seed_roster,
        valid_question,
    };
    use quizflow_common::config::FrontendConfig;
    use quizflow_db::MemoryStore;
    use quizflow_db::models::{StageRecord, SubmittedAnswer};
    use quizflow_db::store::InvitationStore;

    const ADMIN: &str = "admin1";

    struct Harness {
        store: MemoryStore,
        dispatch: Arc<RecordingDispatch>,
        generator: Arc<ScriptedGenerator>,
        invitations: InvitationService,
        orchestrator: WorkflowOrchestrator,
    }

    fn harness_with(
        store: MemoryStore,
        questions: Arc<dyn QuestionStore>,
        dispatch: RecordingDispatch,
        generator: ScriptedGenerator,
        top_n: usize,
    ) -> Harness {
        let dispatch = Arc::new(dispatch);
        let generator = Arc::new(generator);
        let invitations = InvitationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            dispatch.clone(),
            FrontendConfig::default(),
            "Quizflow",
        );
        let orchestrator = WorkflowOrchestrator::new(
            WorkflowDependencies {
                workflows: Arc::new(store.clone()),
                questions,
                directory: Arc::new(store.clone()),
                results: Arc::new(store.clone()),
                invitations: invitations.clone(),
                dispatch: dispatch.clone(),
                generator: generator.clone(),
                scorer: Arc::new(SnapshotScorer),
            },
            WorkflowSettings {
                top_n,
                min_completion_ratio: 1.0,
                from_name: "Quizflow".to_string(),
            },
        );
        Harness {
            store,
            dispatch,
            generator,
            invitations,
            orchestrator,
        }
    }

    async fn harness(dispatch: RecordingDispatch, generator: ScriptedGenerator) -> Harness {
        let store = MemoryStore::new();
        seed_roster(&store, "quiz1", ADMIN, 3).await;
        harness_with(store.clone(), Arc::new(store), dispatch, generator, 2)
    }

    fn five_questions() -> ScriptedGenerator {
        ScriptedGenerator::returning((0..5).map(valid_question).collect())
    }

    fn admin() -> AdminIdentity {
        AdminIdentity::new(ADMIN)
    }

    #[tokio::test]
    async fn test_run_complete_sends_one_invitation_per_student() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            result.steps_completed,
            [Stage::QuestionsGenerated, Stage::InvitationsSent]
        );
        assert!(result.pending_stages.contains(&Stage::AwaitingCompletion));
        assert_eq!(h.dispatch.sent().await.len(), 3);

        let invitations = h.invitations.list_for_quiz("quiz1").await.unwrap();
        assert_eq!(invitations.len(), 3);
        assert!(invitations.iter().all(|i| !i.is_used && i.is_sent()));
        assert!(invitations.iter().all(|i| i.questions_snapshot.len() == 5));
        assert_eq!(QuestionStore::list_by_quiz(&h.store, "quiz1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_resume_skips_done_stage_and_retries_failed() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;
        for question in seed_questions("quiz1", 5) {
            QuestionStore::insert(&h.store, question).await.unwrap();
        }
        let now = Utc::now();
        let mut generated = StageRecord::pending(Stage::QuestionsGenerated, now);
        generated.mark_done(now);
        let mut sent = StageRecord::pending(Stage::InvitationsSent, now);
        sent.mark_failed("SMTP outage", now);
        h.store.save_stage("quiz1", &generated).await.unwrap();
        h.store.save_stage("quiz1", &sent).await.unwrap();

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(h.generator.calls(), 0);
        assert!(result.steps_completed.contains(&Stage::InvitationsSent));
        assert!(result.errors.is_empty());
        assert_eq!(h.dispatch.sent().await.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_question_persists_nothing() {
        let mut batch: Vec<_> = (0..10).map(valid_question).collect();
        batch[6].correct_answer = "Option Z".to_string();
        let h = harness(
            RecordingDispatch::delivering("brevo"),
            ScriptedGenerator::returning(batch),
        )
        .await;

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("QUESTIONS_GENERATED: "));
        assert!(QuestionStore::list_by_quiz(&h.store, "quiz1").await.unwrap().is_empty());
        assert!(h.dispatch.sent().await.is_empty());
        assert!(result.pending_stages.contains(&Stage::InvitationsSent));
    }

    #[tokio::test]
    async fn test_write_failure_rolls_back_generated_questions() {
        let store = MemoryStore::new();
        seed_roster(&store, "quiz1", ADMIN, 3).await;
        let questions = Arc::new(FlakyQuestionStore::new(Some(6)));
        let h = harness_with(
            store,
            questions.clone(),
            RecordingDispatch::delivering("brevo"),
            ScriptedGenerator::returning((0..10).map(valid_question).collect()),
            2,
        );

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(!result.success);
        assert!(questions.list_by_quiz("quiz1").await.unwrap().is_empty());
        assert_eq!(questions.deleted().await.len(), 6);
    }

    #[tokio::test]
    async fn test_leftovers_from_failed_rollback_are_never_adopted() {
        let store = MemoryStore::new();
        seed_roster(&store, "quiz1", ADMIN, 3).await;
        // The fourth insert fails and the compensating deletes fail too.
        let questions = Arc::new(FlakyQuestionStore::new(Some(3)));
        questions.fail_deletes(true);
        let h = harness_with(
            store,
            questions.clone(),
            RecordingDispatch::delivering("brevo"),
            ScriptedGenerator::returning((0..10).map(valid_question).collect()),
            2,
        );

        let first = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();
        assert!(!first.success);
        assert_eq!(questions.list_by_quiz("quiz1").await.unwrap().len(), 3);

        let second = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();
        assert!(!second.success);
        assert!(!second.steps_completed.contains(&Stage::QuestionsGenerated));
        assert_eq!(h.generator.calls(), 1);
        assert!(h.dispatch.sent().await.is_empty());
        assert!(h.invitations.list_for_quiz("quiz1").await.unwrap().is_empty());

        questions.fail_deletes(false);
        let third = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();
        assert!(third.steps_completed.contains(&Stage::InvitationsSent));
        assert_eq!(questions.list_by_quiz("quiz1").await.unwrap().len(), 10);
        let invitations = h.invitations.list_for_quiz("quiz1").await.unwrap();
        assert_eq!(invitations.len(), 3);
        assert!(invitations.iter().all(|i| i.questions_snapshot.len() == 10));
    }

    #[tokio::test]
    async fn test_generator_failure_is_reported() {
        let h = harness(
            RecordingDispatch::delivering("brevo"),
            ScriptedGenerator::failing("model overloaded"),
        )
        .await;

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.errors[0].contains("model overloaded"));
        assert!(QuestionStore::list_by_quiz(&h.store, "quiz1").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_do_not_duplicate_side_effects() {
        let h = harness(
            RecordingDispatch::delivering("brevo"),
            five_questions().with_delay(std::time::Duration::from_millis(20)),
        )
        .await;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let orchestrator = h.orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .run_complete(&admin(), "quiz1", &CancelSignal::never())
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().success);
        }

        assert_eq!(h.generator.calls(), 1);
        assert_eq!(QuestionStore::list_by_quiz(&h.store, "quiz1").await.unwrap().len(), 5);
        assert_eq!(h.store.invitation_count().await, 3);
        assert_eq!(h.dispatch.sent().await.len(), 3);
        assert_eq!(h.orchestrator.tracked_locks().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_quizzes_run_independently() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;
        seed_roster(&h.store, "quiz2", ADMIN, 2).await;

        let admin = admin();
        let never = CancelSignal::never();
        let (a, b) = tokio::join!(
            h.orchestrator.run_complete(&admin, "quiz1", &never),
            h.orchestrator.run_complete(&admin, "quiz2", &never),
        );

        assert!(a.unwrap().success);
        assert!(b.unwrap().success);
        assert_eq!(h.store.invitation_count().await, 5);
        assert_eq!(h.orchestrator.tracked_locks().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_leaves_stage_pending() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;
        let (handle, signal) = cancel_pair();
        h.dispatch.cancel_before_dispatch(handle).await;

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &signal)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert!(result.success);
        assert_eq!(result.steps_completed, [Stage::QuestionsGenerated]);
        assert!(result.pending_stages.contains(&Stage::InvitationsSent));
        assert!(
            h.invitations
                .list_for_quiz("quiz1")
                .await
                .unwrap()
                .iter()
                .all(|i| !i.is_sent())
        );

        // A later run reuses the unsent invitations.
        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();
        assert!(result.steps_completed.contains(&Stage::InvitationsSent));
        assert_eq!(h.store.invitation_count().await, 3);
        assert_eq!(h.dispatch.sent().await.len(), 3);
    }

    #[tokio::test]
    async fn test_partial_dispatch_failure_keeps_stage_done() {
        let h = harness(
            RecordingDispatch::failing_for("brevo", &["student-2@example.com"]),
            five_questions(),
        )
        .await;

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(result.steps_completed.contains(&Stage::InvitationsSent));
        assert_eq!(result.recipient_failures.len(), 1);
        assert_eq!(result.recipient_failures[0].recipient, "student-2@example.com");

        let failed = h
            .invitations
            .list_for_quiz("quiz1")
            .await
            .unwrap()
            .into_iter()
            .filter(|i| i.last_error.is_some())
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_all_dispatches_failing_fails_stage() {
        let h = harness(RecordingDispatch::failing_permanently("brevo"), five_questions()).await;

        let result = h
            .orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.recipient_failures.len(), 3);
        assert!(result.errors[0].starts_with("INVITATIONS_SENT: "));
    }

    #[tokio::test]
    async fn test_scoring_blocked_until_invitations_sent() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;

        let result = h
            .orchestrator
            .run_scoring(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(result.blocked.is_some());
        assert!(result.steps_completed.is_empty());
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_scoring_refuses_failed_prerequisite() {
        let h = harness(RecordingDispatch::failing_permanently("brevo"), five_questions()).await;
        h.orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        let result = h
            .orchestrator
            .run_scoring(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        let blocked = result.blocked.unwrap();
        assert!(blocked.contains("INVITATIONS_SENT"));
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_full_lifecycle_notifies_top_ranked() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;
        h.orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        // student-1 answers everything right, student-2 two, student-3 none.
        for invitation in h.invitations.list_for_quiz("quiz1").await.unwrap() {
            let right = match invitation.student_id.as_str() {
                "student-1" => 5,
                "student-2" => 2,
                _ => 0,
            };
            let answers = (1..=5)
                .map(|order| SubmittedAnswer {
                    question_order: order,
                    answer: if order <= right { "Option A" } else { "Option B" }.to_string(),
                })
                .collect();
            h.invitations
                .submit(&invitation.token, answers)
                .await
                .unwrap();
        }

        let result = h
            .orchestrator
            .run_scoring(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.steps_completed, Stage::ALL);
        let rankings = h.store.rankings("quiz1").await.unwrap();
        assert_eq!(rankings[0].student_id, "student-1");
        assert_eq!(rankings[0].rank, 1);
        assert_eq!(rankings[1].student_id, "student-2");

        let notices: Vec<_> = h
            .dispatch
            .sent()
            .await
            .into_iter()
            .filter(|job| job.email.subject.starts_with("Congratulations"))
            .collect();
        assert_eq!(notices.len(), 2);
        assert!(rankings[..2].iter().all(|r| r.notified_at.is_some()));
        assert!(rankings[2].notified_at.is_none());

        // Everything is done, so a re-run sends nothing new.
        let before = h.dispatch.sent().await.len();
        h.orchestrator
            .run_automated(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(h.dispatch.sent().await.len(), before);
    }

    #[tokio::test]
    async fn test_awaiting_completion_reports_progress() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;
        h.orchestrator
            .run_complete(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();
        let first = h.invitations.list_for_quiz("quiz1").await.unwrap().remove(0);
        h.store.mark_used(&first.id, Utc::now()).await.unwrap();

        let result = h
            .orchestrator
            .run_scoring(&admin(), "quiz1", &CancelSignal::never())
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.pending_stages.contains(&Stage::AwaitingCompletion));
        let run = h.store.find("quiz1").await.unwrap().unwrap();
        assert_eq!(
            run.record(Stage::AwaitingCompletion).error.as_deref(),
            Some("1/3")
        );
    }

    #[tokio::test]
    async fn test_status_does_not_execute() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;

        let status = h.orchestrator.status(&admin(), "quiz1").await.unwrap();

        assert!(status.success);
        assert_eq!(status.pending_stages.len(), 5);
        assert_eq!(h.generator.calls(), 0);
        assert!(h.store.find("quiz1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_admin_is_forbidden() {
        let h = harness(RecordingDispatch::delivering("brevo"), five_questions()).await;

        let result = h
            .orchestrator
            .run_automated(&AdminIdentity::new("intruder"), "quiz1", &CancelSignal::never())
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(h.generator.calls(), 0);
    }

    #[test]
    fn test_required_completions() {
        assert_eq!(required_completions(3, 1.0), 3);
        assert_eq!(required_completions(3, 0.5), 2);
        assert_eq!(required_completions(0, 1.0), 1);
        assert_eq!(required_completions(10, 0.0), 1);
    }
}
