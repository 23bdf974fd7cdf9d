//! Invitation service.
//!
//! Owns the invitation lifecycle: issuing a token bound to a frozen snapshot,
//! redeeming it exactly once, and the admin-side list, resend, reissue and
//! delete operations.
//!
//! Resend reuses the existing invitation id and token and only refreshes
//! `sent_at`. Reissue is the one path that retires an invitation: the old
//! record is kept for audit and its token stops working.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use quizflow_common::config::FrontendConfig;
use quizflow_common::{AdminIdentity, AppError, AppResult, IdGenerator, TokenIssuer};
use quizflow_db::models::{
    AnswerSet, InsertMode, Invitation, QuestionSnapshot, QuizSnapshot, Student, SubmittedAnswer,
};
use quizflow_db::store::{InvitationStore, QuizDirectory, ResultStore};
use serde::{Deserialize, Serialize};

use super::access::owned_quiz;
use super::cancel::CancelSignal;
use super::delivery::{DispatchJob, DispatchOutcome, DispatchService, DispatchStatus};
use super::templates;

/// What a student sees when opening an invitation link.
///
/// Same shape as the stored snapshot minus the correct answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuizView {
    pub token: String,
    pub is_used: bool,
    pub sent_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
    pub quiz_snapshot: QuizSnapshot,
    pub questions: Vec<StudentQuestion>,
}

/// One question without its answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub time_limit: u32,
    pub order: u32,
}

impl From<&Invitation> for StudentQuizView {
    fn from(invitation: &Invitation) -> Self {
        Self {
            token: invitation.token.clone(),
            is_used: invitation.is_used,
            sent_at: invitation.sent_at,
            created_at: invitation.created_at,
            quiz_snapshot: invitation.quiz_snapshot.clone(),
            questions: invitation
                .questions_snapshot
                .iter()
                .map(|q| StudentQuestion {
                    question_text: q.question_text.clone(),
                    options: q.options.clone(),
                    time_limit: q.time_limit,
                    order: q.order,
                })
                .collect(),
        }
    }
}

/// Service for managing invitations.
#[derive(Clone)]
pub struct InvitationService {
    invitations: Arc<dyn InvitationStore>,
    results: Arc<dyn ResultStore>,
    directory: Arc<dyn QuizDirectory>,
    dispatch: DispatchService,
    tokens: TokenIssuer,
    id_gen: IdGenerator,
    frontend: FrontendConfig,
    from_name: String,
}

impl InvitationService {
    /// Create a new invitation service.
    #[must_use]
    pub fn new(
        invitations: Arc<dyn InvitationStore>,
        results: Arc<dyn ResultStore>,
        directory: Arc<dyn QuizDirectory>,
        dispatch: DispatchService,
        frontend: FrontendConfig,
        from_name: impl Into<String>,
    ) -> Self {
        Self {
            invitations,
            results,
            directory,
            dispatch,
            tokens: TokenIssuer::new(),
            id_gen: IdGenerator::new(),
            frontend,
            from_name: from_name.into(),
        }
    }

    // ==================== Lifecycle ====================

    /// Create an invitation bound to a fresh token and the given snapshot.
    ///
    /// With [`InsertMode::Exclusive`] an existing active invitation for the
    /// pair fails with `DuplicateActiveInvitation`; with
    /// [`InsertMode::Supersede`] it is retired and kept for audit.
    pub async fn create_invitation(
        &self,
        quiz_id: &str,
        student_id: &str,
        quiz_snapshot: QuizSnapshot,
        questions_snapshot: Vec<QuestionSnapshot>,
        mode: InsertMode,
    ) -> AppResult<Invitation> {
        if questions_snapshot.is_empty() {
            return Err(AppError::Validation(
                "Invitation snapshot must contain at least one question".to_string(),
            ));
        }

        let invitation = Invitation {
            id: self.id_gen.generate(),
            quiz_id: quiz_id.to_string(),
            student_id: student_id.to_string(),
            token: self.tokens.issue(),
            created_at: Utc::now(),
            sent_at: None,
            is_used: false,
            used_at: None,
            superseded_at: None,
            superseded_by: None,
            last_error: None,
            quiz_snapshot,
            questions_snapshot,
        };

        let created = self.invitations.insert(invitation, mode).await?;
        tracing::debug!(
            quiz_id,
            student_id,
            invitation_id = %created.id,
            ?mode,
            "Invitation created"
        );
        Ok(created)
    }

    /// Look up an invitation by its token.
    ///
    /// Used invitations are returned so callers can report their state; a
    /// superseded token fails with `Superseded`.
    pub async fn get_by_token(&self, token: &str) -> AppResult<Invitation> {
        let invitation = self
            .invitations
            .find_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Invitation".to_string()))?;

        if invitation.superseded_at.is_some() {
            return Err(AppError::Superseded(invitation.id));
        }
        Ok(invitation)
    }

    /// Student-facing view of a token, without correct answers.
    pub async fn student_view(&self, token: &str) -> AppResult<StudentQuizView> {
        let invitation = self.get_by_token(token).await?;
        Ok(StudentQuizView::from(&invitation))
    }

    /// Flip `is_used` from false to true.
    ///
    /// Exactly one of any number of concurrent callers succeeds; the rest get
    /// `AlreadyUsed` (or `Superseded` if the invitation was retired).
    pub async fn mark_used(&self, invitation_id: &str) -> AppResult<()> {
        self.claim(invitation_id).await.map(|_| ())
    }

    /// [`mark_used`](Self::mark_used), returning the claim instant.
    ///
    /// The instant is truncated to microseconds so it compares equal after a
    /// round trip through the database.
    async fn claim(&self, invitation_id: &str) -> AppResult<DateTime<Utc>> {
        let claimed_at = Utc::now().trunc_subsecs(6);
        if self.invitations.mark_used(invitation_id, claimed_at).await? {
            tracing::info!(invitation_id, "Invitation redeemed");
            return Ok(claimed_at);
        }

        match self.invitations.find_by_id(invitation_id).await? {
            None => Err(AppError::NotFound(format!("Invitation {invitation_id}"))),
            Some(inv) if inv.superseded_at.is_some() => {
                Err(AppError::Superseded(invitation_id.to_string()))
            }
            Some(_) => Err(AppError::AlreadyUsed(invitation_id.to_string())),
        }
    }

    /// Redeem a token and store the answers.
    ///
    /// The used flag is claimed first, so only the winning submission is
    /// recorded and a quiz can never be scored twice for one invitation. If
    /// the answers cannot be stored the claim is released and the student
    /// may submit again.
    pub async fn submit(&self, token: &str, answers: Vec<SubmittedAnswer>) -> AppResult<AnswerSet> {
        let invitation = self.get_by_token(token).await?;

        if let Some(unknown) = answers.iter().find(|a| {
            !invitation
                .questions_snapshot
                .iter()
                .any(|q| q.order == a.question_order)
        }) {
            return Err(AppError::Validation(format!(
                "Answer references unknown question {}",
                unknown.question_order
            )));
        }

        let claimed_at = self.claim(&invitation.id).await?;

        let answer_set = AnswerSet {
            id: self.id_gen.generate(),
            quiz_id: invitation.quiz_id.clone(),
            student_id: invitation.student_id.clone(),
            invitation_id: invitation.id.clone(),
            answers,
            completed_at: Utc::now(),
        };
        if let Err(e) = self.results.record_answers(answer_set.clone()).await {
            tracing::warn!(
                invitation_id = %invitation.id,
                error = %e,
                "Failed to store answers, releasing claim"
            );
            match self.invitations.release_use(&invitation.id, claimed_at).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::error!(invitation_id = %invitation.id, "Claim changed before release");
                }
                Err(release_err) => {
                    tracing::error!(
                        invitation_id = %invitation.id,
                        error = %release_err,
                        "Failed to release claim"
                    );
                }
            }
            return Err(e);
        }

        tracing::info!(
            quiz_id = %invitation.quiz_id,
            student_id = %invitation.student_id,
            "Quiz submitted"
        );
        Ok(answer_set)
    }

    /// Current (non-superseded) invitation for a pair.
    pub async fn current_for(&self, quiz_id: &str, student_id: &str) -> AppResult<Option<Invitation>> {
        self.invitations.find_current(quiz_id, student_id).await
    }

    /// All invitations of a quiz, oldest first.
    pub async fn list_for_quiz(&self, quiz_id: &str) -> AppResult<Vec<Invitation>> {
        self.invitations.list_by_quiz(quiz_id).await
    }

    // ==================== Admin Operations ====================

    /// Invitations of one quiz the admin owns.
    pub async fn list_by_quiz(
        &self,
        admin: &AdminIdentity,
        quiz_id: &str,
    ) -> AppResult<Vec<Invitation>> {
        owned_quiz(self.directory.as_ref(), admin, quiz_id).await?;
        self.invitations.list_by_quiz(quiz_id).await
    }

    /// Invitations across every quiz the admin owns.
    pub async fn list_by_admin(&self, admin: &AdminIdentity) -> AppResult<Vec<Invitation>> {
        let quizzes = self.directory.list_quizzes_by_admin(&admin.id).await?;
        let mut all = Vec::new();
        for quiz in quizzes {
            all.extend(self.invitations.list_by_quiz(&quiz.id).await?);
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    /// Send an invitation email again with the same token.
    pub async fn resend(
        &self,
        admin: &AdminIdentity,
        invitation_id: &str,
    ) -> AppResult<DispatchOutcome> {
        let invitation = self.find_owned(admin, invitation_id).await?;
        if invitation.superseded_at.is_some() {
            return Err(AppError::Superseded(invitation.id));
        }
        if invitation.is_used {
            return Err(AppError::AlreadyUsed(invitation.id));
        }

        let student = self.student(&invitation.student_id).await?;
        let job = self.invitation_job(&invitation, &student);
        let outcome = self
            .dispatch
            .dispatch(vec![job], &CancelSignal::never())
            .await
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("dispatch returned no outcome".to_string()))?;

        self.record_outcome(&invitation.id, &outcome).await?;

        match &outcome.status {
            DispatchStatus::Delivered { .. } => Ok(outcome),
            DispatchStatus::Failed {
                error,
                permanent: true,
            } => Err(AppError::SendPermanent(error.clone())),
            DispatchStatus::Failed { error, .. } => Err(AppError::SendTransient(error.clone())),
            DispatchStatus::Abandoned => Err(AppError::Cancelled("resend".to_string())),
        }
    }

    /// Retire an invitation and issue a new token with the same snapshot.
    pub async fn reissue(&self, admin: &AdminIdentity, invitation_id: &str) -> AppResult<Invitation> {
        let old = self.find_owned(admin, invitation_id).await?;
        if old.is_used {
            return Err(AppError::AlreadyUsed(old.id));
        }
        if old.superseded_at.is_some() {
            return Err(AppError::Superseded(old.id));
        }

        let replacement = self
            .create_invitation(
                &old.quiz_id,
                &old.student_id,
                old.quiz_snapshot.clone(),
                old.questions_snapshot.clone(),
                InsertMode::Supersede,
            )
            .await?;

        tracing::info!(
            old_id = %old.id,
            new_id = %replacement.id,
            "Invitation reissued"
        );
        Ok(replacement)
    }

    /// Delete an invitation.
    pub async fn delete(&self, admin: &AdminIdentity, invitation_id: &str) -> AppResult<()> {
        let invitation = self.find_owned(admin, invitation_id).await?;
        self.invitations.delete(&invitation.id).await?;
        tracing::info!(invitation_id, quiz_id = %invitation.quiz_id, "Invitation deleted");
        Ok(())
    }

    // ==================== Dispatch Helpers ====================

    /// Link a student follows to take the quiz.
    #[must_use]
    pub fn quiz_link(&self, invitation: &Invitation) -> String {
        self.frontend.quiz_link(&invitation.token)
    }

    /// Build the dispatch job for an invitation email. The job id is the
    /// invitation id.
    #[must_use]
    pub fn invitation_job(&self, invitation: &Invitation, student: &Student) -> DispatchJob {
        let email = templates::invitation_email(
            &invitation.quiz_snapshot,
            student,
            &self.quiz_link(invitation),
            &self.from_name,
        );
        DispatchJob::new(invitation.id.clone(), email)
    }

    /// Write a dispatch outcome back onto its invitation.
    ///
    /// Abandoned jobs leave the invitation untouched.
    pub async fn record_outcome(&self, invitation_id: &str, outcome: &DispatchOutcome) -> AppResult<()> {
        match &outcome.status {
            DispatchStatus::Delivered { .. } => {
                self.invitations.mark_sent(invitation_id, outcome.at).await
            }
            DispatchStatus::Failed { error, .. } => {
                self.invitations.record_send_failure(invitation_id, error).await
            }
            DispatchStatus::Abandoned => Ok(()),
        }
    }

    async fn find_owned(&self, admin: &AdminIdentity, invitation_id: &str) -> AppResult<Invitation> {
        let invitation = self
            .invitations
            .find_by_id(invitation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invitation {invitation_id}")))?;
        owned_quiz(self.directory.as_ref(), admin, &invitation.quiz_id).await?;
        Ok(invitation)
    }

    async fn student(&self, student_id: &str) -> AppResult<Student> {
        self.directory
            .find_student(student_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {student_id}")))
    }
}
