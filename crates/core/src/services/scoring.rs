//! Scoring and ranking of completed attempts.

use std::cmp::Ordering;

use async_trait::async_trait;
use quizflow_common::{AppResult, IdGenerator};
use quizflow_db::models::{AnswerSet, Invitation, RankedResult};

/// Score of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
}

impl ScoreCard {
    /// Build a score, computing the percentage (0 when `total` is 0).
    #[must_use]
    pub fn new(correct: u32, total: u32) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            f64::from(correct) / f64::from(total) * 100.0
        };
        Self {
            correct,
            total,
            percentage,
        }
    }
}

/// External scoring of one attempt against the questions it was taken on.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, invitation: &Invitation, answers: &AnswerSet) -> AppResult<ScoreCard>;
}

/// Scores against the invitation's frozen question snapshot.
///
/// An answer counts when it equals the snapshot's `correct_answer` for the
/// question with the same `order`; unanswered questions count as wrong.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotScorer;

#[async_trait]
impl Scorer for SnapshotScorer {
    async fn score(&self, invitation: &Invitation, answers: &AnswerSet) -> AppResult<ScoreCard> {
        let questions = &invitation.questions_snapshot;
        let correct = questions
            .iter()
            .filter(|q| {
                answers
                    .answers
                    .iter()
                    .any(|a| a.question_order == q.order && a.answer == q.correct_answer)
            })
            .count();

        Ok(ScoreCard::new(
            u32::try_from(correct).unwrap_or(u32::MAX),
            u32::try_from(questions.len()).unwrap_or(u32::MAX),
        ))
    }
}

/// One scored attempt awaiting a rank.
#[derive(Debug, Clone)]
pub struct ScoredAttempt {
    pub answers: AnswerSet,
    pub score: ScoreCard,
}

/// Rank attempts best first.
///
/// Order is correct count descending, then percentage descending, then
/// earlier completion. Ranks start at 1.
#[must_use]
pub fn rank(quiz_id: &str, mut attempts: Vec<ScoredAttempt>, id_gen: &IdGenerator) -> Vec<RankedResult> {
    attempts.sort_by(|a, b| {
        b.score
            .correct
            .cmp(&a.score.correct)
            .then_with(|| {
                b.score
                    .percentage
                    .partial_cmp(&a.score.percentage)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.answers.completed_at.cmp(&b.answers.completed_at))
    });

    attempts
        .into_iter()
        .zip(1u32..)
        .map(|(attempt, rank)| RankedResult {
            id: id_gen.generate(),
            quiz_id: quiz_id.to_string(),
            student_id: attempt.answers.student_id,
            invitation_id: attempt.answers.invitation_id,
            correct: attempt.score.correct,
            total: attempt.score.total,
            percentage: attempt.score.percentage,
            rank,
            completed_at: attempt.answers.completed_at,
            notified_at: None,
        })
        .collect()
}
