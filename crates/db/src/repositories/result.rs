//! Answer set and ranking repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quizflow_common::{AppError, AppResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};

use crate::entities::{AnswerSet as AnswerSetEntity, QuizResult, answer_set, quiz_result};
use crate::models::{AnswerSet, RankedResult};
use crate::store::ResultStore;

/// Result repository for database operations.
#[derive(Clone)]
pub struct ResultRepository {
    db: Arc<DatabaseConnection>,
}

impl ResultRepository {
    /// Create a new result repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn answer_set_to_domain(model: answer_set::Model) -> AppResult<AnswerSet> {
    let answers = serde_json::from_value(model.answers).map_err(|e| {
        AppError::Database(format!("corrupt answers on answer set {}: {e}", model.id))
    })?;
    Ok(AnswerSet {
        id: model.id,
        quiz_id: model.quiz_id,
        student_id: model.student_id,
        invitation_id: model.invitation_id,
        answers,
        completed_at: model.completed_at.with_timezone(&Utc),
    })
}

fn result_to_domain(model: quiz_result::Model) -> RankedResult {
    RankedResult {
        id: model.id,
        quiz_id: model.quiz_id,
        student_id: model.student_id,
        invitation_id: model.invitation_id,
        correct: model.correct as u32,
        total: model.total as u32,
        percentage: model.percentage,
        rank: model.rank as u32,
        completed_at: model.completed_at.with_timezone(&Utc),
        notified_at: model.notified_at.map(|t| t.with_timezone(&Utc)),
    }
}

#[async_trait]
impl ResultStore for ResultRepository {
    async fn record_answers(&self, answers: AnswerSet) -> AppResult<()> {
        let payload =
            serde_json::to_value(&answers.answers).map_err(|e| AppError::Internal(e.to_string()))?;
        let invitation_id = answers.invitation_id.clone();

        answer_set::ActiveModel {
            id: Set(answers.id),
            quiz_id: Set(answers.quiz_id),
            student_id: Set(answers.student_id),
            invitation_id: Set(answers.invitation_id),
            answers: Set(payload),
            completed_at: Set(answers.completed_at.into()),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Conflict(format!(
                "answers already recorded for invitation {invitation_id}"
            )),
            _ => AppError::Database(e.to_string()),
        })?;
        Ok(())
    }

    async fn completed_answer_sets(&self, quiz_id: &str) -> AppResult<Vec<AnswerSet>> {
        AnswerSetEntity::find()
            .filter(answer_set::Column::QuizId.eq(quiz_id))
            .order_by_asc(answer_set::Column::CompletedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(answer_set_to_domain)
            .collect()
    }

    async fn save_rankings(&self, quiz_id: &str, results: &[RankedResult]) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let notified: HashMap<String, DateTimeWithTimeZone> = QuizResult::find()
            .filter(quiz_result::Column::QuizId.eq(quiz_id))
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .filter_map(|r| r.notified_at.map(|at| (r.invitation_id, at)))
            .collect();

        QuizResult::delete_many()
            .filter(quiz_result::Column::QuizId.eq(quiz_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let rows: Vec<quiz_result::ActiveModel> = results
            .iter()
            .map(|r| quiz_result::ActiveModel {
                id: Set(r.id.clone()),
                quiz_id: Set(r.quiz_id.clone()),
                student_id: Set(r.student_id.clone()),
                invitation_id: Set(r.invitation_id.clone()),
                correct: Set(r.correct as i32),
                total: Set(r.total as i32),
                percentage: Set(r.percentage),
                rank: Set(r.rank as i32),
                completed_at: Set(r.completed_at.into()),
                notified_at: Set(notified
                    .get(&r.invitation_id)
                    .copied()
                    .or_else(|| r.notified_at.map(Into::into))),
                created_at: Set(now),
            })
            .collect();

        if !rows.is_empty() {
            QuizResult::insert_many(rows)
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn rankings(&self, quiz_id: &str) -> AppResult<Vec<RankedResult>> {
        Ok(QuizResult::find()
            .filter(quiz_result::Column::QuizId.eq(quiz_id))
            .order_by_asc(quiz_result::Column::Rank)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(result_to_domain)
            .collect())
    }

    async fn mark_notified(&self, result_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let notified_at: DateTimeWithTimeZone = at.into();
        let result = QuizResult::update_many()
            .col_expr(quiz_result::Column::NotifiedAt, Expr::value(notified_at))
            .filter(quiz_result::Column::Id.eq(result_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("result {result_id}")));
        }
        Ok(())
    }
}
