//! Invitation repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quizflow_common::{AppError, AppResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};

use crate::entities::{Invitation as InvitationEntity, invitation};
use crate::models::{InsertMode, Invitation};
use crate::store::InvitationStore;

/// Invitation repository for database operations.
#[derive(Clone)]
pub struct InvitationRepository {
    db: Arc<DatabaseConnection>,
}

impl InvitationRepository {
    /// Create a new invitation repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn exists(&self, id: &str) -> AppResult<bool> {
        Ok(InvitationEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .is_some())
    }
}

fn to_domain(model: invitation::Model) -> AppResult<Invitation> {
    let quiz_snapshot = serde_json::from_value(model.quiz_snapshot).map_err(|e| {
        AppError::Database(format!("corrupt quiz snapshot on invitation {}: {e}", model.id))
    })?;
    let questions_snapshot = serde_json::from_value(model.questions_snapshot).map_err(|e| {
        AppError::Database(format!(
            "corrupt questions snapshot on invitation {}: {e}",
            model.id
        ))
    })?;

    Ok(Invitation {
        id: model.id,
        quiz_id: model.quiz_id,
        student_id: model.student_id,
        token: model.token,
        created_at: model.created_at.with_timezone(&Utc),
        sent_at: model.sent_at.map(|t| t.with_timezone(&Utc)),
        is_used: model.is_used,
        used_at: model.used_at.map(|t| t.with_timezone(&Utc)),
        superseded_at: model.superseded_at.map(|t| t.with_timezone(&Utc)),
        superseded_by: model.superseded_by,
        last_error: model.last_error,
        quiz_snapshot,
        questions_snapshot,
    })
}

fn to_active_model(invitation: &Invitation) -> AppResult<invitation::ActiveModel> {
    let quiz_snapshot = serde_json::to_value(&invitation.quiz_snapshot)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let questions_snapshot = serde_json::to_value(&invitation.questions_snapshot)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(invitation::ActiveModel {
        id: Set(invitation.id.clone()),
        quiz_id: Set(invitation.quiz_id.clone()),
        student_id: Set(invitation.student_id.clone()),
        token: Set(invitation.token.clone()),
        quiz_snapshot: Set(quiz_snapshot),
        questions_snapshot: Set(questions_snapshot),
        is_used: Set(invitation.is_used),
        used_at: Set(invitation.used_at.map(Into::into)),
        sent_at: Set(invitation.sent_at.map(Into::into)),
        superseded_at: Set(invitation.superseded_at.map(Into::into)),
        superseded_by: Set(invitation.superseded_by.clone()),
        last_error: Set(invitation.last_error.clone()),
        created_at: Set(invitation.created_at.into()),
    })
}

/// Partial unique index allowing one active invitation per `(quiz_id, student_id)`.
const ONE_ACTIVE_INDEX: &str = "idx_invitation_one_active";

fn insert_error(err: DbErr, invitation: &Invitation) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) => unique_violation(&message, invitation),
        _ => AppError::Database(err.to_string()),
    }
}

/// Only a violation of the active-pair index is a duplicate invitation;
/// token or primary-key collisions are reported as conflicts.
fn unique_violation(message: &str, invitation: &Invitation) -> AppError {
    if message.contains(ONE_ACTIVE_INDEX) {
        // Lost a race against a concurrent insert for the same pair.
        AppError::DuplicateActiveInvitation {
            quiz_id: invitation.quiz_id.clone(),
            student_id: invitation.student_id.clone(),
        }
    } else {
        AppError::Conflict(format!(
            "invitation {} collides with an existing record: {message}",
            invitation.id
        ))
    }
}

#[async_trait]
impl InvitationStore for InvitationRepository {
    async fn insert(&self, invitation: Invitation, mode: InsertMode) -> AppResult<Invitation> {
        let model = to_active_model(&invitation)?;
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let active = InvitationEntity::find()
            .filter(invitation::Column::QuizId.eq(invitation.quiz_id.as_str()))
            .filter(invitation::Column::StudentId.eq(invitation.student_id.as_str()))
            .filter(invitation::Column::IsUsed.eq(false))
            .filter(invitation::Column::SupersededAt.is_null())
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(active) = active {
            match mode {
                InsertMode::Exclusive => {
                    txn.rollback()
                        .await
                        .map_err(|e| AppError::Database(e.to_string()))?;
                    return Err(AppError::DuplicateActiveInvitation {
                        quiz_id: invitation.quiz_id,
                        student_id: invitation.student_id,
                    });
                }
                InsertMode::Supersede => {
                    let mut retired: invitation::ActiveModel = active.into();
                    retired.superseded_at = Set(Some(invitation.created_at.into()));
                    retired.superseded_by = Set(Some(invitation.id.clone()));
                    retired
                        .update(&txn)
                        .await
                        .map_err(|e| AppError::Database(e.to_string()))?;
                }
            }
        }

        model
            .insert(&txn)
            .await
            .map_err(|e| insert_error(e, &invitation))?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(invitation)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Invitation>> {
        InvitationEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(to_domain)
            .transpose()
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<Invitation>> {
        InvitationEntity::find()
            .filter(invitation::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(to_domain)
            .transpose()
    }

    async fn find_current(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> AppResult<Option<Invitation>> {
        InvitationEntity::find()
            .filter(invitation::Column::QuizId.eq(quiz_id))
            .filter(invitation::Column::StudentId.eq(student_id))
            .filter(invitation::Column::SupersededAt.is_null())
            .order_by_desc(invitation::Column::CreatedAt)
            .order_by_desc(invitation::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(to_domain)
            .transpose()
    }

    async fn list_by_quiz(&self, quiz_id: &str) -> AppResult<Vec<Invitation>> {
        InvitationEntity::find()
            .filter(invitation::Column::QuizId.eq(quiz_id))
            .order_by_asc(invitation::Column::CreatedAt)
            .order_by_asc(invitation::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    async fn mark_used(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let used_at: DateTimeWithTimeZone = at.into();
        let result = InvitationEntity::update_many()
            .col_expr(invitation::Column::IsUsed, Expr::value(true))
            .col_expr(invitation::Column::UsedAt, Expr::value(used_at))
            .filter(invitation::Column::Id.eq(id))
            .filter(invitation::Column::IsUsed.eq(false))
            .filter(invitation::Column::SupersededAt.is_null())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 1 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(AppError::NotFound(format!("invitation {id}")))
        }
    }

    async fn release_use(&self, id: &str, used_at: DateTime<Utc>) -> AppResult<bool> {
        let used_at: DateTimeWithTimeZone = used_at.into();
        let result = InvitationEntity::update_many()
            .col_expr(invitation::Column::IsUsed, Expr::value(false))
            .col_expr(
                invitation::Column::UsedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .filter(invitation::Column::Id.eq(id))
            .filter(invitation::Column::IsUsed.eq(true))
            .filter(invitation::Column::UsedAt.eq(used_at))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let sent_at: DateTimeWithTimeZone = at.into();
        let result = InvitationEntity::update_many()
            .col_expr(invitation::Column::SentAt, Expr::value(sent_at))
            .col_expr(invitation::Column::LastError, Expr::value(Option::<String>::None))
            .filter(invitation::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("invitation {id}")));
        }
        Ok(())
    }

    async fn record_send_failure(&self, id: &str, error: &str) -> AppResult<()> {
        let result = InvitationEntity::update_many()
            .col_expr(invitation::Column::LastError, Expr::value(error))
            .filter(invitation::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("invitation {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        InvitationEntity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
