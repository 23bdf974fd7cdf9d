//! Workflow stage repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use quizflow_common::{AppError, AppResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::{WorkflowStage, workflow_stage};
use crate::models::{Stage, StageRecord, WorkflowRun};
use crate::store::WorkflowStore;

/// Workflow repository for database operations.
#[derive(Clone)]
pub struct WorkflowRepository {
    db: Arc<DatabaseConnection>,
}

impl WorkflowRepository {
    /// Create a new workflow repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_record(model: workflow_stage::Model) -> AppResult<StageRecord> {
    let stage = model
        .stage
        .parse::<Stage>()
        .map_err(|e| AppError::Database(e.to_string()))?;
    Ok(StageRecord {
        stage,
        status: model.status,
        error: model.error,
        completed_at: model.completed_at.map(|t| t.with_timezone(&Utc)),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn to_active_model(quiz_id: &str, record: &StageRecord) -> workflow_stage::ActiveModel {
    workflow_stage::ActiveModel {
        quiz_id: Set(quiz_id.to_string()),
        stage: Set(record.stage.as_str().to_string()),
        status: Set(record.status),
        error: Set(record.error.clone()),
        completed_at: Set(record.completed_at.map(Into::into)),
        updated_at: Set(record.updated_at.into()),
    }
}

#[async_trait]
impl WorkflowStore for WorkflowRepository {
    async fn find(&self, quiz_id: &str) -> AppResult<Option<WorkflowRun>> {
        let rows = WorkflowStage::find()
            .filter(workflow_stage::Column::QuizId.eq(quiz_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if rows.is_empty() {
            return Ok(None);
        }
        let records = rows
            .into_iter()
            .map(to_record)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Some(WorkflowRun::from_records(quiz_id, records, Utc::now())))
    }

    async fn load_or_create(&self, quiz_id: &str) -> AppResult<WorkflowRun> {
        let fresh = WorkflowRun::new(quiz_id, Utc::now());
        let rows = fresh
            .stages
            .iter()
            .map(|record| to_active_model(quiz_id, record));

        // Existing rows win; a concurrent creator loses nothing.
        WorkflowStage::insert_many(rows)
            .on_conflict(
                OnConflict::columns([
                    workflow_stage::Column::QuizId,
                    workflow_stage::Column::Stage,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(self.find(quiz_id).await?.unwrap_or(fresh))
    }

    async fn save_stage(&self, quiz_id: &str, record: &StageRecord) -> AppResult<()> {
        WorkflowStage::insert(to_active_model(quiz_id, record))
            .on_conflict(
                OnConflict::columns([
                    workflow_stage::Column::QuizId,
                    workflow_stage::Column::Stage,
                ])
                .update_columns([
                    workflow_stage::Column::Status,
                    workflow_stage::Column::Error,
                    workflow_stage::Column::CompletedAt,
                    workflow_stage::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::StageStatus;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn row(stage: Stage, status: StageStatus, error: Option<&str>) -> workflow_stage::Model {
        workflow_stage::Model {
            quiz_id: "quiz1".to_string(),
            stage: stage.as_str().to_string(),
            status,
            error: error.map(str::to_string),
            completed_at: None,
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_missing_run() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<workflow_stage::Model>::new()])
                .into_connection(),
        );

        let repo = WorkflowRepository::new(db);
        assert!(repo.find("quiz1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_orders_and_fills_stages() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    row(Stage::InvitationsSent, StageStatus::Failed, Some("no students")),
                    row(Stage::QuestionsGenerated, StageStatus::Done, None),
                ]])
                .into_connection(),
        );

        let repo = WorkflowRepository::new(db);
        let run = repo.find("quiz1").await.unwrap().unwrap();

        assert_eq!(run.stages.len(), 5);
        assert_eq!(run.steps_completed(), vec![Stage::QuestionsGenerated]);
        assert_eq!(run.errors(), vec!["INVITATIONS_SENT: no students".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_database_error() {
        let mut bad = row(Stage::Scored, StageStatus::Done, None);
        bad.stage = "PUBLISHED".to_string();
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[bad]])
                .into_connection(),
        );

        let repo = WorkflowRepository::new(db);
        assert!(matches!(
            repo.find("quiz1").await.unwrap_err(),
            AppError::Database(_)
        ));
    }
}
