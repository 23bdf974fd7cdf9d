//! Create `workflow_stage` table.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_quiz_tables::Quiz;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowStage::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WorkflowStage::QuizId).string_len(32).not_null())
                    .col(ColumnDef::new(WorkflowStage::Stage).string_len(32).not_null())
                    .col(
                        ColumnDef::new(WorkflowStage::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(WorkflowStage::Error).text())
                    .col(ColumnDef::new(WorkflowStage::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(WorkflowStage::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(WorkflowStage::QuizId)
                            .col(WorkflowStage::Stage),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_workflow_stage_quiz")
                            .from(WorkflowStage::Table, WorkflowStage::QuizId)
                            .to(Quiz::Table, Quiz::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WorkflowStage::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum WorkflowStage {
    Table,
    QuizId,
    Stage,
    Status,
    Error,
    CompletedAt,
    UpdatedAt,
}
