//! Create `answer_set` and `quiz_result` tables.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_quiz_tables::Quiz;
use super::m20250101_000002_create_invitation_table::Invitation;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AnswerSet::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AnswerSet::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AnswerSet::QuizId).string_len(32).not_null())
                    .col(ColumnDef::new(AnswerSet::StudentId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(AnswerSet::InvitationId)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AnswerSet::Answers).json_binary().not_null())
                    .col(
                        ColumnDef::new(AnswerSet::CompletedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_answer_set_invitation")
                            .from(AnswerSet::Table, AnswerSet::InvitationId)
                            .to(Invitation::Table, Invitation::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_answer_set_quiz_id")
                    .table(AnswerSet::Table)
                    .col(AnswerSet::QuizId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(QuizResult::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuizResult::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QuizResult::QuizId).string_len(32).not_null())
                    .col(ColumnDef::new(QuizResult::StudentId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(QuizResult::InvitationId)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(QuizResult::Correct).integer().not_null())
                    .col(ColumnDef::new(QuizResult::Total).integer().not_null())
                    .col(ColumnDef::new(QuizResult::Percentage).double().not_null())
                    .col(ColumnDef::new(QuizResult::Rank).integer().not_null())
                    .col(
                        ColumnDef::new(QuizResult::CompletedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(QuizResult::NotifiedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(QuizResult::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_quiz_result_quiz")
                            .from(QuizResult::Table, QuizResult::QuizId)
                            .to(Quiz::Table, Quiz::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_quiz_result_quiz_rank")
                    .table(QuizResult::Table)
                    .col(QuizResult::QuizId)
                    .col(QuizResult::Rank)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QuizResult::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AnswerSet::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AnswerSet {
    Table,
    Id,
    QuizId,
    StudentId,
    InvitationId,
    Answers,
    CompletedAt,
}

#[derive(Iden)]
enum QuizResult {
    Table,
    Id,
    QuizId,
    StudentId,
    InvitationId,
    Correct,
    Total,
    Percentage,
    Rank,
    CompletedAt,
    NotifiedAt,
    CreatedAt,
}
