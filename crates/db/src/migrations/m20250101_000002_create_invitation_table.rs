//! Create invitation table.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_quiz_tables::{Quiz, Student};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invitation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invitation::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invitation::QuizId).string_len(32).not_null())
                    .col(ColumnDef::new(Invitation::StudentId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Invitation::Token)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Invitation::QuizSnapshot).json_binary().not_null())
                    .col(
                        ColumnDef::new(Invitation::QuestionsSnapshot)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invitation::IsUsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Invitation::UsedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Invitation::SentAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Invitation::SupersededAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Invitation::SupersededBy).string_len(32))
                    .col(ColumnDef::new(Invitation::LastError).text())
                    .col(
                        ColumnDef::new(Invitation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invitation_quiz")
                            .from(Invitation::Table, Invitation::QuizId)
                            .to(Quiz::Table, Quiz::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invitation_student")
                            .from(Invitation::Table, Invitation::StudentId)
                            .to(Student::Table, Student::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invitation_quiz_student")
                    .table(Invitation::Table)
                    .col(Invitation::QuizId)
                    .col(Invitation::StudentId)
                    .to_owned(),
            )
            .await?;

        // At most one active invitation per (quiz, student).
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_invitation_one_active
                ON invitation (quiz_id, student_id)
                WHERE is_used = false AND superseded_at IS NULL;
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Invitation::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Invitation {
    Table,
    Id,
    QuizId,
    StudentId,
    Token,
    QuizSnapshot,
    QuestionsSnapshot,
    IsUsed,
    UsedAt,
    SentAt,
    SupersededAt,
    SupersededBy,
    LastError,
    CreatedAt,
}
