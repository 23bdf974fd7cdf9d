//! Create quiz, student, `quiz_enrollment`, and question tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Quiz::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Quiz::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Quiz::AdminId).string_len(64).not_null())
                    .col(ColumnDef::new(Quiz::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Quiz::Description).text().not_null().default(""))
                    .col(ColumnDef::new(Quiz::Topic).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Quiz::Difficulty)
                            .string_len(16)
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Quiz::TimePerQuestion)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(Quiz::QuestionType)
                            .string_len(16)
                            .not_null()
                            .default("mcq"),
                    )
                    .col(
                        ColumnDef::new(Quiz::TotalQuestions)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(Quiz::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Quiz::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Quiz::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_quiz_admin_id")
                    .table(Quiz::Table)
                    .col(Quiz::AdminId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Student::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Student::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Student::Name).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Student::Email)
                            .string_len(320)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Student::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(QuizEnrollment::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuizEnrollment::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QuizEnrollment::QuizId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(QuizEnrollment::StudentId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QuizEnrollment::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_quiz_enrollment_quiz")
                            .from(QuizEnrollment::Table, QuizEnrollment::QuizId)
                            .to(Quiz::Table, Quiz::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_quiz_enrollment_student")
                            .from(QuizEnrollment::Table, QuizEnrollment::StudentId)
                            .to(Student::Table, Student::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_quiz_enrollment_unique")
                    .table(QuizEnrollment::Table)
                    .col(QuizEnrollment::QuizId)
                    .col(QuizEnrollment::StudentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Question::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Question::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Question::QuizId).string_len(32).not_null())
                    .col(ColumnDef::new(Question::QuestionText).text().not_null())
                    .col(ColumnDef::new(Question::Options).json_binary().not_null())
                    .col(ColumnDef::new(Question::CorrectAnswer).text().not_null())
                    .col(ColumnDef::new(Question::TimeLimit).integer().not_null())
                    .col(ColumnDef::new(Question::QuestionOrder).integer().not_null())
                    .col(
                        ColumnDef::new(Question::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_question_quiz")
                            .from(Question::Table, Question::QuizId)
                            .to(Quiz::Table, Quiz::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_question_quiz_order")
                    .table(Question::Table)
                    .col(Question::QuizId)
                    .col(Question::QuestionOrder)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Question::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(QuizEnrollment::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Student::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Quiz::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Quiz {
    Table,
    Id,
    AdminId,
    Title,
    Description,
    Topic,
    Difficulty,
    TimePerQuestion,
    QuestionType,
    TotalQuestions,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Student {
    Table,
    Id,
    Name,
    Email,
    CreatedAt,
}

#[derive(Iden)]
enum QuizEnrollment {
    Table,
    Id,
    QuizId,
    StudentId,
    CreatedAt,
}

#[derive(Iden)]
enum Question {
    Table,
    Id,
    QuizId,
    QuestionText,
    Options,
    CorrectAnswer,
    TimeLimit,
    QuestionOrder,
    CreatedAt,
}
