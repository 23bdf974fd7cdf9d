//! Quiz and roster repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use quizflow_common::{AppError, AppResult};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{
    Quiz as QuizEntity, QuizEnrollment, Student as StudentEntity, quiz, quiz_enrollment, student,
};
use crate::models::{Quiz, Student};
use crate::store::QuizDirectory;

/// Read-only access to quizzes and enrollments.
#[derive(Clone)]
pub struct QuizRepository {
    db: Arc<DatabaseConnection>,
}

impl QuizRepository {
    /// Create a new quiz repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn quiz_to_domain(model: quiz::Model) -> AppResult<Quiz> {
    Ok(Quiz {
        difficulty: model.difficulty.parse()?,
        id: model.id,
        admin_id: model.admin_id,
        title: model.title,
        description: model.description,
        topic: model.topic,
        time_per_question: model.time_per_question as u32,
        total_questions: model.total_questions as u32,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn student_to_domain(model: student::Model) -> Student {
    Student {
        id: model.id,
        name: model.name,
        email: model.email,
    }
}

#[async_trait]
impl QuizDirectory for QuizRepository {
    async fn find_quiz(&self, quiz_id: &str) -> AppResult<Option<Quiz>> {
        QuizEntity::find_by_id(quiz_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(quiz_to_domain)
            .transpose()
    }

    async fn list_quizzes_by_admin(&self, admin_id: &str) -> AppResult<Vec<Quiz>> {
        QuizEntity::find()
            .filter(quiz::Column::AdminId.eq(admin_id))
            .order_by_asc(quiz::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(quiz_to_domain)
            .collect()
    }

    async fn enrolled_students(&self, quiz_id: &str) -> AppResult<Vec<Student>> {
        let rows = QuizEnrollment::find()
            .filter(quiz_enrollment::Column::QuizId.eq(quiz_id))
            .order_by_asc(quiz_enrollment::Column::CreatedAt)
            .find_also_related(StudentEntity)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(_, student)| student.map(student_to_domain))
            .collect())
    }

    async fn find_student(&self, student_id: &str) -> AppResult<Option<Student>> {
        Ok(StudentEntity::find_by_id(student_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(student_to_domain))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_quiz(difficulty: &str) -> quiz::Model {
        quiz::Model {
            id: "quiz1".to_string(),
            admin_id: "admin1".to_string(),
            title: "Traits".to_string(),
            description: "Dispatch and generics".to_string(),
            topic: "rust".to_string(),
            difficulty: difficulty.to_string(),
            time_per_question: 30,
            question_type: "mcq".to_string(),
            total_questions: 5,
            is_active: true,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_quiz() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_quiz("hard")]])
                .into_connection(),
        );

        let repo = QuizRepository::new(db);
        let quiz = repo.find_quiz("quiz1").await.unwrap().unwrap();

        assert_eq!(quiz.difficulty, Difficulty::Hard);
        assert_eq!(quiz.total_questions, 5);
    }

    #[tokio::test]
    async fn test_unknown_difficulty_is_rejected() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_quiz("nightmare")]])
                .into_connection(),
        );

        let repo = QuizRepository::new(db);
        assert!(repo.find_quiz("quiz1").await.is_err());
    }
}
