//! Question repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use quizflow_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{Question as QuestionEntity, question};
use crate::models::Question;
use crate::store::QuestionStore;

/// Question repository for database operations.
#[derive(Clone)]
pub struct QuestionRepository {
    db: Arc<DatabaseConnection>,
}

impl QuestionRepository {
    /// Create a new question repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_domain(model: question::Model) -> AppResult<Question> {
    let options = serde_json::from_value(model.options).map_err(|e| {
        AppError::Database(format!("corrupt options on question {}: {e}", model.id))
    })?;
    Ok(Question {
        id: model.id,
        quiz_id: model.quiz_id,
        question_text: model.question_text,
        options,
        correct_answer: model.correct_answer,
        time_limit: model.time_limit as u32,
        order: model.question_order as u32,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl QuestionStore for QuestionRepository {
    async fn insert(&self, question: Question) -> AppResult<()> {
        let options =
            serde_json::to_value(&question.options).map_err(|e| AppError::Internal(e.to_string()))?;
        question::ActiveModel {
            id: Set(question.id),
            quiz_id: Set(question.quiz_id),
            question_text: Set(question.question_text),
            options: Set(options),
            correct_answer: Set(question.correct_answer),
            time_limit: Set(question.time_limit as i32),
            question_order: Set(question.order as i32),
            created_at: Set(question.created_at.into()),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        QuestionEntity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_by_quiz(&self, quiz_id: &str) -> AppResult<Vec<Question>> {
        QuestionEntity::find()
            .filter(question::Column::QuizId.eq(quiz_id))
            .order_by_asc(question::Column::QuestionOrder)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(to_domain)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_question(id: &str, order: i32) -> question::Model {
        question::Model {
            id: id.to_string(),
            quiz_id: "quiz1".to_string(),
            question_text: format!("Question {order}"),
            options: serde_json::json!(["a", "b", "c", "d"]),
            correct_answer: "b".to_string(),
            time_limit: 30,
            question_order: order,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_list_by_quiz() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_question("q1", 1), create_test_question("q2", 2)]])
                .into_connection(),
        );

        let repo = QuestionRepository::new(db);
        let questions = repo.list_by_quiz("quiz1").await.unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].order, 2);
        assert_eq!(questions[0].options.len(), 4);
    }

    #[tokio::test]
    async fn test_insert() {
        let model = create_test_question("q1", 1);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[model.clone()]])
                .into_connection(),
        );

        let repo = QuestionRepository::new(db);
        repo.insert(to_domain(model).unwrap()).await.unwrap();
    }
}
