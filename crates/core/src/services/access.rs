//! Quiz ownership checks for admin-facing operations.

use quizflow_common::{AdminIdentity, AppError, AppResult};
use quizflow_db::models::Quiz;
use quizflow_db::store::QuizDirectory;

/// Load a quiz and verify the admin owns it.
pub async fn owned_quiz(
    directory: &dyn QuizDirectory,
    admin: &AdminIdentity,
    quiz_id: &str,
) -> AppResult<Quiz> {
    let quiz = directory
        .find_quiz(quiz_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz {quiz_id}")))?;

    if !admin.owns(&quiz.admin_id) {
        tracing::warn!(quiz_id, admin_id = %admin.id, "Quiz access denied");
        return Err(AppError::Forbidden("access denied".to_string()));
    }

    Ok(quiz)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::seed_quiz;
    use quizflow_db::MemoryStore;

    #[tokio::test]
    async fn test_owner_gets_quiz() {
        let store = MemoryStore::new();
        store.add_quiz(seed_quiz("quiz1", "admin1", 5)).await;

        let quiz = owned_quiz(&store, &AdminIdentity::new("admin1"), "quiz1")
            .await
            .unwrap();
        assert_eq!(quiz.id, "quiz1");
    }

    #[tokio::test]
    async fn test_other_admin_is_forbidden() {
        let store = MemoryStore::new();
        store.add_quiz(seed_quiz("quiz1", "admin1", 5)).await;

        let result = owned_quiz(&store, &AdminIdentity::new("admin2"), "quiz1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_missing_quiz_is_not_found() {
        let store = MemoryStore::new();
        let result = owned_quiz(&store, &AdminIdentity::new("admin1"), "nope").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
