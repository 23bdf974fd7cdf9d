//! All-or-nothing writes over a store without multi-record transactions.
//!
//! [`CompensatingBatch`] records every write it makes. If a later write
//! fails, it deletes what was already written (newest first) and returns the
//! original error.

use std::sync::Arc;

use quizflow_common::AppResult;
use quizflow_db::models::Question;
use quizflow_db::store::QuestionStore;

/// Question writes that are undone together on failure.
pub struct CompensatingBatch {
    store: Arc<dyn QuestionStore>,
    written: Vec<String>,
}

impl CompensatingBatch {
    /// Start an empty batch.
    #[must_use]
    pub fn new(store: Arc<dyn QuestionStore>) -> Self {
        Self {
            store,
            written: Vec::new(),
        }
    }

    /// Write one question and remember it for rollback.
    pub async fn insert(&mut self, question: Question) -> AppResult<()> {
        let id = question.id.clone();
        self.store.insert(question).await?;
        self.written.push(id);
        Ok(())
    }

    /// Ids written so far, in write order.
    #[must_use]
    pub fn written(&self) -> &[String] {
        &self.written
    }

    /// Delete everything written by this batch.
    ///
    /// Every delete is attempted even if an earlier one fails; the first
    /// delete error is returned.
    pub async fn rollback(mut self) -> AppResult<()> {
        let mut first_error = None;
        while let Some(id) = self.written.pop() {
            if let Err(e) = self.store.delete(&id).await {
                tracing::error!(question_id = %id, error = %e, "Compensating delete failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Persist every question or none of them.
///
/// On a write failure the already-written questions are deleted and the
/// write error is returned, even if compensation itself also failed.
pub async fn persist_all(store: Arc<dyn QuestionStore>, questions: Vec<Question>) -> AppResult<usize> {
    let mut batch = CompensatingBatch::new(store);
    for question in questions {
        if let Err(e) = batch.insert(question).await {
            let written = batch.written().len();
            tracing::warn!(written, error = %e, "Question batch failed, rolling back");
            if let Err(rollback_err) = batch.rollback().await {
                tracing::error!(error = %rollback_err, "Question batch rollback incomplete");
            }
            return Err(e);
        }
    }
    Ok(batch.written().len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{FlakyQuestionStore, seed_questions};
    use quizflow_common::AppError;

    #[tokio::test]
    async fn test_persist_all_writes_everything() {
        let store = Arc::new(FlakyQuestionStore::new(None));
        let written = persist_all(store.clone(), seed_questions("quiz1", 4))
            .await
            .unwrap();

        assert_eq!(written, 4);
        assert_eq!(store.list_by_quiz("quiz1").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failure_mid_batch_deletes_prior_writes() {
        // The seventh insert fails after six succeeded.
        let store = Arc::new(FlakyQuestionStore::new(Some(6)));

        let result = persist_all(store.clone(), seed_questions("quiz1", 10)).await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(store.list_by_quiz("quiz1").await.unwrap().is_empty());
        assert_eq!(store.deleted().await.len(), 6);
    }

    #[tokio::test]
    async fn test_rollback_deletes_newest_first() {
        let store = Arc::new(FlakyQuestionStore::new(None));
        let mut batch = CompensatingBatch::new(store.clone());
        for question in seed_questions("quiz1", 3) {
            batch.insert(question).await.unwrap();
        }
        let mut expected: Vec<String> = batch.written().to_vec();
        expected.reverse();

        batch.rollback().await.unwrap();

        assert_eq!(store.deleted().await, expected);
    }
}
