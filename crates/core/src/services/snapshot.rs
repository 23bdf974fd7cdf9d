//! Freezing quiz content into invitation snapshots.
//!
//! Snapshots are plain owned copies. Nothing in the engine holds a reference
//! from a snapshot back to its source records, so later edits to a quiz or
//! its questions cannot reach an invitation that was already issued.

use quizflow_db::models::{Question, QuestionSnapshot, Quiz, QuizSnapshot};

/// Copy quiz metadata as it stands now.
///
/// `question_count` is the number of questions actually frozen, which may
/// differ from the quiz's requested total.
#[must_use]
pub fn freeze_quiz(quiz: &Quiz, question_count: usize) -> QuizSnapshot {
    QuizSnapshot {
        title: quiz.title.clone(),
        description: quiz.description.clone(),
        topic: quiz.topic.clone(),
        difficulty: quiz.difficulty,
        time_per_question: quiz.time_per_question,
        total_questions: u32::try_from(question_count).unwrap_or(u32::MAX),
    }
}

/// Copy questions in `order`.
#[must_use]
pub fn freeze_questions(questions: &[Question]) -> Vec<QuestionSnapshot> {
    let mut frozen: Vec<QuestionSnapshot> = questions
        .iter()
        .map(|q| QuestionSnapshot {
            question_text: q.question_text.clone(),
            options: q.options.clone(),
            correct_answer: q.correct_answer.clone(),
            time_limit: q.time_limit,
            order: q.order,
        })
        .collect();
    frozen.sort_by_key(|q| q.order);
    frozen
}
