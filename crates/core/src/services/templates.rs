//! Deterministic email bodies for invitations and qualification notices.

use quizflow_db::models::{Quiz, QuizSnapshot, RankedResult, Student};

use super::email::OutgoingEmail;

/// Render the invitation email for one student.
///
/// Details come from the invitation's frozen snapshot, so the email always
/// describes the quiz the link opens.
#[must_use]
pub fn invitation_email(
    quiz: &QuizSnapshot,
    student: &Student,
    link: &str,
    from_name: &str,
) -> OutgoingEmail {
    let subject = format!("You're invited: {}", quiz.title);
    let content = format!(
        "<p>Hi {name},</p>\
        <p>You have been invited to take the quiz <strong>{title}</strong>.</p>\
        <ul>\
        <li>Topic: {topic}</li>\
        <li>Difficulty: {difficulty}</li>\
        <li>Questions: {count}</li>\
        <li>Time per question: {seconds} seconds</li>\
        </ul>\
        <p><a href=\"{link}\" style=\"display:inline-block;padding:12px 24px;background:#007bff;color:#fff;text-decoration:none;border-radius:4px;\">Start Quiz</a></p>\
        <p><small>This link is personal and can be used once.</small></p>",
        name = escape(&student.name),
        title = escape(&quiz.title),
        topic = escape(&quiz.topic),
        difficulty = quiz.difficulty,
        count = quiz.total_questions,
        seconds = quiz.time_per_question,
        link = escape(link),
    );

    OutgoingEmail {
        to_email: student.email.clone(),
        to_name: student.name.clone(),
        subject,
        html_body: wrap_html(&content, from_name),
    }
}

/// Render the qualification notice for a top-ranked student.
#[must_use]
pub fn qualification_email(
    quiz: &Quiz,
    student: &Student,
    result: &RankedResult,
    participants: usize,
    from_name: &str,
) -> OutgoingEmail {
    let subject = format!("Congratulations! You've qualified - {}", quiz.title);
    let content = format!(
        "<p>Hi {name},</p>\
        <p>Congratulations! You scored <strong>{correct}/{total}</strong> ({percentage:.1}%) \
        and ranked <strong>#{rank}</strong> out of {participants} students in the \
        <strong>{title}</strong> quiz.</p>\
        <p>You've qualified for the next round. We'll be in touch with the details.</p>",
        name = escape(&student.name),
        correct = result.correct,
        total = result.total,
        percentage = result.percentage,
        rank = result.rank,
        title = escape(&quiz.title),
    );

    OutgoingEmail {
        to_email: student.email.clone(),
        to_name: student.name.clone(),
        subject,
        html_body: wrap_html(&content, from_name),
    }
}

/// Wrap HTML content in the shared email layout.
fn wrap_html(content: &str, from_name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }}
        a {{ color: #007bff; }}
    </style>
</head>
<body>
    {}
    <hr style="margin-top: 40px; border: none; border-top: 1px solid #e9ecef;">
    <p style="font-size: 12px; color: #6c757d;">
        This email was sent by {}.
    </p>
</body>
</html>"#,
        content,
        escape(from_name)
    )
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quizflow_db::models::Difficulty;

    fn quiz() -> Quiz {
        Quiz {
            id: "quiz1".to_string(),
            admin_id: "admin1".to_string(),
            title: "Rust <Basics>".to_string(),
            description: "Ownership and borrowing".to_string(),
            topic: "Rust".to_string(),
            difficulty: Difficulty::Medium,
            time_per_question: 30,
            total_questions: 5,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn student() -> Student {
        Student {
            id: "s1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn test_invitation_email_contains_link_and_details() {
        let quiz = quiz();
        let email = invitation_email(
            &crate::services::snapshot::freeze_quiz(&quiz, 5),
            &student(),
            "http://localhost:3000/quiz/abc",
            "Quizflow",
        );

        assert_eq!(email.to_email, "ada@example.com");
        assert_eq!(email.subject, "You're invited: Rust <Basics>");
        assert!(email.html_body.contains("http://localhost:3000/quiz/abc"));
        assert!(email.html_body.contains("Rust &lt;Basics&gt;"));
        assert!(email.html_body.contains("Difficulty: medium"));
        assert!(email.html_body.contains("30 seconds"));
    }

    #[test]
    fn test_qualification_email_reports_rank() {
        let result = RankedResult {
            id: "r1".to_string(),
            quiz_id: "quiz1".to_string(),
            student_id: "s1".to_string(),
            invitation_id: "inv1".to_string(),
            correct: 4,
            total: 5,
            percentage: 80.0,
            rank: 2,
            completed_at: Utc::now(),
            notified_at: None,
        };

        let email = qualification_email(&quiz(), &student(), &result, 7, "Quizflow");

        assert!(email.subject.starts_with("Congratulations!"));
        assert!(email.html_body.contains("4/5"));
        assert!(email.html_body.contains("80.0%"));
        assert!(email.html_body.contains("#2"));
        assert!(email.html_body.contains("out of 7 students"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
