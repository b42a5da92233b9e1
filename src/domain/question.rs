use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::protocol::QuizId;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;
pub const MIN_TIME_LIMIT_SECS: u32 = 5;
pub const MAX_TIME_LIMIT_SECS: u32 = 120;
pub const MIN_POINTS: u32 = 100;
pub const MAX_POINTS: u32 = 10_000;
pub const MAX_QUESTIONS: usize = 50;

/// Streaks (and the longest-streak high-water mark) cap here.
pub const MAX_STREAK: u32 = 1000;
/// Streak bonus per correct answer caps here.
pub const MAX_STREAK_BONUS: u32 = 500;

/// Question variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
}

/// A single quiz question. Immutable once cloned into a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub time_limit_secs: u32,
    pub points: u32,
    pub image_url: Option<String>,
}

impl Question {
    pub fn new(
        text: impl Into<String>,
        kind: QuestionKind,
        options: Vec<String>,
        correct_answer_index: usize,
        time_limit_secs: u32,
        points: u32,
        image_url: Option<String>,
    ) -> CoreResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::validation("Question text cannot be empty"));
        }
        match kind {
            QuestionKind::TrueFalse => {
                if options.len() != 2 {
                    return Err(CoreError::validation(
                        "True/false questions must have exactly 2 options",
                    ));
                }
            }
            QuestionKind::MultipleChoice => {
                if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
                    return Err(CoreError::validation(format!(
                        "Questions must have between {MIN_OPTIONS} and {MAX_OPTIONS} options"
                    )));
                }
            }
        }
        if options.iter().any(|option| option.trim().is_empty()) {
            return Err(CoreError::validation("Options cannot be empty"));
        }
        if correct_answer_index >= options.len() {
            return Err(CoreError::validation(
                "Correct answer index is out of range",
            ));
        }
        if !(MIN_TIME_LIMIT_SECS..=MAX_TIME_LIMIT_SECS).contains(&time_limit_secs) {
            return Err(CoreError::validation(format!(
                "Time limit must be between {MIN_TIME_LIMIT_SECS} and {MAX_TIME_LIMIT_SECS} seconds"
            )));
        }
        if !(MIN_POINTS..=MAX_POINTS).contains(&points) {
            return Err(CoreError::validation(format!(
                "Points must be between {MIN_POINTS} and {MAX_POINTS}"
            )));
        }
        if let Some(url) = &image_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CoreError::validation(
                    "Image URL must use http or https",
                ));
            }
        }
        Ok(Self {
            id: Uuid::new_v4(),
            text,
            kind,
            options,
            correct_answer_index,
            time_limit_secs,
            points,
            image_url,
        })
    }

    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.time_limit_secs) * 1000
    }

    pub fn is_correct(&self, answer_index: usize) -> bool {
        answer_index == self.correct_answer_index
    }
}

/// An authorable quiz as loaded from the quiz store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub title: String,
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn new(title: impl Into<String>, questions: Vec<Question>) -> CoreResult<Self> {
        if questions.is_empty() {
            return Err(CoreError::validation("Quiz must have at least one question"));
        }
        if questions.len() > MAX_QUESTIONS {
            return Err(CoreError::validation(format!(
                "Quiz cannot have more than {MAX_QUESTIONS} questions"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            title: title.into(),
            questions,
        })
    }

    /// Deep-copy the questions into an immutable snapshot. Host-side edits
    /// to the live quiz cannot reach an in-flight game through this value.
    pub fn snapshot(&self) -> QuizSnapshot {
        QuizSnapshot {
            quiz_id: self.id,
            questions: self.questions.clone(),
            taken_at: Utc::now(),
        }
    }
}

/// The frozen copy of a quiz taken exactly once when a game starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSnapshot {
    pub quiz_id: QuizId,
    questions: Vec<Question>,
    pub taken_at: DateTime<Utc>,
}

impl QuizSnapshot {
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Base score for an answer.
///
/// Correct at elapsed `t` against limit `T` with base points `P`:
/// `max(round(P * (1 - t/(2T))), round(P/2))`, with `t` clamped to `[0, T]`.
/// A full-speed answer earns `P`; answering at the buzzer earns half,
/// rounded up. Wrong answers earn zero (handled by the caller).
pub fn base_score(points: u32, elapsed_ms: u64, time_limit_ms: u64) -> u32 {
    let t = elapsed_ms.min(time_limit_ms) as f64;
    let limit = time_limit_ms as f64;
    let p = f64::from(points);
    let scaled = (p * (1.0 - t / (2.0 * limit))).round();
    let floor = (p / 2.0).round();
    scaled.max(floor) as u32
}

/// Streak bonus awarded on a correct answer, based on the streak *before*
/// this answer: 100 per streak step, capped at 500.
pub fn streak_bonus(streak_before: u32) -> u32 {
    streak_before.saturating_mul(100).min(MAX_STREAK_BONUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn question(time_limit_secs: u32, points: u32) -> Question {
        Question::new(
            "2+2?",
            QuestionKind::MultipleChoice,
            vec!["3".into(), "4".into(), "5".into(), "6".into()],
            1,
            time_limit_secs,
            points,
            None,
        )
        .unwrap()
    }

    #[test]
    fn time_limit_boundaries_accepted() {
        assert_eq!(question(5, 1000).time_limit_secs, 5);
        assert_eq!(question(120, 1000).time_limit_secs, 120);
    }

    #[test]
    fn time_limit_out_of_range_rejected() {
        assert!(Question::new(
            "q",
            QuestionKind::MultipleChoice,
            vec!["a".into(), "b".into()],
            0,
            4,
            1000,
            None
        )
        .is_err());
        assert!(Question::new(
            "q",
            QuestionKind::MultipleChoice,
            vec!["a".into(), "b".into()],
            0,
            121,
            1000,
            None
        )
        .is_err());
    }

    #[test]
    fn true_false_requires_two_options() {
        assert!(Question::new(
            "sky is blue?",
            QuestionKind::TrueFalse,
            vec!["true".into(), "false".into()],
            0,
            10,
            500,
            None
        )
        .is_ok());
        assert!(Question::new(
            "sky is blue?",
            QuestionKind::TrueFalse,
            vec!["true".into(), "false".into(), "maybe".into()],
            0,
            10,
            500,
            None
        )
        .is_err());
    }

    #[test]
    fn image_url_scheme_enforced() {
        assert!(Question::new(
            "q",
            QuestionKind::MultipleChoice,
            vec!["a".into(), "b".into()],
            0,
            10,
            500,
            Some("https://example.com/cat.png".into())
        )
        .is_ok());
        assert!(Question::new(
            "q",
            QuestionKind::MultipleChoice,
            vec!["a".into(), "b".into()],
            0,
            10,
            500,
            Some("javascript:alert(1)".into())
        )
        .is_err());
    }

    #[test]
    fn correct_index_bounds_checked() {
        assert!(Question::new(
            "q",
            QuestionKind::MultipleChoice,
            vec!["a".into(), "b".into()],
            2,
            10,
            500,
            None
        )
        .is_err());
    }

    #[test]
    fn quiz_question_count_bounds() {
        let q = question(30, 1000);
        assert!(Quiz::new("empty", vec![]).is_err());
        let many: Vec<Question> = (0..51).map(|_| q.clone()).collect();
        assert!(Quiz::new("too many", many).is_err());
        let ok: Vec<Question> = (0..50).map(|_| q.clone()).collect();
        assert!(Quiz::new("full", ok).is_ok());
    }

    #[test]
    fn snapshot_is_independent_of_source() {
        let mut quiz = Quiz::new("math", vec![question(30, 1000)]).unwrap();
        let snapshot = quiz.snapshot();
        quiz.questions[0].text = "mutated".to_string();
        quiz.questions[0].correct_answer_index = 0;
        assert_eq!(snapshot.question(0).unwrap().text, "2+2?");
        assert_eq!(snapshot.question(0).unwrap().correct_answer_index, 1);
    }

    #[test]
    fn instant_answer_earns_full_points() {
        assert_eq!(base_score(1000, 0, 30_000), 1000);
    }

    #[test]
    fn buzzer_answer_earns_half_rounded_up() {
        assert_eq!(base_score(1000, 30_000, 30_000), 500);
        assert_eq!(base_score(101, 30_000, 30_000), 51);
    }

    #[test]
    fn late_answer_clamped_to_limit() {
        assert_eq!(base_score(1000, 45_000, 30_000), 500);
    }

    #[test]
    fn one_second_into_thirty_gives_983() {
        assert_eq!(base_score(1000, 1000, 30_000), 983);
    }

    #[test]
    fn streak_bonus_caps_at_500() {
        assert_eq!(streak_bonus(0), 0);
        assert_eq!(streak_bonus(1), 100);
        assert_eq!(streak_bonus(5), 500);
        assert_eq!(streak_bonus(10), 500);
    }

    proptest! {
        #[test]
        fn base_score_never_below_half(
            points in MIN_POINTS..=MAX_POINTS,
            elapsed in 0u64..300_000,
            limit_secs in MIN_TIME_LIMIT_SECS..=MAX_TIME_LIMIT_SECS,
        ) {
            let limit_ms = u64::from(limit_secs) * 1000;
            let base = base_score(points, elapsed, limit_ms);
            let half = (f64::from(points) / 2.0).round() as u32;
            prop_assert!(base >= half);
            prop_assert!(base <= points);
        }

        #[test]
        fn base_score_monotone_in_elapsed(
            points in MIN_POINTS..=MAX_POINTS,
            a in 0u64..120_000,
            b in 0u64..120_000,
        ) {
            let limit_ms = 120_000;
            let (fast, slow) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(base_score(points, fast, limit_ms) >= base_score(points, slow, limit_ms));
        }
    }
}
