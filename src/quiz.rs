//! Quiz composition and grading.
//!
//! A quiz is always five questions: one drawn uniformly at random from each
//! of the five fixed categories, in category order. Grading is the only
//! place a result row is ever written.

use std::collections::HashMap;

use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::Connection;

use crate::error::ServerError;
use crate::store::{self, NewResult, QuestionRow};

/// The five ordinal categories, in authoritative order. Composition draws one
/// question per entry; validation reports shortfalls against the same list.
pub const CATEGORIES: [&str; 5] = [
    "Вопрос 1",
    "Вопрос 2",
    "Вопрос 3",
    "Вопрос 4",
    "Вопрос 5",
];

pub const QUIZ_SIZE: usize = CATEGORIES.len();

/// Minimum score that earns a persisted result. Fixed policy, not a knob.
pub const PASS_THRESHOLD: i64 = 3;

#[derive(Debug)]
pub struct ComposedQuiz {
    pub questions: Vec<QuestionRow>,
    pub time_limit: i64,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub student_id: Option<i64>,
    pub lab_id: Option<i64>,
    pub answers: HashMap<String, String>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeOutcome {
    Passed { score: i64 },
    Retake { score: i64 },
}

/// Loads the lab's question bank and composes a quiz, failing closed when any
/// category has no questions.
pub fn compose_quiz(conn: &Connection, lab_id: i64) -> Result<ComposedQuiz, ServerError> {
    let questions = store::questions_for_lab(conn, lab_id)?;
    if questions.is_empty() {
        return Err(ServerError::Validation(
            "Для данной лабораторной работы не созданы вопросы".to_string(),
        ));
    }

    let Some(time_limit) = store::lab_time_limit(conn, lab_id)? else {
        return Err(ServerError::Validation(
            "Не задано время для выполнения теста".to_string(),
        ));
    };

    let questions = draw(questions, &mut rand::thread_rng())?;
    Ok(ComposedQuiz {
        questions,
        time_limit,
    })
}

/// One uniform draw per category, in category order. Rejects the whole lab if
/// any category is short, naming every shortfall.
pub(crate) fn draw<R: Rng>(
    questions: Vec<QuestionRow>,
    rng: &mut R,
) -> Result<Vec<QuestionRow>, ServerError> {
    let mut buckets: HashMap<&str, Vec<QuestionRow>> = HashMap::new();
    for q in questions {
        if let Some(slot) = CATEGORIES.iter().find(|c| **c == q.category) {
            buckets.entry(*slot).or_default().push(q);
        }
        // Rows with an unknown category are ignored rather than failing the
        // lab; the teacher tooling is the place to fix them.
    }

    let missing: Vec<String> = CATEGORIES
        .iter()
        .filter(|c| buckets.get(**c).map_or(true, Vec::is_empty))
        .map(|c| {
            let have = buckets.get(*c).map_or(0, Vec::len);
            format!("{} (нужно 1, есть {})", c, have)
        })
        .collect();
    if !missing.is_empty() {
        return Err(ServerError::Composition { missing });
    }

    let mut selected = Vec::with_capacity(QUIZ_SIZE);
    for category in CATEGORIES {
        let bucket = &buckets[category];
        let q = bucket.choose(rng).expect("bucket checked non-empty");
        selected.push(q.clone());
    }
    Ok(selected)
}

/// The grading ladder. Each precondition is a distinct failure, checked in
/// order; a sub-threshold score deliberately leaves no trace so the student
/// can retry.
pub fn grade_submission(
    conn: &Connection,
    submission: &Submission,
) -> Result<GradeOutcome, ServerError> {
    let (Some(student_id), Some(lab_id)) = (submission.student_id, submission.lab_id) else {
        return Err(ServerError::Validation(
            "Необходимо предоставить student_id, lab_id и ответы".to_string(),
        ));
    };
    if submission.answers.is_empty() {
        return Err(ServerError::Validation(
            "Необходимо предоставить student_id, lab_id и ответы".to_string(),
        ));
    }

    if store::find_result(conn, student_id, lab_id)?.is_some() {
        return Err(ServerError::DuplicateSubmission);
    }

    let correct = store::correct_answers(conn, lab_id)?;
    let score = score_answers(&submission.answers, &correct);

    let fio = store::student_by_id(conn, student_id)?
        .map(|s| {
            let mut fio = format!("{} {}", s.last_name, s.first_name);
            if !s.middle_name.is_empty() {
                fio.push(' ');
                fio.push_str(&s.middle_name);
            }
            fio
        })
        .unwrap_or_else(|| format!("student #{student_id}"));
    let theme = store::lab_theme(conn, lab_id)?.unwrap_or_else(|| "?".to_string());

    if score < PASS_THRESHOLD {
        warn!(
            "{} failed lab '{}': {}/{}",
            fio, theme, score, QUIZ_SIZE
        );
        return Ok(GradeOutcome::Retake { score });
    }

    store::insert_result(
        conn,
        &NewResult {
            student_id,
            lab_id,
            score,
            duration_seconds: submission.duration_seconds,
        },
    )?;
    info!("{} passed lab '{}': {}/{}", fio, theme, score, QUIZ_SIZE);
    Ok(GradeOutcome::Passed { score })
}

/// Count of submitted answers that string-match the correct option for their
/// question id. Unknown ids and unanswered questions contribute nothing.
/// Credit is capped at the quiz size: only the five composed slots can score.
pub fn score_answers(
    answers: &HashMap<String, String>,
    correct: &HashMap<String, String>,
) -> i64 {
    let score = answers
        .iter()
        .filter(|(q_id, chosen)| correct.get(q_id.as_str()) == Some(*chosen))
        .count() as i64;
    score.min(QUIZ_SIZE as i64)
}
