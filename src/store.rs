//! Record-level operations against the relational store.
//!
//! Every function here is one logical transaction: either a single statement
//! (atomic in SQLite) or an explicit transaction for the multi-row import.
//! Handlers never touch SQL directly.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::error::ServerError;

/// The tuple that identifies one student for both login and registration.
#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub group_name: String,
    pub year: i64,
}

impl StudentIdentity {
    /// "Фамилия Имя [Отчество]" — the display form used in connection
    /// notices and teacher-side logs.
    pub fn display_name(&self) -> String {
        let mut fio = format!("{} {}", self.last_name, self.first_name);
        if !self.middle_name.is_empty() {
            fio.push(' ');
            fio.push_str(&self.middle_name);
        }
        fio
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub group_name: String,
}

#[derive(Debug, Clone)]
pub struct LabWork {
    pub id: i64,
    pub theme: String,
    pub time: i64,
}

#[derive(Debug, Clone)]
pub struct NewLabWork {
    pub theme: String,
    pub time: i64,
    pub question_count: i64,
}

#[derive(Debug, Clone)]
pub struct QuestionRow {
    pub id: i64,
    pub category: String,
    pub question_text: String,
    pub answers: [String; 4],
    pub correct_index: i64,
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub student_id: i64,
    pub lab_id: i64,
    pub score: i64,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ResultExport {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub group_name: String,
    pub lab_id: i64,
    pub score: i64,
}

pub fn find_student_id(
    conn: &Connection,
    who: &StudentIdentity,
) -> Result<Option<i64>, ServerError> {
    let id = conn
        .query_row(
            "SELECT id FROM students
             WHERE first_name = ? AND last_name = ? AND middle_name = ?
               AND group_name = ? AND year = ?",
            (
                &who.first_name,
                &who.last_name,
                &who.middle_name,
                &who.group_name,
                who.year,
            ),
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn insert_student(conn: &Connection, who: &StudentIdentity) -> Result<i64, ServerError> {
    conn.execute(
        "INSERT INTO students(first_name, last_name, middle_name, group_name, year)
         VALUES(?, ?, ?, ?, ?)",
        (
            &who.first_name,
            &who.last_name,
            &who.middle_name,
            &who.group_name,
            who.year,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn student_by_id(conn: &Connection, id: i64) -> Result<Option<Student>, ServerError> {
    let student = conn
        .query_row(
            "SELECT id, first_name, last_name, middle_name, group_name
             FROM students WHERE id = ?",
            [id],
            |r| {
                Ok(Student {
                    id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    middle_name: r.get(3)?,
                    group_name: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(student)
}

pub fn list_lab_works(conn: &Connection) -> Result<Vec<LabWork>, ServerError> {
    let mut stmt = conn.prepare("SELECT id, theme, time FROM lab_works ORDER BY id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(LabWork {
                id: r.get(0)?,
                theme: r.get(1)?,
                time: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn lab_time_limit(conn: &Connection, lab_id: i64) -> Result<Option<i64>, ServerError> {
    let time = conn
        .query_row("SELECT time FROM lab_works WHERE id = ?", [lab_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(time)
}

pub fn lab_theme(conn: &Connection, lab_id: i64) -> Result<Option<String>, ServerError> {
    let theme = conn
        .query_row("SELECT theme FROM lab_works WHERE id = ?", [lab_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(theme)
}

pub fn questions_for_lab(conn: &Connection, lab_id: i64) -> Result<Vec<QuestionRow>, ServerError> {
    let mut stmt = conn.prepare(
        "SELECT id, category, question_text, answer1, answer2, answer3, answer4, correct_index
         FROM questions WHERE lab_id = ?",
    )?;
    let rows = stmt
        .query_map([lab_id], |r| {
            Ok(QuestionRow {
                id: r.get(0)?,
                category: r.get(1)?,
                question_text: r.get(2)?,
                answers: [r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?],
                correct_index: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Map of question id to correct option, both as strings — the submission
/// format the clients send.
pub fn correct_answers(
    conn: &Connection,
    lab_id: i64,
) -> Result<HashMap<String, String>, ServerError> {
    let mut stmt = conn.prepare("SELECT id, correct_index FROM questions WHERE lab_id = ?")?;
    let rows = stmt
        .query_map([lab_id], |r| {
            Ok((r.get::<_, i64>(0)?.to_string(), r.get::<_, i64>(1)?.to_string()))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn find_result(
    conn: &Connection,
    student_id: i64,
    lab_id: i64,
) -> Result<Option<i64>, ServerError> {
    let id = conn
        .query_row(
            "SELECT id FROM results WHERE student_id = ? AND lab_id = ?",
            (student_id, lab_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Inserts a graded result. The UNIQUE(student_id, lab_id) constraint makes
/// check-then-insert race-proof: the loser of a race gets
/// `DuplicateSubmission`, not a second row.
pub fn insert_result(conn: &Connection, result: &NewResult) -> Result<i64, ServerError> {
    let outcome = conn.execute(
        "INSERT INTO results(student_id, lab_id, score, duration_seconds, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            result.student_id,
            result.lab_id,
            result.score,
            result.duration_seconds,
            Utc::now().to_rfc3339(),
        ),
    );
    match outcome {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(ServerError::DuplicateSubmission)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn image_by_hash(conn: &Connection, hash: &str) -> Result<Option<String>, ServerError> {
    let filename = conn
        .query_row(
            "SELECT filename FROM images WHERE content_hash = ?",
            [hash],
            |r| r.get(0),
        )
        .optional()?;
    Ok(filename)
}

pub fn insert_image(conn: &Connection, filename: &str, hash: &str) -> Result<(), ServerError> {
    conn.execute(
        "INSERT INTO images(filename, content_hash) VALUES(?, ?)",
        (filename, hash),
    )?;
    Ok(())
}

/// Bulk import from the teacher tooling; all rows land or none do.
pub fn import_lab_works(conn: &Connection, labs: &[NewLabWork]) -> Result<(), ServerError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO lab_works(theme, time, question_count) VALUES(?, ?, ?)")?;
        for lab in labs {
            stmt.execute((&lab.theme, lab.time, lab.question_count))?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn export_results(conn: &Connection) -> Result<Vec<ResultExport>, ServerError> {
    let mut stmt = conn.prepare(
        "SELECT s.first_name, s.last_name, s.middle_name, s.group_name, r.lab_id, r.score
         FROM results r
         JOIN students s ON r.student_id = s.id
         ORDER BY s.group_name, s.last_name, r.lab_id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ResultExport {
                first_name: r.get(0)?,
                last_name: r.get(1)?,
                middle_name: r.get(2)?,
                group_name: r.get(3)?,
                lab_id: r.get(4)?,
                score: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
