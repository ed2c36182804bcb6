use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Opens (and on first use creates) the assessment database.
///
/// Schema mirrors the deployed GUI tooling: lab works and questions are
/// written by the teacher application, students and results by this server.
/// Writers from concurrent connection threads are serialized by SQLite, so
/// every connection gets a busy timeout instead of failing fast.
pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lab_works(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            theme TEXT NOT NULL,
            time INTEGER NOT NULL,
            question_count INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lab_id INTEGER NOT NULL,
            category TEXT NOT NULL,
            question_text TEXT NOT NULL,
            answer1 TEXT NOT NULL,
            answer2 TEXT NOT NULL,
            answer3 TEXT NOT NULL,
            answer4 TEXT NOT NULL,
            correct_index INTEGER NOT NULL,
            FOREIGN KEY(lab_id) REFERENCES lab_works(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_lab ON questions(lab_id)",
        [],
    )?;

    // middle_name is stored as '' rather than NULL so the identity tuple
    // compares the way login/register expect.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            middle_name TEXT NOT NULL DEFAULT '',
            group_name TEXT NOT NULL,
            year INTEGER NOT NULL,
            UNIQUE(first_name, last_name, middle_name, group_name, year)
        )",
        [],
    )?;

    // UNIQUE(student_id, lab_id) is the backstop for the at-most-one-result
    // invariant: two racing submissions cannot both insert.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            lab_id INTEGER NOT NULL,
            score INTEGER NOT NULL,
            duration_seconds INTEGER,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(lab_id) REFERENCES lab_works(id),
            UNIQUE(student_id, lab_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;
    ensure_results_duration(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS images(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL UNIQUE,
            content_hash TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    Ok(conn)
}

/// Databases created by older tooling predate the duration column. Add it in
/// place rather than requiring a reimport.
fn ensure_results_duration(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "results", "duration_seconds")? {
        conn.execute("ALTER TABLE results ADD COLUMN duration_seconds INTEGER", [])?;
    }
    if !table_has_column(conn, "results", "created_at")? {
        conn.execute("ALTER TABLE results ADD COLUMN created_at TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
