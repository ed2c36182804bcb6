//! In-process server harness shared by the integration tests.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rusqlite::Connection;
use tempfile::TempDir;

use labworksd::client::ClientConnection;
use labworksd::media::ImageStore;
use labworksd::protocol::types::{Request, Response};
use labworksd::quiz::CATEGORIES;
use labworksd::server::{AppCtx, ConnectionRegistry, LabServer};

pub struct TestServer {
    pub addr: SocketAddr,
    pub db_path: std::path::PathBuf,
    pub images_dir: std::path::PathBuf,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    // Held for the lifetime of the server so the workspace survives.
    _workspace: TempDir,
}

pub fn start_server() -> TestServer {
    let workspace = tempfile::tempdir().expect("create workspace");
    let db_path = workspace.path().join("mgtu_app.db");
    let images_dir = workspace.path().join("images");
    labworksd::db::open_db(&db_path).expect("initialize schema");

    let image_store = ImageStore::new(&images_dir, "http://localhost:8080/images".to_string())
        .expect("image store");
    let ctx = Arc::new(AppCtx {
        db_path: db_path.clone(),
        image_store,
        registry: ConnectionRegistry::new(),
    });

    let server = LabServer::bind(("127.0.0.1", 0), ctx).expect("bind server");
    let addr = server.local_addr().expect("local addr");
    let shutdown = server.shutdown_flag();
    let thread = std::thread::spawn(move || {
        let _ = server.run();
    });

    TestServer {
        addr,
        db_path,
        images_dir,
        shutdown,
        thread: Some(thread),
        _workspace: workspace,
    }
}

impl TestServer {
    pub fn connect(&self) -> ClientConnection {
        ClientConnection::connect(self.addr, Duration::from_secs(5)).expect("connect")
    }

    pub fn db(&self) -> Connection {
        labworksd::db::open_db(&self.db_path).expect("open test db")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub fn request(conn: &mut ClientConnection, action: &str, data: serde_json::Value) -> Response {
    conn.send(&Request {
        action: action.to_string(),
        data,
    })
    .expect("exchange request")
}

/// Inserts a lab work plus `per_category` questions in every category.
/// Question ids are returned by the database; correct_index cycles 1..=4.
pub fn seed_lab(conn: &Connection, theme: &str, time: i64, per_category: usize) -> i64 {
    conn.execute(
        "INSERT INTO lab_works(theme, time, question_count) VALUES(?, ?, ?)",
        (theme, time, (per_category * CATEGORIES.len()) as i64),
    )
    .expect("insert lab");
    let lab_id = conn.last_insert_rowid();

    let mut n = 0;
    for category in CATEGORIES {
        for _ in 0..per_category {
            n += 1;
            conn.execute(
                "INSERT INTO questions(lab_id, category, question_text,
                    answer1, answer2, answer3, answer4, correct_index)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    lab_id,
                    category,
                    format!("Вопрос номер {n}"),
                    "вариант 1",
                    "вариант 2",
                    "вариант 3",
                    "вариант 4",
                    (n % 4) + 1,
                ),
            )
            .expect("insert question");
        }
    }
    lab_id
}

pub fn register_student(conn: &mut ClientConnection, first: &str, last: &str) -> i64 {
    let response = request(
        conn,
        "register",
        serde_json::json!({
            "first_name": first,
            "last_name": last,
            "middle_name": "",
            "group_name": "ИУ5-52Б",
            "year": 2024,
        }),
    );
    assert_eq!(response.status, labworksd::protocol::Status::Success);
    response.data["student_id"].as_i64().expect("student_id")
}
