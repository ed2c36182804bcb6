mod common;

use common::{request, start_server};
use labworksd::protocol::Status;
use serde_json::json;

#[test]
fn imported_labs_show_up_in_the_listing() {
    let server = start_server();
    let mut conn = server.connect();

    let imported = request(
        &mut conn,
        "import_lab_works",
        json!({
            "lab_works": [
                { "theme": "Цепи постоянного тока", "time": 30, "question_count": 25 },
                { "theme": "Переходные процессы", "time": 45 },
            ]
        }),
    );
    assert_eq!(imported.status, Status::Success);

    let listed = request(&mut conn, "get_lab_works", json!({}));
    let labs = listed.data["lab_works"].as_array().expect("lab_works");
    assert_eq!(labs.len(), 2);
    assert_eq!(labs[0]["theme"], "Цепи постоянного тока");
    assert_eq!(labs[1]["time"].as_i64(), Some(45));
}

#[test]
fn import_without_rows_is_rejected() {
    let server = start_server();
    let mut conn = server.connect();

    for data in [json!({}), json!({ "lab_works": [] })] {
        let response = request(&mut conn, "import_lab_works", data);
        assert_eq!(response.status, Status::Error);
        assert_eq!(response.message.as_deref(), Some("Нет данных для импорта"));
    }
}

#[test]
fn a_bad_row_aborts_the_whole_import() {
    let server = start_server();
    let mut conn = server.connect();

    let response = request(
        &mut conn,
        "import_lab_works",
        json!({
            "lab_works": [
                { "theme": "Годная работа", "time": 30 },
                { "theme": "Без времени" },
            ]
        }),
    );
    assert_eq!(response.status, Status::Error);

    // All-or-nothing: the valid first row must not have landed.
    let listed = request(&mut conn, "get_lab_works", json!({}));
    assert_eq!(
        listed.data["lab_works"].as_array().map(Vec::len),
        Some(0)
    );
}
