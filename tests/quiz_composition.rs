mod common;

use common::{request, seed_lab, start_server};
use labworksd::protocol::Status;
use labworksd::quiz::CATEGORIES;
use serde_json::json;

#[test]
fn composes_one_question_per_category_in_order() {
    let server = start_server();
    let lab_id = seed_lab(&server.db(), "Электрические цепи", 30, 3);
    let mut conn = server.connect();

    // The draw is random; the shape must hold on every composition.
    for _ in 0..5 {
        let response = request(&mut conn, "get_questions", json!({ "lab_id": lab_id }));
        assert_eq!(response.status, Status::Success);
        assert_eq!(response.data["time_limit"].as_i64(), Some(30));

        let questions = response.data["questions"].as_array().expect("questions");
        assert_eq!(questions.len(), CATEGORIES.len());
        for (question, category) in questions.iter().zip(CATEGORIES) {
            assert_eq!(question["category"].as_str(), Some(category));
            assert!(question["correct_index"].as_i64().is_some());
            assert_eq!(question["answers"].as_array().map(Vec::len), Some(4));
        }
    }
}

#[test]
fn composition_fails_closed_naming_every_missing_category() {
    let server = start_server();
    let db = server.db();
    let lab_id = seed_lab(&db, "Неполная работа", 20, 1);
    // Remove categories 2 and 5 entirely.
    for category in [CATEGORIES[1], CATEGORIES[4]] {
        db.execute(
            "DELETE FROM questions WHERE lab_id = ? AND category = ?",
            (lab_id, category),
        )
        .expect("delete category");
    }

    let mut conn = server.connect();
    let response = request(&mut conn, "get_questions", json!({ "lab_id": lab_id }));
    assert_eq!(response.status, Status::Error);
    let message = response.message.expect("message");
    assert!(message.contains("Вопрос 2 (нужно 1, есть 0)"), "{message}");
    assert!(message.contains("Вопрос 5 (нужно 1, есть 0)"), "{message}");
    assert!(!message.contains("Вопрос 1 "), "{message}");
    assert!(response.data.is_null());
}

#[test]
fn lab_without_questions_is_reported_as_such() {
    let server = start_server();
    server
        .db()
        .execute(
            "INSERT INTO lab_works(theme, time, question_count) VALUES('Пустая', 15, 0)",
            [],
        )
        .expect("insert lab");

    let mut conn = server.connect();
    let response = request(&mut conn, "get_questions", json!({ "lab_id": 1 }));
    assert_eq!(response.status, Status::Error);
    assert_eq!(
        response.message.as_deref(),
        Some("Для данной лабораторной работы не созданы вопросы")
    );
}

#[test]
fn lab_id_is_required() {
    let server = start_server();
    let mut conn = server.connect();
    let response = request(&mut conn, "get_questions", json!({}));
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.message.as_deref(), Some("Не указан lab_id"));
}

#[test]
fn image_references_resolve_to_media_urls() {
    let server = start_server();
    let db = server.db();
    let lab_id = seed_lab(&db, "Схемы", 30, 1);
    db.execute(
        "UPDATE questions
         SET question_text = 'Определите схему ![image](scheme.png)',
             answer2 = '![image](b.png) вариант'
         WHERE lab_id = ?",
        [lab_id],
    )
    .expect("embed images");

    let mut conn = server.connect();
    let response = request(&mut conn, "get_questions", json!({ "lab_id": lab_id }));
    assert_eq!(response.status, Status::Success);

    for question in response.data["questions"].as_array().expect("questions") {
        assert_eq!(question["question_text"], "Определите схему");
        assert_eq!(
            question["question_images"][0],
            "http://localhost:8080/images/scheme.png"
        );
        let second_answer = &question["answers"][1];
        assert_eq!(second_answer["text"], "вариант");
        assert_eq!(second_answer["images"][0], "http://localhost:8080/images/b.png");
    }
}

#[test]
fn lab_works_listing_shows_seeded_labs() {
    let server = start_server();
    let db = server.db();
    seed_lab(&db, "Первая работа", 30, 1);
    seed_lab(&db, "Вторая работа", 45, 1);

    let mut conn = server.connect();
    let response = request(&mut conn, "get_lab_works", json!({}));
    assert_eq!(response.status, Status::Success);
    let labs = response.data["lab_works"].as_array().expect("lab_works");
    assert_eq!(labs.len(), 2);
    assert_eq!(labs[0]["theme"], "Первая работа");
    assert_eq!(labs[0]["time"].as_i64(), Some(30));
    assert_eq!(labs[1]["theme"], "Вторая работа");
}
