//! Maps decoded requests onto handlers. Handlers share no state with each
//! other beyond the store; the registry is touched only to associate a
//! display name after login/register.

use std::collections::HashMap;
use std::net::SocketAddr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{error, info};
use rusqlite::Connection;
use serde_json::{json, Value};

use crate::error::ServerError;
use crate::imageref;
use crate::protocol::types::{Action, Request, Response};
use crate::quiz::{self, GradeOutcome, Submission, QUIZ_SIZE};
use crate::server::AppCtx;
use crate::store::{self, NewLabWork, StudentIdentity};

pub fn dispatch(ctx: &AppCtx, conn: &Connection, peer: SocketAddr, request: Request) -> Response {
    let Some(action) = Action::from_name(&request.action) else {
        return Response::from(&ServerError::UnknownAction(request.action));
    };

    let result = match action {
        Action::Login => login(ctx, conn, peer, &request.data),
        Action::Register => register(ctx, conn, peer, &request.data),
        Action::GetLabWorks => get_lab_works(conn),
        Action::CheckLabCompleted => check_lab_completed(conn, &request.data),
        Action::GetQuestions => get_questions(ctx, conn, &request.data),
        Action::SubmitTest => submit_test(conn, &request.data),
        Action::GetStudentInfo => get_student_info(conn, &request.data),
        Action::ImportLabWorks => import_lab_works(conn, &request.data),
        Action::ExportResults => export_results(conn),
        Action::UploadImage => upload_image(ctx, conn, &request.data),
    };

    result.unwrap_or_else(|e| {
        if let ServerError::Storage(detail) = &e {
            // The client sees a generic message; the detail stays here.
            error!("{}: storage failure: {detail}", action.name());
        }
        Response::from(&e)
    })
}

fn required_str(data: &Value, key: &str, message: &str) -> Result<String, ServerError> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServerError::Validation(message.to_string()))
}

/// Integer field that tolerant clients may send as a number or a numeric
/// string (year comes from a free-form text box).
fn required_i64(data: &Value, key: &str, message: &str) -> Result<i64, ServerError> {
    optional_i64(data, key).ok_or_else(|| ServerError::Validation(message.to_string()))
}

fn optional_i64(data: &Value, key: &str) -> Option<i64> {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

const IDENTITY_MESSAGE: &str = "Необходимо заполнить имя, фамилию, группу и год";

fn identity_from(data: &Value) -> Result<StudentIdentity, ServerError> {
    Ok(StudentIdentity {
        first_name: required_str(data, "first_name", IDENTITY_MESSAGE)?,
        last_name: required_str(data, "last_name", IDENTITY_MESSAGE)?,
        middle_name: data
            .get("middle_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string(),
        group_name: required_str(data, "group_name", IDENTITY_MESSAGE)?,
        year: required_i64(data, "year", IDENTITY_MESSAGE)?,
    })
}

fn login(
    ctx: &AppCtx,
    conn: &Connection,
    peer: SocketAddr,
    data: &Value,
) -> Result<Response, ServerError> {
    let who = identity_from(data)?;
    let Some(student_id) = store::find_student_id(conn, &who)? else {
        return Err(ServerError::Validation(
            "Учетная запись не найдена".to_string(),
        ));
    };
    let fio = who.display_name();
    info!("{fio} подключился");
    ctx.registry.associate(peer, fio);
    Ok(Response::success(json!({ "student_id": student_id })))
}

fn register(
    ctx: &AppCtx,
    conn: &Connection,
    peer: SocketAddr,
    data: &Value,
) -> Result<Response, ServerError> {
    let who = identity_from(data)?;
    if store::find_student_id(conn, &who)?.is_some() {
        return Err(ServerError::Validation(
            "Пользователь с такими данными уже зарегистрирован".to_string(),
        ));
    }
    let student_id = store::insert_student(conn, &who)?;
    let fio = who.display_name();
    info!("{fio} подключился (новая регистрация)");
    ctx.registry.associate(peer, fio);
    Ok(Response::success(json!({ "student_id": student_id })))
}

fn get_lab_works(conn: &Connection) -> Result<Response, ServerError> {
    let labs: Vec<Value> = store::list_lab_works(conn)?
        .into_iter()
        .map(|lab| json!({ "id": lab.id, "theme": lab.theme, "time": lab.time }))
        .collect();
    Ok(Response::success(json!({ "lab_works": labs })))
}

fn check_lab_completed(conn: &Connection, data: &Value) -> Result<Response, ServerError> {
    const MESSAGE: &str = "Необходимо предоставить student_id и lab_id";
    let student_id = required_i64(data, "student_id", MESSAGE)?;
    let lab_id = required_i64(data, "lab_id", MESSAGE)?;
    let completed = store::find_result(conn, student_id, lab_id)?.is_some();
    Ok(Response::success(json!({ "completed": completed })))
}

fn get_questions(ctx: &AppCtx, conn: &Connection, data: &Value) -> Result<Response, ServerError> {
    let lab_id = required_i64(data, "lab_id", "Не указан lab_id")?;
    let quiz = quiz::compose_quiz(conn, lab_id)?;
    let base_url = ctx.image_store.base_url();

    let questions: Vec<Value> = quiz
        .questions
        .iter()
        .map(|q| {
            let (text, text_images) = imageref::parse_images(&q.question_text, base_url);
            let answers: Vec<Value> = q
                .answers
                .iter()
                .map(|a| {
                    let (answer_text, answer_images) = imageref::parse_images(a, base_url);
                    json!({ "text": answer_text, "images": answer_images })
                })
                .collect();
            json!({
                "id": q.id,
                "category": q.category,
                "question_text": text,
                "question_images": text_images,
                "answers": answers,
                "correct_index": q.correct_index,
            })
        })
        .collect();

    Ok(Response::success(json!({
        "questions": questions,
        "time_limit": quiz.time_limit,
    })))
}

fn submit_test(conn: &Connection, data: &Value) -> Result<Response, ServerError> {
    let submission = Submission {
        student_id: optional_i64(data, "student_id"),
        lab_id: optional_i64(data, "lab_id"),
        answers: answers_from(data),
        duration_seconds: optional_i64(data, "duration"),
    };

    match quiz::grade_submission(conn, &submission)? {
        GradeOutcome::Passed { score } => Ok(Response::success(json!({
            "score": score,
            "total_questions": QUIZ_SIZE,
        }))),
        GradeOutcome::Retake { score } => Ok(Response::retake(
            json!({ "score": score, "total_questions": QUIZ_SIZE }),
            format!("Вы набрали {score}/{QUIZ_SIZE}, лабораторная не засчитана."),
        )),
    }
}

/// Answers arrive as `{question_id: chosen_option}`; both sides are strings
/// on the wire, but option numbers are coerced when a client sends them raw.
fn answers_from(data: &Value) -> HashMap<String, String> {
    let mut answers = HashMap::new();
    if let Some(map) = data.get("answers").and_then(|v| v.as_object()) {
        for (question_id, chosen) in map {
            let chosen = match chosen {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            answers.insert(question_id.clone(), chosen);
        }
    }
    answers
}

fn get_student_info(conn: &Connection, data: &Value) -> Result<Response, ServerError> {
    let student_id = required_i64(data, "student_id", "Не указан student_id")?;
    let Some(student) = store::student_by_id(conn, student_id)? else {
        return Err(ServerError::Validation("Студент не найден".to_string()));
    };
    Ok(Response::success(json!({
        "student": {
            "first_name": student.first_name,
            "last_name": student.last_name,
            "middle_name": student.middle_name,
            "group_name": student.group_name,
        }
    })))
}

fn import_lab_works(conn: &Connection, data: &Value) -> Result<Response, ServerError> {
    let Some(rows) = data.get("lab_works").and_then(|v| v.as_array()) else {
        return Err(ServerError::Validation("Нет данных для импорта".to_string()));
    };
    if rows.is_empty() {
        return Err(ServerError::Validation("Нет данных для импорта".to_string()));
    }

    let labs = rows
        .iter()
        .map(|row| {
            Ok(NewLabWork {
                theme: required_str(row, "theme", "Нет данных для импорта")?,
                time: required_i64(row, "time", "Нет данных для импорта")?,
                question_count: optional_i64(row, "question_count").unwrap_or(0),
            })
        })
        .collect::<Result<Vec<_>, ServerError>>()?;

    store::import_lab_works(conn, &labs)?;
    Ok(Response::success(Value::Null))
}

fn export_results(conn: &Connection) -> Result<Response, ServerError> {
    let results: Vec<Value> = store::export_results(conn)?
        .into_iter()
        .map(|r| {
            json!({
                "first_name": r.first_name,
                "last_name": r.last_name,
                "middle_name": r.middle_name,
                "group_name": r.group_name,
                "lab_id": r.lab_id,
                "score": r.score,
            })
        })
        .collect();
    Ok(Response::success(json!({ "results": results })))
}

fn upload_image(ctx: &AppCtx, conn: &Connection, data: &Value) -> Result<Response, ServerError> {
    let content = data
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServerError::Validation("Не переданы данные изображения".to_string()))?;
    let bytes = BASE64
        .decode(content)
        .map_err(|_| ServerError::Validation("Неверные данные изображения".to_string()))?;
    if bytes.is_empty() {
        return Err(ServerError::Validation(
            "Не переданы данные изображения".to_string(),
        ));
    }

    let hint = data.get("filename").and_then(|v| v.as_str());
    let url = ctx.image_store.save(conn, &bytes, hint)?;
    Ok(Response::success(json!({ "image_url": url })))
}
