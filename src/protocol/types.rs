use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ServerError;

/// Request envelope: `{"action": <name>, "data": {...}}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    pub action: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Request {
    pub fn new(action: Action, data: serde_json::Value) -> Self {
        Request {
            action: action.name().to_string(),
            data,
        }
    }
}

/// Response envelope: `{"status": ..., "data": {...}, "message": ...}`.
/// `retake` is a third outcome distinct from errors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Retake,
}

impl Response {
    pub fn success(data: serde_json::Value) -> Self {
        Response {
            status: Status::Success,
            data,
            message: None,
        }
    }

    pub fn retake(data: serde_json::Value, message: impl Into<String>) -> Self {
        Response {
            status: Status::Retake,
            data,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response {
            status: Status::Error,
            data: json!(null),
            message: Some(message.into()),
        }
    }
}

impl From<&ServerError> for Response {
    fn from(e: &ServerError) -> Self {
        Response::error(e.client_message())
    }
}

/// Every action the dispatcher understands. Resolving the name up front gives
/// the dispatch match exhaustiveness checking instead of a string ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Register,
    GetLabWorks,
    CheckLabCompleted,
    GetQuestions,
    SubmitTest,
    GetStudentInfo,
    ImportLabWorks,
    ExportResults,
    UploadImage,
}

const ACTION_NAMES: &[(&str, Action)] = &[
    ("login", Action::Login),
    ("register", Action::Register),
    ("get_lab_works", Action::GetLabWorks),
    ("check_lab_completed", Action::CheckLabCompleted),
    ("get_questions", Action::GetQuestions),
    ("submit_test", Action::SubmitTest),
    ("get_student_info", Action::GetStudentInfo),
    ("import_lab_works", Action::ImportLabWorks),
    ("export_results", Action::ExportResults),
    ("upload_image", Action::UploadImage),
];

impl Action {
    pub fn from_name(name: &str) -> Option<Action> {
        ACTION_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| *a)
    }

    pub fn name(&self) -> &'static str {
        ACTION_NAMES
            .iter()
            .find(|(_, a)| a == self)
            .map(|(n, _)| *n)
            .expect("every action is in the name table")
    }
}
