use thiserror::Error;

use crate::protocol::frame::FramingError;

/// Everything a request handler or the connection loop can fail with.
///
/// Only `Framing` ends the connection; every other variant renders as exactly
/// one error envelope and the read loop keeps going.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("framing: {0}")]
    Framing(#[from] FramingError),

    /// A complete frame whose payload is not valid JSON.
    #[error("decode: {0}")]
    Decode(#[source] serde_json::Error),

    /// Missing or malformed request fields. The message is client-facing.
    #[error("{0}")]
    Validation(String),

    /// A lab cannot be composed into a quiz; lists every short category.
    #[error("composition failed: {}", missing.join("; "))]
    Composition { missing: Vec<String> },

    /// A result already exists for this (student, lab) pair.
    #[error("result already recorded")]
    DuplicateSubmission,

    /// Underlying store failure (database or image filesystem). Clients get
    /// a generic message; the full text goes to the log only.
    #[error("storage: {0}")]
    Storage(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Storage(e.to_string())
    }
}

impl ServerError {
    /// True when the connection itself is no longer usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::Framing(_))
    }

    /// The human-readable message sent back to the client. Kept in Russian to
    /// match the wire behavior the GUI clients expect.
    pub fn client_message(&self) -> String {
        match self {
            ServerError::Framing(e) => e.to_string(),
            ServerError::Decode(_) => "Неверный формат JSON".to_string(),
            ServerError::Validation(msg) => msg.clone(),
            ServerError::Composition { missing } => format!(
                "Недостаточно вопросов в следующих категориях:\n- {}",
                missing.join("\n- ")
            ),
            ServerError::DuplicateSubmission => "Лабораторная работа уже выполнена".to_string(),
            ServerError::Storage(_) => "Ошибка базы данных".to_string(),
            ServerError::UnknownAction(_) => "Неизвестное действие".to_string(),
        }
    }
}
