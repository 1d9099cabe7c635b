use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use thiserror::Error;
use tracing::{Span, error, field::Empty, info_span, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    DuplicateKey(String),

    #[error("{0}")]
    MissingReference(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Message suitable for showing to the person who made the request.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::DuplicateKey(msg)
            | AppError::MissingReference(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Logs the error inside an `app_error` span. Fields recorded on a span
    /// must be declared up front, so the span declares every attribute
    /// `log_and_record` writes.
    pub fn report(&self, ctx: &str) {
        let span = info_span!(
            "app_error",
            context = ctx,
            error = Empty,
            "error.type" = Empty,
            "error.message" = Empty,
            "otel.status_code" = Empty,
        );
        let _entered = span.enter();
        self.log_and_record(ctx);
    }

    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        let error_kind = match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
                "database_error"
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
                "not_found_error"
            }
            AppError::Validation(msg) => {
                warn!(message = %msg, context = %ctx, "Validation error");
                "validation_error"
            }
            AppError::DuplicateKey(msg) => {
                warn!(message = %msg, context = %ctx, "Duplicate key");
                "duplicate_key_error"
            }
            AppError::MissingReference(msg) => {
                warn!(message = %msg, context = %ctx, "Missing reference");
                "missing_reference_error"
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
                "internal_error"
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(error_kind));
            current_span.record("error.message", tracing::field::display(&message));

            if matches!(self, AppError::Database(_) | AppError::Internal(_)) {
                current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => Status::InternalServerError,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Validation(_) => Status::BadRequest,
            AppError::DuplicateKey(_) => Status::Conflict,
            AppError::MissingReference(_) => Status::UnprocessableEntity,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Maps a failed insert or update onto the conflict variants, keeping any
    /// other database failure as-is.
    pub fn from_write_error(
        err: sqlx::Error,
        duplicate: impl FnOnce() -> String,
        missing: impl FnOnce() -> String,
    ) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateKey(duplicate())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::MissingReference(missing())
            }
            _ => AppError::Database(err),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(error: csv::Error) -> Self {
        if error.is_io_error() {
            AppError::Internal(format!("CSV I/O error: {}", error))
        } else {
            AppError::Validation(format!("Could not read CSV file: {}", error))
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", error))
    }
}

impl From<rocket::tokio::task::JoinError> for AppError {
    fn from(error: rocket::tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", error))
    }
}
