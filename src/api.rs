use rocket::form::Form;
use rocket::fs::{NamedFile, TempFile};
use rocket::http::{Header, Status};
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{FromForm, Responder, State};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use tracing::info;
use validator::Validate;

use crate::db::{
    create_score, create_student, delete_score, delete_student, get_rankings, get_score,
    get_student, get_top_scores, list_students_with_scores, update_score, update_student,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::export::export_records;
use crate::import::{ImportReport, process_upload};
use crate::models::{RankingEntry, RecordKind, Score, Student, StudentSummary};
use crate::upload::{allowed_file, upload_path};
use crate::validation::{ApiError, AppErrorExt, JsonValidateExt, request_error};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Class is required"))]
    pub class: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateStudentRequest {
    #[validate(length(min = 1, message = "Class is required"))]
    pub class: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ScoreRequest {
    #[validate(length(min = 1, message = "Subject is required"))]
    pub subject: String,
    #[validate(range(min = 0, max = 999, message = "Score must be between 0 and 999"))]
    pub score: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub kind: RecordKind,
    pub imported: usize,
    pub errors: Vec<String>,
}

impl UploadResponse {
    fn new(kind: RecordKind, report: ImportReport) -> Self {
        Self {
            kind,
            imported: report.imported,
            errors: report.errors,
        }
    }
}

#[get("/health")]
pub fn health() -> Status {
    Status::Ok
}

#[get("/students")]
pub async fn api_get_students(
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<StudentSummary>>, ApiError> {
    let students = list_students_with_scores(db).await.validate_custom()?;
    Ok(Json(students))
}

#[post("/students", data = "<request>")]
pub async fn api_create_student(
    request: Json<CreateStudentRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<Student>>, ApiError> {
    let validated = request.validate_custom()?;

    let student = create_student(db, &validated.name, &validated.password, &validated.class)
        .await
        .validate_custom()?;

    let location = format!("/api/students/{}", student.name);
    Ok(Created::new(location).body(Json(student)))
}

#[get("/students/<name>")]
pub async fn api_get_student(
    name: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Student>, ApiError> {
    let student = get_student(db, name).await.validate_custom()?;
    Ok(Json(student))
}

#[put("/students/<name>", data = "<request>")]
pub async fn api_update_student(
    name: &str,
    request: Json<UpdateStudentRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    let validated = request.validate_custom()?;

    update_student(db, name, &validated.class, &validated.password)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

#[delete("/students/<name>")]
pub async fn api_delete_student(name: &str, db: &State<Pool<Sqlite>>) -> Result<Status, ApiError> {
    delete_student(db, name).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[post("/students/<name>/scores", data = "<request>")]
pub async fn api_create_score(
    name: &str,
    request: Json<ScoreRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<Score>>, ApiError> {
    let validated = request.validate_custom()?;

    let score = create_score(db, name, &validated.subject, validated.score)
        .await
        .validate_custom()?;

    let location = format!("/api/students/{}/scores/{}", score.name, score.subject);
    Ok(Created::new(location).body(Json(score)))
}

#[get("/students/<name>/scores/<subject>")]
pub async fn api_get_score(
    name: &str,
    subject: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Score>, ApiError> {
    let score = get_score(db, name, subject).await.validate_custom()?;
    Ok(Json(score))
}

#[put("/students/<name>/scores/<subject>", data = "<request>")]
pub async fn api_update_score(
    name: &str,
    subject: &str,
    request: Json<ScoreRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Score>, ApiError> {
    let validated = request.validate_custom()?;

    let score = update_score(db, name, subject, &validated.subject, validated.score)
        .await
        .validate_custom()?;

    Ok(Json(score))
}

#[delete("/students/<name>/scores/<subject>")]
pub async fn api_delete_score(
    name: &str,
    subject: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ApiError> {
    delete_score(db, name, subject).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[get("/rankings")]
pub async fn api_get_rankings(
    db: &State<Pool<Sqlite>>,
) -> Result<Json<BTreeMap<String, Vec<RankingEntry>>>, ApiError> {
    let rankings = get_rankings(db).await.validate_custom()?;
    Ok(Json(rankings))
}

#[get("/rankings/<subject>")]
pub async fn api_get_subject_ranking(
    subject: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<RankingEntry>>, ApiError> {
    let ranking = get_top_scores(db, subject).await.validate_custom()?;
    Ok(Json(ranking))
}

#[derive(FromForm)]
pub struct UploadForm<'r> {
    student: Option<TempFile<'r>>,
    score: Option<TempFile<'r>>,
}

fn raw_file_name<'a>(file: &'a TempFile<'_>) -> &'a str {
    file.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
        .unwrap_or_default()
}

#[post("/upload", data = "<form>")]
pub async fn api_upload(
    form: Form<UploadForm<'_>>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = form.into_inner();

    let (kind, mut file) = match (form.student, form.score) {
        (Some(file), _) => (RecordKind::Student, file),
        (None, Some(file)) => (RecordKind::Score, file),
        (None, None) => return Err(request_error("file", "No selected file")),
    };

    let filename = raw_file_name(&file).to_string();
    if filename.is_empty() {
        return Err(request_error("file", "No selected file"));
    }
    if !allowed_file(&filename) {
        return Err(request_error("file", "File type uploaded is not csv"));
    }

    let saved_path = upload_path(&config.upload_dir, kind);
    file.copy_to(&saved_path)
        .await
        .map_err(AppError::from)
        .validate_custom()?;
    info!(kind = kind.tag(), filename = %filename, path = %saved_path.display(), "Saved upload");

    let report = process_upload(db, &saved_path, kind)
        .await
        .validate_custom()?;

    Ok(Json(UploadResponse::new(kind, report)))
}

/// A CSV file served with an attachment disposition.
#[derive(Responder)]
pub struct CsvAttachment {
    file: NamedFile,
    disposition: Header<'static>,
}

async fn download(
    kind: RecordKind,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<CsvAttachment, ApiError> {
    let path = export_records(db, kind, &config.download_dir)
        .await
        .validate_custom()?;

    let file = NamedFile::open(&path)
        .await
        .map_err(AppError::from)
        .validate_custom()?;

    Ok(CsvAttachment {
        file,
        disposition: Header::new(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", kind.export_file_name()),
        ),
    })
}

#[get("/download/students")]
pub async fn api_download_students(
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<CsvAttachment, ApiError> {
    download(RecordKind::Student, db, config).await
}

#[get("/download/scores")]
pub async fn api_download_scores(
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<CsvAttachment, ApiError> {
    download(RecordKind::Score, db, config).await
}
