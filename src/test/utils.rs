use crate::database::{connect_pool, init_schema};
use crate::db::{create_score, create_student};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::init_rocket;
use crate::validation::ValidationResponse;
use rocket::http::Header;
use rocket::local::asynchronous::Client;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";
pub const BOUNDARY: &str = "X-STUDENT-RECORDS-BOUNDARY";

#[derive(Default)]
pub struct TestDbBuilder {
    students: Vec<TestStudent>,
    scores: Vec<TestScore>,
}

pub struct TestStudent {
    pub name: String,
    pub class: String,
    pub password: String,
}

pub struct TestScore {
    pub name: String,
    pub subject: String,
    pub score: i64,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn student(self, name: &str, class: &str) -> Self {
        self.student_with_password(name, class, STANDARD_PASSWORD)
    }

    pub fn student_with_password(mut self, name: &str, class: &str, password: &str) -> Self {
        self.students.push(TestStudent {
            name: name.to_string(),
            class: class.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn score(mut self, name: &str, subject: &str, score: i64) -> Self {
        self.scores.push(TestScore {
            name: name.to_string(),
            subject: subject.to_string(),
            score,
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });

        let pool = connect_pool("sqlite::memory:", 1).await?;
        init_schema(&pool).await?;

        for student in &self.students {
            create_student(&pool, &student.name, &student.password, &student.class).await?;
        }

        for score in &self.scores {
            create_score(&pool, &score.name, &score.subject, score.score).await?;
        }

        Ok(TestDb { pool })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
}

impl TestDb {
    pub async fn empty() -> Self {
        TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build empty test database")
    }

    pub async fn student_count(&self) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count students")
    }

    pub async fn score_count(&self) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scores")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count scores")
    }
}

/// Three students in one math ranking plus an extra english score.
pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .student("alice", "1A")
        .student("bob", "1B")
        .student("carol", "1C")
        .score("alice", "math", 90)
        .score("bob", "math", 95)
        .score("carol", "math", 80)
        .score("alice", "english", 70)
        .build()
        .await
        .expect("Failed to build standard test database")
}

pub fn write_csv(dir: &Path, file_name: &str, contents: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, contents).expect("Failed to write test CSV");
    path
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("Failed to read CSV")
        .lines()
        .map(str::to_string)
        .collect()
}

pub struct TestContext {
    pub db: TestDb,
    pub uploads: TempDir,
    pub downloads: TempDir,
}

impl TestContext {
    pub fn upload_count(&self) -> usize {
        std::fs::read_dir(self.uploads.path())
            .expect("Failed to list uploads")
            .count()
    }
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestContext) {
    let uploads = TempDir::new().expect("Failed to create upload dir");
    let downloads = TempDir::new().expect("Failed to create download dir");

    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        upload_dir: uploads.path().to_path_buf(),
        download_dir: downloads.path().to_path_buf(),
        secret_key: None,
    };

    let rocket = init_rocket(test_db.pool.clone(), config).await;
    let client = Client::tracked(rocket)
        .await
        .expect("Failed to build rocket client");

    (
        client,
        TestContext {
            db: test_db,
            uploads,
            downloads,
        },
    )
}

pub fn multipart_header() -> Header<'static> {
    Header::new(
        "Content-Type",
        format!("multipart/form-data; boundary={}", BOUNDARY),
    )
}

/// A multipart body carrying one file under `field`.
pub fn multipart_file(field: &str, filename: &str, contents: &str) -> String {
    format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n--{b}--\r\n",
        b = BOUNDARY,
        field = field,
        filename = filename,
        contents = contents,
    )
}

/// Every message in an error body, in no particular field order.
pub fn error_messages(body: &ValidationResponse) -> Vec<&str> {
    body.errors
        .values()
        .flat_map(|messages| messages.iter().map(String::as_str))
        .collect()
}
