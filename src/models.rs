use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record that can be written as a CSV row. `HEADERS` and `fields` share
/// the same order, which is the declaration order of the record's fields.
pub trait CsvRecord {
    const HEADERS: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub name: String,
    pub password: String,
    pub class: String,
}

impl CsvRecord for Student {
    const HEADERS: &'static [&'static str] = &["name", "password", "class"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.password.clone(),
            self.class.clone(),
        ]
    }
}

pub const MAX_SCORE: i64 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Score {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub score: i64,
}

impl Score {
    pub fn new(name: &str, subject: &str, score: i64) -> Self {
        Self {
            id: Self::derive_id(name, subject),
            name: name.to_string(),
            subject: subject.to_string(),
            score,
        }
    }

    // Plain concatenation: ("ab", "c") and ("a", "bc") share an id.
    pub fn derive_id(name: &str, subject: &str) -> String {
        format!("{}{}", name, subject)
    }
}

impl CsvRecord for Score {
    const HEADERS: &'static [&'static str] = &["id", "name", "subject", "score"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.subject.clone(),
            self.score.to_string(),
        ]
    }
}

/// One row of the ranking join. The password comes along with the join but
/// is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RankingEntry {
    pub score: i64,
    pub subject: String,
    pub name: String,
    pub class: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub name: String,
    pub class: String,
    pub scores: BTreeMap<String, i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbStudentScoreRow {
    pub name: Option<String>,
    pub class: Option<String>,
    pub subject: Option<String>,
    pub score: Option<i64>,
}

/// Folds outer-join rows, already ordered by student name, into one summary
/// per student.
pub fn group_student_rows(rows: Vec<DbStudentScoreRow>) -> Vec<StudentSummary> {
    let mut students: Vec<StudentSummary> = Vec::new();

    for row in rows {
        let name = row.name.unwrap_or_default();

        let needs_new = students.last().is_none_or(|last| last.name != name);
        if needs_new {
            students.push(StudentSummary {
                name,
                class: row.class.unwrap_or_default(),
                scores: BTreeMap::new(),
            });
        }

        if let (Some(subject), Some(score), Some(current)) =
            (row.subject, row.score, students.last_mut())
        {
            current.scores.insert(subject, score);
        }
    }

    students
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Student,
    Score,
}

impl RecordKind {
    /// Columns an uploaded file must carry, in order.
    pub fn upload_columns(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Student => &["name", "password", "class"],
            RecordKind::Score => &["name", "subject", "score"],
        }
    }

    /// Form field name used for uploads of this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            RecordKind::Student => "student",
            RecordKind::Score => "score",
        }
    }

    pub fn export_file_name(&self) -> String {
        format!("{}.csv", self.tag())
    }
}
