use crate::{
    error::AppError,
    models::{DbStudentScoreRow, RankingEntry, Score, Student, StudentSummary, group_student_rows},
};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub const RANKING_LIMIT: i64 = 2;

fn student_conflict(name: &str) -> String {
    format!("Student {} is already registered.", name)
}

fn score_conflict(name: &str, subject: &str) -> String {
    format!("Subject {} for Student {} is already registered.", subject, name)
}

fn score_not_found(name: &str, subject: &str) -> AppError {
    AppError::NotFound(format!(
        "Subject {} for Student {} not found in database",
        subject, name
    ))
}

fn student_missing(name: &str) -> String {
    format!("Student {} is not registered.", name)
}

/// Inserts a student through any executor, so callers can run it inside
/// their own transaction.
#[instrument(skip_all, fields(name = %student.name))]
pub async fn insert_student<'e, E>(executor: E, student: &Student) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO students (name, password, class) VALUES (?, ?, ?)")
        .bind(&student.name)
        .bind(&student.password)
        .bind(&student.class)
        .execute(executor)
        .await
        .map_err(|e| {
            AppError::from_write_error(
                e,
                || student_conflict(&student.name),
                || student_missing(&student.name),
            )
        })?;

    Ok(())
}

#[instrument(skip_all, fields(id = %score.id))]
pub async fn insert_score<'e, E>(executor: E, score: &Score) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO scores (id, name, subject, score) VALUES (?, ?, ?, ?)")
        .bind(&score.id)
        .bind(&score.name)
        .bind(&score.subject)
        .bind(score.score)
        .execute(executor)
        .await
        .map_err(|e| {
            AppError::from_write_error(
                e,
                || score_conflict(&score.name, &score.subject),
                || student_missing(&score.name),
            )
        })?;

    Ok(())
}

#[instrument(skip(pool, password))]
pub async fn create_student(
    pool: &Pool<Sqlite>,
    name: &str,
    password: &str,
    class: &str,
) -> Result<Student, AppError> {
    info!("Creating student");
    let student = Student {
        name: name.to_string(),
        password: password.to_string(),
        class: class.to_string(),
    };

    insert_student(pool, &student).await?;

    Ok(student)
}

#[instrument(skip(pool))]
pub async fn get_student(pool: &Pool<Sqlite>, name: &str) -> Result<Student, AppError> {
    info!("Fetching student by name");
    let row = sqlx::query_as::<_, Student>(
        "SELECT name, password, class FROM students WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(student) => Ok(student),
        _ => Err(AppError::NotFound(format!(
            "Student {} not found in database",
            name
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn get_all_students(pool: &Pool<Sqlite>) -> Result<Vec<Student>, AppError> {
    info!("Getting all students");
    let rows = sqlx::query_as::<_, Student>(
        "SELECT name, password, class FROM students ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool, password))]
pub async fn update_student(
    pool: &Pool<Sqlite>,
    name: &str,
    class: &str,
    password: &str,
) -> Result<(), AppError> {
    info!("Updating student");
    let result = sqlx::query("UPDATE students SET class = ?, password = ? WHERE name = ?")
        .bind(class)
        .bind(password)
        .bind(name)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Student {} not found in database",
            name
        )));
    }

    Ok(())
}

/// Deletes a student; their scores go with them through the cascading key.
#[instrument(skip(pool))]
pub async fn delete_student(pool: &Pool<Sqlite>, name: &str) -> Result<(), AppError> {
    info!("Deleting student");
    let result = sqlx::query("DELETE FROM students WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Student {} not found in database",
            name
        )));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn create_score(
    pool: &Pool<Sqlite>,
    name: &str,
    subject: &str,
    score: i64,
) -> Result<Score, AppError> {
    info!("Creating score");
    let score = Score::new(name, subject, score);

    insert_score(pool, &score).await?;

    Ok(score)
}

#[instrument(skip(pool))]
pub async fn get_score(pool: &Pool<Sqlite>, name: &str, subject: &str) -> Result<Score, AppError> {
    info!("Fetching score");
    let row = sqlx::query_as::<_, Score>(
        "SELECT id, name, subject, score FROM scores WHERE name = ? AND subject = ?",
    )
    .bind(name)
    .bind(subject)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| score_not_found(name, subject))
}

#[instrument(skip(pool))]
pub async fn get_all_scores(pool: &Pool<Sqlite>) -> Result<Vec<Score>, AppError> {
    info!("Getting all scores");
    let rows = sqlx::query_as::<_, Score>(
        "SELECT id, name, subject, score FROM scores ORDER BY name, subject",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Changes the subject and value of one score. The id follows the new
/// subject so the (name, subject) pair stays unique. The lookup and the
/// update share a transaction.
#[instrument(skip(pool))]
pub async fn update_score(
    pool: &Pool<Sqlite>,
    name: &str,
    subject: &str,
    new_subject: &str,
    new_score: i64,
) -> Result<Score, AppError> {
    info!("Updating score");
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Score>(
        "SELECT id, name, subject, score FROM scores WHERE name = ? AND subject = ?",
    )
    .bind(name)
    .bind(subject)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| score_not_found(name, subject))?;

    let updated = Score::new(name, new_subject, new_score);

    let result = sqlx::query("UPDATE scores SET id = ?, subject = ?, score = ? WHERE id = ?")
        .bind(&updated.id)
        .bind(&updated.subject)
        .bind(updated.score)
        .bind(&current.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_write_error(
                e,
                || score_conflict(name, new_subject),
                || student_missing(name),
            )
        })?;

    if result.rows_affected() == 0 {
        return Err(score_not_found(name, subject));
    }

    tx.commit().await?;
    Ok(updated)
}

#[instrument(skip(pool))]
pub async fn delete_score(pool: &Pool<Sqlite>, name: &str, subject: &str) -> Result<(), AppError> {
    info!("Deleting score");
    let result = sqlx::query("DELETE FROM scores WHERE name = ? AND subject = ?")
        .bind(name)
        .bind(subject)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(score_not_found(name, subject));
    }

    Ok(())
}

/// Every student with whatever scores they have, students without scores
/// included.
#[instrument(skip(pool))]
pub async fn list_students_with_scores(
    pool: &Pool<Sqlite>,
) -> Result<Vec<StudentSummary>, AppError> {
    info!("Listing students with scores");
    let rows = sqlx::query_as::<_, DbStudentScoreRow>(
        "SELECT st.name, st.class, sc.subject, sc.score
         FROM students st
         LEFT OUTER JOIN scores sc ON st.name = sc.name
         ORDER BY st.name, sc.subject",
    )
    .fetch_all(pool)
    .await?;

    Ok(group_student_rows(rows))
}

/// Top scores for a subject, highest first. Equal scores are ordered by
/// student name.
#[instrument(skip(pool))]
pub async fn get_top_scores(
    pool: &Pool<Sqlite>,
    subject: &str,
) -> Result<Vec<RankingEntry>, AppError> {
    info!("Getting top scores");
    let rows = sqlx::query_as::<_, RankingEntry>(
        "SELECT sc.score, sc.subject, st.name, st.class, st.password
         FROM scores sc
         JOIN students st ON sc.name = st.name
         WHERE sc.subject = ?
         ORDER BY sc.score DESC, st.name ASC
         LIMIT ?",
    )
    .bind(subject)
    .bind(RANKING_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_subjects(pool: &Pool<Sqlite>) -> Result<Vec<String>, AppError> {
    let subjects = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT subject FROM scores ORDER BY subject",
    )
    .fetch_all(pool)
    .await?;

    Ok(subjects)
}

/// Top scores for every subject that has at least one score.
#[instrument(skip(pool))]
pub async fn get_rankings(
    pool: &Pool<Sqlite>,
) -> Result<BTreeMap<String, Vec<RankingEntry>>, AppError> {
    info!("Getting rankings for all subjects");
    let mut rankings = BTreeMap::new();

    for subject in get_subjects(pool).await? {
        let top = get_top_scores(pool, &subject).await?;
        rankings.insert(subject, top);
    }

    Ok(rankings)
}
