use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::db::{get_all_scores, get_all_students};
use crate::error::AppError;
use crate::models::{CsvRecord, RecordKind};

/// Writes the header row for `R` followed by one row per record.
pub fn write_records<R: CsvRecord>(records: &[R], path: &Path) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(R::HEADERS)?;
    for record in records {
        writer.write_record(record.fields())?;
    }
    writer.flush()?;

    Ok(())
}

/// Dumps every stored record of `kind` into `download_dir` and returns the
/// path of the written file.
#[instrument(skip(pool))]
pub async fn export_records(
    pool: &Pool<Sqlite>,
    kind: RecordKind,
    download_dir: &Path,
) -> Result<PathBuf, AppError> {
    let path = download_dir.join(kind.export_file_name());

    let count = match kind {
        RecordKind::Student => {
            let students = get_all_students(pool).await?;
            write_blocking(students, path.clone()).await?
        }
        RecordKind::Score => {
            let scores = get_all_scores(pool).await?;
            write_blocking(scores, path.clone()).await?
        }
    };

    info!(path = %path.display(), rows = count, "Exported records");
    Ok(path)
}

async fn write_blocking<R>(records: Vec<R>, path: PathBuf) -> Result<usize, AppError>
where
    R: CsvRecord + Send + 'static,
{
    rocket::tokio::task::spawn_blocking(move || {
        write_records(&records, &path)?;
        Ok::<_, AppError>(records.len())
    })
    .await?
}
