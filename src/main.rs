#[macro_use]
extern crate rocket;

mod api;
mod database;
mod db;
mod env;
mod error;
mod export;
mod import;
mod models;
mod telemetry;
mod upload;
mod validation;
#[cfg(test)]
mod test;

use anyhow::Context;
use api::{
    api_create_score, api_create_student, api_delete_score, api_delete_student,
    api_download_scores, api_download_students, api_get_rankings, api_get_score, api_get_student,
    api_get_students, api_get_subject_ranking, api_update_score, api_update_student, api_upload,
    health,
};
use database::{connect_pool, init_schema};
use env::{AppConfig, load_environment, log_env_files};
use error::AppError;
use rocket::{Build, Config, Rocket};
use sqlx::{Pool, Sqlite};
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info};

const MAX_DB_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

#[launch]
async fn rocket() -> _ {
    let env_files = load_environment();
    init_tracing();

    match env_files {
        Ok(loads) => log_env_files(&loads),
        Err(e) => error!("Failed to load environment files: {:#}", e),
    }

    match setup(AppConfig::from_env()).await {
        Ok(rocket) => rocket,
        Err(e) => {
            error!("Failed to start student records service: {}", e);
            panic!("Startup failed: {}", e);
        }
    }
}

async fn setup(config: AppConfig) -> Result<Rocket<Build>, Error> {
    for dir in [&config.upload_dir, &config.download_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let pool = connect_pool(&config.database_url, MAX_DB_CONNECTIONS).await?;

    info!("Applying database schema...");
    init_schema(&pool).await?;
    info!("Schema ready");

    Ok(init_rocket(pool, config).await)
}

pub async fn init_rocket(pool: Pool<Sqlite>, config: AppConfig) -> Rocket<Build> {
    info!("Starting student records service");

    let mut figment = Config::figment();
    if let Some(secret_key) = &config.secret_key {
        figment = figment.merge((Config::SECRET_KEY, secret_key.as_str()));
    }

    rocket::custom(figment)
        .manage(pool)
        .manage(config)
        .mount(
            "/api",
            routes![
                health,
                api_get_students,
                api_create_student,
                api_get_student,
                api_update_student,
                api_delete_student,
                api_create_score,
                api_get_score,
                api_update_score,
                api_delete_score,
                api_get_rankings,
                api_get_subject_ranking,
                api_upload,
                api_download_students,
                api_download_scores,
            ],
        )
        .attach(TelemetryFairing)
}
