mod cli;
mod infra;
mod routes;
mod server;

use cnaps_intake::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
