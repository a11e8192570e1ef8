use movie_recommender::handlers::recommendations::{global_handler, handle_rejection};
use movie_recommender::models::db::Database;
use movie_recommender::services::modelserver::ModelServer;
use movie_recommender::services::sqlite::{SqliteDatabase, SAMPLE_SEED};
use std::sync::Arc;
use warp::Filter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://movies.db".to_string());
    let model_path = std::env::var("MODEL_PATH").unwrap_or_else(|_| "nmf_model.json".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let backend = SqliteDatabase::connect(&database_url).await?;
    backend.seed_if_empty(SAMPLE_SEED).await?;
    let database = Database::new(Arc::new(backend));

    // Loaded once at startup; a missing bundle disables the recommendation
    // surface while the catalog keeps serving.
    let server = Arc::new(ModelServer::load(database, &model_path));

    let routes = global_handler(server).recover(handle_rejection);

    log::info!("Serving on http://0.0.0.0:{}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
