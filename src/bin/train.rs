use movie_recommender::models::db::Database;
use movie_recommender::services::nmf::{
    DEFAULT_MAX_ITER, DEFAULT_N_COMPONENTS, DEFAULT_RANDOM_SEED,
};
use movie_recommender::services::sqlite::{SqliteDatabase, SAMPLE_SEED};
use movie_recommender::services::training::{train_model, Hyperparameters};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://movies.db".to_string());
    let model_path = std::env::var("MODEL_PATH").unwrap_or_else(|_| "nmf_model.json".to_string());

    let backend = SqliteDatabase::connect(&database_url).await?;
    backend.seed_if_empty(SAMPLE_SEED).await?;
    let database = Database::new(Arc::new(backend));

    let hyperparameters = Hyperparameters {
        n_components: DEFAULT_N_COMPONENTS,
        max_iter: DEFAULT_MAX_ITER,
        random_seed: DEFAULT_RANDOM_SEED,
    };
    let model = train_model(&database, hyperparameters, &model_path).await?;

    // Smoke check mirroring the serving query path.
    let sample = model.recommend(1, 5)?;
    log::info!("Sample recommendations for movie 1: {:?}", sample);

    database.close().await?;
    Ok(())
}
