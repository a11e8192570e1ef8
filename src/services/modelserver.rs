use crate::models::db::{Database, DatabaseError, Movie};
use crate::services::nmf::{Nmf, RecommenderError};
use crate::services::training::{load_model, BundleError};
use serde::{Deserialize, Serialize};

/// Serving-side handle owning the catalog store and the loaded model.
///
/// Constructed once at startup and shared read-only across request handlers;
/// no query path mutates it, so no locking is involved.
pub struct ModelServer {
    db: Database,
    model: Option<Nmf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub trained: bool,
    pub n_components: usize,
    pub max_iter: usize,
    pub random_seed: u64,
    pub num_users: usize,
    pub num_movies: usize,
    pub reconstruction_error: f64,
}

impl ModelServer {
    pub fn new(db: Database, model: Option<Nmf>) -> Self {
        ModelServer { db, model }
    }

    /// Load the model bundle from `bundle_path`, degrading to a disabled
    /// recommender when the bundle is missing or unreadable. The catalog
    /// surface keeps working either way.
    pub fn load(db: Database, bundle_path: &str) -> Self {
        let model = match load_model(bundle_path) {
            Ok(model) => {
                log::info!("Model loaded from {}", bundle_path);
                Some(model)
            }
            Err(BundleError::NotFound(path)) => {
                log::warn!(
                    "Model bundle {} not found, recommendations disabled; run the trainer first",
                    path
                );
                None
            }
            Err(e) => {
                log::error!("Failed to load model bundle: {}", e);
                None
            }
        };
        ModelServer::new(db, model)
    }

    pub fn predict(&self, movie_id: i64, n: usize) -> Result<Vec<i64>, RecommenderError> {
        match &self.model {
            Some(model) => model.recommend(movie_id, n),
            None => Err(RecommenderError::NotTrained),
        }
    }

    pub fn metadata(&self) -> ModelMetadata {
        match &self.model {
            Some(model) => ModelMetadata {
                trained: true,
                n_components: model.n_components,
                max_iter: model.max_iter,
                random_seed: model.random_seed,
                num_users: model.user_ids().map(|ids| ids.len()).unwrap_or(0),
                num_movies: model.movie_ids().map(|ids| ids.len()).unwrap_or(0),
                reconstruction_error: model.reconstruction_error().unwrap_or(0.0),
            },
            None => ModelMetadata {
                trained: false,
                n_components: 0,
                max_iter: 0,
                random_seed: 0,
                num_users: 0,
                num_movies: 0,
                reconstruction_error: 0.0,
            },
        }
    }

    pub async fn get_movies(&self) -> Result<Vec<Movie>, DatabaseError> {
        self.db.get_movies().await
    }

    pub async fn get_movie_by_id(&self, movie_id: i64) -> Result<Option<Movie>, DatabaseError> {
        self.db.get_movie_by_id(movie_id).await
    }
}
