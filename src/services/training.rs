use crate::models::db::Database;
use crate::services::nmf::{build_rating_matrix, Nmf, RecommenderError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_components: usize,
    pub max_iter: usize,
    pub random_seed: u64,
}

/// Everything the serving process needs, persisted as one JSON document:
/// hyperparameters, both factor matrices, the id indexes and the original
/// rating matrix. The version field is checked on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: u32,
    pub hyperparameters: Hyperparameters,
    pub user_features: Vec<Vec<f64>>,
    pub item_features: Vec<Vec<f64>>,
    pub user_ids: Vec<i64>,
    pub movie_ids: Vec<i64>,
    pub rating_matrix: Vec<Vec<f64>>,
}

#[derive(Debug)]
pub enum BundleError {
    NotFound(String),
    Invalid(String),
    Io(String),
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleError::NotFound(path) => write!(f, "Model bundle not found: {}", path),
            BundleError::Invalid(msg) => write!(f, "Invalid model bundle: {}", msg),
            BundleError::Io(msg) => write!(f, "Bundle I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BundleError {}

fn rows_to_vec(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

fn vec_to_rows(rows: &[Vec<f64>], what: &str) -> Result<Array2<f64>, BundleError> {
    let width = rows.first().map(|row| row.len()).unwrap_or(0);
    let mut matrix = Array2::<f64>::zeros((rows.len(), width));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(BundleError::Invalid(format!(
                "{} row {} has length {}, expected {}",
                what,
                i,
                row.len(),
                width
            )));
        }
        for (j, &value) in row.iter().enumerate() {
            matrix[(i, j)] = value;
        }
    }
    Ok(matrix)
}

/// Serialize a trained model to `path`.
pub fn save_model(model: &Nmf, path: &str) -> Result<(), BundleError> {
    let (user_features, item_features, rating_matrix, user_ids, movie_ids) = match (
        model.user_features(),
        model.item_features(),
        model.rating_matrix(),
        model.user_ids(),
        model.movie_ids(),
    ) {
        (Some(w), Some(h), Some(v), Some(users), Some(movies)) => (w, h, v, users, movies),
        _ => {
            return Err(BundleError::Invalid(
                "refusing to persist an untrained model".to_string(),
            ))
        }
    };

    let bundle = ModelBundle {
        version: BUNDLE_VERSION,
        hyperparameters: Hyperparameters {
            n_components: model.n_components,
            max_iter: model.max_iter,
            random_seed: model.random_seed,
        },
        user_features: rows_to_vec(user_features),
        item_features: rows_to_vec(item_features),
        user_ids: user_ids.to_vec(),
        movie_ids: movie_ids.to_vec(),
        rating_matrix: rows_to_vec(rating_matrix),
    };

    let file = File::create(path).map_err(|e| BundleError::Io(e.to_string()))?;
    serde_json::to_writer(file, &bundle).map_err(|e| BundleError::Io(e.to_string()))?;
    Ok(())
}

/// Deserialize a model bundle from `path` and rebuild the model.
///
/// A missing file is reported as `NotFound`; unreadable JSON, a version
/// mismatch or shape-inconsistent matrices are `Invalid`.
pub fn load_model(path: &str) -> Result<Nmf, BundleError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BundleError::NotFound(path.to_string()))
        }
        Err(e) => return Err(BundleError::Io(e.to_string())),
    };

    let bundle: ModelBundle =
        serde_json::from_reader(file).map_err(|e| BundleError::Invalid(e.to_string()))?;
    if bundle.version != BUNDLE_VERSION {
        return Err(BundleError::Invalid(format!(
            "bundle version {} is not supported (expected {})",
            bundle.version, BUNDLE_VERSION
        )));
    }

    let user_features = vec_to_rows(&bundle.user_features, "user features")?;
    let item_features = vec_to_rows(&bundle.item_features, "item features")?;
    let rating_matrix = vec_to_rows(&bundle.rating_matrix, "rating matrix")?;

    Nmf::from_parts(
        bundle.hyperparameters.n_components,
        bundle.hyperparameters.max_iter,
        bundle.hyperparameters.random_seed,
        rating_matrix,
        bundle.user_ids,
        bundle.movie_ids,
        user_features,
        item_features,
    )
    .map_err(|e| BundleError::Invalid(e.to_string()))
}

#[derive(Debug)]
pub enum TrainingError {
    Database(String),
    Recommender(RecommenderError),
    Bundle(BundleError),
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingError::Database(msg) => write!(f, "Training database error: {}", msg),
            TrainingError::Recommender(e) => write!(f, "Training failed: {}", e),
            TrainingError::Bundle(e) => write!(f, "Training bundle error: {}", e),
        }
    }
}

impl std::error::Error for TrainingError {}

/// Read the full rating store, fit an NMF model and persist the bundle.
/// Nothing is written when any step fails.
pub async fn train_model(
    database: &Database,
    hyperparameters: Hyperparameters,
    bundle_path: &str,
) -> Result<Nmf, TrainingError> {
    let ratings = database
        .load_ratings()
        .await
        .map_err(|e| TrainingError::Database(e.to_string()))?;
    let (matrix, user_ids, movie_ids) = build_rating_matrix(&ratings);
    log::info!(
        "Training NMF on {} ratings ({} users x {} movies, k={})",
        ratings.len(),
        user_ids.len(),
        movie_ids.len(),
        hyperparameters.n_components
    );

    let mut model = Nmf::new(
        hyperparameters.n_components,
        hyperparameters.max_iter,
        hyperparameters.random_seed,
    );
    model
        .fit(matrix, user_ids, movie_ids)
        .map_err(TrainingError::Recommender)?;

    if let Some(error) = model.reconstruction_error() {
        log::info!("Reconstruction error: {:.4}", error);
    }

    save_model(&model, bundle_path).map_err(TrainingError::Bundle)?;
    log::info!("Model saved to {}", bundle_path);
    Ok(model)
}
