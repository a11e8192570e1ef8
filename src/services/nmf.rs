use crate::models::db::Rating;
use ndarray::{Array2, ArrayView1};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashMap};

// Guards the multiplicative-update denominators against division by zero.
const EPSILON: f64 = 1e-9;
// Reconstruction error is only re-evaluated every this many iterations.
const CONVERGENCE_CHECK_INTERVAL: usize = 10;

pub const DEFAULT_N_COMPONENTS: usize = 10;
pub const DEFAULT_MAX_ITER: usize = 200;
pub const DEFAULT_RANDOM_SEED: u64 = 42;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

#[derive(Debug)]
pub enum RecommenderError {
    NotTrained,
    EmptyMatrix,
    RankTooLarge {
        rank: usize,
        rows: usize,
        cols: usize,
    },
    ShapeMismatch(String),
}

impl std::fmt::Display for RecommenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommenderError::NotTrained => write!(f, "Model not trained or loaded"),
            RecommenderError::EmptyMatrix => {
                write!(f, "Rating matrix has zero rows or zero columns")
            }
            RecommenderError::RankTooLarge { rank, rows, cols } => write!(
                f,
                "Rank {} exceeds matrix dimensions ({}x{})",
                rank, rows, cols
            ),
            RecommenderError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
        }
    }
}

impl std::error::Error for RecommenderError {}

/// Pivot rating triples into a dense user x movie matrix.
///
/// Rows and columns follow the distinct user and movie ids sorted ascending;
/// absent cells stay 0.0 (meaning "unrated", not "rated zero"). When the same
/// (user, movie) pair occurs more than once, the later triple wins.
pub fn build_rating_matrix(ratings: &[Rating]) -> (Array2<f64>, Vec<i64>, Vec<i64>) {
    let users: BTreeSet<i64> = ratings.iter().map(|r| r.user_id).collect();
    let movies: BTreeSet<i64> = ratings.iter().map(|r| r.movie_id).collect();
    let user_ids: Vec<i64> = users.into_iter().collect();
    let movie_ids: Vec<i64> = movies.into_iter().collect();

    let user_index: HashMap<i64, usize> =
        user_ids.iter().enumerate().map(|(i, &u)| (u, i)).collect();
    let movie_index: HashMap<i64, usize> =
        movie_ids.iter().enumerate().map(|(i, &m)| (m, i)).collect();

    let mut matrix = Array2::<f64>::zeros((user_ids.len(), movie_ids.len()));
    for rating in ratings {
        matrix[(user_index[&rating.user_id], movie_index[&rating.movie_id])] = rating.rating;
    }

    (matrix, user_ids, movie_ids)
}

/// Cosine similarity between two feature vectors, 0.0 when either norm is 0.
pub fn cosine_similarity(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (norm_a * norm_b)
}

fn frobenius(matrix: &Array2<f64>) -> f64 {
    matrix.mapv(|x| x * x).sum().sqrt()
}

/// Non-negative matrix factorization of the user x movie rating matrix,
/// with item-to-item recommendation over the latent item features.
pub struct Nmf {
    pub n_components: usize,
    pub max_iter: usize,
    pub random_seed: u64,
    pub tolerance: f64,

    user_features: Option<Array2<f64>>,
    item_features: Option<Array2<f64>>,
    rating_matrix: Option<Array2<f64>>,
    user_ids: Option<Vec<i64>>,
    movie_ids: Option<Vec<i64>>,
    movie_index: Option<HashMap<i64, usize>>,
}

impl Nmf {
    pub fn new(n_components: usize, max_iter: usize, random_seed: u64) -> Self {
        Nmf {
            n_components,
            max_iter,
            random_seed,
            tolerance: DEFAULT_TOLERANCE,
            user_features: None,
            item_features: None,
            rating_matrix: None,
            user_ids: None,
            movie_ids: None,
            movie_index: None,
        }
    }

    /// Factorize the rating matrix into non-negative user and item features
    /// with multiplicative updates (Lee & Seung).
    ///
    /// Deterministic for a fixed seed and input: factors are initialized from
    /// a seeded RNG and the update rules are closed-form.
    pub fn fit(
        &mut self,
        matrix: Array2<f64>,
        user_ids: Vec<i64>,
        movie_ids: Vec<i64>,
    ) -> Result<(), RecommenderError> {
        let (rows, cols) = matrix.dim();
        if rows == 0 || cols == 0 {
            return Err(RecommenderError::EmptyMatrix);
        }
        if self.n_components > rows.min(cols) {
            return Err(RecommenderError::RankTooLarge {
                rank: self.n_components,
                rows,
                cols,
            });
        }
        if user_ids.len() != rows || movie_ids.len() != cols {
            return Err(RecommenderError::ShapeMismatch(format!(
                "matrix is {}x{} but {} user ids and {} movie ids were given",
                rows,
                cols,
                user_ids.len(),
                movie_ids.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.random_seed);
        let mut user_features =
            Array2::<f64>::random_using((rows, self.n_components), Uniform::new(0.0, 1.0), &mut rng);
        let mut item_features =
            Array2::<f64>::random_using((self.n_components, cols), Uniform::new(0.0, 1.0), &mut rng);

        let norm_v = frobenius(&matrix);
        let mut previous_error = norm_v;

        for iteration in 0..self.max_iter {
            // H <- H * (W^T V) / (W^T W H)
            let numerator = user_features.t().dot(&matrix);
            let denominator = user_features.t().dot(&user_features).dot(&item_features) + EPSILON;
            item_features = &item_features * &(&numerator / &denominator);

            // W <- W * (V H^T) / (W H H^T)
            let numerator = matrix.dot(&item_features.t());
            let denominator = user_features
                .dot(&item_features)
                .dot(&item_features.t())
                + EPSILON;
            user_features = &user_features * &(&numerator / &denominator);

            if (iteration + 1) % CONVERGENCE_CHECK_INTERVAL == 0 {
                let residual = &matrix - &user_features.dot(&item_features);
                let error = frobenius(&residual);
                if (previous_error - error) / norm_v.max(EPSILON) < self.tolerance {
                    log::debug!(
                        "NMF converged after {} iterations (error {:.6})",
                        iteration + 1,
                        error
                    );
                    break;
                }
                previous_error = error;
            }
        }

        self.movie_index = Some(movie_ids.iter().enumerate().map(|(i, &m)| (m, i)).collect());
        self.user_features = Some(user_features);
        self.item_features = Some(item_features);
        self.rating_matrix = Some(matrix);
        self.user_ids = Some(user_ids);
        self.movie_ids = Some(movie_ids);

        Ok(())
    }

    /// Rebuild a trained model from persisted factors, validating shapes.
    pub fn from_parts(
        n_components: usize,
        max_iter: usize,
        random_seed: u64,
        rating_matrix: Array2<f64>,
        user_ids: Vec<i64>,
        movie_ids: Vec<i64>,
        user_features: Array2<f64>,
        item_features: Array2<f64>,
    ) -> Result<Self, RecommenderError> {
        if user_features.dim() != (user_ids.len(), n_components) {
            return Err(RecommenderError::ShapeMismatch(format!(
                "user features are {:?}, expected ({}, {})",
                user_features.dim(),
                user_ids.len(),
                n_components
            )));
        }
        if item_features.dim() != (n_components, movie_ids.len()) {
            return Err(RecommenderError::ShapeMismatch(format!(
                "item features are {:?}, expected ({}, {})",
                item_features.dim(),
                n_components,
                movie_ids.len()
            )));
        }
        if rating_matrix.dim() != (user_ids.len(), movie_ids.len()) {
            return Err(RecommenderError::ShapeMismatch(format!(
                "rating matrix is {:?}, expected ({}, {})",
                rating_matrix.dim(),
                user_ids.len(),
                movie_ids.len()
            )));
        }

        let movie_index = movie_ids.iter().enumerate().map(|(i, &m)| (m, i)).collect();
        Ok(Nmf {
            n_components,
            max_iter,
            random_seed,
            tolerance: DEFAULT_TOLERANCE,
            user_features: Some(user_features),
            item_features: Some(item_features),
            rating_matrix: Some(rating_matrix),
            user_ids: Some(user_ids),
            movie_ids: Some(movie_ids),
            movie_index: Some(movie_index),
        })
    }

    /// Up to `n` movie ids most similar to `movie_id`, most similar first.
    ///
    /// An id absent from the index yields an empty list; calling before the
    /// model is trained or loaded is an error.
    pub fn recommend(&self, movie_id: i64, n: usize) -> Result<Vec<i64>, RecommenderError> {
        let (item_features, movie_ids, movie_index) =
            match (&self.item_features, &self.movie_ids, &self.movie_index) {
                (Some(features), Some(ids), Some(index)) => (features, ids, index),
                _ => return Err(RecommenderError::NotTrained),
            };

        let target = match movie_index.get(&movie_id) {
            Some(&column) => column,
            None => {
                log::warn!("Movie id not in the trained index: {}", movie_id);
                return Ok(Vec::new());
            }
        };

        let target_vector = item_features.column(target);
        let similarities: Vec<f64> = (0..movie_ids.len())
            .map(|column| cosine_similarity(target_vector, item_features.column(column)))
            .collect();

        let mut order: Vec<usize> = (0..movie_ids.len()).collect();
        // Stable descending sort: equal scores keep ascending column order.
        order.sort_by(|&a, &b| {
            similarities[b]
                .partial_cmp(&similarities[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // The first entry is the target itself (self-similarity is maximal).
        Ok(order
            .into_iter()
            .skip(1)
            .take(n)
            .map(|column| movie_ids[column])
            .collect())
    }

    pub fn is_trained(&self) -> bool {
        self.item_features.is_some()
    }

    /// Frobenius norm of the residual between the rating matrix and the
    /// factor product. None before training.
    pub fn reconstruction_error(&self) -> Option<f64> {
        match (&self.rating_matrix, &self.user_features, &self.item_features) {
            (Some(matrix), Some(user_features), Some(item_features)) => {
                let residual = matrix - &user_features.dot(item_features);
                Some(frobenius(&residual))
            }
            _ => None,
        }
    }

    pub fn user_features(&self) -> Option<&Array2<f64>> {
        self.user_features.as_ref()
    }

    pub fn item_features(&self) -> Option<&Array2<f64>> {
        self.item_features.as_ref()
    }

    pub fn rating_matrix(&self) -> Option<&Array2<f64>> {
        self.rating_matrix.as_ref()
    }

    pub fn user_ids(&self) -> Option<&[i64]> {
        self.user_ids.as_deref()
    }

    pub fn movie_ids(&self) -> Option<&[i64]> {
        self.movie_ids.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn rating(user_id: i64, movie_id: i64, rating: f64) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating,
        }
    }

    // Two disjoint taste groups: users 1..=10 rate movies 1..=5, users
    // 11..=20 rate movies 6..=10. Strong block structure the factorization
    // has to recover.
    fn block_ratings() -> Vec<Rating> {
        let mut ratings = Vec::new();
        for user_id in 1..=10 {
            for movie_id in 1..=5 {
                ratings.push(rating(user_id, movie_id, 5.0));
            }
        }
        for user_id in 11..=20 {
            for movie_id in 6..=10 {
                ratings.push(rating(user_id, movie_id, 4.0));
            }
        }
        ratings
    }

    fn trained_model() -> Nmf {
        let (matrix, user_ids, movie_ids) = build_rating_matrix(&block_ratings());
        let mut model = Nmf::new(3, 200, DEFAULT_RANDOM_SEED);
        model.fit(matrix, user_ids, movie_ids).unwrap();
        model
    }

    #[test]
    fn matrix_builder_sorts_ids_and_zero_fills() {
        let ratings = vec![
            rating(7, 3, 4.0),
            rating(2, 9, 1.5),
            rating(7, 9, 2.0),
        ];
        let (matrix, user_ids, movie_ids) = build_rating_matrix(&ratings);

        assert_eq!(user_ids, vec![2, 7]);
        assert_eq!(movie_ids, vec![3, 9]);
        assert_eq!(matrix.dim(), (2, 2));
        assert_eq!(matrix[(1, 0)], 4.0);
        assert_eq!(matrix[(0, 1)], 1.5);
        assert_eq!(matrix[(1, 1)], 2.0);
        // User 2 never rated movie 3.
        assert_eq!(matrix[(0, 0)], 0.0);
    }

    #[test]
    fn matrix_builder_later_duplicate_wins() {
        let ratings = vec![rating(1, 1, 2.0), rating(1, 1, 4.5)];
        let (matrix, _, _) = build_rating_matrix(&ratings);
        assert_eq!(matrix[(0, 0)], 4.5);
    }

    #[test]
    fn fit_rejects_empty_matrix() {
        let mut model = Nmf::new(2, 10, 0);
        let result = model.fit(Array2::zeros((0, 0)), vec![], vec![]);
        assert!(matches!(result, Err(RecommenderError::EmptyMatrix)));
    }

    #[test]
    fn fit_rejects_rank_larger_than_dimensions() {
        let mut model = Nmf::new(5, 10, 0);
        let result = model.fit(Array2::zeros((3, 4)), vec![1, 2, 3], vec![1, 2, 3, 4]);
        assert!(matches!(
            result,
            Err(RecommenderError::RankTooLarge { rank: 5, .. })
        ));
    }

    #[test]
    fn fit_produces_non_negative_factors() {
        let model = trained_model();
        assert!(model.user_features().unwrap().iter().all(|&x| x >= 0.0));
        assert!(model.item_features().unwrap().iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn fit_is_deterministic_for_a_fixed_seed() {
        let first = trained_model();
        let second = trained_model();
        assert_eq!(
            first.item_features().unwrap(),
            second.item_features().unwrap()
        );
        for movie_id in 1..=10 {
            assert_eq!(
                first.recommend(movie_id, 9).unwrap(),
                second.recommend(movie_id, 9).unwrap()
            );
        }
    }

    #[test]
    fn recommend_before_training_is_an_error() {
        let model = Nmf::new(2, 10, 0);
        assert!(matches!(
            model.recommend(1, 5),
            Err(RecommenderError::NotTrained)
        ));
    }

    #[test]
    fn recommend_unknown_movie_is_empty_not_an_error() {
        let model = trained_model();
        assert_eq!(model.recommend(999, 5).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn recommend_never_returns_target_or_duplicates() {
        let model = trained_model();
        for movie_id in 1..=10 {
            let recommendations = model.recommend(movie_id, 5).unwrap();
            assert!(recommendations.len() <= 5);
            assert!(!recommendations.contains(&movie_id));
            let mut deduped = recommendations.clone();
            deduped.sort_unstable();
            deduped.dedup();
            assert_eq!(deduped.len(), recommendations.len());
        }
    }

    #[test]
    fn recommend_ranks_same_block_movies_first() {
        let model = trained_model();
        let recommendations = model.recommend(1, 4).unwrap();
        assert_eq!(recommendations.len(), 4);
        for movie_id in recommendations {
            assert!((2..=5).contains(&movie_id));
        }
    }

    #[test]
    fn oversized_n_returns_all_other_movies() {
        let model = trained_model();
        let recommendations = model.recommend(1, 100).unwrap();
        assert_eq!(recommendations.len(), 9);
        assert!(!recommendations.contains(&1));
    }

    #[test]
    fn cosine_similarity_is_symmetric() {
        let a = array![0.3, 1.2, 0.0, 2.5];
        let b = array![1.1, 0.4, 0.9, 0.2];
        let forward = cosine_similarity(a.view(), b.view());
        let backward = cosine_similarity(b.view(), a.view());
        assert!((forward - backward).abs() < 1e-12);
    }

    #[test]
    fn cosine_similarity_of_a_vector_with_itself_is_one() {
        let a = array![0.5, 2.0, 1.0];
        assert!((cosine_similarity(a.view(), a.view()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_similarity_with_zero_norm_is_zero() {
        let zero = array![0.0, 0.0, 0.0];
        let other = array![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(zero.view(), other.view()), 0.0);
        assert_eq!(cosine_similarity(zero.view(), zero.view()), 0.0);
    }

    #[test]
    fn reconstruction_error_shrinks_the_residual() {
        let model = trained_model();
        let error = model.reconstruction_error().unwrap();
        let baseline = frobenius(model.rating_matrix().unwrap());
        assert!(error.is_finite());
        assert!(error < baseline);
    }
}
