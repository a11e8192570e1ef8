use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Movie {
    pub movie_id: i64,
    pub title: String,
    pub genre: String,
    pub description: Option<String>,
    pub year: Option<i64>,
    pub director: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rating {
    pub user_id: i64,
    pub movie_id: i64,
    pub rating: f64,
}

#[async_trait]
pub trait DatabaseTrait {
    async fn get_movies(&self) -> Result<Vec<Movie>, Box<dyn std::error::Error + Send + Sync>>;
    async fn get_movie_by_id(
        &self,
        movie_id: i64,
    ) -> Result<Option<Movie>, Box<dyn std::error::Error + Send + Sync>>;
    // Ratings in insertion order; the matrix pivot relies on it for
    // last-write-wins duplicate handling.
    async fn load_ratings(&self) -> Result<Vec<Rating>, Box<dyn std::error::Error + Send + Sync>>;
    async fn close(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn DatabaseTrait + Send + Sync>,
}

#[derive(Debug)]
pub enum DatabaseError {
    QueryError(String),
    CloseError(String),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::QueryError(msg) => write!(f, "Query Error: {}", msg),
            DatabaseError::CloseError(msg) => write!(f, "Close Error: {}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl Database {
    pub fn new(backend: Arc<dyn DatabaseTrait + Send + Sync>) -> Self {
        Database { backend }
    }

    pub async fn get_movies(&self) -> Result<Vec<Movie>, DatabaseError> {
        self.backend
            .get_movies()
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Error getting movies: {}", e)))
    }

    pub async fn get_movie_by_id(&self, movie_id: i64) -> Result<Option<Movie>, DatabaseError> {
        self.backend
            .get_movie_by_id(movie_id)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Error getting movie: {}", e)))
    }

    pub async fn load_ratings(&self) -> Result<Vec<Rating>, DatabaseError> {
        self.backend
            .load_ratings()
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Error loading ratings: {}", e)))
    }

    pub async fn close(&self) -> Result<(), DatabaseError> {
        self.backend
            .close()
            .await
            .map_err(|e| DatabaseError::CloseError(format!("Error closing connection: {}", e)))
    }
}
