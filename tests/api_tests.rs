use movie_recommender::handlers::recommendations::{global_handler, handle_rejection};
use movie_recommender::models::db::Database;
use movie_recommender::services::modelserver::ModelServer;
use movie_recommender::services::nmf::{build_rating_matrix, Nmf};
use movie_recommender::services::sqlite::{SqliteDatabase, SAMPLE_SEED};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use warp::Filter;

async fn seeded_database() -> Database {
    let backend = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
    backend.seed_if_empty(SAMPLE_SEED).await.unwrap();
    Database::new(Arc::new(backend))
}

// Seeded store plus a model trained on it, the way the trainer binary does.
async fn trained_server() -> (Arc<ModelServer>, usize) {
    let database = seeded_database().await;
    let ratings = database.load_ratings().await.unwrap();
    let (matrix, user_ids, movie_ids) = build_rating_matrix(&ratings);

    let mut model = Nmf::new(10, 200, 42);
    model.fit(matrix, user_ids, movie_ids).unwrap();
    let num_movies = model.movie_ids().unwrap().len();

    (Arc::new(ModelServer::new(database, Some(model))), num_movies)
}

#[tokio::test]
async fn movies_endpoint_lists_the_catalog() {
    let (server, _) = trained_server().await;
    let routes = global_handler(server).recover(handle_rejection);

    let response = warp::test::request().path("/movies").reply(&routes).await;
    assert_eq!(response.status(), 200);

    let movies: Vec<Value> = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(movies.len(), 20);
    assert_eq!(movies[0]["movie_id"], 1);
    assert_eq!(movies[0]["title"], "The Matrix");
}

#[tokio::test]
async fn recommendations_for_the_matrix() {
    let (server, _) = trained_server().await;
    let routes = global_handler(server).recover(handle_rejection);

    let response = warp::test::request()
        .path("/recommendations/1")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["movie_id"], 1);
    assert_eq!(body["movie_title"], "The Matrix");

    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 5);

    let ids: HashSet<i64> = recommendations
        .iter()
        .map(|movie| movie["movie_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 5);
    assert!(!ids.contains(&1));
    assert!(ids.iter().all(|id| (2..=20).contains(id)));
}

#[tokio::test]
async fn recommendations_respect_an_explicit_limit() {
    let (server, _) = trained_server().await;
    let routes = global_handler(server).recover(handle_rejection);

    let response = warp::test::request()
        .path("/recommendations/1/3")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn oversized_limit_returns_all_other_movies() {
    let (server, num_movies) = trained_server().await;
    let routes = global_handler(server).recover(handle_rejection);

    let response = warp::test::request()
        .path("/recommendations/1/100")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = serde_json::from_slice(response.body()).unwrap();
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), num_movies - 1);
    assert!(recommendations
        .iter()
        .all(|movie| movie["movie_id"].as_i64().unwrap() != 1));
}

#[tokio::test]
async fn unknown_movie_is_a_404() {
    let (server, _) = trained_server().await;
    let routes = global_handler(server).recover(handle_rejection);

    let response = warp::test::request()
        .path("/recommendations/999")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 404);

    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn untrained_server_disables_recommendations_but_serves_the_catalog() {
    let database = seeded_database().await;
    let server = Arc::new(ModelServer::new(database, None));
    let routes = global_handler(server).recover(handle_rejection);

    let response = warp::test::request()
        .path("/recommendations/1")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 503);

    let response = warp::test::request().path("/movies").reply(&routes).await;
    assert_eq!(response.status(), 200);

    let response = warp::test::request().path("/metadata").reply(&routes).await;
    assert_eq!(response.status(), 200);
    let metadata: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(metadata["trained"], false);
}

#[tokio::test]
async fn metadata_reports_the_trained_model() {
    let (server, num_movies) = trained_server().await;
    let routes = global_handler(server).recover(handle_rejection);

    let response = warp::test::request().path("/metadata").reply(&routes).await;
    assert_eq!(response.status(), 200);

    let metadata: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(metadata["trained"], true);
    assert_eq!(metadata["n_components"], 10);
    assert_eq!(metadata["num_movies"], num_movies as i64);
}
