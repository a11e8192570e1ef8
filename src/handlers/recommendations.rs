use crate::models::db::Movie;
use crate::services::modelserver::ModelServer;
use crate::services::nmf::RecommenderError;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub const DEFAULT_RECOMMENDATIONS: usize = 5;

#[derive(Debug)]
struct ModelUnavailable;

impl warp::reject::Reject for ModelUnavailable {}

#[derive(Debug)]
struct InternalError;

impl warp::reject::Reject for InternalError {}

#[derive(Serialize)]
struct RecommendationResponse {
    movie_id: i64,
    movie_title: String,
    recommendations: Vec<Movie>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn with_server(
    server: Arc<ModelServer>,
) -> impl Filter<Extract = (Arc<ModelServer>,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

pub fn global_handler(
    server: Arc<ModelServer>,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    movies_handler(server.clone())
        .or(recommendation_handler(server.clone()))
        .or(metadata_handler(server))
}

fn movies_handler(
    server: Arc<ModelServer>,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("movies")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .and_then(list_movies)
}

fn recommendation_handler(
    server: Arc<ModelServer>,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let base_route = warp::path("recommendations");

    let route_with_limit = base_route
        .and(warp::path::param::<i64>())
        .and(warp::path::param::<usize>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server.clone()))
        .and_then(get_recommendations_with_limit);

    let route_without_limit = base_route
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .and_then(get_recommendations);

    route_with_limit.or(route_without_limit)
}

fn metadata_handler(
    server: Arc<ModelServer>,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("metadata")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .and_then(get_metadata)
}

async fn list_movies(server: Arc<ModelServer>) -> Result<impl warp::Reply, warp::Rejection> {
    match server.get_movies().await {
        Ok(movies) => Ok(warp::reply::json(&movies)),
        Err(e) => {
            log::error!("Error listing movies: {}", e);
            Err(warp::reject::custom(InternalError))
        }
    }
}

async fn get_metadata(server: Arc<ModelServer>) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&server.metadata()))
}

async fn get_recommendations(
    movie_id: i64,
    server: Arc<ModelServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    recommend_for_movie(movie_id, DEFAULT_RECOMMENDATIONS, server).await
}

async fn get_recommendations_with_limit(
    movie_id: i64,
    limit: usize,
    server: Arc<ModelServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    recommend_for_movie(movie_id, limit, server).await
}

async fn recommend_for_movie(
    movie_id: i64,
    limit: usize,
    server: Arc<ModelServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    log::info!(
        "Received request for recommendations for movie_id: {} with limit: {}",
        movie_id,
        limit
    );

    let movie = server
        .get_movie_by_id(movie_id)
        .await
        .map_err(|e| {
            log::error!("Error looking up movie {}: {}", movie_id, e);
            warp::reject::custom(InternalError)
        })?
        .ok_or_else(warp::reject::not_found)?;

    let recommended_ids = match server.predict(movie_id, limit) {
        Ok(ids) => ids,
        Err(RecommenderError::NotTrained) => return Err(warp::reject::custom(ModelUnavailable)),
        Err(e) => {
            log::error!("Error generating recommendations: {}", e);
            return Err(warp::reject::custom(InternalError));
        }
    };

    let mut recommendations = Vec::with_capacity(recommended_ids.len());
    for recommended_id in recommended_ids {
        let recommended = server.get_movie_by_id(recommended_id).await.map_err(|e| {
            log::error!("Error looking up movie {}: {}", recommended_id, e);
            warp::reject::custom(InternalError)
        })?;
        if let Some(recommended) = recommended {
            recommendations.push(recommended);
        }
    }

    Ok(warp::reply::json(&RecommendationResponse {
        movie_id,
        movie_title: movie.title,
        recommendations,
    }))
}

/// Translate rejections into JSON error bodies.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Movie not found")
    } else if err.find::<ModelUnavailable>().is_some() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Recommendation model not available",
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err.find::<InternalError>().is_some() {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    } else {
        (StatusCode::BAD_REQUEST, "Bad request")
    };

    let body = warp::reply::json(&ErrorBody {
        error: message.to_string(),
    });
    Ok(warp::reply::with_status(body, status))
}
