use crate::models::db::{DatabaseTrait, Movie, Rating};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub const SAMPLE_USERS: i64 = 50;
pub const SAMPLE_SEED: u64 = 42;

// The 20-movie catalog: (id, title, genre, description, year, director).
const MOVIES: [(i64, &str, &str, &str, i64, &str); 20] = [
    (1, "The Matrix", "Sci-Fi", "A computer hacker learns about the true nature of reality.", 1999, "The Wachowskis"),
    (2, "Inception", "Sci-Fi", "A thief who steals corporate secrets through dream-sharing technology.", 2010, "Christopher Nolan"),
    (3, "The Godfather", "Crime", "The aging patriarch of an organized crime dynasty transfers control to his reluctant son.", 1972, "Francis Ford Coppola"),
    (4, "Pulp Fiction", "Crime", "The lives of two mob hitmen, a boxer, and others intertwine in four tales of violence.", 1994, "Quentin Tarantino"),
    (5, "The Dark Knight", "Action", "Batman faces the Joker, a criminal mastermind who wants to plunge Gotham into anarchy.", 2008, "Christopher Nolan"),
    (6, "Forrest Gump", "Drama", "The presidencies of Kennedy and Johnson through the eyes of an Alabama man.", 1994, "Robert Zemeckis"),
    (7, "Interstellar", "Sci-Fi", "A team of explorers travel through a wormhole in space to save humanity.", 2014, "Christopher Nolan"),
    (8, "The Shawshank Redemption", "Drama", "Two imprisoned men bond over years, finding solace and redemption.", 1994, "Frank Darabont"),
    (9, "Goodfellas", "Crime", "The story of Henry Hill and his life in the mob.", 1990, "Martin Scorsese"),
    (10, "Fight Club", "Drama", "An insomniac office worker forms an underground fight club.", 1999, "David Fincher"),
    (11, "Avatar", "Sci-Fi", "A paraplegic Marine dispatched to the moon Pandora on a unique mission.", 2009, "James Cameron"),
    (12, "Titanic", "Romance", "A seventeen-year-old aristocrat falls in love with a poor artist aboard the Titanic.", 1997, "James Cameron"),
    (13, "The Lord of the Rings", "Fantasy", "A meek Hobbit and companions set out on a journey to destroy the One Ring.", 2001, "Peter Jackson"),
    (14, "Star Wars", "Sci-Fi", "Luke Skywalker joins forces with a Jedi Knight to rescue a princess.", 1977, "George Lucas"),
    (15, "Jurassic Park", "Adventure", "A pragmatic paleontologist visiting an almost complete theme park is tasked with protecting visitors.", 1993, "Steven Spielberg"),
    (16, "The Avengers", "Action", "Earth's mightiest heroes must come together to stop an alien invasion.", 2012, "Joss Whedon"),
    (17, "Casablanca", "Romance", "A cynical American expatriate struggles to decide whether to help his former lover.", 1942, "Michael Curtiz"),
    (18, "The Silence of the Lambs", "Thriller", "A young FBI cadet must receive help from Hannibal Lecter to catch another serial killer.", 1991, "Jonathan Demme"),
    (19, "Saving Private Ryan", "War", "Following D-Day, a group of soldiers go behind enemy lines to retrieve a paratrooper.", 1998, "Steven Spielberg"),
    (20, "Schindler's List", "Drama", "In German-occupied Poland, Oskar Schindler gradually becomes concerned for his Jewish workforce.", 1993, "Steven Spielberg"),
];

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (creating if missing) the SQLite database at `database_url` and
    /// make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // A single connection: in-memory databases are per-connection, and
        // the workload is a handful of reads.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = SqliteDatabase { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS movies (
                movie_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                genre TEXT NOT NULL,
                description TEXT,
                year INTEGER,
                director TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                movie_id INTEGER NOT NULL,
                rating REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Seed the catalog and synthetic ratings on first run.
    ///
    /// Each of the 50 sample users rates 10 to 15 distinct movies with scores
    /// uniform in [1.0, 5.0] rounded to one decimal. The RNG is seeded so a
    /// fresh database is reproducible. Returns false when data already exists.
    pub async fn seed_if_empty(&self, seed: u64) -> Result<bool, sqlx::Error> {
        let movie_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;
        if movie_count > 0 {
            return Ok(false);
        }

        for (movie_id, title, genre, description, year, director) in MOVIES {
            sqlx::query(
                "INSERT INTO movies (movie_id, title, genre, description, year, director)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(movie_id)
            .bind(title)
            .bind(genre)
            .bind(description)
            .bind(year)
            .bind(director)
            .execute(&self.pool)
            .await?;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        for user_id in 1..=SAMPLE_USERS {
            let num_ratings = rng.gen_range(10..=15);
            let mut movie_pool: Vec<i64> = (1..=MOVIES.len() as i64).collect();
            movie_pool.shuffle(&mut rng);

            for &movie_id in movie_pool.iter().take(num_ratings) {
                let score = (rng.gen_range(1.0..=5.0_f64) * 10.0).round() / 10.0;
                sqlx::query("INSERT INTO ratings (user_id, movie_id, rating) VALUES (?, ?, ?)")
                    .bind(user_id)
                    .bind(movie_id)
                    .bind(score)
                    .execute(&self.pool)
                    .await?;
            }
        }

        log::info!(
            "Seeded {} movies and synthetic ratings for {} users",
            MOVIES.len(),
            SAMPLE_USERS
        );
        Ok(true)
    }
}

#[async_trait]
impl DatabaseTrait for SqliteDatabase {
    async fn get_movies(&self) -> Result<Vec<Movie>, Box<dyn std::error::Error + Send + Sync>> {
        let movies = sqlx::query_as::<_, Movie>(
            "SELECT movie_id, title, genre, description, year, director
             FROM movies ORDER BY movie_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(movies)
    }

    async fn get_movie_by_id(
        &self,
        movie_id: i64,
    ) -> Result<Option<Movie>, Box<dyn std::error::Error + Send + Sync>> {
        let movie = sqlx::query_as::<_, Movie>(
            "SELECT movie_id, title, genre, description, year, director
             FROM movies WHERE movie_id = ?",
        )
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(movie)
    }

    async fn load_ratings(&self) -> Result<Vec<Rating>, Box<dyn std::error::Error + Send + Sync>> {
        let ratings = sqlx::query_as::<_, Rating>(
            "SELECT user_id, movie_id, rating FROM ratings ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ratings)
    }

    async fn close(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SqliteDatabase {
        SqliteDatabase::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn seeding_populates_catalog_and_ratings() {
        let db = memory_db().await;
        assert!(db.seed_if_empty(SAMPLE_SEED).await.unwrap());

        let movies = db.get_movies().await.unwrap();
        assert_eq!(movies.len(), 20);
        assert_eq!(movies[0].title, "The Matrix");

        let ratings = db.load_ratings().await.unwrap();
        // 50 users, 10-15 ratings each.
        assert!(ratings.len() >= 500 && ratings.len() <= 750);
        assert!(ratings
            .iter()
            .all(|r| (1.0..=5.0).contains(&r.rating) && (1..=20).contains(&r.movie_id)));
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = memory_db().await;
        assert!(db.seed_if_empty(SAMPLE_SEED).await.unwrap());
        assert!(!db.seed_if_empty(SAMPLE_SEED).await.unwrap());
        assert_eq!(db.get_movies().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn movie_lookup_by_id() {
        let db = memory_db().await;
        db.seed_if_empty(SAMPLE_SEED).await.unwrap();

        let movie = db.get_movie_by_id(7).await.unwrap().unwrap();
        assert_eq!(movie.title, "Interstellar");
        assert_eq!(movie.genre, "Sci-Fi");
        assert!(db.get_movie_by_id(99).await.unwrap().is_none());
    }
}
