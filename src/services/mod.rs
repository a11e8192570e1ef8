pub mod modelserver;
pub mod nmf;
pub mod sqlite;
pub mod training;
