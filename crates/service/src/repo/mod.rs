//! `EntityStore` adapters: JSON files for single-node setups, Postgres via sea-orm.

pub mod file;
pub mod seaorm;

pub use file::FileEntityStore;
pub use seaorm::SeaOrmEntityStore;
