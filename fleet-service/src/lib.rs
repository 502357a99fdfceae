pub mod api;
pub mod coordinator;
pub mod directory;
pub mod models;
pub mod schema;
pub mod store;
