pub mod error;
pub mod handler;
pub mod routes;
pub mod state;
