#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{
    config::{CliArgs, ServerConfig},
    service::{error::ApiError, routes::build_router, state::AppState},
    telemetry::{TelemetryProviders, init_telemetry},
};
