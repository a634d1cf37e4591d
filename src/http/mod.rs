//! HTTP front end that maps admission decisions to HTTP responses.

mod server;
mod service;

pub use server::{shutdown_signal, HttpServer};
pub use service::{client_key, router, UNKNOWN_CLIENT};
