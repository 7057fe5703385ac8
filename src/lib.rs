//! Alert fanout engine for sighting reports: geographic eligibility, per-user
//! rate limits, device resolution, payload building and push dispatch.
pub mod clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod repo;
pub mod routes;
pub mod services;
pub mod utils;
