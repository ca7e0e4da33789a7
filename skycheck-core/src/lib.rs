//! Core library for `skycheck`.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The weatherapi.com client behind a swappable HTTP transport
//! - Shared domain models and the error taxonomy
//! - The search controller that turns lookups into observable UI state
//!
//! It is used by `skycheck-cli`, but any front-end can drive a
//! [`WeatherSearchController`] and render what it publishes.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod search;
pub mod transport;

pub use client::{WeatherClient, client_from_config, weatherapi::WeatherApiClient};
pub use config::Config;
pub use error::{WeatherError, WeatherErrorKind};
pub use model::{WeatherQuery, WeatherRecord};
pub use search::{RacePolicy, SearchFailure, SearchState, WeatherSearchController};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
