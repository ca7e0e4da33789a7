use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{
    Config, WeatherError, WeatherQuery, WeatherRecord, client::weatherapi::WeatherApiClient,
    transport::ReqwestTransport,
};

pub mod weatherapi;

/// Looks up current weather for a city.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WeatherClient: Send + Sync {
    async fn fetch_weather(&self, query: &WeatherQuery) -> Result<WeatherRecord, WeatherError>;
}

/// Construct the weatherapi.com client described by `config`, talking over HTTP.
pub fn client_from_config(config: &Config) -> anyhow::Result<WeatherApiClient> {
    let api_key = config.api_key()?;
    let transport =
        ReqwestTransport::new(config.timeout()).context("Failed to build HTTP client")?;

    Ok(WeatherApiClient::new(api_key.to_owned(), Arc::new(transport))
        .with_base_url(config.base_url.clone()))
}
