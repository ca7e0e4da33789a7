use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    error::WeatherError,
    model::{WeatherQuery, WeatherRecord},
    transport::Transport,
};

use super::WeatherClient;

pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Client for the weatherapi.com `current.json` endpoint.
#[derive(Clone)]
pub struct WeatherApiClient {
    api_key: String,
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for WeatherApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WeatherApiClient {
    pub fn new(api_key: String, transport: Arc<dyn Transport>) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), transport }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `<base>/current.json?key=..&q=..&aqi=yes`, with key and city percent-encoded.
    fn current_url(&self, query: &WeatherQuery) -> Result<Url, WeatherError> {
        let raw = format!(
            "{}/current.json?key={}&q={}&aqi=yes",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(query.as_str()),
        );

        Ok(Url::parse(&raw)?)
    }
}

#[async_trait]
impl WeatherClient for WeatherApiClient {
    #[instrument(skip_all, fields(city = %query))]
    async fn fetch_weather(&self, query: &WeatherQuery) -> Result<WeatherRecord, WeatherError> {
        let url = self.current_url(query)?;
        debug!(url = %redacted(&url), "Fetching current weather");

        let res = self.transport.get(&url).await.map_err(WeatherError::Transport)?;

        if !res.is_success() {
            return Err(api_error(res.status, &res.body));
        }

        if res.body.iter().all(u8::is_ascii_whitespace) {
            return Err(WeatherError::EmptyResponse);
        }

        let parsed: WaResponse = serde_json::from_slice(&res.body)?;
        debug!(location = %parsed.location.name, "Decoded current weather");

        Ok(parsed.into())
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaAirQuality {
    #[serde(rename = "us-epa-index", default, deserialize_with = "lenient")]
    us_epa_index: Option<u8>,
}

// Only location name, temp_c and condition text are required; a malformed
// extra is dropped instead of failing the whole lookup.
#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    condition: WaCondition,
    #[serde(default, deserialize_with = "lenient")]
    feelslike_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    humidity: Option<u8>,
    #[serde(default, deserialize_with = "lenient")]
    wind_kph: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    last_updated_epoch: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    air_quality: Option<WaAirQuality>,
}

/// Deserialize `T`, mapping a missing, null or mistyped value to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

impl From<WaResponse> for WeatherRecord {
    fn from(res: WaResponse) -> Self {
        let current = res.current;

        WeatherRecord {
            city_name: res.location.name,
            temperature_c: current.temp_c,
            description: current.condition.text,
            feels_like_c: current.feelslike_c,
            humidity_pct: current.humidity,
            wind_kph: current.wind_kph,
            us_epa_index: current.air_quality.and_then(|aq| aq.us_epa_index),
            observed_at: current.last_updated_epoch.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

/// `{"error": {"code": 1006, "message": "No matching location found."}}`
#[derive(Debug, Deserialize)]
struct WaErrorEnvelope {
    error: WaErrorBody,
}

#[derive(Debug, Deserialize)]
struct WaErrorBody {
    code: Option<i64>,
    message: String,
}

fn api_error(status: u16, body: &[u8]) -> WeatherError {
    match serde_json::from_slice::<WaErrorEnvelope>(body) {
        Ok(envelope) => WeatherError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => WeatherError::Api {
            status,
            code: None,
            message: truncate_body(&String::from_utf8_lossy(body)),
        },
    }
}

/// The URL with the `key` parameter masked, for logging.
fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    let query = url.query().map(|q| {
        q.split('&')
            .map(|pair| if pair.starts_with("key=") { "key=REDACTED" } else { pair })
            .collect::<Vec<_>>()
            .join("&")
    });
    shown.set_query(query.as_deref());
    shown.to_string()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex};

    use super::*;
    use crate::{
        WeatherErrorKind,
        transport::{HttpResponse, MockTransport},
    };

    const MUMBAI: &str = r#"{"location":{"name":"Mumbai"},"current":{"temp_c":28.5,"condition":{"text":"Partly cloudy"}}}"#;

    fn ok(body: &str) -> HttpResponse {
        HttpResponse { status: 200, body: body.as_bytes().to_vec() }
    }

    fn client(transport: MockTransport) -> WeatherApiClient {
        WeatherApiClient::new("SECRET_KEY".into(), Arc::new(transport))
    }

    fn query(city: &str) -> WeatherQuery {
        WeatherQuery::new(city).expect("non-empty query")
    }

    /// In-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn decodes_minimal_response() {
        let mut transport = MockTransport::new();
        transport.expect_get().times(1).returning(|_| Ok(ok(MUMBAI)));

        let record = client(transport).fetch_weather(&query("Mumbai")).await.unwrap();

        assert_eq!(record, WeatherRecord::new("Mumbai", 28.5, "Partly cloudy"));
    }

    #[tokio::test]
    async fn decodes_extended_fields_and_ignores_unknown_ones() {
        let body = r#"{
            "location": {"name": "London", "country": "United Kingdom", "tz_id": "Europe/London"},
            "current": {
                "last_updated_epoch": 1700000000,
                "temp_c": 11.0,
                "feelslike_c": 9.4,
                "humidity": 82,
                "wind_kph": 19.1,
                "is_day": 1,
                "condition": {"text": "Light rain", "icon": "//cdn/116.png", "code": 1183},
                "air_quality": {"pm2_5": 4.2, "us-epa-index": 1}
            }
        }"#;
        let body = body.to_string();

        let mut transport = MockTransport::new();
        transport.expect_get().returning(move |_| Ok(ok(&body)));

        let record = client(transport).fetch_weather(&query("London")).await.unwrap();

        assert_eq!(record.city_name, "London");
        assert_eq!(record.description, "Light rain");
        assert_eq!(record.feels_like_c, Some(9.4));
        assert_eq!(record.humidity_pct, Some(82));
        assert_eq!(record.wind_kph, Some(19.1));
        assert_eq!(record.us_epa_index, Some(1));
        assert_eq!(record.observed_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn builds_current_url_with_key_city_and_aqi() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .times(1)
            .withf(|url| {
                url.as_str()
                    == "https://api.weatherapi.com/v1/current.json?key=SECRET_KEY&q=Mumbai&aqi=yes"
            })
            .returning(|_| Ok(ok(MUMBAI)));

        client(transport).fetch_weather(&query("Mumbai")).await.unwrap();
    }

    #[tokio::test]
    async fn percent_encodes_spaces_and_non_ascii() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .times(1)
            .withf(|url| url.query() == Some("key=SECRET_KEY&q=New%20York&aqi=yes"))
            .returning(|_| Ok(ok(MUMBAI)));
        transport
            .expect_get()
            .times(1)
            .withf(|url| url.query() == Some("key=SECRET_KEY&q=S%C3%A3o%20Paulo&aqi=yes"))
            .returning(|_| Ok(ok(MUMBAI)));

        let client = client(transport);
        client.fetch_weather(&query("New York")).await.unwrap();
        client.fetch_weather(&query("São Paulo")).await.unwrap();
    }

    #[tokio::test]
    async fn reserved_characters_cannot_inject_parameters() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .withf(|url| {
                let q: Vec<_> = url.query_pairs().filter(|(k, _)| k == "q").collect();
                q.len() == 1 && q[0].1 == "Paris&key=other"
            })
            .returning(|_| Ok(ok(MUMBAI)));

        client(transport).fetch_weather(&query("Paris&key=other")).await.unwrap();
    }

    #[tokio::test]
    async fn malformed_base_url_is_invalid_request() {
        let mut transport = MockTransport::new();
        transport.expect_get().times(0);

        let err = client(transport)
            .with_base_url("not a url")
            .fetch_weather(&query("Mumbai"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), WeatherErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn transport_failure_is_transport_error() {
        let mut transport = MockTransport::new();
        transport.expect_get().returning(|_| Err("connection refused".into()));

        let err = client(transport).fetch_weather(&query("Mumbai")).await.unwrap_err();

        assert!(matches!(err, WeatherError::Transport(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn malformed_json_is_decode_error() {
        let mut transport = MockTransport::new();
        transport.expect_get().returning(|_| Ok(ok("{\"location\": ")));

        let err = client(transport).fetch_weather(&query("Mumbai")).await.unwrap_err();

        assert!(matches!(err, WeatherError::Decode(_)));
    }

    #[tokio::test]
    async fn schema_mismatch_is_decode_error() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .returning(|_| Ok(ok(r#"{"location":{"name":"Mumbai"},"current":{"temp_c":"hot"}}"#)));

        let err = client(transport).fetch_weather(&query("Mumbai")).await.unwrap_err();

        assert_eq!(err.kind(), WeatherErrorKind::Decode);
    }

    #[tokio::test]
    async fn malformed_optional_fields_are_dropped() {
        let body = r#"{
            "location": {"name": "London"},
            "current": {
                "temp_c": 11.0,
                "condition": {"text": "Light rain"},
                "humidity": 82.5,
                "feelslike_c": "cold",
                "wind_kph": null,
                "last_updated_epoch": "yesterday",
                "air_quality": {"us-epa-index": -1}
            }
        }"#;
        let body = body.to_string();

        let mut transport = MockTransport::new();
        transport.expect_get().returning(move |_| Ok(ok(&body)));

        let record = client(transport).fetch_weather(&query("London")).await.unwrap();

        assert_eq!(record, WeatherRecord::new("London", 11.0, "Light rain"));
    }

    #[tokio::test]
    async fn malformed_air_quality_block_is_dropped() {
        let body = r#"{
            "location": {"name": "London"},
            "current": {
                "temp_c": 11.0,
                "condition": {"text": "Light rain"},
                "humidity": 82,
                "air_quality": "unavailable"
            }
        }"#;
        let body = body.to_string();

        let mut transport = MockTransport::new();
        transport.expect_get().returning(move |_| Ok(ok(&body)));

        let record = client(transport).fetch_weather(&query("London")).await.unwrap();

        assert_eq!(record.humidity_pct, Some(82));
        assert_eq!(record.us_epa_index, None);
    }

    #[tokio::test]
    async fn concurrent_lookups_get_their_own_records() {
        let mut transport = MockTransport::new();
        transport.expect_get().times(2).returning(|url| {
            let city = url
                .query_pairs()
                .find(|(k, _)| k == "q")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            let body = serde_json::json!({
                "location": {"name": city},
                "current": {"temp_c": 15.0, "condition": {"text": "Clear"}}
            });
            Ok(ok(&body.to_string()))
        });
        let client = client(transport);
        let (oslo, lima) = (query("Oslo"), query("Lima"));

        let (oslo, lima) = tokio::join!(client.fetch_weather(&oslo), client.fetch_weather(&lima));

        assert_eq!(oslo.unwrap().city_name, "Oslo");
        assert_eq!(lima.unwrap().city_name, "Lima");
    }

    #[tokio::test]
    async fn request_log_masks_api_key() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut transport = MockTransport::new();
        transport.expect_get().returning(|_| Ok(ok(MUMBAI)));
        client(transport).fetch_weather(&query("New York")).await.unwrap();

        let output = logs.contents();
        assert!(output.contains("Fetching current weather"));
        assert!(output.contains("key=REDACTED"));
        assert!(output.contains("q=New%20York"));
        assert!(!output.contains("SECRET_KEY"));
    }

    #[tokio::test]
    async fn empty_body_is_empty_response() {
        let mut transport = MockTransport::new();
        transport.expect_get().returning(|_| Ok(ok("")));

        let err = client(transport).fetch_weather(&query("Mumbai")).await.unwrap_err();

        assert!(matches!(err, WeatherError::EmptyResponse));
    }

    #[tokio::test]
    async fn error_envelope_becomes_api_error() {
        let mut transport = MockTransport::new();
        transport.expect_get().returning(|_| {
            Ok(HttpResponse {
                status: 400,
                body: br#"{"error":{"code":1006,"message":"No matching location found."}}"#.to_vec(),
            })
        });

        let err = client(transport).fetch_weather(&query("Atlantis")).await.unwrap_err();

        match err {
            WeatherError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, Some(1006));
                assert_eq!(message, "No matching location found.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_error_body_is_truncated() {
        let mut transport = MockTransport::new();
        transport.expect_get().returning(|_| {
            Ok(HttpResponse { status: 502, body: "x".repeat(500).into_bytes() })
        });

        let err = client(transport).fetch_weather(&query("Mumbai")).await.unwrap_err();

        match err {
            WeatherError::Api { status: 502, code: None, message } => {
                assert_eq!(message.len(), 203);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn redacted_url_hides_api_key() {
        let url = Url::parse(
            "https://api.weatherapi.com/v1/current.json?key=SECRET_KEY&q=New%20York&aqi=yes",
        )
        .unwrap();

        let shown = redacted(&url);

        assert!(!shown.contains("SECRET_KEY"));
        assert!(shown.contains("key=REDACTED"));
        assert!(shown.contains("q=New%20York"));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let client = client(MockTransport::new());
        assert!(!format!("{client:?}").contains("SECRET_KEY"));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(300);
        let out = truncate_body(&body);
        assert_eq!(out.chars().count(), 203);
    }
}
