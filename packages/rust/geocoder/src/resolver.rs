//! Multi-pattern retrying geocode resolver.
//!
//! The resolver tries an ordered list of free-text query patterns against a
//! Nominatim-style `/search` endpoint, retrying transient failures within a
//! fixed per-pattern budget and pacing every request to stay friendly to the
//! remote service. The first pattern with a match wins.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, warn};
use url::Url;

use stationgeo_shared::{CoordinateResult, GeocoderConfig, Result, StationGeoError};

/// Geocode resolver holding a reusable HTTP client.
pub struct Resolver {
    config: GeocoderConfig,
    client: Client,
    search_url: Url,
}

/// Outcome of a single geocode attempt against one expanded query.
///
/// Transient failures are retried within the pattern's budget; permanent
/// failures and empty results advance to the next pattern immediately.
enum Attempt {
    Found(CoordinateResult),
    NoMatch,
    Transient(String),
    Permanent(String),
}

/// One entry of a Nominatim search response. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl Place {
    fn coords(&self) -> std::result::Result<(f64, f64), std::num::ParseFloatError> {
        Ok((self.lat.parse()?, self.lon.parse()?))
    }
}

impl Resolver {
    /// Create a new resolver with the given configuration.
    pub fn new(config: GeocoderConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint).map_err(|e| {
            StationGeoError::Geocode(format!("invalid endpoint '{}': {e}", config.endpoint))
        })?;
        let search_url = base
            .join("search")
            .map_err(|e| StationGeoError::Geocode(format!("invalid endpoint: {e}")))?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| StationGeoError::Geocode(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            search_url,
        })
    }

    /// Resolve a station to coordinates, or `None` if every pattern fails.
    ///
    /// Patterns are tried strictly in configured order; the returned
    /// [`CoordinateResult::source`] is the expanded text of the pattern that
    /// matched. Per-pattern and per-attempt errors are contained here and
    /// never abort the station.
    pub async fn resolve(&self, code: &str, name: &str) -> Option<CoordinateResult> {
        for pattern in &self.config.query_patterns {
            let query = expand_pattern(pattern, code, name);
            let mut attempts = 0u32;

            loop {
                attempts += 1;
                match self.attempt(&query).await {
                    Attempt::Found(hit) => {
                        debug!(code, query, lat = hit.lat, lon = hit.lon, "geocode match");
                        return Some(hit);
                    }
                    Attempt::NoMatch => {
                        debug!(code, query, "no match for pattern");
                        self.pause(self.config.request_pause_ms).await;
                        break;
                    }
                    Attempt::Permanent(reason) => {
                        error!(code, query, %reason, "geocoding failed, abandoning pattern");
                        self.pause(self.config.request_pause_ms).await;
                        break;
                    }
                    Attempt::Transient(reason) => {
                        self.pause(self.config.request_pause_ms).await;
                        if attempts >= self.config.retry_count {
                            warn!(code, query, %reason, attempts, "retries exhausted for pattern");
                            break;
                        }
                        debug!(code, query, %reason, attempt = attempts, "transient failure, retrying");
                        self.pause(self.config.retry_backoff_ms).await;
                    }
                }
            }
        }

        None
    }

    /// Issue one search request and classify the outcome.
    async fn attempt(&self, query: &str) -> Attempt {
        let response = match self
            .client
            .get(self.search_url.clone())
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() => return Attempt::Transient(e.to_string()),
            Err(e) => return Attempt::Permanent(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Attempt::Transient(format!("HTTP {status}"));
        }
        if !status.is_success() {
            return Attempt::Permanent(format!("HTTP {status}"));
        }

        let places: Vec<Place> = match response.json().await {
            Ok(p) => p,
            Err(e) => return Attempt::Permanent(format!("malformed response body: {e}")),
        };

        let Some(place) = places.into_iter().next() else {
            return Attempt::NoMatch;
        };

        match place.coords() {
            Ok((lat, lon)) => Attempt::Found(CoordinateResult {
                lat,
                lon,
                source: query.to_string(),
            }),
            Err(e) => Attempt::Permanent(format!("unparseable coordinates: {e}")),
        }
    }

    async fn pause(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// Expand a query pattern template with the station's code and name.
pub fn expand_pattern(pattern: &str, code: &str, name: &str) -> String {
    pattern.replace("{name}", name).replace("{code}", code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Test config pointing at a mock server, with pacing disabled.
    fn test_config(endpoint: &str) -> GeocoderConfig {
        GeocoderConfig {
            endpoint: endpoint.to_string(),
            user_agent: "stationgeo-tests".into(),
            request_timeout_ms: 5_000,
            retry_count: 3,
            retry_backoff_ms: 0,
            request_pause_ms: 0,
            query_patterns: vec![
                "{name} Railway Station, India".into(),
                "{code} Railway Station, India".into(),
                "{name} Junction, India".into(),
                "{name}, India".into(),
            ],
        }
    }

    fn hit_body(lat: &str, lon: &str) -> serde_json::Value {
        json!([{"lat": lat, "lon": lon, "display_name": "somewhere in India"}])
    }

    #[test]
    fn pattern_expansion() {
        assert_eq!(
            expand_pattern("{name} Railway Station, India", "NDLS", "New Delhi"),
            "New Delhi Railway Station, India"
        );
        assert_eq!(
            expand_pattern("{code} Railway Station, India", "NDLS", "New Delhi"),
            "NDLS Railway Station, India"
        );
    }

    #[tokio::test]
    async fn first_pattern_short_circuits() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "New Delhi Railway Station, India"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hit_body("28.6438", "77.2193")))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = Resolver::new(test_config(&server.uri())).unwrap();
        let result = resolver.resolve("NDLS", "New Delhi").await.expect("match");

        assert_eq!(result.lat, 28.6438);
        assert_eq!(result.lon, 77.2193);
        assert_eq!(result.source, "New Delhi Railway Station, India");
    }

    #[tokio::test]
    async fn patterns_tried_in_order_until_match() {
        let server = MockServer::start().await;

        // Patterns 1 and 2 return no match, pattern 3 hits
        for query in [
            "Ghaziabad Railway Station, India",
            "GZB Railway Station, India",
        ] {
            Mock::given(method("GET"))
                .and(path("/search"))
                .and(query_param("q", query))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .expect(1)
                .mount(&server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Ghaziabad Junction, India"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hit_body("28.6436", "77.4400")))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = Resolver::new(test_config(&server.uri())).unwrap();
        let result = resolver.resolve("GZB", "Ghaziabad").await.expect("match");

        assert_eq!(result.source, "Ghaziabad Junction, India");
    }

    #[tokio::test]
    async fn transient_failures_exhaust_retry_budget() {
        let server = MockServer::start().await;

        // Every request times out at the service: 3 attempts x 4 patterns
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .expect(12)
            .mount(&server)
            .await;

        let resolver = Resolver::new(test_config(&server.uri())).unwrap();
        let result = resolver.resolve("XX", "Nowhere").await;

        assert!(result.is_none());
        // Mock expectations (exactly 12 calls) verified on server drop
    }

    #[tokio::test]
    async fn permanent_failure_abandons_pattern_immediately() {
        let server = MockServer::start().await;

        // Pattern 1 is rejected outright; no retries, straight to pattern 2
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Kanpur Railway Station, India"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "CNB Railway Station, India"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hit_body("26.4545", "80.3521")))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = Resolver::new(test_config(&server.uri())).unwrap();
        let result = resolver.resolve("CNB", "Kanpur").await.expect("match");

        assert_eq!(result.source, "CNB Railway Station, India");
    }

    #[tokio::test]
    async fn empty_results_advance_without_retry() {
        let server = MockServer::start().await;

        // An empty result is not a failure: one call per pattern, no retries
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(4)
            .mount(&server)
            .await;

        let resolver = Resolver::new(test_config(&server.uri())).unwrap();
        assert!(resolver.resolve("XX", "Nowhere").await.is_none());
    }

    #[tokio::test]
    async fn unparseable_coordinates_are_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Bhopal Railway Station, India"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"lat": "not-a-number", "lon": "x"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "BPL Railway Station, India"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hit_body("23.2687", "77.4120")))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = Resolver::new(test_config(&server.uri())).unwrap();
        let result = resolver.resolve("BPL", "Bhopal").await.expect("match");
        assert_eq!(result.source, "BPL Railway Station, India");
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let config = test_config("not a url");
        assert!(Resolver::new(config).is_err());
    }
}
