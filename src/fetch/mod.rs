//! Rate-limited fetch layer for the MBTA V3 API.
//!
//! One logical fetch is a single paginated GET whose retries are bounded by a
//! [`RetryPolicy`]: HTTP 429 backs off linearly, everything else waits a flat
//! delay. Exhausting the attempts is not an error; the route just stays
//! missing from the dataset and a later repair run picks it up.

mod basic;
mod client;
mod url_param;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use url_param::UrlParam;

use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::{Method, Request, StatusCode, Url};
use serde_json::Value;
use tracing::warn;

/// Bounded retry schedule for one logical fetch.
///
/// On HTTP 429 the wait before attempt `n + 1` is `(n + 1) * unit_delay`
/// (linear, so the worst-case total stays small). Any other failure waits a
/// flat `unit_delay` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub unit_delay: Duration,
}

impl RetryPolicy {
    /// Schedule for the initial full-collection pass.
    pub const FIRST_PASS: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        unit_delay: Duration::from_secs(2),
    };

    /// Schedule for repair runs. More patient: repair is rare and must not
    /// silently give up on the one route it was asked to recover.
    pub const REPAIR: RetryPolicy = RetryPolicy {
        max_attempts: 5,
        unit_delay: Duration::from_secs(3),
    };

    fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        self.unit_delay * (attempt + 1)
    }
}

enum AttemptError {
    RateLimited,
    Other(anyhow::Error),
}

/// Fetches the `data` entities behind `url`, retrying per `policy`.
///
/// Returns an empty vec both for a genuinely empty resource and for
/// exhausted retries; callers treat the two identically ("could not collect
/// now") and leave recovery to a later repair run. Every failure is logged
/// here with its cause.
pub async fn fetch_entities<C: HttpClient>(client: &C, url: Url, policy: RetryPolicy) -> Vec<Value> {
    for attempt in 0..policy.max_attempts {
        let req = Request::new(Method::GET, url.clone());

        let wait = match attempt_fetch(client, req).await {
            Ok(entities) => return entities,
            Err(AttemptError::RateLimited) => {
                let wait = policy.rate_limit_backoff(attempt);
                warn!(
                    url = %url,
                    attempt = attempt + 1,
                    wait_secs = wait.as_secs(),
                    "Rate limited"
                );
                wait
            }
            Err(AttemptError::Other(err)) => {
                warn!(url = %url, attempt = attempt + 1, error = %err, "Fetch failed");
                policy.unit_delay
            }
        };

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(wait).await;
        }
    }

    warn!(
        url = %url,
        attempts = policy.max_attempts,
        "Giving up after exhausting retries, leaving data missing"
    );
    Vec::new()
}

async fn attempt_fetch<C: HttpClient>(
    client: &C,
    req: Request,
) -> Result<Vec<Value>, AttemptError> {
    let resp = client.execute(req).await.map_err(AttemptError::Other)?;

    if resp.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(AttemptError::RateLimited);
    }

    let resp = resp
        .error_for_status()
        .map_err(|e| AttemptError::Other(e.into()))?;

    let body: Value = resp
        .json()
        .await
        .map_err(|e| AttemptError::Other(anyhow!("response body is not JSON: {e}")))?;

    // The API wraps entities in a top-level `data` array; a response without
    // one counts as empty, not as an error.
    Ok(body
        .get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back canned responses in order; panics if the code under test
    /// issues more requests than were scripted.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Scripted>>,
    }

    enum Scripted {
        Status(u16, &'static str),
        TransportError(&'static str),
    }

    impl ScriptedClient {
        fn new(responses: Vec<Scripted>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }

        fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn execute(&self, _req: Request) -> Result<reqwest::Response> {
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("request beyond scripted responses");
            match next {
                Scripted::Status(code, body) => {
                    let resp = http::Response::builder()
                        .status(code)
                        .body(body.to_string())?;
                    Ok(reqwest::Response::from(resp))
                }
                Scripted::TransportError(msg) => Err(anyhow!(msg)),
            }
        }
    }

    fn test_url() -> Url {
        Url::parse("https://api.example.com/stops?filter[route]=1").unwrap()
    }

    const PAYLOAD: &str = r#"{"data": [{"id": "a"}, {"id": "b"}]}"#;

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_use_linear_backoff() {
        let client = ScriptedClient::new(vec![
            Scripted::Status(429, ""),
            Scripted::Status(429, ""),
            Scripted::Status(200, PAYLOAD),
        ]);

        let start = tokio::time::Instant::now();
        let entities = fetch_entities(&client, test_url(), RetryPolicy::FIRST_PASS).await;

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0]["id"], "a");
        // 1 * 2s after the first 429, 2 * 2s after the second.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(client.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_rate_limit_yields_empty() {
        let client = ScriptedClient::new(vec![
            Scripted::Status(429, ""),
            Scripted::Status(429, ""),
            Scripted::Status(429, ""),
        ]);

        let start = tokio::time::Instant::now();
        let entities = fetch_entities(&client, test_url(), RetryPolicy::FIRST_PASS).await;

        assert!(entities.is_empty());
        // No wait after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_retry_with_flat_delay() {
        let client = ScriptedClient::new(vec![
            Scripted::TransportError("connection reset"),
            Scripted::TransportError("connection reset"),
            Scripted::Status(200, PAYLOAD),
        ]);

        let start = tokio::time::Instant::now();
        let entities = fetch_entities(&client, test_url(), RetryPolicy::FIRST_PASS).await;

        assert_eq!(entities.len(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_retry_with_flat_delay() {
        let client = ScriptedClient::new(vec![
            Scripted::Status(500, "oops"),
            Scripted::Status(200, PAYLOAD),
        ]);

        let start = tokio::time::Instant::now();
        let entities = fetch_entities(&client, test_url(), RetryPolicy::FIRST_PASS).await;

        assert_eq!(entities.len(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_data_key_is_an_empty_success() {
        let client = ScriptedClient::new(vec![Scripted::Status(200, "{}")]);

        let start = tokio::time::Instant::now();
        let entities = fetch_entities(&client, test_url(), RetryPolicy::FIRST_PASS).await;

        // Success on the first attempt: no retries, no waiting.
        assert!(entities.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(client.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_is_retried() {
        let client = ScriptedClient::new(vec![
            Scripted::Status(200, "not json"),
            Scripted::Status(200, PAYLOAD),
        ]);

        let entities = fetch_entities(&client, test_url(), RetryPolicy::FIRST_PASS).await;
        assert_eq!(entities.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repair_policy_waits_longer() {
        let client = ScriptedClient::new(vec![
            Scripted::Status(429, ""),
            Scripted::Status(200, PAYLOAD),
        ]);

        let start = tokio::time::Instant::now();
        let entities = fetch_entities(&client, test_url(), RetryPolicy::REPAIR).await;

        assert_eq!(entities.len(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn url_param_appends_api_key() {
        struct CaptureUrl(Mutex<Option<Url>>);

        #[async_trait]
        impl HttpClient for CaptureUrl {
            async fn execute(&self, req: Request) -> Result<reqwest::Response> {
                *self.0.lock().unwrap() = Some(req.url().clone());
                let resp = http::Response::builder()
                    .status(200)
                    .body(r#"{"data": []}"#.to_string())?;
                Ok(reqwest::Response::from(resp))
            }
        }

        let client = UrlParam::mbta_api_key(CaptureUrl(Mutex::new(None)), "secret".to_string());

        fetch_entities(&client, test_url(), RetryPolicy::FIRST_PASS).await;

        let seen = client.inner.0.lock().unwrap().clone().unwrap();
        assert!(
            seen.query_pairs()
                .any(|(k, v)| k == "api_key" && v == "secret")
        );
        // The original query parameters survive.
        assert!(seen.query_pairs().any(|(k, v)| k == "filter[route]" && v == "1"));
    }
}
