//! Origin REST client
//!
//! Bearer-token auth against the provider. A stale token costs exactly one
//! forced refresh and one retry; a second rejection surfaces as `Unavailable`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EventDetails, OriginClient, OriginResult};
use crate::cache::CacheHint;
use crate::error::OriginError;
use crate::models::EventSummary;

pub const DEFAULT_ORIGIN_BASE: &str = "https://api.sports.example/v5";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Option::default")]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct FeaturedData {
    #[serde(default)]
    matches: Vec<Value>,
}

#[derive(Clone)]
pub struct HttpOriginClient {
    client: Client,
    base_url: String,
    project_key: String,
    api_key: String,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpOriginClient {
    pub fn new(base_url: impl Into<String>, project_key: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent("livefeed/1.0")
            .build()
            .context("Failed to build origin HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_key,
            api_key,
            token: Arc::new(RwLock::new(None)),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/match/{key}/{suffix..}` with the key kept as one encoded segment.
    fn event_url(&self, key: &str, suffix: &[&str]) -> OriginResult<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| OriginError::unavailable(format!("origin base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| OriginError::unavailable("origin base url cannot carry a path"))?
            .pop_if_empty()
            .push("match")
            .push(key)
            .extend(suffix);
        Ok(url.into())
    }

    /// Cached token, or a fresh one when `force` is set or none is cached.
    async fn token(&self, force: bool) -> OriginResult<String> {
        if !force {
            let cached = self.token.read().clone();
            if let Some(t) = cached {
                return Ok(t);
            }
        }

        let resp = self
            .client
            .post(self.url("/auth"))
            .json(&json!({
                "project_key": self.project_key,
                "api_key": self.api_key,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(OriginError::unavailable(format!("POST /auth {}", status)));
        }

        let body: Envelope<AuthData> = resp
            .json()
            .await
            .map_err(|e| OriginError::unavailable(format!("auth response: {e}")))?;
        let token = body
            .data
            .map(|d| d.token)
            .ok_or_else(|| OriginError::unavailable("auth response without token"))?;

        *self.token.write() = Some(token.clone());
        info!("🔑 Origin token refreshed");
        Ok(token)
    }

    async fn send_authed<F>(&self, build: F) -> OriginResult<Response>
    where
        F: Fn(&Client, &str) -> RequestBuilder + Send + Sync,
    {
        let token = self.token(false).await?;
        match execute(build(&self.client, &token)).await {
            Err(OriginError::AuthExpired) => {
                warn!("origin token expired, forcing one refresh");
                let token = self.token(true).await?;
                match execute(build(&self.client, &token)).await {
                    Err(OriginError::AuthExpired) => Err(OriginError::unavailable(
                        "origin rejected a freshly refreshed token",
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }
}

async fn execute(req: RequestBuilder) -> OriginResult<Response> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

fn classify_failure(status: StatusCode, body: &str) -> OriginError {
    let code = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/error/code")
            .or_else(|| v.get("code"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_ascii_lowercase())
    });

    match (status.as_u16(), code.as_deref()) {
        (_, Some("token_expired")) | (401, _) | (403, _) => OriginError::AuthExpired,
        (_, Some("already_subscribed")) | (409, _) => OriginError::AlreadySubscribed,
        (404, _) => OriginError::NotFound,
        _ => OriginError::unavailable(format!(
            "{}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )),
    }
}

/// Decodes each listed match on its own; malformed entries are skipped.
fn parse_candidates(entries: Vec<Value>) -> Vec<EventSummary> {
    let total = entries.len();
    let parsed: Vec<EventSummary> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| match serde_json::from_value::<EventSummary>(entry) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(index = i, error = %e, "skipping malformed featured match");
                None
            }
        })
        .collect();
    if parsed.len() < total {
        debug!(kept = parsed.len(), total, "featured matches partially decoded");
    }
    parsed
}

fn bearer(req: RequestBuilder, token: &str) -> RequestBuilder {
    req.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    async fn list_candidate_events(&self) -> OriginResult<Vec<EventSummary>> {
        let url = self.url("/featured-matches");
        let resp = self
            .send_authed(|c, t| bearer(c.get(url.as_str()), t))
            .await?;
        let body: Envelope<FeaturedData> = resp
            .json()
            .await
            .map_err(|e| OriginError::unavailable(format!("featured matches json: {e}")))?;
        Ok(parse_candidates(body.data.unwrap_or_default().matches))
    }

    async fn get_event_details(&self, key: &str) -> OriginResult<EventDetails> {
        let url = self.event_url(key, &[])?;
        let resp = self
            .send_authed(|c, t| bearer(c.get(url.as_str()), t))
            .await?;

        let header_hint = resp
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(CacheHint::from_cache_control);

        let mut body: Value = resp
            .json()
            .await
            .map_err(|e| OriginError::unavailable(format!("match json: {e}")))?;

        let body_hint = body
            .get("cache")
            .cloned()
            .and_then(|c| serde_json::from_value::<CacheHint>(c).ok());
        let hint = match body_hint {
            Some(h) => Some(h.merge(header_hint)),
            None => header_hint,
        };

        let enveloped = body.get("data").is_some_and(|d| !d.is_null());
        let payload = if enveloped {
            body.get_mut("data").map(Value::take).unwrap_or_default()
        } else {
            body
        };
        debug!(event_key = %key, "origin match details fetched");

        Ok(EventDetails { payload, hint })
    }

    async fn subscribe(&self, key: &str) -> OriginResult<()> {
        let url = self.event_url(key, &["live-updates", "subscribe"])?;
        self.send_authed(|c, t| bearer(c.post(url.as_str()), t).json(&json!({"method": "web_hook"})))
            .await?;
        Ok(())
    }

    async fn unsubscribe(&self, key: &str) -> OriginResult<()> {
        let url = self.event_url(key, &["live-updates", "unsubscribe"])?;
        self.send_authed(|c, t| bearer(c.post(url.as_str()), t).json(&json!({"method": "web_hook"})))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct FakeOrigin {
        auth_calls: Arc<AtomicUsize>,
        /// Tokens issued before this count are rejected as expired.
        accept_from: usize,
    }

    async fn auth(State(s): State<FakeOrigin>) -> Json<Value> {
        let n = s.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Json(json!({"data": {"token": format!("t{}", n)}}))
    }

    fn token_ok(s: &FakeOrigin, headers: &HeaderMap) -> bool {
        let Some(n) = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer t"))
            .and_then(|n| n.parse::<usize>().ok())
        else {
            return false;
        };
        n >= s.accept_from
    }

    async fn match_details(
        State(s): State<FakeOrigin>,
        Path(key): Path<String>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        if !token_ok(&s, &headers) {
            return (AxumStatus::UNAUTHORIZED, Json(json!({"error": {"code": "token_expired"}})))
                .into_response();
        }
        if key == "missing" {
            return (AxumStatus::NOT_FOUND, "no such match").into_response();
        }
        (
            [("cache-control", "max-age=12")],
            Json(json!({
                "data": {"key": key, "status": "started"},
                "cache": {"expires": 1_700_000_100}
            })),
        )
            .into_response()
    }

    async fn featured(State(s): State<FakeOrigin>, headers: HeaderMap) -> axum::response::Response {
        if !token_ok(&s, &headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        Json(json!({"data": {"matches": [
            {"key": "z", "status": "started"},
            {"key": "a", "status": "not_started"},
            {"status": {"code": 3}},
            {"key": "m", "status": "started"}
        ]}}))
        .into_response()
    }

    async fn subscribe(Path(key): Path<String>) -> axum::response::Response {
        if key == "dup" {
            return (AxumStatus::CONFLICT, Json(json!({"error": {"code": "already_subscribed"}})))
                .into_response();
        }
        Json(json!({"data": {"ok": true}})).into_response()
    }

    async fn serve(state: FakeOrigin) -> String {
        let app = Router::new()
            .route("/auth", post(auth))
            .route("/featured-matches", get(featured))
            .route("/match/:key", get(match_details))
            .route("/match/:key/live-updates/subscribe", post(subscribe))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str) -> HttpOriginClient {
        HttpOriginClient::new(base, "proj".into(), "key".into()).unwrap()
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_and_retries() {
        let state = FakeOrigin {
            accept_from: 2,
            ..Default::default()
        };
        let base = serve(state.clone()).await;
        let details = client(&base).get_event_details("m1").await.unwrap();
        assert_eq!(details.payload["key"], json!("m1"));
        assert_eq!(state.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_expiry_surfaces_as_unavailable() {
        let state = FakeOrigin {
            accept_from: usize::MAX,
            ..Default::default()
        };
        let base = serve(state.clone()).await;
        let err = client(&base).get_event_details("m1").await.unwrap_err();
        assert!(matches!(err, OriginError::Unavailable(_)));
        assert_eq!(state.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_token_is_reused_between_calls() {
        let state = FakeOrigin::default();
        let base = serve(state.clone()).await;
        let c = client(&base);
        c.get_event_details("m1").await.unwrap();
        c.get_event_details("m2").await.unwrap();
        assert_eq!(state.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_and_hints() {
        let base = serve(FakeOrigin::default()).await;
        let c = client(&base);
        assert_eq!(
            c.get_event_details("missing").await.unwrap_err(),
            OriginError::NotFound
        );
        let details = c.get_event_details("m1").await.unwrap();
        let hint = details.hint.unwrap();
        assert_eq!(hint.max_age, Some(12));
        assert_eq!(hint.expires, Some(1_700_000_100));
    }

    #[tokio::test]
    async fn test_featured_order_is_preserved() {
        let base = serve(FakeOrigin::default()).await;
        let list = client(&base).list_candidate_events().await.unwrap();
        let keys: Vec<_> = list.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn test_already_subscribed_is_reported() {
        let base = serve(FakeOrigin::default()).await;
        let c = client(&base);
        assert!(c.subscribe("m1").await.is_ok());
        assert_eq!(
            c.subscribe("dup").await.unwrap_err(),
            OriginError::AlreadySubscribed
        );
    }

    #[tokio::test]
    async fn test_reserved_characters_stay_in_one_segment() {
        let c = client("http://origin.test/v5/");
        assert_eq!(
            c.event_url("a/b?c#d", &[]).unwrap(),
            "http://origin.test/v5/match/a%2Fb%3Fc%23d"
        );
        assert_eq!(
            c.event_url("ipl 2024", &["live-updates", "subscribe"]).unwrap(),
            "http://origin.test/v5/match/ipl%202024/live-updates/subscribe"
        );

        let base = serve(FakeOrigin::default()).await;
        let details = client(&base).get_event_details("a/b?c").await.unwrap();
        assert_eq!(details.payload["key"], json!("a/b?c"));
    }

    #[test]
    fn test_malformed_candidates_are_skipped() {
        let entries = vec![
            json!({"key": "m1", "status": "started"}),
            json!({"status": "started"}),
            json!("not a match"),
            json!({"key": "m2", "status": 7}),
            json!({"key": 42}),
            json!({"key": "m3", "status": "not_started", "start_at": 1_700_000_000}),
        ];
        let list = parse_candidates(entries);
        let keys: Vec<_> = list.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["m1", "m2", "m3"]);
        assert_eq!(list[1].status, crate::models::EventStatus::Unknown);
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, r#"{"error":{"code":"TOKEN_EXPIRED"}}"#),
            OriginError::AuthExpired
        );
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, r#"{"code":"already_subscribed"}"#),
            OriginError::AlreadySubscribed
        );
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream"),
            OriginError::Unavailable(_)
        ));
    }
}
