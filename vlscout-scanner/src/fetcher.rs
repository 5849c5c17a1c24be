use crate::credentials::{Credential, CredentialPool, cooldown_from_headers};
use crate::error::{Result, ScanError};
use crate::ledger::DedupLedger;
use crate::result::{FetchOutcome, FetchedDocument};
use reqwest::header::{AUTHORIZATION, RANGE, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Android 14; Mobile; rv:121.0) Gecko/121.0 Firefox/121.0",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub timeout_secs: u64,
    /// Upper byte bound sent as a `Range` header on document fetches.
    pub range_bytes: Option<u64>,
    pub user_agents: Vec<String>,
    /// Hosts that receive a credential from the pool.
    pub authenticated_hosts: Vec<String>,
    /// Cooldown used when a throttling response carries no reset hint.
    pub default_cooldown_secs: u64,
    pub max_cooldown_secs: u64,
    pub max_rate_limit_retries: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            range_bytes: Some(20480),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            authenticated_hosts: vec!["api.github.com".to_string()],
            default_cooldown_secs: 60,
            max_cooldown_secs: 900,
            max_rate_limit_retries: 3,
        }
    }
}

/// HTTP GET with round-robin user agents, credential rotation and dedup gating.
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
    credentials: Arc<CredentialPool>,
    ledger: Arc<DedupLedger>,
    next_agent: AtomicUsize,
}

impl Fetcher {
    pub fn new(
        config: FetcherConfig,
        credentials: Arc<CredentialPool>,
        ledger: Arc<DedupLedger>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            config,
            credentials,
            ledger,
            next_agent: AtomicUsize::new(0),
        })
    }

    pub fn ledger(&self) -> &Arc<DedupLedger> {
        &self.ledger
    }

    pub fn credentials(&self) -> &Arc<CredentialPool> {
        &self.credentials
    }

    /// Fetch a candidate document.
    ///
    /// The URL is claimed in the ledger before any network call, so of several
    /// workers racing on the same URL only one goes to the network.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        if !self.ledger.claim_url(url) {
            debug!("Already visited {}", url);
            return FetchOutcome::Duplicate;
        }

        let document = match self.download(url).await {
            FetchOutcome::Content(document) => document,
            other => return other,
        };
        if !self.ledger.record_content(&document.body) {
            debug!("Content of {} already seen", url);
            return FetchOutcome::Duplicate;
        }
        FetchOutcome::Content(document)
    }

    /// Fetch a known URL without consulting or updating the ledger.
    pub async fn recheck(&self, url: &str) -> FetchOutcome {
        self.download(url).await
    }

    async fn download(&self, url: &str) -> FetchOutcome {
        let response = match self.send(url, true).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Fetch failed for {}: {}", url, e);
                return FetchOutcome::Error(e.to_string());
            }
        };

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            debug!("Dead link ({}): {}", status.as_u16(), url);
            return FetchOutcome::Dead(status.as_u16());
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Reading body of {} failed: {}", url, e);
                return FetchOutcome::Error(e.to_string());
            }
        };

        FetchOutcome::Content(FetchedDocument {
            url: url.to_string(),
            status_code: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// GET a JSON API resource. Not gated by the ledger.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(url, false).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status(status.as_u16()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn send(&self, url: &str, ranged: bool) -> Result<Response> {
        let authenticated = self.is_authenticated(url);
        let default_cooldown = Duration::from_secs(self.config.default_cooldown_secs);
        let max_cooldown = Duration::from_secs(self.config.max_cooldown_secs);
        let mut attempt = 0;

        loop {
            let credential = if authenticated {
                self.credentials.acquire()
            } else {
                None
            };

            let response = self.request(url, ranged, credential.as_ref()).send().await?;
            if !is_throttled(&response, authenticated) {
                return Ok(response);
            }

            let cooldown = cooldown_from_headers(response.headers(), default_cooldown, max_cooldown);
            if let Some(ref credential) = credential {
                self.credentials.mark_throttled(credential, cooldown);
            }

            attempt += 1;
            if attempt > self.config.max_rate_limit_retries {
                return Err(ScanError::RateLimited { retry_in: cooldown });
            }

            let wait = match credential {
                Some(_) => self.credentials.next_reset().unwrap_or(cooldown),
                None => cooldown,
            };
            if wait.is_zero() {
                debug!("Rate limited on {}, rotating credential", url);
            } else {
                warn!("Rate limited on {}, waiting {:?}", url, wait);
                tokio::time::sleep(wait).await;
            }
        }
    }

    fn request(&self, url: &str, ranged: bool, credential: Option<&Credential>) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);

        let agents = &self.config.user_agents;
        if !agents.is_empty() {
            let agent = &agents[self.next_agent.fetch_add(1, Ordering::Relaxed) % agents.len()];
            request = request.header(USER_AGENT, agent.as_str());
        }
        if ranged && let Some(limit) = self.config.range_bytes {
            request = request.header(RANGE, format!("bytes=0-{}", limit));
        }
        if let Some(credential) = credential {
            request = request.header(AUTHORIZATION, format!("token {}", credential.token));
        }

        request
    }

    fn is_authenticated(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_string())) else {
            return false;
        };
        self.config
            .authenticated_hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    }
}

fn is_throttled(response: &Response, authenticated: bool) -> bool {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => {
            let headers = response.headers();
            let exhausted = headers
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.trim() == "0");
            authenticated || exhausted || headers.contains_key("retry-after")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, header_exists, method, path},
    };

    fn fetcher_with(config: FetcherConfig, tokens: &[&str]) -> Fetcher {
        Fetcher::new(
            config,
            Arc::new(CredentialPool::new(tokens.iter().copied())),
            Arc::new(DedupLedger::new()),
        )
        .unwrap()
    }

    fn fetcher() -> Fetcher {
        fetcher_with(FetcherConfig::default(), &[])
    }

    #[tokio::test]
    async fn test_fetch_returns_content_with_range_and_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nodes.txt"))
            .and(header("range", "bytes=0-20480"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(206).set_body_string("vless://x@h:1"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = fetcher()
            .fetch(&format!("{}/nodes.txt", mock_server.uri()))
            .await;

        match outcome {
            FetchOutcome::Content(doc) => {
                assert_eq!(doc.status_code, 206);
                assert_eq!(doc.body, "vless://x@h:1");
            }
            other => panic!("expected content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_url_concurrently_fetched_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("body")
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/sub.txt", mock_server.uri());
        let other = format!("{}/sub.txt?cache=1", mock_server.uri());
        let (a, b) = tokio::join!(fetcher.fetch(&url), fetcher.fetch(&other));

        let contents = [&a, &b].iter().filter(|o| o.is_content()).count();
        let duplicates = [&a, &b]
            .iter()
            .filter(|o| matches!(o, FetchOutcome::Duplicate))
            .count();
        assert_eq!(contents, 1);
        assert_eq!(duplicates, 1);
    }

    #[tokio::test]
    async fn test_identical_bodies_second_is_duplicate() {
        let mock_server = MockServer::start().await;
        for p in ["/a.txt", "/b.txt"] {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_string("same mirrored body"))
                .mount(&mock_server)
                .await;
        }

        let fetcher = fetcher();
        let first = fetcher.fetch(&format!("{}/a.txt", mock_server.uri())).await;
        let second = fetcher.fetch(&format!("{}/b.txt", mock_server.uri())).await;

        assert!(first.is_content());
        assert!(matches!(second, FetchOutcome::Duplicate));
    }

    #[tokio::test]
    async fn test_recheck_bypasses_ledger() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("same mirrored body"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/a.txt", mock_server.uri());
        assert!(fetcher.fetch(&url).await.is_content());
        assert!(fetcher.recheck(&url).await.is_content());
        assert!(fetcher.recheck(&format!("{}/b.txt", mock_server.uri())).await.is_content());
        assert_eq!(fetcher.ledger().counts().visited, 1);
    }

    #[tokio::test]
    async fn test_missing_document_is_dead() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let outcome = fetcher()
            .fetch(&format!("{}/gone.txt", mock_server.uri()))
            .await;
        assert!(matches!(outcome, FetchOutcome::Dead(404)));
    }

    #[tokio::test]
    async fn test_throttled_credential_rotates_to_next() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "token first"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "token second"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = FetcherConfig {
            authenticated_hosts: vec!["127.0.0.1".to_string()],
            ..FetcherConfig::default()
        };
        let fetcher = fetcher_with(config, &["first", "second"]);

        let value: serde_json::Value = fetcher
            .get_json(&format!("{}/search", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(fetcher.credentials().available(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_exhausted_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&mock_server)
            .await;

        let config = FetcherConfig {
            default_cooldown_secs: 0,
            max_rate_limit_retries: 2,
            ..FetcherConfig::default()
        };
        let outcome = fetcher_with(config, &[])
            .fetch(&format!("{}/busy.txt", mock_server.uri()))
            .await;

        assert!(matches!(outcome, FetchOutcome::Error(_)));
    }

    #[tokio::test]
    async fn test_plain_forbidden_is_dead_not_throttled() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = fetcher()
            .fetch(&format!("{}/private.txt", mock_server.uri()))
            .await;
        assert!(matches!(outcome, FetchOutcome::Dead(403)));
    }
}
