// Tests for the oracle client and its concurrency gate

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vlscout_core::error::Result;
use vlscout_core::{HuggingFaceOracle, Oracle, OracleGate, OracleVerdict};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn hf_oracle(server: &MockServer) -> HuggingFaceOracle {
    HuggingFaceOracle::with_endpoint("hf_test_token", format!("{}/models/judge", server.uri())).unwrap()
}

// ============================================================================
// HuggingFace client
// ============================================================================

#[tokio::test]
async fn test_huggingface_request_and_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/judge"))
        .and(header("authorization", "Bearer hf_test_token"))
        .and(body_partial_json(serde_json::json!({
            "parameters": {"max_new_tokens": 20, "return_full_text": false}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"generated_text": " RU"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let verdict = hf_oracle(&server).await.judge("vless://...").await.unwrap();
    assert_eq!(verdict, OracleVerdict::Ru);
}

#[tokio::test]
async fn test_huggingface_error_status_is_err() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(hf_oracle(&server).await.judge("x").await.is_err());
}

#[tokio::test]
async fn test_gate_turns_failures_into_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let gate = OracleGate::new(Arc::new(hf_oracle(&server).await), 2, 800);
    assert_eq!(gate.judge("x").await, OracleVerdict::Unknown);
}

// ============================================================================
// Gate behaviour
// ============================================================================

/// Records the highest number of overlapping calls and the snippets it saw.
struct SlowOracle {
    active: AtomicUsize,
    peak: AtomicUsize,
    longest: AtomicUsize,
}

#[async_trait]
impl Oracle for SlowOracle {
    fn name(&self) -> &str {
        "slow"
    }

    async fn judge(&self, snippet: &str) -> Result<OracleVerdict> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.longest
            .fetch_max(snippet.chars().count(), Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(OracleVerdict::Global)
    }
}

#[tokio::test]
async fn test_gate_bounds_concurrency_and_snippet() {
    let oracle = Arc::new(SlowOracle {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        longest: AtomicUsize::new(0),
    });
    let gate = OracleGate::new(oracle.clone(), 2, 100);
    let text = "y".repeat(1000);

    let answers = join_all((0..8).map(|_| gate.judge(&text))).await;

    assert!(answers.iter().all(|a| *a == OracleVerdict::Global));
    assert!(oracle.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(oracle.longest.load(Ordering::SeqCst), 100);
}
