// End-to-end tests for the scout pipeline against a mock server

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use tempfile::TempDir;
use vlscout_core::scout::ScoutReport;
use vlscout_core::{
    OracleGate, ResultSink, ScoutConfig, ScoutOptions, Seed, Tag, build_fetcher, execute_prune,
    execute_scout,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RU_DOC: &str = "\
vless://3f8a1c2e-9b4d-4a7f-8e21-c5d6b7a8f901@203.0.113.10:443?type=tcp&security=reality&sni=gosuslugi.ru&pbk=Qm7xK2pLr9Zs&fp=chrome#node-a
vless://a1b2c3d4-e5f6-4789-8abc-def012345678@203.0.113.12:8443?type=grpc&security=reality&sni=ok.ru&pbk=Xy5zR6mNp2Lc&fp=chrome#node-c
";

const GLOBAL_DOC: &str = "\
vless://7d2e4b1a-6c9f-4e83-a5b2-1f0e9d8c7b6a@203.0.113.11:443?type=tcp&security=reality&sni=ya.ru&pbk=Hn4wJ8kTq3Vd&fp=chrome#node-b
";

const OTHER_GLOBAL_DOC: &str = "\
vless://5e6f7a8b-1c2d-4e3f-9a0b-c1d2e3f4a5b6@198.51.100.20:443?type=tcp&security=reality&sni=ya.ru&pbk=Wr3tY7uKm1Pz&fp=chrome#node-d
";

fn config(workers: usize) -> ScoutConfig {
    let mut config = ScoutConfig::default();
    config.workers = workers;
    config.oracle_concurrency = 1;
    config
}

async fn mount(server: &MockServer, route: &str, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn run(seeds: Vec<Seed>, config: ScoutConfig) -> ScoutReport {
    let fetcher = build_fetcher(&config, Vec::<String>::new()).unwrap();
    execute_scout(
        ScoutOptions {
            seeds,
            config,
            show_progress_bars: false,
        },
        fetcher,
        Arc::new(OracleGate::disabled()),
        None,
    )
    .await
    .unwrap()
}

fn accepted_urls(report: &ScoutReport, tag: Tag) -> Vec<String> {
    let mut urls = report.urls_by_tag().remove(&tag).unwrap_or_default();
    urls.sort();
    urls
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_empty_seed_set_is_a_noop() {
    let report = run(Vec::new(), config(2)).await;
    assert!(report.accepted.is_empty());
    assert_eq!(report.counts.processed(), 0);
}

#[tokio::test]
async fn test_leaf_documents_are_classified() {
    let server = MockServer::start().await;
    mount(&server, "/ru.txt", RU_DOC, 1).await;
    mount(&server, "/global.txt", GLOBAL_DOC, 1).await;

    let base = server.uri();
    let report = run(
        vec![
            Seed::new(format!("{}/ru.txt", base), "test"),
            Seed::new(format!("{}/global.txt", base), "test"),
            Seed::new(format!("{}/missing.txt", base), "test"),
        ],
        config(3),
    )
    .await;

    assert_eq!(accepted_urls(&report, Tag::Ru), vec![format!("{}/ru.txt", base)]);
    assert_eq!(accepted_urls(&report, Tag::Global), vec![format!("{}/global.txt", base)]);
    assert_eq!(report.counts.dead, 1);
    assert_eq!(report.counts.valid_nodes, 3);
}

#[tokio::test]
async fn test_encoded_document_is_decoded_before_classification() {
    let server = MockServer::start().await;
    mount(&server, "/sub", &STANDARD.encode(RU_DOC), 1).await;

    let url = format!("{}/sub", server.uri());
    let report = run(vec![Seed::new(url.as_str(), "test")], config(1)).await;

    assert_eq!(accepted_urls(&report, Tag::Ru), vec![url]);
    assert_eq!(report.counts.valid_nodes, 2);
}

#[tokio::test]
async fn test_aggregator_links_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();
    let listing = format!(
        "Collected lists\n{b}/a.txt\n{b}/b.txt\n{b}/c.txt\n{b}/b.txt?mirror=1\n",
        b = base
    );
    mount(&server, "/agg.txt", &listing, 1).await;
    mount(&server, "/a.txt", RU_DOC, 1).await;
    mount(&server, "/b.txt", GLOBAL_DOC, 1).await;
    // identical body under another name
    mount(&server, "/c.txt", GLOBAL_DOC, 1).await;

    let report = run(
        vec![
            Seed::new(format!("{}/a.txt", base), "test"),
            Seed::new(format!("{}/agg.txt", base), "test"),
        ],
        config(1),
    )
    .await;

    assert_eq!(report.counts.aggregators, 1);
    assert_eq!(accepted_urls(&report, Tag::Ru), vec![format!("{}/a.txt", base)]);
    assert_eq!(report.counts.global, 1);
    // c.txt by content, the mirror of b.txt by URL
    assert_eq!(report.counts.duplicates, 2);
    assert_eq!(report.ledger.digests, 3);
}

#[tokio::test]
async fn test_aggregator_at_depth_cap_is_not_expanded() {
    let server = MockServer::start().await;
    let base = server.uri();
    let top = format!("{b}/one.txt\n{b}/two.txt\n{b}/nested.txt\n", b = base);
    let nested = format!("{b}/deep1.txt\n{b}/deep2.txt\n{b}/deep3.txt\n", b = base);
    mount(&server, "/top.txt", &top, 1).await;
    mount(&server, "/nested.txt", &nested, 1).await;
    mount(&server, "/one.txt", GLOBAL_DOC, 1).await;
    mount(&server, "/two.txt", OTHER_GLOBAL_DOC, 1).await;
    for deep in ["/deep1.txt", "/deep2.txt", "/deep3.txt"] {
        mount(&server, deep, RU_DOC, 0).await;
    }

    let report = run(vec![Seed::new(format!("{}/top.txt", base), "test")], config(2)).await;

    assert_eq!(report.counts.aggregators, 1);
    assert_eq!(report.counts.trash, 1);
    assert_eq!(report.counts.global, 2);
    assert!(accepted_urls(&report, Tag::Ru).is_empty());
}

#[tokio::test]
async fn test_numbered_siblings_are_probed() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(&server, "/lists/list7.txt", GLOBAL_DOC, 1).await;
    mount(&server, "/lists/list8.txt", OTHER_GLOBAL_DOC, 1).await;

    let report = run(
        vec![Seed::new(format!("{}/lists/list7.txt", base), "test")],
        config(4),
    )
    .await;

    assert_eq!(
        accepted_urls(&report, Tag::Global),
        vec![
            format!("{}/lists/list7.txt", base),
            format!("{}/lists/list8.txt", base),
        ]
    );
    // list1..list50 except 7, and 8 answered
    assert_eq!(report.counts.dead, 48);
}

// ============================================================================
// Prune
// ============================================================================

#[tokio::test]
async fn test_prune_keeps_only_documents_still_on_tag() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(&server, "/good.txt", GLOBAL_DOC, 1).await;
    mount(&server, "/moved.txt", RU_DOC, 1).await;

    let dir = TempDir::new().unwrap();
    let sink = ResultSink::new(dir.path());
    let good = format!("{}/good.txt", base);
    let moved = format!("{}/moved.txt", base);
    let gone = format!("{}/gone.txt", base);
    sink.merge(Tag::Global, [&good, &moved, &gone]).unwrap();

    let config = config(2);
    let fetcher = build_fetcher(&config, Vec::<String>::new()).unwrap();
    let report = execute_prune(
        Tag::Global,
        &sink,
        config,
        fetcher,
        Arc::new(OracleGate::disabled()),
        false,
    )
    .await
    .unwrap();

    assert_eq!(report.checked, 3);
    assert_eq!(report.kept, 1);
    assert_eq!(sink.load(Tag::Global).unwrap().into_iter().collect::<Vec<_>>(), vec![good]);
    assert!(dir.path().join("verified_global.txt.bak").exists());
}

#[tokio::test]
async fn test_prune_keeps_every_live_mirror() {
    let server = MockServer::start().await;
    let base = server.uri();
    let annotated = format!("# nodes\n{}", GLOBAL_DOC);
    mount(&server, "/mirror_a.txt", GLOBAL_DOC, 2).await;
    mount(&server, "/mirror_b.txt", &annotated, 1).await;
    mount(&server, "/mirror_c.txt", GLOBAL_DOC, 1).await;

    let dir = TempDir::new().unwrap();
    let sink = ResultSink::new(dir.path());
    let mut listed = vec![
        format!("{}/mirror_a.txt", base),
        format!("{}/mirror_a.txt?raw=1", base),
        format!("{}/mirror_b.txt", base),
        format!("{}/mirror_c.txt", base),
    ];
    sink.merge(Tag::Global, &listed).unwrap();

    let config = config(3);
    let fetcher = build_fetcher(&config, Vec::<String>::new()).unwrap();
    let report = execute_prune(
        Tag::Global,
        &sink,
        config,
        fetcher,
        Arc::new(OracleGate::disabled()),
        false,
    )
    .await
    .unwrap();

    assert_eq!(report.checked, 4);
    assert_eq!(report.kept, 4);
    assert!(report.removed.is_empty());
    listed.sort();
    assert_eq!(sink.load(Tag::Global).unwrap().into_iter().collect::<Vec<_>>(), listed);
}
