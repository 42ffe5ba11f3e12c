//! `WeatherComSource` against a local upstream: status classification,
//! decoding and the response cache.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::NaiveDate;
use tempfile::TempDir;

use downloader::{
    Downloader, FetchError, FetchOutcome, ObservationSource, RetryPolicy, SchedulerConfig,
    SourceConfig, WeatherComSource,
};
use storage::{CacheStore, ObservationStore};
use test_utils::{same_rows, window_body};
use weather_common::{Station, Window};

#[derive(Clone, Copy)]
enum Reply {
    Data,
    Status(StatusCode),
    Malformed,
    NoContent,
}

struct Upstream {
    reply: Reply,
    hits: AtomicUsize,
}

async fn historical(
    State(upstream): State<Arc<Upstream>>,
    Path(_station): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    upstream.hits.fetch_add(1, Ordering::SeqCst);

    match upstream.reply {
        Reply::Data => {
            let parse = |key: &str| {
                params
                    .get(key)
                    .and_then(|v| NaiveDate::parse_from_str(v, "%Y%m%d").ok())
            };
            match (parse("startDate"), parse("endDate")) {
                (Some(start), Some(end)) => {
                    let window = Window { start, end };
                    (StatusCode::OK, window_body(&window)).into_response()
                }
                _ => StatusCode::BAD_REQUEST.into_response(),
            }
        }
        Reply::Status(status) => (status, "upstream says no").into_response(),
        Reply::Malformed => (StatusCode::OK, "{\"observations\": [").into_response(),
        Reply::NoContent => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn spawn_upstream(reply: Reply) -> (String, Arc<Upstream>) {
    let upstream = Arc::new(Upstream {
        reply,
        hits: AtomicUsize::new(0),
    });
    let app = Router::new()
        .route(
            "/v1/location/:station/observations/historical.json",
            get(historical),
        )
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), upstream)
}

fn source(base_url: &str, cache: Arc<CacheStore>) -> WeatherComSource {
    WeatherComSource::new(
        SourceConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            ..Default::default()
        },
        cache,
    )
    .unwrap()
}

fn january() -> Window {
    Window::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
    .unwrap()
}

fn station() -> Station {
    Station::new("KSFO:9:US")
}

#[tokio::test]
async fn test_success_is_decoded_and_cached() {
    let (base_url, upstream) = spawn_upstream(Reply::Data).await;
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(CacheStore::new(dir.path(), true));
    let source = source(&base_url, cache.clone());

    let first = match source.fetch(&station(), &january()).await {
        FetchOutcome::Succeeded(rows) => rows,
        other => panic!("expected success, got {}", other.kind()),
    };
    assert_eq!(first.len(), 31);
    assert!(cache.path_for(&station(), &january()).exists());

    let second = match source.fetch(&station(), &january()).await {
        FetchOutcome::Succeeded(rows) => rows,
        other => panic!("expected success, got {}", other.kind()),
    };

    assert!(same_rows(&first, &second));
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
    assert_eq!(source.network_requests(), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn test_disabled_cache_always_hits_network() {
    let (base_url, upstream) = spawn_upstream(Reply::Data).await;
    let source = source(&base_url, Arc::new(CacheStore::disabled()));

    for _ in 0..3 {
        assert!(matches!(
            source.fetch(&station(), &january()).await,
            FetchOutcome::Succeeded(_)
        ));
    }
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_status_classification() {
    let cases = [
        (StatusCode::CONFLICT, "retryable"),
        (StatusCode::TOO_MANY_REQUESTS, "retryable"),
        (StatusCode::BAD_REQUEST, "no_more_data"),
        (StatusCode::INTERNAL_SERVER_ERROR, "fatal"),
        (StatusCode::UNAUTHORIZED, "fatal"),
    ];

    for (status, expected) in cases {
        let (base_url, _upstream) = spawn_upstream(Reply::Status(status)).await;
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path(), true));
        let source = source(&base_url, cache.clone());

        let outcome = source.fetch(&station(), &january()).await;
        assert_eq!(outcome.kind(), expected, "status {}", status);
        assert!(!cache.path_for(&station(), &january()).exists());
    }
}

#[tokio::test]
async fn test_fatal_status_keeps_body() {
    let (base_url, _upstream) =
        spawn_upstream(Reply::Status(StatusCode::INTERNAL_SERVER_ERROR)).await;
    let source = source(&base_url, Arc::new(CacheStore::disabled()));

    match source.fetch(&station(), &january()).await {
        FetchOutcome::Fatal(FetchError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream says no");
        }
        other => panic!("expected fatal status, got {}", other.kind()),
    }
}

#[tokio::test]
async fn test_malformed_body_is_fatal_and_not_cached() {
    let (base_url, _upstream) = spawn_upstream(Reply::Malformed).await;
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(CacheStore::new(dir.path(), true));
    let source = source(&base_url, cache.clone());

    assert!(matches!(
        source.fetch(&station(), &january()).await,
        FetchOutcome::Fatal(FetchError::Decode(_))
    ));
    assert!(!cache.path_for(&station(), &january()).exists());
}

#[tokio::test]
async fn test_no_content_is_empty_success() {
    let (base_url, _upstream) = spawn_upstream(Reply::NoContent).await;
    let source = source(&base_url, Arc::new(CacheStore::disabled()));

    match source.fetch(&station(), &january()).await {
        FetchOutcome::Succeeded(rows) => assert!(rows.is_empty()),
        other => panic!("expected empty success, got {}", other.kind()),
    }
}

#[tokio::test]
async fn test_unreachable_upstream_is_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = source(&format!("http://{}", addr), Arc::new(CacheStore::disabled()));
    assert!(matches!(
        source.fetch(&station(), &january()).await,
        FetchOutcome::Fatal(FetchError::Transport(_))
    ));
}

#[tokio::test]
async fn test_second_cached_run_makes_no_network_calls() {
    let (base_url, upstream) = spawn_upstream(Reply::Data).await;
    let dir = TempDir::new().unwrap();
    let config = SchedulerConfig {
        max_workers: 4,
        retry: RetryPolicy::default(),
    };
    let start = NaiveDate::from_ymd_opt(2023, 10, 15).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
    let stations = vec![station()];

    let first_store = Arc::new(ObservationStore::open_memory().await.unwrap());
    let first_source = Arc::new(source(
        &base_url,
        Arc::new(CacheStore::new(dir.path(), true)),
    ));
    let first = Downloader::new(first_source.clone(), first_store.clone(), config)
        .download(&stations, start, end)
        .await
        .unwrap();
    assert!(!first.has_failures());
    let hits_after_first = upstream.hits.load(Ordering::SeqCst);
    assert_eq!(hits_after_first, 5);

    let second_store = Arc::new(ObservationStore::open_memory().await.unwrap());
    let second_source = Arc::new(source(
        &base_url,
        Arc::new(CacheStore::new(dir.path(), true)),
    ));
    let second = Downloader::new(second_source.clone(), second_store.clone(), config)
        .download(&stations, start, end)
        .await
        .unwrap();
    assert!(!second.has_failures());

    assert_eq!(upstream.hits.load(Ordering::SeqCst), hits_after_first);
    assert_eq!(second_source.network_requests(), 0);
    assert!(same_rows(
        &first_store.fetch_rows(&station()).await.unwrap(),
        &second_store.fetch_rows(&station()).await.unwrap()
    ));
    assert_eq!(second_store.row_count(&station()).await.unwrap(), 119);
}
