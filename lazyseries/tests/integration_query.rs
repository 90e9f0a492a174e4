//! Integration tests for the query layer and configuration loading.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lazyseries::error::{ConfigError, Error, QueryError};
use lazyseries::{
    ChunkStore, Interval, LabelMatcher, LazySeriesConfig, MatchType, MaterializationState,
    MemoryStore, Metric, QueryContext, SamplePair, SeriesIterator, Time, lazy_series_iterators,
};
use tempfile::NamedTempFile;

fn requests_store() -> Arc<MemoryStore> {
    let mut store = MemoryStore::new();
    store.append(
        Metric::new([("__name__", "http_requests_total"), ("job", "api")]),
        [SamplePair::new(1_000, 10.0), SamplePair::new(2_000, 12.0)],
    );
    store.append(
        Metric::new([("__name__", "http_requests_total"), ("job", "api"), ("code", "500")]),
        [SamplePair::new(1_000, 1.0), SamplePair::new(2_000, 3.0)],
    );
    store.append(
        Metric::new([("__name__", "http_requests_total"), ("job", "web"), ("code", "200")]),
        [SamplePair::new(1_500, 7.0)],
    );
    store.append(
        Metric::new([("__name__", "up"), ("job", "api")]),
        [SamplePair::new(1_000, 1.0)],
    );
    Arc::new(store)
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_selection_to_samples() {
    let memory = requests_store();
    let store: Arc<dyn ChunkStore> = memory.clone();

    let handles = lazy_series_iterators(
        &store,
        &QueryContext::background(),
        Time::from_millis(0),
        Time::from_millis(5_000),
        &[
            LabelMatcher::equal("__name__", "http_requests_total"),
            LabelMatcher::new(MatchType::RegexMatch, "job", "api|web").unwrap(),
        ],
        &LazySeriesConfig::default(),
    )
    .unwrap();

    assert_eq!(handles.len(), 3);
    assert_eq!(memory.lookup_count(), 0);

    // Reading only one handle fetches only that series.
    let web = handles
        .iter()
        .find(|h| h.metric().get("job") == Some("web"))
        .unwrap();
    assert_eq!(
        web.value_at_or_before_time(Time::from_millis(1_999)).unwrap(),
        SamplePair::new(1_500, 7.0)
    );
    assert_eq!(memory.lookup_count(), 1);
    assert_eq!(
        handles
            .iter()
            .filter(|h| h.state() == MaterializationState::Pending)
            .count(),
        2
    );

    // The two api series differ only by the presence of `code`; each handle
    // still resolves to its own series.
    for handle in handles.iter().filter(|h| h.metric().get("job") == Some("api")) {
        let samples = handle.range_values(Interval::new(0, 5_000)).unwrap();
        let expected = if handle.metric().get("code").is_some() {
            vec![SamplePair::new(1_000, 1.0), SamplePair::new(2_000, 3.0)]
        } else {
            vec![SamplePair::new(1_000, 10.0), SamplePair::new(2_000, 12.0)]
        };
        assert_eq!(samples, expected, "{}", handle.metric());
    }
    assert_eq!(memory.lookup_count(), 3);
}

#[test]
fn test_selection_outside_time_range_is_empty() {
    let store: Arc<dyn ChunkStore> = requests_store();
    let handles = lazy_series_iterators(
        &store,
        &QueryContext::background(),
        Time::from_millis(3_000),
        Time::from_millis(4_000),
        &[LabelMatcher::equal("__name__", "http_requests_total")],
        &LazySeriesConfig::default(),
    )
    .unwrap();
    assert!(handles.is_empty());
}

#[test]
fn test_selection_without_metric_name_is_rejected() {
    let store: Arc<dyn ChunkStore> = requests_store();
    let result = lazy_series_iterators(
        &store,
        &QueryContext::background(),
        Time::EARLIEST,
        Time::LATEST,
        &[LabelMatcher::new(MatchType::RegexMatch, "__name__", "http_.*").unwrap()],
        &LazySeriesConfig::default(),
    );
    assert!(matches!(
        result,
        Err(Error::Query(QueryError::MissingMetricNameMatcher { .. }))
    ));
}

#[test]
fn test_matchers_parsed_from_text() {
    let store: Arc<dyn ChunkStore> = requests_store();
    let matchers: Vec<LabelMatcher> = ["__name__=http_requests_total", "code!=500", "job=~a.*"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();

    let handles = lazy_series_iterators(
        &store,
        &QueryContext::background(),
        Time::EARLIEST,
        Time::LATEST,
        &matchers,
        &LazySeriesConfig::default(),
    )
    .unwrap();

    assert_eq!(handles.len(), 1);
    assert_eq!(
        handles[0].metric(),
        &Metric::new([("__name__", "http_requests_total"), ("job", "api")])
    );
    assert_eq!(handles[0].range_values(Interval::new(0, 5_000)).unwrap().len(), 2);
}

#[test]
fn test_config_from_json_file() {
    let file = write_config(r#"{ "materialize_timeout": 0.25 }"#);
    let config = LazySeriesConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.materialize_timeout, Some(Duration::from_millis(250)));

    // Handles built from the config carry it.
    let store: Arc<dyn ChunkStore> = requests_store();
    let handles = lazy_series_iterators(
        &store,
        &QueryContext::background(),
        Time::EARLIEST,
        Time::LATEST,
        &[LabelMatcher::equal("__name__", "up")],
        &config,
    )
    .unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].config(), &config);
    assert_eq!(
        handles[0].value_at_or_before_time(Time::LATEST).unwrap(),
        SamplePair::new(1_000, 1.0)
    );
}

#[test]
fn test_config_errors() {
    let malformed = write_config("{ materialize_timeout: ");
    assert!(matches!(
        LazySeriesConfig::from_json_file(malformed.path()),
        Err(ConfigError::Parse { .. })
    ));

    let zero = write_config(r#"{ "materialize_timeout": 0 }"#);
    assert!(matches!(
        LazySeriesConfig::from_json_file(zero.path()),
        Err(ConfigError::Invalid { .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    match LazySeriesConfig::from_json_file(&missing) {
        Err(ConfigError::Read { path, .. }) => assert_eq!(path, missing),
        other => panic!("Expected Read error, got: {:?}", other),
    }
}
