//! Full pipeline runs against the fake provider.

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::json;
use std::path::PathBuf;

use arv_scout::config::AppConfig;
use arv_scout::engine::{CsvSink, MemorySink, PipelineOrchestrator, RowSink};
use arv_scout::provider::{ProviderClient, RateBudget, RetryPolicy, RetryingGateway};
use arv_scout::storage::CacheStore;
use arv_scout::types::{ScoutError, Stage, EXIT_BUDGET_EXHAUSTED, EXIT_FATAL};

use crate::fake_provider::{comp, FakeProvider};

const BASE_CONFIG: &str = r#"
    [provider]
    daily_limit = 100
    max_attempts = 2
    base_backoff_ms = 0
    max_backoff_ms = 0

    [filters]
    geos = ["Austin, TX"]
    page_cap = 2

    [profit]
    rehab_budget = 20000
"#;

fn config(extra: &str) -> AppConfig {
    AppConfig::from_toml_str(&format!("{BASE_CONFIG}\n{extra}"), None).unwrap()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("arv_scout_it_{}", uuid::Uuid::new_v4()))
        .join(name)
}

/// Build the pipeline the way the binary does, resuming the budget from
/// the cache's ledger.
async fn pipeline<S: RowSink>(
    fake: &FakeProvider,
    config: &AppConfig,
    cache: CacheStore,
    sink: S,
) -> PipelineOrchestrator<FakeProvider, S> {
    let today = Utc::now().date_naive();
    let used = cache.calls_on(today).await.unwrap();
    let budget = RateBudget::resume(config.provider.daily_limit, today, used);
    let gateway = RetryingGateway::new(
        fake.clone(),
        cache,
        budget,
        RetryPolicy::from(&config.provider),
    );
    let client = ProviderClient::new(gateway, config);
    PipelineOrchestrator::new(client, config, sink)
}

#[tokio::test]
async fn test_end_to_end_writes_csv() {
    let fake = FakeProvider::austin();
    let config = config("");
    let out = temp_path("properties.csv");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, CsvSink::create(&out).unwrap()).await;
    let summary = orch.run().await.unwrap();

    assert_eq!(summary.hits, 2);
    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.screened_out, 0);
    // search page + details and comps for each property
    assert_eq!(summary.calls_admitted, 5);
    assert_eq!(fake.calls(), 5);

    let mut reader = csv::Reader::from_path(&out).unwrap();
    let headers = reader.headers().unwrap().clone();
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);

    let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
    let first = &records[0];
    assert_eq!(&first[col("zpid")], "101");
    assert_eq!(&first[col("address")], "101 Elm St");
    assert_eq!(&first[col("city")], "Austin");
    assert_eq!(&first[col("comp_count")], "5");
    assert_eq!(&first[col("search_geo")], "Austin, TX");
    assert_eq!(&first[col("page")], "1");

    // median ppsf 120 × 1500 sqft
    let arv: f64 = first[col("arv_estimate")].parse().unwrap();
    assert_eq!(arv, 180_000.0);
    let ratio: f64 = first[col("list_to_arv_pct")].parse().unwrap();
    assert_eq!(ratio, 0.8333);

    // costs: 150000 + 20000 + 4500 + 10800 + 3600 = 188900
    let profit_median: f64 = first[col("profit_median")].parse().unwrap();
    assert_eq!(profit_median, -8900.0);
    let profit_conservative: f64 = first[col("profit_conservative")].parse().unwrap();
    assert_eq!(profit_conservative, -26900.0);

    let _ = std::fs::remove_dir_all(out.parent().unwrap());
}

#[tokio::test]
async fn test_profit_columns_empty_without_rehab_budget() {
    let fake = FakeProvider::austin();
    let config = AppConfig::from_toml_str("[filters]\ngeos = [\"Austin, TX\"]\n", None).unwrap();
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    orch.run().await.unwrap();

    let rows = &orch.sink().rows;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.profit_median.is_none()));
    assert!(orch.sink().finished);
}

#[tokio::test]
async fn test_budget_exhaustion_aborts_with_exit_3() {
    let fake = FakeProvider::austin();
    let config = config("");
    let cache = CacheStore::in_memory().await.unwrap();
    // 98 calls already spent today: search and one details call remain
    cache.record_calls(Utc::now().date_naive(), 98).await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let failure = orch.run().await.unwrap_err();

    assert_eq!(failure.exit_code(), EXIT_BUDGET_EXHAUSTED);
    assert_eq!(failure.stage, Stage::Comps);
    assert_eq!(failure.property.as_deref(), Some("101"));
    assert!(matches!(
        failure.error,
        ScoutError::BudgetExhausted { used: 100, limit: 100, .. }
    ));
    // the denied call never reached the network
    assert_eq!(fake.calls(), 2);
    assert!(orch.sink().rows.is_empty());
}

#[tokio::test]
async fn test_insufficient_comps_aborts_without_row() {
    let fake = FakeProvider::austin();
    let condos = (0..4).map(|i| comp(&format!("9{i}"), 120.0, "CONDO")).collect();
    fake.set_comps("101", condos);
    let config = config("");
    let out = temp_path("properties.csv");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, CsvSink::create(&out).unwrap()).await;
    let failure = orch.run().await.unwrap_err();

    assert_eq!(failure.exit_code(), EXIT_FATAL);
    assert_eq!(failure.stage, Stage::Filter);
    assert!(matches!(failure.error, ScoutError::InsufficientComps { .. }));
    // the extension re-request went to the recently-sold search, which is empty
    assert_eq!(fake.calls_to("/propertyExtendedSearch"), 2);
    assert_eq!(orch.sink().rows(), 0);

    let _ = std::fs::remove_dir_all(out.parent().unwrap());
}

#[tokio::test]
async fn test_comps_fallback_after_unsupported_endpoint() {
    let fake = FakeProvider::austin();
    fake.fix_status("/propertyComps", 403);
    fake.set_sold(
        (0..4)
            .map(|i| comp(&format!("5{i}"), 110.0 + 5.0 * i as f64, "SINGLE_FAMILY"))
            .collect(),
    );
    let config = config("");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let summary = orch.run().await.unwrap();

    assert_eq!(summary.rows_written, 2);
    // the primary comps endpoint is tried once per run
    assert_eq!(fake.calls_to("/propertyComps"), 1);
    assert!(orch.client().comps_unsupported());

    let sold_params = fake
        .params_of("/propertyExtendedSearch")
        .into_iter()
        .filter(|p| p.get("status_type") == Some("RecentlySold"))
        .collect::<Vec<_>>();
    assert_eq!(sold_params.len(), 2);
    assert_eq!(sold_params[0].get("soldInLast"), Some("6"));
    assert_eq!(sold_params[0].get("latitude"), Some("30.2672"));

    let row = &orch.sink().rows[0];
    assert_eq!(row.comp_count, 4);
    // median of 110, 115, 120, 125
    assert_eq!(row.arv_ppsf, 117.5);
}

#[tokio::test]
async fn test_fallback_without_coordinates_is_fatal() {
    let fake = FakeProvider::austin();
    fake.fix_status("/propertyComps", 404);
    fake.edit_details("101", |d| {
        d["latitude"] = json!(null);
    });
    let config = config("");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let failure = orch.run().await.unwrap_err();

    assert_eq!(failure.stage, Stage::Comps);
    assert_eq!(failure.exit_code(), EXIT_FATAL);
    assert!(matches!(failure.error, ScoutError::SchemaViolation { .. }));
}

#[tokio::test]
async fn test_quota_message_on_200_is_fatal_and_not_cached() {
    let fake = FakeProvider::austin();
    fake.fix_reply(
        "/propertyExtendedSearch",
        200,
        r#"{"message":"You have exceeded the DAILY quota for Requests on your current plan"}"#,
    );
    let config = config("");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let failure = orch.run().await.unwrap_err();

    assert_eq!(failure.stage, Stage::Search);
    assert_eq!(failure.exit_code(), EXIT_FATAL);
    assert!(matches!(failure.error, ScoutError::SchemaViolation { .. }));
    assert_eq!(fake.calls(), 1);
    assert!(orch.client().gateway().cache().is_empty().await.unwrap());
}

#[tokio::test]
async fn test_comps_body_without_list_is_fatal() {
    let fake = FakeProvider::austin();
    fake.fix_reply("/propertyComps", 200, r#"{"message":"Plan error"}"#);
    let config = config("");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let failure = orch.run().await.unwrap_err();

    assert_eq!(failure.stage, Stage::Comps);
    assert_eq!(failure.property.as_deref(), Some("101"));
    assert!(matches!(failure.error, ScoutError::SchemaViolation { .. }));
    // search page and details are cached; the comps body is not
    assert_eq!(orch.client().gateway().cache().len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_transient_errors_retried_within_one_admission() {
    let fake = FakeProvider::austin();
    fake.fail_next("/property", 503, 1);
    let config = config("");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let summary = orch.run().await.unwrap();

    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.calls_admitted, 5);
    assert_eq!(fake.calls(), 6);
}

#[tokio::test]
async fn test_upstream_outage_is_fatal() {
    let fake = FakeProvider::austin();
    fake.fix_status("/property", 502);
    let config = config("");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let failure = orch.run().await.unwrap_err();

    assert_eq!(failure.stage, Stage::Details);
    assert!(matches!(
        failure.error,
        ScoutError::UpstreamUnavailable { attempts: 2, .. }
    ));
}

#[tokio::test]
async fn test_deal_screen_counts_screened_rows() {
    let fake = FakeProvider::austin();
    let config = config("[deal_screen]\nmax_list_to_arv_pct = 0.8");
    let cache = CacheStore::in_memory().await.unwrap();

    let mut orch = pipeline(&fake, &config, cache, MemorySink::default()).await;
    let summary = orch.run().await.unwrap();

    // list/ARV is 0.8333 for both listings
    assert_eq!(summary.hits, 2);
    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.screened_out, 2);
}

#[tokio::test]
async fn test_cached_rerun_makes_no_network_calls() {
    let db = temp_path("cache.db");
    std::fs::create_dir_all(db.parent().unwrap()).unwrap();
    let db_path = db.to_string_lossy().to_string();
    let config = config("");

    let first = FakeProvider::austin();
    let cache = CacheStore::open(&db_path).await.unwrap();
    let mut orch = pipeline(&first, &config, cache, MemorySink::default()).await;
    let summary = orch.run().await.unwrap();
    assert_eq!(summary.calls_admitted, 5);
    let first_rows = orch.sink().rows.clone();
    drop(orch);

    let second = FakeProvider::austin();
    let cache = CacheStore::open(&db_path).await.unwrap();
    let mut orch = pipeline(&second, &config, cache, MemorySink::default()).await;
    let summary = orch.run().await.unwrap();

    assert_eq!(second.calls(), 0);
    assert_eq!(summary.calls_admitted, 0);
    assert_eq!(summary.cache_hits, 5);
    let second_rows = &orch.sink().rows;
    assert_eq!(second_rows.len(), first_rows.len());
    for (a, b) in first_rows.iter().zip(second_rows) {
        assert_eq!(a.arv_estimate, b.arv_estimate);
        assert_eq!(a.profit_median, b.profit_median);
    }
    assert_eq!(second_rows[0].profit_median, Some(dec!(-8900)));

    // the daily ledger survives the restart
    let today = Utc::now().date_naive();
    assert_eq!(orch.client().gateway().cache().calls_on(today).await.unwrap(), 5);

    let _ = std::fs::remove_dir_all(db.parent().unwrap());
}
