//! Full cycles through the real HTTP clients against a mock server

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;

use cf_ddns::address::{AddressFamily, HttpAddressLookup};
use cf_ddns::cloudflare::CloudflareClient;
use cf_ddns::dns_provider::{DomainRecord, RecordType};
use cf_ddns::reconciler::{Reconciler, RecordOutcome, SkipReason};

const TOKEN: &str = "test_token_0123456789012345678901234567";
const ZONE: &str = "0123456789abcdef0123456789abcdef";

fn jellyfin() -> DomainRecord {
    DomainRecord {
        name: "jf.example.com".to_string(),
        record_type: RecordType::A,
        proxied: true,
        ttl: 1,
    }
}

fn reconciler(server: &mockito::ServerGuard, records: Vec<DomainRecord>) -> Reconciler {
    reconciler_with_timeout(server, records, Duration::from_secs(5))
}

fn reconciler_with_timeout(
    server: &mockito::ServerGuard,
    records: Vec<DomainRecord>,
    provider_timeout: Duration,
) -> Reconciler {
    let client =
        CloudflareClient::with_base_url(TOKEN, ZONE, provider_timeout, &server.url()).unwrap();
    let mut endpoints = HashMap::new();
    endpoints.insert(AddressFamily::V4, format!("{}/ip", server.url()));
    let lookup = HttpAddressLookup::new(endpoints, Duration::from_secs(5)).unwrap();

    Reconciler::new(
        Arc::new(client),
        Arc::new(lookup),
        records,
        vec![AddressFamily::V4],
    )
}

#[tokio::test]
async fn absent_record_is_created_with_full_payload() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ip")
        .with_status(200)
        .with_body("203.0.113.9\n")
        .create_async()
        .await;
    let list = server
        .mock("GET", format!("/zones/{ZONE}/dns_records").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("type".into(), "A".into()),
            Matcher::UrlEncoded("name".into(), "jf.example.com".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"success":true,"errors":[],"messages":[],"result":[]}"#)
        .expect(1)
        .create_async()
        .await;
    let create = server
        .mock("POST", format!("/zones/{ZONE}/dns_records").as_str())
        .match_header("authorization", format!("Bearer {TOKEN}").as_str())
        .match_body(Matcher::Json(serde_json::json!({
            "type": "A",
            "name": "jf.example.com",
            "content": "203.0.113.9",
            "ttl": 1,
            "proxied": true
        })))
        .with_status(200)
        .with_body(r#"{"success":true,"errors":[],"messages":[],"result":{"id":"rec1"}}"#)
        .expect(1)
        .create_async()
        .await;
    let update = server
        .mock("PUT", Matcher::Regex(r"^/zones/.*/dns_records/.*$".to_string()))
        .expect(0)
        .create_async()
        .await;

    let report = reconciler(&server, vec![jellyfin()]).run_cycle().await;

    assert_eq!(report.records[0].outcome, RecordOutcome::Created);
    list.assert_async().await;
    create.assert_async().await;
    update.assert_async().await;
}

#[tokio::test]
async fn matching_record_issues_no_writes() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ip")
        .with_status(200)
        .with_body("203.0.113.9")
        .create_async()
        .await;
    server
        .mock("GET", format!("/zones/{ZONE}/dns_records").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"success":true,"errors":[],"messages":[],"result":[
                {"id":"rec1","type":"A","name":"jf.example.com","content":"203.0.113.9","proxied":true,"ttl":1}
            ]}"#,
        )
        .create_async()
        .await;
    let creates = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let updates = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let report = reconciler(&server, vec![jellyfin()]).run_cycle().await;

    assert_eq!(report.records[0].outcome, RecordOutcome::Unchanged);
    creates.assert_async().await;
    updates.assert_async().await;
}

#[tokio::test]
async fn unsuccessful_list_body_skips_record() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ip")
        .with_status(200)
        .with_body("203.0.113.9")
        .create_async()
        .await;
    server
        .mock("GET", format!("/zones/{ZONE}/dns_records").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"success":false,"errors":[{"code":1000,"message":"Internal error"}],"messages":[],"result":[]}"#,
        )
        .create_async()
        .await;
    let create = server
        .mock("POST", format!("/zones/{ZONE}/dns_records").as_str())
        .expect(0)
        .create_async()
        .await;

    let report = reconciler(&server, vec![jellyfin()]).run_cycle().await;

    assert!(matches!(
        report.records[0].outcome,
        RecordOutcome::Skipped(SkipReason::ProviderRead(_))
    ));
    create.assert_async().await;
}

#[tokio::test]
async fn failed_lookup_skips_without_provider_calls() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ip")
        .with_status(502)
        .create_async()
        .await;
    let provider = server
        .mock("GET", Matcher::Regex("^/zones/".to_string()))
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let report = reconciler(&server, vec![jellyfin()]).run_cycle().await;

    assert_eq!(
        report.records[0].outcome,
        RecordOutcome::Skipped(SkipReason::NoAddress(AddressFamily::V4))
    );
    provider.assert_async().await;
}

#[tokio::test]
async fn list_without_result_is_not_treated_as_absent() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ip")
        .with_status(200)
        .with_body("203.0.113.9")
        .create_async()
        .await;
    server
        .mock("GET", format!("/zones/{ZONE}/dns_records").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"success":true,"errors":[],"messages":[]}"#)
        .create_async()
        .await;
    let create = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let report = reconciler(&server, vec![jellyfin()]).run_cycle().await;

    assert!(matches!(
        report.records[0].outcome,
        RecordOutcome::Skipped(SkipReason::ProviderRead(_))
    ));
    create.assert_async().await;
}

#[tokio::test]
async fn stalled_list_times_out_without_affecting_other_records() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ip")
        .with_status(200)
        .with_body("203.0.113.9")
        .create_async()
        .await;
    server
        .mock("GET", format!("/zones/{ZONE}/dns_records").as_str())
        .match_query(Matcher::UrlEncoded(
            "name".into(),
            "vault.example.com".into(),
        ))
        .with_status(200)
        .with_body(
            r#"{"success":true,"errors":[],"messages":[],"result":[
                {"id":"rec1","type":"A","name":"vault.example.com","content":"198.51.100.7","proxied":false,"ttl":1}
            ]}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", format!("/zones/{ZONE}/dns_records").as_str())
        .match_query(Matcher::UrlEncoded("name".into(), "jf.example.com".into()))
        .with_status(200)
        .with_chunked_body(|w: &mut dyn std::io::Write| {
            std::thread::sleep(Duration::from_millis(1500));
            w.write_all(br#"{"success":true,"errors":[],"messages":[],"result":[]}"#)
        })
        .create_async()
        .await;
    let update = server
        .mock("PUT", format!("/zones/{ZONE}/dns_records/rec1").as_str())
        .with_status(200)
        .with_body(r#"{"success":true,"errors":[],"messages":[],"result":{"id":"rec1"}}"#)
        .expect(1)
        .create_async()
        .await;
    let create = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let vault = DomainRecord {
        name: "vault.example.com".to_string(),
        record_type: RecordType::A,
        proxied: false,
        ttl: 1,
    };
    let report = reconciler_with_timeout(&server, vec![vault, jellyfin()], Duration::from_secs(1))
        .with_concurrency(1)
        .run_cycle()
        .await;

    assert_eq!(report.records[0].outcome, RecordOutcome::Updated);
    assert!(matches!(
        report.records[1].outcome,
        RecordOutcome::Skipped(SkipReason::ProviderRead(_))
    ));
    update.assert_async().await;
    create.assert_async().await;
}
