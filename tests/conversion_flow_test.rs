//! End-to-end conversion lifecycle tests.
//!
//! The encoder is replaced with small shell scripts that speak the same
//! progress protocol on stdout, so the full submit/progress/finalize path
//! runs without a real media toolchain.

#![cfg(unix)]

mod common;

use common::{submit, wait_for_completion, TestHarness};
use serde_json::json;
use std::time::Duration;

/// Writes a few progress records, then the output file, then exits cleanly.
const SUCCESS_STUB: &str = r#"#!/bin/sh
for last; do :; done
echo "frame=1"
echo "progress=continue"
echo "frame=2"
echo "progress=continue"
echo "progress=end"
printf 'converted' > "$last"
exit 0
"#;

const FAIL_STUB: &str = r#"#!/bin/sh
echo "progress=continue"
exit 1
"#;

/// Exits cleanly but produces an empty output file.
const EMPTY_OUTPUT_STUB: &str = r#"#!/bin/sh
for last; do :; done
: > "$last"
echo "progress=end"
exit 0
"#;

/// Runs until signalled. SIGINT is the graceful-stop signal; exec keeps the
/// registered pid pointing at the process that receives it.
const SLEEP_STUB: &str = r#"#!/bin/sh
exec sleep 30
"#;

#[tokio::test]
async fn successful_conversion_reaches_100_percent() {
    let (h, addr) = TestHarness::with_stub_encoder(SUCCESS_STUB, 1).serve().await;
    let input = h.upload("movie.mkv", b"source bytes");
    let client = reqwest::Client::new();

    let resp = submit(
        &client,
        addr,
        json!({"filename": "movie.mkv", "format": "mp4", "quality": "fast"}),
    )
    .await;
    assert_eq!(resp.status(), 202);
    let id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let body = wait_for_completion(&client, addr, &id, Duration::from_secs(5)).await;

    assert_eq!(body["progress"], 100.0);
    assert_eq!(body["error"], "");
    assert_eq!(body["outcome"], "succeeded");
    let download = body["download_url"].as_str().unwrap();
    assert!(download.starts_with("/downloads/"));

    // The source is consumed and the output exists with content.
    assert!(!input.exists());
    let output_name = download.trim_start_matches("/downloads/");
    let output = h.output_dir().join(output_name);
    assert_eq!(std::fs::read(&output).unwrap(), b"converted");

    // The finished output is downloadable.
    let dl = client
        .get(format!("http://{addr}{download}"))
        .send()
        .await
        .unwrap();
    assert_eq!(dl.status(), 200);
    assert_eq!(dl.bytes().await.unwrap().as_ref(), b"converted");
}

#[tokio::test]
async fn failed_conversion_reports_exit_status() {
    let (h, addr) = TestHarness::with_stub_encoder(FAIL_STUB, 1).serve().await;
    let input = h.upload("movie.mkv", b"source bytes");
    let client = reqwest::Client::new();

    let resp = submit(
        &client,
        addr,
        json!({"filename": "movie.mkv", "format": "mp4", "quality": "fast"}),
    )
    .await;
    let id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let body = wait_for_completion(&client, addr, &id, Duration::from_secs(5)).await;

    assert_eq!(body["outcome"], "failed");
    assert_eq!(body["progress"], 0.0);
    assert!(body["error"].as_str().unwrap().contains("exited"));
    assert!(body["download_url"].is_null());

    // Failure cleans up both artifacts.
    assert!(!input.exists());
}

#[tokio::test]
async fn empty_output_is_a_failure() {
    let (h, addr) = TestHarness::with_stub_encoder(EMPTY_OUTPUT_STUB, 1)
        .serve()
        .await;
    h.upload("movie.mkv", b"source bytes");
    let client = reqwest::Client::new();

    let resp = submit(
        &client,
        addr,
        json!({"filename": "movie.mkv", "format": "mp4", "quality": "fast"}),
    )
    .await;
    let id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let body = wait_for_completion(&client, addr, &id, Duration::from_secs(5)).await;

    assert_eq!(body["outcome"], "failed");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("empty output file"));
}

#[tokio::test]
async fn spawn_failure_finalizes_the_status() {
    let (h, addr) = TestHarness::with_encoder("/nonexistent/encoder-binary", 1)
        .serve()
        .await;
    h.upload("movie.mkv", b"source bytes");
    let client = reqwest::Client::new();

    let resp = submit(
        &client,
        addr,
        json!({"filename": "movie.mkv", "format": "mp4", "quality": "fast"}),
    )
    .await;
    let id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let body = wait_for_completion(&client, addr, &id, Duration::from_secs(5)).await;

    assert_eq!(body["outcome"], "failed");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Failed to start conversion process"));
}

#[tokio::test]
async fn abort_terminates_a_running_conversion() {
    let (h, addr) = TestHarness::with_stub_encoder(SLEEP_STUB, 1).serve().await;
    h.upload("movie.mkv", b"source bytes");
    let client = reqwest::Client::new();

    let resp = submit(
        &client,
        addr,
        json!({"filename": "movie.mkv", "format": "mp4", "quality": "fast"}),
    )
    .await;
    let id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Wait until the process is registered as running.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let active: serde_json::Value = client
            .get(format!("http://{addr}/api/conversions/active"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if active.as_array().unwrap().iter().any(|c| c["id"] == *id) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "conversion never became active"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let resp = client
        .post(format!("http://{addr}/api/conversions/{id}/abort"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let body = wait_for_completion(&client, addr, &id, Duration::from_secs(5)).await;
    assert_eq!(body["outcome"], "aborted");
    assert_eq!(body["error"], "Conversion aborted by user");
    assert_eq!(body["progress"], 0.0);

    // Aborting again conflicts with the terminal state.
    let resp = client
        .post(format!("http://{addr}/api/conversions/{id}/abort"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // The worker has drained; nothing is active anymore.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let active: serde_json::Value = client
            .get(format!("http://{addr}/api/conversions/active"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if active.as_array().unwrap().is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "active list never drained"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn saturated_queue_rejects_submissions() {
    // One worker blocked on a long-running job plus a full queue behind it.
    let (h, addr) = TestHarness::with_stub_encoder(SLEEP_STUB, 1).serve().await;
    for i in 0..5 {
        h.upload(&format!("movie{i}.mkv"), b"source bytes");
    }
    let client = reqwest::Client::new();

    let first = submit(
        &client,
        addr,
        json!({"filename": "movie0.mkv", "format": "mp4", "quality": "fast"}),
    )
    .await;
    assert_eq!(first.status(), 202);
    let first_id = first.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Wait for the worker to pick it up so queue occupancy is deterministic.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let active: serde_json::Value = client
            .get(format!("http://{addr}/api/conversions/active"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if !active.as_array().unwrap().is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never started");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // Queue capacity is workers * 2 = 2.
    for i in 1..=2 {
        let resp = submit(
            &client,
            addr,
            json!({"filename": format!("movie{i}.mkv"), "format": "mp4", "quality": "fast"}),
        )
        .await;
        assert_eq!(resp.status(), 202);
    }

    let resp = submit(
        &client,
        addr,
        json!({"filename": "movie3.mkv", "format": "mp4", "quality": "fast"}),
    )
    .await;
    assert_eq!(resp.status(), 503);

    // The rejected submission left no status behind.
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("full"));

    // Unblock the worker so the test tears down promptly.
    let resp = client
        .post(format!("http://{addr}/api/conversions/{first_id}/abort"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
}
