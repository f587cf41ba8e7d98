//! Tests for the expired-session sweeper.

mod common;

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::sign_up;
use deepguard_api::background::session_cleanup::{run, sweep, SweepReport};
use deepguard_core::otp::OtpPurpose;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn sweep_keeps_live_sessions() {
    let test = common::build_test_app();
    sign_up(&test, "cleo@example.com", "Cleo").await;

    let report = sweep(&test.state, Utc::now()).await;

    assert_eq!(report, SweepReport::default());
    assert_eq!(test.store.session_count().await, 1);
}

#[tokio::test]
async fn sweep_removes_expired_sessions_and_otps() {
    let test = common::build_test_app();
    sign_up(&test, "dora@example.com", "Dora").await;
    test.state
        .credentials
        .otp()
        .issue(OtpPurpose::PasswordReset, "dora@example.com", None, Utc::now())
        .await
        .unwrap();

    let report = sweep(&test.state, Utc::now() + Duration::days(31)).await;

    assert_eq!(report.sessions, 1);
    assert_eq!(report.otps, 1);
    assert_eq!(test.store.session_count().await, 0);
}

#[tokio::test]
async fn sweep_survives_store_outage() {
    let test = common::build_test_app();
    test.store.set_unavailable(true);

    let report = sweep(&test.state, Utc::now()).await;

    assert_eq!(report.sessions, 0);
}

#[tokio::test]
async fn run_stops_when_cancelled() {
    let test = common::build_test_app();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run(
        test.state.clone(),
        StdDuration::from_secs(3600),
        cancel.clone(),
    ));

    cancel.cancel();

    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("cleanup job should stop promptly")
        .unwrap();
}
