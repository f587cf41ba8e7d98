//! Periodic cleanup of expired sessions and one-time passcodes.
//!
//! The gate already deletes an expired session when its token is presented;
//! this job removes the ones nobody comes back for, and drops OTP entries
//! whose window has closed.

use std::time::Duration;

use chrono::Utc;
use deepguard_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Rows removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub otps: usize,
}

/// Delete everything that expired before `now`. Failures are logged and
/// counted as zero so one bad store does not block the other.
pub async fn sweep(state: &AppState, now: Timestamp) -> SweepReport {
    let sessions = match state.sessions.sessions().delete_expired_sessions(now).await {
        Ok(deleted) => deleted,
        Err(e) => {
            tracing::error!(error = %e, "Session cleanup: failed to delete expired sessions");
            0
        }
    };

    let otps = match state.credentials.otp().purge_expired(now).await {
        Ok(purged) => purged,
        Err(e) => {
            tracing::error!(error = %e, "Session cleanup: failed to purge expired OTPs");
            0
        }
    };

    SweepReport { sessions, otps }
}

/// Run the cleanup loop every `interval` until `cancel` is triggered.
pub async fn run(state: AppState, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Session cleanup job started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session cleanup job stopping");
                break;
            }
            _ = ticker.tick() => {
                let report = sweep(&state, Utc::now()).await;
                if report.sessions > 0 || report.otps > 0 {
                    tracing::info!(
                        sessions = report.sessions,
                        otps = report.otps,
                        "Session cleanup: purged expired rows"
                    );
                } else {
                    tracing::debug!("Session cleanup: nothing to purge");
                }
            }
        }
    }
}
