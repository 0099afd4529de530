use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use pixel_api::auth::AppState;

/// Background task that prunes sessions idle past the configured timeout.
/// Expired sessions are already refused on use; this only reclaims rows.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let st = state.clone();
        let pruned = tokio::task::spawn_blocking(move || {
            let cutoff = Utc::now() - st.sessions.idle_timeout();
            st.db.delete_idle_sessions(cutoff)
        })
        .await;

        match pruned {
            Ok(Ok(count)) if count > 0 => info!("Cleanup: pruned {} idle sessions", count),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
