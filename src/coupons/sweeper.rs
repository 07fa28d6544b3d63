use rusqlite::Connection;

use std::time::Duration;

use crate::db::{queries, AppState};
use crate::error::Result;

/// How often the background sweeper wakes up.
const SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;

/// Terminal reservations and abandoned checkout sessions older than this
/// are deleted outright to keep the tables from growing without bound.
const PURGE_RETENTION_DAYS: i64 = 30;

/// Marks every held reservation whose TTL has lapsed as expired, releasing
/// its slot back to the coupon's global capacity.
///
/// Safe to call at any time and from multiple workers: the UPDATE only
/// touches rows that are both held and past their deadline, so repeated or
/// overlapping runs simply find nothing left to do.
///
/// Returns the number of reservations reclaimed.
pub fn cleanup_expired_reservations(conn: &Connection) -> Result<usize> {
    let reclaimed = queries::expire_stale_reservations(conn)?;
    Ok(reclaimed)
}

/// Spawns a background task that periodically reclaims expired coupon
/// reservations. Runs every 5 minutes and also purges terminal rows past
/// the retention window.
pub fn spawn_reservation_sweeper(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(SWEEP_INTERVAL_SECONDS);

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => {
                    match cleanup_expired_reservations(&conn) {
                        Ok(count) => {
                            if count > 0 {
                                tracing::debug!("Reclaimed {} expired coupon reservations", count);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Failed to reclaim expired reservations: {}", e);
                        }
                    }

                    match queries::purge_dead_reservations(&conn, PURGE_RETENTION_DAYS) {
                        Ok(count) => {
                            if count > 0 {
                                tracing::debug!("Purged {} old terminal reservations", count);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Failed to purge old reservations: {}", e);
                        }
                    }

                    match queries::purge_old_checkout_sessions(&conn, PURGE_RETENTION_DAYS) {
                        Ok(count) => {
                            if count > 0 {
                                tracing::debug!("Purged {} abandoned checkout sessions", count);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Failed to purge old checkout sessions: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for reservation sweep: {}", e);
                }
            }
        }
    });

    tracing::info!("Reservation sweeper started (runs every 5 minutes)");
}
