//! Long-poll coordinator (spec.md §4.5).
//!
//! One generic loop backs `WaitForPostDescendants`, `WaitForFeed`, and
//! `WaitForNotifications`: subscribe to the topic before the first existence
//! check (so a publish racing the check is never missed), then loop
//! exists-check / bounded receive until the check is true. The bus may drop
//! or reorder wake-ups; the 10s re-check bounds the damage to ~10s of extra
//! latency, never to an indefinitely stalled reader.

use std::future::Future;
use std::time::Duration;

use crate::bus::{Bus, RecvOutcome};
use crate::error::AppResult;
use crate::pagetoken::Direction;

/// Re-check interval if a wake-up is dropped or reordered (spec.md §4.5).
const RECHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the subscribe-before-check long-poll protocol against `topic`.
///
/// `direction` comes from the caller's page token: waiting is only
/// meaningful when the caller is asking for content newer than a known
/// position (spec.md §4.5 step 1), so anything else returns immediately
/// without subscribing at all.
///
/// `exists` is re-invoked on every iteration; it should run the same
/// existence query the matching read path's visibility predicate uses,
/// compared against "newer than token".
pub async fn wait_for<F, Fut>(bus: &Bus, topic: &str, direction: Direction, mut exists: F) -> AppResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<bool>>,
{
    if direction != Direction::Newer {
        return Ok(());
    }

    let mut sub = bus.subscribe(topic);

    loop {
        if exists().await? {
            return Ok(());
        }

        match sub.receive(RECHECK_TIMEOUT).await {
            RecvOutcome::Woken | RecvOutcome::TimedOut => {
                // Either way we loop back to the authoritative existence
                // check — a wake-up only tells us *something* landed, never
                // what, and a timeout is simply the scheduled re-check.
            }
        }
    }

    // `sub` drops here on every exit path (return above, or the caller's
    // future being cancelled), releasing the bus subscription — this is
    // spec.md §4.5 step 4's "unsubscribe on all exit paths".
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_immediately_when_direction_is_not_newer() {
        let bus = Bus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        wait_for(&bus, "descendants:x", Direction::Older, || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn returns_as_soon_as_exists_check_passes() {
        let bus = Bus::new();
        wait_for(&bus, "descendants:x", Direction::Newer, || async { Ok(true) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wakes_on_publish_after_subscribe() {
        let bus = Bus::new();
        let bus_publisher = bus.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);

        let waiter = tokio::spawn(async move {
            wait_for(&bus, "descendants:x", Direction::Newer, move || {
                let calls = Arc::clone(&calls2);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    // First check (before publish) sees nothing; the second
                    // (after the wake-up) sees the new row.
                    Ok(n >= 1)
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        bus_publisher.publish("descendants:x");

        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("wait_for should return promptly after the publish")
            .unwrap()
            .unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }
}
