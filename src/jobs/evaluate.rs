use std::collections::HashMap;

use tracing::info;

use crate::config::MISSING_SNAPSHOT_GRACE_SECS;
use crate::db::{SnapshotRepo, WatchRepo};
use crate::error::Result;
use crate::types::{now_secs, Side};

/// Per-watch state machine: idle → triggered → triggered+notified, with a
/// reset back to idle once the market no longer satisfies the comparator.
/// Re-running on unchanged data writes nothing.
pub struct WatchEvaluator {
    watches: WatchRepo,
    snapshots: SnapshotRepo,
}

impl WatchEvaluator {
    pub fn new(watches: WatchRepo, snapshots: SnapshotRepo) -> Self {
        Self { watches, snapshots }
    }

    pub async fn run(&self) -> Result<()> {
        let watches = self.watches.enabled().await?;
        let snapshots = self.snapshots.all().await?;
        info!(watches = watches.len(), snapshots = snapshots.len(), "evaluating watches");

        let amounts: HashMap<(i64, i64, Side), i64> = snapshots
            .into_iter()
            .map(|s| ((s.type_id, s.location_id, s.side), s.amount))
            .collect();

        let now = now_secs();
        for mut watch in watches {
            match amounts.get(&(watch.type_id, watch.location_id, watch.side)) {
                Some(&amount) => {
                    if watch.comparator.holds(amount, watch.threshold) {
                        if !watch.triggered {
                            info!(
                                watch_id = watch.id,
                                type_name = %watch.type_name,
                                amount,
                                threshold = watch.threshold,
                                "watch triggered"
                            );
                            watch.triggered = true;
                            self.watches.save(&watch).await?;
                        }
                    } else if watch.triggered || watch.mail_sent {
                        info!(watch_id = watch.id, type_name = %watch.type_name, amount, "watch reset");
                        watch.triggered = false;
                        watch.mail_sent = false;
                        self.watches.save(&watch).await?;
                    }
                }
                None => {
                    // No market data at all. After the grace window, an
                    // absence-sensitive watch treats that as zero inventory.
                    if now - watch.created > MISSING_SNAPSHOT_GRACE_SECS
                        && !watch.triggered
                        && watch.comparator.absence_sensitive(watch.threshold)
                    {
                        info!(
                            watch_id = watch.id,
                            type_name = %watch.type_name,
                            "no snapshot, assuming empty market and triggering"
                        );
                        watch.triggered = true;
                        self.watches.save(&watch).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::{Comparator, Snapshot, Watch};

    async fn fixtures() -> (WatchRepo, SnapshotRepo, WatchEvaluator) {
        let pool = test_pool().await;
        let watches = WatchRepo::new(pool.clone());
        let snapshots = SnapshotRepo::new(pool);
        let evaluator = WatchEvaluator::new(watches.clone(), snapshots.clone());
        (watches, snapshots, evaluator)
    }

    fn watch(comparator: Comparator, threshold: i64) -> Watch {
        Watch {
            id: 0,
            character_id: 93,
            location_id: 1027847407700,
            type_id: 608,
            type_name: "Atron".to_string(),
            side: Side::Sell,
            comparator,
            threshold,
            triggered: false,
            mail_sent: false,
            disabled: false,
            created: now_secs() - 3600,
        }
    }

    async fn put_snapshot(snapshots: &SnapshotRepo, amount: i64) {
        snapshots
            .upsert_if_changed(&Snapshot {
                type_id: 608,
                location_id: 1027847407700,
                side: Side::Sell,
                amount,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lt_triggers_below_threshold_and_resets_above() {
        let (watches, snapshots, evaluator) = fixtures().await;
        let id = watches.create(&watch(Comparator::Lt, 10)).await.unwrap();

        put_snapshot(&snapshots, 5).await;
        evaluator.run().await.unwrap();
        assert!(watches.find(id).await.unwrap().unwrap().triggered);

        // pretend the notification already went out
        let mut w = watches.find(id).await.unwrap().unwrap();
        w.mail_sent = true;
        watches.save(&w).await.unwrap();

        put_snapshot(&snapshots, 15).await;
        evaluator.run().await.unwrap();
        let w = watches.find(id).await.unwrap().unwrap();
        assert!(!w.triggered);
        assert!(!w.mail_sent);
    }

    #[tokio::test]
    async fn ge_triggers_at_or_above_threshold() {
        let (watches, snapshots, evaluator) = fixtures().await;
        let id = watches.create(&watch(Comparator::Ge, 100)).await.unwrap();

        put_snapshot(&snapshots, 150).await;
        evaluator.run().await.unwrap();
        assert!(watches.find(id).await.unwrap().unwrap().triggered);

        put_snapshot(&snapshots, 50).await;
        evaluator.run().await.unwrap();
        assert!(!watches.find(id).await.unwrap().unwrap().triggered);
    }

    #[tokio::test]
    async fn evaluation_is_idempotent() {
        let (watches, snapshots, evaluator) = fixtures().await;
        let id = watches.create(&watch(Comparator::Lt, 10)).await.unwrap();
        put_snapshot(&snapshots, 5).await;

        evaluator.run().await.unwrap();
        let first = watches.find(id).await.unwrap().unwrap();
        evaluator.run().await.unwrap();
        let second = watches.find(id).await.unwrap().unwrap();

        assert!(first.triggered && second.triggered);
        assert_eq!(first.mail_sent, second.mail_sent);
    }

    #[tokio::test]
    async fn missing_snapshot_triggers_only_after_grace_window() {
        let (watches, _snapshots, evaluator) = fixtures().await;

        let mut old = watch(Comparator::Lt, 10);
        old.created = now_secs() - 11 * 60;
        let old_id = watches.create(&old).await.unwrap();

        let mut fresh = watch(Comparator::Lt, 10);
        fresh.created = now_secs() - 5 * 60;
        let fresh_id = watches.create(&fresh).await.unwrap();

        evaluator.run().await.unwrap();
        assert!(watches.find(old_id).await.unwrap().unwrap().triggered);
        assert!(!watches.find(fresh_id).await.unwrap().unwrap().triggered);
    }

    #[tokio::test]
    async fn missing_snapshot_never_triggers_gt_watches() {
        let (watches, _snapshots, evaluator) = fixtures().await;
        let mut w = watch(Comparator::Gt, 100);
        w.created = now_secs() - 11 * 60;
        let id = watches.create(&w).await.unwrap();

        evaluator.run().await.unwrap();
        assert!(!watches.find(id).await.unwrap().unwrap().triggered);
    }

    #[tokio::test]
    async fn disabled_watches_are_not_evaluated() {
        let (watches, snapshots, evaluator) = fixtures().await;
        let mut w = watch(Comparator::Lt, 10);
        w.disabled = true;
        let id = watches.create(&w).await.unwrap();
        put_snapshot(&snapshots, 5).await;

        evaluator.run().await.unwrap();
        assert!(!watches.find(id).await.unwrap().unwrap().triggered);
    }
}
