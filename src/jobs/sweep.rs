use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::auth::{AccessTokens, AuthErrors};
use crate::db::{SnapshotRepo, StructureRepo, WatchRepo};
use crate::error::{AppError, Result};
use crate::esi::models::MarketOrder;
use crate::esi::EsiClient;
use crate::types::{Side, Snapshot, Structure, Watch};

/// One scheduled market sweep: fetch open orders for every watched
/// location and fold them into volume snapshots. A location that cannot
/// be read this run is logged and skipped; the rest of the sweep goes on.
pub struct MarketSweep {
    esi: EsiClient,
    tokens: AccessTokens,
    auth_errors: AuthErrors,
    watches: WatchRepo,
    structures: StructureRepo,
    snapshots: SnapshotRepo,
}

/// Region lookups resolved during this run. The persisted `region_id` on
/// the structure row is the durable memo; these maps only save repeat hops
/// within a single sweep.
#[derive(Default)]
struct RegionCache {
    systems: HashMap<i64, i64>,
    constellations: HashMap<i64, i64>,
}

impl MarketSweep {
    pub fn new(
        esi: EsiClient,
        tokens: AccessTokens,
        auth_errors: AuthErrors,
        watches: WatchRepo,
        structures: StructureRepo,
        snapshots: SnapshotRepo,
    ) -> Self {
        Self { esi, tokens, auth_errors, watches, structures, snapshots }
    }

    pub async fn run(&self) -> Result<()> {
        let watches = self.watches.enabled().await?;
        if watches.is_empty() {
            info!("no enabled watches, nothing to sweep");
            return Ok(());
        }

        let mut locations: Vec<i64> = watches.iter().map(|w| w.location_id).collect();
        locations.sort_unstable();
        locations.dedup();

        let mut player = Vec::new();
        let mut npc = Vec::new();
        for location_id in locations {
            match self.structures.find(location_id).await? {
                Some(s) if s.npc_station => npc.push(s),
                Some(s) => player.push(s),
                None => warn!(location_id, "watched location has no structure record, skipping"),
            }
        }
        info!(
            player_structures = player.len(),
            npc_stations = npc.len(),
            "sweeping watched locations"
        );

        for structure in &player {
            match self.fetch_structure_orders(structure, &watches).await {
                Ok(orders) => {
                    self.store_volumes(structure.structure_id, &orders, &watches).await?;
                }
                Err(e) => {
                    warn!(location_id = structure.structure_id, error = %e, "structure sweep failed");
                }
            }
        }

        self.sweep_npc_stations(&npc, &watches).await
    }

    /// Try each account with watches at this structure until one can read
    /// the market. Counter increments and ACL disables made along the way
    /// stick even when a later candidate succeeds.
    async fn fetch_structure_orders(
        &self,
        structure: &Structure,
        watches: &[Watch],
    ) -> Result<Vec<MarketOrder>> {
        let mut candidates: Vec<i64> = watches
            .iter()
            .filter(|w| w.location_id == structure.structure_id)
            .map(|w| w.character_id)
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        for character_id in candidates {
            let token = match self.tokens.for_character(character_id).await {
                Ok(token) => token,
                Err(AppError::UnknownAccount(_)) => {
                    debug!(character_id, "candidate has no stored credential");
                    continue;
                }
                Err(AppError::InvalidCredential(status)) => {
                    warn!(character_id, status, "candidate token refresh rejected");
                    self.auth_errors.record_failure(character_id).await?;
                    continue;
                }
                Err(e) => {
                    warn!(character_id, error = %e, "candidate token unavailable");
                    continue;
                }
            };

            match self.esi.structure_orders(structure.structure_id, &token).await {
                Ok(orders) => {
                    self.auth_errors.record_success(character_id).await?;
                    return Ok(orders);
                }
                Err(AppError::InvalidCredential(status)) => {
                    warn!(character_id, status, "candidate token rejected by market endpoint");
                    self.auth_errors.record_failure(character_id).await?;
                }
                Err(AppError::AccessDenied(_)) => {
                    warn!(
                        character_id,
                        location_id = structure.structure_id,
                        "market access revoked, disabling this character's watches here"
                    );
                    self.watches
                        .disable_at_location(character_id, structure.structure_id)
                        .await?;
                }
                Err(e) => {
                    warn!(character_id, location_id = structure.structure_id, error = %e, "order fetch failed");
                }
            }
        }

        Err(AppError::MarketUnavailable(structure.structure_id))
    }

    /// One region-wide order fetch covers every watched NPC station in that
    /// region; the rows are then split back out per station.
    async fn sweep_npc_stations(&self, stations: &[Structure], watches: &[Watch]) -> Result<()> {
        let mut cache = RegionCache::default();
        let mut by_region: HashMap<i64, Vec<i64>> = HashMap::new();
        for station in stations {
            match self.region_for(station, &mut cache).await {
                Ok(region_id) => by_region.entry(region_id).or_default().push(station.structure_id),
                Err(e) => {
                    warn!(station_id = station.structure_id, error = %e, "region resolution failed");
                }
            }
        }

        for (region_id, station_ids) in by_region {
            let orders = match self.esi.region_orders(region_id).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!(region_id, error = %e, "region sweep failed");
                    continue;
                }
            };
            for (location_id, location_orders) in partition_by_location(orders, &station_ids) {
                self.store_volumes(location_id, &location_orders, watches).await?;
            }
        }
        Ok(())
    }

    async fn region_for(&self, station: &Structure, cache: &mut RegionCache) -> Result<i64> {
        if let Some(region_id) = station.region_id {
            return Ok(region_id);
        }

        let info = self.esi.station_info(station.structure_id).await?;
        let constellation_id = match cache.systems.get(&info.system_id) {
            Some(&id) => id,
            None => {
                let id = self.esi.system_constellation(info.system_id).await?;
                cache.systems.insert(info.system_id, id);
                id
            }
        };
        let region_id = match cache.constellations.get(&constellation_id) {
            Some(&id) => id,
            None => {
                let id = self.esi.constellation_region(constellation_id).await?;
                cache.constellations.insert(constellation_id, id);
                id
            }
        };

        self.structures.set_region(station.structure_id, region_id).await?;
        debug!(station_id = station.structure_id, region_id, "resolved station region");
        Ok(region_id)
    }

    async fn store_volumes(
        &self,
        location_id: i64,
        orders: &[MarketOrder],
        watches: &[Watch],
    ) -> Result<()> {
        let watched_types: HashSet<i64> = watches
            .iter()
            .filter(|w| w.location_id == location_id)
            .map(|w| w.type_id)
            .collect();

        let mut written = 0usize;
        for ((type_id, side), amount) in aggregate_volumes(orders, &watched_types) {
            let snapshot = Snapshot { type_id, location_id, side, amount };
            if self.snapshots.upsert_if_changed(&snapshot).await? {
                written += 1;
            }
        }
        info!(location_id, orders = orders.len(), snapshots = written, "stored volume snapshots");
        Ok(())
    }
}

/// Sum remaining volume per (type, side), restricted to watched types.
fn aggregate_volumes(
    orders: &[MarketOrder],
    watched_types: &HashSet<i64>,
) -> HashMap<(i64, Side), i64> {
    let mut volumes: HashMap<(i64, Side), i64> = HashMap::new();
    for order in orders {
        if !watched_types.contains(&order.type_id) {
            continue;
        }
        let side = Side::from_is_buy(order.is_buy_order);
        *volumes.entry((order.type_id, side)).or_insert(0) += order.volume_remain;
    }
    volumes
}

fn partition_by_location(
    orders: Vec<MarketOrder>,
    wanted_locations: &[i64],
) -> HashMap<i64, Vec<MarketOrder>> {
    let wanted: HashSet<i64> = wanted_locations.iter().copied().collect();
    let mut by_location: HashMap<i64, Vec<MarketOrder>> = HashMap::new();
    for order in orders {
        if wanted.contains(&order.location_id) {
            by_location.entry(order.location_id).or_default().push(order);
        }
    }
    // stations with no matching orders still get an entry so their watched
    // types fall back to the missing-snapshot path consistently
    for &location_id in wanted_locations {
        by_location.entry(location_id).or_default();
    }
    by_location
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{test_pool, AccountRepo, MailRepo};
    use crate::types::{now_secs, Comparator};

    fn order(type_id: i64, location_id: i64, is_buy: bool, volume: i64) -> MarketOrder {
        MarketOrder { type_id, location_id, is_buy_order: is_buy, volume_remain: volume }
    }

    fn test_config() -> Config {
        Config {
            esi_base_url: "http://127.0.0.1:0".to_string(),
            token_url: "http://127.0.0.1:0/token".to_string(),
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            client_id: "app".to_string(),
            client_secret: "secret".to_string(),
            mail_character_id: 0,
            mail_client_id: String::new(),
            mail_client_secret: String::new(),
            mail_refresh_token: String::new(),
        }
    }

    fn watch(type_id: i64, location_id: i64) -> Watch {
        Watch {
            id: 0,
            character_id: 93,
            location_id,
            type_id,
            type_name: "Atron".to_string(),
            side: Side::Sell,
            comparator: Comparator::Lt,
            threshold: 10,
            triggered: false,
            mail_sent: false,
            disabled: false,
            created: now_secs(),
        }
    }

    #[tokio::test]
    async fn store_volumes_aggregates_watched_types_only() {
        let pool = test_pool().await;
        let cfg = test_config();
        let snapshots = SnapshotRepo::new(pool.clone());
        let watches = WatchRepo::new(pool.clone());
        let sweep = MarketSweep::new(
            EsiClient::new(&cfg.esi_base_url).unwrap(),
            AccessTokens::new(&cfg, AccountRepo::new(pool.clone())).unwrap(),
            AuthErrors::new(
                AccountRepo::new(pool.clone()),
                watches.clone(),
                MailRepo::new(pool.clone()),
            ),
            watches,
            StructureRepo::new(pool),
            snapshots.clone(),
        );

        let location_id = 1027847407700;
        let watched = vec![watch(608, location_id)];
        let orders = vec![
            order(608, location_id, false, 30),
            order(608, location_id, false, 12),
            order(999, location_id, false, 5),
        ];

        sweep.store_volumes(location_id, &orders, &watched).await.unwrap();

        let stored = snapshots.find(608, location_id, Side::Sell).await.unwrap().unwrap();
        assert_eq!(stored.amount, 42);
        assert!(snapshots.find(999, location_id, Side::Sell).await.unwrap().is_none());
    }

    #[test]
    fn volumes_sum_per_type_and_side() {
        let orders = vec![
            order(608, 1, false, 10),
            order(608, 1, false, 32),
            order(608, 1, true, 5),
            order(34, 1, false, 1000),
            order(999, 1, false, 7), // not watched
        ];
        let watched: HashSet<i64> = [608, 34].into_iter().collect();

        let volumes = aggregate_volumes(&orders, &watched);
        assert_eq!(volumes[&(608, Side::Sell)], 42);
        assert_eq!(volumes[&(608, Side::Buy)], 5);
        assert_eq!(volumes[&(34, Side::Sell)], 1000);
        assert!(!volumes.contains_key(&(999, Side::Sell)));
    }

    #[test]
    fn region_orders_partition_to_watched_stations_only() {
        let orders = vec![
            order(608, 60003760, false, 1),
            order(608, 60008494, false, 2),
            order(608, 60011866, false, 3), // not watched
        ];
        let by_location = partition_by_location(orders, &[60003760, 60008494, 60004588]);

        assert_eq!(by_location[&60003760].len(), 1);
        assert_eq!(by_location[&60008494].len(), 1);
        // watched but orderless station still present, with no orders
        assert!(by_location[&60004588].is_empty());
        assert!(!by_location.contains_key(&60011866));
    }
}
