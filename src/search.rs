use std::collections::HashMap;

use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::auth::AccessTokens;
use crate::config::{
    IGNORED_STRUCTURE_TYPES, MAX_CONCURRENT_RESOLVES, MIN_SEARCH_TERM_LEN, SEARCH_RESULT_CAP,
};
use crate::db::StructureRepo;
use crate::error::Result;
use crate::esi::EsiClient;
use crate::types::Structure;

/// Free-text market location search. NPC stations come from the public
/// search, player structures from the acting character's scoped search;
/// both candidate sets resolve concurrently and failures only cost the
/// affected candidate.
pub struct StructureSearch {
    esi: EsiClient,
    structures: StructureRepo,
    tokens: AccessTokens,
}

fn is_market_candidate(type_id: i64) -> bool {
    !IGNORED_STRUCTURE_TYPES.contains(&type_id)
}

impl StructureSearch {
    pub fn new(esi: EsiClient, structures: StructureRepo, tokens: AccessTokens) -> Self {
        Self { esi, structures, tokens }
    }

    pub async fn search(&self, character_id: i64, term: &str) -> Result<Vec<Structure>> {
        let term = term.trim();
        if term.len() < MIN_SEARCH_TERM_LEN {
            return Ok(Vec::new());
        }
        let token = self.tokens.for_character(character_id).await?;
        let known: HashMap<i64, Structure> = self
            .structures
            .all()
            .await?
            .into_iter()
            .map(|s| (s.structure_id, s))
            .collect();

        let (stations, player_structures) = tokio::join!(
            self.resolve_stations(term, &known),
            self.resolve_structures(character_id, term, &token, &known),
        );

        let results = merge_results(stations?, player_structures?);
        info!(character_id, term, results = results.len(), "location search complete");
        Ok(results)
    }

    async fn resolve_stations(
        &self,
        term: &str,
        known: &HashMap<i64, Structure>,
    ) -> Result<Vec<Structure>> {
        let candidate_ids = match self.esi.search_stations(term).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(term, error = %e, "station search failed");
                return Ok(Vec::new());
            }
        };

        let (mut found, unknown) = split_known(&candidate_ids, known);
        let esi = &self.esi;
        let resolved = stream::iter(unknown.into_iter().take(MAX_CONCURRENT_RESOLVES))
            .map(|station_id| async move { (station_id, esi.station_info(station_id).await) })
            .buffer_unordered(MAX_CONCURRENT_RESOLVES)
            .collect::<Vec<_>>()
            .await;

        for (station_id, outcome) in resolved {
            match outcome {
                Ok(station) => {
                    let structure = Structure {
                        structure_id: station_id,
                        structure_name: station.name,
                        type_id: station.type_id,
                        npc_station: true,
                        market_service: station.services.iter().any(|s| s == "market"),
                        region_id: None,
                    };
                    self.structures.save(&structure).await?;
                    found.push(structure);
                }
                Err(e) => warn!(station_id, error = %e, "station resolution failed"),
            }
        }

        found.retain(|s| s.market_service && is_market_candidate(s.type_id));
        Ok(found)
    }

    async fn resolve_structures(
        &self,
        character_id: i64,
        term: &str,
        token: &str,
        known: &HashMap<i64, Structure>,
    ) -> Result<Vec<Structure>> {
        let candidate_ids = match self.esi.search_structures(character_id, term, token).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(character_id, term, error = %e, "structure search failed");
                return Ok(Vec::new());
            }
        };

        let (mut found, unknown) = split_known(&candidate_ids, known);
        let esi = &self.esi;
        let resolved = stream::iter(unknown.into_iter().take(MAX_CONCURRENT_RESOLVES))
            .map(|structure_id| async move {
                (structure_id, esi.structure_info(structure_id, token).await)
            })
            .buffer_unordered(MAX_CONCURRENT_RESOLVES)
            .collect::<Vec<_>>()
            .await;

        for (structure_id, outcome) in resolved {
            match outcome {
                Ok(info) => {
                    let structure = Structure {
                        structure_id,
                        structure_name: info.name,
                        type_id: info.type_id.unwrap_or_default(),
                        npc_station: false,
                        market_service: false,
                        region_id: None,
                    };
                    self.structures.save(&structure).await?;
                    found.push(structure);
                }
                Err(e) => warn!(structure_id, error = %e, "structure resolution failed"),
            }
        }

        found.retain(|s| is_market_candidate(s.type_id));
        Ok(found)
    }
}

/// Partition candidates into already-known structures and ids that still
/// need a resolution call. Known non-market types are dropped here, before
/// any network round trip.
fn split_known(
    candidate_ids: &[i64],
    known: &HashMap<i64, Structure>,
) -> (Vec<Structure>, Vec<i64>) {
    let mut hits = Vec::new();
    let mut unknown = Vec::new();
    for &id in candidate_ids {
        match known.get(&id) {
            Some(s) if is_market_candidate(s.type_id) => hits.push(s.clone()),
            Some(_) => {}
            None => unknown.push(id),
        }
    }
    (hits, unknown)
}

fn merge_results(stations: Vec<Structure>, structures: Vec<Structure>) -> Vec<Structure> {
    let mut merged = stations;
    merged.extend(structures);
    merged.sort_by_key(|s| s.structure_id);
    merged.dedup_by_key(|s| s.structure_id);
    merged.sort_by(|a, b| {
        a.structure_name
            .to_lowercase()
            .cmp(&b.structure_name.to_lowercase())
    });
    merged.truncate(SEARCH_RESULT_CAP);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(id: i64, name: &str, type_id: i64) -> Structure {
        Structure {
            structure_id: id,
            structure_name: name.to_string(),
            type_id,
            npc_station: false,
            market_service: false,
            region_id: None,
        }
    }

    #[test]
    fn merge_sorts_case_insensitively_and_caps() {
        let stations: Vec<Structure> = (0..8)
            .map(|i| structure(100 + i, &format!("Zeta {i}"), 1529))
            .collect();
        let structures = vec![
            structure(1, "amarr trade hub", 35832),
            structure(2, "Jita Freeport", 35834),
        ];

        let merged = merge_results(stations, structures);
        assert_eq!(merged.len(), SEARCH_RESULT_CAP);
        assert_eq!(merged[0].structure_name, "amarr trade hub");
        assert_eq!(merged[1].structure_name, "Jita Freeport");
    }

    #[test]
    fn merge_deduplicates_by_id() {
        let a = vec![structure(7, "Dup", 1529)];
        let b = vec![structure(7, "Dup", 1529)];
        assert_eq!(merge_results(a, b).len(), 1);
    }

    #[test]
    fn known_non_market_types_are_dropped_before_resolution() {
        let mut known = HashMap::new();
        known.insert(10, structure(10, "Refinery", 35835)); // athanor
        known.insert(11, structure(11, "Freeport", 35834));

        let (hits, unknown) = split_known(&[10, 11, 12], &known);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].structure_id, 11);
        assert_eq!(unknown, vec![12]);
    }
}
