use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::auth::AccessTokens;
use crate::db::{StructureRepo, WatchRepo};
use crate::error::Result;
use crate::esi::EsiClient;

/// Periodically re-probes structures whose watches were disabled by an ACL
/// denial. NPC stations never get auto-disabled, so they are skipped here.
pub struct WatchReconciler {
    esi: EsiClient,
    tokens: AccessTokens,
    watches: WatchRepo,
    structures: StructureRepo,
}

impl WatchReconciler {
    pub fn new(
        esi: EsiClient,
        tokens: AccessTokens,
        watches: WatchRepo,
        structures: StructureRepo,
    ) -> Self {
        Self { esi, tokens, watches, structures }
    }

    pub async fn run(&self) -> Result<()> {
        let disabled = self.watches.disabled().await?;
        let pairs: BTreeSet<(i64, i64)> =
            disabled.iter().map(|w| (w.character_id, w.location_id)).collect();
        info!(watches = disabled.len(), pairs = pairs.len(), "re-probing disabled watches");

        for (character_id, location_id) in pairs {
            let Some(structure) = self.structures.find(location_id).await? else {
                continue;
            };
            if structure.npc_station {
                continue;
            }

            let token = match self.tokens.for_character(character_id).await {
                Ok(token) => token,
                Err(e) => {
                    warn!(character_id, error = %e, "no usable credential for re-probe");
                    continue;
                }
            };

            match self.esi.probe_structure_market(location_id, &token).await {
                Ok(()) => {
                    info!(character_id, location_id, "market access restored, re-enabling watches");
                    self.watches.enable_at_location(character_id, location_id).await?;
                }
                Err(e) => {
                    debug!(character_id, location_id, error = %e, "market access still unavailable");
                }
            }
        }
        Ok(())
    }
}
