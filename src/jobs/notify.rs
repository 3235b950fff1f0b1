use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use tracing::{info, warn};

use crate::config::{MAIL_CHUNK_SIZE, NOTIFICATION_PRIORITY};
use crate::db::{AccountRepo, MailRepo, StructureRepo, WatchRepo};
use crate::error::Result;
use crate::types::{Structure, Watch};

const MAIL_SUBJECT: &str = "Market watch notification";
const MAIL_FOOTER: &str = "This mail was sent to you from https://eve-market-watch.firebaseapp.com";

/// Turns newly triggered watches into queued notification mails, one mail
/// per account per chunk of at most 100 watches.
pub struct NotificationBuilder {
    watches: WatchRepo,
    structures: StructureRepo,
    accounts: AccountRepo,
    mails: MailRepo,
}

impl NotificationBuilder {
    pub fn new(
        watches: WatchRepo,
        structures: StructureRepo,
        accounts: AccountRepo,
        mails: MailRepo,
    ) -> Self {
        Self { watches, structures, accounts, mails }
    }

    pub async fn run(&self) -> Result<()> {
        let known_accounts: HashSet<i64> =
            self.accounts.all().await?.into_iter().map(|a| a.character_id).collect();

        let mut pending: Vec<Watch> = self
            .watches
            .triggered_unnotified()
            .await?
            .into_iter()
            .filter(|w| known_accounts.contains(&w.character_id))
            .collect();
        pending.sort_by(|a, b| {
            a.type_name.to_lowercase().cmp(&b.type_name.to_lowercase())
        });

        if pending.is_empty() {
            info!("no watches awaiting notification");
            return Ok(());
        }
        info!(watches = pending.len(), "creating notification mails");

        let mut by_account: BTreeMap<i64, Vec<Watch>> = BTreeMap::new();
        for watch in pending {
            by_account.entry(watch.character_id).or_default().push(watch);
        }

        for (character_id, group) in by_account {
            for chunk in group.chunks(MAIL_CHUNK_SIZE) {
                // Flags go first: a crash between the two loses this chunk's
                // mail instead of sending it twice.
                let ids: Vec<i64> = chunk.iter().map(|w| w.id).collect();
                self.watches.mark_mail_sent(&ids).await?;

                let body = self.build_body(chunk).await?;
                let mail_id = self
                    .mails
                    .queue(character_id, MAIL_SUBJECT, &body, NOTIFICATION_PRIORITY)
                    .await?;
                info!(character_id, mail_id, watches = chunk.len(), "queued notification mail");
            }
        }
        Ok(())
    }

    async fn build_body(&self, watches: &[Watch]) -> Result<String> {
        let mut location_ids: Vec<i64> = Vec::new();
        for watch in watches {
            if !location_ids.contains(&watch.location_id) {
                location_ids.push(watch.location_id);
            }
        }

        let mut body = String::new();
        for location_id in location_ids {
            let Some(structure) = self.structures.find(location_id).await? else {
                warn!(location_id, "no structure record for notification, skipping section");
                continue;
            };
            let section: Vec<&Watch> =
                watches.iter().filter(|w| w.location_id == location_id).collect();
            render_location_section(&mut body, &structure, &section);
        }
        body.push_str(MAIL_FOOTER);
        Ok(body)
    }
}

/// One mail section: the location as an in-game info link, then one line
/// per watch, e.g. `<url=showinfo:608>Atron</url> (sell) is below 10 units.`
fn render_location_section(out: &mut String, structure: &Structure, watches: &[&Watch]) {
    let _ = write!(
        out,
        "<url=showinfo:{}//{}>{}</url>\n\n",
        structure.type_id, structure.structure_id, structure.structure_name
    );
    for watch in watches {
        let _ = writeln!(
            out,
            "<url=showinfo:{}>{}</url> ({}) is {} {} units.",
            watch.type_id,
            watch.type_name,
            watch.side,
            watch.comparator.phrase(),
            watch.threshold
        );
    }
    out.push('\n');
}
