mod auth;
mod config;
mod db;
mod error;
mod esi;
mod jobs;
mod search;
mod types;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::auth::{AccessTokens, AuthErrors, OutboundAuth};
use crate::config::Config;
use crate::db::{AccountRepo, MailRepo, SnapshotRepo, StructureRepo, WatchRepo};
use crate::error::{AppError, Result};
use crate::esi::EsiClient;
use crate::jobs::{
    MailDispatcher, MarketSweep, NotificationBuilder, WatchEvaluator, WatchReconciler,
};
use crate::search::StructureSearch;

const USAGE: &str = "usage: market-watch <sweep|evaluate|notify|dispatch|reconcile|cycle\
                     |search <character_id> <term>|bulk <subject> <body> [character_id]>";

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(cfg, &args).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, args: &[String]) -> Result<()> {
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let accounts = AccountRepo::new(pool.clone());
    let watches = WatchRepo::new(pool.clone());
    let structures = StructureRepo::new(pool.clone());
    let snapshots = SnapshotRepo::new(pool.clone());
    let mails = MailRepo::new(pool.clone());

    let esi = EsiClient::new(&cfg.esi_base_url)?;
    let tokens = AccessTokens::new(&cfg, accounts.clone())?;
    let auth_errors = AuthErrors::new(accounts.clone(), watches.clone(), mails.clone());

    match args.first().map(String::as_str) {
        Some("sweep") => {
            MarketSweep::new(esi, tokens, auth_errors, watches, structures, snapshots)
                .run()
                .await
        }
        Some("evaluate") => WatchEvaluator::new(watches, snapshots).run().await,
        Some("notify") => {
            NotificationBuilder::new(watches, structures, accounts, mails).run().await
        }
        Some("dispatch") => dispatcher(&cfg, esi, mails, auth_errors)?.run().await,
        Some("reconcile") => {
            WatchReconciler::new(esi, tokens, watches, structures).run().await
        }
        Some("cycle") => {
            MarketSweep::new(
                esi.clone(),
                tokens,
                auth_errors.clone(),
                watches.clone(),
                structures.clone(),
                snapshots.clone(),
            )
            .run()
            .await?;
            WatchEvaluator::new(watches.clone(), snapshots).run().await?;
            NotificationBuilder::new(watches, structures, accounts, mails.clone())
                .run()
                .await?;
            dispatcher(&cfg, esi, mails, auth_errors)?.run().await
        }
        Some("search") => {
            let character_id: i64 = args
                .get(1)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| AppError::Config(USAGE.to_string()))?;
            let term = args.get(2).ok_or_else(|| AppError::Config(USAGE.to_string()))?;

            let results = StructureSearch::new(esi, structures, tokens)
                .search(character_id, term)
                .await?;
            for location in &results {
                println!("{}", location.structure_name);
            }
            Ok(())
        }
        Some("bulk") => {
            let subject = args.get(1).ok_or_else(|| AppError::Config(USAGE.to_string()))?;
            let body = args.get(2).ok_or_else(|| AppError::Config(USAGE.to_string()))?;
            let recipient: Option<i64> = args.get(3).and_then(|s| s.parse().ok());
            queue_bulk(&accounts, &mails, subject, body, recipient).await
        }
        _ => Err(AppError::Config(USAGE.to_string())),
    }
}

/// Administrative announcements enter the same queue as watch mails, at
/// the lower priority, addressed to one account or to everyone.
async fn queue_bulk(
    accounts: &AccountRepo,
    mails: &MailRepo,
    subject: &str,
    body: &str,
    recipient: Option<i64>,
) -> Result<()> {
    let recipients: Vec<i64> = match recipient {
        Some(character_id) => match accounts.find(character_id).await? {
            Some(account) => vec![account.character_id],
            None => Vec::new(),
        },
        None => accounts.all().await?.into_iter().map(|a| a.character_id).collect(),
    };
    for character_id in &recipients {
        mails.queue(*character_id, subject, body, config::ADMIN_PRIORITY).await?;
    }
    info!(mails = recipients.len(), "queued bulk notification");
    Ok(())
}

fn dispatcher(
    cfg: &Config,
    esi: EsiClient,
    mails: MailRepo,
    auth_errors: AuthErrors,
) -> Result<MailDispatcher> {
    if cfg.mail_character_id == 0 {
        return Err(AppError::Config("MAIL_CHARACTER_ID must be set".to_string()));
    }
    Ok(MailDispatcher::new(
        esi,
        OutboundAuth::from_config(cfg)?,
        cfg.mail_character_id,
        mails,
        auth_errors,
    ))
}
