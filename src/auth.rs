use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{
    Config, ADMIN_PRIORITY, HTTP_TIMEOUT_SECS, MAX_AUTH_ERRORS, TOKEN_EXPIRY_BUFFER_SECS,
};
use crate::db::{AccountRepo, MailRepo, WatchRepo};
use crate::error::{AppError, Result};
use crate::esi::models::AccessTokenResponse;
use crate::types::now_secs;

const DEACTIVATION_SUBJECT: &str = "Market watch deactivated";
const DEACTIVATION_BODY: &str = "Your market watch account has been deactivated after repeated \
authorization failures.\n\nYour watches are kept but will no longer be checked. Log in again at \
https://eve-market-watch.firebaseapp.com to restore them.";

/// Exchange a refresh token for an access token at the SSO token endpoint.
/// 4xx means the credential itself is bad; 5xx is the endpoint's problem.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<AccessTokenResponse> {
    let response = http
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
        .send()
        .await?;
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else if status.as_u16() >= 500 {
        Err(AppError::Transient(status.as_u16()))
    } else {
        warn!(status = status.as_u16(), "token refresh rejected");
        Err(AppError::InvalidCredential(status.as_u16()))
    }
}

/// Per-account access tokens, cached on the account row and refreshed
/// through the SSO when the cached one is about to expire.
#[derive(Clone)]
pub struct AccessTokens {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    accounts: AccountRepo,
}

impl AccessTokens {
    pub fn new(cfg: &Config, accounts: AccountRepo) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            token_url: cfg.token_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            accounts,
        })
    }

    pub async fn for_character(&self, character_id: i64) -> Result<String> {
        let Some(mut account) = self.accounts.find(character_id).await? else {
            return Err(AppError::UnknownAccount(character_id));
        };

        if let (Some(token), Some(expiry)) = (&account.access_token, account.access_token_expiry)
        {
            if now_secs() < expiry {
                return Ok(token.clone());
            }
        }

        let fresh = refresh_access_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &account.refresh_token,
        )
        .await?;
        debug!(character_id, expires_in = fresh.expires_in, "refreshed access token");

        account.access_token = Some(fresh.access_token.clone());
        account.access_token_expiry =
            Some(now_secs() + fresh.expires_in - TOKEN_EXPIRY_BUFFER_SECS);
        account.error_count = 0;
        self.accounts.save(&account).await?;
        Ok(fresh.access_token)
    }
}

/// Credentials of the dedicated outbound-mail character, refreshed per use.
pub struct OutboundAuth {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl OutboundAuth {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if cfg.mail_client_id.is_empty()
            || cfg.mail_client_secret.is_empty()
            || cfg.mail_refresh_token.is_empty()
        {
            return Err(AppError::Config(
                "MAIL_CLIENT_ID, MAIL_CLIENT_SECRET and MAIL_REFRESH_TOKEN must be set".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            token_url: cfg.token_url.clone(),
            client_id: cfg.mail_client_id.clone(),
            client_secret: cfg.mail_client_secret.clone(),
            refresh_token: cfg.mail_refresh_token.clone(),
        })
    }

    pub async fn token(&self) -> Result<String> {
        let response = refresh_access_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &self.refresh_token,
        )
        .await?;
        Ok(response.access_token)
    }
}

/// Tracks the consecutive-error counter on accounts. Reaching the limit is
/// terminal: one deactivation mail is queued, the account's watches are
/// disabled, and the account row is deleted — a deleted row cannot be
/// penalized twice, so the mail goes out exactly once.
#[derive(Clone)]
pub struct AuthErrors {
    accounts: AccountRepo,
    watches: WatchRepo,
    mails: MailRepo,
}

impl AuthErrors {
    pub fn new(accounts: AccountRepo, watches: WatchRepo, mails: MailRepo) -> Self {
        Self { accounts, watches, mails }
    }

    pub async fn record_failure(&self, character_id: i64) -> Result<()> {
        let Some(mut account) = self.accounts.find(character_id).await? else {
            return Ok(());
        };
        account.error_count += 1;
        if account.error_count >= MAX_AUTH_ERRORS {
            info!(character_id, errors = account.error_count, "deactivating account");
            self.mails
                .queue(character_id, DEACTIVATION_SUBJECT, DEACTIVATION_BODY, ADMIN_PRIORITY)
                .await?;
            self.watches.disable_for_character(character_id).await?;
            self.accounts.delete(character_id).await?;
        } else {
            debug!(character_id, errors = account.error_count, "recorded auth failure");
            self.accounts.save(&account).await?;
        }
        Ok(())
    }

    pub async fn record_success(&self, character_id: i64) -> Result<()> {
        let Some(mut account) = self.accounts.find(character_id).await? else {
            return Ok(());
        };
        if account.error_count != 0 {
            account.error_count = 0;
            self.accounts.save(&account).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::{Account, Comparator, Side, Watch};

    async fn fixtures() -> (AccountRepo, WatchRepo, MailRepo, AuthErrors) {
        let pool = test_pool().await;
        let accounts = AccountRepo::new(pool.clone());
        let watches = WatchRepo::new(pool.clone());
        let mails = MailRepo::new(pool);
        let errors = AuthErrors::new(accounts.clone(), watches.clone(), mails.clone());
        (accounts, watches, mails, errors)
    }

    fn account(character_id: i64) -> Account {
        Account {
            character_id,
            refresh_token: "refresh".to_string(),
            access_token: None,
            access_token_expiry: None,
            error_count: 0,
        }
    }

    fn watch(character_id: i64) -> Watch {
        Watch {
            id: 0,
            character_id,
            location_id: 1027847407700,
            type_id: 608,
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
    async fn fifth_failure_deactivates_exactly_once() {
        let (accounts, watches, mails, errors) = fixtures().await;
        accounts.save(&account(93)).await.unwrap();
        watches.create(&watch(93)).await.unwrap();

        for _ in 0..4 {
            errors.record_failure(93).await.unwrap();
        }
        assert_eq!(accounts.find(93).await.unwrap().unwrap().error_count, 4);
        assert!(mails.all().await.unwrap().is_empty());

        errors.record_failure(93).await.unwrap();
        assert!(accounts.find(93).await.unwrap().is_none());
        assert!(watches.enabled().await.unwrap().is_empty());
        assert_eq!(watches.disabled().await.unwrap().len(), 1);

        let queued = mails.all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].recipient, 93);
        assert_eq!(queued[0].priority, ADMIN_PRIORITY);

        // a sixth report must not queue a second mail
        errors.record_failure(93).await.unwrap();
        assert_eq!(mails.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn success_resets_the_counter() {
        let (accounts, _watches, _mails, errors) = fixtures().await;
        accounts.save(&account(93)).await.unwrap();

        errors.record_failure(93).await.unwrap();
        errors.record_failure(93).await.unwrap();
        errors.record_success(93).await.unwrap();
        assert_eq!(accounts.find(93).await.unwrap().unwrap().error_count, 0);
    }
}
