use tracing::{info, warn};

use crate::auth::{AuthErrors, OutboundAuth};
use crate::db::MailRepo;
use crate::error::Result;
use crate::esi::models::{MailRecipient, MailRequest};
use crate::esi::EsiClient;
use crate::types::{Mail, MailStatus};

/// Sends at most one queued mail per invocation — the scheduler's cadence
/// is the outbound rate limit, and every run leaves a single auditable
/// state change behind.
pub struct MailDispatcher {
    esi: EsiClient,
    outbound: OutboundAuth,
    mail_character_id: i64,
    mails: MailRepo,
    auth_errors: AuthErrors,
}

impl MailDispatcher {
    pub fn new(
        esi: EsiClient,
        outbound: OutboundAuth,
        mail_character_id: i64,
        mails: MailRepo,
        auth_errors: AuthErrors,
    ) -> Self {
        Self { esi, outbound, mail_character_id, mails, auth_errors }
    }

    pub async fn run(&self) -> Result<()> {
        let Some(mail) = self.mails.next_new().await? else {
            info!("no new mails to send");
            return Ok(());
        };
        info!(mail_id = mail.id, recipient = mail.recipient, priority = mail.priority, "dispatching mail");

        let outcome = self.send(&mail).await;
        self.apply_outcome(&mail, outcome).await
    }

    async fn send(&self, mail: &Mail) -> Result<()> {
        let token = self.outbound.token().await?;
        let request = MailRequest {
            recipients: vec![MailRecipient::character(mail.recipient)],
            subject: mail.subject.clone(),
            body: mail.body.clone(),
        };
        self.esi.send_mail(self.mail_character_id, &token, &request).await
    }

    /// Transient upstream trouble leaves the mail queued for the next run;
    /// anything else is terminal for this mail and counts against the
    /// recipient.
    async fn apply_outcome(&self, mail: &Mail, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.mails.set_status(mail.id, MailStatus::Sent).await?;
                self.auth_errors.record_success(mail.recipient).await?;
                info!(mail_id = mail.id, "mail sent");
            }
            Err(e) if e.is_transient() => {
                warn!(mail_id = mail.id, error = %e, "transient mail failure, keeping queued");
            }
            Err(e) => {
                warn!(mail_id = mail.id, recipient = mail.recipient, error = %e, "mail failed");
                self.mails.set_status(mail.id, MailStatus::Failed).await?;
                self.auth_errors.record_failure(mail.recipient).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthErrors;
    use crate::config::{Config, ADMIN_PRIORITY, NOTIFICATION_PRIORITY};
    use crate::db::{test_pool, AccountRepo, WatchRepo};
    use crate::error::AppError;
    use crate::types::Account;

    fn test_config() -> Config {
        Config {
            esi_base_url: "http://127.0.0.1:0".to_string(),
            token_url: "http://127.0.0.1:0/token".to_string(),
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            client_id: "app".to_string(),
            client_secret: "secret".to_string(),
            mail_character_id: 90000001,
            mail_client_id: "mail".to_string(),
            mail_client_secret: "secret".to_string(),
            mail_refresh_token: "refresh".to_string(),
        }
    }

    async fn fixtures() -> (AccountRepo, MailRepo, MailDispatcher) {
        let pool = test_pool().await;
        let accounts = AccountRepo::new(pool.clone());
        let watches = WatchRepo::new(pool.clone());
        let mails = MailRepo::new(pool);
        let cfg = test_config();
        let dispatcher = MailDispatcher::new(
            EsiClient::new(&cfg.esi_base_url).unwrap(),
            OutboundAuth::from_config(&cfg).unwrap(),
            cfg.mail_character_id,
            mails.clone(),
            AuthErrors::new(accounts.clone(), watches, mails.clone()),
        );
        (accounts, mails, dispatcher)
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

    #[tokio::test]
    async fn transient_failure_keeps_mail_queued() {
        let (accounts, mails, dispatcher) = fixtures().await;
        accounts.save(&account(93)).await.unwrap();
        let id = mails.queue(93, "s", "b", NOTIFICATION_PRIORITY).await.unwrap();
        let mail = mails.find(id).await.unwrap().unwrap();

        dispatcher.apply_outcome(&mail, Err(AppError::Transient(503))).await.unwrap();

        assert_eq!(mails.find(id).await.unwrap().unwrap().status, MailStatus::New);
        assert_eq!(accounts.find(93).await.unwrap().unwrap().error_count, 0);
    }

    #[tokio::test]
    async fn success_marks_sent_and_clears_errors() {
        let (accounts, mails, dispatcher) = fixtures().await;
        let mut acc = account(93);
        acc.error_count = 3;
        accounts.save(&acc).await.unwrap();
        let id = mails.queue(93, "s", "b", NOTIFICATION_PRIORITY).await.unwrap();
        let mail = mails.find(id).await.unwrap().unwrap();

        dispatcher.apply_outcome(&mail, Ok(())).await.unwrap();

        assert_eq!(mails.find(id).await.unwrap().unwrap().status, MailStatus::Sent);
        assert_eq!(accounts.find(93).await.unwrap().unwrap().error_count, 0);
    }

    #[tokio::test]
    async fn five_hard_failures_deactivate_the_recipient() {
        let (accounts, mails, dispatcher) = fixtures().await;
        accounts.save(&account(93)).await.unwrap();

        for _ in 0..5 {
            let id = mails.queue(93, "s", "b", NOTIFICATION_PRIORITY).await.unwrap();
            let mail = mails.find(id).await.unwrap().unwrap();
            dispatcher
                .apply_outcome(&mail, Err(AppError::Unclassified(400)))
                .await
                .unwrap();
            assert_eq!(mails.find(id).await.unwrap().unwrap().status, MailStatus::Failed);
        }

        assert!(accounts.find(93).await.unwrap().is_none());
        let deactivations: Vec<_> = mails
            .all()
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.priority == ADMIN_PRIORITY)
            .collect();
        assert_eq!(deactivations.len(), 1);
        assert_eq!(deactivations[0].recipient, 93);
        assert_eq!(deactivations[0].status, MailStatus::New);
    }
}
