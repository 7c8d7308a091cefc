//! One polling cycle: credential → mailbox session → per-message pipeline.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use crate::catalog::{
    App, AppLookup, CatalogClient, EntityId, EntityResolver, ExpenseRecord, NewApp,
    NewPaymentMethod, PaymentMethod, PaymentMethodLookup, RecordSubmitter,
};
use crate::config::Config;
use crate::credentials::{CredentialCipher, MailCredential};
use crate::error::{self, CredentialError, MessageError};
use crate::mail::{BodyKind, Mailbox, RawMessage, parse_message};
use crate::pipeline::classifier::PaymentClassifier;
use crate::pipeline::types::{CycleReport, Outcome, SkipReason};
use crate::pipeline::value::{extract_value_text, parse_amount};

/// Drives the receipt pipeline. Messages are processed strictly in order,
/// one at a time; a failing message never stops the ones after it.
pub struct PipelineOrchestrator {
    config: Config,
    mailbox: Arc<dyn Mailbox>,
    client: CatalogClient,
    resolver: EntityResolver,
    submitter: RecordSubmitter,
    classifier: PaymentClassifier,
    cipher: CredentialCipher,
    user_id: EntityId,
}

impl PipelineOrchestrator {
    pub fn new(config: Config, mailbox: Arc<dyn Mailbox>) -> error::Result<Self> {
        let client = CatalogClient::from_config(&config.catalog)?;
        let cipher = CredentialCipher::from_secret(&config.encryption_key)?;
        let resolver = EntityResolver::new(client.clone());
        let submitter = RecordSubmitter::new(client.clone(), config.catalog.records_url.clone());
        let user_id = EntityId::from_config(&config.user_id);

        Ok(Self {
            config,
            mailbox,
            client,
            resolver,
            submitter,
            classifier: PaymentClassifier::default_rules(),
            cipher,
            user_id,
        })
    }

    /// Run a cycle every poll interval until `shutdown` resolves.
    ///
    /// `shutdown` is polled for the whole run, so a request that arrives
    /// mid-cycle stops the loop as soon as that cycle ends.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let poll_interval = self.config.poll_interval;

        loop {
            self.run_cycle().await;

            info!("Next check in {}s", poll_interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = &mut shutdown => return,
            }
        }
    }

    /// Run one cycle. Credential, login and search failures end the cycle
    /// early and are reported through the log. Each id is fetched only when
    /// the previous message is done; a failed fetch counts as a failure.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let credential = match self.load_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                error!(
                    user_id = %self.user_id,
                    error = %e,
                    "Could not obtain IMAP credential; skipping cycle"
                );
                return report;
            }
        };
        info!(login = %credential.login, "IMAP credential decrypted");

        let mut session = match self.mailbox.open(&credential).await {
            Ok(session) => session,
            Err(e) => {
                error!(
                    login = %credential.login,
                    error = %e,
                    "Mailbox access failed; skipping cycle"
                );
                return report;
            }
        };
        drop(credential);

        let ids = match session.search_unseen().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Unseen search failed; skipping cycle");
                session.close().await;
                return report;
            }
        };

        report.seen = ids.len();
        for id in &ids {
            let raw = match session.fetch(id).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(id = %id, error = %e, "Failed to fetch message; skipping");
                    report.failed += 1;
                    continue;
                }
            };
            match self.process_message(&raw).await {
                Ok(outcome) => {
                    if let Outcome::Skipped(reason) = &outcome {
                        info!(id = %raw.id, reason = %reason, "Message skipped");
                    }
                    report.record(&outcome);
                }
                Err(e) => {
                    warn!(id = %raw.id, error = %e, "Message failed");
                    report.failed += 1;
                }
            }
        }
        session.close().await;

        info!(
            seen = report.seen,
            submitted = report.submitted,
            skipped = report.skipped,
            failed = report.failed,
            "Cycle complete"
        );
        report
    }

    /// Fetch the stored credential and decrypt its password.
    async fn load_credential(&self) -> Result<MailCredential, CredentialError> {
        let catalog = &self.config.catalog;
        let (login, encrypted) = self
            .client
            .fetch_stored_credential(&catalog.credentials_url_template, &self.config.user_id)
            .await?;
        let password = self.cipher.decrypt(&encrypted)?;
        if password.expose_secret().is_empty() {
            return Err(CredentialError::Decrypt("decrypted password is empty".into()));
        }
        Ok(MailCredential { login, password })
    }

    /// Take one raw message from parse through submission.
    pub async fn process_message(&self, raw: &RawMessage) -> Result<Outcome, MessageError> {
        let parsed = parse_message(&raw.bytes);
        info!(
            id = %raw.id,
            sender = %parsed.sender,
            subject = %parsed.subject,
            date = ?parsed.sent_at,
            "Processing message"
        );

        if !self.config.allowed_senders.allows(&parsed.sender) {
            return Ok(Outcome::Skipped(SkipReason::SenderNotAllowed));
        }

        let app_id = self
            .resolver
            .get_or_create::<App>(
                &self.config.catalog.apps_url,
                Some(&AppLookup {
                    email: parsed.sender.clone(),
                }),
                Some(&NewApp::for_sender(&parsed.sender)),
            )
            .await
            .map_err(|source| MessageError::Resolution {
                entity: "app",
                key: parsed.sender.clone(),
                source,
            })?;

        if parsed.body_kind == BodyKind::None || parsed.body.trim().is_empty() {
            return Ok(Outcome::Skipped(SkipReason::EmptyBody));
        }
        debug!(id = %raw.id, kind = parsed.body_kind.label(), "Primary body selected");

        let payment = self
            .classifier
            .classify(&parsed.sender, &parsed.body, parsed.body_kind);
        let value_text = extract_value_text(&parsed.sender, &parsed.body);
        match &value_text {
            Some(text) => debug!(id = %raw.id, value = %text, "Value extracted"),
            None => debug!(id = %raw.id, "No value extracted"),
        }
        let amount = value_text.as_deref().and_then(parse_amount);

        let payment_method_id = self
            .resolver
            .get_or_create::<PaymentMethod>(
                &self.config.catalog.payment_methods_url,
                Some(&PaymentMethodLookup {
                    description: payment.label.clone(),
                }),
                Some(&NewPaymentMethod::for_label(&payment.label)),
            )
            .await
            .map_err(|source| MessageError::Resolution {
                entity: "payment method",
                key: payment.label.clone(),
                source,
            })?;

        let Some(amount) = amount else {
            return Ok(Outcome::Skipped(SkipReason::MissingAmount));
        };
        let Some(sent_at) = parsed.sent_at else {
            return Ok(Outcome::Skipped(SkipReason::MissingDate));
        };

        let record = ExpenseRecord {
            date: sent_at.date_naive(),
            amount,
            card_last4: payment.card_last4,
            payment_method_id,
            app_id,
            user_id: self.user_id.clone(),
        };
        self.submitter
            .submit(&record)
            .await
            .map_err(MessageError::Submission)?;

        Ok(Outcome::Submitted)
    }
}
