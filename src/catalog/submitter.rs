//! Ledger record submission.

use tracing::info;

use crate::catalog::client::CatalogClient;
use crate::catalog::entities::ExpenseRecord;
use crate::error::CatalogError;

/// POSTs finished records to the ledger. No local retry or queue.
#[derive(Debug, Clone)]
pub struct RecordSubmitter {
    client: CatalogClient,
    url: String,
}

impl RecordSubmitter {
    pub fn new(client: CatalogClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn submit(&self, record: &ExpenseRecord) -> Result<(), CatalogError> {
        let reply = self.client.post(&self.url, record).await?;
        if !reply.is_success() {
            return Err(CatalogError::Status {
                method: "POST",
                url: self.url.clone(),
                status: reply.status,
                body: reply.excerpt(),
            });
        }
        info!(
            date = %record.date,
            amount = %record.amount,
            app = %record.app_id,
            payment_method = %record.payment_method_id,
            "Expense recorded"
        );
        Ok(())
    }
}
