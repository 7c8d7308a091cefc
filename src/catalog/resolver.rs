//! Get-or-create against a catalog collection.

use tracing::{debug, info, warn};

use crate::catalog::client::CatalogClient;
use crate::catalog::entities::{CatalogEntity, EntityId, extract_id};
use crate::error::CatalogError;

/// A create that loses a race (409) re-runs the lookup at most this often.
const MAX_CONFLICT_RETRIES: u32 = 1;

#[derive(Debug, Clone)]
pub struct EntityResolver {
    client: CatalogClient,
}

impl EntityResolver {
    pub fn new(client: CatalogClient) -> Self {
        Self { client }
    }

    /// Return the id of the entity matching `lookup`, creating it from
    /// `create` when the lookup misses.
    ///
    /// A 409 on creation means another writer got there first: the lookup is
    /// repeated once with creation disabled. Transport failures are never
    /// retried.
    pub async fn get_or_create<E: CatalogEntity>(
        &self,
        url: &str,
        lookup: Option<&E::Lookup>,
        create: Option<&E::Create>,
    ) -> Result<EntityId, CatalogError> {
        let mut create = create;
        let mut conflict_retries = 0;

        loop {
            if let Some(query) = lookup
                && let Some(id) = self.lookup::<E>(url, query).await?
            {
                return Ok(id);
            }

            let Some(payload) = create else {
                return Err(CatalogError::NotFound {
                    entity: E::NAME,
                    url: url.to_string(),
                });
            };

            debug!(entity = E::NAME, url, payload = ?payload, "Creating catalog entry");
            let reply = self.client.post(url, payload).await?;

            if reply.is_success() {
                let id = extract_id(reply.json()?, E::ID_FIELD).ok_or_else(|| {
                    CatalogError::MissingId {
                        entity: E::NAME,
                        url: url.to_string(),
                        field: E::ID_FIELD,
                    }
                })?;
                info!(entity = E::NAME, id = %id, "Catalog entry created");
                return Ok(id);
            }

            if reply.status == 409 && lookup.is_some() && conflict_retries < MAX_CONFLICT_RETRIES {
                conflict_retries += 1;
                create = None;
                warn!(entity = E::NAME, url, "Create conflicted; retrying lookup");
                continue;
            }

            return Err(CatalogError::Status {
                method: "POST",
                url: url.to_string(),
                status: reply.status,
                body: reply.excerpt(),
            });
        }
    }

    /// `Ok(None)` on 404 or a JSON success without the id field.
    async fn lookup<E: CatalogEntity>(
        &self,
        url: &str,
        query: &E::Lookup,
    ) -> Result<Option<EntityId>, CatalogError> {
        let reply = self.client.get(url, Some(query)).await?;
        if reply.status == 404 {
            debug!(entity = E::NAME, query = ?query, "Catalog lookup missed");
            return Ok(None);
        }
        if !reply.is_success() {
            return Err(CatalogError::Status {
                method: "GET",
                url: url.to_string(),
                status: reply.status,
                body: reply.excerpt(),
            });
        }

        let id = extract_id(reply.json()?, E::ID_FIELD);
        match &id {
            Some(id) => debug!(entity = E::NAME, id = %id, "Catalog lookup hit"),
            None => debug!(entity = E::NAME, query = ?query, "Catalog lookup returned no id"),
        }
        Ok(id)
    }
}
