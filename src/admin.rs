//! Destructive store-side maintenance commands.
//!
//! None of these take part in the ingestion guarantees. Each loop records
//! failures and keeps going; nothing here aborts half-way.

use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contract::StoreClient;
use crate::error::StoreError;

/// Pause after each user deletion so the store is not flooded.
pub const USER_DELETION_PACING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletionReport {
    pub deleted: Vec<String>,
    /// Identifier plus reason.
    pub failed: Vec<(String, String)>,
}

impl DeletionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete a single collection.
pub async fn delete_collection<C>(client: &C, id: Uuid) -> Result<(), StoreError>
where
    C: StoreClient + ?Sized,
{
    info!(collection_id = %id, "Attempting to delete collection");
    match client.delete_collection(id).await {
        Ok(true) => {
            info!(collection_id = %id, "Deleted collection");
            Ok(())
        }
        Ok(false) => {
            error!(collection_id = %id, "Store refused to delete collection");
            Err(StoreError::Other(format!("store refused to delete collection {id}")))
        }
        Err(e) => {
            error!(collection_id = %id, error = %e, "Failed to delete collection. It might not exist");
            Err(e)
        }
    }
}

/// Delete every collection in the store.
pub async fn delete_all_collections<C>(client: &C) -> Result<DeletionReport, StoreError>
where
    C: StoreClient + ?Sized,
{
    warn!("Initiating deletion of ALL collections. This action is irreversible!");
    let collections = client.list_collections().await?;
    let mut report = DeletionReport::default();
    if collections.is_empty() {
        info!("No collections found to delete");
        return Ok(report);
    }
    info!(count = collections.len(), "Found collections");

    for collection in collections {
        let id = collection.id.to_string();
        debug!(collection_id = %id, name = %collection.name, "Deleting collection");
        match client.delete_collection(collection.id).await {
            Ok(true) => {
                info!(collection_id = %id, "Deleted collection");
                report.deleted.push(id);
            }
            Ok(false) => {
                error!(collection_id = %id, "Store refused to delete collection");
                report.failed.push((id, "store reported failure".to_string()));
            }
            Err(e) => {
                error!(collection_id = %id, error = %e, "Failed to delete collection");
                report.failed.push((id, e.to_string()));
            }
        }
    }

    info!(deleted = report.deleted.len(), failed = report.failed.len(), "Finished deleting collections");
    Ok(report)
}

/// Delete every user that is not a superuser.
pub async fn delete_non_superusers<C>(client: &C) -> Result<DeletionReport, StoreError>
where
    C: StoreClient + ?Sized,
{
    info!("Fetching list of users");
    let users = client.list_users().await?;
    let mut report = DeletionReport::default();

    for user in users.into_iter().filter(|u| !u.is_superuser) {
        debug!(email = %user.email, "Deleting user");
        match client.delete_user(user.id, "").await {
            Ok(true) => {
                info!(email = %user.email, "Deleted user");
                report.deleted.push(user.email);
            }
            Ok(false) => {
                error!(email = %user.email, "Store refused to delete user");
                report.failed.push((user.email, "store reported failure".to_string()));
            }
            Err(e) => {
                error!(email = %user.email, error = %e, "Failed to delete user");
                report.failed.push((user.email, e.to_string()));
            }
        }
        tokio::time::sleep(USER_DELETION_PACING).await;
    }

    if !report.is_clean() {
        error!(count = report.failed.len(), "Could not delete some users");
    }
    Ok(report)
}
