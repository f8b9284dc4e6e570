//! Startup seeding, run before the server accepts traffic

use bookish_shared::{AccountStore, Role, StoreError, StoreResult, DEFAULT_ROLE};
use time::OffsetDateTime;

/// Create the default role if it does not exist yet. Safe to run on every start.
pub async fn seed_default_roles(store: &dyn AccountStore, now: OffsetDateTime) -> StoreResult<()> {
    if store.find_role_by_name(DEFAULT_ROLE).await?.is_some() {
        tracing::debug!(role = DEFAULT_ROLE, "Default role already present");
        return Ok(());
    }

    match store.save_role(&Role::new(DEFAULT_ROLE, now)).await {
        Ok(role) => {
            tracing::info!(role = %role.name, role_id = %role.id, "Seeded default role");
            Ok(())
        }
        // Another instance seeded it between our read and write
        Err(StoreError::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookish_shared::InMemoryAccountStore;

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let store = InMemoryAccountStore::new();
        let now = OffsetDateTime::now_utc();

        seed_default_roles(&store, now).await.unwrap();
        let first = store.find_role_by_name(DEFAULT_ROLE).await.unwrap().unwrap();

        seed_default_roles(&store, now).await.unwrap();
        let second = store.find_role_by_name(DEFAULT_ROLE).await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
    }
}
