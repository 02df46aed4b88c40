use super::*;
use crate::model::Identity;

/// Runs the same user store scenarios against any backend
/// Used to ensure parity between Memory and SQLite implementations
async fn test_all_user_store_operations<S: UserStore>(storage: Arc<S>) {
    let identity = Identity::new("google", "g-1")
        .with_email("alice@example.com")
        .with_name("Alice")
        .verified(true);
    let user = User::from_identity(&identity);

    // Test 1: CreateUser and FindUser
    storage
        .create_user(&user)
        .await
        .expect("CreateUser should succeed");

    let found = storage
        .find_user(user.id)
        .await
        .expect("FindUser should succeed")
        .expect("Should find created user");
    assert_eq!(found.primary_email, "alice@example.com");
    assert!(found.verified);

    // Test 2: FindUser with non-existent ID
    let missing = storage
        .find_user(Uuid::new_v4())
        .await
        .expect("FindUser should not error");
    assert!(missing.is_none(), "Should return None for non-existent user");

    // Test 3: FindUserByEmail
    let by_email = storage
        .find_user_by_email("alice@example.com")
        .await
        .unwrap()
        .expect("Should find user by email");
    assert_eq!(by_email.id, user.id);
    assert!(
        storage
            .find_user_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none()
    );

    // Test 4: CreateIdentityLink and FindIdentityLink
    storage
        .create_identity_link(&identity.link_to(user.id))
        .await
        .expect("CreateIdentityLink should succeed");

    let link = storage
        .find_identity_link("google", "g-1")
        .await
        .unwrap()
        .expect("Should find identity link");
    assert_eq!(link.user_id, user.id);
    assert!(link.verified);

    assert!(
        storage
            .find_identity_link("google", "g-2")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        storage
            .find_identity_link("github", "g-1")
            .await
            .unwrap()
            .is_none(),
        "provider ids are scoped by provider"
    );

    // Test 5: Uniqueness of (provider, provider_id)
    let other = User::from_identity(&Identity::new("x", "y").with_email("other@example.com"));
    storage.create_user(&other).await.unwrap();
    let dup = storage
        .create_identity_link(&identity.link_to(other.id))
        .await;
    assert!(
        matches!(dup, Err(StorageError::Duplicate(_))),
        "duplicate identity link should be rejected, got {:?}",
        dup
    );

    // Test 6: Uniqueness of primary email
    let same_email = User::from_identity(&identity);
    let dup = storage.create_user(&same_email).await;
    assert!(matches!(dup, Err(StorageError::Duplicate(_))));

    // Test 7: ListIdentityLinks
    storage
        .create_identity_link(
            &Identity::new("github", "gh-9")
                .with_email("alice@example.com")
                .link_to(user.id),
        )
        .await
        .unwrap();
    let links = storage.list_identity_links(user.id).await.unwrap();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.user_id == user.id));
}

/// Transactions either apply every write or none
async fn test_transaction_semantics<S: UserStore>(storage: Arc<S>) {
    let identity = Identity::new("github", "42")
        .with_email("bob@example.com")
        .verified(false);
    let user = User::from_identity(&identity);

    // Commit applies both writes
    let mut tx = storage.begin().await.unwrap();
    tx.create_user(&user).await.unwrap();
    tx.create_identity_link(&identity.link_to(user.id))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert!(storage.find_user(user.id).await.unwrap().is_some());
    assert!(
        storage
            .find_identity_link("github", "42")
            .await
            .unwrap()
            .is_some()
    );

    // Rollback discards writes
    let ghost_identity = Identity::new("github", "43").with_email("ghost@example.com");
    let ghost = User::from_identity(&ghost_identity);
    let mut tx = storage.begin().await.unwrap();
    tx.create_user(&ghost).await.unwrap();
    tx.rollback().await.unwrap();
    assert!(storage.find_user(ghost.id).await.unwrap().is_none());

    // Dropping without commit discards writes too
    {
        let mut tx = storage.begin().await.unwrap();
        tx.create_user(&ghost).await.unwrap();
    }
    assert!(storage.find_user(ghost.id).await.unwrap().is_none());

    // A failing write inside the transaction leaves nothing behind
    let clash_identity = Identity::new("google", "clash").with_email("carol@example.com");
    let clash = User::from_identity(&clash_identity);
    let mut tx = storage.begin().await.unwrap();
    let failed = async {
        tx.create_user(&clash).await?;
        // Reuses the committed (github, 42) pair
        tx.create_identity_link(&identity.link_to(clash.id)).await?;
        Ok::<(), StorageError>(())
    }
    .await;
    let result = match failed {
        Ok(()) => tx.commit().await,
        Err(e) => {
            let _ = tx.rollback().await;
            Err(e)
        }
    };
    assert!(matches!(result, Err(StorageError::Duplicate(_))));
    assert!(storage.find_user(clash.id).await.unwrap().is_none());
    assert!(
        storage
            .find_user_by_email("carol@example.com")
            .await
            .unwrap()
            .is_none()
    );

    // Verification flags only move to true
    let mut tx = storage.begin().await.unwrap();
    tx.mark_identity_verified("github", "42").await.unwrap();
    tx.mark_user_verified(user.id).await.unwrap();
    tx.commit().await.unwrap();

    assert!(storage.find_user(user.id).await.unwrap().unwrap().verified);
    assert!(
        storage
            .find_identity_link("github", "42")
            .await
            .unwrap()
            .unwrap()
            .verified
    );
}

/// Handshake entries are single-use and expire
async fn test_ephemeral_operations<S: EphemeralStore>(storage: Arc<S>) {
    storage
        .put("oauth1:abc", "secret", Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(
        storage.take("oauth1:abc").await.unwrap(),
        Some("secret".to_string())
    );
    assert_eq!(
        storage.take("oauth1:abc").await.unwrap(),
        None,
        "entries are consumed once"
    );

    // Replacing a value keeps only the latest
    storage
        .put("oauth2:state", "v1", Duration::from_secs(60))
        .await
        .unwrap();
    storage
        .put("oauth2:state", "v2", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        storage.take("oauth2:state").await.unwrap(),
        Some("v2".to_string())
    );

    // Expired entries are invisible and purgeable
    storage
        .put("expired:1", "gone", Duration::ZERO)
        .await
        .unwrap();
    storage
        .put("expired:2", "gone", Duration::ZERO)
        .await
        .unwrap();
    storage
        .put("live", "here", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(storage.take("expired:1").await.unwrap(), None);
    assert_eq!(storage.purge_expired().await.unwrap(), 1);
    assert_eq!(storage.take("live").await.unwrap(), Some("here".to_string()));

    assert_eq!(storage.take("never-set").await.unwrap(), None);
}

#[tokio::test]
async fn test_memory_storage_all_operations() {
    let storage = Arc::new(MemoryStorage::new());
    test_all_user_store_operations(storage.clone()).await;
    test_ephemeral_operations(storage).await;
}

#[tokio::test]
async fn test_memory_storage_transactions() {
    test_transaction_semantics(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test]
async fn test_sqlite_storage_all_operations() {
    let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
    test_all_user_store_operations(storage.clone()).await;
    test_ephemeral_operations(storage).await;
}

#[tokio::test]
async fn test_sqlite_storage_transactions() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("tx.db");
    let storage = Arc::new(SqliteStorage::new(db_path.to_str().unwrap()).await.unwrap());
    test_transaction_semantics(storage).await;
}
