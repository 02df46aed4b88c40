use super::*;
use crate::model::Identity;

#[tokio::test]
async fn test_clones_share_state() {
    let storage = MemoryStorage::new();
    let handle = storage.clone();

    let user = User::from_identity(&Identity::new("google", "1").with_email("a@x.com"));
    storage.create_user(&user).await.unwrap();

    assert!(handle.find_user(user.id).await.unwrap().is_some());
    assert_eq!(handle.counts(), (1, 0));
}

#[tokio::test]
async fn test_link_requires_existing_user() {
    let storage = MemoryStorage::new();
    let orphan = Identity::new("google", "1").link_to(Uuid::new_v4());

    let result = storage.create_identity_link(&orphan).await;
    assert!(matches!(result, Err(StorageError::Database(_))));
    assert_eq!(storage.counts(), (0, 0));
}

#[tokio::test]
async fn test_racing_commits_keep_one_winner() {
    let storage = Arc::new(MemoryStorage::new());
    let identity = Identity::new("github", "7").with_email("race@example.com");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let storage = storage.clone();
        let identity = identity.clone();
        handles.push(tokio::spawn(async move {
            let user = User::from_identity(&identity);
            let mut tx = storage.begin().await?;
            tx.create_user(&user).await?;
            tx.create_identity_link(&identity.link_to(user.id)).await?;
            tx.commit().await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => committed += 1,
            Err(e) => assert!(matches!(e, StorageError::Duplicate(_)), "got {:?}", e),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(storage.counts(), (1, 1));
}

#[tokio::test]
async fn test_remove_user_row_leaves_links() {
    let storage = MemoryStorage::new();
    let identity = Identity::new("google", "1").with_email("a@x.com");
    let user = User::from_identity(&identity);
    storage.create_user(&user).await.unwrap();
    storage
        .create_identity_link(&identity.link_to(user.id))
        .await
        .unwrap();

    storage.remove_user_row(user.id);

    assert!(storage.find_user(user.id).await.unwrap().is_none());
    assert!(storage.find_user_by_email("a@x.com").await.unwrap().is_none());
    assert!(
        storage
            .find_identity_link("google", "1")
            .await
            .unwrap()
            .is_some()
    );
}
