//! 启动初始化集成测试

use authz_server::{
    repository::InMemoryIdentityStore,
    services::{BootstrapSeeder, SeedOutcome},
};
use std::sync::Arc;

mod common;

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let store = Arc::new(InMemoryIdentityStore::new());
    let config = common::create_test_config();
    let seeder = BootstrapSeeder::new(store.clone(), config.bootstrap.clone());

    assert_eq!(seeder.run().await.unwrap(), SeedOutcome::Seeded);
    let writes = store.writes();
    assert_eq!(store.baseline_counts().unwrap(), (3, 3, 1));

    assert_eq!(seeder.run().await.unwrap(), SeedOutcome::Skipped);
    assert_eq!(store.writes(), writes);
    assert_eq!(store.baseline_counts().unwrap(), (3, 3, 1));
}

#[tokio::test]
async fn test_reseeding_treats_conflicts_as_success() {
    let store = Arc::new(InMemoryIdentityStore::new());
    let config = common::create_test_config();
    let seeder = BootstrapSeeder::new(store.clone(), config.bootstrap.clone());

    seeder.seed().await.unwrap();
    let writes = store.writes();

    // every write now collides with an existing record
    seeder.seed().await.unwrap();
    assert_eq!(store.writes(), writes);
    assert_eq!(store.baseline_counts().unwrap(), (3, 3, 1));
}

#[tokio::test]
async fn test_bootstrap_aborts_on_store_failure() {
    let store = Arc::new(InMemoryIdentityStore::new());
    store.set_failing(true);
    let config = common::create_test_config();

    let result = BootstrapSeeder::new(store.clone(), config.bootstrap.clone())
        .run()
        .await;
    assert!(result.is_err());
}
