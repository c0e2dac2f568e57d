//! The engine over the RocksDB store.

#![cfg(feature = "rocksdb")]

use std::sync::Arc;

use rede_guard::check_levels;
use rede_integration_tests::{id, seed, service, Network};
use rede_store::RocksStore;
use tempfile::tempdir;

#[tokio::test]
async fn mutations_survive_reopen() {
    let dir = tempdir().unwrap();
    let net = Network::new()
        .chain("p", 3)
        .coordinator("s")
        .leader("r", "s")
        .leader("r1", "r");

    {
        let store = Arc::new(RocksStore::open(dir.path()).unwrap().with_page_cap(2));
        seed(store.as_ref(), net.rows()).await;
        let service = service(store);
        service.move_leader_branch(&id("r"), &id("p2")).await.unwrap();
    }

    let store = Arc::new(RocksStore::open(dir.path()).unwrap().with_page_cap(2));
    let service = service(store);
    let tree = service.get_leader_tree(&id("p0")).await.unwrap().unwrap();
    assert_eq!(tree.len(), 5);
    assert!(check_levels(&tree).is_empty());
    assert_eq!(tree.find(&id("r1")).unwrap().leader.hierarchy_level, Some(4));
}
