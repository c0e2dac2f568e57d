//! Tree reconstruction through the service, against paged and flaky stores.

use std::sync::Arc;

use rede_engine::{EngineConfig, Error, HierarchyService, RetryPolicy};
use rede_guard::check_levels;
use rede_hierarchy::LeaderNode;
use rede_integration_tests::{id, seed, service, Network};
use rede_store::{MemoryStore, NodeStore};

#[tokio::test]
async fn pagination_links_every_node() {
    // Page cap 2, tree of 5: three pages.
    let store = Network::new()
        .coordinator("r")
        .leader("a", "r")
        .leader("b", "r")
        .leader("c", "a")
        .leader("d", "c")
        .store(2)
        .await;
    let service = HierarchyService::new(
        Arc::clone(&store),
        EngineConfig::new().with_page_size(500),
    );

    let tree = service.get_leader_tree(&id("r")).await.unwrap().unwrap();
    assert_eq!(tree.len(), 5);
    assert_eq!(tree.count_descendants(), 4);
    assert_eq!(tree.find(&id("d")).unwrap().leader.hierarchy_level, Some(3));
    assert!(check_levels(&tree).is_empty());
    assert_eq!(store.page_fetches(), 3);
}

#[tokio::test]
async fn large_tree_over_many_pages() {
    let mut net = Network::new().coordinator("root");
    for i in 0..40 {
        net = net.leader(&format!("m{i}"), "root");
        for j in 0..5 {
            net = net.leader(&format!("m{i}-{j}"), &format!("m{i}"));
        }
    }
    let store = net.store(7).await;
    let service = service(store);

    let tree = service.get_leader_tree(&id("root")).await.unwrap().unwrap();
    assert_eq!(tree.len(), 1 + 40 + 200);
    assert_eq!(tree.height(), 2);
}

#[tokio::test]
async fn orphans_are_excluded_not_reattached() {
    let store = Network::new()
        .coordinator("r")
        .leader("a", "r")
        .leader("b", "a")
        .leader("c", "b")
        .store(100)
        .await;
    // a goes inactive out of band; b and c lose their path to the root.
    let mut a = store.get(&id("a")).await.unwrap();
    a.is_active = false;
    store.force_put(a).await;

    let tree = service(store).get_leader_tree(&id("r")).await.unwrap().unwrap();
    assert_eq!(tree.len(), 1);
    assert!(tree.children.is_empty());
}

#[tokio::test]
async fn transient_failures_still_yield_full_tree() {
    let store = Network::new().chain("n", 9).store(2).await;
    store.fail_next_reads(3);

    let tree = service(Arc::clone(&store))
        .get_leader_tree(&id("n0"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tree.len(), 9);
}

#[tokio::test]
async fn exhausted_retries_never_return_a_partial_tree() {
    let store = Network::new().chain("n", 9).store(2).await;
    store.fail_next_reads(1_000);

    let service = HierarchyService::new(
        Arc::clone(&store),
        EngineConfig::new().with_retry(RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::fast()
        }),
    );
    let err = service.get_leader_tree(&id("n0")).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.page_fetches(), 3);
}

#[tokio::test]
async fn unknown_and_non_coordinator_roots() {
    let store = Network::new().chain("n", 3).store(10).await;
    let service = service(store);

    assert!(matches!(
        service.get_leader_tree(&id("zz")).await,
        Err(Error::NotFound(_))
    ));
    assert!(service.get_leader_tree(&id("n1")).await.is_err());
    assert!(service
        .get_coordinator_network_stats(&id("n2"))
        .await
        .is_err());
}

#[tokio::test]
async fn reads_see_writes_without_caching() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), Network::new().coordinator("r").rows()).await;
    let service = service(Arc::clone(&store));
    assert_eq!(service.get_leader_tree(&id("r")).await.unwrap().unwrap().len(), 1);

    let root = store.get(&id("r")).await.unwrap();
    store
        .insert(LeaderNode::new("late", "Late").under(&root))
        .await
        .unwrap();
    assert_eq!(service.get_leader_tree(&id("r")).await.unwrap().unwrap().len(), 2);
}
