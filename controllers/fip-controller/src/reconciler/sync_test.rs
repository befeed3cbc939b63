//! Unit tests for sync module

use super::policy::{Attr, RELEASE_POLICY_ANNOTATION};
use super::sync::*;
use crate::error::ControllerError;
use crate::test_utils::*;
use ipam_store::mock::StoreCall;
use ipam_store::{MockFloatingIpStore, ReleasePolicy};
use std::collections::HashSet;

#[test]
fn test_parse_ip_infos() {
    let infos = parse_ip_infos(
        r#"{"common":{"ipinfos":[{"ip":"10.0.0.2/24","vlan":2,"gateway":"10.0.0.1"},{"ip":"10.1.0.2/24"}]}}"#,
    )
    .unwrap();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].vlan, 2);
    assert_eq!(infos[0].address(), Some(test_ip(2)));
    assert_eq!(infos[1].address(), Some("10.1.0.2".parse().unwrap()));
    assert_eq!(infos[1].gateway, None);
}

#[test]
fn test_parse_ip_infos_without_common_args() {
    assert!(parse_ip_infos("{}").unwrap().is_empty());
    assert!(parse_ip_infos("not json").is_err());
    assert_eq!(IpInfo::default().address(), None);
}

#[tokio::test]
async fn test_sync_allocates_unknown_address() {
    let store = MockFloatingIpStore::new("floating_ips");
    let pod = with_annotation(
        with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &["10.0.0.2/24"]),
        RELEASE_POLICY_ANNOTATION,
        "immutable",
    );
    let reconciler = create_test_reconciler(&store, None, StaticClusterCache::new().with_pod(pod));

    reconciler.sync_pod_ips_into_store().await;

    let record = store.get(test_ip(2)).expect("address should be allocated");
    assert_eq!(record.key, "ns1_ss1-0");
    assert_eq!(record.policy, ReleasePolicy::Immutable);
    assert_eq!(Attr::parse(&record.attr).unwrap().node_name, "node-1");
}

#[tokio::test]
async fn test_sync_same_key_is_noop() {
    let store = MockFloatingIpStore::new("floating_ips");
    store.add_record(fip("ns1_ss1-0", 2, ReleasePolicy::PodDelete, "node-1"));
    let pod = with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &["10.0.0.2/24"]);
    let reconciler = create_test_reconciler(&store, None, StaticClusterCache::new().with_pod(pod));

    reconciler.sync_pod_ips_into_store().await;

    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_sync_reports_conflicting_owner() {
    let store = MockFloatingIpStore::new("floating_ips");
    store.add_record(fip("ns1_other-0", 2, ReleasePolicy::PodDelete, "node-2"));
    let pod = with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &["10.0.0.2/24"]);
    let reconciler = create_test_reconciler(&store, None, StaticClusterCache::new());

    let err = reconciler.sync_pod_ip(&pod, &HashSet::new()).await.unwrap_err();

    match err {
        ControllerError::ConflictingIp { ip, key, stored_key } => {
            assert_eq!(ip, test_ip(2));
            assert_eq!(key, "ns1_ss1-0");
            assert_eq!(stored_key, "ns1_other-0");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.get(test_ip(2)).unwrap().key, "ns1_other-0");
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_sync_continues_after_conflict() {
    let store = MockFloatingIpStore::new("floating_ips");
    store.add_record(fip("ns1_other-0", 2, ReleasePolicy::PodDelete, "node-2"));
    let cache = StaticClusterCache::new()
        .with_pod(with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &["10.0.0.2/24"]))
        .with_pod(with_ip_infos(create_test_pod("ss1-1", "ns1", "node-1"), &["10.0.0.3/24"]));
    let reconciler = create_test_reconciler(&store, None, cache);

    reconciler.sync_pod_ips_into_store().await;

    assert_eq!(
        store.calls(),
        vec![StoreCall::Allocate {
            key: "ns1_ss1-1".to_string(),
            ip: test_ip(3),
        }]
    );
}

#[tokio::test]
async fn test_sync_skips_pods_not_running_or_unannotated() {
    let store = MockFloatingIpStore::new("floating_ips");
    let pending = with_phase(
        with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &["10.0.0.2/24"]),
        "Pending",
        None,
    );
    let cache = StaticClusterCache::new()
        .with_pod(pending)
        .with_pod(create_test_pod("ss1-1", "ns1", "node-1"))
        .with_pod(with_annotation(create_test_pod("ss1-2", "ns1", "node-1"), EXTENDED_CNI_ARGS_ANNOTATION, ""));
    let reconciler = create_test_reconciler(&store, None, cache);

    reconciler.sync_pod_ips_into_store().await;

    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_sync_skipped_until_caches_synced() {
    let store = MockFloatingIpStore::new("floating_ips");
    let pod = with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &["10.0.0.2/24"]);
    let reconciler = create_test_reconciler(&store, None, StaticClusterCache::new().with_pod(pod).unsynced());

    reconciler.sync_pod_ips_into_store().await;

    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_sync_uses_deployment_pod_key() {
    let store = MockFloatingIpStore::new("floating_ips");
    let pod = with_ip_infos(
        with_replica_set_owner(create_test_pod("dp1-abc-p1", "ns1", "node-1"), "dp1-abc"),
        &["10.0.0.2/24"],
    );
    let cache = StaticClusterCache::new()
        .with_pod(pod)
        .with_deployment(create_test_deployment("dp1", "ns1", 1, pod_template(None, None, true)));
    let reconciler = create_test_reconciler(&store, None, cache);

    reconciler.sync_pod_ips_into_store().await;

    assert_eq!(store.get(test_ip(2)).unwrap().key, "_deployment_ns1_dp1_dp1-abc-p1");
}

#[tokio::test]
async fn test_sync_invalid_annotation() {
    let store = MockFloatingIpStore::new("floating_ips");
    let reconciler = create_test_reconciler(&store, None, StaticClusterCache::new());

    let malformed = with_annotation(create_test_pod("ss1-0", "ns1", "node-1"), EXTENDED_CNI_ARGS_ANNOTATION, "{");
    let err = reconciler.sync_pod_ip(&malformed, &HashSet::new()).await.unwrap_err();
    assert!(matches!(err, ControllerError::Serialization(_)));

    let empty = with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &[]);
    let err = reconciler.sync_pod_ip(&empty, &HashSet::new()).await.unwrap_err();
    assert!(matches!(err, ControllerError::MissingIpInfo(_)));
}

#[tokio::test]
async fn test_sync_second_address_into_second_store() {
    let store = MockFloatingIpStore::new("floating_ips");
    let second = MockFloatingIpStore::new("second_fips");
    let pod = with_ip_infos(
        with_second_ip_resource(create_test_pod("ss1-0", "ns1", "node-1")),
        &["10.0.0.2/24", "10.0.0.102/24"],
    );
    let reconciler = create_test_reconciler_with_second(&store, &second, StaticClusterCache::new().with_pod(pod));

    reconciler.sync_pod_ips_into_store().await;

    assert_eq!(store.get(test_ip(2)).unwrap().key, "ns1_ss1-0");
    assert_eq!(second.get(test_ip(102)).unwrap().key, "ns1_ss1-0");
    assert!(store.get(test_ip(102)).is_none());
}

#[tokio::test]
async fn test_sync_missing_second_address() {
    let store = MockFloatingIpStore::new("floating_ips");
    let second = MockFloatingIpStore::new("second_fips");
    let pod = with_ip_infos(
        with_second_ip_resource(create_test_pod("ss1-0", "ns1", "node-1")),
        &["10.0.0.2/24"],
    );
    let reconciler = create_test_reconciler_with_second(&store, &second, StaticClusterCache::new());

    let err = reconciler.sync_pod_ip(&pod, &HashSet::new()).await.unwrap_err();

    assert!(matches!(err, ControllerError::MissingIpInfo(_)));
    // the primary address is recorded before the second slot is checked
    assert_eq!(store.get(test_ip(2)).unwrap().key, "ns1_ss1-0");
    assert!(second.calls().is_empty());
}

#[tokio::test]
async fn test_sync_second_store_ignored_without_second_resource() {
    let store = MockFloatingIpStore::new("floating_ips");
    let second = MockFloatingIpStore::new("second_fips");
    let pod = with_ip_infos(create_test_pod("ss1-0", "ns1", "node-1"), &["10.0.0.2/24"]);
    let reconciler = create_test_reconciler_with_second(&store, &second, StaticClusterCache::new());

    reconciler.sync_pod_ip(&pod, &HashSet::new()).await.unwrap();

    assert_eq!(store.calls().len(), 1);
    assert!(second.calls().is_empty());
}
