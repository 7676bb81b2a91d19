//! Versioned per-node snapshot cache.
//!
//! The cache holds one immutable [`Snapshot`] per node id and bridges the
//! single-writer updater to the many discovery streams. Streams register
//! one-shot watches: a watch either fires immediately (a snapshot with a
//! different version already exists), or parks until [`SnapshotCache::set_snapshot`]
//! publishes one. One-shot watches make slow consumers drop-to-latest by
//! construction, and the single writer makes the versions observed by any
//! stream monotonic in publication order.
//!
//! Locking discipline: a reader-writer lock guards the snapshot map and the
//! watch registry. It is held only for registration, replacement, and
//! collecting the watches to fire; no response is dispatched while the lock
//! is held.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use envoy_types::pb::google::protobuf::Any;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::resources::{BuiltResource, ALL_TYPE_URLS};

/// An immutable, versioned tuple of the four resource collections.
///
/// One version string covers all resource types, which the discovery
/// protocol permits. Resources are sorted by name at construction so equal
/// configuration always serializes identically.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: String,
    resources: HashMap<&'static str, Vec<BuiltResource>>,
}

impl Snapshot {
    pub fn new(
        version: impl Into<String>,
        endpoints: Vec<BuiltResource>,
        clusters: Vec<BuiltResource>,
        routes: Vec<BuiltResource>,
        listeners: Vec<BuiltResource>,
    ) -> Self {
        let [endpoint_url, cluster_url, route_url, listener_url] = ALL_TYPE_URLS;
        let mut resources = HashMap::new();
        for (type_url, mut list) in [
            (endpoint_url, endpoints),
            (cluster_url, clusters),
            (route_url, routes),
            (listener_url, listeners),
        ] {
            list.sort_by(|a, b| a.name.cmp(&b.name));
            resources.insert(type_url, list);
        }
        Self { version: version.into(), resources }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resources of one type, sorted by name. Unknown type URLs yield an
    /// empty slice.
    pub fn resources(&self, type_url: &str) -> &[BuiltResource] {
        self.resources.get(type_url).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether this snapshot carries the same content as `other` for one
    /// resource type.
    fn type_equals(&self, other: &Snapshot, type_url: &str) -> bool {
        self.resources(type_url) == other.resources(type_url)
    }
}

/// Subscription parameters of one watch.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    pub node_id: String,
    pub type_url: String,
    /// Version last acknowledged by the client; empty on first contact
    pub known_version: String,
    /// Resource names the client subscribed to; empty means everything
    pub resource_names: Vec<String>,
}

/// A fired watch: the response payload for one resource type.
#[derive(Debug, Clone)]
pub struct WatchResponse {
    pub type_url: String,
    pub version: String,
    pub resources: Vec<Any>,
}

/// Handle for cancelling a parked watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

struct ParkedWatch {
    request: WatchRequest,
    tx: oneshot::Sender<WatchResponse>,
}

#[derive(Default)]
struct CacheInner {
    snapshots: HashMap<String, Arc<Snapshot>>,
    watches: HashMap<u64, ParkedWatch>,
    next_watch_id: u64,
}

/// Concurrent per-node snapshot store with subscriber notification.
#[derive(Default)]
pub struct SnapshotCache {
    inner: RwLock<CacheInner>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace a node's snapshot and fire every parked watch
    /// whose resource type actually changed.
    pub fn set_snapshot(&self, node_id: &str, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);

        let fired: Vec<(ParkedWatch, Arc<Snapshot>)> = {
            let mut inner = self.inner.write().expect("snapshot cache lock poisoned");
            let previous = inner.snapshots.insert(node_id.to_string(), snapshot.clone());

            if let Some(previous) = &previous {
                if previous.version == snapshot.version {
                    trace!(node_id, version = %snapshot.version, "snapshot unchanged");
                    return;
                }
            }

            let due: Vec<u64> = inner
                .watches
                .iter()
                .filter(|(_, watch)| {
                    watch_is_due(&watch.request, node_id, previous.as_deref(), &snapshot)
                })
                .map(|(id, _)| *id)
                .collect();

            due.into_iter()
                .filter_map(|id| inner.watches.remove(&id))
                .map(|watch| (watch, snapshot.clone()))
                .collect()
        };

        debug!(
            node_id,
            version = %snapshot.version,
            watches = fired.len(),
            "snapshot published"
        );

        for (watch, snapshot) in fired {
            dispatch(watch, &snapshot);
        }
    }

    /// The current snapshot of a node, if any.
    pub fn snapshot(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        let inner = self.inner.read().expect("snapshot cache lock poisoned");
        inner.snapshots.get(node_id).cloned()
    }

    /// Node ids that currently hold a snapshot.
    pub fn node_ids(&self) -> Vec<String> {
        let inner = self.inner.read().expect("snapshot cache lock poisoned");
        inner.snapshots.keys().cloned().collect()
    }

    /// Register a subscription. When a snapshot with a version other than
    /// the client's already exists the watch fires before this returns;
    /// otherwise it parks until the next matching [`set_snapshot`] or until
    /// cancelled.
    ///
    /// [`set_snapshot`]: SnapshotCache::set_snapshot
    pub fn create_watch(
        &self,
        request: WatchRequest,
    ) -> (oneshot::Receiver<WatchResponse>, WatchId) {
        let (tx, rx) = oneshot::channel();

        let immediate: Option<(ParkedWatch, Arc<Snapshot>)> = {
            let mut inner = self.inner.write().expect("snapshot cache lock poisoned");

            let current = inner.snapshots.get(&request.node_id).cloned();
            match current {
                Some(snapshot) if snapshot.version() != request.known_version => {
                    Some((ParkedWatch { request, tx }, snapshot))
                }
                _ => {
                    let id = inner.next_watch_id;
                    inner.next_watch_id += 1;
                    trace!(
                        node_id = %request.node_id,
                        type_url = %request.type_url,
                        watch_id = id,
                        "watch parked"
                    );
                    inner.watches.insert(id, ParkedWatch { request, tx });
                    return (rx, WatchId(id));
                }
            }
        };

        if let Some((watch, snapshot)) = immediate {
            dispatch(watch, &snapshot);
        }
        // Already fired; hand back an id no watch will ever carry again.
        (rx, WatchId(u64::MAX))
    }

    /// Drop a parked watch. The paired receiver observes a closed channel.
    pub fn cancel_watch(&self, id: WatchId) {
        let mut inner = self.inner.write().expect("snapshot cache lock poisoned");
        if inner.watches.remove(&id.0).is_some() {
            trace!(watch_id = id.0, "watch cancelled");
        }
    }

    #[cfg(test)]
    fn parked_watch_count(&self) -> usize {
        self.inner.read().expect("snapshot cache lock poisoned").watches.len()
    }
}

/// Decide whether a parked watch must fire for a snapshot replacement.
///
/// A watch fires when the client is behind the previous snapshot (it has
/// never seen it or holds an older version), or when its resource type's
/// content changed in this replacement. Version-identical content for the
/// watched type keeps the watch parked: pushes happen only when content
/// changes.
fn watch_is_due(
    request: &WatchRequest,
    node_id: &str,
    previous: Option<&Snapshot>,
    next: &Snapshot,
) -> bool {
    if request.node_id != node_id || request.known_version == next.version {
        return false;
    }
    match previous {
        None => true,
        Some(previous) if request.known_version != previous.version => true,
        Some(previous) => !next.type_equals(previous, &request.type_url),
    }
}

fn dispatch(watch: ParkedWatch, snapshot: &Snapshot) {
    let request = watch.request;
    let resources = snapshot
        .resources(&request.type_url)
        .iter()
        .filter(|r| {
            request.resource_names.is_empty()
                || request.resource_names.iter().any(|name| name == &r.name)
        })
        .map(|r| r.body.clone())
        .collect();

    let response = WatchResponse {
        type_url: request.type_url,
        version: snapshot.version().to_string(),
        resources,
    };

    // The subscriber may have hung up; a dropped receiver is not an error.
    let _ = watch.tx.send(response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::resources::{CLUSTER_TYPE_URL, LISTENER_TYPE_URL};

    fn resource(name: &str, bytes: &[u8]) -> BuiltResource {
        BuiltResource::new(
            name,
            Any { type_url: CLUSTER_TYPE_URL.to_string(), value: bytes.to_vec() },
        )
    }

    fn snapshot(version: &str, clusters: Vec<BuiltResource>) -> Snapshot {
        Snapshot::new(version, Vec::new(), clusters, Vec::new(), Vec::new())
    }

    fn watch_request(node: &str, known_version: &str) -> WatchRequest {
        WatchRequest {
            node_id: node.to_string(),
            type_url: CLUSTER_TYPE_URL.to_string(),
            known_version: known_version.to_string(),
            resource_names: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_watch_fires_immediately_when_snapshot_exists() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("n1", snapshot("v1", vec![resource("a", b"a1")]));

        let (rx, _) = cache.create_watch(watch_request("n1", ""));
        let response = rx.await.expect("watch should fire");
        assert_eq!(response.version, "v1");
        assert_eq!(response.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_parks_until_snapshot() {
        let cache = SnapshotCache::new();
        let (rx, _) = cache.create_watch(watch_request("n9", ""));
        assert_eq!(cache.parked_watch_count(), 1);

        cache.set_snapshot("n9", snapshot("v1", vec![resource("a", b"a1")]));
        let response = rx.await.expect("watch should fire on publish");
        assert_eq!(response.version, "v1");
        assert_eq!(cache.parked_watch_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_with_current_version_parks() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("n1", snapshot("v1", vec![resource("a", b"a1")]));

        let (mut rx, _) = cache.create_watch(watch_request("n1", "v1"));
        assert_eq!(cache.parked_watch_count(), 1);
        assert!(rx.try_recv().is_err());

        cache.set_snapshot("n1", snapshot("v2", vec![resource("a", b"a2")]));
        let response = rx.await.expect("watch should fire on new version");
        assert_eq!(response.version, "v2");
    }

    #[tokio::test]
    async fn test_unchanged_type_content_keeps_watch_parked() {
        let cache = SnapshotCache::new();
        let clusters = vec![resource("a", b"a1")];
        cache.set_snapshot(
            "n1",
            Snapshot::new("v1", Vec::new(), clusters.clone(), Vec::new(), Vec::new()),
        );

        let (mut rx, _) = cache.create_watch(watch_request("n1", "v1"));

        // new version, but the cluster content is identical; only the
        // listeners changed
        cache.set_snapshot(
            "n1",
            Snapshot::new(
                "v2",
                Vec::new(),
                clusters,
                Vec::new(),
                vec![BuiltResource::new(
                    "lis",
                    Any { type_url: LISTENER_TYPE_URL.to_string(), value: b"l1".to_vec() },
                )],
            ),
        );

        assert!(rx.try_recv().is_err());
        assert_eq!(cache.parked_watch_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_watch_closes_channel() {
        let cache = SnapshotCache::new();
        let (rx, id) = cache.create_watch(watch_request("n1", ""));
        cache.cancel_watch(id);
        assert!(rx.await.is_err());
        assert_eq!(cache.parked_watch_count(), 0);
    }

    #[tokio::test]
    async fn test_watches_are_node_scoped() {
        let cache = SnapshotCache::new();
        let (mut rx, _) = cache.create_watch(watch_request("n1", ""));

        cache.set_snapshot("n2", snapshot("v1", vec![resource("a", b"a1")]));
        assert!(rx.try_recv().is_err());

        cache.set_snapshot("n1", snapshot("v1", vec![resource("a", b"a1")]));
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_resource_name_filtering() {
        let cache = SnapshotCache::new();
        cache.set_snapshot(
            "n1",
            snapshot("v1", vec![resource("a", b"a1"), resource("b", b"b1")]),
        );

        let mut request = watch_request("n1", "");
        request.resource_names = vec!["b".to_string()];
        let (rx, _) = cache.create_watch(request);
        let response = rx.await.unwrap();
        assert_eq!(response.resources.len(), 1);
        assert_eq!(response.resources[0].value, b"b1");
    }

    #[tokio::test]
    async fn test_versions_observed_in_publication_order() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("n1", snapshot("v1", vec![resource("a", b"a1")]));

        let mut seen = Vec::new();
        let mut known = String::new();
        for update in ["v2", "v3"] {
            let (rx, _) = cache.create_watch(watch_request("n1", &known));
            // the previous version is already stale, so the watch fires with
            // the current snapshot
            let response = rx.await.unwrap();
            seen.push(response.version.clone());
            known = response.version;
            cache.set_snapshot("n1", snapshot(update, vec![resource("a", update.as_bytes())]));
        }
        let (rx, _) = cache.create_watch(watch_request("n1", &known));
        seen.push(rx.await.unwrap().version);

        assert_eq!(seen, vec!["v1".to_string(), "v2".to_string(), "v3".to_string()]);
    }

    #[tokio::test]
    async fn test_get_snapshot() {
        let cache = SnapshotCache::new();
        assert!(cache.snapshot("n1").is_none());

        cache.set_snapshot("n1", snapshot("v1", vec![resource("a", b"a1")]));
        let snap = cache.snapshot("n1").unwrap();
        assert_eq!(snap.version(), "v1");
        assert_eq!(snap.resources(CLUSTER_TYPE_URL).len(), 1);
        assert!(snap.resources(LISTENER_TYPE_URL).is_empty());
        assert_eq!(cache.node_ids(), vec!["n1".to_string()]);
    }
}
