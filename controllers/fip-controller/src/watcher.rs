//! Kubernetes resource watchers.
//!
//! Each watcher feeds a reflector store and flips a `synced` flag once the
//! initial list has been applied. `ReflectorCache` exposes the stores to the
//! reconciler through `ClusterCache`.

use crate::backoff::FibonacciBackoff;
use crate::cache::ClusterCache;
use crate::error::ControllerError;
use futures::TryStreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Resource};
use kube_runtime::reflector::{self, store::Writer, Store};
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reflector stores for the three watched kinds
#[derive(Clone)]
pub struct ReflectorCache {
    pods: Store<Pod>,
    stateful_sets: Store<StatefulSet>,
    deployments: Store<Deployment>,
    pods_synced: Arc<AtomicBool>,
    stateful_sets_synced: Arc<AtomicBool>,
    deployments_synced: Arc<AtomicBool>,
}

impl ClusterCache for ReflectorCache {
    fn pods(&self) -> Vec<Arc<Pod>> {
        self.pods.state()
    }

    fn stateful_sets(&self) -> Vec<Arc<StatefulSet>> {
        self.stateful_sets.state()
    }

    fn deployments(&self) -> Vec<Arc<Deployment>> {
        self.deployments.state()
    }

    fn pods_synced(&self) -> bool {
        self.pods_synced.load(Ordering::Acquire)
    }

    fn stateful_sets_synced(&self) -> bool {
        self.stateful_sets_synced.load(Ordering::Acquire)
    }

    fn deployments_synced(&self) -> bool {
        self.deployments_synced.load(Ordering::Acquire)
    }
}

/// Watchers to be spawned for a `ReflectorCache`
pub struct CacheWatchers {
    pub pods: Watcher<Pod>,
    pub stateful_sets: Watcher<StatefulSet>,
    pub deployments: Watcher<Deployment>,
}

/// Builds the cache and the watchers that populate it
pub fn reflector_cache(
    pod_api: Api<Pod>,
    stateful_set_api: Api<StatefulSet>,
    deployment_api: Api<Deployment>,
) -> (ReflectorCache, CacheWatchers) {
    let (pods, pods_writer) = reflector::store();
    let (stateful_sets, stateful_sets_writer) = reflector::store();
    let (deployments, deployments_writer) = reflector::store();

    let pods_watcher = Watcher::new("Pod", pod_api, pods_writer);
    let stateful_sets_watcher = Watcher::new("StatefulSet", stateful_set_api, stateful_sets_writer);
    let deployments_watcher = Watcher::new("Deployment", deployment_api, deployments_writer);

    let cache = ReflectorCache {
        pods,
        stateful_sets,
        deployments,
        pods_synced: pods_watcher.synced.clone(),
        stateful_sets_synced: stateful_sets_watcher.synced.clone(),
        deployments_synced: deployments_watcher.synced.clone(),
    };

    (
        cache,
        CacheWatchers {
            pods: pods_watcher,
            stateful_sets: stateful_sets_watcher,
            deployments: deployments_watcher,
        },
    )
}

/// Watches one resource kind into a reflector store.
pub struct Watcher<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    kind: &'static str,
    api: Api<K>,
    writer: Writer<K>,
    synced: Arc<AtomicBool>,
    backoff: FibonacciBackoff,
}

impl<K> Watcher<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    /// Creates a new watcher instance.
    pub fn new(kind: &'static str, api: Api<K>, writer: Writer<K>) -> Self {
        Self {
            kind,
            api,
            writer,
            synced: Arc::new(AtomicBool::new(false)),
            backoff: FibonacciBackoff::new(1, 30),
        }
    }

    /// Watches forever, re-establishing the stream after failures.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Starting {} watcher", self.kind);
        loop {
            match self.watch().await {
                Ok(()) => warn!("{} watch stream ended, restarting", self.kind),
                Err(e) => warn!("{} watcher failed: {}", self.kind, e),
            }
            let delay = self.backoff.next_backoff();
            debug!("Restarting {} watcher in {:?}", self.kind, delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn watch(&mut self) -> Result<(), ControllerError> {
        let mut stream = Box::pin(watcher(self.api.clone(), watcher::Config::default()));

        while let Some(event) = stream.try_next().await
            .map_err(|e| ControllerError::Watch(format!("{} watcher stream error: {}", self.kind, e)))?
        {
            self.writer.apply_watcher_event(&event);
            match event {
                watcher::Event::Init => {
                    debug!("{} watcher initialized", self.kind);
                }
                watcher::Event::InitDone => {
                    if !self.synced.swap(true, Ordering::AcqRel) {
                        info!("{} cache synced", self.kind);
                    }
                    self.backoff.reset();
                }
                watcher::Event::Apply(_) | watcher::Event::InitApply(_) | watcher::Event::Delete(_) => {}
            }
        }

        Ok(())
    }
}
