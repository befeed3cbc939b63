//! Main controller implementation.
//!
//! This module contains the `Controller` struct that starts the cache
//! watchers and the two periodic passes of the reconciler.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::reflector_cache;
use cloud_provider_client::{CloudProviderClient, CloudProviderTrait};
use crds::FloatingIP;
use ipam_store::{CrdFloatingIpStore, FloatingIpStore};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Main controller for floating IP reconciliation.
pub struct Controller {
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
    stateful_set_watcher: JoinHandle<Result<(), ControllerError>>,
    deployment_watcher: JoinHandle<Result<(), ControllerError>>,
    resync_loop: JoinHandle<()>,
    sync_ip_loop: JoinHandle<()>,
}

fn watched_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Floating IP Controller");

        let kube_client = Client::try_default().await?;

        let ns = config.watch_namespace.as_deref();
        let pod_api: Api<Pod> = watched_api(kube_client.clone(), ns);
        let stateful_set_api: Api<StatefulSet> = watched_api(kube_client.clone(), ns);
        let deployment_api: Api<Deployment> = watched_api(kube_client.clone(), ns);

        let ipam: Arc<dyn FloatingIpStore> = Arc::new(CrdFloatingIpStore::new(
            "floating_ips",
            Api::<FloatingIP>::namespaced(kube_client.clone(), &config.store_namespace),
        ));
        let second_ipam = config.second_store_namespace.as_deref().map(|second_ns| {
            Arc::new(CrdFloatingIpStore::new(
                "second_fips",
                Api::<FloatingIP>::namespaced(kube_client.clone(), second_ns),
            )) as Arc<dyn FloatingIpStore>
        });

        let cloud_provider = match &config.cloud_provider_url {
            Some(url) => Some(Arc::new(CloudProviderClient::new(
                url.clone(),
                config.cloud_provider_timeout,
            )?) as Arc<dyn CloudProviderTrait>),
            None => None,
        };

        let (cache, watchers) = reflector_cache(pod_api, stateful_set_api, deployment_api);

        let reconciler = Arc::new(Reconciler::new(
            ipam,
            second_ipam,
            cloud_provider,
            Arc::new(cache),
            config.resources.clone(),
        ));

        // Start watchers in background tasks
        let pod_watcher = tokio::spawn(watchers.pods.run());
        let stateful_set_watcher = tokio::spawn(watchers.stateful_sets.run());
        let deployment_watcher = tokio::spawn(watchers.deployments.run());

        let resync_loop = spawn_periodic(reconciler.clone(), config.resync_interval, |reconciler| async move {
            reconciler.reconcile().await
        });
        let sync_ip_loop = spawn_periodic(reconciler, config.sync_ip_interval, |reconciler| async move {
            reconciler.sync_pod_ips_into_store().await
        });

        Ok(Self {
            pod_watcher,
            stateful_set_watcher,
            deployment_watcher,
            resync_loop,
            sync_ip_loop,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Floating IP Controller running");

        // Wait for any task to exit (they should run forever)
        tokio::select! {
            result = &mut self.pod_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {}", e)))??;
            }
            result = &mut self.stateful_set_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("StatefulSet watcher panicked: {}", e)))??;
            }
            result = &mut self.deployment_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Deployment watcher panicked: {}", e)))??;
            }
            result = &mut self.resync_loop => {
                result.map_err(|e| ControllerError::Watch(format!("resync loop panicked: {}", e)))?;
            }
            result = &mut self.sync_ip_loop => {
                result.map_err(|e| ControllerError::Watch(format!("sync ip loop panicked: {}", e)))?;
            }
        }

        Ok(())
    }
}

/// Runs `pass` once the caches have synced and then every `period`.
///
/// A pass that overruns its period delays the next one.
fn spawn_periodic<F, Fut>(reconciler: Arc<Reconciler>, period: Duration, pass: F) -> JoinHandle<()>
where
    F: Fn(Arc<Reconciler>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        reconciler.wait_for_cache_sync().await;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // the first tick completes immediately
            interval.tick().await;
            pass(reconciler.clone()).await;
        }
    })
}
