use std::fs;
use std::sync::Arc;

use kube::{Client, config::KubeConfigOptions};
use tokio::sync::Notify;
use tracing::info;

pub mod config;
pub mod filter;
pub mod remap;
pub mod sink;
pub mod source;
pub mod sync;

use config::SyncConfig;
use source::SecretEventSource;
use sync::{ReconnectPolicy, Reconciler, run_loop};

pub async fn run(config: SyncConfig) -> anyhow::Result<()> {
    let options = KubeConfigOptions::default();

    // Load kubeconfig if it's present otherwise fall back to cluster config
    let kube_config = kube::Config::from_kubeconfig(&options)
        .await
        .or_else(|_| kube::Config::incluster())?;
    let client = Client::try_from(kube_config)?;

    // Explicit configuration wins, then whatever namespace the kube context
    // resolves to ("default" when unset).
    let namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_owned());
    info!("kubernetes current namespace: {}", namespace);
    info!("syncing to {}", config.sync_dir.display());

    fs::create_dir_all(&config.sync_dir)?;

    let reconciler = Reconciler::new(&config);
    let source = SecretEventSource::new(client, &namespace);

    let shutdown = Arc::new(Notify::new());
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.notify_one();
        }
    });

    run_loop(source, reconciler, ReconnectPolicy::default(), &shutdown).await
}
