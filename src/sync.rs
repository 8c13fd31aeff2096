use std::collections::BTreeMap;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use futures::StreamExt;
use tokio::sync::Notify;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, error, info, warn};

use crate::config::{RemapRule, SyncConfig};
use crate::filter;
use crate::remap::remap;
use crate::sink::FileSink;
use crate::source::{EventKind, EventSource, ResourceEvent};

/// Decodes one secret payload from its wire-format base64 text.
pub fn decode(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(payload)
}

/// Applies one event's worth of file-system changes.
///
/// Holds no state across events; the files under the sync directory are the
/// only record of what has been synced.
pub struct Reconciler {
    filter: BTreeMap<String, String>,
    rules: Vec<RemapRule>,
    sink: FileSink,
}

impl Reconciler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            filter: config.filter.annotations.clone(),
            rules: config.remap.clone(),
            sink: FileSink::new(config.sync_dir.clone()),
        }
    }

    /// Reconciles a single event. Scope is decided once for the whole
    /// resource; after that every data key is processed independently, and a
    /// failing key is logged and skipped without affecting its siblings.
    pub fn apply(&self, event: &ResourceEvent) {
        if !filter::matches(&event.annotations, &self.filter) {
            debug!(
                "secret {} does not match the annotation filter, skipping",
                event.name
            );
            return;
        }

        info!("got secret event: secret={} type={}", event.name, event.kind);

        match event.kind {
            EventKind::Deleted => self.remove_keys(event),
            EventKind::Added | EventKind::Modified => self.write_keys(event),
        }
    }

    fn write_keys(&self, event: &ResourceEvent) {
        for (key, payload) in &event.data {
            let filename = remap(key, &self.rules, &event.name);
            let bytes = match decode(payload) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(
                        "secret={} key={} can't be decoded as base64, skipping: {}",
                        event.name, key, err
                    );
                    continue;
                }
            };
            match self.sink.write(&filename, &bytes) {
                Ok(path) => info!(
                    "secret={} key={} written to {}",
                    event.name,
                    key,
                    path.display()
                ),
                Err(err) => error!(
                    "secret={} key={} can't be synced: {}",
                    event.name, key, err
                ),
            }
        }
    }

    fn remove_keys(&self, event: &ResourceEvent) {
        for key in event.data.keys() {
            let filename = remap(key, &self.rules, &event.name);
            match self.sink.delete(&filename) {
                Ok(Some(path)) => info!(
                    "secret={} key={} removed from {}",
                    event.name,
                    key,
                    path.display()
                ),
                Ok(None) => debug!("secret={} key={} already absent", event.name, key),
                Err(err) => error!(
                    "secret={} key={} can't be removed: {}",
                    event.name, key, err
                ),
            }
        }
    }
}

/// Reconnect pacing for the watch loop: exponential growth from `base_millis`
/// up to the `max_delay` ceiling, with jitter. Retries are unbounded in
/// count; only the interval is capped.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub base_millis: u64,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_millis: 10,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    fn delays(self) -> impl Iterator<Item = Duration> {
        let max_delay = self.max_delay;
        ExponentialBackoff::from_millis(self.base_millis)
            .map(move |delay| jitter(delay.min(max_delay)))
    }
}

/// Drives the watch until shutdown: connect, stream events one at a time
/// into the reconciler, and reconnect with backoff whenever the stream ends
/// or fails. Stream trouble is never fatal; only the shutdown signal ends
/// the loop, and it always ends it cleanly.
pub async fn run_loop<S: EventSource>(
    mut source: S,
    reconciler: Reconciler,
    policy: ReconnectPolicy,
    shutdown: &Notify,
) -> anyhow::Result<()> {
    let mut delays = policy.delays();

    loop {
        let mut events = tokio::select! {
            _ = shutdown.notified() => {
                info!("shutdown requested, stopping");
                return Ok(());
            }
            connected = source.subscribe() => match connected {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("watch connection failed: {}", err);
                    if !pause(&mut delays, policy.max_delay, shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
            }
        };

        info!("watching secrets events");
        let mut delivered = false;

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("shutdown requested, stopping");
                    return Ok(());
                }
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        // A stream that proves healthy earns a fresh backoff
                        // schedule; one that drops before delivering anything
                        // keeps climbing toward the ceiling.
                        if !delivered {
                            delivered = true;
                            delays = policy.delays();
                        }
                        reconciler.apply(&event);
                    }
                    Some(Err(err)) => {
                        warn!("watch stream failed, reconnecting: {}", err);
                        break;
                    }
                    None => {
                        info!("watch stream ended, reconnecting");
                        break;
                    }
                }
            }
        }

        if !pause(&mut delays, policy.max_delay, shutdown).await {
            return Ok(());
        }
    }
}

// Returns false when shutdown fired during the wait.
async fn pause(
    delays: &mut impl Iterator<Item = Duration>,
    fallback: Duration,
    shutdown: &Notify,
) -> bool {
    let delay = delays.next().unwrap_or(fallback);
    debug!("reconnecting in {:?}", delay);
    tokio::select! {
        _ = shutdown.notified() => {
            info!("shutdown requested, stopping");
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}
