use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use futures::{Stream, StreamExt, stream::BoxStream};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Client, ResourceExt,
    api::{Api, ApiResource, DynamicObject, WatchEvent, WatchParams},
    core::ErrorResponse,
};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
        })
    }
}

/// One change notification for a secret, carrying the full annotation and
/// data mappings as of that point. Data values are the wire-format base64
/// text; decoding them is the reconciler's per-key concern.
#[derive(Clone, Debug)]
pub struct ResourceEvent {
    pub kind: EventKind,
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
#[error("can't establish secret watch: {0}")]
pub struct ConnectError(#[from] pub kube::Error);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("watch transport failed: {0}")]
    Transport(#[from] kube::Error),
    #[error("watch rejected by the api server: {0}")]
    Api(ErrorResponse),
}

/// Supplies ordered change events for one namespace.
///
/// A stream may end or fail at any time; callers re-subscribe to resume.
/// Every subscription replays the current state before live updates, which
/// is what lets the reconciler converge after a disconnect without keeping
/// any index of previously synced keys.
pub trait EventSource {
    type Stream: Stream<Item = Result<ResourceEvent, StreamError>> + Unpin + Send;

    fn subscribe(&mut self) -> impl Future<Output = Result<Self::Stream, ConnectError>> + Send;
}

/// Event source backed by a raw watch on the `Secret` resource.
///
/// Secrets are watched as `DynamicObject` rather than the typed resource so
/// the payload stays undecoded base64 text on the way in; a corrupt value in
/// one key must not be able to fail delivery of the whole object.
pub struct SecretEventSource {
    api: Api<DynamicObject>,
}

impl SecretEventSource {
    pub fn new(client: Client, namespace: &str) -> Self {
        let resource = ApiResource::erase::<Secret>(&());
        Self {
            api: Api::namespaced_with(client, namespace, &resource),
        }
    }
}

impl EventSource for SecretEventSource {
    type Stream = BoxStream<'static, Result<ResourceEvent, StreamError>>;

    async fn subscribe(&mut self) -> Result<Self::Stream, ConnectError> {
        // Resource version "0" replays the namespace's current secrets as
        // ADDED events before streaming live changes.
        let events = self.api.watch(&WatchParams::default(), "0").await?;
        Ok(events
            .filter_map(|event| async move {
                match event {
                    Ok(WatchEvent::Added(object)) => {
                        Some(Ok(ResourceEvent::from_object(EventKind::Added, object)))
                    }
                    Ok(WatchEvent::Modified(object)) => {
                        Some(Ok(ResourceEvent::from_object(EventKind::Modified, object)))
                    }
                    Ok(WatchEvent::Deleted(object)) => {
                        Some(Ok(ResourceEvent::from_object(EventKind::Deleted, object)))
                    }
                    Ok(WatchEvent::Bookmark(_)) => None,
                    Ok(WatchEvent::Error(response)) => Some(Err(StreamError::Api(response))),
                    Err(err) => Some(Err(StreamError::Transport(err))),
                }
            })
            .boxed())
    }
}

impl ResourceEvent {
    fn from_object(kind: EventKind, object: DynamicObject) -> Self {
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        let annotations = object.annotations().clone();
        let data = object
            .data
            .get("data")
            .and_then(|fields| fields.as_object())
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(key, value)| {
                        value.as_str().map(|payload| (key.clone(), payload.to_owned()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            kind,
            name,
            namespace,
            annotations,
            data,
        }
    }
}
