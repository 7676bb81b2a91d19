//! The SOTW discovery stream loop.
//!
//! One loop instance serves one client stream. Requests are classified
//! against the per-type nonce bookkeeping into ACK, NACK, subscription, or
//! stale; every live request re-arms a one-shot cache watch for its type,
//! and fired watches flow through an internal per-stream queue before being
//! stamped with a fresh nonce and sent. The aggregated stream runs the same
//! loop with the type taken from each request.

use std::collections::HashMap;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tonic::Status;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::xds::cache::{SnapshotCache, WatchId, WatchRequest, WatchResponse};

/// Per-type ACK/NACK bookkeeping of one stream.
#[derive(Debug, Default)]
struct TypeState {
    /// Nonce of the last response sent for this type
    last_nonce: Option<String>,
    /// Version last acknowledged by the client
    acked_version: String,
    /// Watch currently armed in the cache, if any
    watch_id: Option<WatchId>,
}

/// How a request relates to the stream's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    /// First request of a type, or a spontaneous re-subscription
    Subscribe,
    /// Nonce matches the last response, no error attached
    Ack,
    /// Nonce matches the last response, error attached
    Nack,
    /// Nonce belongs to an older response; superseded, ignored
    Stale,
}

fn classify(state: &TypeState, request: &DiscoveryRequest) -> RequestKind {
    if request.response_nonce.is_empty() {
        return RequestKind::Subscribe;
    }
    match &state.last_nonce {
        Some(nonce) if *nonce == request.response_nonce => {
            if request.error_detail.is_none() {
                RequestKind::Ack
            } else {
                RequestKind::Nack
            }
        }
        _ => RequestKind::Stale,
    }
}

/// Run the shared SOTW stream loop.
///
/// `expected_type` pins the type URL for the single-type services (EDS,
/// CDS, RDS, LDS); `None` multiplexes by the request's type URL (ADS).
pub(crate) fn run_discovery_stream(
    cache: Arc<SnapshotCache>,
    mut in_stream: tonic::Streaming<DiscoveryRequest>,
    expected_type: Option<&'static str>,
    label: &'static str,
) -> ReceiverStream<Result<DiscoveryResponse, Status>> {
    let (out_tx, out_rx) = mpsc::channel::<Result<DiscoveryResponse, Status>>(100);
    // Internal per-stream queue carrying fired watches to the send side.
    let (fired_tx, mut fired_rx) = mpsc::channel::<(WatchId, WatchResponse)>(16);

    tokio::spawn(async move {
        let mut states: HashMap<String, TypeState> = HashMap::new();
        let mut stream_node: Option<String> = None;

        loop {
            tokio::select! {
                result = in_stream.next() => {
                    match result {
                        Some(Ok(request)) => {
                            handle_request(
                                &cache,
                                &mut states,
                                &mut stream_node,
                                &fired_tx,
                                expected_type,
                                label,
                                request,
                            );
                        }
                        Some(Err(e)) => {
                            warn!(stream = label, error = %e, "error receiving discovery request");
                            let _ = out_tx.send(Err(e)).await;
                            break;
                        }
                        None => {
                            info!(stream = label, "stream ended by client");
                            break;
                        }
                    }
                }
                Some((watch_id, fired)) = fired_rx.recv() => {
                    let nonce = Uuid::new_v4().to_string();
                    if let Some(state) = states.get_mut(&fired.type_url) {
                        state.last_nonce = Some(nonce.clone());
                        // A request may have superseded this watch already;
                        // only clear our own registration.
                        if state.watch_id == Some(watch_id) {
                            state.watch_id = None;
                        }
                    }

                    info!(
                        stream = label,
                        type_url = %fired.type_url,
                        version = %fired.version,
                        resource_count = fired.resources.len(),
                        nonce = %nonce,
                        "sending discovery response"
                    );

                    let response = DiscoveryResponse {
                        version_info: fired.version,
                        resources: fired.resources,
                        type_url: fired.type_url,
                        nonce,
                        ..Default::default()
                    };

                    if out_tx.send(Ok(response)).await.is_err() {
                        warn!(stream = label, "discovery response receiver dropped");
                        break;
                    }
                }
            }
        }

        // Stream closure cancels every watch this stream armed.
        for state in states.values() {
            if let Some(id) = state.watch_id {
                cache.cancel_watch(id);
            }
        }
    });

    ReceiverStream::new(out_rx)
}

#[allow(clippy::too_many_arguments)]
fn handle_request(
    cache: &Arc<SnapshotCache>,
    states: &mut HashMap<String, TypeState>,
    stream_node: &mut Option<String>,
    fired_tx: &mpsc::Sender<(WatchId, WatchResponse)>,
    expected_type: Option<&'static str>,
    label: &'static str,
    request: DiscoveryRequest,
) {
    // The node is usually only present on the first request of a stream.
    if let Some(node) = &request.node {
        if !node.id.is_empty() {
            *stream_node = Some(node.id.clone());
        }
    }
    let node_id = stream_node.clone().unwrap_or_default();

    let type_url = match expected_type {
        Some(expected) => {
            if !request.type_url.is_empty() && request.type_url != expected {
                warn!(
                    stream = label,
                    type_url = %request.type_url,
                    node_id = %node_id,
                    "discovery request for foreign type URL, ignoring"
                );
                return;
            }
            expected.to_string()
        }
        None => request.type_url.clone(),
    };
    if type_url.is_empty() {
        warn!(stream = label, node_id = %node_id, "discovery request without type URL, ignoring");
        return;
    }

    let state = states.entry(type_url.clone()).or_default();

    match classify(state, &request) {
        RequestKind::Ack => {
            state.acked_version = request.version_info.clone();
            debug!(
                stream = label,
                type_url = %type_url,
                version = %request.version_info,
                nonce = %request.response_nonce,
                node_id = %node_id,
                "[ACK] version acknowledged"
            );
        }
        RequestKind::Nack => {
            let error_detail = request.error_detail.as_ref();
            warn!(
                stream = label,
                type_url = %type_url,
                nonce = %request.response_nonce,
                error_code = error_detail.map(|e| e.code).unwrap_or_default(),
                error_message = error_detail.map(|e| e.message.as_str()).unwrap_or_default(),
                node_id = %node_id,
                "[NACK] client rejected previous response"
            );
        }
        RequestKind::Subscribe => {
            state.acked_version = request.version_info.clone();
            debug!(
                stream = label,
                type_url = %type_url,
                version = %request.version_info,
                node_id = %node_id,
                "subscription request"
            );
        }
        RequestKind::Stale => {
            debug!(
                stream = label,
                type_url = %type_url,
                nonce = %request.response_nonce,
                node_id = %node_id,
                "stale nonce, ignoring request"
            );
            return;
        }
    }

    // Re-arm the watch with the client's current acknowledged version. A
    // watch that is still parked is superseded by this request.
    if let Some(old) = state.watch_id.take() {
        cache.cancel_watch(old);
    }

    let (watch_rx, watch_id) = cache.create_watch(WatchRequest {
        node_id,
        type_url,
        known_version: state.acked_version.clone(),
        resource_names: request.resource_names.clone(),
    });
    state.watch_id = Some(watch_id);

    let fired_tx = fired_tx.clone();
    tokio::spawn(async move {
        if let Ok(response) = watch_rx.await {
            // A dropped queue means the stream is gone.
            let _ = fired_tx.send((watch_id, response)).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_types::pb::google::rpc::Status as RpcStatus;

    fn request(version: &str, nonce: &str, with_error: bool) -> DiscoveryRequest {
        DiscoveryRequest {
            version_info: version.to_string(),
            response_nonce: nonce.to_string(),
            error_detail: with_error.then(|| RpcStatus {
                code: 3,
                message: "rejected".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn state_with_nonce(nonce: &str) -> TypeState {
        TypeState {
            last_nonce: Some(nonce.to_string()),
            acked_version: String::new(),
            watch_id: None,
        }
    }

    #[test]
    fn test_first_request_is_a_subscription() {
        let state = TypeState::default();
        assert_eq!(classify(&state, &request("", "", false)), RequestKind::Subscribe);
    }

    #[test]
    fn test_matching_nonce_without_error_is_an_ack() {
        let state = state_with_nonce("n-1");
        assert_eq!(classify(&state, &request("v1", "n-1", false)), RequestKind::Ack);
    }

    #[test]
    fn test_matching_nonce_with_error_is_a_nack() {
        let state = state_with_nonce("n-1");
        assert_eq!(classify(&state, &request("v0", "n-1", true)), RequestKind::Nack);
    }

    #[test]
    fn test_unknown_nonce_is_stale() {
        let state = state_with_nonce("n-2");
        assert_eq!(classify(&state, &request("v1", "n-1", false)), RequestKind::Stale);
        // a nonce when we never sent one is equally stale
        assert_eq!(
            classify(&TypeState::default(), &request("v1", "n-1", false)),
            RequestKind::Stale
        );
    }
}
