//! gRPC discovery service implementations.
//!
//! Five streaming services share one stream loop: a per-type service for
//! each of EDS, CDS, RDS and LDS, plus the aggregated service multiplexing
//! all four on one stream. Only the SOTW protocol is served; the delta
//! variants and the unary fetch endpoints answer unimplemented.

mod discovery;

use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryService;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryService;
use envoy_types::pb::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryService;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryService;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryService;

use super::cache::SnapshotCache;
use super::resources::{
    CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};
use discovery::run_discovery_stream;

type SotwStream = ReceiverStream<Result<DiscoveryResponse, Status>>;
type DeltaStream = ReceiverStream<Result<DeltaDiscoveryResponse, Status>>;

fn delta_unimplemented() -> Status {
    Status::unimplemented("delta xDS is not supported; use the state-of-the-world streams")
}

fn fetch_unimplemented() -> Status {
    Status::unimplemented("unary fetch is not supported; use the streaming endpoints")
}

/// Aggregated discovery: every resource type on one stream.
pub struct AggregatedDiscoveryServiceImpl {
    cache: Arc<SnapshotCache>,
}

impl AggregatedDiscoveryServiceImpl {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for AggregatedDiscoveryServiceImpl {
    type StreamAggregatedResourcesStream = SotwStream;
    type DeltaAggregatedResourcesStream = DeltaStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let stream =
            run_discovery_stream(self.cache.clone(), request.into_inner(), None, "ADS");
        Ok(Response::new(stream))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(delta_unimplemented())
    }
}

/// Endpoint discovery (EDS).
pub struct EndpointDiscoveryServiceImpl {
    cache: Arc<SnapshotCache>,
}

impl EndpointDiscoveryServiceImpl {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }
}

#[tonic::async_trait]
impl EndpointDiscoveryService for EndpointDiscoveryServiceImpl {
    type StreamEndpointsStream = SotwStream;
    type DeltaEndpointsStream = DeltaStream;

    async fn stream_endpoints(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamEndpointsStream>, Status> {
        let stream = run_discovery_stream(
            self.cache.clone(),
            request.into_inner(),
            Some(ENDPOINT_TYPE_URL),
            "EDS",
        );
        Ok(Response::new(stream))
    }

    async fn delta_endpoints(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaEndpointsStream>, Status> {
        Err(delta_unimplemented())
    }

    async fn fetch_endpoints(
        &self,
        _request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        Err(fetch_unimplemented())
    }
}

/// Cluster discovery (CDS).
pub struct ClusterDiscoveryServiceImpl {
    cache: Arc<SnapshotCache>,
}

impl ClusterDiscoveryServiceImpl {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }
}

#[tonic::async_trait]
impl ClusterDiscoveryService for ClusterDiscoveryServiceImpl {
    type StreamClustersStream = SotwStream;
    type DeltaClustersStream = DeltaStream;

    async fn stream_clusters(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamClustersStream>, Status> {
        let stream = run_discovery_stream(
            self.cache.clone(),
            request.into_inner(),
            Some(CLUSTER_TYPE_URL),
            "CDS",
        );
        Ok(Response::new(stream))
    }

    async fn delta_clusters(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaClustersStream>, Status> {
        Err(delta_unimplemented())
    }

    async fn fetch_clusters(
        &self,
        _request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        Err(fetch_unimplemented())
    }
}

/// Route discovery (RDS).
pub struct RouteDiscoveryServiceImpl {
    cache: Arc<SnapshotCache>,
}

impl RouteDiscoveryServiceImpl {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }
}

#[tonic::async_trait]
impl RouteDiscoveryService for RouteDiscoveryServiceImpl {
    type StreamRoutesStream = SotwStream;
    type DeltaRoutesStream = DeltaStream;

    async fn stream_routes(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamRoutesStream>, Status> {
        let stream = run_discovery_stream(
            self.cache.clone(),
            request.into_inner(),
            Some(ROUTE_TYPE_URL),
            "RDS",
        );
        Ok(Response::new(stream))
    }

    async fn delta_routes(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaRoutesStream>, Status> {
        Err(delta_unimplemented())
    }

    async fn fetch_routes(
        &self,
        _request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        Err(fetch_unimplemented())
    }
}

/// Listener discovery (LDS).
pub struct ListenerDiscoveryServiceImpl {
    cache: Arc<SnapshotCache>,
}

impl ListenerDiscoveryServiceImpl {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }
}

#[tonic::async_trait]
impl ListenerDiscoveryService for ListenerDiscoveryServiceImpl {
    type StreamListenersStream = SotwStream;
    type DeltaListenersStream = DeltaStream;

    async fn stream_listeners(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamListenersStream>, Status> {
        let stream = run_discovery_stream(
            self.cache.clone(),
            request.into_inner(),
            Some(LISTENER_TYPE_URL),
            "LDS",
        );
        Ok(Response::new(stream))
    }

    async fn delta_listeners(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaListenersStream>, Status> {
        Err(delta_unimplemented())
    }

    async fn fetch_listeners(
        &self,
        _request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        Err(fetch_unimplemented())
    }
}
