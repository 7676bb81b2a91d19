//! Virtual-host construction.
//!
//! Every service gets one virtual host per route configuration: the mesh
//! matches on the service hostname (with and without the ingress port) and
//! forwards everything to the target cluster with a single prefix route.

use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, RetryPolicy, Route, RouteAction, RouteMatch,
    VirtualHost,
};
use envoy_types::pb::google::protobuf::{Duration, UInt32Value};

use crate::provider::RetryConfig;

const RETRY_ON_5XX: &str = "5xx";
const PER_TRY_TIMEOUT_NANOS: i32 = 500_000_000;

/// What a virtual host routes: one hostname mapped onto one target cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHostSpec {
    pub hostname: String,
    pub target_cluster: String,
    pub retry: RetryConfig,
}

impl VirtualHostSpec {
    pub fn new(hostname: impl Into<String>, target_cluster: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            target_cluster: target_cluster.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Build a virtual host matching `hostname` and `hostname:<ingress_port>`
/// with a single prefix-`/` route to the target cluster.
pub fn make_virtual_host(spec: &VirtualHostSpec, ingress_port: u32) -> VirtualHost {
    let retry_policy = spec.retry.enabled.then(|| RetryPolicy {
        retry_on: RETRY_ON_5XX.to_string(),
        num_retries: Some(UInt32Value { value: spec.retry.num_retries }),
        per_try_timeout: Some(Duration { seconds: 0, nanos: PER_TRY_TIMEOUT_NANOS }),
        ..Default::default()
    });

    VirtualHost {
        name: format!("vhost_{}", spec.hostname),
        domains: vec![spec.hostname.clone(), format!("{}:{}", spec.hostname, ingress_port)],
        routes: vec![Route {
            r#match: Some(RouteMatch {
                path_specifier: Some(
                    envoy_types::pb::envoy::config::route::v3::route_match::PathSpecifier::Prefix(
                        "/".to_string(),
                    ),
                ),
                ..Default::default()
            }),
            action: Some(Action::Route(RouteAction {
                cluster_specifier: Some(ClusterSpecifier::Cluster(spec.target_cluster.clone())),
                retry_policy,
                ..Default::default()
            })),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Extract the target cluster of a route action, if any.
pub fn route_action_cluster(route: &Route) -> Option<&str> {
    match route.action.as_ref()? {
        Action::Route(action) => match action.cluster_specifier.as_ref()? {
            ClusterSpecifier::Cluster(name) => Some(name),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vhost_naming_and_domains() {
        let vhost = make_virtual_host(&VirtualHostSpec::new("alpha.svc", "local_alpha.svc"), 4100);

        assert_eq!(vhost.name, "vhost_alpha.svc");
        assert_eq!(vhost.domains, vec!["alpha.svc".to_string(), "alpha.svc:4100".to_string()]);
        assert_eq!(vhost.routes.len(), 1);
        assert_eq!(route_action_cluster(&vhost.routes[0]), Some("local_alpha.svc"));
    }

    #[test]
    fn test_retry_policy_only_when_enabled() {
        let plain = make_virtual_host(&VirtualHostSpec::new("a.svc", "a.svc"), 4100);
        let action = match plain.routes[0].action.as_ref().unwrap() {
            Action::Route(action) => action,
            other => panic!("unexpected action: {:?}", other),
        };
        assert!(action.retry_policy.is_none());

        let retried = make_virtual_host(
            &VirtualHostSpec::new("a.svc", "a.svc")
                .with_retry(RetryConfig { enabled: true, num_retries: 5 }),
            4100,
        );
        let action = match retried.routes[0].action.as_ref().unwrap() {
            Action::Route(action) => action,
            other => panic!("unexpected action: {:?}", other),
        };
        let policy = action.retry_policy.as_ref().unwrap();
        assert_eq!(policy.retry_on, "5xx");
        assert_eq!(policy.num_retries.as_ref().unwrap().value, 5);
        assert_eq!(policy.per_try_timeout.as_ref().unwrap().nanos, 500_000_000);
    }
}
