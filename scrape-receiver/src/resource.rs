//! Resolution of the entity a scrape batch is attributed to.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Serialize;

use crate::labels::{Labels, SCHEME_LABEL};
use crate::target::Target;

/// Semantic convention attribute for the job name.
pub const SERVICE_NAME: &str = "service.name";
/// Semantic convention attribute for the instance address.
pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";
/// Semantic convention attribute for the scraped host.
pub const NET_HOST_NAME: &str = "net.host.name";
/// Semantic convention attribute for the scraped port.
pub const NET_HOST_PORT: &str = "net.host.port";
/// Semantic convention attribute for the scrape scheme.
pub const HTTP_SCHEME: &str = "http.scheme";

const KUBERNETES_META_PREFIX: &str = "__meta_kubernetes_";

/// Kubernetes discovery labels mapped directly to resource attributes.
const KUBERNETES_ATTRIBUTES: &[(&str, &str)] = &[
    ("namespace", "k8s.namespace.name"),
    ("pod_name", "k8s.pod.name"),
    ("pod_uid", "k8s.pod.uid"),
    ("pod_container_name", "k8s.container.name"),
    ("pod_node_name", "k8s.node.name"),
    ("node_name", "k8s.node.name"),
];

/// Pod controller kinds and the attribute that receives the controller name.
const KUBERNETES_CONTROLLERS: &[(&str, &str)] = &[
    ("ReplicaSet", "k8s.replicaset.name"),
    ("DaemonSet", "k8s.daemonset.name"),
    ("StatefulSet", "k8s.statefulset.name"),
    ("Job", "k8s.job.name"),
    ("CronJob", "k8s.cronjob.name"),
];

/// The monitored entity all metrics of a batch are attributed to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Resource {
    /// The job name.
    pub job: String,
    /// The instance address, usually `host:port`.
    pub instance: String,
    /// The scheme used to scrape the target.
    pub scheme: Option<String>,
    /// The host part of the instance, unless it is a loopback or wildcard address.
    pub host: Option<String>,
    /// The port part of the instance.
    pub port: Option<String>,
    /// Additional target-level attributes derived from service discovery.
    pub attributes: BTreeMap<String, String>,
}

impl Resource {
    /// Resolves the resource for a target.
    ///
    /// `job` and `instance` are the values validated against the target while appending. Values
    /// the target defines after relabeling take precedence, the scheme and discovery metadata are
    /// read from the discovered labels when relabeling dropped them.
    pub fn new(job: &str, instance: &str, target: &Target) -> Self {
        let job = target.job().unwrap_or(job);
        let instance = target.instance().unwrap_or(instance);

        let scheme = target
            .processed
            .get(SCHEME_LABEL)
            .or_else(|| target.discovered.get(SCHEME_LABEL))
            .filter(|scheme| !scheme.is_empty())
            .map(str::to_owned);

        let (host, port) = split_host_port(instance);

        Self {
            job: job.to_owned(),
            instance: instance.to_owned(),
            scheme,
            host: Some(host)
                .filter(|host| is_discernible_host(host))
                .map(str::to_owned),
            port: port.map(str::to_owned),
            attributes: kubernetes_attributes(&target.discovered),
        }
    }

    /// Returns all attributes of this resource keyed by their semantic convention names.
    pub fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attributes = vec![
            (SERVICE_NAME, self.job.as_str()),
            (SERVICE_INSTANCE_ID, self.instance.as_str()),
        ];

        if let Some(host) = self.host.as_deref() {
            attributes.push((NET_HOST_NAME, host));
        }
        if let Some(port) = self.port.as_deref() {
            attributes.push((NET_HOST_PORT, port));
        }
        if let Some(scheme) = self.scheme.as_deref() {
            attributes.push((HTTP_SCHEME, scheme));
        }

        attributes.extend(
            self.attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );

        attributes
    }
}

/// Splits an instance address into host and port.
///
/// Bracketed IPv6 addresses are unwrapped. Without a port, the entire instance is the host.
fn split_host_port(instance: &str) -> (&str, Option<&str>) {
    if let Some(rest) = instance.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':').filter(|p| !p.is_empty())),
            None => (instance, None),
        };
    }

    match instance.split_once(':') {
        // More than one colon without brackets is a bare IPv6 address.
        Some((_, port)) if port.contains(':') => (instance, None),
        Some((host, port)) => (host, Some(port).filter(|p| !p.is_empty())),
        None => (instance, None),
    }
}

/// Loopback and unspecified addresses do not identify a machine and are not reported.
fn is_discernible_host(host: &str) -> bool {
    match host.parse::<IpAddr>() {
        Ok(ip) => !ip.is_loopback() && !ip.is_unspecified(),
        Err(_) => !host.is_empty() && !host.eq_ignore_ascii_case("localhost"),
    }
}

fn kubernetes_attributes(discovered: &Labels) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut controller_kind = None;
    let mut controller_name = None;

    for label in discovered {
        let Some(meta) = label.name.strip_prefix(KUBERNETES_META_PREFIX) else {
            continue;
        };

        match meta {
            "pod_controller_kind" => controller_kind = Some(label.value.as_str()),
            "pod_controller_name" => controller_name = Some(label.value.as_str()),
            _ => {
                if let Some((_, key)) = KUBERNETES_ATTRIBUTES.iter().find(|(m, _)| *m == meta) {
                    attributes.insert((*key).to_owned(), label.value.clone());
                }
            }
        }
    }

    if let (Some(kind), Some(name)) = (controller_kind, controller_name) {
        if let Some((_, key)) = KUBERNETES_CONTROLLERS.iter().find(|(k, _)| *k == kind) {
            attributes.insert((*key).to_owned(), name.to_owned());
        }
    }

    attributes
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::labels;

    #[test]
    fn test_resource_from_discovered_scheme() {
        let target = Target::new(
            labels! { "instance" => "localhost:8080" },
            labels! {
                "__address__" => "address:8080",
                "__name__" => "foo",
                "__scheme__" => "http",
            },
        );

        let resource = Resource::new("test", "localhost:8080", &target);
        assert_eq!(
            resource,
            Resource {
                job: "test".to_owned(),
                instance: "localhost:8080".to_owned(),
                scheme: Some("http".to_owned()),
                host: None,
                port: Some("8080".to_owned()),
                attributes: BTreeMap::new(),
            }
        );

        // Resolution is deterministic.
        assert_eq!(resource, Resource::new("test", "localhost:8080", &target));
    }

    #[test]
    fn test_processed_labels_take_precedence() {
        let target = Target::new(
            labels! { "job" => "relabeled", "__scheme__" => "https" },
            labels! { "job" => "original", "__scheme__" => "http" },
        );

        let resource = Resource::new("ignored", "db-1.internal:5432", &target);
        assert_eq!(resource.job, "relabeled");
        assert_eq!(resource.scheme.as_deref(), Some("https"));
        assert_eq!(resource.host.as_deref(), Some("db-1.internal"));
        assert_eq!(resource.port.as_deref(), Some("5432"));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("host:80"), ("host", Some("80")));
        assert_eq!(split_host_port("host"), ("host", None));
        assert_eq!(split_host_port("[::1]:9090"), ("::1", Some("9090")));
        assert_eq!(split_host_port("fe80::1"), ("fe80::1", None));
    }

    #[test]
    fn test_discernible_host() {
        for host in ["localhost", "127.0.0.1", "127.0.0.2", "0.0.0.0", "::1", "::", ""] {
            assert!(!is_discernible_host(host), "{host}");
        }
        for host in ["10.0.0.5", "fe80::1", "db-1.internal"] {
            assert!(is_discernible_host(host), "{host}");
        }

        let target = Target::new(labels! {}, labels! {});
        assert_eq!(Resource::new("job", "[::]:9090", &target).host, None);
    }

    #[test]
    fn test_kubernetes_attributes() {
        let target = Target::new(
            labels! { "instance" => "10.1.2.3:9100" },
            labels! {
                "__meta_kubernetes_namespace" => "monitoring",
                "__meta_kubernetes_pod_name" => "exporter-7d9f",
                "__meta_kubernetes_pod_controller_kind" => "ReplicaSet",
                "__meta_kubernetes_pod_controller_name" => "exporter-5c6b",
                "__meta_kubernetes_pod_label_app" => "exporter",
            },
        );

        let resource = Resource::new("node", "10.1.2.3:9100", &target);
        assert_eq!(
            resource.attributes(),
            vec![
                (SERVICE_NAME, "node"),
                (SERVICE_INSTANCE_ID, "10.1.2.3:9100"),
                (NET_HOST_NAME, "10.1.2.3"),
                (NET_HOST_PORT, "9100"),
                ("k8s.namespace.name", "monitoring"),
                ("k8s.pod.name", "exporter-7d9f"),
                ("k8s.replicaset.name", "exporter-5c6b"),
            ]
        );
    }
}
