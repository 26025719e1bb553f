use policy_assistant_core::{InternalPeer, Protocol, TrafficPeer};
use policy_assistant_k8s_api::{self as k8s, Labels, ResourceExt};
use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr},
};
use tracing::debug;

/// The namespaces and pods that traffic is simulated between.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resources {
    pub namespaces: BTreeMap<String, Labels>,
    pub pods: Vec<Pod>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    pub labels: Labels,
    pub ip: Option<IpAddr>,
    pub node: Option<String>,

    /// E.g. `deployment/web`, derived from the pod's owner.
    pub workload: String,
    pub containers: Vec<Container>,
}

/// A single served port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub port: u16,
    pub port_name: Option<String>,
    pub protocol: Protocol,
}

// === impl Resources ===

impl Resources {
    /// A cluster with every pod in every namespace serving every port on every protocol.
    ///
    /// Namespaces are labeled `ns: <name>`, pods `pod: <name>`, and each port is named
    /// `serve-<port>-<protocol>`. Pods get `192.168.<namespace index>.<pod index + 1>`; pods
    /// beyond that range get no IP.
    pub fn synthetic(
        namespaces: &[String],
        pods: &[String],
        ports: &[u16],
        protocols: &[Protocol],
    ) -> Self {
        let mut resources = Self::default();
        for (n, ns) in namespaces.iter().enumerate() {
            resources.namespaces.insert(
                ns.clone(),
                Labels::from_iter([
                    ("ns".to_string(), ns.clone()),
                    ("kubernetes.io/metadata.name".to_string(), ns.clone()),
                ]),
            );
            for (p, pod) in pods.iter().enumerate() {
                let containers = ports
                    .iter()
                    .flat_map(|port| {
                        protocols.iter().map(move |protocol| {
                            let suffix = format!("{port}-{}", protocol.to_string().to_lowercase());
                            Container {
                                name: format!("cont-{suffix}"),
                                port: *port,
                                port_name: Some(format!("serve-{suffix}")),
                                protocol: *protocol,
                            }
                        })
                    })
                    .collect();
                resources.pods.push(Pod {
                    namespace: ns.clone(),
                    name: pod.clone(),
                    labels: Labels::from_iter([("pod".to_string(), pod.clone())]),
                    ip: synthetic_ip(n, p),
                    node: None,
                    workload: format!("pod/{pod}"),
                    containers,
                });
            }
        }
        resources
    }

    /// Builds resources from live objects. Pods in unknown namespaces get no namespace labels.
    pub fn from_k8s(namespaces: &[k8s::Namespace], pods: &[k8s::Pod]) -> Self {
        let namespaces = namespaces
            .iter()
            .map(|ns| (ns.name_any(), Labels::from(ns.metadata.labels.clone())))
            .collect();
        let pods = pods.iter().filter_map(Pod::from_k8s).collect();
        Self { namespaces, pods }
    }

    pub fn namespace_labels(&self, namespace: &str) -> Labels {
        self.namespaces.get(namespace).cloned().unwrap_or_default()
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<&Pod> {
        self.pods
            .iter()
            .find(|p| p.namespace == namespace && p.name == name)
    }

    pub fn traffic_peer(&self, pod: &Pod) -> TrafficPeer {
        TrafficPeer::internal(
            InternalPeer::new(
                pod.namespace.clone(),
                self.namespace_labels(&pod.namespace),
                pod.labels.clone(),
            )
            .with_workload(pod.workload.clone()),
            pod.ip,
        )
    }
}

fn synthetic_ip(namespace: usize, pod: usize) -> Option<IpAddr> {
    match (u8::try_from(namespace), u8::try_from(pod + 1)) {
        (Ok(n), Ok(p)) => Some(IpAddr::V4(Ipv4Addr::new(192, 168, n, p))),
        _ => {
            debug!(namespace, pod, "No synthetic IP left");
            None
        }
    }
}

// === impl Pod ===

impl Pod {
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn container_for_port(&self, port: u16, protocol: Protocol) -> Option<&Container> {
        self.containers
            .iter()
            .find(|c| c.port == port && c.protocol == protocol)
    }

    pub fn container_for_name(&self, name: &str, protocol: Protocol) -> Option<&Container> {
        self.containers
            .iter()
            .find(|c| c.port_name.as_deref() == Some(name) && c.protocol == protocol)
    }

    fn from_k8s(pod: &k8s::Pod) -> Option<Self> {
        let namespace = pod.namespace()?;
        let name = pod.name_any();
        let spec = pod.spec.as_ref()?;

        let mut containers = Vec::new();
        for container in &spec.containers {
            for port in container.ports.iter().flatten() {
                let Some(number) = u16::try_from(port.container_port).ok().filter(|p| *p != 0)
                else {
                    debug!(pod = %name, port = port.container_port, "Skipping invalid port");
                    continue;
                };
                let protocol = match port.protocol.as_deref().unwrap_or("TCP").parse() {
                    Ok(protocol) => protocol,
                    Err(error) => {
                        debug!(pod = %name, %error, "Skipping container port");
                        continue;
                    }
                };
                containers.push(Container {
                    name: container.name.clone(),
                    port: number,
                    port_name: port.name.clone(),
                    protocol,
                });
            }
        }

        let ip = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.as_deref())
            .and_then(|ip| ip.parse().ok());

        Some(Self {
            workload: workload(pod),
            labels: Labels::from(pod.metadata.labels.clone()),
            node: spec.node_name.clone(),
            namespace,
            name,
            ip,
            containers,
        })
    }
}

/// Names the workload that owns a pod, e.g. `deployment/web` for a pod owned by the ReplicaSet
/// `web-5d8f7c9b4`.
pub fn workload(pod: &k8s::Pod) -> String {
    let owner = pod
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|o| o.controller == Some(true))
        .or_else(|| pod.metadata.owner_references.iter().flatten().next());
    match owner {
        Some(o) if o.kind == "ReplicaSet" => match o.name.rsplit_once('-') {
            Some((deployment, _hash)) => format!("deployment/{deployment}"),
            None => format!("replicaset/{}", o.name),
        },
        Some(o) => format!("{}/{}", o.kind.to_lowercase(), o.name),
        None => format!("pod/{}", pod.name_any()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s::{Container as K8sContainer, ContainerPort, ObjectMeta, OwnerReference, PodSpec};

    #[test]
    fn synthetic() {
        let resources = Resources::synthetic(
            &["x".to_string(), "y".to_string()],
            &["a".to_string(), "b".to_string()],
            &[80, 81],
            &[Protocol::Tcp, Protocol::Udp],
        );
        assert_eq!(resources.namespaces.len(), 2);
        assert_eq!(resources.pods.len(), 4);

        let pod = resources.pod("y", "b").expect("pod must exist");
        assert_eq!(pod.containers.len(), 4);
        assert_eq!(pod.ip, Some("192.168.1.2".parse().unwrap()));
        let udp_81 = pod
            .container_for_port(81, Protocol::Udp)
            .expect("container must exist");
        assert_eq!(udp_81.port_name.as_deref(), Some("serve-81-udp"));
        assert_eq!(
            pod.container_for_name("serve-80-tcp", Protocol::Tcp)
                .map(|c| c.port),
            Some(80)
        );
        assert!(pod.container_for_name("serve-80-tcp", Protocol::Udp).is_none());

        let peer = resources.traffic_peer(pod);
        let internal = peer.internal.expect("peer must be internal");
        assert_eq!(internal.namespace_labels.get("ns"), Some("y"));
        assert_eq!(internal.to_string(), "y/pod/b");
    }

    #[test]
    fn synthetic_ips_are_unique() {
        let pods = (0..300).map(|p| format!("p{p}")).collect::<Vec<_>>();
        let resources =
            Resources::synthetic(&["x".to_string()], &pods, &[80], &[Protocol::Tcp]);

        let ips = resources.pods.iter().filter_map(|p| p.ip).collect::<Vec<_>>();
        assert_eq!(ips.len(), 255);
        let unique = ips.iter().collect::<std::collections::BTreeSet<_>>();
        assert_eq!(unique.len(), ips.len());
        let ip = |name| resources.pod("x", name).and_then(|p| p.ip);
        assert_eq!(ip("p254"), Some("192.168.0.255".parse().unwrap()));
        assert_eq!(ip("p255"), None);
    }

    fn mk_pod(owner: Option<(&str, &str)>) -> k8s::Pod {
        k8s::Pod {
            metadata: ObjectMeta {
                namespace: Some("ns-0".to_string()),
                name: Some("web-5d8f7c9b4-abcde".to_string()),
                labels: Some(maplit::btreemap! { "app".to_string() => "web".to_string() }),
                owner_references: owner.map(|(kind, name)| {
                    vec![OwnerReference {
                        kind: kind.to_string(),
                        name: name.to_string(),
                        controller: Some(true),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-0".to_string()),
                containers: vec![K8sContainer {
                    name: "web".to_string(),
                    ports: Some(vec![
                        ContainerPort {
                            container_port: 8080,
                            name: Some("http".to_string()),
                            ..Default::default()
                        },
                        ContainerPort {
                            container_port: 53,
                            protocol: Some("UDP".to_string()),
                            ..Default::default()
                        },
                        ContainerPort {
                            container_port: 9,
                            protocol: Some("ICMP".to_string()),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(k8s::PodStatus {
                pod_ip: Some("10.0.0.7".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn from_k8s() {
        let ns = k8s::Namespace {
            metadata: ObjectMeta {
                name: Some("ns-0".to_string()),
                labels: Some(maplit::btreemap! { "team".to_string() => "a".to_string() }),
                ..Default::default()
            },
            ..Default::default()
        };
        let resources =
            Resources::from_k8s(&[ns], &[mk_pod(Some(("ReplicaSet", "web-5d8f7c9b4")))]);

        assert_eq!(resources.namespace_labels("ns-0").get("team"), Some("a"));
        assert_eq!(resources.namespace_labels("missing"), Labels::default());

        let pod = resources
            .pod("ns-0", "web-5d8f7c9b4-abcde")
            .expect("pod must exist");
        assert_eq!(pod.workload, "deployment/web");
        assert_eq!(pod.ip, Some("10.0.0.7".parse().unwrap()));
        assert_eq!(pod.node.as_deref(), Some("node-0"));
        assert_eq!(
            pod.containers,
            vec![
                Container {
                    name: "web".to_string(),
                    port: 8080,
                    port_name: Some("http".to_string()),
                    protocol: Protocol::Tcp,
                },
                Container {
                    name: "web".to_string(),
                    port: 53,
                    port_name: None,
                    protocol: Protocol::Udp,
                },
            ]
        );
    }

    #[test]
    fn workloads() {
        assert_eq!(
            workload(&mk_pod(Some(("StatefulSet", "db")))),
            "statefulset/db"
        );
        assert_eq!(workload(&mk_pod(None)), "pod/web-5d8f7c9b4-abcde");
    }
}
