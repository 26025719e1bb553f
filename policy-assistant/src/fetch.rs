//! Reads policies and workloads from a cluster.

use crate::{
    k8s::{AdminNetworkPolicy, BaselineAdminNetworkPolicy, Namespace, NetworkPolicy, Pod},
    load::Documents,
};
use futures::prelude::*;
use kube::{api::ListParams, Api, Client};
use std::{fmt, time::Duration};
use tokio::{sync::oneshot, time};
use tracing::{info, info_span, warn, Instrument};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The namespaces whose NetworkPolicies are read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Namespaces {
    All,
    Some(Vec<String>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tier {
    NetworkPolicies,
    AdminNetworkPolicies,
    BaselineAdminNetworkPolicies,
}

/// A tier that could not be read. Other tiers are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to list {tier}: {source}")]
    Api {
        tier: Tier,
        #[source]
        source: BoxError,
    },

    #[error("timed out listing {tier} after {timeout:?}")]
    Timeout { tier: Tier, timeout: Duration },

    #[error("task listing {tier} was lost")]
    Lost { tier: Tier },
}

/// Documents from every tier that could be read, and an error for every tier that could not.
#[derive(Debug, Default)]
pub struct Fetched {
    pub documents: Documents,
    pub errors: Vec<FetchError>,
}

// === impl Tier ===

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkPolicies => "NetworkPolicies".fmt(f),
            Self::AdminNetworkPolicies => "AdminNetworkPolicies".fmt(f),
            Self::BaselineAdminNetworkPolicies => "BaselineAdminNetworkPolicies".fmt(f),
        }
    }
}

/// Lists NetworkPolicies, AdminNetworkPolicies and BaselineAdminNetworkPolicies concurrently.
pub async fn policies(client: Client, namespaces: Namespaces, timeout: Duration) -> Fetched {
    let netpols = {
        let client = client.clone();
        async move {
            match namespaces {
                Namespaces::All => list(Api::<NetworkPolicy>::all(client)).await,
                Namespaces::Some(namespaces) => {
                    let mut netpols = Vec::new();
                    for ns in namespaces {
                        let api = Api::<NetworkPolicy>::namespaced(client.clone(), &ns);
                        netpols.extend(list(api).await?);
                    }
                    Ok(netpols)
                }
            }
        }
    };
    let anps = list(Api::<AdminNetworkPolicy>::all(client.clone()));
    let banps = list(Api::<BaselineAdminNetworkPolicy>::all(client));
    collect(netpols, anps, banps, timeout).await
}

/// Lists every namespace and pod.
pub async fn resources(
    client: Client,
    timeout: Duration,
) -> anyhow::Result<(Vec<Namespace>, Vec<Pod>)> {
    let namespaces = list(Api::<Namespace>::all(client.clone()));
    let pods = list(Api::<Pod>::all(client));
    let (namespaces, pods) = time::timeout(timeout, future::try_join(namespaces, pods)).await??;
    Ok((namespaces, pods))
}

async fn list<K>(api: Api<K>) -> Result<Vec<K>, kube::Error>
where
    K: Clone + fmt::Debug + serde::de::DeserializeOwned,
{
    Ok(api.list(&ListParams::default()).await?.items)
}

/// Runs each tier on its own task with its own deadline, then joins all three.
pub async fn collect<N, A, B, E>(netpols: N, anps: A, banps: B, timeout: Duration) -> Fetched
where
    N: Future<Output = Result<Vec<NetworkPolicy>, E>> + Send + 'static,
    A: Future<Output = Result<Vec<AdminNetworkPolicy>, E>> + Send + 'static,
    B: Future<Output = Result<Vec<BaselineAdminNetworkPolicy>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    let netpols = spawn(Tier::NetworkPolicies, netpols, timeout);
    let anps = spawn(Tier::AdminNetworkPolicies, anps, timeout);
    let banps = spawn(Tier::BaselineAdminNetworkPolicies, banps, timeout);
    let (netpols, anps, banps) = tokio::join!(
        recv(Tier::NetworkPolicies, netpols),
        recv(Tier::AdminNetworkPolicies, anps),
        recv(Tier::BaselineAdminNetworkPolicies, banps),
    );

    let mut fetched = Fetched::default();
    match netpols {
        Ok(netpols) => fetched.documents.network_policies = netpols,
        Err(error) => fetched.errors.push(error),
    }
    match anps {
        Ok(anps) => fetched.documents.admin_network_policies = anps,
        Err(error) => fetched.errors.push(error),
    }
    match banps {
        Ok(banps) => fetched.documents.baseline_admin_network_policies = banps,
        Err(error) => fetched.errors.push(error),
    }
    for error in &fetched.errors {
        warn!(%error, "Failed to read policies");
    }
    info!(
        documents = fetched.documents.len(),
        errors = fetched.errors.len(),
        "Read policies from the cluster"
    );
    fetched
}

fn spawn<T, E>(
    tier: Tier,
    list: impl Future<Output = Result<Vec<T>, E>> + Send + 'static,
    timeout: Duration,
) -> oneshot::Receiver<Result<Vec<T>, FetchError>>
where
    T: Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(
        async move {
            let result = match time::timeout(timeout, list).await {
                Ok(Ok(items)) => Ok(items),
                Ok(Err(error)) => Err(FetchError::Api {
                    tier,
                    source: error.into(),
                }),
                Err(_) => Err(FetchError::Timeout { tier, timeout }),
            };
            let _ = tx.send(result);
        }
        .instrument(info_span!("list", %tier)),
    );
    rx
}

async fn recv<T>(
    tier: Tier,
    rx: oneshot::Receiver<Result<Vec<T>, FetchError>>,
) -> Result<Vec<T>, FetchError> {
    rx.await.unwrap_or(Err(FetchError::Lost { tier }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{policy::AdminNetworkPolicySpec, ObjectMeta};

    fn anp(name: &str, priority: i32) -> AdminNetworkPolicy {
        AdminNetworkPolicy::new(
            name,
            AdminNetworkPolicySpec {
                priority,
                subject: Default::default(),
                ingress: vec![],
                egress: vec![],
            },
        )
    }

    fn netpol(name: &str) -> NetworkPolicy {
        NetworkPolicy {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("x".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn every_tier_is_collected() {
        let fetched = collect(
            future::ok::<_, std::io::Error>(vec![netpol("a"), netpol("b")]),
            future::ok(vec![anp("high", 1)]),
            future::ok(vec![]),
            Duration::from_secs(10),
        )
        .await;
        assert!(fetched.errors.is_empty());
        assert_eq!(fetched.documents.network_policies.len(), 2);
        assert_eq!(fetched.documents.admin_network_policies.len(), 1);
        assert!(fetched.documents.baseline_admin_network_policies.is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failed_tiers_do_not_affect_others() {
        let fetched = collect(
            future::ok(vec![netpol("a")]),
            future::err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "forbidden",
            )),
            future::pending(),
            Duration::from_secs(10),
        )
        .await;

        assert_eq!(fetched.documents.network_policies.len(), 1);
        assert_eq!(fetched.errors.len(), 2);
        assert!(matches!(
            fetched.errors[0],
            FetchError::Api {
                tier: Tier::AdminNetworkPolicies,
                ..
            }
        ));
        assert_eq!(
            fetched.errors[0].to_string(),
            "failed to list AdminNetworkPolicies: forbidden"
        );
        assert!(matches!(
            fetched.errors[1],
            FetchError::Timeout {
                tier: Tier::BaselineAdminNetworkPolicies,
                ..
            }
        ));
    }
}
