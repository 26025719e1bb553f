//! A small bundled policy set covering every tier.

use crate::load::Documents;

const NETWORK_POLICIES: &str = include_str!("../example-policies/network-policies.yaml");
const ADMIN_NETWORK_POLICIES: &str =
    include_str!("../example-policies/admin-network-policies.yaml");
const BASELINE_ADMIN_NETWORK_POLICY: &str =
    include_str!("../example-policies/baseline-admin-network-policy.yaml");

pub fn documents() -> Result<Documents, serde_yaml::Error> {
    let mut docs = Documents::default();
    for contents in [
        NETWORK_POLICIES,
        ADMIN_NETWORK_POLICIES,
        BASELINE_ADMIN_NETWORK_POLICY,
    ] {
        docs.extend(Documents::parse(contents)?);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::build_policy,
        core::{Direction, InternalPeer, Traffic, TrafficPeer, Verdict},
        k8s::Labels,
    };

    fn peer(ns: &'static str, tenant: &'static str, app: &'static str) -> TrafficPeer {
        TrafficPeer::internal(
            InternalPeer::new(
                ns,
                Labels::from_iter([
                    ("kubernetes.io/metadata.name", ns),
                    ("tenant", tenant),
                    ("sensitive", "true"),
                ]),
                Labels::from_iter(Some(("app", app))),
            ),
            None,
        )
    }

    #[test]
    fn bundled_policies_build() {
        let docs = documents().expect("bundled policies must parse");
        assert_eq!(docs.network_policies.len(), 2);
        assert_eq!(docs.admin_network_policies.len(), 2);
        assert_eq!(docs.baseline_admin_network_policies.len(), 1);

        let policy = build_policy(
            &docs.network_policies,
            &docs.admin_network_policies,
            &docs.baseline_admin_network_policies,
            true,
        )
        .expect("bundled policies must be valid");
        assert!(policy.targets(Direction::Ingress).count() > 0);
        assert!(policy.targets(Direction::Egress).count() > 0);
        assert!(!policy.explain_table().is_empty());

        let verdict = |src, dst| {
            let traffic = Traffic::new(src, dst, 80, None, "TCP").unwrap();
            policy.is_traffic_allowed(&traffic).verdict()
        };
        assert_eq!(
            verdict(peer("a", "t1", "web"), peer("b", "t1", "web")),
            Verdict::Allow
        );
        assert_eq!(
            verdict(peer("a", "t2", "web"), peer("b", "t1", "web")),
            Verdict::Deny
        );
    }
}
