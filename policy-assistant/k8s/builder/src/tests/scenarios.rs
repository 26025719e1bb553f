use super::*;

const ANP_SUBJECT_X_A: &str = "
  subject:
    pods:
      namespaceSelector:
        matchLabels:
          ns: x
      podSelector:
        matchLabels:
          pod: a";

const NETPOL_A_FROM_B: &str = "
metadata:
  name: allow-b
  namespace: x
spec:
  podSelector:
    matchLabels:
      pod: a
  ingress:
    - from:
        - podSelector:
            matchLabels:
              pod: b
      ports:
        - port: 80
          protocol: PROTOCOL
";

#[test]
fn admin_allow_without_other_policies() {
    let anp = mk_anp(&format!(
        "
metadata:
  name: allow-b
spec:
  priority: 100{ANP_SUBJECT_X_A}
  ingress:
    - action: Allow
      from:
        - pods:
            namespaces:
              namespaceSelector:
                matchLabels:
                  ns: x
            podSelector:
              matchLabels:
                pod: b
      ports:
        - portNumber:
            port: 80
            protocol: TCP
"
    ));
    let policy = build(&[], &[anp], &[]);

    let on_80 = mk_traffic(mk_pod("x", "b"), mk_pod("x", "a"), 80, "TCP");
    assert_eq!(verdict(&policy, &on_80), Verdict::Allow);

    // Nothing matches, and without NetworkPolicies nothing isolates the pod.
    let on_81 = mk_traffic(mk_pod("x", "b"), mk_pod("x", "a"), 81, "TCP");
    assert_eq!(verdict(&policy, &on_81), Verdict::Allow);
}

#[test]
fn admin_deny_overrides_network_policy_allow() {
    let anp = mk_anp(&format!(
        "
metadata:
  name: deny-80
spec:
  priority: 100{ANP_SUBJECT_X_A}
  ingress:
    - action: Deny
      from:
        - namespaces:
            namespaceSelector: {{}}
      ports:
        - portNumber:
            port: 80
            protocol: TCP
"
    ));
    let netpol = mk_netpol(&NETPOL_A_FROM_B.replace("PROTOCOL", "TCP"));
    let policy = build(&[netpol], &[anp], &[]);

    let traffic = mk_traffic(mk_pod("x", "b"), mk_pod("x", "a"), 80, "TCP");
    let result = policy.is_traffic_allowed(&traffic);
    assert_eq!(result.verdict(), Verdict::Deny);
    assert!(result
        .ingress
        .walkthrough()
        .ends_with("ineffective rules: [NPv1] x/allow-b"));
}

#[test]
fn admin_pass_defers_to_network_policy() {
    let anp = mk_anp(&format!(
        "
metadata:
  name: pass-x
spec:
  priority: 100{ANP_SUBJECT_X_A}
  ingress:
    - action: Pass
      from:
        - namespaces:
            namespaceSelector:
              matchLabels:
                ns: x
      ports:
        - portNumber:
            port: 80
            protocol: UDP
"
    ));
    let netpol = mk_netpol(&NETPOL_A_FROM_B.replace("PROTOCOL", "UDP"));
    let policy = build(&[netpol], &[anp], &[]);

    let from_b = mk_traffic(mk_pod("x", "b"), mk_pod("x", "a"), 80, "UDP");
    assert_eq!(verdict(&policy, &from_b), Verdict::Allow);

    let from_self = mk_traffic(mk_pod("x", "a"), mk_pod("x", "a"), 80, "UDP");
    let result = policy.is_traffic_allowed(&from_self);
    assert_eq!(result.verdict(), Verdict::Deny);
    assert_eq!(
        result.ingress.decision,
        policy_assistant_core::Decision::Isolated
    );
}

#[test]
fn baseline_fallback() {
    let banp = mk_banp(
        "
metadata:
  name: default
spec:
  subject:
    namespaces: {}
  ingress:
    - action: Deny
      from:
        - pods:
            namespaces:
              namespaceSelector: {}
            podSelector:
              matchLabels:
                pod: b
",
    );
    let policy = build(&[], &[], &[banp]);

    let from_b = mk_traffic(mk_pod("x", "b"), mk_pod("x", "a"), 80, "TCP");
    assert_eq!(verdict(&policy, &from_b), Verdict::Deny);

    let from_a = mk_traffic(mk_pod("y", "a"), mk_pod("x", "a"), 80, "TCP");
    assert_eq!(verdict(&policy, &from_a), Verdict::Allow);
}

#[test]
fn same_labels() {
    let anp = mk_anp(
        "
metadata:
  name: same-tier
spec:
  priority: 5
  subject:
    namespaces:
      matchLabels:
        ns: x
  ingress:
    - action: Deny
      from:
        - namespaces:
            sameLabels: [tier]
",
    );
    let policy = build(&[], &[anp], &[]);

    let mk = |ns: &str, tier: &str| {
        mk_pod_with_ns_labels(
            ns,
            "a",
            btreemap! {
                "ns".to_string() => ns.to_string(),
                "tier".to_string() => tier.to_string(),
            },
        )
    };

    let same = mk_traffic(mk("y", "1"), mk("x", "1"), 80, "TCP");
    assert_eq!(verdict(&policy, &same), Verdict::Deny);

    let different = mk_traffic(mk("y", "2"), mk("x", "1"), 80, "TCP");
    assert_eq!(verdict(&policy, &different), Verdict::Allow);
}

#[test]
fn port_range() {
    let anp = mk_anp(
        "
metadata:
  name: deny-range
spec:
  priority: 5
  subject:
    namespaces: {}
  ingress:
    - action: Deny
      from:
        - namespaces:
            namespaceSelector:
              matchLabels:
                ns: x
      ports:
        - portRange:
            start: 80
            end: 82
            protocol: TCP
",
    );
    let policy = build(&[], &[anp], &[]);

    for (port, protocol, expected) in [
        (80, "TCP", Verdict::Deny),
        (81, "TCP", Verdict::Deny),
        (82, "TCP", Verdict::Deny),
        (83, "TCP", Verdict::Allow),
        (80, "UDP", Verdict::Allow),
    ] {
        let traffic = mk_traffic(mk_pod("x", "b"), mk_pod("y", "a"), port, protocol);
        assert_eq!(
            verdict(&policy, &traffic),
            expected,
            "{port}/{protocol} must be {expected}"
        );
    }
}

#[test]
fn egress_and_ingress_must_both_allow() {
    let deny_egress = mk_netpol(
        "
metadata:
  name: deny-egress
  namespace: y
spec:
  podSelector: {}
  policyTypes: [Egress]
",
    );
    let policy = build(&[deny_egress], &[], &[]);

    let from_y = mk_traffic(mk_pod("y", "a"), mk_pod("x", "a"), 80, "TCP");
    let result = policy.is_traffic_allowed(&from_y);
    assert!(result.ingress.is_allowed());
    assert!(!result.egress.is_allowed());
    assert_eq!(result.verdict(), Verdict::Deny);

    let to_y = mk_traffic(mk_pod("x", "a"), mk_pod("y", "a"), 80, "TCP");
    assert_eq!(verdict(&policy, &to_y), Verdict::Allow);
}

#[test]
fn external_peers_have_no_targets() {
    let deny_all = mk_netpol(
        "
metadata:
  name: deny-all
  namespace: x
spec:
  podSelector: {}
  policyTypes: [Ingress, Egress]
",
    );
    let policy = build(&[deny_all], &[], &[]);

    let traffic = Traffic::new(
        TrafficPeer::external("8.8.8.8".parse().unwrap()),
        TrafficPeer::internal(mk_pod("x", "a"), None),
        443,
        None,
        "TCP",
    )
    .unwrap();
    let result = policy.is_traffic_allowed(&traffic);
    assert_eq!(result.egress.walkthrough(), "Allow: no policies targeting egress");
    assert_eq!(result.verdict(), Verdict::Deny);
}

#[test]
fn duplicate_policies_simplify_away() {
    let anp = mk_anp(&format!(
        "
metadata:
  name: deny-80
spec:
  priority: 100{ANP_SUBJECT_X_A}
  ingress:
    - action: Deny
      from:
        - namespaces:
            namespaceSelector: {{}}
      ports:
        - portNumber:
            port: 80
            protocol: TCP
"
    ));
    let netpol = mk_netpol(&NETPOL_A_FROM_B.replace("PROTOCOL", "TCP"));
    let simplified = |netpols: &[NetworkPolicy]| {
        build_policy(netpols, std::slice::from_ref(&anp), &[], true)
            .expect("policies must be valid")
            .explain_table()
    };

    let once = simplified(std::slice::from_ref(&netpol));
    let twice = simplified(&[netpol.clone(), netpol]);
    assert_eq!(once, twice);
}
