//! Renders per-flow verdicts with their walkthroughs.

use crate::core::{Policy, TextTable, Traffic};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum TrafficFileError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid traffic #{index} in {}: {source}", path.display())]
    Invalid {
        path: std::path::PathBuf,
        index: usize,
        #[source]
        source: crate::core::InvalidTraffic,
    },
}

/// Reads a JSON list of flows.
pub fn read_traffic(path: &Path) -> Result<Vec<Traffic>, TrafficFileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| TrafficFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let traffic = serde_json::from_str::<Vec<Traffic>>(&contents).map_err(|source| {
        TrafficFileError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    for (index, t) in traffic.iter().enumerate() {
        t.validate().map_err(|source| TrafficFileError::Invalid {
            path: path.to_path_buf(),
            index,
            source,
        })?;
    }
    Ok(traffic)
}

pub fn table(policy: &Policy, traffic: &[Traffic]) -> String {
    let mut table =
        TextTable::new(["Traffic", "Verdict", "Ingress Walkthrough", "Egress Walkthrough"]);
    for t in traffic {
        let result = policy.is_traffic_allowed(t);
        table.push_row([
            t.to_string(),
            result.verdict().to_string(),
            result.ingress.walkthrough(),
            result.egress.walkthrough(),
        ]);
    }
    table.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::build_policy, load::Documents};

    const TRAFFIC: &str = r#"[
        {
            "source": {
                "internal": {"namespace": "y", "namespaceLabels": {"ns": "y"}, "podLabels": {"pod": "b"}}
            },
            "destination": {
                "internal": {"namespace": "x", "namespaceLabels": {"ns": "x"}, "podLabels": {"pod": "a"}}
            },
            "resolvedPort": 80,
            "protocol": "TCP"
        }
    ]"#;

    #[test]
    fn renders_walkthroughs() {
        let docs = Documents::parse(
            "
apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: deny-all
  namespace: x
spec:
  podSelector: {}
",
        )
        .unwrap();
        let policy = build_policy(&docs.network_policies, &[], &[], true).unwrap();
        let traffic = serde_json::from_str::<Vec<Traffic>>(TRAFFIC).unwrap();

        let rendered = table(&policy, &traffic);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("| Traffic "));
        assert!(lines[3].starts_with(
            "| y/{pod=b} -> x/{pod=a} 80/TCP | Deny    | Deny: ingress isolated"
        ));
        assert!(lines[3].ends_with("| Allow: no policies targeting egress |"));
    }

    #[test]
    fn traffic_files() {
        let path = std::env::temp_dir().join(format!(
            "policy-assistant-traffic-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, TRAFFIC).unwrap();
        assert_eq!(read_traffic(&path).unwrap().len(), 1);

        std::fs::write(&path, TRAFFIC.replace("\"resolvedPort\": 80", "\"resolvedPort\": 0"))
            .unwrap();
        assert!(matches!(
            read_traffic(&path),
            Err(TrafficFileError::Invalid { index: 0, .. })
        ));

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            read_traffic(&path),
            Err(TrafficFileError::Io { .. })
        ));
    }
}
