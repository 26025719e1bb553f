use crate::{
    effect::PolicyKind,
    policy::{Direction, Policy},
    table::TextTable,
    target::Target,
};

impl Policy {
    /// Renders every target as a table grouped by direction, subject and source policies.
    pub fn explain_table(&self) -> String {
        let mut table = TextTable::new([
            "Type",
            "Subject",
            "Source rules",
            "Peer",
            "Action",
            "Port/Protocol",
        ])
        .with_merged_columns(3);

        for (i, direction) in [Direction::Ingress, Direction::Egress].into_iter().enumerate() {
            if i > 0 {
                table.push_blank();
            }
            let kind = match direction {
                Direction::Ingress => "Ingress",
                Direction::Egress => "Egress",
            };
            for target in self.targets(direction) {
                explain_target(&mut table, kind, target);
            }
        }

        table.render()
    }
}

fn explain_target(table: &mut TextTable, kind: &str, target: &Target) {
    let subject = target.subject.to_string();
    let sources = target
        .sources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");

    if target.peers.is_empty() {
        let action = if target.subject.is_v1() {
            "Deny (isolated)"
        } else {
            "none"
        };
        table.push_row([kind, subject.as_str(), sources.as_str(), "no peers", action, ""]);
        return;
    }

    for rule in &target.peers {
        let action = match rule.effect.kind {
            PolicyKind::NetworkPolicy => rule.effect.verdict.to_string(),
            _ => format!("[{}] {}", rule.effect.kind, rule.effect),
        };
        table.push_row([
            kind.to_string(),
            subject.clone(),
            sources.clone(),
            rule.matcher.describe_peers(),
            action,
            rule.matcher.describe_ports(),
        ]);
    }
}
