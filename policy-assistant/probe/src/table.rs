use policy_assistant_core::{Protocol, TextTable};
use std::{collections::BTreeMap, fmt};

/// The outcome of a single probe in one view.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Allowed,
    Blocked,
    InvalidNamedPort,
    InvalidPortProtocol,
    Undefined,
    CheckFailed,
    #[default]
    Unknown,
}

/// A probe's outcome in each view.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub ingress: Connectivity,
    pub egress: Connectivity,
    pub combined: Connectivity,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum View {
    Ingress,
    Egress,
    Combined,
}

/// Probe results keyed by source pod, destination pod, port and protocol.
#[derive(Clone, Debug, Default)]
pub struct Table {
    pods: Vec<String>,
    ports: Vec<(String, Protocol)>,
    cells: BTreeMap<Key, Cell>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub allowed: usize,
    pub blocked: usize,
    pub other: usize,
}

type Key = (String, String, String, Protocol);

// === impl Connectivity ===

impl Connectivity {
    pub fn symbol(&self) -> char {
        match self {
            Self::Allowed => '.',
            Self::Blocked => 'X',
            Self::InvalidNamedPort => 'P',
            Self::InvalidPortProtocol => 'N',
            Self::Undefined => '#',
            Self::CheckFailed => '!',
            Self::Unknown => '?',
        }
    }

    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Self::Allowed
        } else {
            Self::Blocked
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// === impl Cell ===

impl Cell {
    /// A cell with the same outcome in every view.
    pub fn uniform(connectivity: Connectivity) -> Self {
        Self {
            ingress: connectivity,
            egress: connectivity,
            combined: connectivity,
        }
    }

    pub fn get(&self, view: View) -> Connectivity {
        match view {
            View::Ingress => self.ingress,
            View::Egress => self.egress,
            View::Combined => self.combined,
        }
    }
}

// === impl View ===

impl View {
    pub const ALL: [View; 3] = [Self::Ingress, Self::Egress, Self::Combined];
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => "Ingress".fmt(f),
            Self::Egress => "Egress".fmt(f),
            Self::Combined => "Combined".fmt(f),
        }
    }
}

// === impl Table ===

impl Table {
    /// Creates a table over the given pods. Rows and columns follow this order.
    pub fn new(pods: impl IntoIterator<Item = String>) -> Self {
        Self {
            pods: pods.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn set(&mut self, from: &str, to: &str, port: &str, protocol: Protocol, cell: Cell) {
        let port_protocol = (port.to_string(), protocol);
        if !self.ports.contains(&port_protocol) {
            self.ports.push(port_protocol);
        }
        for pod in [from, to] {
            if !self.pods.iter().any(|p| p == pod) {
                self.pods.push(pod.to_string());
            }
        }
        self.cells.insert(
            (from.to_string(), to.to_string(), port.to_string(), protocol),
            cell,
        );
    }

    /// Cells that were never probed are unknown.
    pub fn get(&self, from: &str, to: &str, port: &str, protocol: Protocol) -> Cell {
        self.cells
            .get(&(from.to_string(), to.to_string(), port.to_string(), protocol))
            .copied()
            .unwrap_or_default()
    }

    pub fn summary(&self, view: View, port: &str, protocol: Protocol) -> Summary {
        let mut summary = Summary::default();
        for from in &self.pods {
            for to in &self.pods {
                match self.get(from, to, port, protocol).get(view) {
                    Connectivity::Allowed => summary.allowed += 1,
                    Connectivity::Blocked => summary.blocked += 1,
                    _ => summary.other += 1,
                }
            }
        }
        summary
    }

    /// Renders one grid per port and protocol, with sources as rows and destinations as
    /// columns.
    pub fn render(&self, view: View) -> String {
        let mut out = Vec::new();
        for (port, protocol) in &self.ports {
            let mut table = TextTable::new(
                std::iter::once("-".to_string()).chain(self.pods.iter().cloned()),
            );
            for from in &self.pods {
                table.push_row(std::iter::once(from.clone()).chain(self.pods.iter().map(
                    |to| {
                        self.get(from, to, port, *protocol)
                            .get(view)
                            .to_string()
                    },
                )));
            }
            out.push(format!("{view} {port}/{protocol}:"));
            out.push(table.render());
            out.push(self.summary(view, port, *protocol).to_string());
            out.push(String::new());
        }
        out.join("\n")
    }

    /// Renders the ingress, egress and combined views in turn.
    pub fn render_all(&self) -> String {
        View::ALL
            .iter()
            .map(|view| self.render(*view))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allowed: {}, blocked: {}, other: {}",
            self.allowed, self.blocked, self.other
        )
    }
}
