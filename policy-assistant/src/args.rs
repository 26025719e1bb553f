use crate::{
    builder::build_policy,
    core::{Policy, Port, Protocol, Traffic},
    example_policies, fetch,
    load::Documents,
    probe::{JobBuilder, ProbeConfig, Resources, SimulatedRunner},
    walkthrough,
    workload::{self, WorkloadId},
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::{num::NonZeroU16, path::PathBuf, time::Duration};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[clap(
    name = "policy-assistant",
    about = "Explains and simulates Kubernetes network policies"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "policy_assistant=info,warn",
        env = "POLICY_ASSISTANT_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Explains policies, simulates probes between pods and walks through individual flows.
    Analyze(Analyze),
}

#[derive(Debug, clap::Args)]
struct Analyze {
    /// What to produce. May be repeated; outputs are printed in order.
    #[clap(long = "mode", value_enum, value_delimiter = ',', required = true)]
    modes: Vec<Mode>,

    /// A policy file, or a directory of policy files.
    #[clap(long)]
    policy_path: Option<PathBuf>,

    /// Uses a bundled set of policies.
    #[clap(long)]
    use_example_policies: bool,

    /// Reads NetworkPolicies from every namespace.
    #[clap(long, short = 'A')]
    all_namespaces: bool,

    /// Namespaces to read NetworkPolicies from. Defaults to the client's namespace.
    #[clap(long, short = 'n', value_delimiter = ',')]
    namespace: Vec<String>,

    /// The source of a flow to walk through: `namespace/kind/name`, `namespace/pod` or an IP.
    #[clap(long)]
    source_workload_traffic: Option<WorkloadId>,

    /// The destination of a flow to walk through.
    #[clap(long)]
    destination_workload_traffic: Option<WorkloadId>,

    /// The destination port, by number or by name.
    #[clap(long)]
    port: Option<String>,

    #[clap(long, default_value = "TCP")]
    protocol: String,

    /// A JSON list of flows to walk through.
    #[clap(long)]
    traffic_path: Option<PathBuf>,

    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    simplify_policies: bool,

    #[clap(long, default_value = "3m", value_parser = parse_duration)]
    kube_client_timeout: Duration,

    #[clap(long, value_delimiter = ',', default_value = "x,y,z")]
    probe_namespaces: Vec<String>,

    #[clap(long, value_delimiter = ',', default_value = "a,b,c")]
    probe_pods: Vec<String>,

    #[clap(long, value_delimiter = ',', default_value = "80,81")]
    probe_ports: Vec<u16>,

    #[clap(long, value_delimiter = ',', default_value = "TCP,UDP", value_parser = parse_protocol)]
    probe_protocols: Vec<Protocol>,

    /// Probes only this port (by number or by name) instead of every served port.
    #[clap(long)]
    probe_port: Option<String>,

    #[clap(long, default_value = "TCP", value_parser = parse_protocol)]
    probe_protocol: Protocol,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Explain,
    Probe,
    Walkthrough,
}

/// Where flows to walk through come from.
#[derive(Debug)]
enum Flows {
    Workloads {
        source: WorkloadId,
        destination: WorkloadId,
        port: String,
    },
    File(PathBuf),
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            command: Command::Analyze(analyze),
        } = self;

        log_format.try_init(log_level)?;

        analyze.run(client).await
    }
}

// === impl Analyze ===

impl Analyze {
    async fn run(self, client: kubert::ClientArgs) -> Result<()> {
        let flows = if self.modes.contains(&Mode::Walkthrough) {
            Some(self.flows()?)
        } else {
            None
        };

        let from_cluster = self.policy_path.is_none() && !self.use_example_policies;
        let client = if from_cluster {
            Some(client.try_client().await?)
        } else {
            None
        };

        let docs = match &client {
            Some(client) => self.read_cluster(client.clone()).await?,
            None => self.read_files()?,
        };
        let policy = build_policy(
            &docs.network_policies,
            &docs.admin_network_policies,
            &docs.baseline_admin_network_policies,
            self.simplify_policies,
        )?;

        let synthetic = Resources::synthetic(
            &self.probe_namespaces,
            &self.probe_pods,
            &self.probe_ports,
            &self.probe_protocols,
        );

        for mode in &self.modes {
            match mode {
                Mode::Explain => println!("{}", policy.explain_table()),
                Mode::Probe => println!("{}", self.probe(&policy, &synthetic)?),
                Mode::Walkthrough => {
                    let Some(flows) = flows.as_ref() else {
                        continue;
                    };
                    let resources = match &client {
                        Some(client) => {
                            let (namespaces, pods) =
                                fetch::resources(client.clone(), self.kube_client_timeout)
                                    .await
                                    .context("failed to read workloads")?;
                            Resources::from_k8s(&namespaces, &pods)
                        }
                        None => synthetic.clone(),
                    };
                    let traffic = self.traffic(flows, &resources)?;
                    println!("{}", walkthrough::table(&policy, &traffic));
                }
            }
        }
        Ok(())
    }

    /// Checks that the walkthrough flags describe exactly one source of flows.
    fn flows(&self) -> Result<Flows> {
        let workload = (
            self.source_workload_traffic.clone(),
            self.destination_workload_traffic.clone(),
            self.port.clone(),
        );
        match (workload, self.traffic_path.clone()) {
            ((None, None, None), Some(path)) => Ok(Flows::File(path)),
            ((Some(source), Some(destination), Some(port)), None) => Ok(Flows::Workloads {
                source,
                destination,
                port,
            }),
            ((None, None, None), None) => bail!(
                "walkthrough requires --traffic-path or --source-workload-traffic, --destination-workload-traffic and --port"
            ),
            (_, Some(_)) => {
                bail!("--traffic-path cannot be combined with workload traffic flags")
            }
            _ => bail!(
                "--source-workload-traffic, --destination-workload-traffic and --port must be set together"
            ),
        }
    }

    fn read_files(&self) -> Result<Documents> {
        let mut docs = Documents::default();
        if self.use_example_policies {
            docs.extend(example_policies::documents().context("invalid bundled policies")?);
        }
        if let Some(path) = &self.policy_path {
            docs.extend(Documents::load(path)?);
        }
        debug!(documents = docs.len(), "Loaded policies");
        Ok(docs)
    }

    async fn read_cluster(&self, client: kube::Client) -> Result<Documents> {
        let namespaces = if self.all_namespaces {
            fetch::Namespaces::All
        } else if self.namespace.is_empty() {
            fetch::Namespaces::Some(vec![client.default_namespace().to_string()])
        } else {
            fetch::Namespaces::Some(self.namespace.clone())
        };
        info!(?namespaces, "Reading policies from the cluster");
        let fetch::Fetched { documents, errors } =
            fetch::policies(client, namespaces, self.kube_client_timeout).await;
        if errors.len() == 3 {
            let errors = errors.iter().map(ToString::to_string).collect::<Vec<_>>();
            bail!("failed to read policies: {}", errors.join("; "));
        }
        Ok(documents)
    }

    fn probe(&self, policy: &Policy, resources: &Resources) -> Result<String> {
        let config = match &self.probe_port {
            None => ProbeConfig::all_available(),
            Some(port) => ProbeConfig::port_protocol(parse_port(port)?, self.probe_protocol),
        };
        let jobs = JobBuilder::new(resources).build(&config);
        let pods = resources.pods.iter().map(|p| p.id());
        let table = SimulatedRunner::new(policy).run(pods, &jobs);
        Ok(table.render_all())
    }

    fn traffic(&self, flows: &Flows, resources: &Resources) -> Result<Vec<Traffic>> {
        match flows {
            Flows::File(path) => Ok(walkthrough::read_traffic(path)?),
            Flows::Workloads {
                source,
                destination,
                port,
            } => {
                let traffic =
                    workload::traffic(resources, source, destination, port, &self.protocol)?;
                Ok(vec![traffic])
            }
        }
    }
}

fn parse_port(s: &str) -> Result<Port> {
    if s.is_empty() {
        bail!("port must not be empty");
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let port = s
            .parse::<u16>()
            .ok()
            .and_then(NonZeroU16::new)
            .ok_or_else(|| anyhow!("port {s} is outside of [1, 65535]"))?;
        return Ok(Port::Number(port));
    }
    Ok(Port::Name(s.to_string()))
}

fn parse_protocol(s: &str) -> Result<Protocol> {
    Ok(s.parse()?)
}

/// Parses durations such as `500ms`, `30s`, `3m` or `1h`.
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (magnitude, unit) = if let Some(offset) = s.rfind(|c: char| c.is_ascii_digit()) {
        let (magnitude, unit) = s.split_at(offset + 1);
        let magnitude = magnitude.parse::<u64>()?;
        (magnitude, unit)
    } else {
        bail!("{} does not contain a duration value", s);
    };

    let mul = match unit {
        "" if magnitude == 0 => 0,
        "ms" => 1,
        "s" => 1000,
        "m" => 1000 * 60,
        "h" => 1000 * 60 * 60,
        _ => bail!(
            "invalid duration unit {:?} (expected one of 'ms', 's', 'm' or 'h')",
            unit
        ),
    };

    let ms = magnitude
        .checked_mul(mul)
        .ok_or_else(|| anyhow!("duration {} overflows when converted to milliseconds", s))?;
    Ok(Duration::from_millis(ms))
}
