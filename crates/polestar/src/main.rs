use clap::{Parser, Subcommand};
use polestar_admission::{
    AdmissionConfig, MemoryRecorder, NodeSource, PodSnapshotUsage, QuotaChecker, ResourceAsk,
    StaticNodeSource, StaticQuotaSource, WorkloadRef,
};
use polestar_core::{
    to_json_pretty, Backend, Namespace, Pod, PodLabelsForAffinity, PolicySpec, ResourceQuantities,
    Workspace,
};
use polestar_scheduler::{ConstraintBuilder, NodeLabelSnapshot, PrecheckEngine};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "polestar", about = "Polestar scheduling policy and admission engine")]
struct Cli {
    /// Admission config (YAML or JSON)
    #[arg(long, env = "POLESTAR_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a policy into a backend constraint
    Compile {
        /// PolicySpec file
        #[arg(long)]
        policy: PathBuf,
        /// Target backend (kubernetes, marathon, metronome)
        #[arg(long, default_value = "kubernetes")]
        backend: Backend,
        /// Pod label groups used to spread replicas
        #[arg(long)]
        instance_labels: Option<PathBuf>,
        /// Print the Kubernetes affinity instead of the structured rendering
        #[arg(long)]
        affinity: bool,
    },
    /// Check that every service has a feasible node
    Precheck {
        /// Map of service name to PolicySpec
        #[arg(long)]
        policies: PathBuf,
        /// List of node label snapshots
        #[arg(long)]
        nodes: PathBuf,
    },
    /// Shape a container ask into a grant
    Shape {
        /// ResourceAsk file
        #[arg(long)]
        ask: PathBuf,
        #[arg(long)]
        workspace: Workspace,
    },
    /// Shape an ask and check it against a workspace quota
    Admit {
        /// Admission input: ask, scope, quota and a namespace/pod snapshot
        #[arg(long)]
        input: PathBuf,
    },
}

/// Quota as Kubernetes quantities
#[derive(Debug, Deserialize)]
struct QuotaSpec {
    cpu: String,
    memory: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdmitInput {
    project: String,
    workspace: Workspace,
    workload_id: String,
    ask: ResourceAsk,
    #[serde(default)]
    replicas: Option<u32>,
    #[serde(default)]
    quota: Option<QuotaSpec>,
    #[serde(default)]
    namespaces: Vec<Namespace>,
    #[serde(default)]
    pods: Vec<Pod>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile {
            policy,
            backend,
            instance_labels,
            affinity,
        } => run_compile(&policy, backend, instance_labels.as_deref(), affinity),
        Commands::Precheck { policies, nodes } => run_precheck(&policies, &nodes).await,
        Commands::Shape { ask, workspace } => run_shape(&config, &ask, workspace),
        Commands::Admit { input } => run_admit(&config, &input).await,
    }
}

fn load_config(path: Option<&Path>) -> miette::Result<AdmissionConfig> {
    match path {
        Some(path) => {
            info!("Loading admission config from {}", path.display());
            Ok(AdmissionConfig::load(path)?)
        }
        None => Ok(AdmissionConfig::default()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> miette::Result<()> {
    println!("{}", to_json_pretty(value)?);
    Ok(())
}

/// Compile one policy and print its rendering
fn run_compile(
    policy: &Path,
    backend: Backend,
    instance_labels: Option<&Path>,
    affinity: bool,
) -> miette::Result<()> {
    let spec: PolicySpec = polestar_core::load_file(policy)?;
    spec.validate()?;

    let groups: Vec<PodLabelsForAffinity> = match instance_labels {
        Some(path) => polestar_core::load_file(path)?,
        None => Vec::new(),
    };

    let constraint = ConstraintBuilder::compile(&spec, Some(groups.as_slice()), backend);
    debug!("Compiled {} for {}", spec.service_name, backend);

    if affinity {
        if backend.is_regex_target() {
            return Err(miette::miette!(
                "--affinity needs the kubernetes backend, got {}",
                backend
            ));
        }
        return print_json(&constraint.structured().to_k8s_affinity());
    }

    print_json(&constraint.render())
}

/// Compile every policy and precheck it against the node snapshot
async fn run_precheck(policies: &Path, nodes: &Path) -> miette::Result<()> {
    let specs: BTreeMap<String, PolicySpec> = polestar_core::load_file(policies)?;
    let snapshots: Vec<NodeLabelSnapshot> = polestar_core::load_file(nodes)?;
    let source = StaticNodeSource::new(snapshots);

    let mut services = BTreeMap::new();
    for (name, spec) in &specs {
        spec.validate()?;
        services.insert(
            name.clone(),
            ConstraintBuilder::compile(spec, None, Backend::Kubernetes),
        );
    }

    let nodes: BTreeMap<String, NodeLabelSnapshot> = source
        .list_nodes()
        .await?
        .into_iter()
        .map(|n| (n.name().to_string(), n))
        .collect();

    info!(
        "Prechecking {} services against {} nodes",
        services.len(),
        nodes.len()
    );
    let report = PrecheckEngine::new().precheck(&services, &nodes);
    print_json(&report)?;
    report.into_result()?;
    Ok(())
}

fn run_shape(config: &AdmissionConfig, ask: &Path, workspace: Workspace) -> miette::Result<()> {
    let ask: ResourceAsk = polestar_core::load_file(ask)?;
    let grant = config.shaper()?.shape(&ask, workspace)?;

    print_json(&grant)?;
    print_json(&grant.to_k8s())
}

/// Shape the ask, then check the scaled delta against the scope's quota
async fn run_admit(config: &AdmissionConfig, input: &Path) -> miette::Result<()> {
    let input: AdmitInput = polestar_core::load_file(input)?;

    let grant = config.shaper()?.shape(&input.ask, input.workspace)?;
    let replicas = i64::from(input.replicas.unwrap_or(1));
    let delta = grant.request.checked_scale(replicas)?;

    let quotas = Arc::new(StaticQuotaSource::new());
    if let Some(quota) = &input.quota {
        let quota = ResourceQuantities::new(
            ResourceQuantities::parse_cpu(&quota.cpu)?,
            ResourceQuantities::parse_memory(&quota.memory)?,
        );
        quotas
            .set_quota(&input.project, input.workspace, quota)
            .await;
    }

    let usage = Arc::new(PodSnapshotUsage::new(input.namespaces, input.pods));
    let recorder = Arc::new(MemoryRecorder::new());
    let checker = QuotaChecker::new(usage, quotas, recorder.clone()).with_locale(config.locale);

    let decision = checker
        .check_quota(
            &input.project,
            input.workspace,
            delta,
            &WorkloadRef::new(&input.workload_id),
        )
        .await?;

    print_json(&decision)?;
    for failure in recorder.failures().await {
        print_json(&failure)?;
    }

    decision.into_result()?;
    Ok(())
}
