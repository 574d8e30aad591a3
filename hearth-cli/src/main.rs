use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::info;

use hearth_core::context::{DeploymentContext, keys};
use hearth_core::differ::reconcile;
use hearth_core::effect::Effect;
use hearth_core::environment::Environment;
use hearth_core::plan::Plan;
use hearth_core::resource::{Resource, Value};
use hearth_core::schemas;
use hearth_core::topology::assembler::VOLUME_IDENTIFIER_OUTPUT;
use hearth_core::topology::{
    Assembly, IdentifierSource, RandomIdentifiers, StackOutputs, assemble_with,
};
use hearth_state::{BackendConfig, StateBackend, StateFile, create_backend};

const DEFAULT_CONTEXT_FILE: &str = "hearth.json";

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Plan the infrastructure of a dedicated game server", long_about = None)]
struct Cli {
    /// Deployment context file (JSON)
    #[arg(long, global = true)]
    context_file: Option<PathBuf>,

    /// Override a context value; may be repeated
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// State file
    #[arg(long, global = true, default_value = "hearth.state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every planned resource against its schema
    Validate,
    /// Print the assembled plan and outputs
    Synth {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what changed since the last recorded plan
    Plan {
        /// Attach to the volume recorded by the last run
        #[arg(long)]
        reuse_volume: bool,
    },
    /// Record the plan and its outputs in the state file
    Record {
        /// Attach to the volume recorded by the last run
        #[arg(long)]
        reuse_volume: bool,
    },
    /// Print recorded outputs
    Output {
        /// Print only this output, unformatted
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Validate => run_validate(&cli),
        Commands::Synth { json } => run_synth(&cli, *json),
        Commands::Plan { reuse_volume } => run_plan(&cli, *reuse_volume).await,
        Commands::Record { reuse_volume } => run_record(&cli, *reuse_volume).await,
        Commands::Output { name } => run_output(&cli, name.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_context(cli: &Cli) -> Result<DeploymentContext, String> {
    let context = match &cli.context_file {
        Some(path) => DeploymentContext::load(path),
        None => DeploymentContext::load_optional(Path::new(DEFAULT_CONTEXT_FILE)),
    }
    .map_err(|e| e.to_string())?;

    context
        .with_overrides(&cli.overrides)
        .map_err(|e| e.to_string())
}

fn assemble_context(
    context: &DeploymentContext,
    ids: &dyn IdentifierSource,
) -> Result<Assembly, String> {
    let environment = Environment::from_process(context).map_err(|e| e.to_string())?;
    info!(
        "Assembling for account {} in {}",
        environment.account, environment.region
    );
    assemble_with(context, &environment, ids).map_err(|e| e.to_string())
}

/// Assemble against recorded state, so a volume created by an earlier run
/// keeps its identifier
fn assemble_recorded(
    context: &DeploymentContext,
    state: Option<&StateFile>,
) -> Result<Assembly, String> {
    match state {
        Some(state) => assemble_context(context, &state.identifiers()),
        None => assemble_context(context, &RandomIdentifiers),
    }
}

/// Fill the volume identifier from recorded outputs unless the context
/// already names one
fn reuse_recorded_volume(
    context: DeploymentContext,
    state: Option<&StateFile>,
) -> Result<DeploymentContext, String> {
    if context
        .existing_volume_id()
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Ok(context);
    }

    match state.and_then(|s| s.output(VOLUME_IDENTIFIER_OUTPUT)) {
        Some(id) => {
            info!("Reusing recorded volume {}", id);
            Ok(context.with(keys::EXISTING_VOLUME_ID, Value::string(id)))
        }
        None => Err("--reuse-volume given but no volume identifier has been recorded".to_string()),
    }
}

async fn open_backend(cli: &Cli) -> Result<Box<dyn StateBackend>, String> {
    create_backend(&BackendConfig::local(&cli.state))
        .await
        .map_err(|e| e.to_string())
}

fn run_validate(cli: &Cli) -> Result<(), String> {
    let context = load_context(cli)?;
    let assembly = assemble_context(&context, &RandomIdentifiers)?;

    println!("{}", "Validating...".cyan());

    let checked = schemas::validate_plan(&assembly.plan).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    })?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", checked)
            .green()
            .bold()
    );
    for resource in assembly.plan.resources() {
        println!("  • {}", resource.id);
    }
    Ok(())
}

fn run_synth(cli: &Cli, json: bool) -> Result<(), String> {
    let context = load_context(cli)?;
    let assembly = assemble_context(&context, &RandomIdentifiers)?;

    if json {
        let document = serde_json::json!({
            "plan": assembly.plan.to_json(),
            "outputs": assembly.outputs.to_map(),
        });
        let rendered = serde_json::to_string_pretty(&document).map_err(|e| e.to_string())?;
        println!("{}", rendered);
    } else {
        print_plan(&assembly.plan);
        print_outputs(&assembly.outputs);
    }
    Ok(())
}

async fn run_plan(cli: &Cli, reuse_volume: bool) -> Result<(), String> {
    let backend = open_backend(cli).await?;
    let state = backend.read_state().await.map_err(|e| e.to_string())?;

    let mut context = load_context(cli)?;
    if reuse_volume {
        context = reuse_recorded_volume(context, state.as_ref())?;
    }
    let assembly = assemble_recorded(&context, state.as_ref())?;

    let current = state.as_ref().map(StateFile::current_states).unwrap_or_default();
    let plan = reconcile(&assembly.plan, &current);

    print_plan(&plan);
    print_outputs(&assembly.outputs);
    Ok(())
}

async fn run_record(cli: &Cli, reuse_volume: bool) -> Result<(), String> {
    let backend = open_backend(cli).await?;
    let lock = backend
        .acquire_lock("record")
        .await
        .map_err(|e| e.to_string())?;

    let result = record_locked(cli, backend.as_ref(), reuse_volume).await;

    // Release even when recording failed; report the first error
    let released = backend.release_lock(&lock).await.map_err(|e| e.to_string());
    let serial = result?;
    released?;

    println!(
        "{}",
        format!("✓ State recorded (serial {}).", serial).green().bold()
    );
    Ok(())
}

async fn record_locked(
    cli: &Cli,
    backend: &dyn StateBackend,
    reuse_volume: bool,
) -> Result<u64, String> {
    let existing = backend.read_state().await.map_err(|e| e.to_string())?;

    let mut context = load_context(cli)?;
    if reuse_volume {
        context = reuse_recorded_volume(context, existing.as_ref())?;
    }
    let assembly = assemble_recorded(&context, existing.as_ref())?;

    let mut state = existing.unwrap_or_default();
    state.record(&assembly.plan, &assembly.outputs);
    backend
        .write_state(&state)
        .await
        .map_err(|e| e.to_string())?;

    print_outputs(&assembly.outputs);
    Ok(state.serial)
}

async fn run_output(cli: &Cli, name: Option<&str>) -> Result<(), String> {
    let backend = open_backend(cli).await?;
    let state = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("No recorded state at {}", cli.state.display()))?;

    match name {
        Some(name) => {
            let value = state
                .output(name)
                .ok_or_else(|| format!("Output '{}' not found", name))?;
            println!("{}", value);
        }
        None => {
            for (name, value) in &state.outputs {
                println!("{} = {}", name.bold(), value.green());
            }
        }
    }
    Ok(())
}

fn print_outputs(outputs: &StackOutputs) {
    println!();
    println!("{}", "Outputs:".cyan().bold());
    for (name, value) in outputs.to_map() {
        println!("  {} = {}", name.bold(), value.green());
    }
}

/// Print effects as a forest: each resource appears under the first
/// resource it references
fn print_plan(plan: &Plan) {
    let summary = plan.summary();
    if summary.create + summary.update + summary.delete == 0 {
        println!("{}", "No changes. Recorded state is up-to-date.".green());
    }

    let effects = plan.effects();
    let index: HashMap<&str, usize> = effects
        .iter()
        .enumerate()
        .map(|(idx, effect)| (effect.resource_id().name.as_str(), idx))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); effects.len()];
    let mut roots = Vec::new();
    for (idx, effect) in effects.iter().enumerate() {
        let parent = effect
            .resource()
            .map(Resource::dependencies)
            .unwrap_or_default()
            .iter()
            .filter_map(|dep| index.get(dep.as_str()).copied())
            .find(|&parent| parent < idx);
        match parent {
            Some(parent) => children[parent].push(idx),
            None => roots.push(idx),
        }
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    let mut printed = HashSet::new();
    for (i, root) in roots.iter().enumerate() {
        print_effect_tree(*root, plan, &children, &mut printed, "", i + 1 == roots.len(), true);
    }

    println!();
    println!(
        "Plan: {} to create, {} to update, {} to delete, {} to read.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.delete.to_string().red(),
        summary.read
    );
}

fn print_effect_tree(
    idx: usize,
    plan: &Plan,
    children: &[Vec<usize>],
    printed: &mut HashSet<usize>,
    prefix: &str,
    is_last: bool,
    is_root: bool,
) {
    if !printed.insert(idx) {
        return;
    }

    let effect = &plan.effects()[idx];
    let symbol = match effect {
        Effect::Create(_) => effect.symbol().green().bold(),
        Effect::Update { .. } => effect.symbol().yellow().bold(),
        Effect::Delete(_) => effect.symbol().red().bold(),
        Effect::Read(_) => effect.symbol().normal(),
    };

    let (connector, continuation) = if is_root {
        (String::new(), "  ".to_string())
    } else if is_last {
        (format!("{}└─ ", prefix), format!("{}   ", prefix))
    } else {
        (format!("{}├─ ", prefix), format!("{}│  ", prefix))
    };

    let id = effect.resource_id();
    println!(
        "  {}{} {} {}",
        connector,
        symbol,
        id.resource_type.cyan().bold(),
        id.name.bold()
    );

    let attr_prefix = format!("  {}    ", continuation);
    match effect {
        Effect::Create(r) | Effect::Read(r) => {
            for (key, value) in sorted_attributes(&r.attributes) {
                println!("{}{}: {}", attr_prefix, key, format_value(value).green());
            }
        }
        Effect::Update { from, to, .. } => {
            for (key, value) in sorted_attributes(&to.attributes) {
                match from.attributes.get(key) {
                    Some(old) if old == value => {
                        println!("{}{}: {}", attr_prefix, key, format_value(value).dimmed());
                    }
                    Some(old) => println!(
                        "{}{}: {} → {}",
                        attr_prefix,
                        key,
                        format_value(old).red(),
                        format_value(value).green()
                    ),
                    None => println!("{}{}: {}", attr_prefix, key, format_value(value).green()),
                }
            }
            for (key, old) in sorted_attributes(&from.attributes) {
                if !to.attributes.contains_key(key) {
                    println!("{}{}: {}", attr_prefix, key, format_value(old).red().strikethrough());
                }
            }
        }
        Effect::Delete(_) => {}
    }

    let kids = &children[idx];
    for (i, child) in kids.iter().enumerate() {
        print_effect_tree(*child, plan, children, printed, &continuation, i + 1 == kids.len(), false);
    }
}

fn sorted_attributes(attributes: &HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut pairs: Vec<_> = attributes.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let strs: Vec<_> = sorted_attributes(map)
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("{}.{}", binding, attr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_volume(id: &str) -> StateFile {
        let mut state = StateFile::new();
        state
            .outputs
            .insert(VOLUME_IDENTIFIER_OUTPUT.to_string(), id.to_string());
        state
    }

    #[test]
    fn reuse_fills_missing_volume() {
        let state = state_with_volume("fs-abc");
        let context = reuse_recorded_volume(DeploymentContext::new(), Some(&state)).unwrap();
        assert_eq!(
            context.existing_volume_id().unwrap(),
            Some("fs-abc".to_string())
        );
    }

    #[test]
    fn reuse_keeps_explicit_volume() {
        let state = state_with_volume("fs-abc");
        let context = DeploymentContext::new()
            .with(keys::EXISTING_VOLUME_ID, Value::string("fs-123"));
        let context = reuse_recorded_volume(context, Some(&state)).unwrap();
        assert_eq!(
            context.existing_volume_id().unwrap(),
            Some("fs-123".to_string())
        );
    }

    #[test]
    fn reuse_without_recorded_volume_fails() {
        assert!(reuse_recorded_volume(DeploymentContext::new(), None).is_err());
    }

    fn full_context() -> DeploymentContext {
        DeploymentContext::new()
            .with(keys::ACCOUNT_ID, Value::string("123456789012"))
            .with(keys::REGION, Value::string("eu-north-1"))
            .with(keys::PRIMARY_IMAGE, Value::string("img/valheim"))
            .with(keys::AUXILIARY_IMAGE, Value::string("img/ssh"))
    }

    #[test]
    fn recorded_state_keeps_the_created_volume() {
        let context = full_context();
        let first = assemble_recorded(&context, None).unwrap();
        let mut state = StateFile::new();
        state.record(&first.plan, &first.outputs);

        let second = assemble_recorded(&context, Some(&state)).unwrap();
        assert_eq!(
            second.outputs.volume_identifier,
            first.outputs.volume_identifier
        );
        assert_eq!(
            reconcile(&second.plan, &state.current_states()).mutation_count(),
            0
        );
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "hearth",
            "plan",
            "--reuse-volume",
            "-c",
            "memory-limit=2048",
            "--context",
            "cpu-limit=1024",
            "--state",
            "other.state.json",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Plan { reuse_volume: true }));
        assert_eq!(cli.overrides, vec!["memory-limit=2048", "cpu-limit=1024"]);
        assert_eq!(cli.state, PathBuf::from("other.state.json"));
        assert!(cli.context_file.is_none());
    }

    #[test]
    fn format_nested_values() {
        let value = Value::List(vec![
            Value::reference("vpc", "vpc_id"),
            Value::Map(HashMap::from([
                ("b".to_string(), Value::Int(1)),
                ("a".to_string(), Value::Bool(true)),
            ])),
        ]);
        assert_eq!(format_value(&value), "[vpc.vpc_id, {a: true, b: 1}]");
    }
}
