//! Per-project container slots.
//!
//! Every host project directory gets a chain of stable slot identities under
//! the podslot home (`$PODSLOT_HOME`, default `~/.podslot`). This binary is a
//! thin dispatcher over the library's slot store and build-cache gate.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use podslot::cache::BuildCacheGate;
use podslot::core::checksum::to_hex;
use podslot::core::identity::ProjectIdentity;
use podslot::core::types::{RevokeTarget, SlotRecord};
use podslot::error::SlotError;
use podslot::exit_codes;
use podslot::io::config::{PodslotConfig, load_config};
use podslot::io::paths::config_path;
use podslot::io::project_meta::find_projects;
use podslot::io::runtime::CliRuntime;
use podslot::logging;
use podslot::store::{MAX_REPAIR_SCAN, SlotStore, StoreOptions};

#[derive(Parser)]
#[command(
    name = "podslot",
    version,
    about = "Reusable per-project container slots"
)]
struct Cli {
    /// Podslot home directory (state and config.toml).
    #[arg(long, global = true, env = "PODSLOT_HOME")]
    home: Option<PathBuf>,

    /// Debug logging to stderr (when RUST_LOG is unset).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct ProjectArg {
    /// Project directory (defaults to the current directory).
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Reuse the lowest dead slot or create a new one; prints its directory.
    Allocate(ProjectArg),
    /// Print the first existing slot whose container is not running.
    Select(ProjectArg),
    /// Remove slot directories whose containers are not running.
    Revoke {
        #[command(flatten)]
        project: ProjectArg,
        /// `highest`, `all`, or a slot index.
        #[arg(short, long, default_value = "highest")]
        slot: String,
    },
    /// Lower the counter to the highest slot directory that still exists.
    Prune {
        #[command(flatten)]
        project: ProjectArg,
        /// Rebuild a corrupt counter from the slot directories on disk.
        #[arg(long)]
        repair: bool,
    },
    /// Show every slot with its status.
    List {
        #[command(flatten)]
        project: ProjectArg,
        #[arg(long)]
        json: bool,
    },
    /// Print the identity checksum for a slot index (0 = the project itself).
    Id {
        #[command(flatten)]
        project: ProjectArg,
        #[arg(
            short,
            long,
            default_value_t = 0,
            value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_REPAIR_SCAN))
        )]
        index: u32,
    },
    /// List known projects, optionally filtered by a path substring.
    Projects { query: Option<String> },
    /// Build-cache checks.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Report whether the image needs rebuilding and which layers changed.
    Check {
        #[command(flatten)]
        project: ProjectArg,
        /// Skip the runtime query and assume the image exists (or not).
        #[arg(long)]
        image_exists: Option<bool>,
    },
    /// Record current layer checksums after a successful build.
    Commit(ProjectArg),
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let home = resolve_home(cli.home)?;
    let cfg = load_config(&config_path(&home))?;
    let runtime = CliRuntime::new(cfg.runtime.clone(), cfg.probe_timeout());

    match cli.command {
        Command::Allocate(project) => cmd_allocate(&home, &cfg, &runtime, &project),
        Command::Select(project) => cmd_select(&home, &cfg, &runtime, &project),
        Command::Revoke { project, slot } => cmd_revoke(&home, &cfg, &runtime, &project, &slot),
        Command::Prune { project, repair } => cmd_prune(&home, &cfg, &runtime, &project, repair),
        Command::List { project, json } => cmd_list(&home, &cfg, &runtime, &project, json),
        Command::Id { project, index } => cmd_id(&project, index),
        Command::Projects { query } => cmd_projects(&home, query.as_deref()),
        Command::Cache(CacheCommand::Check {
            project,
            image_exists,
        }) => cmd_cache_check(&home, &cfg, &runtime, &project, image_exists),
        Command::Cache(CacheCommand::Commit(project)) => cmd_cache_commit(&home, &cfg, &project),
    }
}

fn cmd_allocate(
    home: &Path,
    cfg: &PodslotConfig,
    runtime: &CliRuntime,
    project: &ProjectArg,
) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let store = open_store(home, cfg, runtime, &project_path)?;
    let handle = store
        .allocate()
        .with_context(|| format!("allocate slot for {}", project_path.display()))?;
    println!("{}", handle.directory.display());
    eprintln!(
        "slot {} ({}) container {}",
        handle.index, handle.checksum, handle.container_name
    );
    Ok(exit_codes::OK)
}

fn cmd_select(
    home: &Path,
    cfg: &PodslotConfig,
    runtime: &CliRuntime,
    project: &ProjectArg,
) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let store = open_store(home, cfg, runtime, &project_path)?;
    match store
        .select_for_run()
        .with_context(|| format!("select slot for {}", project_path.display()))?
    {
        Some(handle) => {
            println!("{}", handle.directory.display());
            eprintln!(
                "slot {} ({}) container {}",
                handle.index, handle.checksum, handle.container_name
            );
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!(
                "no free slot for {}: every slot is in use or none exist yet (run `podslot allocate` to create one)",
                project_path.display()
            );
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

fn cmd_revoke(
    home: &Path,
    cfg: &PodslotConfig,
    runtime: &CliRuntime,
    project: &ProjectArg,
    slot: &str,
) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let target: RevokeTarget = slot.parse()?;
    let store = open_store(home, cfg, runtime, &project_path)?;
    let outcome = store
        .revoke(target)
        .with_context(|| format!("revoke slot for {}", project_path.display()))?;
    for index in &outcome.removed {
        println!("removed slot {index}");
    }
    for skipped in &outcome.skipped {
        eprintln!(
            "kept slot {} ({}) of {}: {}",
            skipped.index,
            skipped.checksum,
            project_path.display(),
            skipped.reason
        );
    }
    eprintln!("counter: {}", outcome.counter);
    if outcome.skipped.is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::IN_USE)
    }
}

fn cmd_prune(
    home: &Path,
    cfg: &PodslotConfig,
    runtime: &CliRuntime,
    project: &ProjectArg,
    repair: bool,
) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let store = open_store(home, cfg, runtime, &project_path)?;
    if repair {
        let outcome = store
            .repair()
            .with_context(|| format!("repair counter for {}", project_path.display()))?;
        for orphan in &outcome.orphans {
            eprintln!("not a slot of this project: {}", orphan.display());
        }
        println!("{}", outcome.counter);
        return Ok(exit_codes::OK);
    }
    let counter = store
        .prune()
        .map_err(with_repair_hint)
        .with_context(|| format!("prune slots for {}", project_path.display()))?;
    println!("{counter}");
    Ok(exit_codes::OK)
}

fn cmd_list(
    home: &Path,
    cfg: &PodslotConfig,
    runtime: &CliRuntime,
    project: &ProjectArg,
    json: bool,
) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let store = open_store(home, cfg, runtime, &project_path)?;
    let context = || format!("list slots for {}", project_path.display());
    if store.paths().parent_dir.is_dir() {
        store.prune().map_err(with_repair_hint).with_context(context)?;
    }
    let records = store
        .list()
        .and_then(|listing| listing.collect::<Result<Vec<SlotRecord>, SlotError>>())
        .with_context(context)?;

    if json {
        let mut payload = serde_json::to_string_pretty(&records).context("serialize listing")?;
        payload.push('\n');
        print!("{payload}");
        return Ok(exit_codes::OK);
    }
    if records.is_empty() {
        eprintln!("no slots exist yet for {}", project_path.display());
        return Ok(exit_codes::OK);
    }
    println!("{:>5}  {:<8}  {:<9}  {:<5}  DIRECTORY", "INDEX", "CHECKSUM", "STATUS", "CREDS");
    for record in &records {
        println!(
            "{:>5}  {:<8}  {:<9}  {:<5}  {}",
            record.index,
            record.checksum,
            record.status.to_string(),
            if record.credential_present { "yes" } else { "no" },
            record.directory.display()
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_id(project: &ProjectArg, index: u32) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let identity = ProjectIdentity::new(&project_path)?;
    println!("{}", to_hex(identity.slot_checksum(index)));
    Ok(exit_codes::OK)
}

fn cmd_projects(home: &Path, query: Option<&str>) -> Result<i32> {
    for entry in find_projects(home, query)? {
        println!("{}\t{}", entry.project_path, entry.parent_dir.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_cache_check(
    home: &Path,
    cfg: &PodslotConfig,
    runtime: &CliRuntime,
    project: &ProjectArg,
    image_exists: Option<bool>,
) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let gate = BuildCacheGate::open(home, &project_path, &cfg.build)?;
    let image_exists = match image_exists {
        Some(exists) => exists,
        None => gate
            .image_exists(runtime, &cfg.container_prefix)
            .with_context(|| format!("inspect image for {}", project_path.display()))?,
    };
    let decision = gate
        .needs_rebuild(image_exists)
        .with_context(|| format!("check build cache for {}", project_path.display()))?;
    if !decision.rebuild {
        println!("up to date");
        return Ok(exit_codes::OK);
    }
    let changed: Vec<String> = decision
        .changed_layers
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("rebuild: {}", changed.join(","));
    Ok(exit_codes::REBUILD)
}

fn cmd_cache_commit(home: &Path, cfg: &PodslotConfig, project: &ProjectArg) -> Result<i32> {
    let project_path = resolve_project(project)?;
    let gate = BuildCacheGate::open(home, &project_path, &cfg.build)?;
    gate.commit_current()
        .with_context(|| format!("commit build cache for {}", project_path.display()))?;
    Ok(exit_codes::OK)
}

fn open_store<'r>(
    home: &Path,
    cfg: &PodslotConfig,
    runtime: &'r CliRuntime,
    project_path: &Path,
) -> Result<SlotStore<'r, CliRuntime>> {
    SlotStore::open(home, project_path, runtime, &StoreOptions::from(cfg))
        .with_context(|| format!("open slots for {}", project_path.display()))
}

fn resolve_home(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(home) => Ok(home),
        None => std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join(".podslot"))
            .ok_or_else(|| anyhow!("HOME is not set; pass --home or set PODSLOT_HOME")),
    }
}

fn resolve_project(project: &ProjectArg) -> Result<PathBuf> {
    let raw = match &project.project {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(SlotError::InvalidInput("project path must not be empty".to_string()).into());
        }
        Some(path) => path.clone(),
        None => std::env::current_dir().context("read current directory")?,
    };
    fs::canonicalize(&raw).with_context(|| format!("resolve project path {}", raw.display()))
}

/// Point corrupt-counter errors at `prune --repair`.
fn with_repair_hint(err: SlotError) -> anyhow::Error {
    match err {
        SlotError::StateCorruption { .. } => {
            anyhow!(err).context("run `podslot prune --repair` to rebuild the counter")
        }
        other => other.into(),
    }
}
