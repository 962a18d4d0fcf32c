use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Once};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = concat!(
    "sprig::vm::quicken=debug,sprig::vm::dispatch=debug,sprig::vm::slowpath=debug,",
    "sprig::vm::nlr=debug,sprig::vm::osr=info,sprig_core=info"
);

/// The interpreter recurses on the native stack once per activation.
const VM_STACK_SIZE: usize = 512 * 1024 * 1024;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sprig_core::{
    vm::{CompiledMethod, Literal, Vm, VmConfig, VmContext, VmStats, disassemble},
    workloads::{self, Workload},
};


#[derive(Debug, Parser)]
#[command(
    name = "sprig",
    author,
    version,
    about = "Runs sprig workloads on the quickening interpreter",
    long_about = None
)]
struct CliArgs {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Default, Args)]
struct EngineArgs {
    /// VM configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,
    /// Dispatch-chain bound before a call site goes megamorphic
    #[arg(long, global = true, value_name = "N")]
    cache_size: Option<usize>,
    /// Compile control-flow blocks as closures
    #[arg(long, global = true)]
    no_inline: bool,
    /// Quicken every send to the generic cached form
    #[arg(long, global = true)]
    no_eager: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a workload and print its result.
    Run {
        #[arg(value_name = "WORKLOAD")]
        workload: Workload,
        /// Argument sent to the workload (defaults per workload)
        #[arg(value_name = "N")]
        n: Option<i64>,
        /// Print VM statistics after the result
        #[arg(long)]
        stats: bool,
    },
    /// Print the bytecode of a workload, quickened state included after a run.
    Disasm {
        #[arg(value_name = "WORKLOAD")]
        workload: Workload,
        #[arg(value_name = "N")]
        n: Option<i64>,
        /// Disassemble without running first
        #[arg(long)]
        cold: bool,
    },
    /// Run a workload and print a TOML report with VM statistics.
    Stats {
        #[arg(value_name = "WORKLOAD")]
        workload: Workload,
        #[arg(value_name = "N")]
        n: Option<i64>,
    },
    /// List the available workloads.
    List,
}

#[derive(Debug, Serialize)]
struct Report {
    workload: String,
    argument: i64,
    result: String,
    stats: VmStats,
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("SPRIG_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Configuration file first, then flag overrides.
fn resolve_config(engine: &EngineArgs) -> anyhow::Result<VmConfig> {
    let mut config = match &engine.config {
        Some(path) => VmConfig::load(path)?,
        None => VmConfig::default(),
    };
    if let Some(size) = engine.cache_size {
        if size == 0 {
            anyhow::bail!("--cache-size must be at least 1");
        }
        config.inline_cache_size = size;
    }
    if engine.no_inline {
        config.inline_blocks = false;
    }
    if engine.no_eager {
        config.eager_specialization = false;
    }
    Ok(config)
}

fn new_vm(config: VmConfig) -> anyhow::Result<Vm> {
    let mut vm = Vm::with_context(VmContext::new(config)).context("failed to bootstrap the VM")?;
    workloads::install(&mut vm)?;
    Ok(vm)
}

/// Renders `method` and, depth first, every block in its literal pool.
fn disassemble_tree(method: &Arc<CompiledMethod>, out: &mut String) {
    let holder = method
        .holder()
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| "?".to_string());
    let _ = writeln!(out, "{}>>{}", holder, method.signature());
    out.push_str(&disassemble(method.program()));
    for literal in method.program().literals() {
        if let Literal::Block(block) = literal {
            out.push('\n');
            disassemble_tree(block, out);
        }
    }
}

fn execute(command: Commands, config: VmConfig) -> anyhow::Result<String> {
    let mut out = String::new();
    match command {
        Commands::Run { workload, n, stats } => {
            let mut vm = new_vm(config)?;
            let n = n.unwrap_or_else(|| workload.default_argument());
            let result = workloads::run(&mut vm, workload, n)?;
            let _ = writeln!(out, "{result}");
            if stats {
                out.push_str(&toml::to_string(vm.stats()).context("failed to render statistics")?);
            }
        }
        Commands::Disasm { workload, n, cold } => {
            let mut vm = new_vm(config)?;
            if !cold {
                let n = n.unwrap_or_else(|| workload.default_argument());
                workloads::run(&mut vm, workload, n)?;
            }
            let method = workloads::entry_method(&mut vm, workload)?;
            disassemble_tree(&method, &mut out);
        }
        Commands::Stats { workload, n } => {
            let mut vm = new_vm(config)?;
            let n = n.unwrap_or_else(|| workload.default_argument());
            let result = workloads::run(&mut vm, workload, n)?;
            let report = Report {
                workload: workload.name().to_string(),
                argument: n,
                result: result.to_string(),
                stats: vm.stats().clone(),
            };
            out.push_str(&toml::to_string(&report).context("failed to render statistics")?);
        }
        Commands::List => {
            for workload in Workload::ALL {
                let _ = writeln!(
                    out,
                    "{:<8}{:<12}{}",
                    workload.name(),
                    workload.selector(),
                    workload.default_argument()
                );
            }
        }
    }
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs { engine, command } = CliArgs::parse();
    let config = resolve_config(&engine)?;

    let worker = std::thread::Builder::new()
        .name("sprig-vm".to_string())
        .stack_size(VM_STACK_SIZE)
        .spawn(move || execute(command, config))
        .context("failed to start the VM thread")?;
    let out = worker
        .join()
        .map_err(|_| anyhow::anyhow!("the VM thread panicked"))??;
    print!("{out}");
    Ok(())
}
