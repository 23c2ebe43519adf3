//! rewind CLI - roll Kubernetes releases back to an earlier revision

use clap::{Parser, Subcommand};
use rewind_kube::RollbackOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::{Context, OutputFormat};
use error::CliError;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(author = "rewind Contributors")]
#[command(version)]
#[command(about = "Roll Kubernetes releases back to an earlier revision", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Namespace of the release
    #[arg(short, long, global = true, env = "REWIND_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Directory holding release revisions (default: <data dir>/rewind/releases)
    #[arg(long, global = true, env = "REWIND_STORE_DIR")]
    store_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll a release back to an earlier revision
    Rollback {
        /// Release name
        name: String,

        /// Revision to restore (0 = the one before the latest)
        #[arg(default_value_t = 0, allow_negative_numbers = true)]
        revision: i64,

        /// Seconds to wait for hooks and readiness
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u32>,

        /// Wait until restored workloads are ready
        #[arg(long)]
        wait: bool,

        /// Also wait for Jobs to complete
        #[arg(long, requires = "wait")]
        wait_for_jobs: bool,

        /// Skip pre-rollback and post-rollback hooks
        #[arg(long)]
        no_hooks: bool,

        /// Resolve the rollback without touching the cluster or the store
        #[arg(long)]
        dry_run: bool,

        /// Send every request with server-side dry run and persist nothing
        #[arg(long, conflicts_with = "dry_run")]
        server_dry_run: bool,

        /// Restart the pods of updated workloads
        #[arg(long)]
        recreate_pods: bool,

        /// Replace objects whose update is rejected
        #[arg(long)]
        force: bool,

        /// Delete resources created by a failed rollback
        #[arg(long)]
        cleanup_on_fail: bool,

        /// Revisions to keep per release (0 = unlimited)
        #[arg(long, default_value_t = 10)]
        history_max: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Show the revisions of a release
    History {
        /// Release name
        name: String,

        /// Show at most this many of the most recent revisions
        #[arg(long)]
        max: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Show one revision of a release
    Status {
        /// Release name
        name: String,

        /// Revision to show (default: latest)
        #[arg(long)]
        revision: Option<u32>,

        /// Show the stored values
        #[arg(long)]
        show_values: bool,

        /// Show the stored manifest
        #[arg(long)]
        show_manifest: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `warn` by default, `debug` with `--debug`; `RUST_LOG` wins over both
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = Context::new(cli.namespace, cli.store_dir);

    match cli.command {
        Commands::Rollback {
            name,
            revision,
            timeout,
            wait,
            wait_for_jobs,
            no_hooks,
            dry_run,
            server_dry_run,
            recreate_pods,
            force,
            cleanup_on_fail,
            history_max,
            output,
        } => {
            let mut options = RollbackOptions::new().to_revision(revision);
            options.timeout = timeout.map(|t| chrono::Duration::seconds(i64::from(t)));
            options.wait = wait;
            options.wait_for_jobs = wait_for_jobs;
            options.disable_hooks = no_hooks;
            options.dry_run = dry_run;
            options.server_dry_run = server_dry_run;
            options.recreate = recreate_pods;
            options.force = force;
            options.cleanup_on_fail = cleanup_on_fail;
            options.max_history = history_max;

            commands::rollback::run(&ctx, &name, options, output).await
        }

        Commands::History { name, max, output } => {
            commands::history::run(&ctx, &name, max, output).await
        }

        Commands::Status {
            name,
            revision,
            show_values,
            show_manifest,
            output,
        } => {
            commands::status::run(&ctx, &name, revision, show_values, show_manifest, output).await
        }
    }
}
