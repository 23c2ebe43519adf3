//! Rollback command - roll a release back to an earlier revision

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rewind_kube::{
    ClusterClient, ClusterHookExecutor, KubeCluster, Rollback, RollbackOptions, RollbackReport,
    resolve_draft,
};
use std::sync::Arc;
use std::time::Duration;

use super::{Context, OutputFormat};
use crate::display;
use crate::error::Result;

/// Run the rollback command
pub async fn run(
    ctx: &Context,
    name: &str,
    options: RollbackOptions,
    output: OutputFormat,
) -> Result<()> {
    let human = output == OutputFormat::Table;
    let target = if options.revision == 0 {
        "the previous revision".to_string()
    } else {
        format!("revision {}", options.revision)
    };

    if human {
        println!(
            "{} Rolling back release {} to {}",
            style("→").blue().bold(),
            style(name).cyan(),
            style(&target).yellow()
        );
    }

    let store = ctx.store()?;

    let report = if options.dry_run {
        // Planning needs the store only
        let (_, draft) = resolve_draft(&store, name, options.revision).await?;
        RollbackReport {
            release: draft,
            result: None,
        }
    } else {
        let cluster: Arc<dyn ClusterClient> = Arc::new(KubeCluster::connect().await?);
        let hooks = Arc::new(ClusterHookExecutor::new(Arc::clone(&cluster)));
        let mut engine = Rollback::new(store, cluster, hooks, options.clone());

        let spinner = human.then(|| spinner(format!("Rolling back {}", name)));
        let outcome = engine.run(name).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        outcome?
    };

    if !human {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let release = &report.release;
    if options.dry_run {
        println!(
            "{} Dry run - {} would be restored as revision {} ({})",
            style("✓").green().bold(),
            style(name).cyan(),
            style(release.revision).yellow(),
            release.description
        );
    } else if options.server_dry_run {
        println!(
            "{} Server dry run - the API server accepted revision {} ({})",
            style("✓").green().bold(),
            style(release.revision).yellow(),
            release.description
        );
    } else {
        println!(
            "{} Rollback was a success! {} is now at revision {} ({})",
            style("✓").green().bold(),
            style(&release.name).cyan(),
            style(release.revision).yellow(),
            release.description
        );
    }

    if let Some(result) = &report.result {
        display::write_cluster_result(&mut std::io::stdout(), result)?;
    }

    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
