//! Status command - show one revision of a release

use console::style;

use super::{Context, OutputFormat};
use crate::display;
use crate::error::{CliError, Result};

/// Run the status command
///
/// Shows the latest revision unless `revision` is given.
pub async fn run(
    ctx: &Context,
    name: &str,
    revision: Option<u32>,
    show_values: bool,
    show_manifest: bool,
    output: OutputFormat,
) -> Result<()> {
    let store = ctx.store()?;
    let release = match revision {
        Some(revision) => store.get(name, revision).await?,
        None => store.last(name).await?,
    };

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&release)?);
        return Ok(());
    }

    println!("{}", style("RELEASE INFO").bold().underlined());
    println!("  Name:        {}", style(&release.name).cyan());
    println!("  Namespace:   {}", style(&release.namespace).yellow());
    println!("  Revision:    {}", style(release.revision).yellow());
    println!("  Status:      {}", display::styled_status(release.status));
    println!(
        "  Deployed:    {}",
        release.first_deployed.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:     {}",
        release.last_deployed.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Description: {}", release.description);

    println!("\n{}", style("CHART").bold().underlined());
    println!("  Name:        {}", release.chart.name);
    println!("  Version:     {}", release.chart.version);

    if !release.hooks.is_empty() {
        println!("\n{}", style("HOOKS").bold().underlined());
        for hook in &release.hooks {
            let phases: Vec<String> = hook.phases.iter().map(ToString::to_string).collect();
            println!("  {} ({}) [{}]", hook.name, hook.kind, phases.join(", "));
        }
    }

    if show_values {
        println!("\n{}", style("VALUES").bold().underlined());
        let yaml = release
            .config
            .to_yaml()
            .map_err(|e| CliError::Other {
                message: e.to_string(),
            })?;
        println!("{}", yaml);
    }

    if show_manifest {
        println!("\n{}", style("MANIFEST").bold().underlined());
        println!("{}", release.manifest);
    }

    if let Some(notes) = &release.notes {
        println!("\n{}", style("NOTES").bold().underlined());
        println!("{}", notes);
    }

    Ok(())
}
