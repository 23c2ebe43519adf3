//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Release status with state colors
//! - Revision history tables
//! - What a rollback changed in the cluster

use console::{StyledObject, style};
use rewind_core::{Release, ReleaseStatus};
use rewind_kube::ClusterResult;
use std::io::{self, Write};

/// Status colored by how settled it is
pub fn styled_status(status: ReleaseStatus) -> StyledObject<String> {
    let text = status.to_string();
    match status {
        ReleaseStatus::Deployed => style(text).green(),
        ReleaseStatus::Failed => style(text).red(),
        ReleaseStatus::Superseded => style(text).dim(),
        s if s.is_pending() => style(text).yellow(),
        _ => style(text).dim(),
    }
}

/// Format count with proper pluralization
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Write the revision table, in the order given
pub fn write_history<W: Write>(w: &mut W, history: &[Release]) -> io::Result<()> {
    writeln!(
        w,
        "{:<10} {:<18} {:<25} {:<21} {}",
        style("REVISION").bold(),
        style("STATUS").bold(),
        style("CHART").bold(),
        style("UPDATED").bold(),
        style("DESCRIPTION").bold()
    )?;

    for release in history {
        let chart = format!("{}-{}", release.chart.name, release.chart.version);
        writeln!(
            w,
            "{:<10} {:<18} {:<25} {:<21} {}",
            release.revision,
            styled_status(release.status),
            chart,
            release.last_deployed.format("%Y-%m-%d %H:%M:%S"),
            release.description
        )?;
    }
    Ok(())
}

/// Write the objects a rollback created, updated and deleted
pub fn write_cluster_result<W: Write>(w: &mut W, result: &ClusterResult) -> io::Result<()> {
    for object in &result.created {
        writeln!(w, "  {} {}", style("+").green(), object.display_name())?;
    }
    for updated in &result.updated {
        writeln!(w, "  {} {}", style("~").yellow(), updated.target.display_name())?;
    }
    for object in &result.deleted {
        writeln!(w, "  {} {}", style("-").red(), object.display_name())?;
    }
    writeln!(
        w,
        "  {}, {} updated, {} deleted",
        pluralize(result.created.len(), "resource created", "resources created"),
        result.updated.len(),
        result.deleted.len()
    )
}
