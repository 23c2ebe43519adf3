//! History command - show release history

use console::style;
use rewind_core::Release;

use super::{Context, OutputFormat};
use crate::display;
use crate::error::Result;

/// Run the history command
///
/// Revisions are listed oldest first; `max` keeps only the most recent ones.
pub async fn run(ctx: &Context, name: &str, max: Option<usize>, output: OutputFormat) -> Result<()> {
    let store = ctx.store()?;
    let history = recent_first_to_chronological(store.history(name).await?, max);

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    println!(
        "Release history for {} in namespace {}:\n",
        style(name).cyan(),
        style(&ctx.namespace).yellow()
    );
    display::write_history(&mut std::io::stdout(), &history)?;
    Ok(())
}

fn recent_first_to_chronological(mut history: Vec<Release>, max: Option<usize>) -> Vec<Release> {
    if let Some(max) = max {
        history.truncate(max);
    }
    history.reverse();
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::{ChartRef, Values};

    fn revisions(revisions: &[u32]) -> Vec<Release> {
        revisions
            .iter()
            .map(|&r| {
                let mut release = Release::new(
                    "web",
                    "default",
                    ChartRef::new("web", semver::Version::new(1, 0, 0)),
                    Values::new(),
                    "",
                );
                release.revision = r;
                release
            })
            .collect()
    }

    #[test]
    fn test_max_keeps_most_recent() {
        let history = recent_first_to_chronological(revisions(&[5, 4, 3, 2, 1]), Some(2));
        let revs: Vec<u32> = history.iter().map(|r| r.revision).collect();
        assert_eq!(revs, vec![4, 5]);
    }

    #[test]
    fn test_unbounded_is_chronological() {
        let history = recent_first_to_chronological(revisions(&[3, 2, 1]), None);
        let revs: Vec<u32> = history.iter().map(|r| r.revision).collect();
        assert_eq!(revs, vec![1, 2, 3]);
    }
}
