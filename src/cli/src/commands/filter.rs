//! `ocibake filter` command.

use clap::Args;
use ocibake_core::{Platform, PlatformFilter};

#[derive(Args)]
pub struct FilterArgs {
    /// Filters to OR together, e.g. "@linux,amd64" "@linux,arm64"
    #[arg(required = true)]
    pub filters: Vec<String>,

    /// Also report whether the combined filter matches this platform
    #[arg(long = "matches")]
    pub matches: Option<String>,
}

pub async fn execute(args: FilterArgs) -> Result<(), Box<dyn std::error::Error>> {
    let filter = combine(&args.filters)?;
    println!("{filter}");

    if let Some(platform) = &args.matches {
        let platform: Platform = platform.parse()?;
        let verdict = if filter.matches(&platform) {
            "matches"
        } else {
            "does not match"
        };
        println!("{platform}: {verdict}");
    }
    Ok(())
}

/// OR of all `filters`, normalized.
fn combine(filters: &[String]) -> ocibake_core::Result<PlatformFilter> {
    let mut parsed = filters.iter().map(|f| f.parse::<PlatformFilter>());
    let first = match parsed.next() {
        Some(first) => first?,
        None => return Ok(PlatformFilter::All),
    };
    parsed.try_fold(first, |acc, next| Ok(acc.or(next?)))
}
