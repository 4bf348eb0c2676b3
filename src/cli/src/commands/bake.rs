//! `ocibake bake` command: build the images of a plan.
//!
//! Resolves every image of the build plan, assembles one image per selected
//! platform and writes the result as an OCI image layout or a registry
//! storage tree. Prints one line per reference with its index digest.

use std::path::PathBuf;

use clap::Args;
use ocibake_core::{BakeConfig, CancelToken, OutputKind, PlatformSelector};
use ocibake_runtime::Baker;

#[derive(Args)]
pub struct BakeArgs {
    /// Build plan (JSON)
    pub plan: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Output format: layout or registry
    #[arg(long)]
    pub format: Option<String>,

    /// Configuration file (YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Platform selector replacing the plan's, e.g. "linux,amd64 | linux,arm64"
    #[arg(long)]
    pub platform: Option<String>,

    /// Also write a docker-compatible manifest.json
    #[arg(long)]
    pub docker_manifest: bool,

    /// Only print index digests
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: BakeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let selector = args
        .platform
        .as_deref()
        .map(str::parse::<PlatformSelector>)
        .transpose()?;

    let cancel = CancelToken::new();
    let baker = Baker::from_file(&args.plan, config, cancel.clone())?;
    let output = args.output.clone();
    let mut task = tokio::task::spawn_blocking(move || baker.bake(&output, selector.as_ref()));

    let results = tokio::select! {
        joined = &mut task => joined??,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling bake");
            cancel.cancel();
            task.await??
        }
    };

    for result in &results {
        if args.quiet {
            println!("{}", result.digest);
        } else {
            println!("{} {}", result.reference, result.digest);
        }
    }
    Ok(())
}

/// Configuration file values with command line overrides applied.
fn load_config(args: &BakeArgs) -> Result<BakeConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => BakeConfig::from_file(path)?,
        None => BakeConfig::default(),
    };
    if let Some(format) = &args.format {
        config.output = format.parse::<OutputKind>()?;
    }
    if args.docker_manifest {
        config.docker_manifest = true;
    }
    Ok(config)
}
