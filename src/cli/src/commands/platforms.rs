//! `ocibake platforms` command.

use std::path::PathBuf;

use clap::Args;
use ocibake_core::{BakeConfig, CancelToken};
use ocibake_runtime::{Baker, ImageDescription};

use crate::output;

#[derive(Args)]
pub struct PlatformsArgs {
    /// Build plan (JSON)
    pub plan: PathBuf,
}

pub async fn execute(args: PlatformsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let baker = Baker::from_file(&args.plan, BakeConfig::default(), CancelToken::new())?;
    let images = baker.describe()?;
    println!("{}", render(&images));
    Ok(())
}

fn render(images: &[ImageDescription]) -> String {
    let mut table = output::new_table(&["IMAGE", "ROOT", "SUPPORTED PLATFORMS", "SELECTOR"]);
    for (index, image) in images.iter().enumerate() {
        let selector = image
            .selector
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        for root in &image.roots {
            table.add_row(vec![
                index.to_string(),
                root.key.to_string(),
                output::format_platforms(&root.supported),
                selector.clone(),
            ]);
        }
    }
    table.to_string()
}
