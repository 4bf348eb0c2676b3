//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};
use ocibake_core::PlatformSet;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// One platform per line, or a marker for platform independent sets.
pub fn format_platforms(set: &PlatformSet) -> String {
    if set.is_infinite() {
        return "<all platforms>".to_string();
    }
    if set.is_empty() {
        return "<none>".to_string();
    }
    set.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
