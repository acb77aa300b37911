//! Variants command

use comfy_table::Table;
use mxpack_schema::{Arch, Config};

/// Print every configured variant as a table.
pub fn variants(config: &Config) {
    if config.variants().is_empty() {
        println!("No variants configured.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Alias", "Keys", "Architectures", "Enabled"]);
    for variant in config.variants() {
        let archs = if variant.architectures.is_empty() {
            "-".to_string()
        } else {
            variant
                .architectures
                .iter()
                .map(Arch::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.add_row(vec![
            variant.id.to_string(),
            variant.name.clone(),
            variant.alias.clone(),
            variant.keys.join(" "),
            archs,
            if variant.enabled { "yes" } else { "no" }.to_string(),
        ]);
    }
    println!("{table}");
}
