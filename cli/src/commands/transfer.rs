use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};

use glyco_core::service::GlucoseService;

pub(crate) fn cmd_export(svc: &GlucoseService, path: Option<&Path>) -> Result<()> {
    let count = match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create file: {}", path.display()))?;
            let count = svc.export_csv(BufWriter::new(file))?;
            eprintln!("Exported {count} day(s) to {}", path.display());
            count
        }
        None => svc.export_csv(io::stdout().lock())?,
    };
    tracing::debug!(count, "exported glucose history");
    Ok(())
}

pub(crate) fn cmd_import(svc: &GlucoseService, path: &Path, dry_run: bool, json: bool) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    let summary = svc.import_csv(file, dry_run)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.rows_parsed == 0 {
        eprintln!("No rows found in CSV file.");
    } else if dry_run {
        println!("Dry run, no changes made.\n");
        println!("  Rows parsed:     {}", summary.rows_parsed);
        println!("  Days to create:  {}", summary.created);
        println!("  Days to replace: {}", summary.replaced);
    } else {
        println!("Import complete.\n");
        println!("  Rows parsed:   {}", summary.rows_parsed);
        println!("  Days created:  {}", summary.created);
        println!("  Days replaced: {}", summary.replaced);
    }

    Ok(())
}
