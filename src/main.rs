use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::PathBuf;

use record_import::config::{init_tracing, StoreArgs, DEFAULT_LOG_FILTER};
use record_import::{export_records, AssociationType, DeletionImporter, ImportLog, RecordImporter};

#[derive(Parser, Debug)]
#[command(name = "record-import", version, about = "Bulk import of exhibition contact records")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import records from a CSV upload
    Import {
        file: PathBuf,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete (or detach the email of) records listed by email
    Delete { file: PathBuf },

    /// Export all records as CSV
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Load countries and states from CSV (`code,name[,state]`)
    SeedCountries { file: PathBuf },

    /// Record and association counts
    Stats,

    /// Rows rejected by an import run
    Failures { import_id: String },
}

fn main() -> Result<()> {
    init_tracing(DEFAULT_LOG_FILTER);
    let cli = Cli::parse();

    match &cli.command {
        Command::Import { file, json } => run_import(&cli.store, file, *json),
        Command::Delete { file } => run_delete(&cli.store, file),
        Command::Export { output } => run_export(&cli.store, output.as_ref()),
        Command::SeedCountries { file } => run_seed(&cli.store, file),
        Command::Stats => run_stats(&cli.store),
        Command::Failures { import_id } => run_failures(&cli.store, import_id),
    }
}

fn read_upload(file: &PathBuf) -> Result<(String, Vec<u8>)> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    Ok((name, bytes))
}

fn run_import(args: &StoreArgs, file: &PathBuf, json: bool) -> Result<()> {
    let store = args.open_store()?;
    let importer = RecordImporter::new(args.load_rules()?);
    let (name, bytes) = read_upload(file)?;

    let summary = importer.run(&store, &name, &bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("📥 Import {}", summary.import_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(previous) = &summary.previous_import {
        println!("⚠️  Same file already imported in run {}", previous);
    }
    println!("✓ Created:   {}", summary.created);
    println!("✓ Updated:   {}", summary.updated);
    println!("· Skipped:   {}", summary.skipped);
    println!("✗ Failed:    {}", summary.failed);
    println!("+ Associations created: {}", summary.associations_created);
    for failure in &summary.failures {
        println!("   line {}: {}", failure.line_number, failure.reason);
    }
    println!("\n{}", summary.notification_body());

    Ok(())
}

fn run_delete(args: &StoreArgs, file: &PathBuf) -> Result<()> {
    let store = args.open_store()?;
    let (_, bytes) = read_upload(file)?;

    let summary = DeletionImporter.run(&store, &bytes)?;
    println!("🗑️  Deleted {} record(s)", summary.deleted);
    println!("✉️  Cleared email on {} record(s)", summary.emails_cleared);
    Ok(())
}

fn run_export(args: &StoreArgs, output: Option<&PathBuf>) -> Result<()> {
    let store = args.open_store()?;
    match output {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            let count = export_records(&store, file)?;
            eprintln!("✓ Exported {} record(s) to {}", count, path.display());
        }
        None => {
            export_records(&store, io::stdout().lock())?;
        }
    }
    Ok(())
}

fn run_seed(args: &StoreArgs, file: &PathBuf) -> Result<()> {
    let store = args.open_store()?;
    let reader = fs::File::open(file).with_context(|| format!("Failed to open {:?}", file))?;
    let (countries, states) = store.load_countries(reader)?;
    println!("✓ Loaded {} countries, {} states", countries, states);
    Ok(())
}

fn run_stats(args: &StoreArgs) -> Result<()> {
    let store = args.open_store()?;

    println!("📊 Records:      {}", store.record_count()?);
    println!("   Associations: {}", store.association_count()?);

    for association_type in AssociationType::ALL {
        println!("\n{}", association_type);
        for (name, count) in store.record_counts_by_association(association_type)? {
            println!("  {:<40} {}", name, count);
        }
    }

    println!("\nPer month");
    for (month, count) in store.records_per_month()? {
        println!("  {}  {}", month, count);
    }

    Ok(())
}

fn run_failures(args: &StoreArgs, import_id: &str) -> Result<()> {
    let store = args.open_store()?;
    let run = store
        .import_run(import_id)?
        .with_context(|| format!("No import run {}", import_id))?;

    println!(
        "📄 {} ({} rows, {} failed)",
        run.file_name, run.total_rows, run.failed_rows
    );
    for failure in store.failed_rows(import_id)? {
        println!("  line {}: {}  {}", failure.line_number, failure.reason, failure.data);
    }

    // Same digest uploaded again later?
    if let Some(latest) = store.find_import_by_digest(&run.file_sha256)? {
        if latest != run.id {
            println!("ℹ️  Superseded by run {}", latest);
        }
    }

    Ok(())
}
