// Phenotype core command line tool
//
// Purpose: run the matrix, transformation, correlation and exchange operations
// against a store directory and print JSON payloads.
// Usage: pheno_tool <command> [args]   (store directory from DATA_DIR)

use anyhow::{bail, Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phenotype_core::exchange::flat::TraitTable;
use phenotype_core::exchange::isatab::{import_isatab_in, IsaTabExporter};
use phenotype_core::model::{StudyId, TraitId};
use phenotype_core::{
    CoreConfig, CorrelationEngine, IdAllocator, MatrixBuilder, MemoryStore, PhenotypeStore, PivotKey,
    StudyBundle, TransformationEngine,
};

const USAGE: &str = "usage: pheno_tool <command> [args]

commands:
  matrix <study_id>                   dense observation-unit x trait matrix
  transform <trait_id>                all transformations with normality p-values
  correlate <id,id,...>               correlation bundle for a trait set
  export-isatab <study_id> <out.zip>  write an ISA-Tab archive
  import-isatab <archive.zip>         parse an ISA-Tab archive
  export-plink <trait_id>             single-trait PLINK table on stdout";

fn main() -> Result<()> {
    // Initialize tracing (structured logging)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phenotype_core=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = CoreConfig::from_env()?;

    if command == "import-isatab" {
        let archive = arg(&args, 1, "archive path")?;
        let bundle = import_isatab_in(Path::new(archive), &mut IdAllocator::default(), &config.archive)
            .with_context(|| format!("Failed to import {}", archive))?;
        return print_json(&bundle);
    }

    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    tracing::info!("DATA_DIR: {}", data_dir);
    let store = MemoryStore::load_dir(Path::new(&data_dir))?;

    match command.as_str() {
        "matrix" => {
            let study_id: StudyId = parse(arg(&args, 1, "study id")?)?;
            let (identity, matrix) =
                MatrixBuilder::new(PivotKey::TraitName).build_for_study(&store, study_id)?;
            print_json(&serde_json::json!({
                "identity": identity,
                "matrix": matrix,
            }))
        }
        "transform" => {
            let trait_id: TraitId = parse(arg(&args, 1, "trait id")?)?;
            if store.trait_by_id(trait_id).is_none() {
                bail!("Phenotype with id {} not found", trait_id);
            }
            let values: Vec<f64> = store
                .values_for_trait(trait_id)
                .iter()
                .map(|v| v.value)
                .collect();
            let engine = TransformationEngine::new(config.transform);
            print_json(&engine.transform_all(&values, true))
        }
        "correlate" => {
            let ids = arg(&args, 1, "trait id list")?
                .split(',')
                .map(|s| parse::<TraitId>(s.trim()))
                .collect::<Result<Vec<_>>>()?;
            let bundle = CorrelationEngine::new(&store).correlate(&ids)?;
            print_json(&bundle)
        }
        "export-isatab" => {
            let study_id: StudyId = parse(arg(&args, 1, "study id")?)?;
            let out = arg(&args, 2, "output path")?;
            let bundle = StudyBundle::from_store(&store, study_id)?;
            let bytes = IsaTabExporter::new(&config).export(&bundle)?;
            fs::write(out, &bytes).with_context(|| format!("Failed to write {}", out))?;
            tracing::info!("Wrote {} bytes to {}", bytes.len(), out);
            Ok(())
        }
        "export-plink" => {
            let trait_id: TraitId = parse(arg(&args, 1, "trait id")?)?;
            TraitTable::for_trait(&store, trait_id)?.write_plink(io::stdout().lock())?;
            Ok(())
        }
        other => {
            eprintln!("unknown command '{}'\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn arg<'a>(args: &'a [String], idx: usize, what: &str) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .with_context(|| format!("missing {}\n\n{}", what, USAGE))
}

fn parse<T: std::str::FromStr>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid id '{}'", raw))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
