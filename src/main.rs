use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jvirt::compiler::{Disassembler, Virtualizer};
use jvirt::config::{VirtualizerConfig, opcode_table};
use jvirt::model::ClassNode;
use jvirt::package::{ArtifactManifest, RuntimePackage};
use jvirt::vm::bytecode;

/// File name of the rewritten class model inside the output directory.
const CLASSES_FILE: &str = "classes.json";

#[derive(Parser)]
#[command(name = "jvirt")]
#[command(about = "Virtualize JVM method bodies into a private instruction set", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Virtualize every eligible method of a JSON class model
    Virtualize {
        /// JSON file holding an array of class nodes
        input: PathBuf,
        /// Output artifact directory
        #[arg(short, long)]
        out: PathBuf,
        /// Configuration file (defaults to jvirt.toml in the working directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Opcode permutation seed (overrides the configuration)
        #[arg(long)]
        seed: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a listing of a stub resource or an artifact directory
    Disasm {
        /// Stub resource file, or an artifact directory
        path: PathBuf,
        /// Opcode permutation seed the resource was encoded with
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jvirt=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Virtualize {
            input,
            out,
            config,
            seed,
            json,
        } => virtualize(&input, &out, config.as_deref(), seed, json),
        Commands::Disasm { path, seed } => disasm(&path, seed),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn load_config(path: Option<&Path>) -> Result<VirtualizerConfig, String> {
    match path {
        Some(path) => VirtualizerConfig::load(path),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            VirtualizerConfig::load_or_default(&cwd)
        }
    }
    .map_err(|e| e.to_string())
}

fn virtualize(
    input: &Path,
    out: &Path,
    config_path: Option<&Path>,
    seed: Option<u64>,
    json: bool,
) -> Result<(), String> {
    let mut config = load_config(config_path)?;
    if seed.is_some() {
        config.opcode_seed = seed;
        config.shuffle_opcodes = true;
    }

    let content = fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
    let mut classes: Vec<ClassNode> = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse {}: {}", input.display(), e))?;

    let seed = config.resolve_seed();
    let mut virtualizer = Virtualizer::new(config.clone());
    for class in &mut classes {
        virtualizer.virtualize_class(class);
    }
    let names = virtualizer.names().to_vec();
    let (table, report) = virtualizer.finish();

    let package = RuntimePackage::build(&table, &names, &config, seed).map_err(|e| e.to_string())?;
    package.write_to_dir(out).map_err(|e| e.to_string())?;

    let classes_path = out.join(CLASSES_FILE);
    let rewritten = serde_json::to_string_pretty(&classes).map_err(|e| e.to_string())?;
    fs::write(&classes_path, rewritten)
        .map_err(|e| format!("failed to write {}: {}", classes_path.display(), e))?;

    if json {
        let report = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{}", report);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn disasm(path: &Path, seed: Option<u64>) -> Result<(), String> {
    let (resource, seed, names) = if path.is_dir() {
        let manifest = ArtifactManifest::load(path).map_err(|e| e.to_string())?;
        let seed = seed.or(manifest.opcode_seed);
        (path.join(&manifest.resource), seed, manifest.methods)
    } else {
        (path.to_path_buf(), seed, Vec::new())
    };

    let data = fs::read(&resource).map_err(|e| format!("failed to read {}: {}", resource.display(), e))?;
    let table = bytecode::decode(&data, &opcode_table(seed)).map_err(|e| e.to_string())?;

    let mut disassembler = Disassembler::new(&table).with_names(&names);
    print!("{}", disassembler.disassemble());
    Ok(())
}
