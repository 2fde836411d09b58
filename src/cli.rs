// Diagnostics CLI.
//
// Request decoding normally happens on the server; these subcommands
// run the mirror decode path locally so a built URL (or a single
// encoded arg) can be inspected.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::decode::decode_request;
use crate::features;
use crate::module::ModuleIdMap;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Combo-request URL codec diagnostics.
#[derive(Parser, Debug)]
#[command(
    name = "comboreq",
    version,
    about = "Decode module-aggregation request URLs",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Decode a request URL into its module list and feature set.
    Decode(DecodeArgs),
    /// Decode a trit-packed `hasEnc` feature arg.
    Features(FeaturesArgs),
}

#[derive(clap::Args, Debug)]
struct DecodeArgs {
    /// The request URL (or bare query string).
    url: String,

    /// JSON id map file: `{"hash": "<hex>", "ids": {"name": 1, ...}}`.
    #[arg(long = "id-map", value_hint = ValueHint::FilePath)]
    id_map: Option<PathBuf>,

    /// Canonical feature list file, one feature name per line.
    #[arg(long = "feature-list", value_hint = ValueHint::FilePath)]
    feature_list: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct FeaturesArgs {
    /// The encoded `hasEnc` value.
    encoded: String,

    /// Canonical feature list file, one feature name per line.
    #[arg(long = "feature-list", value_hint = ValueHint::FilePath)]
    feature_list: PathBuf,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = real_main(cli) {
        eprintln!("comboreq: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn real_main(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Cmd::Decode(args) => cmd_decode(args),
        Cmd::Features(args) => cmd_features(args),
    }
}

fn cmd_decode(args: DecodeArgs) -> Result<(), Box<dyn Error>> {
    let id_map = match &args.id_map {
        Some(path) => load_id_map(path)?,
        None => ModuleIdMap::default(),
    };
    let canonical = match &args.feature_list {
        Some(path) => load_feature_list(path)?,
        None => Vec::new(),
    };

    let decoded = decode_request(&args.url, &id_map, &canonical)?;
    let json = serde_json::json!({
        "modules": decoded.modules.iter().map(|m| m.to_mid()).collect::<Vec<_>>(),
        "excludes": decoded.excludes.iter().map(|m| m.to_mid()).collect::<Vec<_>>(),
        "features": decoded.features,
        "featureDigest": decoded.feature_digest,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn cmd_features(args: FeaturesArgs) -> Result<(), Box<dyn Error>> {
    let canonical = load_feature_list(&args.feature_list)?;
    let decoded = features::decode(&args.encoded, &canonical)?;
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Input files
// ---------------------------------------------------------------------------

fn load_id_map(path: &Path) -> Result<ModuleIdMap, Box<dyn Error>> {
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let hash = match value.get("hash").and_then(serde_json::Value::as_str) {
        Some(hex) => parse_hex(hex)?,
        None => Vec::new(),
    };
    let mut map = ModuleIdMap::new(hash);
    if let Some(ids) = value.get("ids").and_then(serde_json::Value::as_object) {
        for (name, id) in ids {
            let id = id
                .as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| format!("id for {name:?} is not a 32-bit number"))?;
            map.insert(name.clone(), id)?;
        }
    }
    Ok(map)
}

fn load_feature_list(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_hex(hex: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    if hex.len() % 2 != 0 {
        return Err("hash must be an even number of hex digits".into());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| format!("invalid hex in hash: {hex:?}").into())
        })
        .collect()
}
