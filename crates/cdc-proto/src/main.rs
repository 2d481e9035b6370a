//! cdc-proto command line
//!
//! Runs the transcoding pipeline on records stored as JSON documents.
//!
//! ## Usage
//!
//! ```bash
//! # Canonical JSON projection, no registry needed
//! cdc-proto project --set protobuf.json.exclude.properties=source.txid record.json
//!
//! # Framed Protobuf, printed as hex
//! cdc-proto transcode --config converter.yaml --topic inventory.customers record.json
//!
//! # Back to JSON through the registry
//! cdc-proto decode --config converter.yaml --topic inventory.customers --hex 000000000300...
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use cdc_proto::protobuf::message_to_json;
use cdc_proto::{
    ConverterConfig, JsonConverter, ProjectionConfig, ProtobufConverter, RecordConverter, Struct,
};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "cdc-proto")]
#[command(author, version, about = "Transcode CDC records into registry-framed Protobuf")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical JSON projection of a record
    Project {
        #[command(flatten)]
        options: OptionArgs,

        /// Record JSON file, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Transcode a record into framed Protobuf
    Transcode {
        #[command(flatten)]
        options: OptionArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Record JSON file, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Write raw bytes here instead of hex on stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a framed message back to JSON
    Decode {
        #[command(flatten)]
        options: OptionArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// File holding the raw frame
        #[arg(short, long, conflicts_with = "hex", required_unless_present = "hex")]
        file: Option<PathBuf>,

        /// Frame as a hex string
        #[arg(long)]
        hex: Option<String>,
    },
}

#[derive(Args)]
struct OptionArgs {
    /// YAML file of converter options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override an option (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
}

#[derive(Args)]
struct TargetArgs {
    /// Topic the record belongs to
    #[arg(short, long)]
    topic: String,

    /// Use the key subject instead of the value subject
    #[arg(long)]
    key: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Project {
            options,
            input,
            pretty,
        } => project(&options, &input, pretty),
        Commands::Transcode {
            options,
            target,
            input,
            output,
        } => transcode(&options, &target, &input, output.as_deref()),
        Commands::Decode {
            options,
            target,
            file,
            hex,
        } => decode(&options, &target, file.as_deref(), hex.as_deref()),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(io::stderr),
        )
        .init();
}

fn project(options: &OptionArgs, input: &Path, pretty: bool) -> Result<()> {
    let props = load_props(options)?;
    let config = ProjectionConfig::from_props(&props)?;
    let record = read_record(input)?;

    let tree = JsonConverter::new(&config).project(&record)?;
    let text = if pretty {
        serde_json::to_string_pretty(&tree)?
    } else {
        serde_json::to_string(&tree)?
    };
    println!("{}", text);
    Ok(())
}

fn transcode(
    options: &OptionArgs,
    target: &TargetArgs,
    input: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(options)?;
    let record = read_record(input)?;

    let converter = ProtobufConverter::new(&config, target.key)?;
    let bytes = converter
        .from_record(&target.topic, &record)
        .with_context(|| format!("Failed to transcode record for topic '{}'", target.topic))?;

    match output {
        Some(path) => {
            fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => println!("{}", hex::encode(&bytes)),
    }
    Ok(())
}

fn decode(
    options: &OptionArgs,
    target: &TargetArgs,
    file: Option<&Path>,
    hex: Option<&str>,
) -> Result<()> {
    let config = load_config(options)?;
    let frame = match (file, hex) {
        (Some(path), _) => {
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        (None, Some(text)) => from_hex(text)?,
        (None, None) => bail!("either --file or --hex is required"),
    };

    let converter = ProtobufConverter::new(&config, target.key)?;
    let message = converter
        .decode(&target.topic, &frame)
        .with_context(|| format!("Failed to decode frame for topic '{}'", target.topic))?;
    println!("{}", serde_json::to_string_pretty(&message_to_json(&message))?);
    Ok(())
}

fn load_config(options: &OptionArgs) -> Result<ConverterConfig> {
    let props = load_props(options)?;
    let config = ConverterConfig::from_props(&props)?;
    info!(
        registry = %config.registry.base_url(),
        version = ?config.version,
        skip_rules = config.projection.skip.len(),
        "Loaded converter configuration"
    );
    Ok(config)
}

/// YAML file first, then `--set` overrides.
fn load_props(options: &OptionArgs) -> Result<HashMap<String, String>> {
    let mut props = match &options.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            parse_props(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => HashMap::new(),
    };

    for pair in &options.set {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", pair))?;
        props.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(props)
}

/// Flat YAML mapping; scalar values are taken as their text.
fn parse_props(content: &str) -> Result<HashMap<String, String>> {
    let raw: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(content)?;
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => bail!("option '{}' must be a scalar, got {:?}", key, other),
            };
            Ok((key, text))
        })
        .collect()
}

fn read_record(input: &Path) -> Result<Struct> {
    let text = if input == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?
    };

    let json: serde_json::Value = serde_json::from_str(&text).context("Record is not valid JSON")?;
    Struct::from_json(&json).ok_or_else(|| anyhow!("Record must be a JSON object"))
}

/// Hex digits, whitespace ignored.
fn from_hex(text: &str) -> Result<Vec<u8>> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&text).context("Invalid hex frame")
}
