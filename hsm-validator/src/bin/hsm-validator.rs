//! Operator tool for an HSM-backed validator.
//!
//! `init` provisions a key pair in the module and writes the key file plus
//! a genesis document; `check` loads the key back into the module; `show`
//! prints the identity from the key file alone.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use hsm_module::ThalesHsm;
use hsm_validator::genesis::{DEFAULT_CHAIN_ID, DEFAULT_POWER};
use hsm_validator::{GenesisDoc, HsmPrivValidator, KeyFile, ModuleConfig, PrivValidator};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// HSM-backed consensus validator tool.
#[derive(Parser, Debug)]
#[command(name = "hsm-validator")]
#[command(about = "Provision and inspect a validator key held in an HSM")]
#[command(version)]
struct Args {
    /// JSON file with module host, port and timeout
    #[arg(long, env = "HSM_MODULE_CONFIG")]
    config: Option<PathBuf>,

    /// Module host (overrides the config file)
    #[arg(long, env = "HSM_MODULE_HOST")]
    host: Option<String>,

    /// Module port (overrides the config file)
    #[arg(long, env = "HSM_MODULE_PORT")]
    port: Option<u16>,

    /// Round-trip job deadline in milliseconds; unset waits indefinitely
    #[arg(long, env = "HSM_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Path to the validator key file
    #[arg(long, env = "HSM_KEY_FILE", default_value = "hsm-priv-validator.json")]
    key_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key pair in the module and write key file and genesis
    Init {
        #[arg(long, default_value = DEFAULT_CHAIN_ID)]
        chain_id: String,

        #[arg(long, default_value = "genesis.json")]
        genesis: PathBuf,

        #[arg(long, default_value_t = DEFAULT_POWER)]
        power: i64,
    },
    /// Load the stored key into the module and print the validator identity
    Check,
    /// Print the validator identity without contacting the module
    Show,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match module_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load module config: {}", e);
            std::process::exit(1);
        }
    };
    let endpoint = config.endpoint();
    info!("Key file: {:?}", args.key_file);

    match args.command {
        Command::Init {
            chain_id,
            genesis,
            power,
        } => {
            info!("Provisioning validator key via module at {}", endpoint);
            let validator = match HsmPrivValidator::bootstrap(ThalesHsm::new(endpoint)) {
                Ok(v) => v,
                Err(e) => {
                    error!("Failed to generate validator key: {}", e);
                    std::process::exit(1);
                }
            };

            if let Err(e) = validator.save(&args.key_file) {
                error!("Failed to write key file {:?}: {}", args.key_file, e);
                std::process::exit(1);
            }
            println!("Wrote private validator file to: {}", args.key_file.display());

            let doc = GenesisDoc::single_validator(chain_id, &validator.pub_key(), power);
            if let Err(e) = doc.save(&genesis) {
                error!("Failed to write genesis {:?}: {}", genesis, e);
                std::process::exit(1);
            }
            println!("Wrote genesis file to: {}", genesis.display());
            print_identity(&validator);
        }
        Command::Check => {
            let validator =
                match HsmPrivValidator::load_from_file(&args.key_file, ThalesHsm::new(endpoint)) {
                    Ok(v) => v,
                    Err(e) => {
                        error!("Failed to restore validator: {}", e);
                        std::process::exit(1);
                    }
                };
            print_identity(&validator);
        }
        Command::Show => match show(&args.key_file, ThalesHsm::new(endpoint)) {
            Ok(validator) => print_identity(&validator),
            Err(e) => {
                error!("Failed to read key file: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn module_config(args: &Args) -> Result<ModuleConfig, hsm_validator::ValidatorError> {
    let mut config = match &args.config {
        Some(path) => ModuleConfig::load(path)?,
        None => ModuleConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.timeout_ms.is_some() {
        config.timeout_ms = args.timeout_ms;
    }
    Ok(config)
}

fn show(
    path: &Path,
    hsm: ThalesHsm,
) -> Result<HsmPrivValidator<ThalesHsm>, hsm_validator::ValidatorError> {
    HsmPrivValidator::new(KeyFile::load(path)?, hsm)
}

fn print_identity(validator: &impl PrivValidator) {
    println!("Address: {}", validator.address());
    println!("Public key: {}", hex::encode_upper(validator.pub_key()));
}
