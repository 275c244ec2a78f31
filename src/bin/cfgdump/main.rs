// cfgdump - print a configuration source as JSON

mod cli;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

use cfg_loader::cfg::unmarshal;
use cfg_loader::cfg::{
    ConsulSourceConfig, EnvSource, EnvSourceConfig, FileSource, FileSourceConfig, KvSource,
    KvSourceConfig, Source,
};
use cfg_loader::kv::ConsulStoreConfig;
use cli::{Cli, Commands, ConsulArgs, FileArgs, Format};

fn print(source: &impl Source) -> Result<()> {
    let value: JsonValue = source.get()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Print once, then on every change signal until the change stream closes
fn dump<S: Source>(mut source: S, watch: bool) -> Result<()> {
    let result = print(&source);
    if watch {
        if let Err(e) = &result {
            log::error!("loading configuration failed: {:#}", e);
        }
        for _ in source.changes() {
            log::info!("configuration changed, reloading");
            if let Err(e) = print(&source) {
                log::error!("reloading configuration failed: {:#}", e);
            }
        }
    }
    source.close()?;
    result
}

fn file_source(args: &FileArgs) -> Result<FileSource> {
    let format = args
        .format
        .or_else(|| Format::from_path(&args.path))
        .ok_or_else(|| anyhow!("cannot infer the format of {}, pass --format", args.path))?;

    let (unmarshal, default_debounce) = match format {
        Format::Json => (unmarshal::json(), 500),
        Format::Yaml => (unmarshal::yaml(), 1000),
        Format::Toml => (unmarshal::toml(), 500),
    };
    let config = FileSourceConfig {
        path: args.path.clone(),
        debounce_ms: args.debounce_ms.unwrap_or(default_debounce),
    };
    Ok(FileSource::new(config, unmarshal))
}

fn consul_config(args: &ConsulArgs) -> ConsulSourceConfig {
    ConsulSourceConfig {
        source: KvSourceConfig {
            prefix: args.prefix.clone(),
            debounce_ms: args.debounce_ms,
        },
        consul: ConsulStoreConfig {
            endpoint: args.endpoint.clone(),
            token: args.token.clone(),
            datacenter: args.datacenter.clone(),
            ..Default::default()
        },
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Env(args) => dump(
            EnvSource::new(EnvSourceConfig {
                prefix: args.prefix.clone(),
            }),
            cli.watch,
        ),
        Commands::File(args) => dump(file_source(args)?, cli.watch),
        Commands::Consul(args) => {
            let source = KvSource::consul(consul_config(args));
            if cli.watch && !source.live_reload() {
                log::warn!("the store cannot watch {:?}, printing once", source.prefix());
            }
            dump(source, cli.watch)
        }
    }
}
