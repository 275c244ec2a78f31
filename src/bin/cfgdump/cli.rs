// CLI argument definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "cfgdump")]
#[command(author = "hatlonely <hatlonely@foxmail.com>")]
#[command(version = "0.1.0")]
#[command(about = "Load a configuration source and print it as JSON", long_about = None)]
pub struct Cli {
    /// Keep running and print the configuration again on every change
    #[arg(short, long, global = true)]
    pub watch: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Environment variables sharing a prefix
    Env(EnvArgs),
    /// A local JSON, YAML or TOML file
    File(FileArgs),
    /// A prefix in the Consul KV store
    Consul(ConsulArgs),
}

#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Variable prefix without the trailing underscore (e.g. APP)
    pub prefix: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

#[derive(Args, Debug)]
pub struct FileArgs {
    /// Path to the configuration file
    pub path: String,

    /// File format (default: inferred from the extension)
    #[arg(short, long, value_enum)]
    pub format: Option<Format>,

    /// Debounce window in milliseconds (default: 1000 for YAML, 500 otherwise)
    #[arg(long)]
    pub debounce_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ConsulArgs {
    /// Key prefix holding the configuration (e.g. services/orders)
    pub prefix: String,

    /// Consul HTTP address
    #[arg(long, default_value = "http://127.0.0.1:8500")]
    pub endpoint: String,

    /// ACL token
    #[arg(long)]
    pub token: Option<String>,

    /// Datacenter to query
    #[arg(long)]
    pub datacenter: Option<String>,

    /// Debounce window in milliseconds
    #[arg(long, default_value = "500")]
    pub debounce_ms: u64,
}

impl Format {
    /// Guess the format from a file extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = std::path::Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}
