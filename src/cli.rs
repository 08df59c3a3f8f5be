use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "memc_load")]
#[command(about = "Parallel loader of appsinstalled logs into sharded memcached")]
#[command(version)]
pub struct Args {
    /// Path to config YAML file (default: config.yaml in root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Glob pattern for input files
    /// Overrides config value if provided
    #[arg(long)]
    pub pattern: Option<String>,

    /// idfa shard endpoint (host:port)
    #[arg(long)]
    pub idfa: Option<String>,

    /// gaid shard endpoint (host:port)
    #[arg(long)]
    pub gaid: Option<String>,

    /// adid shard endpoint (host:port)
    #[arg(long)]
    pub adid: Option<String>,

    /// dvid shard endpoint (host:port)
    #[arg(long)]
    pub dvid: Option<String>,

    /// Number of concurrent file processors
    /// Overrides config value if provided
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Parse and encode everything but skip the network writes
    #[arg(long)]
    pub dry: bool,

    /// Run the payload codec self-test and exit
    #[arg(short, long)]
    pub test: bool,

    /// Log file path (default: load.log inside the run directory)
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Override the generated run identifier (directory name under runs/).
    ///
    /// Intended for wrappers that need a deterministic run directory.
    /// If the value does not start with "run_", it will be prefixed.
    #[arg(long)]
    pub run_id: Option<String>,
}
