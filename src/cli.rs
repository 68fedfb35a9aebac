use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "A local mirror of a remote GraphQL object graph", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create (or verify) the store against the configured schema
    Bootstrap,
    /// Report objects and connections due for a refresh
    Status {
        /// Only report items not refreshed since this many milliseconds ago
        #[arg(long, default_value_t = 0)]
        since_epoch_millis: i64,
    },
}
