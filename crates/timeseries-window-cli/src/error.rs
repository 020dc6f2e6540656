use std::path::PathBuf;

use snafu::Snafu;
use timeseries_window_core::{
    config::ConfigError,
    session::SessionError,
    shard::ShardKeyError,
    transport::TransportError,
    window::ParseWindowError,
};

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Failed to read config file {}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid config file {}: {source}", path.display()))]
    LoadConfig { path: PathBuf, source: ConfigError },

    #[snafu(display("Invalid configuration: {source}"))]
    InvalidConfig { source: ConfigError },

    #[snafu(display("No shard base given; pass --base or set TSWINDOW_BASE"))]
    MissingBase,

    #[snafu(display("Shard base not found or not a directory: {}", path.display()))]
    BaseMissing { path: PathBuf },

    #[snafu(display("Failed to build HTTP client for {base}: {source}"))]
    HttpClient {
        base: String,
        source: TransportError,
    },

    #[snafu(display("Invalid entity or month: {source}"))]
    InvalidKey { source: ShardKeyError },

    #[snafu(display("Invalid window '{input}': {source}"))]
    InvalidWindow {
        input: String,
        source: ParseWindowError,
    },

    #[snafu(display("{source}"))]
    Session { source: SessionError },

    #[snafu(display("Shard {key} does not exist"))]
    ShardAbsent { key: String },

    #[snafu(display("Failed to render JSON: {source}"))]
    Json { source: serde_json::Error },

    #[snafu(display("{message}"))]
    Shell { message: String },
}
