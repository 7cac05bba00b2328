use clap::{
    builder::{styling::AnsiColor, Styles},
    Parser,
};

/// Parallel command-line tool for s3-compatible object stores and local
/// files.
#[derive(Debug, Parser)]
#[clap(about, version, styles = clap_v3_styles())]
pub struct Args {
    /// Number of pool workers executing jobs in parallel.
    #[clap(short = 'w', long, default_value_t = default_workers())]
    pub workers: usize,
    /// Multipart chunk size in megabytes (minimum 5).
    #[clap(long = "chunk-size", default_value_t = 5)]
    pub chunk_size_mb: u64,
    /// Endpoint override, for s3-compatible object stores.
    #[clap(long, env = "SQUALL_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,
    /// Read commands from FILE, one per line ("-" for stdin).
    #[clap(short = 'f', long = "file")]
    pub command_file: Option<String>,
    /// Log operation tallies at exit.
    #[clap(long)]
    pub stats: bool,
    /// A single command and its arguments, e.g. `cp a.txt s3://bucket/a.txt`.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn default_workers() -> usize {
    num_cpus::get() * 4
}

fn clap_v3_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}
