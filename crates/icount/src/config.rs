//! Client configuration.
//!
//! [`ClientConfig`] is what the client runs with. [`ClientOptions`] parses
//! the argument vector the host framework hands to the client at startup.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use icount_report::{DEFAULT_MAX_DEPTH, DEFAULT_TOP_N};

/// Client name, also the report file stem.
pub const DEFAULT_CLIENT_NAME: &str = "instr_analysis";

/// Default number of context handles each counter array can hold.
pub const DEFAULT_HANDLE_CAPACITY: usize = 1 << 24;

/// Largest `--top` accepted on the command line.
pub const MAX_TOP_N: usize = 1 << 16;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Name used in the report file name and diagnostics.
    pub client_name: String,
    /// Directory the report file is created in.
    pub output_dir: PathBuf,
    /// Counter array capacity, in context handles.
    pub capacity: usize,
    /// Contexts reported per category.
    pub top_n: usize,
    /// Frames rendered per backtrace.
    pub max_depth: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            output_dir: PathBuf::from("."),
            capacity: DEFAULT_HANDLE_CAPACITY,
            top_n: DEFAULT_TOP_N,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ClientConfig {
    /// Default configuration writing its report into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Set the counter array capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the number of contexts reported per category.
    #[must_use]
    pub const fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Set the backtrace depth.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the client name.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Parse client options, `args[0]` being the client path.
    ///
    /// # Errors
    ///
    /// Returns the clap error for unknown or malformed options.
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        ClientOptions::try_parse_from(args).map(Self::from)
    }
}

/// Options accepted on the client's command line.
#[derive(Parser, Debug)]
#[command(name = DEFAULT_CLIENT_NAME)]
#[command(about = "Top calling contexts per instruction category")]
pub struct ClientOptions {
    /// Directory the report file is created in
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Number of context handles each counter array can hold
    #[arg(long, default_value_t = DEFAULT_HANDLE_CAPACITY)]
    pub capacity: usize,

    /// Contexts reported per category
    #[arg(long, default_value_t = DEFAULT_TOP_N, value_parser = parse_top)]
    pub top: usize,

    /// Frames rendered per backtrace
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub depth: u32,
}

fn parse_top(arg: &str) -> Result<usize, String> {
    let top: usize = arg.parse().map_err(|e| format!("{e}"))?;
    if (1..=MAX_TOP_N).contains(&top) {
        Ok(top)
    } else {
        Err(format!("must be between 1 and {MAX_TOP_N}"))
    }
}

impl From<ClientOptions> for ClientConfig {
    fn from(opts: ClientOptions) -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            output_dir: opts.output_dir,
            capacity: opts.capacity,
            top_n: opts.top,
            max_depth: opts.depth,
        }
    }
}
