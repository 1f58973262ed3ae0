use clap::Parser;
use url::Url;

/// Helper tool to submit many concurrent queries to a Trino cluster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Trino coordinator endpoint
    #[arg(short, long)]
    pub endpoint: Url,

    /// Username
    #[arg(short, long)]
    pub username: String,

    /// Password
    #[arg(short, long)]
    pub password: String,

    /// The number of queries to submit
    #[arg(short, long)]
    pub queries: u64,

    /// How many queries should be sent per second. Can also take floating point numbers and values less than 1.0.
    #[arg(long, default_value_t = 10.0)]
    pub queries_per_second: f32,

    /// Maximum retry attempts per query against transient errors
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// SQL statement to submit repeatedly
    #[arg(long, default_value = "select count(*) from tpch.sf2.lineitem")]
    pub statement: String,
}
