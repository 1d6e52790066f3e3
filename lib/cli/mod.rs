use crate::build_info;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Applies widget create/update/delete requests to a bucket or table",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[clap(long)]
    /// Bucket holding pending requests (`file://<dir>` or `memory://` for local runs)
    pub request_bucket: String,

    #[clap(long)]
    /// Destination: an S3 bucket or DynamoDB table name
    pub widget_bucket: String,

    #[clap(long)]
    /// Read requests from this SQS queue instead of the request bucket
    pub queue_url: Option<String>,

    #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
    /// Empty polls before exiting (overrides MAX_IDLE_POLLS)
    pub max_idle_polls: Option<u32>,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
