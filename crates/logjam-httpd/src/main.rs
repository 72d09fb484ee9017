use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use logjam_httpd::Ingress;

/// HTTP beacon collector for the logjam pipeline
#[derive(Parser)]
#[command(name = "logjam-httpd")]
#[command(about = "Accepts GET beacons from browsers and republishes them as logjam messages")]
#[command(version)]
struct Cli {
    /// Device number stamped into published meta frames
    #[arg(short = 'd', long, default_value_t = 0)]
    device_number: u32,

    /// HTTP listen port
    #[arg(short = 't', long, default_value_t = 9705)]
    http_port: u16,

    /// PUB port for downstream importers
    #[arg(short = 'p', long, default_value_t = 9706)]
    pub_port: u16,

    /// Log request/response detail
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    // unknown options and missing arguments print usage and exit 1
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(1);
    });

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ctx = zmq::Context::new();
    let ingress = Ingress::bind(&ctx, cli.device_number, cli.http_port, cli.pub_port)?;
    ingress.run()
}
