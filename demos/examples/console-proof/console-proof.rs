use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::time::Duration;
use std::{io::Write, str::FromStr};

use rtc_proof::media_stream::MediaStreamConstraints;
use rtc_proof::peer_connection::transport::ice::RTCIceServer;
use rtc_proof::platform::{MediaAccess, SimulatedPlatform};
use rtc_proof::proof::{ConnectionProof, ProofConfiguration, ProofConfigurationBuilder};

#[derive(Parser)]
#[command(name = "console-proof")]
#[command(version = "0.0.0")]
#[command(about = "Proves that two in-process endpoints can negotiate a connection", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
    /// JSON configuration file; flags below override it.
    #[arg(long)]
    config: Option<String>,
    /// STUN or TURN url, may be repeated.
    #[arg(long)]
    stun: Vec<String>,
    #[arg(long)]
    no_media: bool,
    #[arg(long)]
    deny_media: bool,
    #[arg(long)]
    packet_loss: Option<f64>,
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[arg(long)]
    max_attempts: Option<u32>,
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = log::LevelFilter::from_str(&cli.log_level)?;
    if cli.debug {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    chrono::Local::now().format("%H:%M:%S.%6f"),
                    record.args()
                )
            })
            .filter(None, log_level)
            .init();
    }

    run(&cli).await
}

/// Runs one proof and cleans up. A failed proof is returned as an error so
/// the process exits non-zero.
async fn run(cli: &Cli) -> Result<()> {
    let configuration = configuration(cli)?;
    let media_access = if cli.deny_media {
        MediaAccess::Denied
    } else {
        MediaAccess::Granted
    };
    let platform = SimulatedPlatform::new().with_media_access(media_access);
    let mut proof = ConnectionProof::new(configuration, Box::new(platform));

    let result = match proof.start().await {
        Ok(result) => result,
        Err(err) => {
            error!("proof failed: {err}");
            println!("PROOF FAILED: {err}");
            proof.cleanup();
            return Err(err.into());
        }
    };

    if let Some(session) = proof.session() {
        let (sent, dropped) = session.network_stats();
        info!("datagrams sent: {sent}, dropped: {dropped}");
    }
    println!("{result}");
    if cli.json {
        println!("{}", result.to_json()?);
    }

    proof.cleanup();
    Ok(())
}

fn configuration(cli: &Cli) -> Result<ProofConfiguration> {
    let base = match &cli.config {
        Some(path) => ProofConfiguration::from_json(&std::fs::read_to_string(path)?)?,
        None => ProofConfiguration::default(),
    };

    let mut builder = ProofConfigurationBuilder::new()
        .with_ice_servers(base.ice_servers().to_vec())
        .with_media_constraints(*base.media())
        .with_poll_interval(base.poll_interval())
        .with_max_attempts(base.max_attempts());

    if !cli.stun.is_empty() {
        builder = builder.with_ice_servers(
            cli.stun
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
        );
    }
    if cli.no_media {
        builder = builder.with_media_constraints(MediaStreamConstraints::none());
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        builder = builder.with_poll_interval(Duration::from_millis(poll_interval_ms));
    }
    if let Some(max_attempts) = cli.max_attempts {
        builder = builder.with_max_attempts(max_attempts);
    }

    let mut setting_engine = base.setting_engine().clone();
    if let Some(packet_loss) = cli.packet_loss {
        setting_engine.set_packet_loss(packet_loss);
    }

    Ok(builder.with_setting_engine(setting_engine).build())
}
