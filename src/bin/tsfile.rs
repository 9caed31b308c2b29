//! File analysis tool: replays a raw TS file or a PCAP capture through
//! the monitor under synthetic time, printing one JSON snapshot record
//! per interval and a final record at end of file.

use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tsmon::config::MonitorConfig;
use tsmon::monitor::Monitor;
use tsmon::report::Snapshot;
use tsmon::source::{FileSource, PacketSource, PcapSource};
use tsmon::Result;

/// Analyse a recorded transport stream according to ETSI TR 101 290.
#[derive(Debug, Parser)]
#[command(name = "tsfile", version)]
struct Args {
    /// Path to a raw .ts file or a .pcap capture
    file: PathBuf,

    /// Statistics output interval in seconds
    #[arg(short = 's', long = "stat-int-s", default_value_t = 1)]
    stat_int_s: u64,

    /// Skip CC errors for the first milliseconds
    #[arg(short = 'e', long = "skip-cc-err-ms", default_value_t = 500)]
    skip_cc_err_ms: u64,

    /// Treat the input as a PCAP capture regardless of its extension
    #[arg(long)]
    pcap: bool,
}

fn print_snapshot(snapshot: &Snapshot) {
    match serde_json::to_string(snapshot) {
        Ok(line) => println!("{}", line),
        Err(err) => log::error!("snapshot serialisation failed: {}", err),
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init_timed();
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("tsfile: {}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let is_pcap = args.pcap
        || args
            .file
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pcap"))
            .unwrap_or(false);

    let config = MonitorConfig {
        snapshot_interval: Duration::from_secs(args.stat_int_s.max(1)),
        cc_grace: (args.skip_cc_err_ms > 0)
            .then(|| Duration::from_millis(args.skip_cc_err_ms)),
        synthetic_time: true,
        ..Default::default()
    };

    let mut monitor = Monitor::new(&config);
    {
        let mut stats = monitor.stats().lock();
        stats.monitoring_start_dt = Some(Utc::now());
        stats.on_stat_ready.subscribe(print_snapshot);
        stats.on_final_stat_ready.subscribe(print_snapshot);
    }

    let mut source: Box<dyn PacketSource> = if is_pcap {
        Box::new(PcapSource::open(&args.file).await?)
    } else {
        Box::new(FileSource::open(&args.file).await?)
    };

    while let Some(chunk) = source.next_chunk().await? {
        monitor.push(&chunk.data, chunk.dt);
    }

    monitor.finalize(Utc::now());
    Ok(())
}
