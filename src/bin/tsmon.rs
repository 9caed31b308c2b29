//! Multicast monitoring tool: subscribes to a multicast stream and
//! monitors it according to ETSI TR 101 290, printing one JSON snapshot
//! record per interval and a final record at session end.

use chrono::Utc;
use clap::Parser;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tsmon::config::MonitorConfig;
use tsmon::monitor::Monitor;
use tsmon::report::Snapshot;
use tsmon::source::{MulticastSource, PacketSource};
use tsmon::Result;

/// Subscribe to a multicast stream and monitor its parameters according
/// to ETSI TR 101 290.
#[derive(Debug, Parser)]
#[command(name = "tsmon", version)]
struct Args {
    /// Multicast ip address
    #[arg(short = 'i', long = "ipaddress")]
    ipaddress: Ipv4Addr,

    /// Multicast port
    #[arg(short = 'p', long = "port", default_value_t = 1234)]
    port: u16,

    /// Time to wait for multicast in seconds
    #[arg(short = 'w', long = "wait-s", default_value_t = 15)]
    wait_s: u64,

    /// Monitoring time in seconds
    #[arg(short = 't', long = "mon-time-s", default_value_t = 180)]
    mon_time_s: u64,

    /// Statistics output interval in seconds
    #[arg(short = 's', long = "stat-int-s", default_value_t = 1)]
    stat_int_s: u64,

    /// Skip CC errors for the first milliseconds
    #[arg(short = 'e', long = "skip-cc-err-ms", default_value_t = 500)]
    skip_cc_err_ms: u64,
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
        eprintln!("tsmon: {}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = MonitorConfig {
        snapshot_interval: Duration::from_secs(args.stat_int_s.max(1)),
        cc_grace: (args.skip_cc_err_ms > 0)
            .then(|| Duration::from_millis(args.skip_cc_err_ms)),
        synthetic_time: false,
        ..Default::default()
    };

    let mut monitor = Monitor::new(&config);
    let start = Utc::now();
    {
        let mut stats = monitor.stats().lock();
        stats.monitoring_start_dt = Some(start);
        stats.on_stat_ready.subscribe(print_snapshot);
        stats.on_final_stat_ready.subscribe(print_snapshot);
    }

    // Setup failures (bad address, bind, join) are the only non-zero exits.
    let mut source = MulticastSource::join(
        args.ipaddress,
        args.port,
        Duration::from_secs(args.wait_s),
    )
    .await?;

    println!("START MONITORING: {}", start);
    monitor.start_timer();

    let deadline = Instant::now() + Duration::from_secs(args.mon_time_s);
    let mut multicast_present = false;
    let mut first_packet = true;
    while Instant::now() < deadline {
        match source.next_chunk().await? {
            None => break,
            Some(chunk) => {
                multicast_present = true;
                if first_packet {
                    first_packet = false;
                    let join_time = Utc::now() - start;
                    println!("JOIN TIME: {}ms", join_time.num_milliseconds());
                }
                monitor.push(&chunk.data, chunk.dt);
            }
        }
    }

    let end = Utc::now();
    monitor.finalize(end);
    println!("STOP MONITORING: {}", end);
    if !multicast_present {
        println!("NO MULTICAST FOUND!!!");
    }
    Ok(())
}
