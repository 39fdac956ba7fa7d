//! Link simulation driver for the HFSC scheduler.
//!
//! Builds an interface from a JSON config (or a built-in three-class
//! demo tree), saturates it with synthetic traffic from a producer
//! thread, and drains it at the configured link rate under a manual
//! clock. Prints per-class achieved rates at the end.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use serde::Serialize;

use hfsc_sched::{
    ClassSpec, ClassStats, InterfaceConfig, ManualClock, Packet, SchedulerRegistry,
    SchedulerStats, ServiceCurve,
};

struct CliOptions {
    bandwidth: u64,
    duration_ms: u64,
    config: Option<String>,
    json: bool,
}

fn parse_cli_options() -> CliOptions {
    let mut options = CliOptions {
        bandwidth: 10_000_000,
        duration_ms: 1_000,
        config: None,
        json: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some((key, value)) = arg.split_once('=') {
            apply_option(&mut options, key, value);
        } else if arg == "--json" {
            options.json = true;
        } else if matches!(arg.as_str(), "--bandwidth" | "--duration" | "--config") {
            if let Some(value) = args.next() {
                apply_option(&mut options, &arg, &value);
            }
        }
    }

    options
}

fn apply_option(options: &mut CliOptions, key: &str, value: &str) {
    match key {
        "--bandwidth" => {
            if let Ok(parsed) = value.parse() {
                options.bandwidth = parsed;
            }
        }
        "--duration" => {
            if let Ok(parsed) = value.parse() {
                options.duration_ms = parsed;
            }
        }
        "--config" => options.config = Some(value.to_string()),
        _ => {}
    }
}

/// Three classes on one link: a realtime voice class with a burst
/// segment, a weighted web class, and a default bulk class that picks
/// up unclassified flows.
fn demo_config(bandwidth: u64) -> InterfaceConfig {
    InterfaceConfig {
        interface: "sim0".to_string(),
        bandwidth,
        classes: vec![
            ClassSpec {
                name: "voice".to_string(),
                realtime: Some(ServiceCurve {
                    m1: bandwidth / 5 * 2,
                    d: 20,
                    m2: bandwidth / 5,
                }),
                flows: vec![1],
                ..Default::default()
            },
            ClassSpec {
                name: "web".to_string(),
                linkshare: Some(ServiceCurve::linear(bandwidth / 10 * 6)),
                flows: vec![2],
                ..Default::default()
            },
            ClassSpec {
                name: "bulk".to_string(),
                linkshare: Some(ServiceCurve::linear(bandwidth / 10 * 2)),
                default: true,
                ..Default::default()
            },
        ],
    }
}

#[derive(Serialize)]
struct SimReport {
    interface: String,
    duration_ms: u64,
    link_bps: u64,
    scheduler: SchedulerStats,
    classes: BTreeMap<String, ClassStats>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = parse_cli_options();

    let config = match &options.config {
        Some(path) => InterfaceConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => demo_config(options.bandwidth),
    };
    let link_bps = config.bandwidth;

    let clock = Arc::new(ManualClock::new(1_000_000));
    let registry = SchedulerRegistry::new(clock.clone());
    let interface = registry.attach(&config)?;

    // Offered load far above link capacity so every class stays
    // backlogged and the per-class split reflects the curves.
    let (tx, rx) = bounded::<Packet>(4_096);
    let producer = thread::spawn(move || {
        let flows: [(u64, usize); 3] = [(1, 200), (2, 1_000), (3, 1_500)];
        let mut next = 0usize;
        loop {
            let (flow, len) = flows[next % flows.len()];
            next += 1;
            if tx.send(Packet::synthetic(flow, len)).is_err() {
                break;
            }
        }
    });

    let bytes_per_ms = (link_bps / 8 / 1_000).max(1) as i64;
    let mut credit = 0i64;
    for _ in 0..options.duration_ms {
        {
            let mut iface = interface.lock();
            for packet in rx.try_iter().take(64) {
                // Tail drops are expected here; they show up in the
                // class stats.
                let _ = iface.enqueue_packet(packet);
            }
            credit += bytes_per_ms;
            while credit > 0 {
                match iface.scheduler.dequeue() {
                    Some(packet) => credit -= packet.len() as i64,
                    None => {
                        // An idle or rate-limited link wastes its slot.
                        credit = 0;
                        break;
                    }
                }
            }
        }
        clock.advance(1_000);
    }

    drop(rx);
    producer
        .join()
        .map_err(|_| "packet producer thread panicked")?;

    let iface = interface.lock();
    let mut classes = BTreeMap::new();
    for (name, &id) in &iface.classes {
        classes.insert(name.clone(), iface.scheduler.class_stats(id)?);
    }
    let report = SimReport {
        interface: config.interface.clone(),
        duration_ms: options.duration_ms,
        link_bps,
        scheduler: iface.scheduler.stats(),
        classes,
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "interface {} at {} bit/s over {} ms:",
            report.interface, report.link_bps, report.duration_ms
        );
        for (name, stats) in &report.classes {
            let achieved = stats.xmit.bytes * 8 * 1_000 / report.duration_ms.max(1);
            println!(
                "  {:<8} {:>10} bytes sent  {:>10} bit/s  {:>6} pkts dropped",
                name, stats.xmit.bytes, achieved, stats.drops.packets
            );
        }
        println!(
            "  backlog {} packets, {} packets total on the wire",
            report.scheduler.backlog, report.scheduler.xmit.packets
        );
    }

    Ok(())
}
