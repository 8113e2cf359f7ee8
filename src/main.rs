use anyhow::Context;
use ringkv::replication::engine::ReplicationConfig;
use ringkv::ring::node::RingNode;
use ringkv::ring::types::PeerInfo;
use ringkv::server::Server;
use std::sync::Arc;
use tokio::net::TcpListener;

fn print_usage(program: &str) {
    eprintln!("Usage: {} -p PORT [-j HOST:PORT] [-t THREADS]", program);
    eprintln!("Options:");
    eprintln!("  -p PORT      Server port (required)");
    eprintln!("  -j NODE      Join an existing ring via NODE (format: host:port)");
    eprintln!("  -t THREADS   Worker thread count (default: 8)");
    eprintln!("  -h           Show this help message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RINGKV_ADDR          Advertised address (default: 127.0.0.1)");
    eprintln!("  REPLICATION_FACTOR   Copies of each key, primary included (default: 3)");
    eprintln!("  ASYNC_REPLICATION    Set to 1 for fire-and-forget replication");
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut port: Option<u16> = None;
    let mut join_target: Option<String> = None;
    let mut threads: usize = 8;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-p" if i + 1 < args.len() => {
                port = Some(args[i + 1].parse().context("invalid -p PORT")?);
                i += 2;
            }
            "-j" if i + 1 < args.len() => {
                join_target = Some(args[i + 1].clone());
                i += 2;
            }
            "-t" if i + 1 < args.len() => {
                threads = args[i + 1].parse().context("invalid -t THREADS")?;
                i += 2;
            }
            "-h" => {
                print_usage(&args[0]);
                return Ok(());
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
    }

    let Some(port) = port else {
        eprintln!("Error: port is required");
        print_usage(&args[0]);
        std::process::exit(1);
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads.max(1))
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(run(port, join_target))
}

async fn run(port: u16, join_target: Option<String>) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let address = std::env::var("RINGKV_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let replication_factor = std::env::var("REPLICATION_FACTOR")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(3);
    let async_mode = std::env::var("ASYNC_REPLICATION")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let config = ReplicationConfig {
        replication_factor,
        async_mode,
        ..ReplicationConfig::default()
    };

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;

    let node = RingNode::new(&address, port, config);
    tracing::info!("node identifier: {}", node.id());

    match join_target {
        Some(endpoint) => {
            let bootstrap = PeerInfo::parse(&endpoint)
                .with_context(|| format!("invalid -j target '{}'", endpoint))?;
            tracing::info!("joining ring via {}", bootstrap);
            node.join(Arc::new(bootstrap))
                .await
                .context("failed to join ring")?;
        }
        None => node.create(),
    }

    node.start_maintenance();

    let server = Server::new(listener, node.clone());
    let shutdown = server.shutdown_signal();
    let signal_node = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_node.leave().await;
            let _ = shutdown.send(true);
        }
    });

    tracing::info!("press Ctrl+C to shut down");
    server.run().await;
    tracing::info!("node stopped");
    Ok(())
}
