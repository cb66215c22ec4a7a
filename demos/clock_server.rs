//! Clock event stream example
//!
//! Run with: cargo run --example clock_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example clock_server                    # binds to 0.0.0.0:8080
//!   cargo run --example clock_server localhost          # binds to 127.0.0.1:8080
//!   cargo run --example clock_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Subscribing
//!
//! With curl:
//!   curl -N http://localhost:8080/clock
//!
//! The protected stream needs credentials:
//!   curl -N -u admin:secret http://localhost:8080/admin
//!
//! From a browser:
//!   new EventSource("http://localhost:8080/clock").addEventListener("tick", e => console.log(e.data))
//!
//! Reconnecting clients send `Last-Event-ID`; the greeting reports it back.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sse_hub::{EventServer, EventSourceConfig, ServerConfig};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "127.0.0.1" -> 127.0.0.1:8080
/// - "127.0.0.1:9000" -> 127.0.0.1:9000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: clock_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8080)");
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();
    if let Some(addr_str) = args.get(1) {
        match parse_bind_addr(addr_str) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sse_hub=debug".parse()?)
                .add_directive("clock_server=debug".parse()?),
        )
        .init();

    println!("Starting event stream server on {}", config.bind_addr);
    println!();
    println!("curl -N http://localhost:{}/clock", config.bind_addr.port());
    println!("curl -N -u admin:secret http://localhost:{}/admin", config.bind_addr.port());
    println!();

    let mut server = EventServer::new(config);

    let clock = server.add_source(
        EventSourceConfig::new("/clock").default_header("Access-Control-Allow-Origin", "*"),
        |client| {
            let greeting = format!("welcome back, last id was {}", client.last_id());
            client.send(&greeting, Some("hello"), 0, 3000);
        },
    );

    let admin = server.add_source(
        EventSourceConfig::new("/admin")
            .authentication("admin", "secret")
            .realm("clock admin"),
        |client| client.send("subscribed to stats", Some("hello"), 0, 0),
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut id: u32 = 0;

        loop {
            ticker.tick().await;

            // Skip encoding when nobody is listening
            match clock.count().await {
                Ok(0) => continue,
                Ok(_) => {}
                Err(_) => break,
            }

            id = id.wrapping_add(1);
            if clock
                .send(&unix_time().to_string(), Some("tick"), id, 0)
                .is_err()
            {
                break;
            }

            if id % 10 == 0 {
                if let Ok(stats) = clock.stats().await {
                    let report = format!(
                        "clients={} avg_waiting={} admitted={} events={}",
                        stats.connected,
                        stats.avg_packets_waiting,
                        stats.sessions_admitted,
                        stats.events_sent
                    );
                    tracing::debug!("{}", report);
                    let _ = admin.send(&report, Some("stats"), id, 0);
                }
            }
        }
    });

    // Run until Ctrl+C, then close every stream gracefully
    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    if let Err(e) = result {
        eprintln!("Server error: {}", e);
    }

    println!("\nShutting down...");
    Ok(())
}
