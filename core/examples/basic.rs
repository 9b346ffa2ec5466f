//! Basic breaker multiplexer usage example
//!
//! Run with `RUST_LOG=breaker_mux=debug` to see breaker lifecycle events.

use breaker_mux::BreakerMux;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Breaker Multiplexer Basic Example ===\n");

    // One breaker per key; the key doubles as the closure argument
    let mux = BreakerMux::builder(|input: &str| {
        let yes = input == "yes";
        move || {
            if yes {
                Ok("yes".to_string())
            } else {
                Err("Noo".to_string())
            }
        }
    })
    .timeout(Duration::from_secs(2))
    .on_state_change(|name, from, to| println!("⚡ Breaker '{}': {} -> {}", name, from, to))
    .expire_after(Duration::from_secs(10))
    .expire_check(Duration::from_secs(1))
    .build();

    println!("--- Healthy key ---");
    for _ in 0..3 {
        match mux.get("yes") {
            Ok(value) => println!("✓ {}", value),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {:?}\n", mux.state("yes"));

    println!("--- Failing key ---");
    for i in 1..=8 {
        match mux.get("no") {
            Ok(value) => println!("✓ {}", value),
            Err(e) if e.is_rejection() => println!("⛔ call {}: {}", i, e),
            Err(e) => println!("✗ call {}: {}", i, e),
        }
    }
    println!("State: {:?}\n", mux.state("no"));

    println!("--- Shared breaker for distinct arguments ---");
    for arg in ["yes", "no", "yes"] {
        match mux.get_with_arg("breakerA", arg) {
            Ok(value) => println!("✓ {} via breakerA", value),
            Err(e) => println!("✗ {} via breakerA: {}", arg, e),
        }
    }
    println!();

    println!("--- Waiting for the open timeout ---");
    thread::sleep(Duration::from_millis(2100));
    println!("State: {:?}", mux.state("no"));
    match mux.get("no") {
        Ok(value) => println!("✓ {}", value),
        Err(e) => println!("✗ probe failed: {}", e),
    }
    println!("State: {:?}\n", mux.state("no"));

    println!("Live breakers: {}", mux.len());
    mux.delete("breakerA");
    println!("After delete: {}", mux.len());
    mux.close();
    println!("After close: {}", mux.len());
}
