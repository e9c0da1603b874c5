use std::error::Error;
use std::path::Path;
use std::time::{Duration, Instant};

use colored::*;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleetroute::config::CoreConfig;
use fleetroute::ingest;
use fleetroute::pipeline::{self, RunOutput};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .with_span_events(fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE)
                .compact(),
        )
        .init();

    dotenv().ok();

    let mut config = CoreConfig::load(Path::new("config.json"))?;
    if let Some(csv_path) = std::env::args().nth(1) {
        config.input.csv_path = csv_path;
    }

    let customers = ingest::load_customers_csv(&config.input, config.locations.depot_location)?;
    info!(
        customers = customers.len(),
        total_volume = customers.iter().map(|c| c.volume).sum::<f64>(),
        "Starting CVRP optimization"
    );

    let started = Instant::now();
    let output = pipeline::run(&config, customers).await?;
    print_summary(&output, started.elapsed());

    if output.solution.routes.is_empty() && !output.allocation.solver_set.is_empty() {
        return Err("no routes produced".into());
    }
    Ok(())
}

fn print_summary(output: &RunOutput, elapsed: Duration) {
    let solution = &output.solution;
    let allocation = &output.allocation;

    println!("{}", "=".repeat(50));
    println!("CVRP OPTIMIZATION SUMMARY ({:.2}s)", elapsed.as_secs_f64());
    println!("{}", "=".repeat(50));

    println!(
        "Allocation: {} for vehicles ({:.1} vol), {} for warehouse ({:.1} vol), utilization {:.1}%",
        allocation.solver_set.len(),
        allocation.total_solver_volume,
        allocation.warehouse_set.len(),
        allocation.warehouse_volume,
        allocation.capacity_utilization * 100.0
    );

    let headline = format!(
        "Vehicles used: {}, distance: {:.2} km, time: {:.1} min, served volume: {:.2}, objective: {}",
        solution.total_vehicles_used,
        solution.total_distance_km,
        solution.total_time_minutes,
        solution.total_served_volume,
        solution.objective
    );
    if solution.is_feasible {
        println!("{}", headline.green());
    } else {
        println!("{}", headline.red());
    }

    for route in &solution.routes {
        let line = format!(
            "  {} #{}: {} stops, {:.2} vol, {:.2} km, {:.1} min",
            route.vehicle_type.label(),
            route.vehicle_id,
            route.customers.len(),
            route.total_volume,
            route.total_distance_km,
            route.total_time_minutes
        );
        if route.is_feasible {
            println!("{}", line);
        } else {
            println!("{}", format!("{line} [limits violated]").red());
        }
    }

    if !solution.dropped_customers.is_empty() {
        println!(
            "{}",
            format!("Dropped customers: {}", solution.dropped_customers.len()).red()
        );
        for customer in solution.dropped_customers.iter().take(10) {
            println!("  - {} (volume {:.1})", customer.name, customer.volume);
        }
        if solution.dropped_customers.len() > 10 {
            println!("  ... and {} more", solution.dropped_customers.len() - 10);
        }
    }
}
