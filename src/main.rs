#[tokio::main]
async fn main() {
    if let Err(error) = fleet_telemetry::run().await {
        tracing::error!(%error, "fleet telemetry failed");
        eprintln!("fleet-telemetry: {error}");
        std::process::exit(1);
    }
}
