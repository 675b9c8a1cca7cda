use rqe::engine::{Aggregator, StrategyKind};
use rqe::logging;
use rqe::shared::config::CONFIG;
use rqe::wire::{ConnectionFactory, TcpConnectionFactory, Transport};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    logging::init(&CONFIG.logging)?;
    info!("rqe is starting...");

    let factory = TcpConnectionFactory::new(CONFIG.server.clone());
    let request = CONFIG.aggregation.to_request()?;
    // an optional first argument overrides the configured strategy
    let strategy = match std::env::args().nth(1) {
        Some(name) => name
            .parse::<StrategyKind>()?
            .with_concurrency(CONFIG.aggregation.concurrency),
        None => CONFIG.aggregation.strategy(),
    };

    let mut conn = factory.connect()?;
    let percent = CONFIG.readiness.waiter().wait(&mut conn, request.index())?;
    conn.close()?;
    info!(percent, index = request.index(), %strategy, "Index ready, aggregating");

    let outcome = Aggregator::new(factory).aggregate(&request, strategy)?;
    if !outcome.is_complete() {
        warn!(failed = outcome.failures.len(), "Some fields failed");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);

    Ok(())
}
