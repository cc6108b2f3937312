use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
};

lazy_static! {
    // Account metrics
    pub static ref USERS_REGISTERED: IntCounter = IntCounter::new(
        "users_registered_total",
        "Total users registered"
    ).expect("metric can be created");

    // Submission metrics
    pub static ref SUBMISSIONS_CREATED: IntCounter = IntCounter::new(
        "submissions_created_total",
        "Total task submissions received"
    ).expect("metric can be created");

    pub static ref SUBMISSIONS_APPROVED: IntCounter = IntCounter::new(
        "submissions_approved_total",
        "Total submissions approved and settled"
    ).expect("metric can be created");

    pub static ref SUBMISSIONS_REJECTED: IntCounter = IntCounter::new(
        "submissions_rejected_total",
        "Total submissions rejected"
    ).expect("metric can be created");

    // Settlement metrics
    pub static ref REWARDS_CREDITED: Counter = Counter::new(
        "rewards_credited_total",
        "Total reward amount credited to user balances"
    ).expect("metric can be created");

    pub static ref ADMIN_ADJUSTMENTS: IntCounter = IntCounter::new(
        "admin_adjustments_total",
        "Total manual balance adjustments"
    ).expect("metric can be created");

    pub static ref SETTLEMENT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("settlement_duration_seconds", "Approval settlement duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    registry.register(Box::new(USERS_REGISTERED.clone()))?;
    registry.register(Box::new(SUBMISSIONS_CREATED.clone()))?;
    registry.register(Box::new(SUBMISSIONS_APPROVED.clone()))?;
    registry.register(Box::new(SUBMISSIONS_REJECTED.clone()))?;
    registry.register(Box::new(REWARDS_CREDITED.clone()))?;
    registry.register(Box::new(ADMIN_ADJUSTMENTS.clone()))?;
    registry.register(Box::new(SETTLEMENT_DURATION.clone()))?;

    Ok(())
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let registry = Registry::new();
        let result = register_metrics(&registry);
        assert!(result.is_ok());
    }

    #[test]
    fn test_metrics_handler() {
        // The handler gathers the default registry, so register there.
        let _ = register_metrics(prometheus::default_registry());
        SUBMISSIONS_APPROVED.inc();
        let result = metrics_handler();
        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.contains("submissions_approved_total"));
    }
}
