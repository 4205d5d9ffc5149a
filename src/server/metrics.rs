use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::service::DispatchOutcome;

/// Dispatch counters shared by every worker.
///
/// All counters use relaxed atomics; readers get a consistent-enough view
/// for monitoring, not a snapshot.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    request_count: AtomicUsize,
    handled: AtomicUsize,
    not_found: AtomicUsize,
    failed: AtomicUsize,
    total_latency_ns: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished dispatch.
    pub fn record(&self, outcome: DispatchOutcome, latency: Duration) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            DispatchOutcome::Handled => &self.handled,
            DispatchOutcome::NotFound => &self.not_found,
            DispatchOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn not_found(&self) -> usize {
        self.not_found.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Mean dispatch time; zero before the first request.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Prometheus text exposition of the counters.
    pub fn render_prometheus(&self) -> String {
        format!(
            "# HELP routescope_requests_total Total number of dispatched requests\n\
             # TYPE routescope_requests_total counter\n\
             routescope_requests_total {}\n\
             # HELP routescope_requests_outcome_total Dispatched requests by outcome\n\
             # TYPE routescope_requests_outcome_total counter\n\
             routescope_requests_outcome_total{{outcome=\"handled\"}} {}\n\
             routescope_requests_outcome_total{{outcome=\"not_found\"}} {}\n\
             routescope_requests_outcome_total{{outcome=\"failed\"}} {}\n\
             # HELP routescope_request_latency_seconds Average dispatch latency in seconds\n\
             # TYPE routescope_request_latency_seconds gauge\n\
             routescope_request_latency_seconds {}\n",
            self.request_count(),
            self.handled(),
            self.not_found(),
            self.failed(),
            self.average_latency().as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_latency() {
        let m = DispatchMetrics::new();
        assert_eq!(m.average_latency(), Duration::ZERO);
        m.record(DispatchOutcome::Handled, Duration::from_millis(2));
        m.record(DispatchOutcome::NotFound, Duration::from_millis(4));
        assert_eq!(m.request_count(), 2);
        assert_eq!(m.handled(), 1);
        assert_eq!(m.not_found(), 1);
        assert_eq!(m.average_latency(), Duration::from_millis(3));
    }

    #[test]
    fn test_prometheus_text() {
        let m = DispatchMetrics::new();
        m.record(DispatchOutcome::Failed, Duration::from_millis(1));
        let text = m.render_prometheus();
        assert!(text.contains("routescope_requests_total 1\n"));
        assert!(text.contains("routescope_requests_outcome_total{outcome=\"failed\"} 1\n"));
    }
}
