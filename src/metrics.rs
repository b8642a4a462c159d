#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Metrics collected over one simulated user's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub agent_id: String,
    pub room_id: String,
    pub startup_successful: bool,
    pub time_to_active_ms: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub messages_sent: u64,
    pub message_failures: u64,
    pub errors: Vec<String>,
    pub session_duration_ms: u64,
    pub request_latencies: LatencyReport,
}

/// Request latency report keyed by operation label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyReport {
    pub operations: HashMap<String, LatencyStats>,
}

/// Latency statistics for a single operation label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Real-time metrics collector (thread-safe), one per agent.
pub struct MetricsCollector {
    agent_id: String,
    room_id: Mutex<String>,
    start_time: Instant,
    startup_successful: AtomicBool,
    time_to_active_ms: AtomicU64,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    messages_sent: AtomicU64,
    message_failures: AtomicU64,
    errors: Mutex<Vec<String>>,
    latencies: Mutex<HashMap<String, Vec<u64>>>,
}

impl MetricsCollector {
    pub fn new(agent_id: String) -> Self {
        Self {
            agent_id,
            room_id: Mutex::new(String::new()),
            start_time: Instant::now(),
            startup_successful: AtomicBool::new(false),
            time_to_active_ms: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            message_failures: AtomicU64::new(0),
            errors: Mutex::new(Vec::new()),
            latencies: Mutex::new(HashMap::new()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn set_room_id(&self, room_id: &str) {
        if let Ok(mut r) = self.room_id.lock() {
            *r = room_id.to_string();
        }
    }

    /// Mark the agent's startup sequence as completed.
    pub fn mark_active(&self) {
        self.startup_successful.store(true, Ordering::SeqCst);
        let elapsed = self.start_time.elapsed().as_millis() as u64;
        self.time_to_active_ms.store(elapsed, Ordering::SeqCst);
    }

    /// Record one request's round-trip latency under its operation label.
    pub fn record_request(&self, label: &str, ms: u64, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.entry(label.to_string()).or_default().push(ms);
        }
    }

    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_failure(&self) {
        self.message_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, error: String) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error);
        }
    }

    /// Generate the final metrics report (sync, no await points).
    pub fn generate_report(&self) -> AgentMetrics {
        let session_duration = self.start_time.elapsed().as_millis() as u64;
        let errors = self.errors.lock().map(|e| e.clone()).unwrap_or_default();
        let room_id = self.room_id.lock().map(|r| r.clone()).unwrap_or_default();

        AgentMetrics {
            agent_id: self.agent_id.clone(),
            room_id,
            startup_successful: self.startup_successful.load(Ordering::SeqCst),
            time_to_active_ms: self.time_to_active_ms.load(Ordering::SeqCst),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            message_failures: self.message_failures.load(Ordering::Relaxed),
            errors,
            session_duration_ms: session_duration,
            request_latencies: self.compute_latency_report(),
        }
    }

    fn compute_latency_report(&self) -> LatencyReport {
        let latencies = self
            .latencies
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default();

        let mut operations = HashMap::new();
        for (op, mut samples) in latencies {
            if samples.is_empty() {
                continue;
            }
            samples.sort_unstable();
            operations.insert(op, LatencyStats::from_sorted(&samples));
        }

        LatencyReport { operations }
    }
}

impl LatencyStats {
    fn from_sorted(samples: &[u64]) -> Self {
        let count = samples.len();
        Self {
            count,
            min_ms: samples[0],
            max_ms: samples[count - 1],
            avg_ms: samples.iter().sum::<u64>() / count as u64,
            p50_ms: percentile(samples, 0.50),
            p95_ms: percentile(samples, 0.95),
            p99_ms: percentile(samples, 0.99),
        }
    }
}

/// Aggregates metrics from every agent in the run.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub total_agents: usize,
    pub active_agents: usize,
    pub failed_agents: usize,
    pub average_time_to_active_ms: u64,
    pub p50_time_to_active_ms: u64,
    pub p95_time_to_active_ms: u64,
    pub p99_time_to_active_ms: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_messages_sent: u64,
    pub total_message_failures: u64,
    pub total_errors: usize,
    pub request_latencies: LatencyReport,
}

impl TestSummary {
    pub fn from_metrics(metrics: &[AgentMetrics]) -> Self {
        if metrics.is_empty() {
            return Self::default();
        }

        let total_agents = metrics.len();
        let active_agents = metrics.iter().filter(|m| m.startup_successful).count();
        let failed_agents = total_agents - active_agents;

        let mut startup_times: Vec<u64> = metrics
            .iter()
            .filter(|m| m.startup_successful)
            .map(|m| m.time_to_active_ms)
            .collect();
        startup_times.sort_unstable();

        let average_time_to_active_ms = if startup_times.is_empty() {
            0
        } else {
            startup_times.iter().sum::<u64>() / startup_times.len() as u64
        };

        Self {
            total_agents,
            active_agents,
            failed_agents,
            average_time_to_active_ms,
            p50_time_to_active_ms: percentile(&startup_times, 0.50),
            p95_time_to_active_ms: percentile(&startup_times, 0.95),
            p99_time_to_active_ms: percentile(&startup_times, 0.99),
            total_requests: metrics.iter().map(|m| m.total_requests).sum(),
            failed_requests: metrics.iter().map(|m| m.failed_requests).sum(),
            total_messages_sent: metrics.iter().map(|m| m.messages_sent).sum(),
            total_message_failures: metrics.iter().map(|m| m.message_failures).sum(),
            total_errors: metrics.iter().map(|m| m.errors.len()).sum(),
            request_latencies: Self::aggregate_latencies(metrics),
        }
    }

    fn aggregate_latencies(metrics: &[AgentMetrics]) -> LatencyReport {
        let mut all_samples: HashMap<String, Vec<u64>> = HashMap::new();
        for m in metrics {
            for (op, stats) in &m.request_latencies.operations {
                // Only stats per agent survive, not raw samples. Use p50
                // as a representative sample per agent; good enough for
                // aggregated percentiles across many agents.
                all_samples.entry(op.clone()).or_default().push(stats.p50_ms);
            }
        }

        let mut operations = HashMap::new();
        for (op, mut samples) in all_samples {
            if samples.is_empty() {
                continue;
            }
            samples.sort_unstable();
            operations.insert(op, LatencyStats::from_sorted(&samples));
        }

        LatencyReport { operations }
    }

    pub fn print_summary(&self) {
        println!("\n=== Load Test Summary ===");
        println!("Total Agents: {}", self.total_agents);
        println!("Active Agents: {}", self.active_agents);
        println!("Failed Agents: {}", self.failed_agents);
        println!("\nTime To Active:");
        println!("  Average: {} ms", self.average_time_to_active_ms);
        println!("  P50: {} ms", self.p50_time_to_active_ms);
        println!("  P95: {} ms", self.p95_time_to_active_ms);
        println!("  P99: {} ms", self.p99_time_to_active_ms);
        println!("\nRequests:");
        println!("  Total: {}", self.total_requests);
        println!("  Failed: {}", self.failed_requests);
        println!("  Messages Sent: {}", self.total_messages_sent);
        println!("  Message Failures: {}", self.total_message_failures);

        if !self.request_latencies.operations.is_empty() {
            println!("\nRequest Latencies (aggregated across agents):");
            let mut ops: Vec<_> = self.request_latencies.operations.iter().collect();
            ops.sort_by_key(|(k, _)| (*k).clone());
            for (op, stats) in &ops {
                println!(
                    "  {}: avg={}ms p50={}ms p95={}ms p99={}ms (n={})",
                    op, stats.avg_ms, stats.p50_ms, stats.p95_ms, stats.p99_ms, stats.count
                );
            }
        }

        println!("\nTotal Errors: {}", self.total_errors);
        println!("========================\n");
    }
}

fn percentile(sorted_data: &[u64], p: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }
    let idx = (p * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[idx.min(sorted_data.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&samples, 0.50), 51);
        assert_eq!(percentile(&samples, 0.95), 95);
        assert_eq!(percentile(&samples, 0.99), 99);
        assert_eq!(percentile(&[], 0.50), 0);
    }

    #[test]
    fn test_request_latencies_keyed_by_label() {
        let collector = MetricsCollector::new("agent-0".to_string());
        collector.record_request("SendMessage", 12, true);
        collector.record_request("SendMessage", 18, true);
        collector.record_request("sync", 40, true);
        collector.record_request("SendMessage", 25, false);

        let report = collector.generate_report();
        assert_eq!(report.total_requests, 4);
        assert_eq!(report.failed_requests, 1);

        let send = &report.request_latencies.operations["SendMessage"];
        assert_eq!(send.count, 3);
        assert_eq!(send.min_ms, 12);
        assert_eq!(send.max_ms, 25);
        assert_eq!(report.request_latencies.operations["sync"].count, 1);
    }

    #[test]
    fn test_summary_counts_active_and_failed() {
        let active = MetricsCollector::new("agent-0".to_string());
        active.mark_active();
        active.record_message_sent();
        let failed = MetricsCollector::new("agent-1".to_string());
        failed.record_error("startup failed".to_string());

        let reports = vec![active.generate_report(), failed.generate_report()];
        let summary = TestSummary::from_metrics(&reports);
        assert_eq!(summary.total_agents, 2);
        assert_eq!(summary.active_agents, 1);
        assert_eq!(summary.failed_agents, 1);
        assert_eq!(summary.total_messages_sent, 1);
        assert_eq!(summary.total_errors, 1);
    }

    #[test]
    fn test_empty_summary_is_zeroed() {
        let summary = TestSummary::from_metrics(&[]);
        assert_eq!(summary.total_agents, 0);
        assert_eq!(summary.total_requests, 0);
    }
}
