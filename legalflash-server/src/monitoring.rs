//! Process-wide metrics collection.
//!
//! Tracks per-request latency and throughput in bounded ring buffers,
//! probes the inference backend's health surface, and samples host
//! CPU/GPU telemetry on demand. Counter updates are lock-free; history
//! appends take a short mutex so concurrent writers never lose samples.

use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default capacity of the latency/timestamp histories.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Reachability of the inference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendState {
    /// The health surface answered with a success status.
    Healthy,
    /// The health surface answered with a non-success status.
    Unhealthy,
    /// The backend could not be reached at all.
    Unreachable,
}

/// Result of one inference-backend health probe.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceHealth {
    /// Probe classification.
    pub status: BackendState,
    /// The probed base URL.
    pub url: String,
    /// Round-trip time, present when the probe got an answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    /// HTTP status code, present for unhealthy answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Connection diagnostic, present when unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Latency distribution over the current history window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Mean latency in seconds.
    pub avg: f64,
    /// Minimum latency in seconds.
    pub min: f64,
    /// Maximum latency in seconds.
    pub max: f64,
    /// 50th percentile.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Number of samples in the window.
    pub count: usize,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            avg: 0.0,
            min: 0.0,
            max: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            count: 0,
        }
    }
}

#[derive(Debug)]
struct History {
    latencies: VecDeque<f64>,
    timestamps: VecDeque<Instant>,
}

/// Process-wide request metrics and host telemetry.
#[derive(Debug)]
pub struct MetricsCollector {
    inference_url: String,
    capacity: usize,
    started_at: Instant,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    history: Mutex<History>,
    system: Mutex<sysinfo::System>,
    http: reqwest::Client,
    health_timeout: Duration,
    #[cfg(feature = "nvml")]
    nvml: Option<nvml_wrapper::Nvml>,
}

impl MetricsCollector {
    /// Create a collector probing the given inference backend, with the
    /// default history capacity.
    #[must_use]
    pub fn new<S: Into<String>>(inference_url: S) -> Self {
        Self::with_capacity(inference_url, DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a collector with an explicit history capacity.
    #[must_use]
    pub fn with_capacity<S: Into<String>>(inference_url: S, capacity: usize) -> Self {
        #[cfg(feature = "nvml")]
        let nvml = match nvml_wrapper::Nvml::init() {
            Ok(nvml) => Some(nvml),
            Err(e) => {
                tracing::warn!("GPU monitoring unavailable: {e}");
                None
            }
        };

        Self {
            inference_url: inference_url.into(),
            capacity,
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            history: Mutex::new(History {
                latencies: VecDeque::with_capacity(capacity),
                timestamps: VecDeque::with_capacity(capacity),
            }),
            system: Mutex::new(sysinfo::System::new()),
            http: reqwest::Client::new(),
            health_timeout: Duration::from_secs(5),
            #[cfg(feature = "nvml")]
            nvml,
        }
    }

    /// Record one completed request.
    ///
    /// Appends to both bounded histories (evicting the oldest sample at
    /// capacity) and bumps the request/error counters. O(1), never blocks
    /// beyond the history mutex.
    pub fn record_request(&self, latency_secs: f64, success: bool) {
        {
            let mut history = self.history.lock().expect("metrics history poisoned");
            if history.latencies.len() == self.capacity {
                history.latencies.pop_front();
            }
            history.latencies.push_back(latency_secs);
            if history.timestamps.len() == self.capacity {
                history.timestamps.pop_front();
            }
            history.timestamps.push_back(Instant::now());
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total requests recorded since startup.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Total failed requests recorded since startup.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    /// Success rate as a percentage; 100.0 before the first request.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            100.0
        } else {
            (1.0 - self.total_errors() as f64 / total as f64) * 100.0
        }
    }

    /// Seconds since the collector was created.
    #[must_use]
    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Latency distribution over the current history.
    ///
    /// Sorts a copy of the window per call; acceptable because the window
    /// is bounded by the configured capacity.
    #[must_use]
    pub fn latency_stats(&self) -> LatencyStats {
        let history = self.history.lock().expect("metrics history poisoned");
        if history.latencies.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<f64> = history.latencies.iter().copied().collect();
        drop(history);
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = sorted.len();
        let percentile = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        LatencyStats {
            avg: sorted.iter().sum::<f64>() / n as f64,
            min: sorted[0],
            max: sorted[n - 1],
            p50: percentile(0.5),
            p95: percentile(0.95),
            p99: percentile(0.99),
            count: n,
        }
    }

    /// Requests per second over the trailing window.
    #[must_use]
    pub fn throughput(&self, window_seconds: u64) -> f64 {
        if window_seconds == 0 {
            return 0.0;
        }
        let cutoff = Duration::from_secs(window_seconds);
        let history = self.history.lock().expect("metrics history poisoned");
        let recent = history
            .timestamps
            .iter()
            .filter(|ts| ts.elapsed() <= cutoff)
            .count();
        recent as f64 / window_seconds as f64
    }

    /// Probe the inference backend's health surface.
    pub async fn check_inference_health(&self) -> InferenceHealth {
        let url = format!("{}/health", self.inference_url.trim_end_matches('/'));
        let probe_start = Instant::now();
        match self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => InferenceHealth {
                status: BackendState::Healthy,
                url: self.inference_url.clone(),
                response_time_ms: Some(probe_start.elapsed().as_secs_f64() * 1000.0),
                status_code: None,
                error: None,
            },
            Ok(response) => InferenceHealth {
                status: BackendState::Unhealthy,
                url: self.inference_url.clone(),
                response_time_ms: Some(probe_start.elapsed().as_secs_f64() * 1000.0),
                status_code: Some(response.status().as_u16()),
                error: None,
            },
            Err(e) => InferenceHealth {
                status: BackendState::Unreachable,
                url: self.inference_url.clone(),
                response_time_ms: None,
                status_code: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Snapshot of per-GPU telemetry; empty when sampling is unavailable.
    #[cfg(feature = "nvml")]
    #[must_use]
    pub fn gpu_metrics(&self) -> Vec<serde_json::Value> {
        use nvml_wrapper::enum_wrappers::device::TemperatureSensor;

        let Some(nvml) = &self.nvml else {
            return Vec::new();
        };
        let count = match nvml.device_count() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("GPU enumeration failed: {e}");
                return Vec::new();
            }
        };

        const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
        (0..count)
            .filter_map(|index| {
                let device = nvml.device_by_index(index).ok()?;
                let memory = device.memory_info().ok()?;
                let total_gb = memory.total as f64 / GIB;
                let used_gb = memory.used as f64 / GIB;
                Some(json!({
                    "index": index,
                    "name": device.name().unwrap_or_else(|_| "unknown".to_string()),
                    "memory": {
                        "total_gb": round2(total_gb),
                        "used_gb": round2(used_gb),
                        "free_gb": round2(memory.free as f64 / GIB),
                        "utilization_percent": round2(if total_gb > 0.0 {
                            used_gb / total_gb * 100.0
                        } else {
                            0.0
                        }),
                    },
                    "utilization_percent": device
                        .utilization_rates()
                        .map(|u| u.gpu)
                        .unwrap_or(0),
                    "temperature_celsius": device.temperature(TemperatureSensor::Gpu).ok(),
                    "power_watts": device
                        .power_usage()
                        .ok()
                        .map(|mw| round2(f64::from(mw) / 1000.0)),
                }))
            })
            .collect()
    }

    /// Snapshot of per-GPU telemetry; empty when sampling is unavailable.
    #[cfg(not(feature = "nvml"))]
    #[must_use]
    pub fn gpu_metrics(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }

    /// Snapshot of CPU and memory usage.
    ///
    /// CPU utilization needs two refreshes separated by the sampler's
    /// minimum interval to be meaningful.
    pub async fn cpu_metrics(&self) -> serde_json::Value {
        {
            let mut system = self.system.lock().expect("system sampler poisoned");
            system.refresh_cpu_usage();
        }
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

        let mut system = self.system.lock().expect("system sampler poisoned");
        system.refresh_cpu_usage();
        system.refresh_memory();

        const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
        let total = system.total_memory() as f64 / GIB;
        let used = system.used_memory() as f64 / GIB;
        json!({
            "utilization_percent": round2(f64::from(system.global_cpu_usage())),
            "count": system.cpus().len(),
            "memory": {
                "total_gb": round2(total),
                "used_gb": round2(used),
                "available_gb": round2(system.available_memory() as f64 / GIB),
                "utilization_percent": round2(if total > 0.0 { used / total * 100.0 } else { 0.0 }),
            }
        })
    }

    /// The full metrics snapshot served by `GET /metrics`.
    pub async fn snapshot(&self) -> serde_json::Value {
        json!({
            "timestamp": chrono::Local::now().to_rfc3339(),
            "uptime_seconds": round2(self.uptime_secs()),
            "requests": {
                "total": self.total_requests(),
                "errors": self.total_errors(),
                "success_rate": round2(self.success_rate()),
            },
            "latency": self.latency_stats(),
            "throughput": {
                "requests_per_second_1min": round2(self.throughput(60)),
                "requests_per_second_5min": round2(self.throughput(300)),
                "requests_per_second_15min": round2(self.throughput(900)),
            },
            "gpu": self.gpu_metrics(),
            "cpu": self.cpu_metrics().await,
            "inference_health": self.check_inference_health().await,
        })
    }

    /// The snapshot flattened into Prometheus exposition lines.
    pub async fn prometheus(&self) -> String {
        let latency = self.latency_stats();
        let mut lines = vec![
            format!("legalflash_rag_requests_total {}", self.total_requests()),
            format!("legalflash_rag_requests_errors_total {}", self.total_errors()),
            format!(
                "legalflash_rag_requests_success_rate {}",
                round2(self.success_rate())
            ),
            format!("legalflash_rag_latency_avg_seconds {}", latency.avg),
            format!("legalflash_rag_latency_p95_seconds {}", latency.p95),
            format!("legalflash_rag_latency_p99_seconds {}", latency.p99),
            format!(
                "legalflash_rag_throughput_rps_1min {}",
                round2(self.throughput(60))
            ),
        ];

        for gpu in self.gpu_metrics() {
            let index = gpu["index"].clone();
            lines.push(format!(
                "legalflash_rag_gpu_memory_used_gb{{gpu=\"{index}\"}} {}",
                gpu["memory"]["used_gb"]
            ));
            lines.push(format!(
                "legalflash_rag_gpu_utilization_percent{{gpu=\"{index}\"}} {}",
                gpu["utilization_percent"]
            ));
        }

        lines.join("\n")
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_every_request() {
        let metrics = MetricsCollector::new("http://localhost:8000");
        for i in 0..10 {
            metrics.record_request(0.1, i % 3 != 0);
        }
        // i = 0, 3, 6, 9 failed
        assert_eq!(metrics.total_requests(), 10);
        assert_eq!(metrics.total_errors(), 4);
        assert_eq!(metrics.success_rate(), 60.0);
    }

    #[test]
    fn test_success_rate_before_first_request() {
        let metrics = MetricsCollector::new("http://localhost:8000");
        assert_eq!(metrics.success_rate(), 100.0);
        assert_eq!(metrics.latency_stats(), LatencyStats::default());
    }

    #[test]
    fn test_history_never_exceeds_capacity() {
        let metrics = MetricsCollector::with_capacity("http://localhost:8000", 5);
        for i in 0..20 {
            metrics.record_request(f64::from(i), true);
        }
        let stats = metrics.latency_stats();
        assert_eq!(stats.count, 5);
        // Oldest samples evicted first: only 15..=19 remain.
        assert_eq!(stats.min, 15.0);
        assert_eq!(stats.max, 19.0);
        // Counters keep the full totals.
        assert_eq!(metrics.total_requests(), 20);
    }

    #[test]
    fn test_latency_percentiles() {
        let metrics = MetricsCollector::new("http://localhost:8000");
        for i in 1..=100 {
            metrics.record_request(f64::from(i) / 100.0, true);
        }
        let stats = metrics.latency_stats();
        assert_eq!(stats.count, 100);
        assert!((stats.min - 0.01).abs() < 1e-9);
        assert!((stats.max - 1.0).abs() < 1e-9);
        assert!((stats.p50 - 0.51).abs() < 1e-9);
        assert!((stats.p95 - 0.96).abs() < 1e-9);
        assert!((stats.p99 - 1.0).abs() < 1e-9);
        assert!((stats.avg - 0.505).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_window() {
        let metrics = MetricsCollector::new("http://localhost:8000");
        for _ in 0..6 {
            metrics.record_request(0.05, true);
        }
        let rps = metrics.throughput(60);
        assert!((rps - 0.1).abs() < 1e-9);
        assert_eq!(metrics.throughput(0), 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_backend_classification() {
        // Nothing listens on this port.
        let metrics = MetricsCollector::new("http://127.0.0.1:1");
        let health = metrics.check_inference_health().await;
        assert_eq!(health.status, BackendState::Unreachable);
        assert!(health.error.is_some());
        assert!(health.response_time_ms.is_none());
    }

    #[tokio::test]
    async fn test_prometheus_rendering() {
        let metrics = MetricsCollector::new("http://localhost:8000");
        metrics.record_request(0.2, true);
        metrics.record_request(0.4, false);

        let text = metrics.prometheus().await;
        assert!(text.contains("legalflash_rag_requests_total 2"));
        assert!(text.contains("legalflash_rag_requests_errors_total 1"));
        assert!(text.contains("legalflash_rag_requests_success_rate 50"));
        assert!(text.contains("legalflash_rag_throughput_rps_1min"));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005), 1.0); // floating representation of 1.005
        assert_eq!(round2(2.675_1), 2.68);
        assert_eq!(round2(0.0), 0.0);
    }
}
