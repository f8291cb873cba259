use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::error::ErrorCode;

const LATENCY_CAP: usize = 500;

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    conversations_started: u64,
    scenarios_generated: u64,
    utterances_submitted: u64,
    feedback_delivered: u64,
    stale_results_discarded: u64,
    errors_generator: u64,
    errors_malformed: u64,
    errors_speech: u64,
    errors_other: u64,
}

/// 計測フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scenario,
    Feedback,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: Phase,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー（表示層に返す用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub conversations_started: u64,
    pub scenarios_generated: u64,
    pub utterances_submitted: u64,
    pub feedback_delivered: u64,
    pub stale_results_discarded: u64,
    pub error_counts: ErrorCounts,
    pub avg_latency_ms: AvgLatency,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorCounts {
    pub generator: u64,
    pub malformed: u64,
    pub speech: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvgLatency {
    pub scenario: Option<f64>,
    pub feedback: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn inc_conversations_started(&self) {
        self.counters.lock().conversations_started += 1;
    }

    pub fn inc_scenarios_generated(&self) {
        self.counters.lock().scenarios_generated += 1;
    }

    pub fn inc_utterances_submitted(&self) {
        self.counters.lock().utterances_submitted += 1;
    }

    pub fn inc_feedback_delivered(&self) {
        self.counters.lock().feedback_delivered += 1;
    }

    pub fn inc_stale_discarded(&self) {
        self.counters.lock().stale_results_discarded += 1;
    }

    pub fn inc_error(&self, code: ErrorCode) {
        let mut c = self.counters.lock();
        match code {
            ErrorCode::GeneratorUnavailable | ErrorCode::GeneratorFailed => c.errors_generator += 1,
            ErrorCode::MalformedGeneratorOutput => c.errors_malformed += 1,
            ErrorCode::SpeechInputFailed => c.errors_speech += 1,
            ErrorCode::ResourceLoadFailed | ErrorCode::InvalidState | ErrorCode::Internal => {
                c.errors_other += 1
            }
        }
    }

    pub fn record_latency(&self, phase: Phase, duration_ms: u64) {
        let record = LatencyRecord {
            phase,
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock();
        latencies.push(record);
        if latencies.len() > LATENCY_CAP {
            let excess = latencies.len() - LATENCY_CAP;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters.lock();
        let latencies = self.latencies.lock();

        let avg = |phase: Phase| -> Option<f64> {
            let vals: Vec<f64> = latencies
                .iter()
                .filter(|r| r.phase == phase)
                .map(|r| r.duration_ms as f64)
                .collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        };

        MetricsSummary {
            conversations_started: c.conversations_started,
            scenarios_generated: c.scenarios_generated,
            utterances_submitted: c.utterances_submitted,
            feedback_delivered: c.feedback_delivered,
            stale_results_discarded: c.stale_results_discarded,
            error_counts: ErrorCounts {
                generator: c.errors_generator,
                malformed: c.errors_malformed,
                speech: c.errors_speech,
                other: c.errors_other,
            },
            avg_latency_ms: AvgLatency {
                scenario: avg(Phase::Scenario),
                feedback: avg(Phase::Feedback),
            },
            recent_latencies: latencies.iter().rev().take(20).cloned().collect(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
