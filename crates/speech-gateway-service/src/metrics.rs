//! Lightweight Prometheus-compatible metrics using atomic counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::admission::{Decision, RejectReason, Route};

/// Per-route operation statistics.
struct RouteMetrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    /// Accumulated handling time stored as microseconds.
    duration_us_sum: AtomicU64,
}

impl RouteMetrics {
    const fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            duration_us_sum: AtomicU64::new(0),
        }
    }
}

/// Snapshot of values owned by other components, supplied at render time.
pub struct Gauges {
    pub live_temp_resources: usize,
    pub quota_entries: usize,
    pub uptime_seconds: u64,
}

/// Application-wide metrics collected via atomic counters.
pub struct Metrics {
    admitted: AtomicU64,
    bypassed: AtomicU64,
    blocked_by_allow_list: AtomicU64,
    daily_quota_exceeded: AtomicU64,
    route_quota_exceeded: AtomicU64,
    text_to_speech: RouteMetrics,
    speech_to_text: RouteMetrics,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            admitted: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            blocked_by_allow_list: AtomicU64::new(0),
            daily_quota_exceeded: AtomicU64::new(0),
            route_quota_exceeded: AtomicU64::new(0),
            text_to_speech: RouteMetrics::new(),
            speech_to_text: RouteMetrics::new(),
        }
    }

    fn route(&self, route: Route) -> &RouteMetrics {
        match route {
            Route::TextToSpeech => &self.text_to_speech,
            Route::SpeechToText => &self.speech_to_text,
        }
    }

    fn decision_counter(&self, decision: &Decision) -> &AtomicU64 {
        match decision {
            Decision::Admitted { .. } => &self.admitted,
            Decision::Bypassed => &self.bypassed,
            Decision::Rejected { reason, .. } => match reason {
                RejectReason::BlockedByAllowList => &self.blocked_by_allow_list,
                RejectReason::DailyQuotaExceeded => &self.daily_quota_exceeded,
                RejectReason::RouteQuotaExceeded => &self.route_quota_exceeded,
            },
        }
    }

    /// Record an admission decision.
    pub fn record_decision(&self, decision: &Decision) {
        self.decision_counter(decision)
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handled request on an admitted route.
    pub fn record_operation(&self, route: Route, ok: bool, elapsed: Duration) {
        let m = self.route(route);
        m.requests_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            m.errors_total.fetch_add(1, Ordering::Relaxed);
        }
        m.duration_us_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn admissions(&self, decision: &Decision) -> u64 {
        self.decision_counter(decision).load(Ordering::Relaxed)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self, gauges: &Gauges) -> String {
        let mut out = String::with_capacity(2048);

        gauge(
            &mut out,
            "speech_gateway_temp_resources_live",
            "Temp files currently held by in-flight requests",
            gauges.live_temp_resources,
        );
        gauge(
            &mut out,
            "speech_gateway_quota_entries",
            "Tracked (scope, identity) quota counters",
            gauges.quota_entries,
        );
        gauge(
            &mut out,
            "speech_gateway_uptime_seconds",
            "Server uptime in seconds",
            gauges.uptime_seconds,
        );

        writeln!(
            out,
            "# HELP speech_gateway_admissions_total Admission decisions by outcome."
        )
        .unwrap();
        writeln!(out, "# TYPE speech_gateway_admissions_total counter").unwrap();
        let outcomes = [
            ("admitted", &self.admitted),
            ("bypassed", &self.bypassed),
            (RejectReason::BlockedByAllowList.code(), &self.blocked_by_allow_list),
            (RejectReason::DailyQuotaExceeded.code(), &self.daily_quota_exceeded),
            (RejectReason::RouteQuotaExceeded.code(), &self.route_quota_exceeded),
        ];
        for (label, counter) in outcomes {
            let value = counter.load(Ordering::Relaxed);
            writeln!(
                out,
                "speech_gateway_admissions_total{{outcome=\"{label}\"}} {value}"
            )
            .unwrap();
        }

        writeln!(
            out,
            "# HELP speech_gateway_requests_total Requests handled per route."
        )
        .unwrap();
        writeln!(out, "# TYPE speech_gateway_requests_total counter").unwrap();
        for route in Route::ALL {
            let total = self.route(route).requests_total.load(Ordering::Relaxed);
            let label = route.label();
            writeln!(out, "speech_gateway_requests_total{{route=\"{label}\"}} {total}").unwrap();
        }

        writeln!(
            out,
            "# HELP speech_gateway_request_errors_total Failed requests per route."
        )
        .unwrap();
        writeln!(out, "# TYPE speech_gateway_request_errors_total counter").unwrap();
        for route in Route::ALL {
            let errors = self.route(route).errors_total.load(Ordering::Relaxed);
            let label = route.label();
            writeln!(
                out,
                "speech_gateway_request_errors_total{{route=\"{label}\"}} {errors}"
            )
            .unwrap();
        }

        writeln!(
            out,
            "# HELP speech_gateway_request_duration_seconds_sum Total handling time in seconds."
        )
        .unwrap();
        writeln!(
            out,
            "# TYPE speech_gateway_request_duration_seconds_sum counter"
        )
        .unwrap();
        for route in Route::ALL {
            let us = self.route(route).duration_us_sum.load(Ordering::Relaxed);
            let secs = us as f64 / 1_000_000.0;
            let label = route.label();
            writeln!(
                out,
                "speech_gateway_request_duration_seconds_sum{{route=\"{label}\"}} {secs:.6}"
            )
            .unwrap();
        }

        out
    }
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} gauge").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}
