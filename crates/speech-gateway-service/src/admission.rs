//! Admission control: allow-list, then daily quota, then per-route quota.
//!
//! Evaluation short-circuits on the first failure. The allow-list check runs
//! first and never touches counters. The coarse daily scope is checked
//! before the per-route scope so an exhausted caller does not burn a
//! route slot.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::allow_list::AllowList;
use crate::quota::QuotaStore;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Routes subject to admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    TextToSpeech,
    SpeechToText,
}

impl Route {
    pub const ALL: [Route; 2] = [Route::TextToSpeech, Route::SpeechToText];

    pub fn path(self) -> &'static str {
        match self {
            Self::TextToSpeech => "/text-to-speech",
            Self::SpeechToText => "/speech-to-text",
        }
    }

    /// Metrics label.
    pub fn label(self) -> &'static str {
        match self {
            Self::TextToSpeech => "text_to_speech",
            Self::SpeechToText => "speech_to_text",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.path() == path)
    }
}

/// A named quota rule. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitScope {
    name: String,
    window: Duration,
    max_count: u64,
}

impl LimitScope {
    pub fn new(name: impl Into<String>, window: Duration, max_count: u64) -> Self {
        Self {
            name: name.into(),
            window,
            max_count,
        }
    }

    /// Per-route, per-minute scope.
    pub fn per_minute(route: Route, max_count: u64) -> Self {
        Self::new(format!("route:{}", route.path()), MINUTE, max_count)
    }

    /// Global per-day scope shared across all routes.
    pub fn daily(max_count: u64) -> Self {
        Self::new("daily", DAY, max_count)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_count(&self) -> u64 {
        self.max_count
    }

    /// A scope with `max_count = 0` is treated as switched off.
    pub fn is_enabled(&self) -> bool {
        self.max_count > 0
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BlockedByAllowList,
    DailyQuotaExceeded,
    RouteQuotaExceeded,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::BlockedByAllowList => "blocked-by-allowlist",
            Self::DailyQuotaExceeded => "daily-quota-exceeded",
            Self::RouteQuotaExceeded => "route-quota-exceeded",
        }
    }

    pub fn is_quota(self) -> bool {
        !matches!(self, Self::BlockedByAllowList)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Caller presented an allow-listed key; counters were not consulted.
    Bypassed,
    /// Admitted by every enabled scope.
    Admitted {
        /// Smallest number of admissions left across the checked scopes.
        remaining: Option<u64>,
    },
    Rejected {
        reason: RejectReason,
        /// Time until the rejecting scope's window resets (quota only).
        retry_after: Option<Duration>,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Owned admission gate, built once at startup and shared by handle.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

struct Inner {
    store: QuotaStore,
    allow_list: AllowList,
    daily: LimitScope,
    routes: HashMap<Route, LimitScope>,
}

impl AdmissionController {
    pub fn new(
        store: QuotaStore,
        allow_list: AllowList,
        daily: LimitScope,
        routes: impl IntoIterator<Item = (Route, LimitScope)>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                allow_list,
                daily,
                routes: routes.into_iter().collect(),
            }),
        }
    }

    /// Standard configuration: one per-minute scope per route plus the
    /// shared daily scope.
    pub fn with_limits(allow_list: AllowList, per_route_minute: u64, per_day: u64) -> Self {
        Self::new(
            QuotaStore::new(),
            allow_list,
            LimitScope::daily(per_day),
            Route::ALL.map(|r| (r, LimitScope::per_minute(r, per_route_minute))),
        )
    }

    pub fn admit(&self, route: Route, identity: &str, access_key: Option<&str>) -> Decision {
        self.admit_at(route, identity, access_key, Instant::now())
    }

    /// `admit` with an explicit clock reading.
    pub fn admit_at(
        &self,
        route: Route,
        identity: &str,
        access_key: Option<&str>,
        now: Instant,
    ) -> Decision {
        let inner = &self.inner;

        if !inner.allow_list.is_empty() {
            return match access_key {
                Some(key) if inner.allow_list.contains(key) => Decision::Bypassed,
                _ => Decision::Rejected {
                    reason: RejectReason::BlockedByAllowList,
                    retry_after: None,
                },
            };
        }

        let mut remaining: Option<u64> = None;
        let scopes = [
            (Some(&inner.daily), RejectReason::DailyQuotaExceeded),
            (inner.routes.get(&route), RejectReason::RouteQuotaExceeded),
        ];

        for (scope, reason) in scopes {
            let Some(scope) = scope.filter(|s| s.is_enabled()) else {
                continue;
            };
            let check = inner.store.increment_and_check(
                scope.name(),
                identity,
                scope.window(),
                scope.max_count(),
                now,
            );
            if !check.admitted {
                return Decision::Rejected {
                    reason,
                    retry_after: Some(check.reset_at.saturating_duration_since(now)),
                };
            }
            remaining = Some(remaining.map_or(check.remaining, |r| r.min(check.remaining)));
        }

        Decision::Admitted { remaining }
    }

    /// Removes stale quota entries. Returns the count removed.
    pub fn sweep(&self, now: Instant) -> usize {
        self.inner.store.sweep(now)
    }

    pub fn tracked_entries(&self) -> usize {
        self.inner.store.len()
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.inner.allow_list
    }
}
