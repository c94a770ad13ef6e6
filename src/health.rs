// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Health classification of a membership snapshot.
//!
//! The snapshot is read from the host runtime; this module only classifies
//! it by the share of unreachable members.

use std::fmt;

/// Ordered severity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthStatus {
    /// Every member is reachable
    Nominal,
    /// Some members are unreachable, below the critical ratio
    Degraded,
    /// The unreachable ratio reached the critical threshold, or there are no members
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Nominal => "nominal",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        })
    }
}

/// Membership counts read from the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipSnapshot {
    /// Known members
    pub total: usize,
    /// Members currently unreachable
    pub unreachable: usize,
}

impl MembershipSnapshot {
    /// Snapshot of `total` members, `unreachable` of which are down.
    pub fn new(total: usize, unreachable: usize) -> Self {
        Self { total, unreachable }
    }

    /// Share of unreachable members in `[0, 1]`. `None` without members.
    pub fn unreachable_ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.unreachable.min(self.total) as f64 / self.total as f64)
    }
}

/// Classification thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Unreachable ratio at or above which the status is critical
    pub critical_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_ratio: 0.5,
        }
    }
}

/// Classifies `snapshot`.
pub fn classify(snapshot: MembershipSnapshot, thresholds: HealthThresholds) -> HealthStatus {
    match snapshot.unreachable_ratio() {
        None => HealthStatus::Critical,
        Some(ratio) if ratio <= 0.0 => HealthStatus::Nominal,
        Some(ratio) if ratio < thresholds.critical_ratio => HealthStatus::Degraded,
        Some(_) => HealthStatus::Critical,
    }
}
