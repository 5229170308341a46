//! Temporal decay & scoring (spec §4.1)
//!
//! Pure functions over `(use_count, last_used, strength, now)` that assign
//! every memory a non-negative, time-varying score. Three decay models are
//! supported; exactly one is selected by [`crate::config::Config`].

use serde::{Deserialize, Serialize};

/// Seconds in a day, used throughout for half-life conversions.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Upper bound (seconds) used by the numeric `time_until_threshold` search
/// for models without a closed-form inverse. 100 years is comfortably past
/// any realistic half-life configured for this system.
const NUMERIC_SEARCH_HORIZON_SECS: f64 = 100.0 * 365.0 * SECONDS_PER_DAY;

/// Maximum bisection iterations for the numeric `time_until_threshold` search.
const NUMERIC_SEARCH_MAX_ITERS: u32 = 100;

/// Which decay model to apply. Selected per-process (spec Open Questions:
/// "Decay model selection is per-process and global; per-memory override is
/// not supported").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecayModel {
    /// `score = use_count^beta * exp(-lambda * dt) * strength` (default).
    Exponential {
        /// Exponent weighting `use_count`.
        beta: f64,
        /// Decay constant; higher decays faster.
        lambda: f64,
    },
    /// `score = use_count^beta * (1 + dt/tau)^(-alpha) * strength`.
    PowerLaw {
        /// Exponent weighting `use_count`.
        beta: f64,
        /// Time-scale constant derived from a configured half-life.
        tau: f64,
        /// Power-law decay exponent.
        alpha: f64,
    },
    /// Weighted sum of a fast- and slow-decaying exponential.
    TwoComponent {
        /// Exponent weighting `use_count`.
        beta: f64,
        /// Weight of the fast component; the slow component gets `1.0 - weight_fast`.
        weight_fast: f64,
        /// Decay constant of the fast component.
        lambda_fast: f64,
        /// Decay constant of the slow component.
        lambda_slow: f64,
    },
}

impl Default for DecayModel {
    fn default() -> Self {
        DecayModel::Exponential {
            beta: 0.6,
            lambda: calculate_decay_lambda(3.0),
        }
    }
}

/// Thresholds governing forget/promote/urgent decisions (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Below this score a memory is eligible for garbage collection.
    pub forget_threshold: f64,
    /// Score threshold for promotion eligibility (OR'd with use-count rule below).
    pub promote_threshold: f64,
    /// Use-count threshold for promotion eligibility within `promote_time_window_days`.
    pub promote_use_count: u64,
    /// Window (days) over which `promote_use_count` is evaluated.
    pub promote_time_window_days: f64,
    /// Below this score just after save, a post-save urgent-decay event is raised.
    pub urgent_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            forget_threshold: 0.05,
            promote_threshold: 0.65,
            promote_use_count: 5,
            promote_time_window_days: 7.0,
            urgent_threshold: 0.10,
        }
    }
}

/// Calculate the current score of a memory.
///
/// `use_count = 0` always yields `0.0`, regardless of model or `dt`. All math
/// happens in `f64`; the result is clamped to `>= 0`.
pub fn calculate_score(use_count: u64, last_used: i64, strength: f64, now: i64, model: DecayModel) -> f64 {
    if use_count == 0 {
        return 0.0;
    }
    let dt = (now - last_used).max(0) as f64;

    let score = match model {
        DecayModel::Exponential { beta, lambda } => {
            (use_count as f64).powf(beta) * (-lambda * dt).exp() * strength
        }
        DecayModel::PowerLaw { beta, tau, alpha } => {
            (use_count as f64).powf(beta) * (1.0 + dt / tau).powf(-alpha) * strength
        }
        DecayModel::TwoComponent {
            beta,
            weight_fast,
            lambda_fast,
            lambda_slow,
        } => {
            let fast = weight_fast * (-lambda_fast * dt).exp();
            let slow = (1.0 - weight_fast) * (-lambda_slow * dt).exp();
            (use_count as f64).powf(beta) * (fast + slow) * strength
        }
    };

    score.max(0.0)
}

/// Temporal factor in `[0, 1]`, used by the activation service (spec §4.6):
/// decay scores typically range `0..~2`, so divide by two and cap at `1.0`.
pub fn normalize_temporal_factor(score: f64) -> f64 {
    (score / 2.0).min(1.0).max(0.0)
}

/// Convert a half-life (days) to an exponential decay constant `lambda`.
pub fn calculate_decay_lambda(halflife_days: f64) -> f64 {
    let halflife_seconds = halflife_days * SECONDS_PER_DAY;
    std::f64::consts::LN_2 / halflife_seconds
}

/// Convert an exponential decay constant `lambda` back to a half-life (days).
/// Mutual inverse of [`calculate_decay_lambda`].
pub fn calculate_halflife(lambda: f64) -> f64 {
    let halflife_seconds = std::f64::consts::LN_2 / lambda;
    halflife_seconds / SECONDS_PER_DAY
}

/// Derive the power-law time-scale `tau` from a half-life (days) and `alpha`,
/// such that `(1 + halflife/tau)^(-alpha) == 0.5`.
pub fn calculate_power_law_tau(halflife_days: f64, alpha: f64) -> f64 {
    let halflife_seconds = halflife_days * SECONDS_PER_DAY;
    halflife_seconds / (2f64.powf(1.0 / alpha) - 1.0)
}

/// Project what a memory's score will be at `target_time`.
pub fn project_score_at_time(
    use_count: u64,
    last_used: i64,
    strength: f64,
    target_time: i64,
    model: DecayModel,
) -> f64 {
    calculate_score(use_count, last_used, strength, target_time, model)
}

/// Seconds from `now` until the memory's score falls below `threshold`, or
/// `None` if it is already at or below threshold.
///
/// Closed-form for the exponential model; a bounded bisection search
/// otherwise (spec §4.1: "numeric otherwise").
pub fn time_until_threshold(
    use_count: u64,
    last_used: i64,
    strength: f64,
    threshold: f64,
    now: i64,
    model: DecayModel,
) -> Option<f64> {
    let current = calculate_score(use_count, last_used, strength, now, model);
    if current <= threshold {
        return None;
    }

    match model {
        DecayModel::Exponential { beta, lambda } => {
            let base = (use_count as f64).powf(beta) * strength;
            if base <= 0.0 || threshold <= 0.0 {
                return None;
            }
            let total_dt = -(threshold / base).ln() / lambda;
            let elapsed = (now - last_used) as f64;
            Some((total_dt - elapsed).max(0.0))
        }
        _ => {
            let mut lo = now;
            let mut hi = now + NUMERIC_SEARCH_HORIZON_SECS as i64;

            if calculate_score(use_count, last_used, strength, hi, model) > threshold {
                // Never crosses within the search horizon.
                return None;
            }

            for _ in 0..NUMERIC_SEARCH_MAX_ITERS {
                let mid = lo + (hi - lo) / 2;
                if mid == lo || mid == hi {
                    break;
                }
                let mid_score = calculate_score(use_count, last_used, strength, mid, model);
                if mid_score > threshold {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }

            Some((hi - now) as f64)
        }
    }
}
