//! Engine configuration.
//!
//! Every threshold the rule logic consults lives here with a runnable
//! default; nothing is hardcoded at the call sites. `validate()` runs once at
//! startup and violations are fatal — the engine refuses to trade on a
//! malformed config.

use crate::priority::PriorityMatrix;
use chrono::{Duration, NaiveTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("closure phase boundaries must be strictly ordered: {0}")]
    PhaseOrder(String),

    #[error("invalid value for {field}: {detail}")]
    InvalidValue { field: String, detail: String },

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
}

// =============================================================================
// Sections
// =============================================================================

/// Closure-phase boundaries and per-phase overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// T0: start of GRADUAL (no new entries, earlier profit booking).
    pub gradual_start: NaiveTime,
    /// T1: start of URGENT (force-close losers, book harder).
    pub urgent_start: NaiveTime,
    /// T2: start of IMMEDIATE (flatten everything).
    pub immediate_start: NaiveTime,
    /// Multiplier applied to tier trigger percentages during GRADUAL (< 1.0
    /// books earlier).
    pub gradual_tier_multiplier: f64,
    /// Loss percentage beyond which URGENT force-closes a position.
    pub urgent_loss_pct: f64,
    /// Multiplier applied to tier booked fractions during URGENT (capped at
    /// a full exit).
    pub urgent_fraction_multiplier: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gradual_start: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            urgent_start: NaiveTime::from_hms_opt(15, 10, 0).unwrap(),
            immediate_start: NaiveTime::from_hms_opt(15, 20, 0).unwrap(),
            gradual_tier_multiplier: 0.6,
            urgent_loss_pct: 0.5,
            urgent_fraction_multiplier: 1.5,
        }
    }
}

/// One profit-booking tier: when unrealized profit reaches `trigger_pct`,
/// book `book_fraction` of the current quantity, once.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ProfitTier {
    pub trigger_pct: f64,
    pub book_fraction: f64,
}

/// Hard loss limits. Checked first, in every phase.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Absolute loss ceiling in rupees.
    pub max_loss_abs: f64,
    /// Loss ceiling as a percentage of entry.
    pub max_loss_pct: f64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            max_loss_abs: 5_000.0,
            max_loss_pct: 2.0,
        }
    }
}

/// Initial protective levels for freshly confirmed entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub default_stop_pct: f64,
    pub default_target_pct: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            default_stop_pct: 1.0,
            default_target_pct: 2.0,
        }
    }
}

/// Stop-tightening rules (rule 4). All candidates pass the monotonic filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TightenConfig {
    /// Profit percentage at which the stop locks to breakeven-plus-buffer.
    pub breakeven_trigger_pct: f64,
    /// Buffer past entry for the breakeven lock, as a percentage of entry.
    pub breakeven_buffer_pct: f64,
    /// Realized-volatility percentage considered elevated.
    pub vol_elevated_pct: f64,
    /// Stop distance from current price under elevated volatility.
    pub vol_stop_distance_pct: f64,
    /// Position age after which age-based tightening begins.
    pub age_tighten_start_secs: u64,
    /// Additional tightening step interval past the start.
    pub age_tighten_interval_secs: u64,
    /// Stop distance shrink per interval, percentage points.
    pub age_tighten_step_pct: f64,
    /// Floor on the stop distance from current price.
    pub min_stop_distance_pct: f64,
}

impl Default for TightenConfig {
    fn default() -> Self {
        Self {
            breakeven_trigger_pct: 5.0,
            breakeven_buffer_pct: 0.25,
            vol_elevated_pct: 2.5,
            vol_stop_distance_pct: 0.75,
            age_tighten_start_secs: 1_800,
            age_tighten_interval_secs: 600,
            age_tighten_step_pct: 0.2,
            min_stop_distance_pct: 0.3,
        }
    }
}

/// Scale-in rules (rule 5).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// A position older than this is never scaled.
    pub max_age_secs: u64,
    /// Unrealized profit percentage that counts as momentum.
    pub momentum_trigger_pct: f64,
    /// Volume ratio (current / average) required to confirm.
    pub volume_ratio_min: f64,
    /// Add-on ceiling as a fraction of the original size.
    pub max_addon_fraction: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 900,
            momentum_trigger_pct: 1.0,
            volume_ratio_min: 1.5,
            max_addon_fraction: 0.5,
        }
    }
}

/// Rate governor ceiling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Regulatory cap on new-entry dispatches per second.
    pub ceiling_per_sec: f64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self { ceiling_per_sec: 7.0 }
    }
}

/// Dispatcher retry/queue policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bounded FIFO for rate-denied entries; oldest dropped on overflow.
    pub queue_capacity: usize,
    /// Attempts per dispatch for transient broker failures.
    pub max_attempts: u32,
    /// Base backoff between attempts; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Per-call broker timeout, enforced by the broker client.
    pub broker_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            max_attempts: 3,
            backoff_base_ms: 250,
            broker_timeout_secs: 5,
        }
    }
}

/// Conservative levels applied to positions recovered from the broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub orphan_stop_pct: f64,
    pub orphan_target_pct: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            orphan_stop_pct: 5.0,
            orphan_target_pct: 10.0,
        }
    }
}

// =============================================================================
// Root config
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ownership self-healing timeout, seconds.
    pub ownership_timeout_secs: u64,
    /// Signal staleness TTL, seconds.
    pub signal_ttl_secs: u64,
    /// Driver cycle cadence, milliseconds.
    pub cycle_interval_ms: u64,
    /// Offset applied to UTC to obtain exchange session time (IST = +330).
    pub utc_offset_minutes: i32,
    /// Profit-booking tiers, ascending by trigger.
    pub tiers: Vec<ProfitTier>,
    pub session: SessionConfig,
    pub emergency: EmergencyConfig,
    pub entry: EntryConfig,
    pub tighten: TightenConfig,
    pub scale: ScaleConfig,
    pub governor: GovernorConfig,
    pub dispatch: DispatchConfig,
    pub reconcile: ReconcileConfig,
    /// Named-key overrides merged over the default priority matrix.
    pub priority: BTreeMap<String, BTreeMap<String, u8>>,
    /// JSONL decision log path. Absent disables the audit stream.
    pub audit_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ownership_timeout_secs: 300,
            signal_ttl_secs: 120,
            cycle_interval_ms: 1_000,
            utc_offset_minutes: 330,
            tiers: vec![
                ProfitTier {
                    trigger_pct: 15.0,
                    book_fraction: 0.5,
                },
                ProfitTier {
                    trigger_pct: 25.0,
                    book_fraction: 0.5,
                },
            ],
            session: SessionConfig::default(),
            emergency: EmergencyConfig::default(),
            entry: EntryConfig::default(),
            tighten: TightenConfig::default(),
            scale: ScaleConfig::default(),
            governor: GovernorConfig::default(),
            dispatch: DispatchConfig::default(),
            reconcile: ReconcileConfig::default(),
            priority: BTreeMap::new(),
            audit_log: None,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: EngineConfig = toml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Startup validation. Any violation refuses to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.gradual_start >= s.urgent_start || s.urgent_start >= s.immediate_start {
            return Err(ConfigError::PhaseOrder(format!(
                "gradual {} < urgent {} < immediate {} required",
                s.gradual_start, s.urgent_start, s.immediate_start
            )));
        }

        let positive = [
            ("signal_ttl_secs", self.signal_ttl_secs as f64),
            ("ownership_timeout_secs", self.ownership_timeout_secs as f64),
            ("cycle_interval_ms", self.cycle_interval_ms as f64),
            ("governor.ceiling_per_sec", self.governor.ceiling_per_sec),
            ("entry.default_stop_pct", self.entry.default_stop_pct),
            ("entry.default_target_pct", self.entry.default_target_pct),
            ("emergency.max_loss_abs", self.emergency.max_loss_abs),
            ("emergency.max_loss_pct", self.emergency.max_loss_pct),
            ("session.urgent_loss_pct", s.urgent_loss_pct),
            ("reconcile.orphan_stop_pct", self.reconcile.orphan_stop_pct),
            (
                "reconcile.orphan_target_pct",
                self.reconcile.orphan_target_pct,
            ),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    detail: format!("must be positive, got {value}"),
                });
            }
        }

        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.queue_capacity".to_string(),
                detail: "must be at least 1".to_string(),
            });
        }
        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.max_attempts".to_string(),
                detail: "must be at least 1".to_string(),
            });
        }

        if !(0.0 < s.gradual_tier_multiplier && s.gradual_tier_multiplier <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "session.gradual_tier_multiplier".to_string(),
                detail: format!("must be in (0, 1], got {}", s.gradual_tier_multiplier),
            });
        }
        if s.urgent_fraction_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "session.urgent_fraction_multiplier".to_string(),
                detail: format!("must be >= 1, got {}", s.urgent_fraction_multiplier),
            });
        }

        let mut last_trigger = 0.0;
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.trigger_pct <= last_trigger {
                return Err(ConfigError::InvalidValue {
                    field: format!("tiers[{i}].trigger_pct"),
                    detail: "tiers must ascend strictly by trigger".to_string(),
                });
            }
            if !(0.0 < tier.book_fraction && tier.book_fraction <= 1.0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("tiers[{i}].book_fraction"),
                    detail: format!("must be in (0, 1], got {}", tier.book_fraction),
                });
            }
            last_trigger = tier.trigger_pct;
        }

        if !(0.0 < self.scale.max_addon_fraction && self.scale.max_addon_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "scale.max_addon_fraction".to_string(),
                detail: format!("must be in (0, 1], got {}", self.scale.max_addon_fraction),
            });
        }

        // Surfaces unknown strategy/regime names and recovery misuse early.
        self.priority_matrix()?;
        Ok(())
    }

    /// Materialize the priority matrix (defaults + overrides).
    pub fn priority_matrix(&self) -> Result<PriorityMatrix, ConfigError> {
        PriorityMatrix::from_overrides(&self.priority)
    }

    pub fn signal_ttl(&self) -> Duration {
        Duration::seconds(self.signal_ttl_secs as i64)
    }

    pub fn ownership_timeout(&self) -> Duration {
        Duration::seconds(self.ownership_timeout_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_phase_order_violation_is_fatal() {
        let mut cfg = EngineConfig::default();
        cfg.session.urgent_start = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::PhaseOrder(_))));
    }

    #[test]
    fn test_unsorted_tiers_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.tiers = vec![
            ProfitTier {
                trigger_pct: 25.0,
                book_fraction: 0.5,
            },
            ProfitTier {
                trigger_pct: 15.0,
                book_fraction: 0.5,
            },
        ];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let raw = r#"
            signal_ttl_secs = 90
            ownership_timeout_secs = 240

            [[tiers]]
            trigger_pct = 10.0
            book_fraction = 0.4

            [[tiers]]
            trigger_pct = 20.0
            book_fraction = 0.6

            [session]
            gradual_start = "14:45:00"
            urgent_start = "15:05:00"
            immediate_start = "15:15:00"

            [priority.choppy]
            orb_breakout = 2
        "#;
        let cfg: EngineConfig = toml::from_str(raw).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.signal_ttl_secs, 90);
        assert_eq!(cfg.tiers.len(), 2);
        assert_eq!(
            cfg.session.gradual_start,
            NaiveTime::from_hms_opt(14, 45, 0).unwrap()
        );
        let matrix = cfg.priority_matrix().unwrap();
        assert_eq!(
            matrix.priority(
                artha_models::RegimeKind::Choppy,
                artha_models::StrategyId::OrbBreakout
            ),
            2
        );
    }
}
