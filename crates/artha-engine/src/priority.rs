//! Regime × strategy priority matrix.
//!
//! A fixed-size table, not a free-form map: rows are regimes, columns are
//! roster strategies, cells are 0–10. Priority 0 disables the strategy in
//! that regime. `Recovery` is pinned at 0 everywhere.

use crate::config::ConfigError;
use artha_models::{RegimeKind, StrategyId};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const MAX_PRIORITY: u8 = 10;

/// `matrix[regime.index()][strategy.index()]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityMatrix {
    table: [[u8; StrategyId::COUNT]; RegimeKind::COUNT],
}

impl Default for PriorityMatrix {
    /// Roster defaults: trend strategies lead in trends, mean-reversion leads
    /// in ranges, everything is throttled when the tape is choppy.
    fn default() -> Self {
        use RegimeKind::*;
        use StrategyId::*;
        let mut table = [[0u8; StrategyId::COUNT]; RegimeKind::COUNT];
        let mut set = |r: RegimeKind, s: StrategyId, p: u8| {
            table[r.index()][s.index()] = p;
        };

        set(TrendingUp, OrbBreakout, 8);
        set(TrendingUp, MomentumRider, 9);
        set(TrendingUp, VwapReversion, 2);
        set(TrendingUp, RangeFade, 0);
        set(TrendingUp, GapTrader, 5);

        set(TrendingDown, OrbBreakout, 8);
        set(TrendingDown, MomentumRider, 9);
        set(TrendingDown, VwapReversion, 2);
        set(TrendingDown, RangeFade, 0);
        set(TrendingDown, GapTrader, 5);

        set(Ranging, OrbBreakout, 3);
        set(Ranging, MomentumRider, 2);
        set(Ranging, VwapReversion, 9);
        set(Ranging, RangeFade, 8);
        set(Ranging, GapTrader, 4);

        set(Choppy, OrbBreakout, 0);
        set(Choppy, MomentumRider, 0);
        set(Choppy, VwapReversion, 4);
        set(Choppy, RangeFade, 3);
        set(Choppy, GapTrader, 0);

        set(VolatileRanging, OrbBreakout, 2);
        set(VolatileRanging, MomentumRider, 3);
        set(VolatileRanging, VwapReversion, 6);
        set(VolatileRanging, RangeFade, 5);
        set(VolatileRanging, GapTrader, 2);

        // Recovery stays 0 in every regime.
        Self { table }
    }
}

impl PriorityMatrix {
    /// Priority of `strategy` under `regime`, 0–10.
    pub fn priority(&self, regime: RegimeKind, strategy: StrategyId) -> u8 {
        self.table[regime.index()][strategy.index()]
    }

    /// Build from the defaults plus named-key overrides loaded from config
    /// (`regime -> strategy -> priority`). Unknown names and out-of-range
    /// priorities are startup errors, as is any attempt to give `recovery` a
    /// nonzero priority.
    pub fn from_overrides(
        overrides: &BTreeMap<String, BTreeMap<String, u8>>,
    ) -> Result<Self, ConfigError> {
        let mut matrix = Self::default();
        for (regime_name, row) in overrides {
            let regime = RegimeKind::from_str(regime_name)
                .map_err(|_| ConfigError::UnknownKey(format!("priority.{regime_name}")))?;
            for (strategy_name, &prio) in row {
                let strategy = StrategyId::from_str(strategy_name).map_err(|_| {
                    ConfigError::UnknownKey(format!("priority.{regime_name}.{strategy_name}"))
                })?;
                if prio > MAX_PRIORITY {
                    return Err(ConfigError::InvalidValue {
                        field: format!("priority.{regime_name}.{strategy_name}"),
                        detail: format!("priority {prio} exceeds {MAX_PRIORITY}"),
                    });
                }
                if strategy == StrategyId::Recovery && prio != 0 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("priority.{regime_name}.{strategy_name}"),
                        detail: "recovery strategy cannot be given entry priority".to_string(),
                    });
                }
                matrix.table[regime.index()][strategy.index()] = prio;
            }
        }
        Ok(matrix)
    }
}
