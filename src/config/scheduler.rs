//! Scheduler, driver and pool configuration structures.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::pool::DEFAULT_POOL_MAX;
use crate::core::task::DEFAULT_WEIGHT_PER_FRAME;
use crate::core::AppResult;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Free-list capacity; recycled items beyond it are disposed.
    pub max: usize,
    /// Warm-up target for the free list.
    pub min: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_POOL_MAX,
            min: 0,
        }
    }
}

impl PoolConfig {
    /// Validate pool sizing.
    pub fn validate(&self) -> Result<(), String> {
        if self.max == 0 {
            return Err("max must be greater than 0".into());
        }
        if self.min > self.max {
            return Err(format!("min ({}) must not exceed max ({})", self.min, self.max));
        }
        Ok(())
    }
}

/// Host loop settings used by the tick driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Ticks per second.
    pub tick_hz: u32,
    /// Upper bound for a single frame's delta, in milliseconds.
    pub max_dt_ms: u64,
    /// Multiplier applied to produce the scaled delta.
    pub time_scale: f32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            max_dt_ms: 250,
            time_scale: 1.0,
        }
    }
}

impl DriverConfig {
    /// Validate driver settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_hz == 0 {
            return Err("tick_hz must be greater than 0".into());
        }
        if self.max_dt_ms == 0 {
            return Err("max_dt_ms must be greater than 0".into());
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err("time_scale must be finite and non-negative".into());
        }
        Ok(())
    }

    /// Interval between ticks.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    /// Clamp for a single frame's delta.
    #[must_use]
    pub const fn max_dt(&self) -> Duration {
        Duration::from_millis(self.max_dt_ms)
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Task weight consumed per tick.
    pub weight_per_frame: u32,
    /// Contain panics raised by callbacks instead of unwinding out of the tick.
    pub isolate_panics: bool,
    /// Host loop settings.
    pub driver: DriverConfig,
    /// Map of pool key to sizing.
    pub pools: HashMap<String, PoolConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            weight_per_frame: DEFAULT_WEIGHT_PER_FRAME,
            isolate_panics: true,
            driver: DriverConfig::default(),
            pools: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Validate the budget, the driver and every pool.
    pub fn validate(&self) -> Result<(), String> {
        if self.weight_per_frame == 0 {
            return Err("weight_per_frame must be greater than 0".into());
        }
        self.driver
            .validate()
            .map_err(|e| format!("driver invalid: {e}"))?;
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&raw).map_err(|e| anyhow::anyhow!("config {}: {e}", path.display()))
    }
}
