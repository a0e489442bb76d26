//! # Solver Options
//!
//! Numeric and algorithmic parameters of the interior-point engine. Options are a plain
//! `serde` struct so a full set can be loaded from configuration files; missing entries take the
//! values of the default [`SolverMode`]. The binding layer uses the string-keyed
//! [`SolverOptions::set_option`] / [`SolverOptions::get_option`] pair instead.
//!
//! The engine validates and copies the options once at construction.

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::E;
use crate::error::OcpQpError;

/// Presets trading robustness for speed.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    #[display("speed_abs")]
    SpeedAbs,
    #[display("speed")]
    Speed,
    #[default]
    #[display("balance")]
    Balance,
    #[display("robust")]
    Robust,
}

impl FromStr for SolverMode {
    type Err = OcpQpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speed_abs" => Ok(SolverMode::SpeedAbs),
            "speed" => Ok(SolverMode::Speed),
            "balance" => Ok(SolverMode::Balance),
            "robust" => Ok(SolverMode::Robust),
            _ => Err(OcpQpError::InvalidOption {
                name: "mode".to_string(),
                reason: format!("unknown mode `{s}`"),
            }),
        }
    }
}

/// Which parts of the Solution Container seed the first iterate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmStart {
    #[default]
    Cold,
    /// `u`, `x`, `sl`, `su`.
    Primal,
    /// Primal variables plus `pi`, and `lam`, `t` wherever strictly positive.
    PrimalDual,
}

impl WarmStart {
    fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(WarmStart::Cold),
            1 => Some(WarmStart::Primal),
            2 => Some(WarmStart::PrimalDual),
            _ => None,
        }
    }

    fn level(&self) -> i64 {
        match self {
            WarmStart::Cold => 0,
            WarmStart::Primal => 1,
            WarmStart::PrimalDual => 2,
        }
    }
}

/// Value accepted by the string-keyed option interface.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Real(E),
    Int(i64),
    Flag(bool),
    Mode(SolverMode),
}

impl From<E> for OptionValue {
    fn from(value: E) -> Self {
        OptionValue::Real(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Flag(value)
    }
}

impl From<SolverMode> for OptionValue {
    fn from(value: SolverMode) -> Self {
        OptionValue::Mode(value)
    }
}

impl OptionValue {
    fn as_real(&self, name: &str) -> Result<E, OcpQpError> {
        match self {
            OptionValue::Real(v) => Ok(*v),
            OptionValue::Int(v) => Ok(*v as E),
            _ => Err(type_error(name, "a number")),
        }
    }

    fn as_int(&self, name: &str) -> Result<i64, OcpQpError> {
        match self {
            OptionValue::Int(v) => Ok(*v),
            OptionValue::Real(v) if v.fract() == 0. => Ok(*v as i64),
            _ => Err(type_error(name, "an integer")),
        }
    }

    fn as_flag(&self, name: &str) -> Result<bool, OcpQpError> {
        match self {
            OptionValue::Flag(v) => Ok(*v),
            OptionValue::Int(v) => Ok(*v != 0),
            _ => Err(type_error(name, "a flag")),
        }
    }
}

fn type_error(name: &str, expected: &str) -> OcpQpError {
    OcpQpError::InvalidOption {
        name: name.to_string(),
        reason: format!("expected {expected}"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Preset the remaining values were derived from.
    pub mode: SolverMode,
    /// Maximum number of interior-point iterations.
    pub iter_max: usize,
    /// Smallest accepted step length before giving up.
    pub alpha_min: E,
    /// Initial value of the duality measure.
    pub mu0: E,
    pub tol_stat: E,
    pub tol_eq: E,
    pub tol_ineq: E,
    pub tol_comp: E,
    /// Regularization added to the primal diagonal of every stage.
    pub reg_prim: E,
    /// Largest regularization tried before a factorization counts as failed.
    pub reg_max: E,
    pub warm_start: WarmStart,
    /// Mehrotra predictor-corrector; otherwise a fixed centering parameter is used.
    pub pred_corr: bool,
    /// Separate primal and dual step lengths.
    pub split_step: bool,
    /// Fraction-to-the-boundary factor.
    pub step_safety: E,
    /// Centering parameter without predictor-corrector.
    pub sigma_fixed: E,
    /// Lower bound of the initial inequality slacks.
    pub init_slack: E,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self::from_mode(SolverMode::default())
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mode(mode: SolverMode) -> Self {
        let mut options = Self {
            mode,
            iter_max: 15,
            alpha_min: 1e-12,
            mu0: 1e1,
            tol_stat: 1e-6,
            tol_eq: 1e-8,
            tol_ineq: 1e-8,
            tol_comp: 1e-8,
            reg_prim: 1e-15,
            reg_max: 1e-4,
            warm_start: WarmStart::Cold,
            pred_corr: true,
            split_step: false,
            step_safety: 0.995,
            sigma_fixed: 0.1,
            init_slack: 1e-1,
        };
        match mode {
            SolverMode::SpeedAbs => {
                options.tol_stat = 1e-8;
            }
            SolverMode::Speed => {}
            SolverMode::Balance => {
                options.iter_max = 30;
                options.reg_prim = 1e-12;
                options.split_step = true;
            }
            SolverMode::Robust => {
                options.iter_max = 100;
                options.mu0 = 1e2;
                options.reg_prim = 1e-12;
                options.split_step = true;
                options.step_safety = 0.99;
            }
        }
        options
    }

    /// Resets every option to the preset `mode`.
    pub fn set_default(&mut self, mode: SolverMode) {
        *self = Self::from_mode(mode);
    }

    /// Sets one option by name. Setting `mode` applies the whole preset.
    pub fn set_option(
        &mut self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), OcpQpError> {
        let value = value.into();
        match name {
            "mode" => {
                let mode = match value {
                    OptionValue::Mode(mode) => mode,
                    OptionValue::Int(level) => match level {
                        0 => SolverMode::SpeedAbs,
                        1 => SolverMode::Speed,
                        2 => SolverMode::Balance,
                        3 => SolverMode::Robust,
                        _ => return Err(type_error(name, "a mode in 0..=3")),
                    },
                    _ => return Err(type_error(name, "a solver mode")),
                };
                self.set_default(mode);
            }
            "iter_max" => {
                let v = value.as_int(name)?;
                self.iter_max =
                    usize::try_from(v).map_err(|_| type_error(name, "a non-negative integer"))?;
            }
            "alpha_min" => self.alpha_min = value.as_real(name)?,
            "mu0" => self.mu0 = value.as_real(name)?,
            "tol_stat" => self.tol_stat = value.as_real(name)?,
            "tol_eq" => self.tol_eq = value.as_real(name)?,
            "tol_ineq" => self.tol_ineq = value.as_real(name)?,
            "tol_comp" => self.tol_comp = value.as_real(name)?,
            "reg_prim" => self.reg_prim = value.as_real(name)?,
            "reg_max" => self.reg_max = value.as_real(name)?,
            "warm_start" => {
                self.warm_start = WarmStart::from_level(value.as_int(name)?)
                    .ok_or_else(|| type_error(name, "0, 1 or 2"))?;
            }
            "pred_corr" => self.pred_corr = value.as_flag(name)?,
            "split_step" => self.split_step = value.as_flag(name)?,
            "step_safety" => self.step_safety = value.as_real(name)?,
            "sigma_fixed" => self.sigma_fixed = value.as_real(name)?,
            "init_slack" => self.init_slack = value.as_real(name)?,
            _ => {
                return Err(OcpQpError::UnknownOption {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get_option(&self, name: &str) -> Result<OptionValue, OcpQpError> {
        Ok(match name {
            "mode" => OptionValue::Mode(self.mode),
            "iter_max" => OptionValue::Int(self.iter_max as i64),
            "alpha_min" => OptionValue::Real(self.alpha_min),
            "mu0" => OptionValue::Real(self.mu0),
            "tol_stat" => OptionValue::Real(self.tol_stat),
            "tol_eq" => OptionValue::Real(self.tol_eq),
            "tol_ineq" => OptionValue::Real(self.tol_ineq),
            "tol_comp" => OptionValue::Real(self.tol_comp),
            "reg_prim" => OptionValue::Real(self.reg_prim),
            "reg_max" => OptionValue::Real(self.reg_max),
            "warm_start" => OptionValue::Int(self.warm_start.level()),
            "pred_corr" => OptionValue::Flag(self.pred_corr),
            "split_step" => OptionValue::Flag(self.split_step),
            "step_safety" => OptionValue::Real(self.step_safety),
            "sigma_fixed" => OptionValue::Real(self.sigma_fixed),
            "init_slack" => OptionValue::Real(self.init_slack),
            _ => {
                return Err(OcpQpError::UnknownOption {
                    name: name.to_string(),
                });
            }
        })
    }

    /// Sets all four tolerances at once.
    pub fn with_tolerance(mut self, tol: E) -> Self {
        self.tol_stat = tol;
        self.tol_eq = tol;
        self.tol_ineq = tol;
        self.tol_comp = tol;
        self
    }

    pub fn with_iter_max(mut self, iter_max: usize) -> Self {
        self.iter_max = iter_max;
        self
    }

    pub fn validate(&self) -> Result<(), OcpQpError> {
        let invalid = |name: &str, reason: &str| {
            Err(OcpQpError::InvalidOption {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };
        for (name, tol) in [
            ("tol_stat", self.tol_stat),
            ("tol_eq", self.tol_eq),
            ("tol_ineq", self.tol_ineq),
            ("tol_comp", self.tol_comp),
        ] {
            if !(tol > 0.) {
                return invalid(name, "must be positive");
            }
        }
        if !(self.mu0 > 0.) {
            return invalid("mu0", "must be positive");
        }
        if !(self.alpha_min > 0. && self.alpha_min < 1.) {
            return invalid("alpha_min", "must lie in (0, 1)");
        }
        if !(self.step_safety > 0. && self.step_safety < 1.) {
            return invalid("step_safety", "must lie in (0, 1)");
        }
        if !(self.sigma_fixed >= 0. && self.sigma_fixed <= 1.) {
            return invalid("sigma_fixed", "must lie in [0, 1]");
        }
        if !(self.init_slack > 0.) {
            return invalid("init_slack", "must be positive");
        }
        if !(self.reg_prim >= 0.) {
            return invalid("reg_prim", "must be non-negative");
        }
        if !(self.reg_max >= self.reg_prim) {
            return invalid("reg_max", "must be at least reg_prim");
        }
        Ok(())
    }
}
