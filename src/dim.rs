//! # Dimension Descriptor
//!
//! Per-stage counts of a horizon with stages `0..=N`. A descriptor is assembled with
//! [`OcpQpDimBuilder`], validated once by [`OcpQpDimBuilder::build`] and never mutated
//! afterwards; containers and engines share it read-only through an [`Arc`].

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{OcpQpError, RangeEnd};

/// Counts of a single stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDim {
    /// States.
    pub nx: usize,
    /// Controls.
    pub nu: usize,
    /// Box constraints on states.
    pub nbx: usize,
    /// Box constraints on controls.
    pub nbu: usize,
    /// General polytopic constraints.
    pub ng: usize,
    /// Soft constraints.
    pub ns: usize,
}

impl StageDim {
    pub fn nb(&self) -> usize {
        self.nbu + self.nbx
    }

    /// Length of `[u; x]`.
    pub fn nux(&self) -> usize {
        self.nu + self.nx
    }

    /// Length of the stage primal vector `[u; x; sl; su]`.
    pub fn nv(&self) -> usize {
        self.nu + self.nx + 2 * self.ns
    }

    /// Number of one-sided inequality rows `[lb; lg; ub; ug; ls; us]`.
    pub fn nc(&self) -> usize {
        2 * self.nb() + 2 * self.ng + 2 * self.ns
    }

    /// Variables eliminated locally by the Riccati recursion, `[u; sl; su]`.
    pub fn nw(&self) -> usize {
        self.nu + 2 * self.ns
    }

    fn check(&self, stage: usize) -> Result<(), OcpQpError> {
        if self.nbx > self.nx {
            return Err(OcpQpError::InconsistentDimension {
                stage,
                reason: format!("nbx = {} exceeds nx = {}", self.nbx, self.nx),
            });
        }
        if self.nbu > self.nu {
            return Err(OcpQpError::InconsistentDimension {
                stage,
                reason: format!("nbu = {} exceeds nu = {}", self.nbu, self.nu),
            });
        }
        if self.ns > self.nb() + self.ng {
            return Err(OcpQpError::InconsistentDimension {
                stage,
                reason: format!(
                    "ns = {} exceeds the {} box and general constraints",
                    self.ns,
                    self.nb() + self.ng
                ),
            });
        }
        Ok(())
    }
}

/// Named per-stage count, as addressed by [`OcpQpDimBuilder::set`] and [`OcpQpDim::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimField {
    Nx,
    Nu,
    Nbx,
    Nbu,
    Nb,
    Ng,
    Ns,
}

impl FromStr for DimField {
    type Err = OcpQpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nx" => Ok(DimField::Nx),
            "nu" => Ok(DimField::Nu),
            "nbx" => Ok(DimField::Nbx),
            "nbu" => Ok(DimField::Nbu),
            "nb" => Ok(DimField::Nb),
            "ng" => Ok(DimField::Ng),
            "ns" => Ok(DimField::Ns),
            _ => Err(OcpQpError::UnknownField {
                container: "dimension descriptor",
                field: s.to_string(),
            }),
        }
    }
}

/// Immutable dimension descriptor for a horizon of `N + 1` stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcpQpDim {
    stages: Vec<StageDim>,
}

impl OcpQpDim {
    /// Validates explicit per-stage counts; `stages.len()` is `N + 1`.
    pub fn from_stages(stages: Vec<StageDim>) -> Result<Self, OcpQpError> {
        if stages.is_empty() {
            return Err(OcpQpError::InconsistentDimension {
                stage: 0,
                reason: "a horizon needs at least one stage".to_string(),
            });
        }
        for (i, stage) in stages.iter().enumerate() {
            stage.check(i)?;
        }
        Ok(Self { stages })
    }

    /// Horizon length `N`.
    pub fn horizon(&self) -> usize {
        self.stages.len() - 1
    }

    pub fn stage(&self, stage: isize) -> Result<&StageDim, OcpQpError> {
        let upper = self.horizon() as isize;
        if stage < 0 || stage > upper {
            return Err(OcpQpError::StageOutOfRange {
                field: "stage".to_string(),
                end: RangeEnd::Start,
                index: stage,
                upper,
            });
        }
        Ok(&self.stages[stage as usize])
    }

    pub fn get(&self, field: &str, stage: isize) -> Result<usize, OcpQpError> {
        let field = DimField::from_str(field)?;
        let dim = self.stage(stage)?;
        Ok(match field {
            DimField::Nx => dim.nx,
            DimField::Nu => dim.nu,
            DimField::Nbx => dim.nbx,
            DimField::Nbu => dim.nbu,
            DimField::Nb => dim.nb(),
            DimField::Ng => dim.ng,
            DimField::Ns => dim.ns,
        })
    }

    pub fn stages(&self) -> &[StageDim] {
        &self.stages
    }

    /// Infallible lookup for stage indices that have already been validated.
    pub(crate) fn at(&self, stage: usize) -> &StageDim {
        &self.stages[stage]
    }

    /// States of the stage reached by the transition out of `stage`; zero for the terminal stage.
    pub(crate) fn nx_next(&self, stage: usize) -> usize {
        self.stages.get(stage + 1).map_or(0, |s| s.nx)
    }

    /// Total number of one-sided inequality rows over the horizon.
    pub fn nc_total(&self) -> usize {
        self.stages.iter().map(StageDim::nc).sum()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Builder collecting signed counts the way a binding layer supplies them.
#[derive(Debug, Clone)]
pub struct OcpQpDimBuilder {
    counts: Vec<[isize; 6]>,
}

impl OcpQpDimBuilder {
    const NX: usize = 0;
    const NU: usize = 1;
    const NBX: usize = 2;
    const NBU: usize = 3;
    const NG: usize = 4;
    const NS: usize = 5;

    /// All counts start at zero for stages `0..=horizon`.
    pub fn new(horizon: usize) -> Self {
        Self {
            counts: vec![[0; 6]; horizon + 1],
        }
    }

    pub fn set(mut self, field: &str, stage: isize, value: isize) -> Result<Self, OcpQpError> {
        let upper = self.counts.len() as isize - 1;
        if stage < 0 || stage > upper {
            return Err(OcpQpError::StageOutOfRange {
                field: field.to_string(),
                end: RangeEnd::Start,
                index: stage,
                upper,
            });
        }
        let slot = match DimField::from_str(field)? {
            DimField::Nx => Self::NX,
            DimField::Nu => Self::NU,
            DimField::Nbx => Self::NBX,
            DimField::Nbu => Self::NBU,
            DimField::Ng => Self::NG,
            DimField::Ns => Self::NS,
            DimField::Nb => {
                return Err(OcpQpError::UnknownField {
                    container: "dimension builder (nb is derived from nbx and nbu)",
                    field: field.to_string(),
                });
            }
        };
        self.counts[stage as usize][slot] = value;
        Ok(self)
    }

    /// Sets one field on every stage; `values.len()` must be `N + 1`.
    pub fn set_all(mut self, field: &str, values: &[isize]) -> Result<Self, OcpQpError> {
        if values.len() != self.counts.len() {
            return Err(OcpQpError::ShapeMismatch {
                field: field.to_string(),
                stage: 0,
                expected: self.counts.len(),
                found: values.len(),
            });
        }
        for (stage, value) in values.iter().enumerate() {
            self = self.set(field, stage as isize, *value)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<OcpQpDim, OcpQpError> {
        const NAMES: [&str; 6] = ["nx", "nu", "nbx", "nbu", "ng", "ns"];

        let mut stages = Vec::with_capacity(self.counts.len());
        for (stage, counts) in self.counts.iter().enumerate() {
            if let Some(slot) = counts.iter().position(|c| *c < 0) {
                return Err(OcpQpError::NegativeDimension {
                    field: NAMES[slot].to_string(),
                    stage: stage as isize,
                    value: counts[slot],
                });
            }
            stages.push(StageDim {
                nx: counts[Self::NX] as usize,
                nu: counts[Self::NU] as usize,
                nbx: counts[Self::NBX] as usize,
                nbu: counts[Self::NBU] as usize,
                ng: counts[Self::NG] as usize,
                ns: counts[Self::NS] as usize,
            });
        }
        OcpQpDim::from_stages(stages)
    }
}
