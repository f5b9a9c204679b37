//! Mass-flux unit handling.
//!
//! Emissions tables label their rows with strings such as `Mt CO2/yr`,
//! `kt N2O/yr` or `GtCO2/yr`. Only the mass prefix differs between the units
//! the pipeline needs to reconcile, so this module parses
//! `<prefix><t|g> [substance][/yr]` and converts between units that share a
//! substance and a time basis.
//!
//! ```
//! use cfscm_core::units::conversion_factor;
//!
//! let factor = conversion_factor("Gt CO2/yr", "Mt CO2/yr").unwrap();
//! assert_eq!(factor, 1000.0);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{CfscmError, CfscmResult};

/// A parsed mass or mass-flux unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassUnit {
    /// Size of one unit in tonnes.
    tonnes: f64,
    /// Chemical species the mass refers to, e.g. `CO2`.
    substance: Option<String>,
    per_year: bool,
}

fn prefix_scale(prefix: char) -> Option<f64> {
    match prefix {
        'k' => Some(1e3),
        'M' => Some(1e6),
        'G' => Some(1e9),
        'T' => Some(1e12),
        'P' => Some(1e15),
        _ => None,
    }
}

/// Split a mass token (e.g. `Mt`, `kt`, `Tg`, `t`) into its size in tonnes.
fn parse_mass_token(token: &str) -> Option<(f64, usize)> {
    let mut chars = token.chars();
    let first = chars.next()?;
    let base = |c: char| match c {
        't' => Some(1.0),
        'g' => Some(1e-6),
        _ => None,
    };
    if let Some(scale) = prefix_scale(first) {
        if let Some(b) = chars.next().and_then(base) {
            return Some((scale * b, 2));
        }
    }
    base(first).map(|b| (b, 1))
}

impl MassUnit {
    pub fn parse(unit: &str) -> CfscmResult<Self> {
        let err = |details: &str| CfscmError::Unit {
            unit: unit.to_string(),
            details: details.to_string(),
        };

        let mut parts = unit.split('/');
        let numerator = parts.next().unwrap_or("").trim();
        let per_year = match parts.next().map(str::trim) {
            None => false,
            Some("yr") | Some("a") | Some("year") => true,
            Some(other) => return Err(err(&format!("unsupported time basis '{other}'"))),
        };
        if parts.next().is_some() {
            return Err(err("more than one '/'"));
        }
        if numerator.is_empty() {
            return Err(err("empty unit"));
        }

        let (tonnes, consumed) =
            parse_mass_token(numerator).ok_or_else(|| err("expected a mass unit such as 'Mt'"))?;
        let rest = &numerator[consumed..];
        // A mass token must be followed by whitespace, a substance or nothing: "Mt" or "Mt CO2"
        // or "MtCO2", but never "Mtons".
        let substance = rest.trim();
        if !rest.is_empty()
            && !rest.starts_with(char::is_whitespace)
            && !substance.starts_with(|c: char| c.is_ascii_uppercase())
        {
            return Err(err("expected a mass unit such as 'Mt'"));
        }

        Ok(Self {
            tonnes,
            substance: (!substance.is_empty()).then(|| substance.replace(' ', "")),
            per_year,
        })
    }

    pub fn substance(&self) -> Option<&str> {
        self.substance.as_deref()
    }

    pub fn is_flux(&self) -> bool {
        self.per_year
    }

    /// Multiplicative factor taking a value in `self` to a value in `target`.
    pub fn conversion_factor(&self, target: &MassUnit) -> CfscmResult<f64> {
        if self.per_year != target.per_year {
            return Err(CfscmError::Unit {
                unit: format!("{self} -> {target}"),
                details: "cannot convert between a mass and a mass flux".to_string(),
            });
        }
        match (&self.substance, &target.substance) {
            (Some(a), Some(b)) if a != b => Err(CfscmError::Unit {
                unit: format!("{self} -> {target}"),
                details: format!("substance mismatch ({a} vs {b})"),
            }),
            _ => Ok(self.tonnes / target.tonnes),
        }
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.tonnes {
            t if t == 1e15 => "Pt",
            t if t == 1e12 => "Tt",
            t if t == 1e9 => "Gt",
            t if t == 1e6 => "Mt",
            t if t == 1e3 => "kt",
            t if t == 1.0 => "t",
            _ => "?t",
        };
        write!(f, "{prefix}")?;
        if let Some(substance) = &self.substance {
            write!(f, " {substance}")?;
        }
        if self.per_year {
            write!(f, "/yr")?;
        }
        Ok(())
    }
}

/// Factor converting values labelled `from` into values labelled `to`.
///
/// Identical strings convert with a factor of one even if they cannot be
/// parsed, so custom labels still pass through untouched.
pub fn conversion_factor(from: &str, to: &str) -> CfscmResult<f64> {
    if from.trim() == to.trim() {
        return Ok(1.0);
    }
    MassUnit::parse(from)?.conversion_factor(&MassUnit::parse(to)?)
}
