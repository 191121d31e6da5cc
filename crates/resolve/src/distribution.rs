use crate::error::{ResolveError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const NUMBER: &str = r"[0-9]+(?:\.[0-9]*)?(?:[eE][-+]?[0-9]+)?";

static OFFSET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(?P<offset>{NUMBER})\+(?P<rest>.+)$"))
        .expect("offset pattern is a valid regex")
});

static RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(?P<lower>{NUMBER})-(?P<upper>{NUMBER})$"))
        .expect("range pattern is a valid regex")
});

static CALL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<kind>[a-zA-Z]+)\((?P<params>[^()]*)\)$")
        .expect("call pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Normal,
    Lognormal,
    Uniform,
    Exponential,
    Gamma,
}

impl DistributionKind {
    fn arity(self) -> usize {
        match self {
            Self::Exponential => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Lognormal => "lognormal",
            Self::Uniform => "uniform",
            Self::Exponential => "exponential",
            Self::Gamma => "gamma",
        };
        f.write_str(name)
    }
}

/// Validated age distribution.
///
/// Parameters by kind: normal `(mean, sigma)`, lognormal `(mu, sigma)` in log
/// space, uniform `(lower, upper)` where `upper` may be infinite, exponential
/// `(mean)`, gamma `(shape, scale)`. The distribution is shifted by `offset`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub kind: DistributionKind,
    pub params: Vec<f64>,
    pub offset: f64,
}

impl Distribution {
    pub fn new(kind: DistributionKind, params: Vec<f64>) -> Result<Self> {
        if params.len() != kind.arity() {
            return Err(ResolveError::config(format!(
                "{kind} distribution takes {} parameter(s), got {}",
                kind.arity(),
                params.len()
            )));
        }
        let dist = Self {
            kind,
            params,
            offset: 0.0,
        };
        dist.validate()?;
        Ok(dist)
    }

    pub fn uniform(lower: f64, upper: f64) -> Result<Self> {
        Self::new(DistributionKind::Uniform, vec![lower, upper])
    }

    pub fn normal(mean: f64, sigma: f64) -> Result<Self> {
        Self::new(DistributionKind::Normal, vec![mean, sigma])
    }

    /// Lognormal from a real-space mean and standard deviation
    pub fn lognormal_from_real(mean: f64, stdev: f64) -> Result<Self> {
        if mean <= 0.0 || stdev <= 0.0 {
            return Err(ResolveError::config(format!(
                "rlognormal needs a positive mean and standard deviation, got ({mean}, {stdev})"
            )));
        }
        let variance_ratio = (stdev / mean).powi(2);
        let sigma = variance_ratio.ln_1p().sqrt();
        let mu = mean.ln() - sigma * sigma / 2.0;
        Self::new(DistributionKind::Lognormal, vec![mu, sigma])
    }

    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.params.iter().any(|p| p.is_nan()) {
            return Err(ResolveError::config(format!("{self}: parameter is not a number")));
        }
        let positive = |i: usize, what: &str| -> Result<()> {
            if self.params[i] > 0.0 && self.params[i].is_finite() {
                Ok(())
            } else {
                Err(ResolveError::config(format!("{self}: {what} must be positive")))
            }
        };
        match self.kind {
            DistributionKind::Normal | DistributionKind::Lognormal => positive(1, "sigma"),
            DistributionKind::Exponential => positive(0, "mean"),
            DistributionKind::Gamma => {
                positive(0, "shape")?;
                positive(1, "scale")
            }
            DistributionKind::Uniform => {
                let (lower, upper) = (self.params[0], self.params[1]);
                if lower < 0.0 || !lower.is_finite() {
                    Err(ResolveError::config(format!(
                        "{self}: lower bound must be a finite non-negative age"
                    )))
                } else if upper <= lower {
                    Err(ResolveError::config(format!(
                        "{self}: upper bound must exceed the lower bound"
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset != 0.0 {
            write!(f, "{} + ", self.offset)?;
        }
        let params: Vec<String> = self.params.iter().map(f64::to_string).collect();
        write!(f, "{}({})", self.kind, params.join(", "))
    }
}

impl FromStr for Distribution {
    type Err = ResolveError;

    /// Accepts `a-b`, `>a`, `<b`, `kind(p1, p2)` and an `offset + ...` prefix
    fn from_str(spec: &str) -> Result<Self> {
        let compact: String = spec.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(ResolveError::config("Empty distribution specification"));
        }

        if let Some(caps) = OFFSET_PATTERN.captures(&compact) {
            let offset = number(&caps["offset"], spec)?;
            return Ok(parse_body(&caps["rest"], spec)?.with_offset(offset));
        }
        parse_body(&compact, spec)
    }
}

fn parse_body(body: &str, spec: &str) -> Result<Distribution> {
    if let Some(lower) = body.strip_prefix('>') {
        return Distribution::uniform(number(lower, spec)?, f64::INFINITY);
    }
    if let Some(upper) = body.strip_prefix('<') {
        return Distribution::uniform(0.0, number(upper, spec)?);
    }
    if let Some(caps) = RANGE_PATTERN.captures(body) {
        let lower = number(&caps["lower"], spec)?;
        let upper = number(&caps["upper"], spec)?;
        if upper <= lower {
            return Err(ResolveError::config(format!(
                "Calibration range '{spec}' has reversed bounds"
            )));
        }
        return Distribution::uniform(lower, upper);
    }
    if let Some(caps) = CALL_PATTERN.captures(body) {
        let params = caps["params"]
            .split(',')
            .map(|p| number(p, spec))
            .collect::<Result<Vec<f64>>>()?;
        return match caps["kind"].to_ascii_lowercase().as_str() {
            "normal" => Distribution::new(DistributionKind::Normal, params),
            "lognormal" => Distribution::new(DistributionKind::Lognormal, params),
            "rlognormal" => match params[..] {
                [mean, stdev] => Distribution::lognormal_from_real(mean, stdev),
                _ => Err(ResolveError::config(format!(
                    "rlognormal takes 2 parameters in '{spec}'"
                ))),
            },
            "uniform" => Distribution::new(DistributionKind::Uniform, params),
            "exponential" => Distribution::new(DistributionKind::Exponential, params),
            "gamma" => Distribution::new(DistributionKind::Gamma, params),
            other => Err(ResolveError::config(format!(
                "Unknown distribution '{other}' in '{spec}'"
            ))),
        };
    }
    Err(ResolveError::config(format!(
        "Cannot parse distribution specification '{spec}'"
    )))
}

fn number(text: &str, spec: &str) -> Result<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| {
            ResolveError::config(format!("'{text}' is not a number in distribution '{spec}'"))
        })
}
