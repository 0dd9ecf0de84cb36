//! Human-readable load-profile specifications.
//!
//! Grammar (whitespace is insignificant):
//!
//! ```text
//! spec    := profile ('|' profile)*          first profile is the parent, the rest nest
//! profile := entry (';' entry)*
//! entry   := resource '=' expr
//!          | 'overhead' '=' number            milliseconds
//!          | 'utilization' '=' number         in (0, 1]
//!          | 'correctness' '=' number         in [0, 1]
//! expr    := ['-'] term (('+' | '-') term)*
//! term    := number | var | number '*' var | var '*' number
//! var     := 'in' index | 'out' index
//! ```
//!
//! Example: `cpu = 400 + 2*in0 + 2*in1; ram = 0.5*out0; overhead = 10`.

use std::sync::Arc;

use crate::cost::{LoadEstimate, Resource};
use crate::error::{CostError, Result};
use crate::estimator::{ConstantLoadEstimator, LinearLoadEstimator, NestableLoadProfileEstimator};

/// Parse a specification into an estimator. Fails on any malformed entry.
pub fn parse_specification(spec: &str) -> Result<NestableLoadProfileEstimator> {
    let mut profiles = spec.split('|');
    let first = profiles.next().unwrap_or_default();
    let mut parent = parse_profile(spec, first)?;
    for nested in profiles {
        parent.nest(Arc::new(parse_profile(spec, nested)?));
    }
    Ok(parent)
}

fn parse_profile(spec: &str, text: &str) -> Result<NestableLoadProfileEstimator> {
    let mut estimator = NestableLoadProfileEstimator::new();
    let mut exprs: Vec<(Resource, LinearLoadEstimator)> = Vec::new();
    let mut correctness = 1.0;
    let mut seen: Vec<String> = Vec::new();

    for entry in text.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| CostError::spec(spec, format!("entry '{entry}' lacks '='")))?;
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if seen.contains(&key) {
            return Err(CostError::spec(spec, format!("duplicate key '{key}'")));
        }
        seen.push(key.clone());

        match key.as_str() {
            "overhead" => {
                let ms = parse_number(spec, value)?;
                if ms < 0.0 {
                    return Err(CostError::spec(spec, "overhead must not be negative"));
                }
                estimator = estimator.with_overhead_ms(ms.round() as u64);
            }
            "utilization" | "util" => {
                let u = parse_number(spec, value)?;
                if !(u > 0.0 && u <= 1.0) {
                    return Err(CostError::spec(spec, "utilization must be in (0, 1]"));
                }
                estimator = estimator.with_utilization(u);
            }
            "correctness" | "conf" => {
                let c = parse_number(spec, value)?;
                if !(0.0..=1.0).contains(&c) {
                    return Err(CostError::spec(spec, "correctness must be in [0, 1]"));
                }
                correctness = c;
            }
            other => {
                let resource = Resource::from_key(other)
                    .ok_or_else(|| CostError::spec(spec, format!("unknown key '{other}'")))?;
                exprs.push((resource, parse_expr(spec, value)?));
            }
        }
    }

    if seen.is_empty() {
        return Err(CostError::spec(spec, "no entries"));
    }

    for (resource, expr) in exprs {
        let expr = expr.with_correctness(correctness);
        if expr.input_coefficients.is_empty() && expr.output_coefficients.is_empty() {
            let constant = LoadEstimate::new(expr.constant, expr.constant, correctness);
            estimator = estimator.with_load(resource, Arc::new(ConstantLoadEstimator(constant)));
        } else {
            estimator = estimator.with_load(resource, Arc::new(expr));
        }
    }
    Ok(estimator)
}

fn parse_number(spec: &str, text: &str) -> Result<f64> {
    let text = text.trim();
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CostError::spec(spec, format!("'{text}' is not a number")))
}

fn parse_expr(spec: &str, text: &str) -> Result<LinearLoadEstimator> {
    let mut est = LinearLoadEstimator::new(0.0);
    let mut terms: Vec<(f64, String)> = Vec::new();

    // Split into signed terms while keeping the sign with each term.
    let mut sign = 1.0;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '+' | '-' if ends_in_exponent(&current) => current.push(ch),
            '+' | '-' => {
                let pending = current.trim().to_string();
                if pending.is_empty() {
                    if !terms.is_empty() || ch == '+' {
                        return Err(CostError::spec(spec, format!("dangling operator in '{text}'")));
                    }
                } else {
                    terms.push((sign, pending));
                }
                sign = if ch == '-' { -1.0 } else { 1.0 };
                current.clear();
            }
            c if c.is_whitespace() => current.push(' '),
            c => current.push(c),
        }
    }
    let pending = current.trim().to_string();
    if pending.is_empty() {
        return Err(CostError::spec(spec, format!("incomplete expression '{text}'")));
    }
    terms.push((sign, pending));

    for (sign, term) in terms {
        let factors: Vec<&str> = term.split('*').map(str::trim).collect();
        let (coef, var) = match factors.as_slice() {
            [single] => match parse_var(single) {
                Some(var) => (1.0, Some(var)),
                None => (parse_number(spec, single)?, None),
            },
            [a, b] => match (parse_var(a), parse_var(b)) {
                (Some(var), None) => (parse_number(spec, b)?, Some(var)),
                (None, Some(var)) => (parse_number(spec, a)?, Some(var)),
                _ => return Err(CostError::spec(spec, format!("term '{term}' must be number*var"))),
            },
            _ => return Err(CostError::spec(spec, format!("term '{term}' has too many factors"))),
        };
        let coef = sign * coef;
        match var {
            None => est.constant += coef,
            Some(Var::In(i)) => est = est.input(i, coef),
            Some(Var::Out(j)) => est = est.output(j, coef),
        }
    }
    Ok(est)
}

/// True if `current` ends in a number's exponent marker, as in `2e` of `2e-3`.
fn ends_in_exponent(current: &str) -> bool {
    let factor = current.rsplit('*').next().unwrap_or_default().trim_start();
    factor
        .strip_suffix(|c: char| c.eq_ignore_ascii_case(&'e'))
        .is_some_and(|mantissa| {
            mantissa.starts_with(|c: char| c.is_ascii_digit() || c == '.')
                && mantissa.parse::<f64>().is_ok()
        })
}

enum Var {
    In(usize),
    Out(usize),
}

fn parse_var(text: &str) -> Option<Var> {
    if let Some(idx) = text.strip_prefix("in") {
        return idx.parse().ok().map(Var::In);
    }
    if let Some(idx) = text.strip_prefix("out") {
        return idx.parse().ok().map(Var::Out);
    }
    None
}
