//! Probability calibration for the candidate EV estimate.
//!
//! `StrategyStateMachine` computes a raw directional probability from a
//! normal-CDF model; a `ProbabilityCalibrator` maps that raw estimate (or,
//! with `CalibrationInput::ZScore`, the underlying z-score) onto an
//! empirically-corrected probability before it feeds into EV.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Which quantity a calibrator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationInput {
    /// The raw directional probability estimate.
    PHat,
    /// The directional z-score feeding that estimate.
    ZScore,
}

impl Default for CalibrationInput {
    fn default() -> Self {
        Self::PHat
    }
}

/// Which calibrator implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    None,
    Logistic,
    Isotonic,
}

pub trait ProbabilityCalibrator: Send + Sync {
    fn calibrate(&self, value: f64) -> f64;
}

/// Passes the input through unchanged, clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCalibrator;

impl ProbabilityCalibrator for IdentityCalibrator {
    fn calibrate(&self, value: f64) -> f64 {
        value.clamp(0.0, 1.0)
    }
}

/// `sigmoid(coef * value + intercept)`.
#[derive(Debug, Clone, Copy)]
pub struct LogisticCalibrator {
    pub coef: f64,
    pub intercept: f64,
}

impl ProbabilityCalibrator for LogisticCalibrator {
    fn calibrate(&self, value: f64) -> f64 {
        let logit = (self.coef * value) + self.intercept;
        1.0 / (1.0 + (-logit).exp())
    }
}

/// Piecewise-linear interpolation over a monotonic `(x, y)` control-point
/// table, fit offline (see `calibration_eval`) and loaded from a params file.
#[derive(Debug, Clone)]
pub struct IsotonicCalibrator {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl IsotonicCalibrator {
    /// `x`/`y` need not already be sorted or monotonic; this constructor
    /// sorts by `x` and enforces a running-max (isotonic) `y`, matching the
    /// offline fitting procedure.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, String> {
        if x.len() != y.len() || x.len() < 2 {
            return Err("isotonic calibrator requires >= 2 x/y points".to_string());
        }
        let mut pairs: Vec<(f64, f64)> = x.into_iter().zip(y).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let sorted_x: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let mut running = 0.0_f64;
        let monotonic_y: Vec<f64> = pairs
            .iter()
            .map(|p| {
                running = running.max(p.1);
                running.clamp(0.0, 1.0)
            })
            .collect();

        Ok(Self {
            x: sorted_x,
            y: monotonic_y,
        })
    }
}

impl ProbabilityCalibrator for IsotonicCalibrator {
    fn calibrate(&self, value: f64) -> f64 {
        if value <= self.x[0] {
            return self.y[0];
        }
        if value >= *self.x.last().unwrap() {
            return *self.y.last().unwrap();
        }
        for i in 1..self.x.len() {
            if value <= self.x[i] {
                let (x0, x1) = (self.x[i - 1], self.x[i]);
                let (y0, y1) = (self.y[i - 1], self.y[i]);
                let span = x1 - x0;
                if span <= 0.0 {
                    return y1;
                }
                let w = (value - x0) / span;
                return y0 + (w * (y1 - y0));
            }
        }
        *self.y.last().unwrap()
    }
}

#[derive(Debug, Deserialize)]
struct CalibrationParams {
    #[serde(default)]
    coef: Option<f64>,
    #[serde(default)]
    intercept: Option<f64>,
    #[serde(default)]
    x: Option<Vec<f64>>,
    #[serde(default)]
    y: Option<Vec<f64>>,
}

fn read_params(params_path: Option<&Path>) -> Option<CalibrationParams> {
    let path = params_path?;
    if !path.exists() {
        warn!(params_path = %path.display(), "calibration_params_file_missing");
        return None;
    }
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!(params_path = %path.display(), error = %e, "failed_to_read_calibration_params");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(params_path = %path.display(), error = %e, "failed_to_parse_calibration_params");
            None
        }
    }
}

/// Builds a calibrator per `method`, falling back to `IdentityCalibrator`
/// whenever the requested method's parameters are missing or invalid.
pub fn load_probability_calibrator(
    method: CalibrationMethod,
    params_path: Option<&Path>,
    logistic_coef: f64,
    logistic_intercept: f64,
) -> Box<dyn ProbabilityCalibrator> {
    match method {
        CalibrationMethod::None => Box::new(IdentityCalibrator),
        CalibrationMethod::Logistic => {
            let params = read_params(params_path);
            let coef = params.as_ref().and_then(|p| p.coef).unwrap_or(logistic_coef);
            let intercept = params
                .as_ref()
                .and_then(|p| p.intercept)
                .unwrap_or(logistic_intercept);
            Box::new(LogisticCalibrator { coef, intercept })
        }
        CalibrationMethod::Isotonic => {
            let Some(params) = read_params(params_path) else {
                warn!("isotonic_calibration_unavailable_fallback_identity");
                return Box::new(IdentityCalibrator);
            };
            match (params.x, params.y) {
                (Some(x), Some(y)) => match IsotonicCalibrator::new(x, y) {
                    Ok(c) => Box::new(c),
                    Err(e) => {
                        warn!(error = %e, "invalid_isotonic_params_fallback_identity");
                        Box::new(IdentityCalibrator)
                    }
                },
                _ => {
                    warn!("invalid_isotonic_params_fallback_identity");
                    Box::new(IdentityCalibrator)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_clamps_to_unit_interval() {
        let c = IdentityCalibrator;
        assert_eq!(c.calibrate(1.5), 1.0);
        assert_eq!(c.calibrate(-0.5), 0.0);
        assert_eq!(c.calibrate(0.4), 0.4);
    }

    #[test]
    fn logistic_monotonic_in_value() {
        let c = LogisticCalibrator {
            coef: 2.0,
            intercept: 0.0,
        };
        assert!(c.calibrate(1.0) > c.calibrate(0.0));
        assert!(c.calibrate(0.0) == 0.5);
    }

    #[test]
    fn isotonic_interpolates_between_control_points() {
        let c = IsotonicCalibrator::new(vec![0.0, 1.0], vec![0.2, 0.8]).unwrap();
        assert_eq!(c.calibrate(-1.0), 0.2);
        assert_eq!(c.calibrate(2.0), 0.8);
        assert!((c.calibrate(0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn isotonic_enforces_monotonic_y_from_unsorted_input() {
        let c = IsotonicCalibrator::new(vec![1.0, 0.0], vec![0.3, 0.6]).unwrap();
        assert_eq!(c.calibrate(-10.0), 0.6);
        assert_eq!(c.calibrate(10.0), 0.6);
    }

    #[test]
    fn isotonic_requires_at_least_two_points() {
        assert!(IsotonicCalibrator::new(vec![0.0], vec![0.5]).is_err());
    }

    #[test]
    fn load_none_method_is_identity() {
        let c = load_probability_calibrator(CalibrationMethod::None, None, 1.0, 0.0);
        assert_eq!(c.calibrate(0.3), 0.3);
    }

    #[test]
    fn load_logistic_without_params_uses_defaults() {
        let c = load_probability_calibrator(CalibrationMethod::Logistic, None, 3.0, -1.0);
        assert_eq!(c.calibrate(1.0 / 3.0), LogisticCalibrator { coef: 3.0, intercept: -1.0 }.calibrate(1.0 / 3.0));
    }

    #[test]
    fn load_isotonic_without_params_falls_back_to_identity() {
        let c = load_probability_calibrator(CalibrationMethod::Isotonic, None, 1.0, 0.0);
        assert_eq!(c.calibrate(0.7), 0.7);
    }
}
