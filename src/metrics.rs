//! テスト点上の誤差指標。

use crate::error::AssemblyError;
use serde::Serialize;
use std::fmt;

/// 予測値と厳密解の誤差。相対誤差は厳密解の同じノルムで割った値です。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorMetrics {
    pub l2: f64,
    pub l1: f64,
    pub linf: f64,
    pub relative_l2: f64,
    pub relative_l1: f64,
    pub relative_linf: f64,
}

/// `(sqrt(mean(v^2)), mean(|v|), max(|v|))`
fn norms(values: impl Iterator<Item = f64> + Clone) -> (f64, f64, f64) {
    let n = values.clone().count().max(1) as f64;
    let l2 = (values.clone().map(|v| v * v).sum::<f64>() / n).sqrt();
    let l1 = values.clone().map(f64::abs).sum::<f64>() / n;
    let linf = values.map(f64::abs).fold(0.0, f64::max);
    (l2, l1, linf)
}

impl ErrorMetrics {
    pub fn compute(predicted: &[f64], exact: &[f64]) -> Result<Self, AssemblyError> {
        if predicted.len() != exact.len() {
            return Err(AssemblyError::shape_mismatch(
                "predicted values",
                exact.len(),
                predicted.len(),
            ));
        }
        let errors = predicted.iter().zip(exact).map(|(p, e)| p - e);
        let (l2, l1, linf) = norms(errors);
        let (exact_l2, exact_l1, exact_linf) = norms(exact.iter().copied());
        Ok(Self {
            l2,
            l1,
            linf,
            relative_l2: l2 / exact_l2,
            relative_l1: l1 / exact_l1,
            relative_linf: linf / exact_linf,
        })
    }
}

impl fmt::Display for ErrorMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "L2 Error:             {:.6e}", self.l2)?;
        writeln!(f, "L1 Error:             {:.6e}", self.l1)?;
        writeln!(f, "L_inf Error:          {:.6e}", self.linf)?;
        writeln!(f, "Relative L2 Error:    {:.6e}", self.relative_l2)?;
        writeln!(f, "Relative L1 Error:    {:.6e}", self.relative_l1)?;
        write!(f, "Relative L_inf Error: {:.6e}", self.relative_linf)
    }
}
