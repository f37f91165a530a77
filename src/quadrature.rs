//! 参照要素 `[-1, 1]^2` 上の求積則。
//!
//! Gauss–Legendre 則は `fenris_quadrature` のものを、Gauss–Lobatto 則は自前の
//! 漸化式で求め、テンソル積で四角形要素用の2次元規則を構成します。

use crate::error::AssemblyError;
use crate::geometry::CellType;
use fenris_quadrature::univariate;
use serde::Deserialize;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// 求積点の族。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum QuadratureFamily {
    /// Jacobi 重み α = β = 0 の Gauss 則（すなわち Gauss–Legendre 則）。
    GaussJacobi,
    /// 端点 ±1 を含む Gauss–Lobatto–Legendre 則。
    GaussLobatto,
}

impl FromStr for QuadratureFamily {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauss-jacobi" | "gauss-legendre" => Ok(Self::GaussJacobi),
            "gauss-lobatto" => Ok(Self::GaussLobatto),
            other => Err(AssemblyError::configuration(format!(
                "unknown quadrature family `{other}`"
            ))),
        }
    }
}

impl TryFrom<String> for QuadratureFamily {
    type Error = AssemblyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for QuadratureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GaussJacobi => write!(f, "gauss-jacobi"),
            Self::GaussLobatto => write!(f, "gauss-lobatto"),
        }
    }
}

/// Legendre 多項式 `P_n(x)` とその導関数を漸化式で評価します。
///
/// 導関数には `P'_m = P'_{m-2} + (2m - 1) P_{m-1}` を使うので、`|x| = 1` でも有効です。
pub(crate) fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut p_prev, mut p) = (1.0, x);
    let (mut dp_prev, mut dp) = (0.0, 1.0);
    if n == 0 {
        return (1.0, 0.0);
    }
    for m in 2..=n {
        let m_f = m as f64;
        let p_next = ((2.0 * m_f - 1.0) * x * p - (m_f - 1.0) * p_prev) / m_f;
        let dp_next = dp_prev + (2.0 * m_f - 1.0) * p;
        p_prev = p;
        p = p_next;
        dp_prev = dp;
        dp = dp_next;
    }
    (p, dp)
}

/// 1次元の求積則 `(weights, points)`。点は昇順に並びます。
pub type Rule1d = (Vec<f64>, Vec<f64>);

/// `n` 点の Gauss–Legendre 則。`2n - 1` 次までの多項式を厳密に積分します。
///
/// `fenris_quadrature` の規則を昇順に並べ替えたものです。
///
/// # Panics
///
/// `n == 0` のとき。
pub fn gauss(n: usize) -> Rule1d {
    let (weights, points) = univariate::gauss(n);
    let mut rule: Vec<(f64, f64)> = points.into_iter().map(|[x]| x).zip(weights).collect();
    rule.sort_by(|a, b| a.0.total_cmp(&b.0));
    rule.into_iter().map(|(x, w)| (w, x)).unzip()
}

/// `n` 点の Gauss–Lobatto–Legendre 則（`n >= 2`）。
///
/// 内点は `P'_{n-1}` の根で、重みは `2 / (N (N + 1) P_N(x)^2)`, `N = n - 1` です。
pub fn gauss_lobatto(n: usize) -> Rule1d {
    assert!(n >= 2, "Gauss-Lobatto rules need at least two points");
    let big_n = n - 1;
    let nn1 = (big_n * (big_n + 1)) as f64;
    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..n {
        let mut x = -(PI * i as f64 / big_n as f64).cos();
        if i > 0 && i < big_n {
            // P'_N の根を Newton 法で。P''_N は Legendre 方程式から
            for _ in 0..100 {
                let (p, dp) = legendre(big_n, x);
                let ddp = (2.0 * x * dp - nn1 * p) / (1.0 - x * x);
                let dx = -dp / ddp;
                x += dx;
                if dx.abs() <= 1e-15 {
                    break;
                }
            }
        }
        let (p, _) = legendre(big_n, x);
        points[i] = x;
        weights[i] = 2.0 / (nn1 * p * p);
    }

    (weights, points)
}

/// 参照四角形 `[-1, 1]^2` 上のテンソル積求積則。
///
/// 点の並びは x 方向が速く回ります（`q = j * n + i`）。
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    points: Vec<[f64; 2]>,
    weights: Vec<f64>,
    points_per_dim: usize,
}

impl QuadratureRule {
    /// 指定した次数と族から四角形用の求積則を作ります。
    ///
    /// 1方向あたりの点数は `2 * order` です（次数5なら 10 x 10 = 100 点）。
    pub fn quadrilateral(order: usize, family: QuadratureFamily) -> Result<Self, AssemblyError> {
        if order == 0 {
            return Err(AssemblyError::configuration(
                "quadrature order must be positive",
            ));
        }
        let n = 2 * order;
        let (weights1d, points1d) = match family {
            QuadratureFamily::GaussJacobi => gauss(n),
            QuadratureFamily::GaussLobatto => gauss_lobatto(n),
        };

        let mut points = Vec::with_capacity(n * n);
        let mut weights = Vec::with_capacity(n * n);
        for (&wy, &y) in weights1d.iter().zip(&points1d) {
            for (&wx, &x) in weights1d.iter().zip(&points1d) {
                points.push([x, y]);
                weights.push(wx * wy);
            }
        }

        Ok(Self {
            points,
            weights,
            points_per_dim: n,
        })
    }

    /// セル種別に応じた求積則。現状は四角形のみ対応しています。
    pub fn for_cell(
        cell_type: CellType,
        order: usize,
        family: QuadratureFamily,
    ) -> Result<Self, AssemblyError> {
        match cell_type {
            CellType::Quadrilateral => Self::quadrilateral(order, family),
            CellType::Triangle => Err(AssemblyError::configuration(
                "triangular cells are not supported, use a quadrilateral mesh",
            )),
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn points_per_dim(&self) -> usize {
        self.points_per_dim
    }
}
