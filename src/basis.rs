//! 参照四角形上のテンソル積基底関数。

use crate::error::AssemblyError;
use crate::quadrature::{gauss_lobatto, legendre};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// 基底関数の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum BasisKind {
    /// `ψ_k(ξ) = P_{k+1}(ξ) - P_{k-1}(ξ)` (k = 1..=order+1) のテンソル積。
    ///
    /// どの関数も参照要素の境界上で0になるため、弱形式の試験関数として使えます。
    Legendre,
    /// Gauss–Lobatto–Legendre 節点上の Lagrange 補間関数。1の分割を満たします。
    Lagrange,
}

impl FromStr for BasisKind {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legendre" => Ok(Self::Legendre),
            "lagrange" => Ok(Self::Lagrange),
            other => Err(AssemblyError::configuration(format!(
                "unknown finite element type `{other}`"
            ))),
        }
    }
}

impl TryFrom<String> for BasisKind {
    type Error = AssemblyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for BasisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legendre => write!(f, "legendre"),
            Self::Lagrange => write!(f, "lagrange"),
        }
    }
}

/// 1次元の基底関数族。
#[derive(Debug, Clone)]
enum Basis1d {
    Legendre { n: usize },
    Lagrange { nodes: Vec<f64> },
}

impl Basis1d {
    fn new(kind: BasisKind, order: usize) -> Self {
        match kind {
            BasisKind::Legendre => Self::Legendre { n: order + 1 },
            BasisKind::Lagrange => Self::Lagrange {
                nodes: gauss_lobatto(order + 1).1,
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Legendre { n } => *n,
            Self::Lagrange { nodes } => nodes.len(),
        }
    }

    /// `i` 番目の関数の値と導関数。
    fn evaluate(&self, i: usize, x: f64) -> (f64, f64) {
        match self {
            Self::Legendre { .. } => {
                let k = i + 1;
                let (p_next, dp_next) = legendre(k + 1, x);
                let (p_prev, dp_prev) = legendre(k - 1, x);
                (p_next - p_prev, dp_next - dp_prev)
            }
            Self::Lagrange { nodes } => {
                let xi = nodes[i];
                let mut value = 1.0;
                let mut derivative = 0.0;
                for (_, &xm) in nodes.iter().enumerate().filter(|&(m, _)| m != i) {
                    // 積の微分: (l * g)' = l' g + l g'
                    let factor = (x - xm) / (xi - xm);
                    derivative = derivative * factor + value / (xi - xm);
                    value *= factor;
                }
                (value, derivative)
            }
        }
    }
}

/// 参照要素上の点で評価した基底関数の値と参照座標での偏導関数。
///
/// 各配列は関数番号が外側、点番号が内側（`values[k * n_points + q]`）です。
/// 2次元の関数番号は x 方向が速く回ります（`k = l * n_1d + i`）。
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceBasis {
    kind: BasisKind,
    order: usize,
    n_functions: usize,
    n_points: usize,
    values: Vec<f64>,
    grad_xi: Vec<f64>,
    grad_eta: Vec<f64>,
}

impl ReferenceBasis {
    /// 基底を参照座標の点列で評価します。次数0は設定エラーです。
    pub fn evaluate(
        kind: BasisKind,
        order: usize,
        points: &[[f64; 2]],
    ) -> Result<Self, AssemblyError> {
        if order == 0 {
            return Err(AssemblyError::configuration(
                "finite element order must be positive",
            ));
        }
        let basis = Basis1d::new(kind, order);
        let n_1d = basis.len();
        let n_functions = n_1d * n_1d;
        let n_points = points.len();

        let mut values = vec![0.0; n_functions * n_points];
        let mut grad_xi = vec![0.0; n_functions * n_points];
        let mut grad_eta = vec![0.0; n_functions * n_points];
        for (q, &[xi, eta]) in points.iter().enumerate() {
            let along_xi: Vec<_> = (0..n_1d).map(|i| basis.evaluate(i, xi)).collect();
            let along_eta: Vec<_> = (0..n_1d).map(|i| basis.evaluate(i, eta)).collect();
            for (l, &(b, db)) in along_eta.iter().enumerate() {
                for (i, &(a, da)) in along_xi.iter().enumerate() {
                    let idx = (l * n_1d + i) * n_points + q;
                    values[idx] = a * b;
                    grad_xi[idx] = da * b;
                    grad_eta[idx] = a * db;
                }
            }
        }

        Ok(Self {
            kind,
            order,
            n_functions,
            n_points,
            values,
            grad_xi,
            grad_eta,
        })
    }

    pub fn kind(&self) -> BasisKind {
        self.kind
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn n_functions(&self) -> usize {
        self.n_functions
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn value(&self, k: usize, q: usize) -> f64 {
        self.values[k * self.n_points + q]
    }

    /// 参照座標 (ξ, η) に関する勾配。
    pub fn gradient(&self, k: usize, q: usize) -> [f64; 2] {
        let idx = k * self.n_points + q;
        [self.grad_xi[idx], self.grad_eta[idx]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadrature::{QuadratureFamily, QuadratureRule};
    use matrixcompare::assert_scalar_eq;
    use proptest::prelude::*;

    #[test]
    fn function_count_is_order_plus_one_squared() {
        let rule = QuadratureRule::quadrilateral(5, QuadratureFamily::GaussJacobi).unwrap();
        for kind in [BasisKind::Legendre, BasisKind::Lagrange] {
            let basis = ReferenceBasis::evaluate(kind, 4, rule.points()).unwrap();
            assert_eq!((basis.kind(), basis.order()), (kind, 4));
            assert_eq!(basis.n_functions(), 25);
            assert_eq!(basis.n_points(), 100);
        }
    }

    #[test]
    fn zero_order_is_rejected() {
        assert!(matches!(
            ReferenceBasis::evaluate(BasisKind::Lagrange, 0, &[[0.0, 0.0]]),
            Err(AssemblyError::Configuration(_))
        ));
    }

    #[test]
    fn bilinear_lagrange_basis_at_corners() {
        let corners = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
        let basis = ReferenceBasis::evaluate(BasisKind::Lagrange, 1, &corners).unwrap();
        for k in 0..4 {
            for q in 0..4 {
                let expected = if k == q { 1.0 } else { 0.0 };
                assert_scalar_eq!(basis.value(k, q), expected, comp = abs, tol = 1e-15);
            }
        }
        // φ_0 = (1 - ξ)(1 - η) / 4
        assert_eq!(basis.gradient(0, 0), [-0.5, -0.5]);
    }

    #[test]
    fn legendre_basis_vanishes_on_reference_boundary() {
        let boundary: Vec<[f64; 2]> = (0..=8)
            .flat_map(|i| {
                let t = -1.0 + 0.25 * i as f64;
                [[t, -1.0], [1.0, t], [t, 1.0], [-1.0, t]]
            })
            .collect();
        let basis = ReferenceBasis::evaluate(BasisKind::Legendre, 4, &boundary).unwrap();
        for k in 0..basis.n_functions() {
            for q in 0..basis.n_points() {
                assert_scalar_eq!(basis.value(k, q), 0.0, comp = abs, tol = 1e-13);
            }
        }
    }

    #[test]
    fn legendre_first_function_is_a_bubble() {
        // ψ_1 = P_2 - P_0 = 1.5 (ξ^2 - 1)
        let basis = ReferenceBasis::evaluate(BasisKind::Legendre, 1, &[[0.5, -0.25]]).unwrap();
        let psi = |x: f64| 1.5 * (x * x - 1.0);
        let dpsi = |x: f64| 3.0 * x;
        assert_scalar_eq!(basis.value(0, 0), psi(0.5) * psi(-0.25), comp = abs, tol = 1e-14);
        let [gx, gy] = basis.gradient(0, 0);
        assert_scalar_eq!(gx, dpsi(0.5) * psi(-0.25), comp = abs, tol = 1e-14);
        assert_scalar_eq!(gy, psi(0.5) * dpsi(-0.25), comp = abs, tol = 1e-14);
    }

    proptest! {
        #[test]
        fn lagrange_basis_is_a_partition_of_unity(order in 1usize..=6, quad_order in 1usize..=6) {
            let rule =
                QuadratureRule::quadrilateral(quad_order, QuadratureFamily::GaussJacobi).unwrap();
            let basis =
                ReferenceBasis::evaluate(BasisKind::Lagrange, order, rule.points()).unwrap();
            for q in 0..basis.n_points() {
                let sum: f64 = (0..basis.n_functions()).map(|k| basis.value(k, q)).sum();
                let grad_sum = (0..basis.n_functions())
                    .map(|k| basis.gradient(k, q))
                    .fold([0.0, 0.0], |acc, g| [acc[0] + g[0], acc[1] + g[1]]);
                prop_assert!((sum - 1.0).abs() < 1e-10);
                prop_assert!(grad_sum[0].abs() < 1e-9 && grad_sum[1].abs() < 1e-9);
            }
        }

        #[test]
        fn gradients_match_finite_differences(
            order in 1usize..=5,
            xi in -0.9f64..0.9,
            eta in -0.9f64..0.9,
            lagrange in any::<bool>(),
        ) {
            let kind = if lagrange { BasisKind::Lagrange } else { BasisKind::Legendre };
            let h = 1e-6;
            let points = [[xi, eta], [xi + h, eta], [xi - h, eta], [xi, eta + h], [xi, eta - h]];
            let basis = ReferenceBasis::evaluate(kind, order, &points).unwrap();
            for k in 0..basis.n_functions() {
                let [gx, gy] = basis.gradient(k, 0);
                let fd_x = (basis.value(k, 1) - basis.value(k, 2)) / (2.0 * h);
                let fd_y = (basis.value(k, 3) - basis.value(k, 4)) / (2.0 * h);
                prop_assert!((gx - fd_x).abs() < 1e-5 * (1.0 + gx.abs()));
                prop_assert!((gy - fd_y).abs() < 1e-5 * (1.0 + gy.abs()));
            }
        }
    }
}
