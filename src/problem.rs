//! 異方性 Poisson 問題 `-∇·(ε ∇u) = f`（単位円板）。
//!
//! `ε = x^2 - 3y + 2`、厳密解 `u = 0.6 (x - y) cos(8xy)`。

use crate::fespace::{BilinearParams, BoundaryConditions, BoundaryFunctions, ScalarFunction};
use crate::geometry::BoundaryId;
use crate::model::{FieldSample, Surrogate};
use burn::prelude::Backend;
use burn::tensor::Tensor;

pub const BOTTOM: BoundaryId = BoundaryId(1000);
pub const RIGHT: BoundaryId = BoundaryId(1001);
pub const TOP: BoundaryId = BoundaryId(1002);
pub const LEFT: BoundaryId = BoundaryId(1003);

pub fn exact_solution(x: f64, y: f64) -> f64 {
    0.6 * (x - y) * (8.0 * x * y).cos()
}

/// 拡散係数 ε。
pub fn eps(x: f64, y: f64) -> f64 {
    x * x - 3.0 * y + 2.0
}

/// 右辺 `f = -∇·(ε ∇u)`。
pub fn rhs(x: f64, y: f64) -> f64 {
    let (s, c) = (8.0 * x * y).sin_cos();
    -14.4 * x * (x - y) * s
        + x * (38.4 * x * (x - y) * c - 9.6 * s) * eps(x, y)
        + 2.0 * x * (4.8 * y * (x - y) * s - 0.6 * c)
        + y * (38.4 * y * (x - y) * c + 9.6 * s) * eps(x, y)
        - 1.8 * c
}

/// 4つの境界すべてで厳密解を与える Dirichlet 条件。
pub fn boundary_functions() -> BoundaryFunctions {
    [BOTTOM, RIGHT, TOP, LEFT]
        .into_iter()
        .map(|id| (id, Box::new(exact_solution) as Box<dyn ScalarFunction>))
        .collect()
}

pub fn boundary_conditions() -> BoundaryConditions {
    [BOTTOM, RIGHT, TOP, LEFT]
        .into_iter()
        .map(|id| (id, "dirichlet".to_string()))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnisotropicDiffusion;

impl BilinearParams for AnisotropicDiffusion {
    fn names(&self) -> Vec<String> {
        vec!["eps".to_string()]
    }

    fn evaluate(&self, x: f64, y: f64) -> Vec<f64> {
        vec![eps(x, y)]
    }
}

/// 厳密解をテンソル演算で表したもの。損失関数の検算に使います。
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSolution;

impl<B: Backend> Surrogate<B> for ExactSolution {
    fn predict(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.predict_with_gradients(points).value
    }

    fn predict_with_gradients(&self, points: Tensor<B, 2>) -> FieldSample<B> {
        let [n, _] = points.dims();
        let x = points.clone().slice([0..n, 0..1]);
        let y = points.slice([0..n, 1..2]);
        let arg = x.clone().mul(y.clone()).mul_scalar(8.0);
        let (s, c) = (arg.clone().sin(), arg.cos());
        let diff = x.clone() - y.clone();

        // u_x = 0.6 cos(8xy) - 4.8 y (x - y) sin(8xy)
        // u_y = -0.6 cos(8xy) - 4.8 x (x - y) sin(8xy)
        let value = diff.clone().mul(c.clone()).mul_scalar(0.6);
        let damped = diff.mul(s).mul_scalar(4.8);
        let grad_x = c.clone().mul_scalar(0.6) - damped.clone().mul(y);
        let grad_y = c.mul_scalar(-0.6) - damped.mul(x);
        FieldSample { value, grad_x, grad_y }
    }
}
