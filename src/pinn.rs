//! 変分（弱形式）損失。
//!
//! 各セル `c`、各試験関数 `k` について弱形式の残差
//!
//! ```text
//! r[c, k] = Σ_q ε (∂φ_k/∂x · ∂u/∂x + ∂φ_k/∂y · ∂u/∂y) JxW - F[c, k]
//! ```
//!
//! を計算し、セルごとの二乗平均をセル全体で足し合わせたものを PDE 損失とします。

use crate::datahandler::{BilinearTensors, DataHandler2D};
use crate::error::AssemblyError;
use crate::model::{FieldSample, Surrogate};
use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// 拡散係数場の名前。
pub const DIFFUSION_COEFFICIENT: &str = "eps";

/// 損失の内訳。`total = pde + β · boundary`。
#[derive(Debug, Clone)]
pub struct LossComponents<B: Backend> {
    pub pde: Tensor<B, 1>,
    pub boundary: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

/// 異方性 Poisson 方程式 `-∇·(ε ∇u) = f` の弱形式残差による損失。
///
/// `sample` は `data.x_pde_list()` 上で評価した予測とその勾配、`eps` は `[n_cells, n_quad, 1]`。
pub fn pde_loss_poisson_anisotropic<B: Backend>(
    sample: &FieldSample<B>,
    data: &DataHandler2D<B>,
    eps: Tensor<B, 3>,
) -> Result<Tensor<B, 1>, AssemblyError> {
    let (n_cells, n_quad) = (data.n_cells(), data.n_quad());
    let [n_points, _] = sample.grad_x.dims();
    if n_points != n_cells * n_quad {
        return Err(AssemblyError::shape_mismatch(
            "interior gradients",
            n_cells * n_quad,
            n_points,
        ));
    }
    if eps.dims() != [n_cells, n_quad, 1] {
        return Err(AssemblyError::shape_mismatch(
            "diffusion coefficient",
            n_cells * n_quad,
            eps.dims().iter().product(),
        ));
    }

    let grad_x = sample.grad_x.clone().reshape([n_cells, n_quad, 1]);
    let grad_y = sample.grad_y.clone().reshape([n_cells, n_quad, 1]);
    // [C, T, Q] x [C, Q, 1] -> [C, T, 1]
    let flux = data.grad_x_mat().matmul(eps.clone().mul(grad_x))
        + data.grad_y_mat().matmul(eps.mul(grad_y));
    let residual = flux - data.forcing();
    Ok(residual.powf_scalar(2.0).mean_dim(1).sum())
}

/// Dirichlet 境界上の二乗平均誤差。
pub fn boundary_loss<B: Backend>(
    model: &impl Surrogate<B>,
    data: &DataHandler2D<B>,
) -> Tensor<B, 1> {
    let (input, target) = data.get_dirichlet_input();
    let prediction = model.predict(input);
    MseLoss::new().forward(prediction, target, Reduction::Mean)
}

/// PDE 項と境界項をまとめた変分損失。モデルのパラメータについて微分可能です。
pub fn variational_loss<B: Backend>(
    model: &impl Surrogate<B>,
    data: &DataHandler2D<B>,
    params: &BilinearTensors<B>,
    beta: f64,
) -> Result<LossComponents<B>, AssemblyError> {
    let eps = params.get(DIFFUSION_COEFFICIENT).cloned().ok_or_else(|| {
        AssemblyError::configuration(format!(
            "bilinear coefficient `{DIFFUSION_COEFFICIENT}` is required \
             by the anisotropic Poisson loss"
        ))
    })?;
    let sample = model.predict_with_gradients(data.x_pde_list());
    let pde = pde_loss_poisson_anisotropic(&sample, data, eps)?;
    let boundary = boundary_loss(model, data);
    let total = pde.clone() + boundary.clone().mul_scalar(beta);
    Ok(LossComponents { pde, boundary, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::BasisKind;
    use crate::config::{AssemblyConfig, ModelConfig, Precision};
    use crate::fespace::{BoundaryConditions, BoundaryFunctions, FeSpace2D, ScalarFunction};
    use crate::geometry::{BoundaryId, BoundaryPoints, Cell, CellType};
    use crate::model::Model;
    use crate::problem::{self, AnisotropicDiffusion, ExactSolution};
    use crate::quadrature::QuadratureFamily;
    use crate::transformation::TransformationKind;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::GradientsParams;
    use burn::tensor::ElementConversion;
    use nalgebra::Point2;

    type TestBackend = NdArray<f64>;

    /// 常に 0 を返す代理モデル。
    struct ZeroField;

    impl<B: Backend> Surrogate<B> for ZeroField {
        fn predict(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
            let [n, _] = points.dims();
            Tensor::zeros([n, 1], &points.device())
        }

        fn predict_with_gradients(&self, points: Tensor<B, 2>) -> FieldSample<B> {
            let value = self.predict(points);
            FieldSample {
                grad_x: value.zeros_like(),
                grad_y: value.zeros_like(),
                value,
            }
        }
    }

    fn two_cells() -> Vec<Cell> {
        let p = |x: f64, y: f64| Point2::new(x, y);
        vec![
            [p(-0.5, -0.5), p(0.0, -0.5), p(0.1, 0.5), p(-0.5, 0.5)],
            [p(0.0, -0.5), p(0.5, -0.5), p(0.5, 0.5), p(0.1, 0.5)],
        ]
    }

    fn poisson_space() -> FeSpace2D {
        let id = BoundaryId(1000);
        let points = BoundaryPoints::from([(
            id,
            vec![Point2::new(-0.5, -0.5), Point2::new(0.0, -0.5), Point2::new(0.5, 0.2)],
        )]);
        let functions = BoundaryFunctions::from([(
            id,
            Box::new(problem::exact_solution) as Box<dyn ScalarFunction>,
        )]);
        let conditions = BoundaryConditions::from([(id, "dirichlet".to_string())]);
        let config = AssemblyConfig {
            fe_order: 2,
            fe_type: BasisKind::Legendre,
            quad_order: 5,
            quad_type: QuadratureFamily::GaussJacobi,
            transformation: TransformationKind::Bilinear,
        };
        FeSpace2D::from_cells(
            &two_cells(),
            &points,
            CellType::Quadrilateral,
            &config,
            &functions,
            &conditions,
            &problem::rhs,
        )
        .expect("assembly succeeds")
    }

    fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
        tensor.into_scalar().elem::<f64>()
    }

    #[test]
    fn exact_solution_has_vanishing_weak_residual() {
        let device = Default::default();
        let data = DataHandler2D::<TestBackend>::new(&poisson_space(), &device).unwrap();
        let params = data.bilinear_params(&AnisotropicDiffusion).unwrap();
        let loss = variational_loss(&ExactSolution, &data, &params, 10.0).unwrap();
        assert!(scalar(loss.pde) < 1e-8);
        assert!(scalar(loss.boundary) < 1e-20);
        assert!(scalar(loss.total) < 1e-8);
    }

    #[test]
    fn zero_field_loss_is_the_forcing_energy() {
        let device = Default::default();
        let space = poisson_space();
        let data = DataHandler2D::<TestBackend>::new(&space, &device).unwrap();
        let params = data.bilinear_params(&AnisotropicDiffusion).unwrap();
        let beta = 2.5;
        let loss = variational_loss(&ZeroField, &data, &params, beta).unwrap();

        let arena = space.arena();
        let expected_pde: f64 = arena
            .forcing()
            .chunks(arena.n_functions())
            .map(|f| f.iter().map(|v| v * v).sum::<f64>() / f.len() as f64)
            .sum();
        let values = &space.dirichlet().values;
        let expected_boundary = values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64;

        let pde = scalar(loss.pde);
        let boundary = scalar(loss.boundary);
        assert!((pde - expected_pde).abs() < 1e-12 * expected_pde.max(1.0));
        assert!((boundary - expected_boundary).abs() < 1e-14);
        assert!((scalar(loss.total) - (pde + beta * boundary)).abs() < 1e-12);
    }

    #[test]
    fn missing_diffusion_coefficient_is_a_configuration_error() {
        let device = Default::default();
        let data = DataHandler2D::<TestBackend>::new(&poisson_space(), &device).unwrap();
        let err = variational_loss(&ZeroField, &data, &BilinearTensors::new(), 1.0).unwrap_err();
        assert!(matches!(err, AssemblyError::Configuration(_)));
        assert!(err.to_string().contains("eps"));
    }

    #[test]
    fn gradient_count_must_match_the_interior_points() {
        let device = Default::default();
        let data = DataHandler2D::<TestBackend>::new(&poisson_space(), &device).unwrap();
        let params = data.bilinear_params(&AnisotropicDiffusion).unwrap();
        let (boundary_points, _) = data.get_dirichlet_input();
        let sample = ExactSolution.predict_with_gradients(boundary_points);
        let err = pde_loss_poisson_anisotropic(&sample, &data, params["eps"].clone()).unwrap_err();
        assert!(matches!(err, AssemblyError::ShapeMismatch { .. }));
    }

    #[test]
    fn loss_is_differentiable_in_model_parameters() {
        type AutodiffBackend = Autodiff<TestBackend>;
        let device = Default::default();
        let data = DataHandler2D::<AutodiffBackend>::new(&poisson_space(), &device).unwrap();
        let params = data.bilinear_params(&AnisotropicDiffusion).unwrap();
        let config = ModelConfig {
            layer_dims: vec![2, 6, 6, 1],
            activation: "tanh".to_string(),
            beta: 10.0,
            precision: Precision::F64,
        };
        let model = Model::<AutodiffBackend>::new(&config, &device).unwrap();
        let loss = variational_loss(&model, &data, &params, config.beta).unwrap();
        let grads = GradientsParams::from_grads(loss.total.backward(), &model);
        // 3層 × (重み + バイアス)
        assert_eq!(grads.len(), 6);
    }
}
