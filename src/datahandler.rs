//! 組み立て済みの有限要素空間を、損失関数がそのまま使えるバッチテンソルへ変換します。

use crate::error::AssemblyError;
use crate::fespace::{BilinearParams, FeSpace2D, evaluate_coefficients};
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::Point2;
use std::collections::BTreeMap;

/// 係数場の名前ごとのテンソル `[n_cells, n_quad, 1]`。
pub type BilinearTensors<B> = BTreeMap<String, Tensor<B, 3>>;

/// セル順を保ったバッチテンソル。作成後は読み取り専用です。
///
/// * `x_pde_list`: 内点（全セルの求積点） `[n_cells * n_quad, 2]`
/// * 基底値・勾配行列: `[n_cells, n_test, n_quad]`（JxW 込み）
/// * 外力ベクトル: `[n_cells, n_test, 1]`
/// * Dirichlet 入力 `[m, 2]` と目標値 `[m, 1]`
#[derive(Debug, Clone)]
pub struct DataHandler2D<B: Backend> {
    n_cells: usize,
    n_test: usize,
    n_quad: usize,
    interior_points: Vec<Point2<f64>>,
    x_pde_list: Tensor<B, 2>,
    shape_val_mat: Tensor<B, 3>,
    grad_x_mat: Tensor<B, 3>,
    grad_y_mat: Tensor<B, 3>,
    forcing: Tensor<B, 3>,
    dirichlet_input: Tensor<B, 2>,
    dirichlet_output: Tensor<B, 2>,
    device: B::Device,
}

fn to_tensor<B: Backend, const D: usize>(
    values: Vec<f64>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

fn flatten_points(points: &[Point2<f64>]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y]).collect()
}

impl<B: Backend> DataHandler2D<B> {
    /// 値はバックエンドの浮動小数点型（`f32` または `f64`）に変換されます。
    pub fn new(fespace: &FeSpace2D, device: &B::Device) -> Result<Self, AssemblyError> {
        let arena = fespace.arena();
        let (n_cells, n_test, n_quad) = (arena.n_cells(), arena.n_functions(), arena.n_points());
        let dirichlet = fespace.dirichlet();
        if dirichlet.points.len() != dirichlet.values.len() {
            return Err(AssemblyError::shape_mismatch(
                "dirichlet targets",
                dirichlet.points.len(),
                dirichlet.values.len(),
            ));
        }
        if dirichlet.points.is_empty() {
            return Err(AssemblyError::configuration(
                "the mesh has no Dirichlet boundary points",
            ));
        }
        if n_cells == 0 {
            return Err(AssemblyError::configuration("the mesh has no cells"));
        }

        let matrix = [n_cells, n_test, n_quad];
        let m = dirichlet.points.len();
        let handler = Self {
            n_cells,
            n_test,
            n_quad,
            interior_points: arena.points().to_vec(),
            x_pde_list: to_tensor(flatten_points(arena.points()), [n_cells * n_quad, 2], device),
            shape_val_mat: to_tensor(arena.shape_val().to_vec(), matrix, device),
            grad_x_mat: to_tensor(arena.grad_x().to_vec(), matrix, device),
            grad_y_mat: to_tensor(arena.grad_y().to_vec(), matrix, device),
            forcing: to_tensor(arena.forcing().to_vec(), [n_cells, n_test, 1], device),
            dirichlet_input: to_tensor(flatten_points(&dirichlet.points), [m, 2], device),
            dirichlet_output: to_tensor(dirichlet.values.clone(), [m, 1], device),
            device: device.clone(),
        };
        tracing::debug!(
            n_interior = n_cells * n_quad,
            n_dirichlet = m,
            "バッチテンソルを作成しました"
        );
        Ok(handler)
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn n_test(&self) -> usize {
        self.n_test
    }

    pub fn n_quad(&self) -> usize {
        self.n_quad
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// 内点の座標。係数場を学習前に一度だけ評価するのに使います。
    pub fn interior_points(&self) -> &[Point2<f64>] {
        &self.interior_points
    }

    pub fn x_pde_list(&self) -> Tensor<B, 2> {
        self.x_pde_list.clone()
    }

    pub fn shape_val_mat(&self) -> Tensor<B, 3> {
        self.shape_val_mat.clone()
    }

    pub fn grad_x_mat(&self) -> Tensor<B, 3> {
        self.grad_x_mat.clone()
    }

    pub fn grad_y_mat(&self) -> Tensor<B, 3> {
        self.grad_y_mat.clone()
    }

    pub fn forcing(&self) -> Tensor<B, 3> {
        self.forcing.clone()
    }

    /// Dirichlet 境界の入力点と目標値の組。
    pub fn get_dirichlet_input(&self) -> (Tensor<B, 2>, Tensor<B, 2>) {
        (self.dirichlet_input.clone(), self.dirichlet_output.clone())
    }

    /// 係数場を全内点で評価し、バックエンドの精度のテンソル `[n_cells, n_quad, 1]` にします。
    pub fn bilinear_params(
        &self,
        params: &dyn BilinearParams,
    ) -> Result<BilinearTensors<B>, AssemblyError> {
        let table = evaluate_coefficients(&self.interior_points, params)?;
        Ok(table
            .into_iter()
            .map(|(name, values)| {
                let tensor = to_tensor(values, [self.n_cells, self.n_quad, 1], &self.device);
                (name, tensor)
            })
            .collect())
    }
}
