//! 有限要素空間の組み立て。
//!
//! 全セルについて参照求積データを物理空間へ写し、求積重み × ヤコビアン行列式を
//! 掛けた基底値・勾配行列と外力ベクトルを、セル番号で引ける連続配列
//! ([`CellArena`]) に格納します。Dirichlet 境界の入力点と目標値もここで評価します。

use crate::basis::ReferenceBasis;
use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use crate::geometry::{BoundaryId, BoundaryPoints, Cell, CellType, Geometry2D};
use crate::quadrature::QuadratureRule;
use crate::transformation::transform_cell;
use nalgebra::{DMatrix, Point2};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// 点 (x, y) で評価できるスカラー関数。境界関数と外力項に使います。
pub trait ScalarFunction: Send + Sync {
    fn evaluate(&self, x: f64, y: f64) -> f64;
}

impl<F> ScalarFunction for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn evaluate(&self, x: f64, y: f64) -> f64 {
        self(x, y)
    }
}

/// 双線形形式の係数場（例: 異方性拡散係数 `eps`）。
pub trait BilinearParams: Send + Sync {
    /// 係数場の名前。`evaluate` の戻り値と同じ順序です。
    fn names(&self) -> Vec<String>;

    fn evaluate(&self, x: f64, y: f64) -> Vec<f64>;
}

/// 境界タグごとの境界関数。
pub type BoundaryFunctions = BTreeMap<BoundaryId, Box<dyn ScalarFunction>>;

/// 境界タグごとの境界条件の種類（現状 `"dirichlet"` のみ）。
pub type BoundaryConditions = BTreeMap<BoundaryId, String>;

/// 係数場の名前ごとの値。並びは内点（全セルの求積点）の順です。
pub type CoefficientTable = BTreeMap<String, Vec<f64>>;

/// 1セル分の組み立て結果。並列に計算され、後で [`CellArena`] に詰められます。
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledCell {
    pub shape_val: Vec<f64>,
    pub grad_x: Vec<f64>,
    pub grad_y: Vec<f64>,
    pub forcing: Vec<f64>,
    pub forcing_values: Vec<f64>,
    pub jxw: Vec<f64>,
    pub points: Vec<Point2<f64>>,
}

/// セルごとの行列をまとめた struct-of-arrays。
///
/// 行列は `[cell][function][point]`、ベクトルは `[cell][function]` または
/// `[cell][point]` の順に連続して並びます。
#[derive(Debug, Clone, PartialEq)]
pub struct CellArena {
    n_cells: usize,
    n_functions: usize,
    n_points: usize,
    shape_val: Vec<f64>,
    grad_x: Vec<f64>,
    grad_y: Vec<f64>,
    forcing: Vec<f64>,
    forcing_values: Vec<f64>,
    jxw: Vec<f64>,
    points: Vec<Point2<f64>>,
}

/// 1セル分の読み取り専用ビュー。
#[derive(Debug, Clone, Copy)]
pub struct CellView<'a> {
    pub shape_val: &'a [f64],
    pub grad_x: &'a [f64],
    pub grad_y: &'a [f64],
    pub forcing: &'a [f64],
    pub forcing_values: &'a [f64],
    pub jxw: &'a [f64],
    pub points: &'a [Point2<f64>],
}

impl CellArena {
    pub fn with_capacity(n_cells: usize, n_functions: usize, n_points: usize) -> Self {
        let matrix = n_cells * n_functions * n_points;
        Self {
            n_cells: 0,
            n_functions,
            n_points,
            shape_val: Vec::with_capacity(matrix),
            grad_x: Vec::with_capacity(matrix),
            grad_y: Vec::with_capacity(matrix),
            forcing: Vec::with_capacity(n_cells * n_functions),
            forcing_values: Vec::with_capacity(n_cells * n_points),
            jxw: Vec::with_capacity(n_cells * n_points),
            points: Vec::with_capacity(n_cells * n_points),
        }
    }

    /// セルを末尾に追加します。次元が揃っていなければ [`AssemblyError::ShapeMismatch`]。
    pub fn push(&mut self, cell: AssembledCell) -> Result<(), AssemblyError> {
        let index = self.n_cells;
        let matrix = self.n_functions * self.n_points;
        let checks = [
            ("shape value matrix", matrix, cell.shape_val.len()),
            ("x-gradient matrix", matrix, cell.grad_x.len()),
            ("y-gradient matrix", matrix, cell.grad_y.len()),
            ("forcing vector", self.n_functions, cell.forcing.len()),
            ("forcing values", self.n_points, cell.forcing_values.len()),
            ("quadrature weights", self.n_points, cell.jxw.len()),
            ("quadrature points", self.n_points, cell.points.len()),
        ];
        for (what, expected, found) in checks {
            if expected != found {
                return Err(AssemblyError::shape_mismatch(
                    format!("{what} of cell {index}"),
                    expected,
                    found,
                ));
            }
        }

        self.shape_val.extend(cell.shape_val);
        self.grad_x.extend(cell.grad_x);
        self.grad_y.extend(cell.grad_y);
        self.forcing.extend(cell.forcing);
        self.forcing_values.extend(cell.forcing_values);
        self.jxw.extend(cell.jxw);
        self.points.extend(cell.points);
        self.n_cells += 1;
        Ok(())
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn n_functions(&self) -> usize {
        self.n_functions
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn cell(&self, index: usize) -> Option<CellView<'_>> {
        if index >= self.n_cells {
            return None;
        }
        let matrix = self.n_functions * self.n_points;
        let m = index * matrix..(index + 1) * matrix;
        let f = index * self.n_functions..(index + 1) * self.n_functions;
        let q = index * self.n_points..(index + 1) * self.n_points;
        Some(CellView {
            shape_val: &self.shape_val[m.clone()],
            grad_x: &self.grad_x[m.clone()],
            grad_y: &self.grad_y[m],
            forcing: &self.forcing[f],
            forcing_values: &self.forcing_values[q.clone()],
            jxw: &self.jxw[q.clone()],
            points: &self.points[q],
        })
    }

    pub fn shape_val(&self) -> &[f64] {
        &self.shape_val
    }

    pub fn grad_x(&self) -> &[f64] {
        &self.grad_x
    }

    pub fn grad_y(&self) -> &[f64] {
        &self.grad_y
    }

    pub fn forcing(&self) -> &[f64] {
        &self.forcing
    }

    /// 全セルの物理求積点（内点）をセル順に連結したもの。
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }
}

/// Dirichlet 境界の入力点と目標値。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirichletData {
    pub points: Vec<Point2<f64>>,
    pub values: Vec<f64>,
}

/// 組み立て済みの有限要素空間。作成後は読み取り専用です。
#[derive(Debug, Clone)]
pub struct FeSpace2D {
    config: AssemblyConfig,
    arena: CellArena,
    dirichlet: DirichletData,
}

impl FeSpace2D {
    pub fn new(
        geometry: &Geometry2D,
        config: &AssemblyConfig,
        bound_functions: &BoundaryFunctions,
        bound_conditions: &BoundaryConditions,
        forcing: &dyn ScalarFunction,
    ) -> Result<Self, AssemblyError> {
        Self::from_cells(
            &geometry.cells(),
            geometry.boundary_points(),
            geometry.cell_type(),
            config,
            bound_functions,
            bound_conditions,
            forcing,
        )
    }

    /// セル列と境界点から有限要素空間を組み立てます。
    ///
    /// 境界の検査を先に行うので、境界の設定ミスはセルの計算前に報告されます。
    #[tracing::instrument(name = "FE space assembly", level = "info", skip_all)]
    pub fn from_cells(
        cells: &[Cell],
        boundary_points: &BoundaryPoints,
        cell_type: CellType,
        config: &AssemblyConfig,
        bound_functions: &BoundaryFunctions,
        bound_conditions: &BoundaryConditions,
        forcing: &dyn ScalarFunction,
    ) -> Result<Self, AssemblyError> {
        let dirichlet = assemble_dirichlet(boundary_points, bound_functions, bound_conditions)?;

        let rule = QuadratureRule::for_cell(cell_type, config.quad_order, config.quad_type)?;
        let basis = ReferenceBasis::evaluate(config.fe_type, config.fe_order, rule.points())?;
        tracing::debug!(
            basis = %basis.kind(),
            order = basis.order(),
            n_points = rule.len(),
            n_functions = basis.n_functions(),
            "参照要素の基底を評価しました"
        );

        let assembled = cells
            .par_iter()
            .enumerate()
            .map(|(index, cell)| assemble_cell(index, cell, config, &rule, &basis, forcing))
            .collect::<Result<Vec<_>, _>>()?;

        let mut arena = CellArena::with_capacity(cells.len(), basis.n_functions(), rule.len());
        for cell in assembled {
            arena.push(cell)?;
        }

        tracing::info!(
            n_cells = arena.n_cells(),
            n_quad_points = arena.n_points(),
            n_test_functions = arena.n_functions(),
            n_dirichlet_points = dirichlet.points.len(),
            "有限要素空間を組み立てました"
        );

        Ok(Self {
            config: config.clone(),
            arena,
            dirichlet,
        })
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    pub fn n_cells(&self) -> usize {
        self.arena.n_cells()
    }

    pub fn arena(&self) -> &CellArena {
        &self.arena
    }

    pub fn dirichlet(&self) -> &DirichletData {
        &self.dirichlet
    }

    /// セルの剛性行列 `K_kj = Σ_q ∇φ_k · ∇φ_j JxW_q`。
    pub fn stiffness_matrix(&self, cell: usize) -> Option<DMatrix<f64>> {
        let view = self.arena.cell(cell)?;
        let n = self.arena.n_functions();
        let nq = self.arena.n_points();
        // 格納されている勾配には JxW が掛かっているので一度だけ割り戻す
        Some(DMatrix::from_fn(n, n, |k, j| {
            (0..nq)
                .map(|q| {
                    let gxx = view.grad_x[k * nq + q] * view.grad_x[j * nq + q];
                    let gyy = view.grad_y[k * nq + q] * view.grad_y[j * nq + q];
                    (gxx + gyy) / view.jxw[q]
                })
                .sum()
        }))
    }

    /// 係数場を全内点で評価します。
    pub fn evaluate_bilinear_params(
        &self,
        params: &dyn BilinearParams,
    ) -> Result<CoefficientTable, AssemblyError> {
        evaluate_coefficients(self.arena.points(), params)
    }
}

/// 係数場を点列で評価し、名前ごとの列にまとめます。
pub fn evaluate_coefficients(
    points: &[Point2<f64>],
    params: &dyn BilinearParams,
) -> Result<CoefficientTable, AssemblyError> {
    let names = params.names();
    let mut columns = vec![Vec::with_capacity(points.len()); names.len()];
    for p in points {
        let values = params.evaluate(p.x, p.y);
        if values.len() != names.len() {
            return Err(AssemblyError::shape_mismatch(
                "bilinear parameters",
                names.len(),
                values.len(),
            ));
        }
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(value);
        }
    }
    Ok(names.into_iter().zip(columns).collect())
}

fn assemble_dirichlet(
    boundary_points: &BoundaryPoints,
    bound_functions: &BoundaryFunctions,
    bound_conditions: &BoundaryConditions,
) -> Result<DirichletData, AssemblyError> {
    let mut dirichlet = DirichletData::default();
    for (&id, points) in boundary_points {
        let function = bound_functions
            .get(&id)
            .ok_or(AssemblyError::MissingBoundaryFunction(id))?;
        match bound_conditions.get(&id).map(String::as_str) {
            Some("dirichlet") => {}
            Some(kind) => {
                return Err(AssemblyError::UnsupportedBoundaryCondition {
                    id,
                    kind: kind.to_string(),
                });
            }
            None => return Err(AssemblyError::MissingBoundaryCondition(id)),
        }

        for p in points {
            dirichlet.points.push(*p);
            dirichlet.values.push(function.evaluate(p.x, p.y));
        }
    }
    Ok(dirichlet)
}

fn assemble_cell(
    index: usize,
    cell: &Cell,
    config: &AssemblyConfig,
    rule: &QuadratureRule,
    basis: &ReferenceBasis,
    forcing: &dyn ScalarFunction,
) -> Result<AssembledCell, AssemblyError> {
    let geometry = transform_cell(config.transformation, index, cell, rule, basis)?;
    let n_points = rule.len();
    let n_functions = basis.n_functions();

    let forcing_values: Vec<f64> = geometry
        .points
        .iter()
        .map(|p| forcing.evaluate(p.x, p.y))
        .collect();

    let mut shape_val = vec![0.0; n_functions * n_points];
    let mut grad_x = geometry.grad_x;
    let mut grad_y = geometry.grad_y;
    let mut forcing_vector = vec![0.0; n_functions];
    for k in 0..n_functions {
        for q in 0..n_points {
            let idx = k * n_points + q;
            let w = geometry.jxw[q];
            shape_val[idx] = basis.value(k, q) * w;
            grad_x[idx] *= w;
            grad_y[idx] *= w;
            forcing_vector[k] += shape_val[idx] * forcing_values[q];
        }
    }

    Ok(AssembledCell {
        shape_val,
        grad_x,
        grad_y,
        forcing: forcing_vector,
        forcing_values,
        jxw: geometry.jxw,
        points: geometry.points,
    })
}
