//! 参照要素から物理セルへの写像。

use crate::basis::ReferenceBasis;
use crate::error::AssemblyError;
use crate::geometry::Cell;
use crate::quadrature::QuadratureRule;
use nalgebra::{Matrix2, Matrix2x4, Point2, Vector2};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum TransformationKind {
    /// 頂点 0, 1, 3 が張る平行四辺形への写像。ヤコビアンは定数です。
    Affine,
    /// 一般の四角形への双一次写像。
    Bilinear,
}

impl FromStr for TransformationKind {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "affine" => Ok(Self::Affine),
            "bilinear" => Ok(Self::Bilinear),
            other => Err(AssemblyError::configuration(format!(
                "unknown element transformation `{other}`"
            ))),
        }
    }
}

impl TryFrom<String> for TransformationKind {
    type Error = AssemblyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 参照座標 ξ から物理座標 x への写像。
pub trait ElementTransformation {
    fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64>;

    /// `J = ∂x/∂ξ`。列が参照座標方向です。
    fn reference_jacobian(&self, xi: &Point2<f64>) -> Matrix2<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilinearTransformation {
    vertices: Cell,
}

impl BilinearTransformation {
    pub fn new(vertices: Cell) -> Self {
        Self { vertices }
    }

    #[rustfmt::skip]
    fn shape_gradients(xi: &Point2<f64>) -> Matrix2x4<f64> {
        let phi_grad = |alpha: f64, beta: f64|
            Vector2::new(
                alpha * (1.0 + beta * xi[1]) / 4.0,
                beta * (1.0 + alpha * xi[0]) / 4.0,
            );
        Matrix2x4::from_columns(&[
            phi_grad(-1.0, -1.0),
            phi_grad( 1.0, -1.0),
            phi_grad( 1.0,  1.0),
            phi_grad(-1.0,  1.0),
        ])
    }

    fn coordinate_matrix(&self) -> Matrix2x4<f64> {
        Matrix2x4::from_fn(|i, j| self.vertices[j][i])
    }
}

impl ElementTransformation for BilinearTransformation {
    #[allow(non_snake_case)]
    fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        let phi = |alpha: f64, beta: f64| (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 4.0;
        let N = nalgebra::Vector4::new(
            phi(-1.0, -1.0),
            phi(1.0, -1.0),
            phi(1.0, 1.0),
            phi(-1.0, 1.0),
        );
        Point2::from(self.coordinate_matrix() * N)
    }

    #[allow(non_snake_case)]
    fn reference_jacobian(&self, xi: &Point2<f64>) -> Matrix2<f64> {
        let G = Self::shape_gradients(xi);
        self.coordinate_matrix() * G.transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransformation {
    origin: Point2<f64>,
    jacobian: Matrix2<f64>,
}

impl AffineTransformation {
    pub fn new(vertices: Cell) -> Self {
        let [v0, v1, _, v3] = vertices;
        let jacobian = Matrix2::from_columns(&[(v1 - v0) / 2.0, (v3 - v0) / 2.0]);
        Self { origin: v0, jacobian }
    }
}

impl ElementTransformation for AffineTransformation {
    fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        self.origin + self.jacobian * Vector2::new(xi[0] + 1.0, xi[1] + 1.0)
    }

    fn reference_jacobian(&self, _: &Point2<f64>) -> Matrix2<f64> {
        self.jacobian
    }
}

/// 1つのセルの物理空間での求積データ。
///
/// 勾配は重みを掛けていない `∇φ_k(x_q)` で、`[k * n_points + q]` の順に並びます。
#[derive(Debug, Clone, PartialEq)]
pub struct CellGeometry {
    pub points: Vec<Point2<f64>>,
    /// 求積重み × ヤコビアン行列式。
    pub jxw: Vec<f64>,
    pub grad_x: Vec<f64>,
    pub grad_y: Vec<f64>,
}

/// セルの求積点を物理空間へ写し、勾配を連鎖律 `∇_x φ = J^{-T} ∇_ξ φ` で変換します。
///
/// ヤコビアン行列式が正でない（または有限でない）点があれば
/// [`AssemblyError::Geometry`] を返します。
pub fn transform_cell(
    kind: TransformationKind,
    cell_index: usize,
    cell: &Cell,
    rule: &QuadratureRule,
    basis: &ReferenceBasis,
) -> Result<CellGeometry, AssemblyError> {
    match kind {
        TransformationKind::Affine => {
            transform_with(&AffineTransformation::new(*cell), cell_index, rule, basis)
        }
        TransformationKind::Bilinear => {
            transform_with(&BilinearTransformation::new(*cell), cell_index, rule, basis)
        }
    }
}

fn transform_with<T: ElementTransformation>(
    transformation: &T,
    cell_index: usize,
    rule: &QuadratureRule,
    basis: &ReferenceBasis,
) -> Result<CellGeometry, AssemblyError> {
    let n_points = rule.len();
    let n_functions = basis.n_functions();
    let mut points = Vec::with_capacity(n_points);
    let mut jxw = Vec::with_capacity(n_points);
    let mut grad_x = vec![0.0; n_functions * n_points];
    let mut grad_y = vec![0.0; n_functions * n_points];

    for (q, (&[xi, eta], &weight)) in rule.points().iter().zip(rule.weights()).enumerate() {
        let xi = Point2::new(xi, eta);
        let jacobian = transformation.reference_jacobian(&xi);
        let determinant = jacobian.determinant();
        if !(determinant > 0.0 && determinant.is_finite()) {
            return Err(AssemblyError::Geometry {
                cell: cell_index,
                point: q,
                determinant,
            });
        }
        let inverse_transpose = jacobian
            .try_inverse()
            .ok_or(AssemblyError::Geometry {
                cell: cell_index,
                point: q,
                determinant,
            })?
            .transpose();

        for k in 0..n_functions {
            let g = inverse_transpose * Vector2::from(basis.gradient(k, q));
            grad_x[k * n_points + q] = g.x;
            grad_y[k * n_points + q] = g.y;
        }
        points.push(transformation.map_reference_coords(&xi));
        jxw.push(weight * determinant);
    }

    Ok(CellGeometry {
        points,
        jxw,
        grad_x,
        grad_y,
    })
}
