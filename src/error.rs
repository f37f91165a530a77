use crate::geometry::BoundaryId;

/// 組み立てパイプライン全体で発生するエラー。
///
/// いずれも学習の開始前に検出され、再試行されることはありません。
#[derive(thiserror::Error, Debug)]
pub enum AssemblyError {
    /// 求積次数・要素次数・要素種別などの設定が不正。
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// ヤコビアンの行列式が正でない（反転または退化したセル）。
    #[error(
        "cell {cell} is degenerate or inverted: \
         jacobian determinant {determinant:e} at quadrature point {point}"
    )]
    Geometry {
        cell: usize,
        point: usize,
        determinant: f64,
    },
    #[error("boundary {id}: unsupported boundary condition `{kind}`, only dirichlet is supported")]
    UnsupportedBoundaryCondition { id: BoundaryId, kind: String },
    #[error("boundary {0}: no boundary function registered")]
    MissingBoundaryFunction(BoundaryId),
    #[error("boundary {0}: no boundary condition registered")]
    MissingBoundaryCondition(BoundaryId),
    /// セルごとの行列・ベクトルの次元が揃っていない。
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// メッシュファイルの読み込みエラー。
#[derive(thiserror::Error, Debug)]
pub enum MeshError {
    #[error("failed to read mesh file: {0}")]
    Io(#[from] std::io::Error),
    #[error("mesh parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("{entity} references unknown vertex {vertex}")]
    UnknownVertex { entity: String, vertex: usize },
}

impl AssemblyError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn shape_mismatch(
        context: impl Into<String>,
        expected: usize,
        found: usize,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}
