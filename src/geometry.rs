//! 2次元の幾何形状: 四角形メッシュ、境界点のサンプリング、テスト点の生成。

use crate::config::GeometryConfig;
use crate::error::{AssemblyError, MeshError};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// 境界条件を識別する境界タグ（例: 1000, 1001, ...）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub struct BoundaryId(pub u32);

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1つのセルの頂点座標（反時計回り）。
pub type Cell = [Point2<f64>; 4];

/// 境界タグごとの境界点列。
pub type BoundaryPoints = BTreeMap<BoundaryId, Vec<Point2<f64>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CellType {
    Quadrilateral,
    Triangle,
}

impl FromStr for CellType {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quadrilateral" | "quad" => Ok(Self::Quadrilateral),
            "triangular" | "triangle" => Ok(Self::Triangle),
            other => Err(AssemblyError::configuration(format!("unknown cell type `{other}`"))),
        }
    }
}

impl TryFrom<String> for CellType {
    type Error = AssemblyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 境界辺上の点の取り方。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SamplingMethod {
    /// 等間隔（始点を含み、終点を含まない）。
    Uniform,
    /// ラテン超方格法。各区間から1点ずつ一様乱数で取る。
    Lhs,
}

impl FromStr for SamplingMethod {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "lhs" => Ok(Self::Lhs),
            other => Err(AssemblyError::configuration(format!(
                "unknown boundary sampling method `{other}`"
            ))),
        }
    }
}

impl TryFrom<String> for SamplingMethod {
    type Error = AssemblyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryEdge {
    pub vertices: [usize; 2],
    pub id: BoundaryId,
}

/// 四角形セルと境界辺からなるメッシュ。読み込み後は不変です。
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<Point2<f64>>,
    cells: Vec<[usize; 4]>,
    boundary_edges: Vec<BoundaryEdge>,
}

impl Mesh {
    pub fn from_parts(
        vertices: Vec<Point2<f64>>,
        cells: Vec<[usize; 4]>,
        boundary_edges: Vec<BoundaryEdge>,
    ) -> Result<Self, MeshError> {
        let n = vertices.len();
        for (i, cell) in cells.iter().enumerate() {
            if let Some(&v) = cell.iter().find(|&&v| v >= n) {
                return Err(MeshError::UnknownVertex {
                    entity: format!("cell {i}"),
                    vertex: v,
                });
            }
        }
        for (i, edge) in boundary_edges.iter().enumerate() {
            if let Some(&v) = edge.vertices.iter().find(|&&v| v >= n) {
                return Err(MeshError::UnknownVertex {
                    entity: format!("boundary edge {i}"),
                    vertex: v,
                });
            }
        }
        Ok(Self {
            vertices,
            cells,
            boundary_edges,
        })
    }

    /// Medit 形式 (`.mesh`) のファイルを読み込みます。
    pub fn read_medit(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse_medit(&source)
    }

    /// Medit 形式の文字列を解析します。インデックスは1始まりです。
    pub fn parse_medit(source: &str) -> Result<Self, MeshError> {
        let mut tokens = Tokens::new(source);
        let mut vertices = Vec::new();
        let mut cells = Vec::new();
        let mut boundary_edges = Vec::new();

        while let Some((line, keyword)) = tokens.next_token() {
            match keyword {
                "MeshVersionFormatted" | "Dimension" => {
                    tokens.usize()?;
                }
                "Vertices" => {
                    let count = tokens.usize()?;
                    vertices.reserve(count);
                    for _ in 0..count {
                        let x = tokens.f64()?;
                        let y = tokens.f64()?;
                        tokens.usize()?;
                        vertices.push(Point2::new(x, y));
                    }
                }
                "Edges" => {
                    let count = tokens.usize()?;
                    for _ in 0..count {
                        let a = tokens.index()?;
                        let b = tokens.index()?;
                        let id = BoundaryId(tokens.parse("a boundary reference")?);
                        boundary_edges.push(BoundaryEdge { vertices: [a, b], id });
                    }
                }
                "Quadrilaterals" => {
                    let count = tokens.usize()?;
                    cells.reserve(count);
                    for _ in 0..count {
                        let cell = [
                            tokens.index()?,
                            tokens.index()?,
                            tokens.index()?,
                            tokens.index()?,
                        ];
                        tokens.usize()?;
                        cells.push(cell);
                    }
                }
                "Triangles" => {
                    if tokens.usize()? > 0 {
                        return Err(MeshError::Parse {
                            line,
                            message: "triangular cells are not supported".into(),
                        });
                    }
                }
                "Corners" | "RequiredVertices" | "Ridges" => {
                    let count = tokens.usize()?;
                    for _ in 0..count {
                        tokens.usize()?;
                    }
                }
                "End" => break,
                other => {
                    return Err(MeshError::Parse {
                        line,
                        message: format!("unexpected keyword `{other}`"),
                    });
                }
            }
        }

        Self::from_parts(vertices, cells, boundary_edges)
    }

    /// 各四角形を4分割する一様細分。境界辺も同じ中点で2分割されます。
    pub fn refine(&self) -> Self {
        let mut vertices = self.vertices.clone();
        let mut midpoints = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Point2<f64>>| {
            *midpoints.entry((a.min(b), a.max(b))).or_insert_with(|| {
                let m = nalgebra::center(&vertices[a], &vertices[b]);
                vertices.push(m);
                vertices.len() - 1
            })
        };

        let mut cells = Vec::with_capacity(4 * self.cells.len());
        for &[v0, v1, v2, v3] in &self.cells {
            let m01 = midpoint(v0, v1, &mut vertices);
            let m12 = midpoint(v1, v2, &mut vertices);
            let m23 = midpoint(v2, v3, &mut vertices);
            let m30 = midpoint(v3, v0, &mut vertices);
            let centroid = [v0, v1, v2, v3]
                .iter()
                .fold(Point2::origin(), |acc, &v| acc + vertices[v].coords / 4.0);
            vertices.push(centroid);
            let c = vertices.len() - 1;
            cells.push([v0, m01, c, m30]);
            cells.push([m01, v1, m12, c]);
            cells.push([c, m12, v2, m23]);
            cells.push([m30, c, m23, v3]);
        }

        let mut boundary_edges = Vec::with_capacity(2 * self.boundary_edges.len());
        for edge in &self.boundary_edges {
            let [a, b] = edge.vertices;
            let m = midpoint(a, b, &mut vertices);
            boundary_edges.push(BoundaryEdge { vertices: [a, m], id: edge.id });
            boundary_edges.push(BoundaryEdge { vertices: [m, b], id: edge.id });
        }

        Self {
            vertices,
            cells,
            boundary_edges,
        }
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[[usize; 4]] {
        &self.cells
    }

    pub fn boundary_edges(&self) -> &[BoundaryEdge] {
        &self.boundary_edges
    }

    /// セルの頂点座標をセル順に返します。
    pub fn cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .map(|cell| cell.map(|v| self.vertices[v]))
            .collect()
    }

    /// 各境界辺を `points_per_edge` 点でサンプリングし、境界タグごとにまとめます。
    pub fn sample_boundary(
        &self,
        points_per_edge: usize,
        method: SamplingMethod,
        seed: u64,
    ) -> BoundaryPoints {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut boundary_points = BoundaryPoints::new();
        let n = points_per_edge as f64;
        for edge in &self.boundary_edges {
            let a = self.vertices[edge.vertices[0]];
            let b = self.vertices[edge.vertices[1]];
            let points = boundary_points.entry(edge.id).or_default();
            for i in 0..points_per_edge {
                let t = match method {
                    SamplingMethod::Uniform => i as f64 / n,
                    SamplingMethod::Lhs => (i as f64 + rng.random::<f64>()) / n,
                };
                points.push(a + (b - a) * t);
            }
        }
        boundary_points
    }

    /// メッシュの外接矩形 `(min, max)`。
    pub fn bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), p| {
            (
                Point2::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point2::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        }))
    }

    /// 点がいずれかのセル内（境界上を含む）にあるか。
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        self.cells
            .iter()
            .any(|cell| cell_contains(&cell.map(|i| self.vertices[i]), p))
    }
}

fn cell_contains(cell: &Cell, p: &Point2<f64>) -> bool {
    let tol = 1e-12;
    let in_triangle = |a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>| {
        let cross = |u: &Point2<f64>, v: &Point2<f64>| (v - u).perp(&(p - u));
        cross(a, b) >= -tol && cross(b, c) >= -tol && cross(c, a) >= -tol
    };
    in_triangle(&cell[0], &cell[1], &cell[2]) || in_triangle(&cell[0], &cell[2], &cell[3])
}

/// 幾何形状の提供者。メッシュ、境界点、テスト点を保持します。
#[derive(Debug, Clone)]
pub struct Geometry2D {
    mesh: Mesh,
    cell_type: CellType,
    boundary_points: BoundaryPoints,
    n_test_points: (usize, usize),
}

impl Geometry2D {
    /// 設定に従ってメッシュファイルを読み込み、細分と境界サンプリングを行います。
    pub fn read_mesh(config: &GeometryConfig) -> Result<Self, AssemblyError> {
        let mesh = Mesh::read_medit(&config.mesh_file)?;
        Self::from_mesh(mesh, config)
    }

    pub fn from_mesh(mesh: Mesh, config: &GeometryConfig) -> Result<Self, AssemblyError> {
        // 境界点数 2^level の上限もここで検査される
        config.validate()?;
        let points_per_edge = 1usize << config.boundary_refinement_level;
        let mesh = (0..config.refinement_level).fold(mesh, |mesh, _| mesh.refine());
        let boundary_points = mesh.sample_boundary(
            points_per_edge,
            config.boundary_sampling_method,
            config.sampling_seed,
        );
        tracing::info!(
            n_cells = mesh.connectivity().len(),
            n_boundary_edges = mesh.boundary_edges().len(),
            "メッシュを読み込みました"
        );
        Ok(Self {
            mesh,
            cell_type: config.cell_type,
            boundary_points,
            n_test_points: (config.n_test_points_x, config.n_test_points_y),
        })
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn cells(&self) -> Vec<Cell> {
        self.mesh.cells()
    }

    pub fn boundary_points(&self) -> &BoundaryPoints {
        &self.boundary_points
    }

    /// 外接矩形上の `n_x x n_y` 格子のうち、領域内にある点。
    pub fn test_points(&self) -> Vec<Point2<f64>> {
        let Some((lo, hi)) = self.mesh.bounding_box() else {
            return Vec::new();
        };
        let (nx, ny) = self.n_test_points;
        let linspace = |a: f64, b: f64, n: usize, i: usize| {
            if n > 1 { a + (b - a) * i as f64 / (n - 1) as f64 } else { 0.5 * (a + b) }
        };
        (0..ny)
            .flat_map(|j| (0..nx).map(move |i| (i, j)))
            .map(|(i, j)| Point2::new(linspace(lo.x, hi.x, nx, i), linspace(lo.y, hi.y, ny, j)))
            .filter(|p| self.mesh.contains(p))
            .collect()
    }
}

struct Tokens<'a> {
    tokens: Vec<(usize, &'a str)>,
    position: usize,
}

impl<'a> Tokens<'a> {
    fn new(source: &'a str) -> Self {
        let tokens = source
            .lines()
            .enumerate()
            .flat_map(|(i, line)| {
                let content = line.split('#').next().unwrap_or("");
                content.split_whitespace().map(move |token| (i + 1, token))
            })
            .collect();
        Self { tokens, position: 0 }
    }

    fn next_token(&mut self) -> Option<(usize, &'a str)> {
        let token = self.tokens.get(self.position).copied();
        self.position += 1;
        token
    }

    /// 次のトークンの行番号（末尾では最終行）。
    fn line(&self) -> usize {
        self.tokens
            .get(self.position)
            .or(self.tokens.last())
            .map(|(line, _)| *line)
            .unwrap_or(0)
    }

    fn parse<T: FromStr>(&mut self, what: &str) -> Result<T, MeshError> {
        let line = self.line();
        let (line, token) = self.next_token().ok_or_else(|| MeshError::Parse {
            line,
            message: format!("unexpected end of file, expected {what}"),
        })?;
        token.parse().map_err(|_| MeshError::Parse {
            line,
            message: format!("expected {what}, found `{token}`"),
        })
    }

    fn usize(&mut self) -> Result<usize, MeshError> {
        self.parse("an integer")
    }

    fn f64(&mut self) -> Result<f64, MeshError> {
        self.parse("a floating point number")
    }

    /// 1始まりの頂点インデックスを0始まりに直します。
    fn index(&mut self) -> Result<usize, MeshError> {
        let line = self.line();
        match self.usize()? {
            0 => Err(MeshError::Parse {
                line,
                message: "vertex indices are 1-based".into(),
            }),
            i => Ok(i - 1),
        }
    }
}
