use crate::basis::BasisKind;
use crate::error::AssemblyError;
use crate::geometry::{CellType, SamplingMethod};
use crate::quadrature::QuadratureFamily;
use crate::transformation::TransformationKind;
use color_eyre::eyre::eyre;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 実行設定。読み込み時に検証され、その後は変更されません。
///
/// 組み立て (`fespace`) とモデル (`model`) の設定は独立しています。
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub geometry: GeometryConfig,
    pub fespace: AssemblyConfig,
    pub model: ModelConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryConfig {
    pub mesh_file: PathBuf,
    #[serde(default = "default_cell_type")]
    pub cell_type: CellType,
    /// 各境界辺の点数は `2^boundary_refinement_level`。
    pub boundary_refinement_level: u32,
    pub boundary_sampling_method: SamplingMethod,
    /// メッシュを一様に4分割する回数。
    #[serde(default)]
    pub refinement_level: usize,
    #[serde(default)]
    pub sampling_seed: u64,
    pub n_test_points_x: usize,
    pub n_test_points_y: usize,
}

/// 有限要素空間の組み立て設定。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssemblyConfig {
    pub fe_order: usize,
    pub fe_type: BasisKind,
    pub quad_order: usize,
    pub quad_type: QuadratureFamily,
    #[serde(default = "default_transformation")]
    pub transformation: TransformationKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// 入力2次元、出力1次元の全結合層の幅（例: `[2, 30, 30, 30, 1]`）。
    pub layer_dims: Vec<usize>,
    #[serde(default = "default_activation")]
    pub activation: String,
    /// 境界損失の重み β。
    pub beta: f64,
    #[serde(default)]
    pub precision: Precision,
}

/// テンソルの数値精度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    F32,
    F64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// `path` からの相対パス。拡張子 `.mpk` はレコーダーが付けます。
    pub model_file: PathBuf,
    #[serde(default)]
    pub generate_mesh_plot: bool,
}

fn default_cell_type() -> CellType {
    CellType::Quadrilateral
}

fn default_transformation() -> TransformationKind {
    TransformationKind::Bilinear
}

fn default_activation() -> String {
    "tanh".to_string()
}

/// 環境変数による上書き。接頭辞と各階層は `__` で区切ります（例: `VPINN__MODEL__BETA=20`）。
fn environment() -> Environment {
    Environment::with_prefix("VPINN").separator("__")
}

impl RunConfig {
    /// TOML ファイルを読み込み、`VPINN__` で始まる環境変数で上書きします。
    pub fn load(path: impl AsRef<Path>) -> color_eyre::Result<Self> {
        Self::load_with(path.as_ref(), environment())
    }

    fn load_with(path: &Path, environment: Environment) -> color_eyre::Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(environment)
            .build()?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| eyre!(format!("Failed to deserialize the config file: {:?}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        self.geometry.validate()?;
        self.fespace.validate()?;
        self.model.validate()
    }

    pub fn model_path(&self) -> PathBuf {
        self.output.path.join(&self.output.model_file)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.output.path.join("results_inference")
    }
}

impl GeometryConfig {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.cell_type != CellType::Quadrilateral {
            return Err(AssemblyError::configuration(
                "only quadrilateral meshes are supported",
            ));
        }
        if self.boundary_refinement_level > 16 {
            return Err(AssemblyError::configuration(format!(
                "boundary refinement level {} is too large (at most 16)",
                self.boundary_refinement_level
            )));
        }
        if self.n_test_points_x == 0 || self.n_test_points_y == 0 {
            return Err(AssemblyError::configuration(
                "the number of test points must be positive in both directions",
            ));
        }
        Ok(())
    }
}

impl AssemblyConfig {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.fe_order == 0 {
            return Err(AssemblyError::configuration(
                "finite element order must be positive",
            ));
        }
        if self.quad_order == 0 {
            return Err(AssemblyError::configuration(
                "quadrature order must be positive",
            ));
        }
        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        let dims = &self.layer_dims;
        if dims.len() < 3 {
            return Err(AssemblyError::configuration(
                "layer_dims needs an input, at least one hidden layer and an output",
            ));
        }
        if dims.first() != Some(&2) || dims.last() != Some(&1) {
            return Err(AssemblyError::configuration(format!(
                "layer_dims must map 2 inputs to 1 output, got {dims:?}"
            )));
        }
        if dims.contains(&0) {
            return Err(AssemblyError::configuration("layer widths must be positive"));
        }
        if self.activation != "tanh" {
            return Err(AssemblyError::configuration(format!(
                "unsupported activation `{}`, only tanh is available",
                self.activation
            )));
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(AssemblyError::configuration(format!(
                "boundary penalty beta must be a non-negative number, got {}",
                self.beta
            )));
        }
        Ok(())
    }
}
