//! `assemble` と `infer` サブコマンドの実処理。

use crate::config::{Precision, RunConfig};
use crate::datahandler::{BilinearTensors, DataHandler2D};
use crate::error::AssemblyError;
use crate::fespace::FeSpace2D;
use crate::geometry::Geometry2D;
use crate::metrics::ErrorMetrics;
use crate::model::{Model, Surrogate};
use crate::pinn::{LossComponents, variational_loss};
use crate::plot;
use crate::problem::{self, AnisotropicDiffusion, ExactSolution};
use burn::backend::NdArray;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::{ElementConversion, Tensor, TensorData};
use color_eyre::eyre::eyre;
use nalgebra::Point2;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// メッシュの読み込みからバッチテンソルの作成までをまとめたもの。
pub struct Pipeline<B: Backend> {
    pub geometry: Geometry2D,
    pub fespace: FeSpace2D,
    pub data: DataHandler2D<B>,
    pub params: BilinearTensors<B>,
}

impl<B: Backend> Pipeline<B> {
    #[tracing::instrument(name = "pipeline", skip_all)]
    pub fn build(config: &RunConfig, device: &B::Device) -> Result<Self, AssemblyError> {
        let geometry = Geometry2D::read_mesh(&config.geometry)?;
        Self::from_geometry(geometry, config, device)
    }

    pub fn from_geometry(
        geometry: Geometry2D,
        config: &RunConfig,
        device: &B::Device,
    ) -> Result<Self, AssemblyError> {
        let fespace = FeSpace2D::new(
            &geometry,
            &config.fespace,
            &problem::boundary_functions(),
            &problem::boundary_conditions(),
            &problem::rhs,
        )?;
        let data = DataHandler2D::new(&fespace, device)?;
        let params = data.bilinear_params(&AnisotropicDiffusion)?;
        Ok(Self {
            geometry,
            fespace,
            data,
            params,
        })
    }

    pub fn loss(
        &self,
        model: &impl Surrogate<B>,
        beta: f64,
    ) -> Result<LossComponents<B>, AssemblyError> {
        variational_loss(model, &self.data, &self.params, beta)
    }
}

/// 損失の内訳をスカラーとして取り出します。
fn loss_values<B: Backend>(loss: LossComponents<B>) -> (f64, f64, f64) {
    let value = |t: Tensor<B, 1>| t.into_scalar().elem::<f64>();
    (value(loss.pde), value(loss.boundary), value(loss.total))
}

fn points_tensor<B: Backend>(points: &[Point2<f64>], device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y]).collect();
    Tensor::from_data(TensorData::new(flat, [points.len(), 2]), device)
}

/// 1列の CSV として書き出します。
fn write_column(path: &Path, values: &[f64]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for value in values {
        writeln!(writer, "{value:.18e}")?;
    }
    writer.flush()
}

/// `assemble`サブコマンドを実行します。
pub fn run_assemble(config: &RunConfig) -> color_eyre::Result<()> {
    match config.model.precision {
        Precision::F32 => assemble::<NdArray<f32>>(config),
        Precision::F64 => assemble::<NdArray<f64>>(config),
    }
}

fn assemble<B: Backend>(config: &RunConfig) -> color_eyre::Result<()> {
    let device = Default::default();
    let start = Instant::now();
    let pipeline = Pipeline::<B>::build(config, &device)?;
    let data = &pipeline.data;
    let fe = pipeline.fespace.config();
    tracing::info!(
        fe_type = %fe.fe_type,
        fe_order = fe.fe_order,
        quad_type = %fe.quad_type,
        n_cells = data.n_cells(),
        n_test = data.n_test(),
        n_quad = data.n_quad(),
        n_interior = data.n_cells() * data.n_quad(),
        n_dirichlet = pipeline.fespace.dirichlet().points.len(),
        elapsed = ?start.elapsed(),
        "有限要素空間を組み立てました"
    );

    if config.output.generate_mesh_plot {
        fs::create_dir_all(&config.output.path)?;
        let path = config.output.path.join("mesh.png");
        let geometry = &pipeline.geometry;
        match plot::plot_mesh(geometry.mesh(), geometry.boundary_points(), &path) {
            Ok(()) => tracing::info!(path = %path.display(), "メッシュ図を保存しました"),
            Err(e) => tracing::warn!(error = %e, "メッシュ図の描画に失敗しました"),
        }
    }

    let (pde, boundary, total) = loss_values(pipeline.loss(&ExactSolution, config.model.beta)?);
    tracing::info!(pde, boundary, total, "厳密解に対する変分損失");
    Ok(())
}

/// `infer`サブコマンドを実行します。
///
/// ファイルから学習済みモデルを読み込み、テスト点で厳密解と比較します。
pub fn run(config: &RunConfig) -> color_eyre::Result<()> {
    match config.model.precision {
        Precision::F32 => infer::<NdArray<f32>>(config),
        Precision::F64 => infer::<NdArray<f64>>(config),
    }
}

fn infer<B: Backend>(config: &RunConfig) -> color_eyre::Result<()> {
    let device = Default::default();
    let model_path = config.model_path();
    let weights = model_path.with_extension("mpk");
    if !weights.exists() {
        return Err(eyre!(
            "モデルファイル '{}' が見つかりません。学習済みの重みを配置してください。",
            weights.display()
        ));
    }

    let inference_start = Instant::now();
    tracing::info!(path = %weights.display(), "保存済みモデルをロード中...");
    let model = Model::<B>::new(&config.model, &device)?
        .load_file(
            model_path,
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            &device,
        )
        .map_err(|e| eyre!("モデルの読み込みに失敗しました: {e:?}"))?;

    let pipeline = Pipeline::<B>::build(config, &device)?;
    let (pde, boundary, total) = loss_values(pipeline.loss(&model, config.model.beta)?);
    tracing::info!(pde, boundary, total, "読み込んだモデルの変分損失");

    let test_points = pipeline.geometry.test_points();
    let y_exact: Vec<f64> = test_points
        .iter()
        .map(|p| problem::exact_solution(p.x, p.y))
        .collect();
    let y_pred = model
        .predict(points_tensor::<B>(&test_points, &device))
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| eyre!("予測値を取り出せませんでした: {e:?}"))?;
    let error: Vec<f64> = y_pred.iter().zip(&y_exact).map(|(p, e)| p - e).collect();
    let metrics = ErrorMetrics::compute(&y_pred, &y_exact)?;
    tracing::info!(
        n_test_points = test_points.len(),
        elapsed = ?inference_start.elapsed(),
        "推論が完了しました"
    );
    tracing::info!("\n{metrics}");

    let output = config.results_dir();
    fs::create_dir_all(&output)?;
    write_column(&output.join("y_exact.csv"), &y_exact)?;
    write_column(&output.join("y_pred.csv"), &y_pred)?;
    write_column(&output.join("error.csv"), &error)?;
    let metrics_file = BufWriter::new(File::create(output.join("metrics.json"))?);
    serde_json::to_writer_pretty(metrics_file, &metrics)?;

    let plots = [
        ("Exact Solution", "exact_solution.png", &y_exact),
        ("Predicted Solution", "predicted_solution.png", &y_pred),
        ("Error", "error_plot.png", &error),
    ];
    for (title, file, values) in plots {
        if let Err(e) = plot::plot_field(&test_points, values, title, &output.join(file)) {
            tracing::warn!(error = %e, file, "グラフの描画に失敗しました");
        }
    }
    tracing::info!(path = %output.display(), "結果を保存しました");
    Ok(())
}
