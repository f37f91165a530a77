//! # 変分物理情報ニューラルネットワーク (VPINN) ライブラリ
//!
//! 四角形メッシュ上で有限要素法の求積・基底・座標変換を前計算し、
//! `burn` のモデルが消費できるバッチテンソルと弱形式の損失関数を提供します。
//!
//! 組み立ての流れ:
//!
//! 1. [`geometry::Geometry2D`] がメッシュを読み込み、境界点とテスト点を用意する
//! 2. [`fespace::FeSpace2D`] がセルごとに求積点・基底勾配・外力ベクトルを組み立てる
//! 3. [`datahandler::DataHandler2D`] がそれらを `[n_cells, n_test, n_quad]` のテンソルにまとめる
//! 4. [`pinn::variational_loss`] がモデルの予測から損失を計算する

pub mod basis;
pub mod cli;
pub mod config;
pub mod datahandler;
pub mod error;
pub mod fespace;
pub mod geometry;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod pinn;
pub mod plot;
pub mod problem;
pub mod quadrature;
pub mod telemetry;
pub mod transformation;

pub use error::{AssemblyError, MeshError};
