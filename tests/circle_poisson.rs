//! 単位円板の四角形メッシュ上で、組み立てから損失評価までを通して確認します。

use burn::backend::NdArray;
use burn::prelude::Backend;
use burn::tensor::ElementConversion;
use vpinn::AssemblyError;
use vpinn::config::RunConfig;
use vpinn::fespace::FeSpace2D;
use vpinn::geometry::Geometry2D;
use vpinn::inference::Pipeline;
use vpinn::problem::{self, ExactSolution};

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
const MESH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/support_files/circle_quad.mesh");

fn config() -> RunConfig {
    let mut config = RunConfig::load(CONFIG).unwrap();
    config.geometry.mesh_file = MESH.into();
    config
}

fn pipeline<B: Backend>(config: &RunConfig) -> Pipeline<B> {
    Pipeline::build(config, &Default::default()).unwrap()
}

#[test]
fn interior_points_are_cells_times_quadrature_points() {
    let pipeline = pipeline::<NdArray<f64>>(&config());
    let data = &pipeline.data;
    assert_eq!(data.n_cells(), 64);
    assert_eq!(data.n_quad(), 100);
    assert_eq!(data.n_test(), 25);
    assert_eq!(data.x_pde_list().dims(), [64 * 100, 2]);
    assert_eq!(data.interior_points().len(), 64 * 100);
    assert_eq!(data.grad_x_mat().dims(), [64, 25, 100]);
    assert_eq!(data.forcing().dims(), [64, 25, 1]);
    assert_eq!(pipeline.params["eps"].dims(), [64, 100, 1]);
}

#[test]
fn exact_solution_loss_is_near_zero() {
    let config = config();
    let pipeline = pipeline::<NdArray<f64>>(&config);
    let loss = pipeline.loss(&ExactSolution, config.model.beta).unwrap();
    let pde = loss.pde.into_scalar().elem::<f64>();
    let total = loss.total.into_scalar().elem::<f64>();
    assert!(pde < 1e-4, "pde loss {pde}");
    assert!(total < 1e-4, "total loss {total}");
}

#[test]
fn exact_solution_loss_is_near_zero_in_single_precision() {
    let config = config();
    let pipeline = pipeline::<NdArray<f32>>(&config);
    let loss = pipeline.loss(&ExactSolution, config.model.beta).unwrap();
    let total = loss.total.into_scalar().elem::<f64>();
    assert!(total < 1e-4, "total loss {total}");
}

#[test]
fn dirichlet_inputs_and_targets_are_aligned() {
    let pipeline = pipeline::<NdArray<f64>>(&config());
    let (input, target) = pipeline.data.get_dirichlet_input();
    let [n_input, _] = input.dims();
    let [n_target, _] = target.dims();
    assert_eq!(n_input, n_target);
    // 4境界 x 8辺 x 2^4点
    assert_eq!(n_input, 4 * 8 * 16);

    let dirichlet = pipeline.fespace.dirichlet();
    for (p, value) in dirichlet.points.iter().zip(&dirichlet.values) {
        assert_eq!(*value, problem::exact_solution(p.x, p.y));
    }
}

#[test]
fn test_points_lie_inside_the_disk() {
    let pipeline = pipeline::<NdArray<f64>>(&config());
    let points = pipeline.geometry.test_points();
    // 100 x 100 の格子のうち、円に内接する多角形の内側
    assert!(points.len() > 7000 && points.len() < 7900, "{}", points.len());
    assert!(points.iter().all(|p| p.x * p.x + p.y * p.y <= 1.0 + 1e-9));
}

#[test]
fn missing_boundary_function_names_the_boundary() {
    let config = config();
    let geometry = Geometry2D::read_mesh(&config.geometry).unwrap();
    let mut functions = problem::boundary_functions();
    functions.remove(&problem::TOP);
    let err = FeSpace2D::new(
        &geometry,
        &config.fespace,
        &functions,
        &problem::boundary_conditions(),
        &problem::rhs,
    )
    .unwrap_err();
    assert!(matches!(err, AssemblyError::MissingBoundaryFunction(id) if id == problem::TOP));
    assert!(err.to_string().contains("1002"));
}

#[test]
fn non_dirichlet_condition_is_rejected() {
    let config = config();
    let geometry = Geometry2D::read_mesh(&config.geometry).unwrap();
    let mut conditions = problem::boundary_conditions();
    conditions.insert(problem::RIGHT, "neumann".to_string());
    let err = FeSpace2D::new(
        &geometry,
        &config.fespace,
        &problem::boundary_functions(),
        &conditions,
        &problem::rhs,
    )
    .unwrap_err();
    assert!(matches!(err, AssemblyError::UnsupportedBoundaryCondition { .. }));
    assert!(err.to_string().contains("1001"));
}

#[test]
fn refinement_quadruples_the_cells() {
    let mut config = config();
    config.geometry.refinement_level = 1;
    let pipeline = pipeline::<NdArray<f64>>(&config);
    assert_eq!(pipeline.data.n_cells(), 256);
    assert_eq!(pipeline.fespace.dirichlet().points.len(), 4 * 16 * 16);
}

#[test]
fn assembly_is_reproducible() {
    let config = config();
    let first = pipeline::<NdArray<f64>>(&config);
    let second = pipeline::<NdArray<f64>>(&config);
    assert_eq!(first.fespace.arena().grad_x(), second.fespace.arena().grad_x());
    assert_eq!(first.fespace.arena().forcing(), second.fespace.arena().forcing());
    assert_eq!(first.fespace.dirichlet().points, second.fespace.dirichlet().points);
}
