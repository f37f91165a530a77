use crate::config::ModelConfig;
use crate::error::AssemblyError;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Tanh};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// 点列上での予測値と、入力座標 (x, y) に関する偏導関数。いずれも `[n, 1]`。
#[derive(Debug, Clone)]
pub struct FieldSample<B: Backend> {
    pub value: Tensor<B, 2>,
    pub grad_x: Tensor<B, 2>,
    pub grad_y: Tensor<B, 2>,
}

/// 2次元座標からスカラー場への微分可能な代理モデル。
pub trait Surrogate<B: Backend> {
    /// `[n, 2]` の座標に対する予測 `[n, 1]`。
    fn predict(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;

    /// 予測値とその空間勾配。勾配はパラメータについて微分可能でなければなりません。
    fn predict_with_gradients(&self, points: Tensor<B, 2>) -> FieldSample<B>;
}

/// PINNの本体となるニューラルネットワークモデル。
///
/// 座標(x, y)を入力とし、その点における解uを予測する多層パーセプトロン（MLP）です。
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
}

impl<B: Backend> Model<B> {
    /// 設定の層幅に従って新しいモデルを初期化します。
    ///
    /// 設定は先に検証されるので、作成されたモデルは少なくとも2つの層を持ちます。
    pub fn new(config: &ModelConfig, device: &B::Device) -> Result<Self, AssemblyError> {
        config.validate()?;
        let linears = config
            .layer_dims
            .windows(2)
            .map(|dims| LinearConfig::new(dims[0], dims[1]).init(device))
            .collect();
        Ok(Self {
            linears,
            activation: Tanh::new(),
        })
    }

    /// モデルの順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        let (last, hidden) = self.linears.split_last().expect("model has at least one layer");
        for linear in hidden {
            x = linear.forward(x);
            x = self.activation.forward(x);
        }
        last.forward(x)
    }

    /// 順伝播と同時に、入力座標に関する接ベクトルを前進モードで伝播します。
    ///
    /// 隠れ層 `a = tanh(W^T h + b)` について `da = (1 - a^2) ⊙ (W^T dh)` です。
    /// 2階の自動微分を使わないので、得られた勾配はそのまま損失に組み込めます。
    pub fn forward_with_gradients(&self, input: Tensor<B, 2>) -> FieldSample<B> {
        let (first, rest) = self.linears.split_first().expect("model has at least one layer");
        let [n, _] = input.dims();
        let ones = Tensor::<B, 2>::ones([n, 1], &input.device());
        let weight = first.weight.val();
        let [_, width] = weight.dims();
        // 1層目: d(xW + b)/dx は W の1行目、d/dy は2行目
        let mut tangent_x = ones.clone().matmul(weight.clone().slice([0..1, 0..width]));
        let mut tangent_y = ones.matmul(weight.slice([1..2, 0..width]));
        let mut h = first.forward(input);

        for linear in rest {
            let a = self.activation.forward(h);
            let slope = a.clone().mul(a.clone()).neg().add_scalar(1.0);
            let weight = linear.weight.val();
            tangent_x = tangent_x.mul(slope.clone()).matmul(weight.clone());
            tangent_y = tangent_y.mul(slope).matmul(weight);
            h = linear.forward(a);
        }

        FieldSample {
            value: h,
            grad_x: tangent_x,
            grad_y: tangent_y,
        }
    }
}

impl<B: Backend> Surrogate<B> for Model<B> {
    fn predict(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(points)
    }

    fn predict_with_gradients(&self, points: Tensor<B, 2>) -> FieldSample<B> {
        self.forward_with_gradients(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Precision;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray<f64>;

    fn config() -> ModelConfig {
        ModelConfig {
            layer_dims: vec![2, 8, 8, 1],
            activation: "tanh".to_string(),
            beta: 10.0,
            precision: Precision::F64,
        }
    }

    fn points<B: Backend>(coords: &[[f64; 2]], device: &B::Device) -> Tensor<B, 2> {
        let flat: Vec<f64> = coords.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [coords.len(), 2]), device)
    }

    #[test]
    fn single_layer_width_is_rejected() {
        let device = Default::default();
        let config = ModelConfig {
            layer_dims: vec![2],
            ..config()
        };
        let result = Model::<TestBackend>::new(&config, &device);
        assert!(matches!(result, Err(AssemblyError::Configuration(_))));
    }

    #[test]
    fn forward_with_gradients_matches_forward() {
        let device = Default::default();
        let model = Model::<TestBackend>::new(&config(), &device).unwrap();
        let input = points::<TestBackend>(&[[0.1, 0.2], [-0.5, 0.7], [0.9, -0.3]], &device);
        let plain = model.forward(input.clone());
        let sample = model.forward_with_gradients(input);
        assert_eq!(sample.value.dims(), [3, 1]);
        assert_eq!(sample.grad_x.dims(), [3, 1]);
        let diff = (plain - sample.value).abs().max().into_scalar().elem::<f64>();
        assert!(diff < 1e-14);
    }

    #[test]
    fn tangents_match_finite_differences() {
        let device = Default::default();
        let model = Model::<TestBackend>::new(&config(), &device).unwrap();
        let h = 1e-6;
        let (x, y) = (0.3, -0.4);
        let eval = |px: f64, py: f64| {
            model
                .forward(points::<TestBackend>(&[[px, py]], &device))
                .into_scalar()
                .elem::<f64>()
        };
        let sample = model.forward_with_gradients(points::<TestBackend>(&[[x, y]], &device));
        let gx = sample.grad_x.into_scalar().elem::<f64>();
        let gy = sample.grad_y.into_scalar().elem::<f64>();
        let fd_x = (eval(x + h, y) - eval(x - h, y)) / (2.0 * h);
        let fd_y = (eval(x, y + h) - eval(x, y - h)) / (2.0 * h);
        assert!((gx - fd_x).abs() < 1e-7, "{gx} vs {fd_x}");
        assert!((gy - fd_y).abs() < 1e-7, "{gy} vs {fd_y}");
    }

    #[test]
    fn spatial_gradients_are_differentiable_in_parameters() {
        type AutodiffBackend = Autodiff<TestBackend>;
        let device = Default::default();
        let model = Model::<AutodiffBackend>::new(&config(), &device).unwrap();
        let input = points::<AutodiffBackend>(&[[0.1, 0.2], [-0.5, 0.7]], &device);
        let sample = model.forward_with_gradients(input);
        let loss = sample.grad_x.powf_scalar(2.0).sum() + sample.grad_y.powf_scalar(2.0).sum();
        let grads = loss.backward();
        let first_weight = model.linears[0].weight.val().grad(&grads);
        assert!(first_weight.is_some());
    }
}
