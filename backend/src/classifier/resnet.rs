//! ResNet-18 with a two-way classification head.
//!
//! Parameter names follow torchvision's `state_dict` keys so exported
//! PyTorch weights load without renaming.

use tch::{Tensor, nn, nn::ModuleT};

/// Width of the pooled feature vector feeding `fc`.
pub const FEATURE_WIDTH: i64 = 512;
/// Output units of the replaced `fc` layer, one per class.
pub const NUM_CLASSES: i64 = 2;

fn conv2d(p: nn::Path, c_in: i64, c_out: i64, ksize: i64, padding: i64, stride: i64) -> nn::Conv2D {
    let cfg = nn::ConvConfig {
        stride,
        padding,
        bias: false,
        ..Default::default()
    };
    nn::conv2d(p, c_in, c_out, ksize, cfg)
}

#[derive(Debug)]
struct BasicBlock {
    conv1: nn::Conv2D,
    bn1: nn::BatchNorm,
    conv2: nn::Conv2D,
    bn2: nn::BatchNorm,
    downsample: Option<(nn::Conv2D, nn::BatchNorm)>,
}

impl BasicBlock {
    fn new(p: &nn::Path, c_in: i64, c_out: i64, stride: i64) -> Self {
        let downsample = if stride != 1 || c_in != c_out {
            let ds = p / "downsample";
            Some((
                conv2d(&ds / "0", c_in, c_out, 1, 0, stride),
                nn::batch_norm2d(&ds / "1", c_out, Default::default()),
            ))
        } else {
            None
        };
        Self {
            conv1: conv2d(p / "conv1", c_in, c_out, 3, 1, stride),
            bn1: nn::batch_norm2d(p / "bn1", c_out, Default::default()),
            conv2: conv2d(p / "conv2", c_out, c_out, 3, 1, 1),
            bn2: nn::batch_norm2d(p / "bn2", c_out, Default::default()),
            downsample,
        }
    }
}

impl ModuleT for BasicBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = xs
            .apply(&self.conv1)
            .apply_t(&self.bn1, train)
            .relu()
            .apply(&self.conv2)
            .apply_t(&self.bn2, train);
        let shortcut = match &self.downsample {
            Some((conv, bn)) => xs.apply(conv).apply_t(bn, train),
            None => xs.shallow_clone(),
        };
        (ys + shortcut).relu()
    }
}

#[derive(Debug)]
pub struct ResNet18 {
    conv1: nn::Conv2D,
    bn1: nn::BatchNorm,
    blocks: Vec<BasicBlock>,
    fc: nn::Linear,
}

impl ResNet18 {
    /// Registers every parameter under `p` with freshly initialised values.
    pub fn new(p: &nn::Path, num_classes: i64) -> Self {
        let widths = [(64, 64, 1), (64, 128, 2), (128, 256, 2), (256, FEATURE_WIDTH, 2)];
        let mut blocks = Vec::with_capacity(8);
        for (i, (c_in, c_out, stride)) in widths.into_iter().enumerate() {
            let layer = p / format!("layer{}", i + 1);
            blocks.push(BasicBlock::new(&(&layer / "0"), c_in, c_out, stride));
            blocks.push(BasicBlock::new(&(&layer / "1"), c_out, c_out, 1));
        }
        Self {
            conv1: conv2d(p / "conv1", 3, 64, 7, 3, 2),
            bn1: nn::batch_norm2d(p / "bn1", 64, Default::default()),
            blocks,
            fc: nn::linear(p / "fc", FEATURE_WIDTH, num_classes, Default::default()),
        }
    }
}

impl ModuleT for ResNet18 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut ys = xs
            .apply(&self.conv1)
            .apply_t(&self.bn1, train)
            .relu()
            .max_pool2d([3, 3], [2, 2], [1, 1], [1, 1], false);
        for block in &self.blocks {
            ys = ys.apply_t(block, train);
        }
        ys.adaptive_avg_pool2d([1, 1]).flat_view().apply(&self.fc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn registers_torchvision_parameter_names() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _net = ResNet18::new(&vs.root(), NUM_CLASSES);
        let vars = vs.variables();

        for name in [
            "conv1.weight",
            "bn1.running_mean",
            "layer1.0.conv1.weight",
            "layer2.0.downsample.0.weight",
            "layer4.1.bn2.running_var",
            "fc.weight",
            "fc.bias",
        ] {
            assert!(vars.contains_key(name), "missing {name}");
        }
        assert!(!vars.contains_key("layer1.0.downsample.0.weight"));
        assert_eq!(vars["fc.weight"].size(), vec![NUM_CLASSES, FEATURE_WIDTH]);
    }

    #[test]
    fn forward_produces_one_row_of_two_logits() {
        let vs = nn::VarStore::new(Device::Cpu);
        let net = ResNet18::new(&vs.root(), NUM_CLASSES);
        let xs = Tensor::zeros([1, 3, 224, 224], (Kind::Float, Device::Cpu));
        let ys = tch::no_grad(|| net.forward_t(&xs, false));
        assert_eq!(ys.size(), vec![1, NUM_CLASSES]);
    }
}
