use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tch::{Device, Kind, Tensor, nn, nn::ModuleT};

use super::error::{ArtifactLoadError, InferenceError};
use super::inference::Classifier;
use super::preprocess::PreprocessedTensor;
use super::resnet::{NUM_CLASSES, ResNet18};

/// Bookkeeping counters torchvision stores next to batch-norm statistics.
const IGNORED_SUFFIX: &str = ".num_batches_tracked";

/// Compute device requested in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
    Mps,
}

impl DeviceSpec {
    pub fn resolve(self) -> Device {
        match self {
            DeviceSpec::Auto => Device::cuda_if_available(),
            DeviceSpec::Cpu => Device::Cpu,
            DeviceSpec::Cuda(index) => Device::Cuda(index),
            DeviceSpec::Mps => Device::Mps,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown device '{0}', expected auto, cpu, cuda, cuda:N or mps")]
pub struct UnknownDevice(String);

impl FromStr for DeviceSpec {
    type Err = UnknownDevice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "auto" => Ok(DeviceSpec::Auto),
            "cpu" => Ok(DeviceSpec::Cpu),
            "cuda" => Ok(DeviceSpec::Cuda(0)),
            "mps" => Ok(DeviceSpec::Mps),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(DeviceSpec::Cuda)
                .ok_or_else(|| UnknownDevice(s.to_string())),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = UnknownDevice;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(spec: DeviceSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Auto => write!(f, "auto"),
            DeviceSpec::Cpu => write!(f, "cpu"),
            DeviceSpec::Cuda(index) => write!(f, "cuda:{}", index),
            DeviceSpec::Mps => write!(f, "mps"),
        }
    }
}

/// Trained ResNet-18 bound to a device, frozen for evaluation.
pub struct ModelHandle {
    vs: nn::VarStore,
    net: ResNet18,
}

impl ModelHandle {
    /// Builds the fixed architecture and fills it from `weights_path`.
    ///
    /// Loading is strict: every parameter must be present with exactly the
    /// architecture's shape, and the file may not carry extra parameters.
    pub fn load(weights_path: impl AsRef<Path>, device: Device) -> Result<Self, ArtifactLoadError> {
        let path = weights_path.as_ref();
        if !path.is_file() {
            return Err(ArtifactLoadError::NotFound(path.to_path_buf()));
        }
        check_device(device)?;

        let mut vs = nn::VarStore::new(device);
        let net = ResNet18::new(&vs.root(), NUM_CLASSES);

        let stored = read_named_tensors(path, device)?;
        debug!("Read {} tensors from {}", stored.len(), path.display());
        copy_state_dict(&vs, stored)?;
        vs.freeze();

        info!(
            "Loaded ResNet-18 ({} classes) from {} on {:?}",
            NUM_CLASSES,
            path.display(),
            device
        );
        Ok(Self { vs, net })
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }
}

/// Parameter allocation panics on a missing device, so check availability first.
fn check_device(device: Device) -> Result<(), ArtifactLoadError> {
    match device {
        Device::Cuda(index) => {
            let count = tch::Cuda::device_count();
            if (index as i64) < count {
                Ok(())
            } else {
                Err(ArtifactLoadError::DeviceUnavailable(format!(
                    "cuda:{} requested but {} CUDA device(s) visible",
                    index, count
                )))
            }
        }
        Device::Mps if !tch::utils::has_mps() => Err(ArtifactLoadError::DeviceUnavailable(
            "mps requested but this libtorch build has no MPS backend".to_string(),
        )),
        _ => Ok(()),
    }
}

fn read_named_tensors(path: &Path, device: Device) -> Result<Vec<(String, Tensor)>, ArtifactLoadError> {
    let result = match path.extension().and_then(|ext| ext.to_str()) {
        Some("safetensors") => Tensor::read_safetensors(path),
        Some("npz") => Tensor::read_npz(path),
        _ => Tensor::load_multi_with_device(path, device),
    };
    result.map_err(|source| ArtifactLoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_state_dict(vs: &nn::VarStore, stored: Vec<(String, Tensor)>) -> Result<(), ArtifactLoadError> {
    let mut stored: HashMap<String, Tensor> = stored
        .into_iter()
        .filter(|(name, _)| !name.ends_with(IGNORED_SUFFIX))
        .collect();

    let mut variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
    variables.sort_by(|a, b| a.0.cmp(&b.0));

    let mut pairs = Vec::with_capacity(variables.len());
    for (name, var) in variables {
        let src = stored
            .remove(&name)
            .ok_or_else(|| ArtifactLoadError::MissingParameter(name.clone()))?;
        if src.size() != var.size() {
            return Err(ArtifactLoadError::ShapeMismatch {
                name,
                expected: var.size(),
                found: src.size(),
            });
        }
        pairs.push((name, var, src));
    }

    if let Some(extra) = stored.keys().min() {
        return Err(ArtifactLoadError::UnexpectedParameter(extra.clone()));
    }

    for (name, mut var, src) in pairs {
        tch::no_grad(|| var.f_copy_(&src)).map_err(|source| ArtifactLoadError::Copy { name, source })?;
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "libtorch aborted the forward pass".to_string()),
    }
}

impl Classifier for ModelHandle {
    fn logits(&self, batch: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError> {
        let shape = batch.shape().map(|dim| dim as i64);
        let data = batch.to_contiguous();
        let device = self.device();

        // The infallible tch API panics on libtorch errors such as CUDA OOM.
        let output = panic::catch_unwind(AssertUnwindSafe(|| {
            tch::no_grad(|| {
                let input = Tensor::from_slice(&data[..]).view(shape).to_device(device);
                self.net
                    .forward_t(&input, false)
                    .to_device(Device::Cpu)
                    .to_kind(Kind::Float)
                    .view([-1])
            })
        }))
        .map_err(|payload| InferenceError::Device(panic_message(payload)))?;

        Ok(Vec::<f32>::try_from(&output)?)
    }

    fn device_name(&self) -> String {
        format!("{:?}", self.device())
    }
}
