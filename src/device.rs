//! Compute-device selection and data layout resolution.
//!
//! The device is chosen exactly once at startup from an injected
//! [`DeviceProbe`]. The resulting [`RunContext`] carries both the device and
//! the resolved [`DataLayout`] (which differs between host and accelerator
//! runs when `cpu_data_subdir` is configured), and is passed explicitly to
//! corpus assembly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::keypoints::ClassLabel;

// ---------------------------------------------------------------------------
// ComputeDevice
// ---------------------------------------------------------------------------

/// Device on which the classifier's numeric work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeDevice {
    /// General-purpose CPU.
    Cpu,
    /// CUDA accelerator with the given ordinal.
    Cuda(usize),
}

impl ComputeDevice {
    /// `true` for accelerator devices.
    pub fn is_accelerator(&self) -> bool {
        matches!(self, ComputeDevice::Cuda(_))
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

#[cfg(feature = "tch-backend")]
impl From<ComputeDevice> for tch::Device {
    fn from(d: ComputeDevice) -> Self {
        match d {
            ComputeDevice::Cpu => tch::Device::Cpu,
            ComputeDevice::Cuda(id) => tch::Device::Cuda(id),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceProbe
// ---------------------------------------------------------------------------

/// Capability query for available accelerators.
pub trait DeviceProbe {
    /// Number of usable CUDA devices.
    fn cuda_device_count(&self) -> usize;
}

/// Probe that asks the linked tensor runtime.
///
/// Without the `tch-backend` feature no accelerator runtime is linked and the
/// probe always reports zero devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    #[cfg(feature = "tch-backend")]
    fn cuda_device_count(&self) -> usize {
        usize::try_from(tch::Cuda::device_count()).unwrap_or(0)
    }

    #[cfg(not(feature = "tch-backend"))]
    fn cuda_device_count(&self) -> usize {
        0
    }
}

/// Probe returning a fixed device count. Useful in tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub usize);

impl DeviceProbe for FixedProbe {
    fn cuda_device_count(&self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// DataLayout
// ---------------------------------------------------------------------------

/// Directories of one camera source, one per class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSource {
    /// Camera name (e.g. `cam1`).
    pub name: String,
    /// Directory holding violent keypoint files.
    pub violent: PathBuf,
    /// Directory holding non-violent keypoint files.
    pub non_violent: PathBuf,
}

impl CameraSource {
    /// Directory for the given class label.
    pub fn dir_for(&self, label: ClassLabel) -> &PathBuf {
        match label {
            ClassLabel::Violent => &self.violent,
            ClassLabel::NonViolent => &self.non_violent,
        }
    }
}

/// Resolved on-disk locations of every camera source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    /// Root data directory.
    pub data_dir: PathBuf,
    /// Camera sources in processing order.
    pub cameras: Vec<CameraSource>,
}

impl DataLayout {
    /// Build the layout `<data_dir>/<class_dir>/<camera>[/<cpu_data_subdir>]`.
    ///
    /// The CPU sub-directory is only appended when `device` is the CPU.
    pub fn resolve(config: &TrainingConfig, device: ComputeDevice) -> Self {
        let host_subdir = match device {
            ComputeDevice::Cpu => config.cpu_data_subdir.as_deref(),
            ComputeDevice::Cuda(_) => None,
        };
        let camera_dir = |class_dir: &str, camera: &str| {
            let mut p = config.data_dir.join(class_dir).join(camera);
            if let Some(sub) = host_subdir {
                p.push(sub);
            }
            p
        };
        let cameras = config
            .cameras
            .iter()
            .map(|cam| CameraSource {
                name: cam.clone(),
                violent: camera_dir(&config.violent_dir, cam),
                non_violent: camera_dir(&config.non_violent_dir, cam),
            })
            .collect();
        DataLayout { data_dir: config.data_dir.clone(), cameras }
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Startup-resolved execution context: device plus data layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Device selected for the whole run.
    pub device: ComputeDevice,
    /// Data locations for this device.
    pub layout: DataLayout,
}

impl RunContext {
    /// Query `probe` once and build the context for `config`.
    ///
    /// An accelerator is only selected when `use_gpu` is set and the probe
    /// reports a device with the requested ordinal; otherwise the run falls
    /// back to the CPU with a warning.
    pub fn resolve(config: &TrainingConfig, probe: &dyn DeviceProbe) -> Self {
        let available = probe.cuda_device_count();
        let device = if config.use_gpu {
            if config.gpu_device_id < available {
                ComputeDevice::Cuda(config.gpu_device_id)
            } else {
                warn!(
                    "GPU requested (device {}) but {} CUDA device(s) available; using CPU",
                    config.gpu_device_id, available
                );
                ComputeDevice::Cpu
            }
        } else {
            ComputeDevice::Cpu
        };
        info!("Using device: {device}");
        RunContext { device, layout: DataLayout::resolve(config, device) }
    }
}
