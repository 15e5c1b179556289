//! Platform detection utilities

use std::fmt;
use std::path::{Path, PathBuf};

/// Where the cloning model runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cuda,
    Cpu,
}

impl ComputeDevice {
    /// Pick the best available compute device
    ///
    /// Checks for a loaded NVIDIA kernel driver and for `nvidia-smi` on PATH.
    pub fn detect() -> Self {
        if Path::new("/proc/driver/nvidia/version").exists() || which::which("nvidia-smi").is_ok() {
            ComputeDevice::Cuda
        } else {
            ComputeDevice::Cpu
        }
    }

    pub fn is_gpu(self) -> bool {
        self == ComputeDevice::Cuda
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cuda => write!(f, "cuda"),
            ComputeDevice::Cpu => write!(f, "cpu"),
        }
    }
}

/// Resolve a program name or path to an executable
///
/// Names without a path separator are looked up on PATH.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    which::which(program).ok()
}
