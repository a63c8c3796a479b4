/// Device where tensor memory lives and where kernels run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    /// CPU device
    Cpu,
    /// CUDA device with device ID
    Cuda {
        /// The CUDA device ID
        device_id: usize,
    },
}

/// Device family, ignoring the device ordinal.
///
/// Kernels are registered per family: a kernel registered for [`DeviceKind::Cuda`]
/// serves every CUDA ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    /// Host memory and host kernels.
    Cpu,
    /// NVIDIA GPUs.
    Cuda,
}

impl Device {
    /// Returns the device type as a string.
    pub fn device_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Returns the device family.
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Cpu => DeviceKind::Cpu,
            Device::Cuda { .. } => DeviceKind::Cuda,
        }
    }

    /// Returns the device ID if applicable.
    pub fn device_id(&self) -> Option<usize> {
        match self {
            Device::Cpu => None,
            Device::Cuda { device_id } => Some(*device_id),
        }
    }

    /// Returns true if the device is CPU.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Returns true if the device is a GPU.
    pub fn is_gpu(&self) -> bool {
        !self.is_cpu()
    }

    /// Creates a CUDA device with the specified device ID.
    pub fn cuda(device_id: usize) -> Self {
        Device::Cuda { device_id }
    }
}

impl DeviceKind {
    /// Returns the device family as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

impl From<Device> for DeviceKind {
    fn from(device: Device) -> Self {
        device.kind()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{}", device_id),
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_cpu() {
        let device = Device::Cpu;
        assert_eq!(device.device_type(), "cpu");
        assert_eq!(device.device_id(), None);
        assert!(device.is_cpu());
        assert!(!device.is_gpu());
    }

    #[test]
    fn test_device_cuda() {
        let device = Device::cuda(1);
        assert_eq!(device.device_type(), "cuda");
        assert_eq!(device.device_id(), Some(1));
        assert_eq!(device.kind(), DeviceKind::Cuda);
        assert!(device.is_gpu());
        assert_eq!(format!("{}", device), "cuda:1");
    }

    #[test]
    fn test_device_default() {
        let device = Device::default();
        assert_eq!(device, Device::Cpu);
        assert_eq!(DeviceKind::from(device), DeviceKind::Cpu);
    }
}
