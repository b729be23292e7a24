// Runtime status codes
//
// Mirrors the native result codes that can surface from the driver.
// Contract violations are not represented here: they panic.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Status {
    #[error("not ready")]
    NotReady,
    #[error("timeout")]
    Timeout,
    #[error("out of host memory")]
    OutOfHostMemory,
    #[error("out of device memory")]
    OutOfDeviceMemory,
    #[error("initialization failed")]
    InitializationFailed,
    #[error("device lost")]
    DeviceLost,
    #[error("memory map failed")]
    MemoryMapFailed,
    #[error("layer not present")]
    LayerNotPresent,
    #[error("extension not present")]
    ExtensionNotPresent,
    #[error("feature not present")]
    FeatureNotPresent,
    #[error("incompatible driver")]
    IncompatibleDriver,
    #[error("too many objects")]
    TooManyObjects,
    #[error("format not supported")]
    FormatNotSupported,
    #[error("fragmented pool")]
    FragmentedPool,
    #[error("out of pool memory")]
    OutOfPoolMemory,
    #[error("surface lost")]
    SurfaceLost,
    #[error("native window in use")]
    NativeWindowInUse,
    #[error("swapchain suboptimal")]
    Suboptimal,
    #[error("swapchain out of date")]
    OutOfDate,
    #[error("unknown driver error ({0})")]
    Unknown(i32),
}

impl From<vk::Result> for Status {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::NOT_READY => Status::NotReady,
            vk::Result::TIMEOUT => Status::Timeout,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Status::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Status::OutOfDeviceMemory,
            vk::Result::ERROR_INITIALIZATION_FAILED => Status::InitializationFailed,
            vk::Result::ERROR_DEVICE_LOST => Status::DeviceLost,
            vk::Result::ERROR_MEMORY_MAP_FAILED => Status::MemoryMapFailed,
            vk::Result::ERROR_LAYER_NOT_PRESENT => Status::LayerNotPresent,
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => Status::ExtensionNotPresent,
            vk::Result::ERROR_FEATURE_NOT_PRESENT => Status::FeatureNotPresent,
            vk::Result::ERROR_INCOMPATIBLE_DRIVER => Status::IncompatibleDriver,
            vk::Result::ERROR_TOO_MANY_OBJECTS => Status::TooManyObjects,
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED => Status::FormatNotSupported,
            vk::Result::ERROR_FRAGMENTED_POOL => Status::FragmentedPool,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY => Status::OutOfPoolMemory,
            vk::Result::ERROR_SURFACE_LOST_KHR => Status::SurfaceLost,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => Status::NativeWindowInUse,
            vk::Result::SUBOPTIMAL_KHR => Status::Suboptimal,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Status::OutOfDate,
            other => Status::Unknown(other.as_raw()),
        }
    }
}

impl From<gpu_allocator::AllocationError> for Status {
    fn from(error: gpu_allocator::AllocationError) -> Self {
        match error {
            gpu_allocator::AllocationError::OutOfMemory => Status::OutOfDeviceMemory,
            gpu_allocator::AllocationError::FailedToMap(_) => Status::MemoryMapFailed,
            _ => Status::InitializationFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Status>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_swapchain_results() {
        assert_eq!(Status::from(vk::Result::ERROR_OUT_OF_DATE_KHR), Status::OutOfDate);
        assert_eq!(Status::from(vk::Result::SUBOPTIMAL_KHR), Status::Suboptimal);
        assert_eq!(
            Status::from(vk::Result::ERROR_VALIDATION_FAILED_EXT),
            Status::Unknown(vk::Result::ERROR_VALIDATION_FAILED_EXT.as_raw())
        );
    }
}
