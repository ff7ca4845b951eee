use candle_core::Device;
use tracing::info;

/// Metal when the `metal` feature is on and a GPU is present, CPU otherwise.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!(device = "metal", "Selected compute device");
            return dev;
        }
    }
    info!(device = "cpu", "Selected compute device");
    Device::Cpu
}
