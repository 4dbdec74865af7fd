//! Linux I2C transport for the hardware source

use ads_core::bus::BlockingI2cBus;
use linux_embedded_hal::I2cdev;
use log::info;
use thiserror_no_std::Error;

/// Device bound to the ADS1115 address on a Linux I2C character device.
pub type LinuxBus = BlockingI2cBus<I2cdev>;

#[derive(Error, Debug)]
#[error("could not open I2C bus {path}: {details}")]
pub struct OpenBusError {
    pub path: String,
    pub details: String,
}

/// Device path for a configured bus: a bare number `N` means `/dev/i2c-N`.
pub fn device_path(bus: &str) -> String {
    let bus = bus.trim();
    if !bus.is_empty() && bus.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/i2c-{bus}")
    } else {
        bus.to_string()
    }
}

pub fn open(bus: &str, address: u8) -> Result<LinuxBus, OpenBusError> {
    let path = device_path(bus);
    let i2c = I2cdev::new(&path).map_err(|e| OpenBusError {
        path: path.clone(),
        details: e.to_string(),
    })?;

    info!("Opened {} for device 0x{:02X}", path, address);
    Ok(BlockingI2cBus::new(i2c, address))
}
