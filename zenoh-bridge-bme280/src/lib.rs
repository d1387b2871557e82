//! Zenoh telemetry agent for the BME280 environmental sensor.
//!
//! This agent samples temperature and humidity from a BME280 on the local
//! I2C bus (or from a simulated source) and publishes each reading to
//! Zenoh on a fixed cadence. Transient connectivity failures drop the
//! affected message and the loop carries on; anything else is fatal.
//!
//! # Key Expressions
//!
//! ```text
//! enviropub/bme280/<device_id>          telemetry documents
//! enviropub/bme280/@/status             agent running/offline status
//! ```

pub mod channel;
pub mod config;
pub mod publish;
pub mod sensor;
pub mod status;
