//! LED illumination through an I2C relay board.
//!
//! The board energizes a relay when its register is written `0` and releases it
//! on `1`. [`RelayIllumination`] hides that inversion behind the plain
//! `on`/`off` of the [`Illumination`] port.

use async_trait::async_trait;

use crate::config::RigConfig;
use crate::error::BusError;
use crate::hardware::capabilities::Illumination;

/// Default I2C address of the relay controller.
pub const DEFAULT_RELAY_DEVICE: u8 = 0x08;

const RELAY_ENERGIZE: u8 = 0;
const RELAY_RELEASE: u8 = 1;

/// Low-level bus seam: block write of `data` to `register` of `device`.
#[async_trait]
pub trait RelayBus: Send + Sync {
    /// Write `data` to `register` of the device at `device`.
    async fn write_block(&self, device: u8, register: u8, data: &[u8]) -> anyhow::Result<()>;
}

/// [`Illumination`] over any [`RelayBus`].
pub struct RelayIllumination<B> {
    bus: B,
    device: u8,
}

impl<B: RelayBus> RelayIllumination<B> {
    /// Relay board at I2C address `device`.
    pub fn new(bus: B, device: u8) -> Self {
        Self { bus, device }
    }

    /// Relay board at the configured `[illumination] bus_address`.
    pub fn from_config(bus: B, config: &RigConfig) -> Self {
        Self::new(bus, config.illumination.bus_address)
    }

    /// I2C address of the relay board.
    pub fn device(&self) -> u8 {
        self.device
    }

    /// Underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }
}

#[async_trait]
impl<B: RelayBus> Illumination for RelayIllumination<B> {
    async fn set_channel(&self, address: u8, on: bool) -> Result<(), BusError> {
        let level = if on { RELAY_ENERGIZE } else { RELAY_RELEASE };
        tracing::debug!(device = self.device, address, on, "Relay write");
        self.bus
            .write_block(self.device, address, &[level])
            .await
            .map_err(|source| BusError { address, source })
    }
}
