//! Rig hardware.
//!
//! - [`capabilities`]: the ports the acquisition core talks to
//! - [`servo`], [`relay`]: drivers translating ports to PWM and relay-bus writes
//! - [`mock`]: simulated ports with call journals

pub mod capabilities;
pub mod mock;
pub mod relay;
pub mod servo;

pub use capabilities::{
    Actuator, Axis, CameraControls, FrameSize, Illumination, Imager, ImagerMode,
};
pub use relay::{RelayBus, RelayIllumination};
pub use servo::{PwmOutput, ServoActuator};
