//! Hobby-servo actuator driven by a PWM output.
//!
//! The servos of the rig take a 50 Hz signal whose duty cycle encodes the target
//! angle: 2 % at 0° up to 12 % at 180°. A move is a single pulse train held for a
//! short window, after which the output is released so the servo does not jitter
//! while frames are exposed.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::RigConfig;
use crate::error::ActuatorError;
use crate::hardware::capabilities::{angle_in_range, Actuator};

/// PWM carrier frequency expected by the servos.
pub const SERVO_FREQUENCY_HZ: f64 = 50.0;

/// Duty cycle (percent) that positions a servo at `angle_deg`.
pub fn duty_cycle_for(angle_deg: f64) -> f64 {
    2.0 + angle_deg / 18.0
}

/// Low-level PWM seam. Implemented over the board's GPIO library outside this crate.
#[async_trait]
pub trait PwmOutput: Send + Sync {
    /// Start PWM on `channel` at `frequency_hz` with a 0 % duty cycle.
    async fn start(&self, channel: u8, frequency_hz: f64) -> anyhow::Result<()>;

    /// Set the duty cycle of `channel` in percent.
    async fn set_duty_cycle(&self, channel: u8, percent: f64) -> anyhow::Result<()>;

    /// Stop PWM on `channel`.
    async fn stop(&self, channel: u8) -> anyhow::Result<()>;
}

/// [`Actuator`] over any [`PwmOutput`].
pub struct ServoActuator<P> {
    pwm: P,
    pulse: Duration,
}

impl<P: PwmOutput> ServoActuator<P> {
    /// `pulse` is how long the position signal is held before release.
    pub fn new(pwm: P, pulse: Duration) -> Self {
        Self { pwm, pulse }
    }

    /// Servo driven with the configured `[timing] servo_pulse`.
    pub fn from_config(pwm: P, config: &RigConfig) -> Self {
        Self::new(pwm, config.timing.servo_pulse)
    }

    /// Hold window of each move.
    pub fn pulse(&self) -> Duration {
        self.pulse
    }

    /// Underlying PWM output.
    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    async fn pulse_to(&self, channel: u8, duty: f64) -> anyhow::Result<()> {
        self.pwm.set_duty_cycle(channel, duty).await?;
        tokio::time::sleep(self.pulse).await;
        self.pwm.set_duty_cycle(channel, 0.0).await
    }
}

#[async_trait]
impl<P: PwmOutput> Actuator for ServoActuator<P> {
    async fn move_axis(&self, channel: u8, angle_deg: f64) -> Result<(), ActuatorError> {
        if !angle_in_range(angle_deg) {
            return Err(ActuatorError::OutOfRange { angle: angle_deg });
        }
        let hardware = |source: anyhow::Error| ActuatorError::Hardware { channel, source };

        let duty = duty_cycle_for(angle_deg);
        tracing::debug!(channel, angle_deg, duty, "Servo move");

        self.pwm
            .start(channel, SERVO_FREQUENCY_HZ)
            .await
            .map_err(hardware)?;

        let pulsed = self.pulse_to(channel, duty).await;
        let stopped = self.pwm.stop(channel).await;
        // the output is released even when the pulse failed
        pulsed.map_err(hardware)?;
        stopped.map_err(hardware)
    }
}
