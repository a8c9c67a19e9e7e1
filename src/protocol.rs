//! Angle protocols.
//!
//! Operators type the angles an axis should visit as text, in one of three forms:
//!
//! - `begin-end-step`: an inclusive range, `0-90-10` gives `0, 10, ..., 90`
//! - `a,b,c`: an explicit list
//! - `a b c`: the same list separated by whitespace
//!
//! The parser does not clamp to the servo range. Angles outside it are rejected by
//! the sequencer when it tries to move there.

use std::fmt;
use std::str::FromStr;

use crate::error::{AppResult, HyperPiError};

/// Upper bound on the angles a range may expand to.
pub const MAX_RANGE_ANGLES: usize = 1_000_000;

/// Ordered angle sequence in degrees. Duplicates are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleProtocol {
    angles: Vec<f64>,
}

impl AngleProtocol {
    /// The only polarizer protocol the capture sequence supports.
    pub const DUAL_POLARIZATION: [f64; 2] = [0.0, 90.0];

    /// Parse a textual protocol, see [`parse_angles`].
    pub fn parse(input: &str) -> AppResult<Self> {
        parse_angles(input).map(|angles| Self { angles })
    }

    /// Wrap an already expanded sequence.
    pub fn from_angles(angles: Vec<f64>) -> Self {
        Self { angles }
    }

    /// Angles in visiting order.
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// Number of angles.
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    /// True when no angle is listed.
    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// True for exactly `[0.0, 90.0]`: copolarized then depolarized.
    pub fn is_dual_polarization(&self) -> bool {
        self.angles == Self::DUAL_POLARIZATION
    }
}

impl FromStr for AngleProtocol {
    type Err = HyperPiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AngleProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.angles.iter().map(|a| format!("{a:?}")).collect();
        f.write_str(&parts.join(","))
    }
}

/// Parse a textual angle protocol into its angle sequence.
pub fn parse_angles(input: &str) -> AppResult<Vec<f64>> {
    let text = input.trim();
    let malformed = |reason: String| HyperPiError::MalformedProtocol {
        input: input.to_string(),
        reason,
    };

    if text.is_empty() {
        return Err(malformed("empty protocol".to_string()));
    }

    if text.contains('-') {
        let bounds = text
            .split('-')
            .map(|t| parse_token(t).map_err(malformed))
            .collect::<AppResult<Vec<f64>>>()?;
        let &[begin, end, step] = bounds.as_slice() else {
            return Err(malformed(format!(
                "range needs begin-end-step, found {} values",
                bounds.len()
            )));
        };
        return expand_range(begin, end, step).map_err(malformed);
    }

    let tokens: Vec<&str> = if text.contains(',') {
        text.split(',').collect()
    } else {
        text.split_whitespace().collect()
    };
    tokens
        .into_iter()
        .map(|t| parse_token(t).map_err(malformed))
        .collect()
}

fn parse_token(token: &str) -> Result<f64, String> {
    let token = token.trim();
    token
        .parse::<f64>()
        .map_err(|_| format!("'{token}' is not a number"))
}

fn expand_range(begin: f64, end: f64, step: f64) -> Result<Vec<f64>, String> {
    if step == 0.0 {
        return Err("range step must not be zero".to_string());
    }
    let span = ((end - begin) / step).floor();
    if !span.is_finite() || span < 0.0 {
        return Err(format!(
            "step {step} never reaches {end} from {begin}"
        ));
    }
    if span >= MAX_RANGE_ANGLES as f64 {
        return Err(format!(
            "range {begin}-{end}-{step} expands to more than {MAX_RANGE_ANGLES} angles"
        ));
    }
    let count = span as usize + 1;
    Ok((0..count).map(|i| begin + step * i as f64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive() {
        assert_eq!(
            parse_angles("0-90-10").unwrap(),
            vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0]
        );
    }

    #[test]
    fn range_stops_before_overshooting() {
        assert_eq!(parse_angles("0-45-20").unwrap(), vec![0.0, 20.0, 40.0]);
        assert_eq!(parse_angles(" 10 - 10 - 5 ").unwrap(), vec![10.0]);
    }

    #[test]
    fn comma_list_is_verbatim() {
        assert_eq!(parse_angles("0,90").unwrap(), vec![0.0, 90.0]);
        assert_eq!(parse_angles("30, 10 ,30").unwrap(), vec![30.0, 10.0, 30.0]);
    }

    #[test]
    fn whitespace_list() {
        assert_eq!(parse_angles("0 45\t90").unwrap(), vec![0.0, 45.0, 90.0]);
    }

    #[test]
    fn no_clamping() {
        assert_eq!(parse_angles("200 500").unwrap(), vec![200.0, 500.0]);
    }

    #[test]
    fn zero_step_is_malformed() {
        let err = parse_angles("0-90-0").unwrap_err();
        assert!(matches!(err, HyperPiError::MalformedProtocol { .. }));
    }

    #[test]
    fn short_range_is_malformed() {
        assert!(parse_angles("0-90").is_err());
        assert!(parse_angles("0-90-10-5").is_err());
    }

    #[test]
    fn backwards_range_is_malformed() {
        assert!(parse_angles("90-0-10").is_err());
        assert!(parse_angles("90-0--10").is_err());
    }

    #[test]
    fn oversized_range_is_malformed() {
        for input in ["0-1e19-1", "0-1e30-1", "0-180-0.0000001"] {
            let err = parse_angles(input).unwrap_err();
            assert!(matches!(err, HyperPiError::MalformedProtocol { .. }), "{input}");
        }
        let largest = parse_angles("0-999999-1").unwrap();
        assert_eq!(largest.len(), MAX_RANGE_ANGLES);
    }

    #[test]
    fn non_numeric_token_is_malformed() {
        assert!(parse_angles("0,ninety").is_err());
        assert!(parse_angles("0,,90").is_err());
        assert!(parse_angles("   ").is_err());
    }

    #[test]
    fn dual_polarization_detection() {
        assert!(AngleProtocol::parse("0,90").unwrap().is_dual_polarization());
        assert!(AngleProtocol::parse("0 90").unwrap().is_dual_polarization());
        assert!(AngleProtocol::parse("0-90-90").unwrap().is_dual_polarization());
        assert!(!AngleProtocol::parse("90,0").unwrap().is_dual_polarization());
        assert!(!AngleProtocol::parse("0,45,90").unwrap().is_dual_polarization());
    }

    #[test]
    fn display_round_trips() {
        let protocol: AngleProtocol = "0,22.5,45".parse().unwrap();
        assert_eq!(protocol.to_string(), "0.0,22.5,45.0");
        assert_eq!(AngleProtocol::parse(&protocol.to_string()).unwrap(), protocol);
    }
}
