//! Control records persisted next to every dataset.
//!
//! A record is an ordered list of typed key/value pairs. On disk each entry is one
//! line `<key>\t<value>\t<tag>`, where the tag is one of `Int`, `Float`, `String`,
//! `List` or `Tuple`. Decoding splits on any whitespace, so keys and values never
//! contain whitespace: the encoder refuses them instead of writing a file that
//! cannot be read back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppResult, HyperPiError};
use crate::hardware::capabilities::{CameraControls, FrameSize};

/// Key of the frame width entry.
pub const WIDTH: &str = "Width";
/// Key of the frame height entry.
pub const HEIGHT: &str = "Height";
/// Key of the exposure time entry, microseconds.
pub const EXPOSURE_TIME: &str = "ExposureTime";
/// Key of the analogue gain entry, dB.
pub const ANALOGUE_GAIN: &str = "AnalogueGain";

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Integer, written without a decimal point.
    Int(i64),
    /// Float, always written with a decimal point.
    Float(f64),
    /// Whitespace-free string.
    String(String),
    /// Bracketed list `[a,b]`.
    List(Vec<MetadataValue>),
    /// Parenthesized tuple `(a,b)`.
    Tuple(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Tag written in the third column.
    pub fn tag(&self) -> &'static str {
        match self {
            MetadataValue::Int(_) => "Int",
            MetadataValue::Float(_) => "Float",
            MetadataValue::String(_) => "String",
            MetadataValue::List(_) => "List",
            MetadataValue::Tuple(_) => "Tuple",
        }
    }

    /// Numeric view of the value. Ints widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(v) => Some(*v as f64),
            MetadataValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn encode(&self, nested: bool) -> AppResult<String> {
        match self {
            MetadataValue::Int(v) => Ok(v.to_string()),
            MetadataValue::Float(v) => {
                if !v.is_finite() {
                    return Err(HyperPiError::InvalidMetadata(format!(
                        "non-finite float {v}"
                    )));
                }
                // Debug keeps a fractional digit ("1.0"), so the text decodes as Float
                Ok(format!("{v:?}"))
            }
            MetadataValue::String(s) => {
                if s.is_empty() || s.chars().any(char::is_whitespace) {
                    return Err(HyperPiError::InvalidMetadata(format!(
                        "string {s:?} is empty or contains whitespace"
                    )));
                }
                if nested {
                    if s.contains(|c| matches!(c, ',' | '\'' | '[' | ']' | '(' | ')')) {
                        return Err(HyperPiError::InvalidMetadata(format!(
                            "string {s:?} cannot be stored inside a collection"
                        )));
                    }
                    Ok(format!("'{s}'"))
                } else {
                    Ok(s.clone())
                }
            }
            MetadataValue::List(items) => Self::encode_items(items, nested, '[', ']'),
            MetadataValue::Tuple(items) => Self::encode_items(items, nested, '(', ')'),
        }
    }

    fn encode_items(
        items: &[MetadataValue],
        nested: bool,
        open: char,
        close: char,
    ) -> AppResult<String> {
        if nested {
            return Err(HyperPiError::InvalidMetadata(
                "nested collections are not supported".to_string(),
            ));
        }
        let parts = items
            .iter()
            .map(|item| item.encode(true))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(format!("{open}{}{close}", parts.join(",")))
    }

    fn decode(text: &str, tag: &str) -> Result<Self, String> {
        match tag {
            "Int" => text
                .parse::<i64>()
                .map(MetadataValue::Int)
                .map_err(|e| format!("'{text}' is not an Int: {e}")),
            "Float" => text
                .parse::<f64>()
                .map(MetadataValue::Float)
                .map_err(|e| format!("'{text}' is not a Float: {e}")),
            "String" => Ok(MetadataValue::String(text.to_string())),
            "List" => Self::decode_items(text, '[', ']').map(MetadataValue::List),
            "Tuple" => Self::decode_items(text, '(', ')').map(MetadataValue::Tuple),
            other => Err(format!("unknown type tag '{other}'")),
        }
    }

    fn decode_items(text: &str, open: char, close: char) -> Result<Vec<MetadataValue>, String> {
        let inner = text
            .strip_prefix(open)
            .and_then(|t| t.strip_suffix(close))
            .ok_or_else(|| format!("'{text}' is not delimited by {open}{close}"))?;
        if inner.is_empty() {
            return Ok(Vec::new());
        }
        inner
            .split(',')
            .map(|item| {
                if item.is_empty() {
                    return Err(format!("empty element in '{text}'"));
                }
                Ok(Self::decode_element(item))
            })
            .collect()
    }

    fn decode_element(item: &str) -> MetadataValue {
        if let Ok(v) = item.parse::<i64>() {
            return MetadataValue::Int(v);
        }
        if let Ok(v) = item.parse::<f64>() {
            return MetadataValue::Float(v);
        }
        let unquoted = item.trim_matches(|c| c == '\'' || c == '"');
        MetadataValue::String(unquoted.to_string())
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode(false) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// Ordered key/value control record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    entries: Vec<(String, MetadataValue)>,
}

impl MetadataRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record describing a capture: frame geometry followed by every camera control.
    ///
    /// Booleans are stored as `Int` 0/1.
    pub fn from_capture_settings(size: FrameSize, controls: &CameraControls) -> Self {
        let (red, blue) = controls.colour_gains;
        Self::new()
            .with(WIDTH, MetadataValue::Int(i64::from(size.width)))
            .with(HEIGHT, MetadataValue::Int(i64::from(size.height)))
            .with("AwbEnable", MetadataValue::Int(i64::from(controls.awb_enable)))
            .with(
                "ColourGains",
                MetadataValue::Tuple(vec![MetadataValue::Float(red), MetadataValue::Float(blue)]),
            )
            .with(EXPOSURE_TIME, MetadataValue::Int(controls.exposure_time))
            .with(ANALOGUE_GAIN, MetadataValue::Float(controls.analogue_gain))
            .with("AfMode", MetadataValue::Int(controls.af_mode))
            .with("AfTrigger", MetadataValue::Int(controls.af_trigger))
            .with("LensPosition", MetadataValue::Float(controls.lens_position))
            .with("Brightness", MetadataValue::Float(controls.brightness))
            .with("Contrast", MetadataValue::Float(controls.contrast))
            .with("Saturation", MetadataValue::Float(controls.saturation))
            .with("Sharpness", MetadataValue::Float(controls.sharpness))
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: MetadataValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace `key`, keeping the position of an existing entry.
    pub fn insert(&mut self, key: &str, value: MetadataValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Integer stored under `key`.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(MetadataValue::as_i64)
    }

    /// Numeric lookup accepting either `Int` or `Float` entries.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetadataValue::as_f64)
    }

    /// Like [`get_int`](Self::get_int), failing with `CorruptMetadata` naming `path`.
    pub fn require_int(&self, key: &str, path: &Path) -> AppResult<i64> {
        self.get_int(key).ok_or_else(|| missing(key, "Int", path))
    }

    /// Numeric value under `key`, or `CorruptMetadata` naming the key.
    pub fn require_float(&self, key: &str, path: &Path) -> AppResult<f64> {
        self.get_float(key).ok_or_else(|| missing(key, "numeric", path))
    }

    /// Frame geometry `(Width, Height)` declared by the record.
    pub fn require_frame_size(&self, path: &Path) -> AppResult<FrameSize> {
        let width = self.require_int(WIDTH, path)?;
        let height = self.require_int(HEIGHT, path)?;
        let to_u32 = |key: &str, v: i64| {
            u32::try_from(v).ok().filter(|&v| v > 0).ok_or_else(|| {
                HyperPiError::CorruptMetadata {
                    path: path.to_path_buf(),
                    reason: format!("{key} must be a positive integer, found {v}"),
                }
            })
        };
        Ok(FrameSize::new(to_u32(WIDTH, width)?, to_u32(HEIGHT, height)?))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the record has no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the record in its on-disk text form.
    pub fn encode(&self) -> AppResult<String> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            if key.is_empty() || key.chars().any(char::is_whitespace) {
                return Err(HyperPiError::InvalidMetadata(format!(
                    "key {key:?} is empty or contains whitespace"
                )));
            }
            out.push_str(&format!("{key}\t{}\t{}\n", value.encode(false)?, value.tag()));
        }
        Ok(out)
    }

    /// Parse the on-disk text form. `path` is only used for error reporting.
    pub fn decode(text: &str, path: &Path) -> AppResult<Self> {
        let mut record = Self::new();
        for (number, line) in text.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let corrupt = |reason: String| HyperPiError::CorruptMetadata {
                path: path.to_path_buf(),
                reason: format!("line {}: {reason}", number + 1),
            };
            let &[key, value, tag] = tokens.as_slice() else {
                return Err(corrupt(format!(
                    "expected 3 fields, found {}",
                    tokens.len()
                )));
            };
            let value = MetadataValue::decode(value, tag).map_err(corrupt)?;
            record.insert(key, value);
        }
        Ok(record)
    }

    /// Write the record to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> AppResult<()> {
        let text = self.encode()?;
        fs::write(path, text)?;
        tracing::debug!(path = ?path, entries = self.len(), "Wrote control record");
        Ok(())
    }

    /// Read a record from `path`. A missing file is `CorruptMetadata`.
    pub fn read_from(path: &Path) -> AppResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| HyperPiError::CorruptMetadata {
            path: path.to_path_buf(),
            reason: format!("cannot read control record: {e}"),
        })?;
        Self::decode(&text, path)
    }
}

fn missing(key: &str, kind: &str, path: &Path) -> HyperPiError {
    HyperPiError::CorruptMetadata {
        path: PathBuf::from(path),
        reason: format!("missing {kind} entry '{key}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MetadataRecord {
        MetadataRecord::new()
            .with("Width", MetadataValue::Int(800))
            .with("AnalogueGain", MetadataValue::Float(1.0))
            .with("Mode", MetadataValue::String("still".into()))
            .with(
                "Gains",
                MetadataValue::List(vec![MetadataValue::Int(1), MetadataValue::Float(2.5)]),
            )
            .with(
                "ColourGains",
                MetadataValue::Tuple(vec![
                    MetadataValue::Float(1.0),
                    MetadataValue::String("auto".into()),
                ]),
            )
    }

    #[test]
    fn round_trip_preserves_every_tag() {
        let record = sample();
        let text = record.encode().unwrap();
        let decoded = MetadataRecord::decode(&text, Path::new("Controls.txt")).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn integral_float_keeps_its_tag() {
        let text = MetadataRecord::new()
            .with("LensPosition", MetadataValue::Float(1.0))
            .encode()
            .unwrap();
        assert_eq!(text, "LensPosition\t1.0\tFloat\n");
    }

    #[test]
    fn collections_have_no_internal_whitespace() {
        let text = sample().encode().unwrap();
        assert!(text.contains("Gains\t[1,2.5]\tList"));
        assert!(text.contains("ColourGains\t(1.0,'auto')\tTuple"));
        for line in text.lines() {
            assert_eq!(line.split_whitespace().count(), 3);
        }
    }

    #[test]
    fn whitespace_in_string_is_rejected() {
        let record = MetadataRecord::new().with("Note", MetadataValue::String("two words".into()));
        assert!(matches!(
            record.encode(),
            Err(HyperPiError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn wrong_field_count_is_corrupt() {
        let err = MetadataRecord::decode("Width 800\n", Path::new("x")).unwrap_err();
        assert!(matches!(err, HyperPiError::CorruptMetadata { .. }));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let err = MetadataRecord::decode("AwbEnable False NonValid\n", Path::new("x")).unwrap_err();
        assert!(err.to_string().contains("unknown type tag"));
    }

    #[test]
    fn bad_value_is_corrupt() {
        assert!(MetadataRecord::decode("Width eight Int\n", Path::new("x")).is_err());
        assert!(MetadataRecord::decode("Gains 1,2 List\n", Path::new("x")).is_err());
    }

    #[test]
    fn decode_tolerates_blank_lines_and_spaces() {
        let text = "Width 800 Int \n\n  Height\t600\tInt\n";
        let record = MetadataRecord::decode(text, Path::new("x")).unwrap();
        assert_eq!(record.get_int(WIDTH), Some(800));
        assert_eq!(record.get_int(HEIGHT), Some(600));
    }

    #[test]
    fn float_accessor_widens_ints() {
        let record = MetadataRecord::new().with(EXPOSURE_TIME, MetadataValue::Int(100_000));
        assert_eq!(record.get_float(EXPOSURE_TIME), Some(100_000.0));
        assert!(record.require_float(ANALOGUE_GAIN, Path::new("x")).is_err());
    }

    #[test]
    fn capture_settings_declare_geometry_and_exposure() {
        let record =
            MetadataRecord::from_capture_settings(FrameSize::new(64, 48), &CameraControls::default());
        let path = Path::new("Controls.txt");
        assert_eq!(record.require_frame_size(path).unwrap(), FrameSize::new(64, 48));
        assert_eq!(record.require_int(EXPOSURE_TIME, path).unwrap(), 100_000);
        assert_eq!(record.require_float(ANALOGUE_GAIN, path).unwrap(), 1.0);
        assert_eq!(record.get_int("AwbEnable"), Some(0));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Controls.txt");
        let record = sample();
        record.write_to(&path).unwrap();
        assert_eq!(MetadataRecord::read_from(&path).unwrap(), record);
    }

    #[test]
    fn missing_file_is_corrupt_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let err = MetadataRecord::read_from(&dir.path().join("Controls.txt")).unwrap_err();
        assert!(matches!(err, HyperPiError::CorruptMetadata { .. }));
    }
}
