//! Metric-name encoding and decoding.
//!
//! The snapshot interface only carries a flat string key per metric, so
//! everything this pipeline needs to know about a metric — its dimensions,
//! permute directives, storage resolution, capture timestamp, and target
//! unit — is packed into that one key at registration time and unpacked at
//! report time.
//!
//! The structured form is the first-class type here: a [`MetricKey`] holds
//! ordered name and dimension segments, and [`KeyOptions`] holds the
//! metadata. The delimited string is their serialization, produced by
//! [`MetricKey::encode`] and reversed by [`decode`].
//!
//! # Key layouts
//!
//! Trailing metadata is anchored by literal marker tokens so that the
//! decoder can slice the string even though the name-and-dimensions core
//! contains the generic whitespace delimiter:
//!
//! - gauge: `<nameAndDims>StorageResolution=<r>Timestamp=<t>`
//! - counter: `CounterName=<name>,<dims>StorageResolution=<r>Timestamp=<t>`
//! - sampling: `CounterName=<n>SamplingName=<n>,<dims>StorageResolution=<r>Timestamp=<t>Unit=<u>`
//!
//! Within the core, segments are separated by a single space, dimension
//! keys and values by `=`, and a trailing `*` marks a segment permutable.

use crate::core::{ReporterError, Result};
use crate::datum::StandardUnit;
use std::fmt;

pub mod demux;

pub use demux::{DemuxedKey, KeyVariant};

/// Separates tokens within the name-and-dimensions core.
pub const NAME_TOKEN_DELIMITER: char = ' ';
/// Separates the key and value of a dimension token.
pub const NAME_DIMENSION_SEPARATOR: char = '=';
/// Trailing marker on any token that should be reported both with and
/// without that token.
pub const NAME_PERMUTE_MARKER: char = '*';
/// Separates the name part from the dimension part in counter and sampling
/// layouts.
pub const METRIC_DIMENSION_SEPARATOR: &str = ",";
/// Anchors the counter-style name.
pub const COUNTER_NAME_TOKEN: &str = "CounterName=";
/// Anchors the sampling-style name.
pub const SAMPLING_NAME_TOKEN: &str = "SamplingName=";
/// Anchors the storage resolution.
pub const STORAGE_RESOLUTION_TOKEN: &str = "StorageResolution=";
/// Anchors the capture timestamp.
pub const TIMESTAMP_TOKEN: &str = "Timestamp=";
/// Anchors the unit, present only in sampling layouts.
pub const UNIT_TOKEN: &str = "Unit=";

/// Which family of metric a key belongs to. Determines the key layout and
/// which metadata segments are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticKind {
    /// Point-in-time value; plain layout with no name marker.
    Gauge,
    /// Cumulative count reported as a per-cycle delta.
    Counter,
    /// Value distribution reported as a statistic set; carries a unit.
    Sampling,
}

/// One segment of a metric key: either a plain name token or a dimension
/// pair, optionally flagged permutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A plain token contributing to the submitted metric name.
    Name {
        /// Token text.
        text: String,
        /// Whether variants are emitted both with and without this token.
        permutable: bool,
    },
    /// A dimension key/value pair.
    Dimension {
        /// Dimension key.
        key: String,
        /// Dimension value.
        value: String,
        /// Whether variants are emitted both with and without this pair.
        permutable: bool,
    },
}

impl Segment {
    /// Whether this segment carries the permute marker.
    pub fn is_permutable(&self) -> bool {
        match self {
            Segment::Name { permutable, .. } | Segment::Dimension { permutable, .. } => *permutable,
        }
    }

    fn write_token(&self, out: &mut String) {
        match self {
            Segment::Name { text, permutable } => {
                out.push_str(text);
                if *permutable {
                    out.push(NAME_PERMUTE_MARKER);
                }
            },
            Segment::Dimension {
                key,
                value,
                permutable,
            } => {
                out.push_str(key);
                out.push(NAME_DIMENSION_SEPARATOR);
                out.push_str(value);
                if *permutable {
                    out.push(NAME_PERMUTE_MARKER);
                }
            },
        }
    }
}

/// Metadata packed alongside the name-and-dimensions core of a key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyOptions {
    /// Key layout this metric was registered with.
    pub kind: StatisticKind,
    /// Reporting granularity in seconds requested at the receiving service.
    pub storage_resolution: u32,
    /// Capture timestamp in milliseconds since the epoch.
    pub timestamp_millis: i64,
    /// Target unit; required for sampling kinds, absent otherwise.
    pub unit: Option<StandardUnit>,
}

impl KeyOptions {
    /// Options for a gauge key.
    pub fn gauge(storage_resolution: u32, timestamp_millis: i64) -> Self {
        KeyOptions {
            kind: StatisticKind::Gauge,
            storage_resolution,
            timestamp_millis,
            unit: None,
        }
    }

    /// Options for a counter key.
    pub fn counter(storage_resolution: u32, timestamp_millis: i64) -> Self {
        KeyOptions {
            kind: StatisticKind::Counter,
            storage_resolution,
            timestamp_millis,
            unit: None,
        }
    }

    /// Options for a sampling key with the given target unit.
    pub fn sampling(storage_resolution: u32, timestamp_millis: i64, unit: StandardUnit) -> Self {
        KeyOptions {
            kind: StatisticKind::Sampling,
            storage_resolution,
            timestamp_millis,
            unit: Some(unit),
        }
    }
}

/// The structured form of a metric key: ordered name and dimension segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricKey {
    segments: Vec<Segment>,
}

impl MetricKey {
    /// Create a key with a single plain name token.
    pub fn new<S: Into<String>>(bare_name: S) -> Self {
        MetricKey {
            segments: vec![Segment::Name {
                text: bare_name.into(),
                permutable: false,
            }],
        }
    }

    /// Append an additional plain name token.
    pub fn name_token<S: Into<String>>(mut self, text: S) -> Self {
        self.segments.push(Segment::Name {
            text: text.into(),
            permutable: false,
        });
        self
    }

    /// Append a permutable plain name token.
    pub fn permutable_name_token<S: Into<String>>(mut self, text: S) -> Self {
        self.segments.push(Segment::Name {
            text: text.into(),
            permutable: true,
        });
        self
    }

    /// Append a dimension pair.
    pub fn dimension<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.segments.push(Segment::Dimension {
            key: key.into(),
            value: value.into(),
            permutable: false,
        });
        self
    }

    /// Append a permutable dimension pair.
    pub fn permutable_dimension<K: Into<String>, V: Into<String>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.segments.push(Segment::Dimension {
            key: key.into(),
            value: value.into(),
            permutable: true,
        });
        self
    }

    /// Parse a name-and-dimensions core back into segments. Tokens are
    /// separated by whitespace; a token containing `=` is a dimension pair;
    /// a trailing `*` marks the token permutable. Never fails: this is only
    /// applied to strings the encoder produced.
    pub fn parse(name_and_dimensions: &str) -> Self {
        let mut segments = Vec::new();
        for raw in name_and_dimensions.split_whitespace() {
            let (token, permutable) = match raw.strip_suffix(NAME_PERMUTE_MARKER) {
                Some(stripped) => (stripped, true),
                None => (raw, false),
            };
            if token.is_empty() {
                continue;
            }
            match token.split_once(NAME_DIMENSION_SEPARATOR) {
                Some((key, value)) => segments.push(Segment::Dimension {
                    key: key.to_string(),
                    value: value.to_string(),
                    permutable,
                }),
                None => segments.push(Segment::Name {
                    text: token.to_string(),
                    permutable,
                }),
            }
        }
        MetricKey { segments }
    }

    /// Ordered segments of this key.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether this key holds no segments at all.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parse and append further tokens, e.g. reporter-wide dimensions.
    pub fn extend_parsed(&mut self, name_and_dimensions: &str) {
        self.segments
            .extend(MetricKey::parse(name_and_dimensions).segments);
    }

    /// The submitted metric name with markers stripped: all plain name
    /// tokens joined by a single space.
    pub fn bare_name(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            if let Segment::Name { text, .. } = segment {
                if !out.is_empty() {
                    out.push(NAME_TOKEN_DELIMITER);
                }
                out.push_str(text);
            }
        }
        out
    }

    fn render<F>(&self, mut keep: F) -> String
    where
        F: FnMut(&Segment) -> bool,
    {
        let mut out = String::new();
        for segment in &self.segments {
            if !keep(segment) {
                continue;
            }
            if !out.is_empty() {
                out.push(NAME_TOKEN_DELIMITER);
            }
            segment.write_token(&mut out);
        }
        out
    }

    /// The full name-and-dimensions core, markers included.
    pub fn name_and_dimensions(&self) -> String {
        self.render(|_| true)
    }

    fn name_part(&self) -> String {
        self.render(|s| matches!(s, Segment::Name { .. }))
    }

    fn dimension_part(&self) -> String {
        self.render(|s| matches!(s, Segment::Dimension { .. }))
    }

    /// Reject any segment whose parts contain reserved characters. Every
    /// literal marker token contains `=` or `,`, so these character checks
    /// also rule out marker collisions inside user-supplied parts.
    pub fn validate(&self) -> Result<()> {
        for segment in &self.segments {
            match segment {
                Segment::Name { text, .. } => validate_part(text)?,
                Segment::Dimension { key, value, .. } => {
                    validate_part(key)?;
                    validate_part(value)?;
                },
            }
        }
        if self.is_empty() {
            return Err(ReporterError::config("Metric key has no segments"));
        }
        Ok(())
    }

    /// Serialize this key into the flat string registered in the snapshot.
    ///
    /// Fails with a configuration error if any segment contains reserved
    /// characters, or if a sampling key is missing its unit. Every encoded
    /// key round-trips through [`decode`].
    pub fn encode(&self, options: &KeyOptions) -> Result<String> {
        self.validate()?;
        let resolution = options.storage_resolution;
        let timestamp = options.timestamp_millis;
        match options.kind {
            StatisticKind::Gauge => Ok(format!(
                "{}{}{}{}{}",
                self.name_and_dimensions(),
                STORAGE_RESOLUTION_TOKEN,
                resolution,
                TIMESTAMP_TOKEN,
                timestamp,
            )),
            StatisticKind::Counter => Ok(format!(
                "{}{}{}{}{}{}{}{}",
                COUNTER_NAME_TOKEN,
                self.name_part(),
                METRIC_DIMENSION_SEPARATOR,
                self.dimension_part(),
                STORAGE_RESOLUTION_TOKEN,
                resolution,
                TIMESTAMP_TOKEN,
                timestamp,
            )),
            StatisticKind::Sampling => {
                let unit = options.unit.ok_or_else(|| {
                    ReporterError::config(format!(
                        "Sampling key '{}' requires a unit",
                        self.bare_name()
                    ))
                })?;
                let name = self.name_part();
                Ok(format!(
                    "{}{}{}{}{}{}{}{}{}{}{}{}",
                    COUNTER_NAME_TOKEN,
                    name,
                    SAMPLING_NAME_TOKEN,
                    name,
                    METRIC_DIMENSION_SEPARATOR,
                    self.dimension_part(),
                    STORAGE_RESOLUTION_TOKEN,
                    resolution,
                    TIMESTAMP_TOKEN,
                    timestamp,
                    UNIT_TOKEN,
                    unit,
                ))
            },
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name_and_dimensions())
    }
}

/// A successfully decoded key: the structured segments plus the metadata
/// that was packed next to them.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedName {
    /// Structured name and dimension segments.
    pub key: MetricKey,
    /// Decoded metadata.
    pub options: KeyOptions,
}

/// Decode a registered key string for the given statistic kind.
///
/// The trailing metadata segments are located right-to-left from their
/// marker tokens, because the name-and-dimensions core may itself contain
/// the generic delimiter. Any missing or out-of-order marker yields an
/// unparseable-name error, never a partial result.
pub fn decode(encoded: &str, kind: StatisticKind) -> Result<DecodedName> {
    match kind {
        StatisticKind::Gauge => decode_gauge(encoded),
        StatisticKind::Counter => decode_counter(encoded),
        StatisticKind::Sampling => decode_sampling(encoded),
    }
}

fn decode_gauge(encoded: &str) -> Result<DecodedName> {
    let core = require(before_last(encoded, STORAGE_RESOLUTION_TOKEN), encoded, "storage resolution")?;
    let tail = require(after_last(encoded, STORAGE_RESOLUTION_TOKEN), encoded, "storage resolution")?;
    let resolution = require(before_last(tail, TIMESTAMP_TOKEN), encoded, "timestamp")?;
    let timestamp = require(after_last(tail, TIMESTAMP_TOKEN), encoded, "timestamp")?;

    finish_decode(encoded, core, resolution, timestamp, None, StatisticKind::Gauge)
}

fn decode_counter(encoded: &str) -> Result<DecodedName> {
    // A histogram or timer key carries both name markers; its counter-style
    // datum reads the counter name and the sampling layout's trailing unit
    // pushes the timestamp anchor inward.
    let (name, timestamp) = if encoded.contains(SAMPLING_NAME_TOKEN) {
        (
            require(between(encoded, COUNTER_NAME_TOKEN, SAMPLING_NAME_TOKEN), encoded, "counter name")?,
            require(between(encoded, TIMESTAMP_TOKEN, UNIT_TOKEN), encoded, "timestamp")?,
        )
    } else {
        (
            require(between(encoded, COUNTER_NAME_TOKEN, METRIC_DIMENSION_SEPARATOR), encoded, "counter name")?,
            require(after_last(encoded, TIMESTAMP_TOKEN), encoded, "timestamp")?,
        )
    };
    let dimensions =
        require(between(encoded, METRIC_DIMENSION_SEPARATOR, STORAGE_RESOLUTION_TOKEN), encoded, "dimensions")?;
    let resolution =
        require(between(encoded, STORAGE_RESOLUTION_TOKEN, TIMESTAMP_TOKEN), encoded, "storage resolution")?;

    let core = join_core(name, dimensions);
    finish_decode(encoded, &core, resolution, timestamp, None, StatisticKind::Counter)
}

fn decode_sampling(encoded: &str) -> Result<DecodedName> {
    let name =
        require(between(encoded, SAMPLING_NAME_TOKEN, METRIC_DIMENSION_SEPARATOR), encoded, "sampling name")?;
    let dimensions =
        require(between(encoded, METRIC_DIMENSION_SEPARATOR, STORAGE_RESOLUTION_TOKEN), encoded, "dimensions")?;
    let resolution =
        require(between(encoded, STORAGE_RESOLUTION_TOKEN, TIMESTAMP_TOKEN), encoded, "storage resolution")?;
    let timestamp = require(between(encoded, TIMESTAMP_TOKEN, UNIT_TOKEN), encoded, "timestamp")?;
    let unit_str = require(after_last(encoded, UNIT_TOKEN), encoded, "unit")?;
    let unit = unit_str.parse::<StandardUnit>().map_err(|e| {
        ReporterError::unparseable(format!("{} in '{}'", e, encoded))
    })?;

    let core = join_core(name, dimensions);
    finish_decode(encoded, &core, resolution, timestamp, Some(unit), StatisticKind::Sampling)
}

fn finish_decode(
    encoded: &str,
    core: &str,
    resolution: &str,
    timestamp: &str,
    unit: Option<StandardUnit>,
    kind: StatisticKind,
) -> Result<DecodedName> {
    let storage_resolution = resolution.parse::<u32>().map_err(|_| {
        ReporterError::unparseable(format!("Bad storage resolution '{}' in '{}'", resolution, encoded))
    })?;
    let timestamp_millis = timestamp.parse::<i64>().map_err(|_| {
        ReporterError::unparseable(format!("Bad timestamp '{}' in '{}'", timestamp, encoded))
    })?;

    let key = MetricKey::parse(core);
    if key.is_empty() {
        return Err(ReporterError::unparseable(format!("Empty metric name in '{}'", encoded)));
    }

    Ok(DecodedName {
        key,
        options: KeyOptions {
            kind,
            storage_resolution,
            timestamp_millis,
            unit,
        },
    })
}

fn join_core(name: &str, dimensions: &str) -> String {
    if dimensions.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", name, NAME_TOKEN_DELIMITER, dimensions)
    }
}

fn validate_part(part: &str) -> Result<()> {
    if part.is_empty() {
        return Err(ReporterError::config("Metric name segment parts must be non-empty"));
    }
    if part.contains(|c: char| {
        c.is_whitespace()
            || c == NAME_DIMENSION_SEPARATOR
            || c == NAME_PERMUTE_MARKER
            || c == ','
    }) {
        return Err(ReporterError::config(format!(
            "Reserved character in metric name part '{}': whitespace, '=', '*', and ',' are not allowed",
            part
        )));
    }
    Ok(())
}

/// Substring strictly between the first `open` and the next `close` after it.
fn between<'a>(s: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = s.find(open)? + open.len();
    let end = s[start..].find(close)? + start;
    Some(&s[start..end])
}

/// Substring after the last occurrence of `token`.
fn after_last<'a>(s: &'a str, token: &str) -> Option<&'a str> {
    s.rfind(token).map(|i| &s[i + token.len()..])
}

/// Substring before the last occurrence of `token`.
fn before_last<'a>(s: &'a str, token: &str) -> Option<&'a str> {
    s.rfind(token).map(|i| &s[..i])
}

fn require<'a>(part: Option<&'a str>, encoded: &str, what: &str) -> Result<&'a str> {
    part.ok_or_else(|| {
        ReporterError::unparseable(format!(
            "Missing or out-of-order {} marker in '{}'",
            what, encoded
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_gauge_round_trip() {
        let key = MetricKey::new("heap-used").dimension("host", "web-1");
        let options = KeyOptions::gauge(60, 1_700_000_000_000);

        let encoded = key.encode(&options).unwrap();
        assert_eq!(encoded, "heap-used host=web-1StorageResolution=60Timestamp=1700000000000");

        let decoded = decode(&encoded, StatisticKind::Gauge).unwrap();
        assert_eq!(decoded.key, key);
        assert_eq!(decoded.options, options);
    }

    #[test]
    fn test_counter_round_trip() {
        let key = MetricKey::new("requests").permutable_dimension("region", "us");
        let options = KeyOptions::counter(1, 42);

        let encoded = key.encode(&options).unwrap();
        assert_eq!(encoded, "CounterName=requests,region=us*StorageResolution=1Timestamp=42");

        let decoded = decode(&encoded, StatisticKind::Counter).unwrap();
        assert_eq!(decoded.key, key);
        assert_eq!(decoded.options, options);
    }

    #[test]
    fn test_counter_round_trip_without_dimensions() {
        let key = MetricKey::new("requests");
        let encoded = key.encode(&KeyOptions::counter(60, 0)).unwrap();
        let decoded = decode(&encoded, StatisticKind::Counter).unwrap();
        assert_eq!(decoded.key, key);
    }

    #[test]
    fn test_sampling_round_trip() {
        let key = MetricKey::new("latency")
            .permutable_name_token("slow")
            .dimension("host", "web-1")
            .permutable_dimension("region", "us");
        let options = KeyOptions::sampling(60, 9_000, StandardUnit::Milliseconds);

        let encoded = key.encode(&options).unwrap();
        assert_eq!(
            encoded,
            "CounterName=latency slow*SamplingName=latency slow*,host=web-1 region=us*\
             StorageResolution=60Timestamp=9000Unit=Milliseconds"
        );

        let decoded = decode(&encoded, StatisticKind::Sampling).unwrap();
        assert_eq!(decoded.key, key);
        assert_eq!(decoded.options, options);
    }

    #[test]
    fn test_sampling_key_decodes_as_counter() {
        // A timer's key feeds both its count datum and its statistics datum.
        let key = MetricKey::new("latency").dimension("host", "web-1");
        let encoded = key
            .encode(&KeyOptions::sampling(60, 9_000, StandardUnit::Milliseconds))
            .unwrap();

        let decoded = decode(&encoded, StatisticKind::Counter).unwrap();
        assert_eq!(decoded.key, key);
        assert_eq!(decoded.options.kind, StatisticKind::Counter);
        assert_eq!(decoded.options.timestamp_millis, 9_000);
        assert_eq!(decoded.options.unit, None);
    }

    #[test]
    fn test_encode_rejects_reserved_characters() {
        for bad in ["two words", "equals=inside", "star*", "comma,inside", ""] {
            let key = MetricKey::new(bad);
            assert!(key.encode(&KeyOptions::counter(60, 0)).is_err(), "accepted {:?}", bad);

            let key = MetricKey::new("ok").dimension("k", bad);
            assert!(key.encode(&KeyOptions::counter(60, 0)).is_err(), "accepted value {:?}", bad);
        }
    }

    #[test]
    fn test_encode_rejects_marker_collisions() {
        // Marker tokens all contain a reserved character, so a part that
        // embeds one can never survive encode.
        let key = MetricKey::new("Timestamp=5");
        assert!(key.encode(&KeyOptions::counter(60, 0)).is_err());
    }

    #[test]
    fn test_sampling_encode_requires_unit() {
        let key = MetricKey::new("latency");
        let mut options = KeyOptions::sampling(60, 0, StandardUnit::Milliseconds);
        options.unit = None;
        assert!(key.encode(&options).is_err());
    }

    #[test]
    fn test_decode_missing_markers_is_unparseable() {
        for (bad, kind) in [
            ("requests", StatisticKind::Gauge),
            ("requests", StatisticKind::Counter),
            ("CounterName=requests,StorageResolution=60", StatisticKind::Counter),
            ("CounterName=requests,Timestamp=5", StatisticKind::Counter),
            ("CounterName=requests,StorageResolution=60Timestamp=5", StatisticKind::Sampling),
            ("heap-usedStorageResolution=60", StatisticKind::Gauge),
        ] {
            let result = decode(bad, kind);
            assert!(
                matches!(result, Err(ReporterError::UnparseableName(_))),
                "decoded {:?} as {:?}: {:?}",
                bad,
                kind,
                result
            );
        }
    }

    #[test]
    fn test_decode_bad_metadata_is_unparseable() {
        let result = decode("gauge StorageResolution=soonTimestamp=5", StatisticKind::Gauge);
        assert!(matches!(result, Err(ReporterError::UnparseableName(_))));

        let result = decode(
            "CounterName=lat SamplingName=lat,StorageResolution=60Timestamp=5Unit=Furlongs",
            StatisticKind::Sampling,
        );
        assert!(matches!(result, Err(ReporterError::UnparseableName(_))));
    }

    #[test]
    fn test_parse_preserves_segment_order_and_flags() {
        let key = MetricKey::parse("api latency* host=web-1 region=us*");
        assert_eq!(
            key.segments(),
            &[
                Segment::Name {
                    text: "api".to_string(),
                    permutable: false
                },
                Segment::Name {
                    text: "latency".to_string(),
                    permutable: true
                },
                Segment::Dimension {
                    key: "host".to_string(),
                    value: "web-1".to_string(),
                    permutable: false
                },
                Segment::Dimension {
                    key: "region".to_string(),
                    value: "us".to_string(),
                    permutable: true
                },
            ]
        );
        assert_eq!(key.bare_name(), "api latency");
        assert_eq!(key.name_and_dimensions(), "api latency* host=web-1 region=us*");
    }

    #[test]
    fn test_extend_parsed_appends_global_dimensions() {
        let mut key = MetricKey::new("requests");
        key.extend_parsed("env=prod stage=blue*");
        assert_eq!(key.name_and_dimensions(), "requests env=prod stage=blue*");
    }
}
