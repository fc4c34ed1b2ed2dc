//! Permutation expansion of decoded metric keys.
//!
//! Any key segment may carry the permute marker, which means the metric is
//! reported both with and without that segment — an aggregate view next to
//! the fine-grained one. Expansion is the full cross-product: N permutable
//! segments yield 2^N variants.

use crate::codec::{MetricKey, Segment, NAME_TOKEN_DELIMITER};
use crate::datum::{Dimension, MetricDatum};

/// One concrete expansion of a key: the metric name and dimension set a
/// single datum will be submitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVariant {
    /// Submitted metric name: included plain tokens joined by a space.
    pub name: String,
    /// Included dimension pairs, in segment order.
    pub dimensions: Vec<Dimension>,
}

/// Permutable segments beyond this many are included in every variant
/// instead of expanding the cross-product further. The receiving service
/// caps dimensions per datum around ten, so nothing legitimate gets close.
pub const MAX_PERMUTABLE_SEGMENTS: usize = 10;

/// A decoded key prepared for permutation expansion.
#[derive(Debug, Clone)]
pub struct DemuxedKey {
    key: MetricKey,
}

impl DemuxedKey {
    /// Wrap a decoded key for expansion.
    pub fn new(key: MetricKey) -> Self {
        DemuxedKey { key }
    }

    /// All concrete variants of this key, in a stable order: binary counting
    /// over permutable-segment inclusion, the first permutable segment being
    /// the lowest-order bit, exclusion before inclusion. Non-permutable
    /// segments appear in every variant. A variant whose name would be empty
    /// is skipped.
    ///
    /// Only the first [`MAX_PERMUTABLE_SEGMENTS`] permutable segments
    /// participate in the cross-product; any beyond that are treated as
    /// always included, bounding the expansion of a decoded key.
    pub fn permutations(&self) -> Vec<KeyVariant> {
        let permutable_count = self
            .key
            .segments()
            .iter()
            .filter(|s| s.is_permutable())
            .count()
            .min(MAX_PERMUTABLE_SEGMENTS);

        let mut variants = Vec::with_capacity(1 << permutable_count);
        for mask in 0u64..(1u64 << permutable_count) {
            let mut name = String::new();
            let mut dimensions = Vec::new();
            let mut bit = 0;
            for segment in self.key.segments() {
                if segment.is_permutable() && bit < MAX_PERMUTABLE_SEGMENTS {
                    let included = mask & (1u64 << bit) != 0;
                    bit += 1;
                    if !included {
                        continue;
                    }
                }
                match segment {
                    Segment::Name { text, .. } => {
                        if !name.is_empty() {
                            name.push(NAME_TOKEN_DELIMITER);
                        }
                        name.push_str(text);
                    },
                    Segment::Dimension { key, value, .. } => {
                        dimensions.push(Dimension::new(key.clone(), value.clone()));
                    },
                }
            }
            if name.is_empty() {
                continue;
            }
            variants.push(KeyVariant { name, dimensions });
        }
        variants
    }

    /// Produce one datum per variant, each independently passed through
    /// `transform` to attach the value, statistics, unit, and timestamp.
    pub fn new_datums<F>(&self, transform: F) -> Vec<MetricDatum>
    where
        F: Fn(MetricDatum) -> MetricDatum,
    {
        self.permutations()
            .into_iter()
            .map(|variant| {
                transform(MetricDatum::new(variant.name).with_dimensions(variant.dimensions))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names_and_dims(variants: &[KeyVariant]) -> Vec<(String, Vec<(String, String)>)> {
        variants
            .iter()
            .map(|v| {
                (
                    v.name.clone(),
                    v.dimensions
                        .iter()
                        .map(|d| (d.name.clone(), d.value.clone()))
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_no_permutable_segments_yield_one_variant() {
        let key = MetricKey::new("requests").dimension("region", "us");
        let variants = DemuxedKey::new(key).permutations();
        assert_eq!(
            names_and_dims(&variants),
            vec![(
                "requests".to_string(),
                vec![("region".to_string(), "us".to_string())]
            )]
        );
    }

    #[test]
    fn test_one_permutable_dimension_doubles() {
        let key = MetricKey::new("requests").permutable_dimension("region", "us");
        let variants = DemuxedKey::new(key).permutations();
        assert_eq!(
            names_and_dims(&variants),
            vec![
                ("requests".to_string(), vec![]),
                (
                    "requests".to_string(),
                    vec![("region".to_string(), "us".to_string())]
                ),
            ]
        );
    }

    #[test]
    fn test_cross_product_order_is_binary_counting() {
        let key = MetricKey::new("requests")
            .permutable_dimension("region", "us")
            .permutable_dimension("host", "web-1");
        let variants = DemuxedKey::new(key).permutations();

        let region = ("region".to_string(), "us".to_string());
        let host = ("host".to_string(), "web-1".to_string());
        assert_eq!(
            names_and_dims(&variants),
            vec![
                ("requests".to_string(), vec![]),
                ("requests".to_string(), vec![region.clone()]),
                ("requests".to_string(), vec![host.clone()]),
                ("requests".to_string(), vec![region, host]),
            ]
        );
    }

    #[test]
    fn test_permutable_name_token_expands_the_name() {
        let key = MetricKey::new("requests")
            .permutable_name_token("slow")
            .dimension("region", "us");
        let variants = DemuxedKey::new(key).permutations();

        let region = ("region".to_string(), "us".to_string());
        assert_eq!(
            names_and_dims(&variants),
            vec![
                ("requests".to_string(), vec![region.clone()]),
                ("requests slow".to_string(), vec![region]),
            ]
        );
    }

    #[test]
    fn test_empty_name_variant_is_skipped() {
        let key = MetricKey::parse("requests* region=us");
        let variants = DemuxedKey::new(key).permutations();
        // The mask that excludes every name token produces no variant.
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].name, "requests");
    }

    #[test]
    fn test_expansion_is_bounded_for_absurd_permutable_counts() {
        // A hostile decoded name can flag far more segments permutable than
        // any real registration would; expansion must stay bounded rather
        // than overflow or exhaust memory.
        let mut core = String::from("requests");
        for i in 0..70 {
            core.push_str(&format!(" d{:02}=v*", i));
        }
        let variants = DemuxedKey::new(MetricKey::parse(&core)).permutations();
        assert_eq!(variants.len(), 1 << MAX_PERMUTABLE_SEGMENTS);

        // Segments past the cap ride along in every variant.
        assert!(variants
            .iter()
            .all(|v| v.dimensions.iter().any(|d| d.name == "d69")));
    }

    #[test]
    fn test_two_permutable_dimensions_yield_four_datums() {
        let key = MetricKey::new("requests")
            .permutable_dimension("region", "us")
            .permutable_dimension("host", "web-1");
        let datums = DemuxedKey::new(key).new_datums(|d| d.with_value(7.0));
        assert_eq!(datums.len(), 4);
        assert!(datums.iter().all(|d| d.value == Some(7.0)));
        assert!(datums.iter().all(|d| d.metric_name == "requests"));
    }
}
