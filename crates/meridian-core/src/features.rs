//! Per-node feature bits, parsed out of the info protocol's `features` key.

use bitflags::bitflags;

bitflags! {
    /// Server-advertised capabilities relevant to client routing decisions.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FeatureBits: u32 {
        /// Node can answer `partition-generation`/`replicas` style queries.
        const PARTITION_QUERY = 1 << 0;
        /// Node supports the batch-any request variant.
        const BATCH_ANY       = 1 << 1;
        /// Node supports `query-show` introspection.
        const QUERY_SHOW      = 1 << 2;
        /// Node participates in strong-consistency namespaces.
        const STRONG_CONSISTENCY = 1 << 3;
    }
}

impl FeatureBits {
    /// Parse a comma-separated feature list from the info protocol, e.g.
    /// `"partition-query,batch-any"`.
    pub fn parse(features: &str) -> Self {
        let mut bits = FeatureBits::empty();
        for token in features.split(',') {
            match token.trim() {
                "partition-query" => bits |= FeatureBits::PARTITION_QUERY,
                "batch-any" => bits |= FeatureBits::BATCH_ANY,
                "query-show" => bits |= FeatureBits::QUERY_SHOW,
                "strong-consistency" => bits |= FeatureBits::STRONG_CONSISTENCY,
                _ => {}
            }
        }
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_features() {
        let bits = FeatureBits::parse("partition-query,batch-any,query-show");
        assert!(bits.contains(FeatureBits::PARTITION_QUERY));
        assert!(bits.contains(FeatureBits::BATCH_ANY));
        assert!(bits.contains(FeatureBits::QUERY_SHOW));
    }

    #[test]
    fn ignores_unknown_tokens() {
        let bits = FeatureBits::parse("some-future-feature,batch-any");
        assert_eq!(bits, FeatureBits::BATCH_ANY);
    }

    #[test]
    fn empty_string_yields_no_bits() {
        assert_eq!(FeatureBits::parse(""), FeatureBits::empty());
    }
}
