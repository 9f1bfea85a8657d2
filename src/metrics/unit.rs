/// Measurement unit of an instrument.
///
/// The unit picks the exported name suffix and the default histogram
/// bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Milliseconds,
    Bytes,
    Kilobytes,
    Ratio,
    Hertz,
    Count,
}

/// Duration buckets in milliseconds: 0.1ms .. 10s.
const MILLISECOND_BOUNDARIES: [f64; 12] = [
    0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0, 1_000.0, 10_000.0,
];

/// Size buckets in bytes: 64B .. 64MiB, powers of four.
const BYTE_BOUNDARIES: [f64; 11] = [
    64.0,
    256.0,
    1_024.0,
    4_096.0,
    16_384.0,
    65_536.0,
    262_144.0,
    1_048_576.0,
    4_194_304.0,
    16_777_216.0,
    67_108_864.0,
];

/// Size buckets in kilobytes: 1KB .. 16GB.
const KILOBYTE_BOUNDARIES: [f64; 8] = [
    1.0,
    16.0,
    256.0,
    4_096.0,
    65_536.0,
    1_048_576.0,
    4_194_304.0,
    16_777_216.0,
];

/// Utilization buckets for values in [0, 1].
const RATIO_BOUNDARIES: [f64; 10] = [0.01, 0.05, 0.1, 0.2, 0.3, 0.5, 0.7, 0.8, 0.9, 1.0];

/// Rate buckets in events per second.
const HERTZ_BOUNDARIES: [f64; 8] = [
    1.0, 10.0, 100.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0, 100_000.0,
];

const COUNT_BOUNDARIES: [f64; 8] = [1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 1_000.0, 10_000.0];

impl Unit {
    /// Suffix appended to the exported metric name, if any.
    pub const fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Milliseconds => Some("milliseconds"),
            Self::Bytes => Some("bytes"),
            Self::Kilobytes => Some("kilobytes"),
            Self::Ratio => Some("ratio"),
            Self::Hertz => Some("hertz"),
            Self::Count => None,
        }
    }

    /// Histogram bucket upper bounds; the `+Inf` bucket is implicit.
    pub fn buckets(self) -> Vec<f64> {
        match self {
            Self::Milliseconds => MILLISECOND_BOUNDARIES.to_vec(),
            Self::Bytes => BYTE_BOUNDARIES.to_vec(),
            Self::Kilobytes => KILOBYTE_BOUNDARIES.to_vec(),
            Self::Ratio => RATIO_BOUNDARIES.to_vec(),
            Self::Hertz => HERTZ_BOUNDARIES.to_vec(),
            Self::Count => COUNT_BOUNDARIES.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Unit; 6] = [
        Unit::Milliseconds,
        Unit::Bytes,
        Unit::Kilobytes,
        Unit::Ratio,
        Unit::Hertz,
        Unit::Count,
    ];

    #[test]
    fn test_buckets_strictly_increasing() {
        for unit in ALL {
            let b = unit.buckets();
            assert!(!b.is_empty(), "{unit:?} has no buckets");
            for w in b.windows(2) {
                assert!(w[0] < w[1], "{unit:?}: {} >= {}", w[0], w[1]);
            }
        }
    }

    #[test]
    fn test_ratio_buckets_end_at_one() {
        assert_eq!(Unit::Ratio.buckets().last().copied(), Some(1.0));
    }

    #[test]
    fn test_suffix() {
        assert_eq!(Unit::Milliseconds.suffix(), Some("milliseconds"));
        assert_eq!(Unit::Kilobytes.suffix(), Some("kilobytes"));
        assert_eq!(Unit::Count.suffix(), None);
    }
}
