//! MRCZ header to application metadata mapping.

use mrczio_core::mapping::{identity, unwrap_single};
use mrczio_core::{MappingEntry, MetadataMapping};

/// Path of the beam energy in the application metadata.
pub const BEAM_ENERGY_PATH: &str = "Acquisition_instrument.TEM.beam_energy";

/// Path of the detector gain in the application metadata.
pub const GAIN_FACTOR_PATH: &str = "Signal.Noise_properties.Variance_linear_model.gain_factor";

/// Key under which the raw header is kept in `original_metadata`.
pub const ORIGINAL_HEADER_KEY: &str = "mrcz_header";

// No application field exists for the spherical aberration (C3).
static WRAPPED_MAPPING: [MappingEntry; 2] = [
    MappingEntry {
        source: "mrcz_header.voltage",
        destination: BEAM_ENERGY_PATH,
        transform: unwrap_single,
    },
    MappingEntry {
        source: "mrcz_header.gain",
        destination: GAIN_FACTOR_PATH,
        transform: unwrap_single,
    },
];

static BARE_MAPPING: [MappingEntry; 2] = [
    MappingEntry {
        source: "mrcz_header.voltage",
        destination: BEAM_ENERGY_PATH,
        transform: identity,
    },
    MappingEntry {
        source: "mrcz_header.gain",
        destination: GAIN_FACTOR_PATH,
        transform: identity,
    },
];

/// Shape of scalar header fields, which changed in codec version 0.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape {
    /// Before 0.5: scalars come wrapped in a single-element sequence.
    Wrapped,
    /// 0.5 and later: scalars are bare values.
    Bare,
}

impl HeaderShape {
    const FIRST_BARE: [u64; 2] = [0, 5];

    /// Picks the shape produced by a codec of the given version.
    ///
    /// Versions that cannot be parsed are assumed to be current.
    #[must_use]
    pub fn for_version(version: &str) -> Self {
        match parse_release(version) {
            Some(release) if release.as_slice() < Self::FIRST_BARE.as_slice() => Self::Wrapped,
            Some(_) => Self::Bare,
            None => {
                log::warn!("unrecognized codec version '{version}', assuming bare header fields");
                Self::Bare
            }
        }
    }

    /// Mapping table matching this header shape.
    #[must_use]
    pub fn mapping(self) -> MetadataMapping {
        match self {
            Self::Wrapped => MetadataMapping::new(&WRAPPED_MAPPING),
            Self::Bare => MetadataMapping::new(&BARE_MAPPING),
        }
    }
}

/// Parses the leading numeric release segments of a version string
/// (`"0.4.2rc1"` -> `[0, 4, 2]`), trailing zeros stripped.
fn parse_release(version: &str) -> Option<Vec<u64>> {
    let mut release = Vec::new();
    for segment in version.trim().trim_start_matches('v').split('.') {
        let digits: &str = &segment[..segment
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(segment.len())];
        if digits.is_empty() {
            break;
        }
        release.push(digits.parse().ok()?);
        if digits.len() != segment.len() {
            break;
        }
    }
    if release.is_empty() {
        return None;
    }
    while release.len() > 1 && release.last() == Some(&0) {
        release.pop();
    }
    Some(release)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrczio_core::Metadata;
    use serde_json::json;

    #[test]
    fn test_parse_release() {
        assert_eq!(parse_release("0.5"), Some(vec![0, 5]));
        assert_eq!(parse_release("0.5.0"), Some(vec![0, 5]));
        assert_eq!(parse_release("0.4.2rc1"), Some(vec![0, 4, 2]));
        assert_eq!(parse_release("v1.0"), Some(vec![1]));
        assert_eq!(parse_release("dev"), None);
    }

    #[test]
    fn test_shape_for_version() {
        assert_eq!(HeaderShape::for_version("0.4.9"), HeaderShape::Wrapped);
        assert_eq!(HeaderShape::for_version("0.5"), HeaderShape::Bare);
        assert_eq!(HeaderShape::for_version("0.5.0"), HeaderShape::Bare);
        assert_eq!(HeaderShape::for_version("0.10.1"), HeaderShape::Bare);
        assert_eq!(HeaderShape::for_version("unknown"), HeaderShape::Bare);
    }

    #[test]
    fn test_wrapped_mapping_unwraps() {
        let mut original = Metadata::new();
        original.set("mrcz_header.voltage", json!([300.0])).unwrap();
        original.set("mrcz_header.gain", json!([2.0])).unwrap();

        let mapped = HeaderShape::Wrapped.mapping().apply(&original).unwrap();
        assert_eq!(mapped.get_f64(BEAM_ENERGY_PATH).unwrap(), Some(300.0));
        assert_eq!(mapped.get_f64(GAIN_FACTOR_PATH).unwrap(), Some(2.0));
    }

    #[test]
    fn test_bare_mapping_keeps_values() {
        let mut original = Metadata::new();
        original.set("mrcz_header.voltage", json!(200.0)).unwrap();

        let mapped = HeaderShape::Bare.mapping().apply(&original).unwrap();
        assert_eq!(mapped.get_f64(BEAM_ENERGY_PATH).unwrap(), Some(200.0));
        assert!(!mapped.contains(GAIN_FACTOR_PATH));
    }
}
