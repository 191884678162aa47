use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

static LEGACY_DIGEST_PREFIXES: &[&str] = &["sha256:", "sha384:", "sha512:"];

/// Per-container digest map persisted in the `last-digest` annotation.
///
/// The canonical serialization is `name:digest` pairs in ascending
/// lexicographic order by name, joined with commas. Encoding is a fixed
/// point: re-encoding unchanged data is byte-identical to the previously
/// persisted value, so string comparison against the raw annotation is a
/// valid "nothing to write" short-circuit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestMap {
    digests: BTreeMap<String, String>,
}

/// Decoded form of the `last-digest` annotation. The legacy variant is a
/// bare digest written before per-container maps existed; it belongs to the
/// first tracked container and is rewritten canonically on the next
/// successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredDigests {
    Absent,
    Legacy(String),
    Map(DigestMap),
}

#[derive(Debug, PartialEq, Eq)]
pub struct StateFormatError {
    pub value: String,
}

impl std::error::Error for StateFormatError {}
impl fmt::Display for StateFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "annotation value matches neither canonical nor legacy digest format: {}",
            self.value
        )
    }
}

impl DigestMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.digests.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: String, digest: String) {
        self.digests.insert(name, digest);
    }

    /// Drops entries for containers that are no longer tracked.
    pub fn retain_names(&mut self, names: &BTreeSet<String>) {
        self.digests.retain(|name, _| names.contains(name));
    }

    /// Canonical alphabetical serialization.
    pub fn encode(&self) -> String {
        self.digests
            .iter()
            .map(|(name, digest)| format!("{}:{}", name, digest))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromIterator<(String, String)> for DigestMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            digests: iter.into_iter().collect(),
        }
    }
}

impl StoredDigests {
    /// Decodes the raw annotation value, trying the canonical format first
    /// and falling back to the legacy bare-digest shape.
    pub fn decode(value: Option<&str>) -> Result<Self, StateFormatError> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(StoredDigests::Absent);
        };

        if LEGACY_DIGEST_PREFIXES.iter().any(|p| value.starts_with(p))
            && !value.contains(',')
        {
            return Ok(StoredDigests::Legacy(value.to_string()));
        }

        let mut digests = BTreeMap::new();
        for entry in value.split(',') {
            let entry = entry.trim();
            let Some((name, digest)) = entry.split_once(':') else {
                continue;
            };
            let (name, digest) = (name.trim(), digest.trim());
            if !name.is_empty() && !digest.is_empty() {
                digests.insert(name.to_string(), digest.to_string());
            }
        }

        if digests.is_empty() {
            return Err(StateFormatError {
                value: value.to_string(),
            });
        }

        Ok(StoredDigests::Map(DigestMap { digests }))
    }

    /// Resolves the decoded value into a map, attributing a legacy bare
    /// digest to the given container (the first tracked one by selection
    /// order). Returns whether a legacy migration took place.
    pub fn into_map(self, first_tracked: &str) -> (DigestMap, bool) {
        match self {
            StoredDigests::Absent => (DigestMap::new(), false),
            StoredDigests::Legacy(digest) => (
                DigestMap::from_iter([(first_tracked.to_string(), digest)]),
                true,
            ),
            StoredDigests::Map(map) => (map, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_absent() {
        assert_eq!(StoredDigests::decode(None), Ok(StoredDigests::Absent));
        assert_eq!(StoredDigests::decode(Some("")), Ok(StoredDigests::Absent));
        assert_eq!(StoredDigests::decode(Some("  ")), Ok(StoredDigests::Absent));
    }

    #[test]
    fn test_decode_canonical_single_entry() {
        let decoded = StoredDigests::decode(Some("web:sha256:111")).expect("should decode");
        let StoredDigests::Map(map) = decoded else {
            panic!("expected map");
        };
        assert_eq!(map.get("web"), Some("sha256:111"));
    }

    #[test]
    fn test_decode_canonical_multiple_entries() {
        let decoded =
            StoredDigests::decode(Some("web:sha256:111,sidecar:sha256:222")).expect("should decode");
        let StoredDigests::Map(map) = decoded else {
            panic!("expected map");
        };
        assert_eq!(map.get("web"), Some("sha256:111"));
        assert_eq!(map.get("sidecar"), Some("sha256:222"));
    }

    #[test]
    fn test_decode_legacy_bare_digest() {
        let decoded = StoredDigests::decode(Some("sha256:999")).expect("should decode");
        assert_eq!(decoded, StoredDigests::Legacy("sha256:999".to_string()));
    }

    #[test]
    fn test_decode_corrupt_value() {
        let err = StoredDigests::decode(Some("not a digest map")).expect_err("should fail");
        assert_eq!(err.value, "not a digest map");
    }

    #[test]
    fn test_decode_skips_malformed_entries() {
        let decoded =
            StoredDigests::decode(Some("web:sha256:111,garbage")).expect("should decode");
        let StoredDigests::Map(map) = decoded else {
            panic!("expected map");
        };
        assert_eq!(map.get("web"), Some("sha256:111"));
        assert!(map.get("garbage").is_none());
    }

    #[test]
    fn test_encode_is_alphabetical() {
        let map = DigestMap::from_iter([
            ("web".to_string(), "sha256:111".to_string()),
            ("api".to_string(), "sha256:222".to_string()),
        ]);
        assert_eq!(map.encode(), "api:sha256:222,web:sha256:111");
    }

    #[test]
    fn test_encode_decode_fixed_point() {
        let canonical = "api:sha256:222,web:sha256:111";
        let decoded = StoredDigests::decode(Some(canonical)).expect("should decode");
        let StoredDigests::Map(map) = decoded else {
            panic!("expected map");
        };
        assert_eq!(map.encode(), canonical);
    }

    #[test]
    fn test_decode_normalizes_whitespace() {
        let decoded =
            StoredDigests::decode(Some(" web:sha256:111 , api:sha256:222 ")).expect("should decode");
        let StoredDigests::Map(map) = decoded else {
            panic!("expected map");
        };
        assert_eq!(map.encode(), "api:sha256:222,web:sha256:111");
    }

    #[test]
    fn test_legacy_migration_attributes_first_tracked() {
        let decoded = StoredDigests::decode(Some("sha256:999")).expect("should decode");
        let (map, migrated) = decoded.into_map("web");
        assert!(migrated);
        assert_eq!(map.encode(), "web:sha256:999");
    }

    #[test]
    fn test_retain_names_drops_stale_entries() {
        let mut map = DigestMap::from_iter([
            ("web".to_string(), "sha256:111".to_string()),
            ("old".to_string(), "sha256:000".to_string()),
        ]);
        map.retain_names(&BTreeSet::from(["web".to_string()]));
        assert_eq!(map.encode(), "web:sha256:111");
    }
}
