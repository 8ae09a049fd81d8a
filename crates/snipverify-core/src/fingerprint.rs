//! Verification fingerprints
//!
//! A [`Fingerprint`] is a 32-byte Blake3 digest over the normalized snippet
//! text, its language, the expected-output check and every field of the
//! [`ExecutionSpec`]. Two submissions with the same fingerprint are
//! guaranteed to be judged under identical conditions, which is what lets
//! the cache answer for them.

use crate::snippet::Snippet;
use crate::spec::ExecutionSpec;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Bumped whenever the hashed layout changes so stale verdicts stop matching
const FINGERPRINT_VERSION: u8 = 2;

/// A 32-byte verification fingerprint (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a fingerprint from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create fingerprint from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FingerprintError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FingerprintError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Fingerprint a snippet under an execution spec
    #[must_use]
    pub fn compute(snippet: &Snippet, spec: &ExecutionSpec) -> Self {
        let mut h = FieldHasher::new();
        h.byte(FINGERPRINT_VERSION);

        h.str(&snippet.normalized_source());
        h.str(snippet.language().as_str());
        match snippet.expected() {
            Some(expected) => {
                let (kind, value) = expected.canonical();
                h.byte(1);
                h.str(kind);
                h.str(value);
            }
            None => h.byte(0),
        }

        let profile = spec.profile();
        h.str(profile.language.as_str());
        h.str(&profile.image);
        h.u64(profile.command.len() as u64);
        for arg in &profile.command {
            h.str(arg);
        }
        h.str(&profile.source_file);

        let ceiling = spec.ceiling();
        h.u64(u64::from(ceiling.cpu_millicores));
        h.u64(ceiling.memory_bytes);
        h.u64(u64::try_from(ceiling.wall_clock.as_millis()).unwrap_or(u64::MAX));
        h.u64(u64::from(ceiling.pids));
        h.str(&format!("{:?}", spec.network()));
        h.str(&format!("{:?}", spec.filesystem()));
        h.u64(spec.output_limit() as u64);

        Self(*h.finish().as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

/// Length-prefixed field hashing so adjacent fields cannot bleed into each other
struct FieldHasher(blake3::Hasher);

impl FieldHasher {
    fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    fn byte(&mut self, b: u8) {
        self.0.update(&[b]);
    }

    fn u64(&mut self, v: u64) {
        self.0.update(&v.to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u64(s.len() as u64);
        self.0.update(s.as_bytes());
    }

    fn finish(&self) -> blake3::Hash {
        self.0.finalize()
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FingerprintVisitor;

        impl serde::de::Visitor<'_> for FingerprintVisitor {
            type Value = Fingerprint;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-char hex string or 32 bytes")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Fingerprint::from_slice(v).map_err(E::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(FingerprintVisitor)
        } else {
            deserializer.deserialize_bytes(FingerprintVisitor)
        }
    }
}

/// Errors that can occur when parsing fingerprints
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Invalid length
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::snippet::ExpectedOutput;
    use crate::spec::{ResourceCeiling, RuntimeProfile};
    use proptest::prelude::*;
    use std::time::Duration;

    fn spec() -> ExecutionSpec {
        ExecutionSpec::new(
            RuntimeProfile::new(Language::Python, "python:3.12-alpine", ["python3"], "snippet.py"),
            ResourceCeiling::default(),
        )
    }

    #[test]
    fn deterministic_across_snippet_ids() {
        let a = Snippet::new("print(1)", "python");
        let b = Snippet::new("print(1)", "python");
        assert_ne!(a.id(), b.id());
        assert_eq!(Fingerprint::compute(&a, &spec()), Fingerprint::compute(&b, &spec()));
    }

    #[test]
    fn normalization_applies() {
        let a = Snippet::new("print(1)\r\n\r\n", "python");
        let b = Snippet::new("print(1)", "python");
        assert_eq!(Fingerprint::compute(&a, &spec()), Fingerprint::compute(&b, &spec()));

        let quoted = Snippet::new("s = 'a   \nb'", "python");
        let tight = Snippet::new("s = 'a\nb'", "python");
        assert_ne!(Fingerprint::compute(&quoted, &spec()), Fingerprint::compute(&tight, &spec()));
    }

    #[test]
    fn spec_changes_fingerprint() {
        let s = Snippet::new("print(1)", "python");
        let base = Fingerprint::compute(&s, &spec());
        let longer = Fingerprint::compute(&s, &spec().with_deadline(Duration::from_secs(9)));
        let smaller = Fingerprint::compute(&s, &spec().with_output_limit(10));
        assert_ne!(base, longer);
        assert_ne!(base, smaller);
    }

    #[test]
    fn expectation_changes_fingerprint() {
        let plain = Snippet::new("print(1)", "python");
        let exact = plain.clone().with_expected(ExpectedOutput::Exact("1".into()));
        let contains = plain.clone().with_expected(ExpectedOutput::Contains("1".into()));
        let fp = |s: &Snippet| Fingerprint::compute(s, &spec());
        assert_ne!(fp(&plain), fp(&exact));
        assert_ne!(fp(&exact), fp(&contains));
    }

    #[test]
    fn display_and_parse() {
        let fp = Fingerprint::compute(&Snippet::new("x", "python"), &spec());
        let parsed: Fingerprint = fp.to_string().parse().unwrap();
        assert_eq!(fp, parsed);
        assert_eq!(fp.short().len(), 16);
        assert!(fp.to_string().starts_with(&fp.short()));
    }

    #[test]
    fn from_slice_invalid_length() {
        let result = Fingerprint::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(FingerprintError::InvalidLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn serde_json_is_hex() {
        let fp = Fingerprint::new([7u8; 32]);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json.len(), 66);
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    proptest! {
        #[test]
        fn distinct_sources_distinct_fingerprints(a in "[a-z0-9()=+ ]{1,40}", b in "[a-z0-9()=+ ]{1,40}") {
            let na = crate::snippet::normalize_source(&a);
            let nb = crate::snippet::normalize_source(&b);
            prop_assume!(na != nb);
            let fa = Fingerprint::compute(&Snippet::new(a, "python"), &spec());
            let fb = Fingerprint::compute(&Snippet::new(b, "python"), &spec());
            prop_assert_ne!(fa, fb);
        }

        #[test]
        fn trailing_blank_lines_never_matter(src in "[a-z0-9()=+]{1,40}", crlf in any::<bool>(), blank in 0usize..4) {
            let eol = if crlf { "\r\n" } else { "\n" };
            let padded = format!("{src}{}", eol.repeat(blank));
            let fa = Fingerprint::compute(&Snippet::new(src, "python"), &spec());
            let fb = Fingerprint::compute(&Snippet::new(padded, "python"), &spec());
            prop_assert_eq!(fa, fb);
        }

        #[test]
        fn trailing_spaces_inside_a_line_matter(src in "[a-z0-9()=+]{1,40}", pad in "[ \t]{1,5}") {
            let padded = format!("{src}{pad}\nprint(1)");
            let plain = format!("{src}\nprint(1)");
            let fa = Fingerprint::compute(&Snippet::new(plain, "python"), &spec());
            let fb = Fingerprint::compute(&Snippet::new(padded, "python"), &spec());
            prop_assert_ne!(fa, fb);
        }
    }
}
