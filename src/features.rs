// Feature-flag codec.
//
// A feature set is sparse: each name is true, false, or simply unknown.
// Against a canonical feature list shared with the server, the set packs
// into one base-3 digit (trit) per canonical entry — 0=false, 1=true,
// 2=unknown — five trits per byte by positional weight, behind a 2-byte
// little-endian length prefix, then base64url without padding.
//
// When no canonical list is available the plain `has=` form is used: the
// sorted `name`/`!name` list joined by `*`.  A cookie store plus digest
// lets a long plain list travel in a cookie with only its hash in the
// URL (`hashhash=`).

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::debug;
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Sparse named feature flags.  Absent names are "unknown" on the wire.
pub type FeatureSet = BTreeMap<String, bool>;

/// Cookie lifetime for the side-channel feature list, in days.
const FEATURE_COOKIE_EXPIRE_DAYS: i32 = 1;

// ---------------------------------------------------------------------------
// Trit-packed encoding
// ---------------------------------------------------------------------------

/// Encode `features` against the canonical list.  Features not present
/// in the list are silently dropped.
pub fn encode(features: &FeatureSet, canonical: &[String]) -> Result<String, CodecError> {
    let len = canonical.len();
    if len > usize::from(u16::MAX) {
        return Err(CodecError::FeatureListTooLong(len));
    }
    let mut bytes = Vec::with_capacity(2 + len.div_ceil(5));
    bytes.push((len & 0xFF) as u8);
    bytes.push((len >> 8) as u8);

    let mut packed = 0u8;
    for (i, name) in canonical.iter().enumerate() {
        let trit: u8 = match features.get(name) {
            Some(false) => 0,
            Some(true) => 1,
            None => 2,
        };
        packed += trit * 3u8.pow((i % 5) as u32);
        if i % 5 == 4 || i == len - 1 {
            bytes.push(packed);
            packed = 0;
        }
    }
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decode a trit-packed feature arg.  The embedded length must equal the
/// decoder's canonical list length; trits of 2 are omitted from the
/// result.
pub fn decode(encoded: &str, canonical: &[String]) -> Result<FeatureSet, CodecError> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
    let Some([lo, hi]) = bytes.get(..2).map(|b| [b[0], b[1]]) else {
        return Err(CodecError::InvalidFeatureListLength {
            expected: canonical.len(),
            actual: 0,
        });
    };
    let len = usize::from(u16::from_le_bytes([lo, hi]));
    if len != canonical.len() {
        return Err(CodecError::InvalidFeatureListLength {
            expected: canonical.len(),
            actual: len,
        });
    }

    let mut result = FeatureSet::new();
    for (byte_idx, &byte) in bytes[2..].iter().enumerate() {
        let mut q = byte;
        for j in 0..5 {
            let i = byte_idx * 5 + j;
            if i >= len {
                break;
            }
            match q % 3 {
                0 => {
                    result.insert(canonical[i].clone(), false);
                }
                1 => {
                    result.insert(canonical[i].clone(), true);
                }
                _ => {}
            }
            q /= 3;
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Plain-text form
// ---------------------------------------------------------------------------

/// The plain `has=` value: sorted `name`/`!name` entries joined by `*`.
/// `None` when the set is empty (the parameter is omitted entirely).
pub fn plain(features: &FeatureSet) -> Option<String> {
    if features.is_empty() {
        return None;
    }
    let mut entries: Vec<String> = features
        .iter()
        .map(|(name, &value)| {
            if value {
                name.clone()
            } else {
                format!("!{name}")
            }
        })
        .collect();
    entries.sort();
    Some(entries.join("*"))
}

/// Invert [`plain`].  Accepts `;` as an alternate delimiter for parity
/// with the server-side parser.
pub fn parse_plain(text: &str) -> FeatureSet {
    let mut features = FeatureSet::new();
    for entry in text.split(['*', ';']) {
        if entry.is_empty() {
            continue;
        }
        match entry.strip_prefix('!') {
            Some(name) => features.insert(name.to_string(), false),
            None => features.insert(entry.to_string(), true),
        };
    }
    features
}

// ---------------------------------------------------------------------------
// Query-arg policy
// ---------------------------------------------------------------------------

/// Caller-supplied cookie storage for the feature side channel.  The
/// actual storage mechanics (browser, jar, test capture) are outside the
/// codec.
pub trait CookieStore {
    /// Set (or, with `value == None`, clear) a cookie.
    fn set(
        &mut self,
        name: &str,
        value: Option<&str>,
        expire_days: i32,
        path: &str,
        domain: Option<&str>,
    );
}

/// Pick the feature query arg for a batch: `hasEnc=` when a canonical
/// list is shared, else `hashhash=` when a cookie store can carry the
/// full list, else the plain `has=`.  `None` when the feature set is
/// empty.
pub fn query_arg(
    features: &FeatureSet,
    canonical: Option<&[String]>,
    cookie_store: Option<&mut (dyn CookieStore + 'static)>,
    context_path: &str,
) -> Result<Option<(&'static str, String)>, CodecError> {
    let Some(plain_arg) = plain(features) else {
        return Ok(None);
    };
    if let Some(canonical) = canonical {
        return Ok(Some(("hasEnc", encode(features, canonical)?)));
    }
    if let Some(store) = cookie_store {
        let digest = hex_digest(&plain_arg);
        debug!("feature list stashed in cookie, digest {digest}");
        store.set(
            "has",
            Some(&plain_arg),
            FEATURE_COOKIE_EXPIRE_DAYS,
            context_path,
            None,
        );
        return Ok(Some(("hashhash", digest)));
    }
    Ok(Some(("has", plain_arg)))
}

fn hex_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn features(entries: &[(&str, bool)]) -> FeatureSet {
        entries
            .iter()
            .map(|&(name, value)| (name.to_string(), value))
            .collect()
    }

    #[test]
    fn roundtrips_sparse_set() {
        let list = canonical(&["0", "1", "2", "3", "4", "5", "6"]);
        let set = features(&[("0", false), ("2", true)]);
        let encoded = encode(&set, &list).unwrap();
        assert_eq!(decode(&encoded, &list).unwrap(), set);
    }

    #[test]
    fn unknown_features_dropped_on_encode() {
        let list = canonical(&["a", "b"]);
        let set = features(&[("a", true), ("zzz", true)]);
        let decoded = decode(&encode(&set, &list).unwrap(), &list).unwrap();
        assert_eq!(decoded, features(&[("a", true)]));
    }

    #[test]
    fn trit_packing_layout() {
        // Six entries: trits 1,0,2,2,2 then 1 → bytes are
        // len=6 (le) and [1 + 0*3 + 2*9 + 2*27 + 2*81, 1].
        let list = canonical(&["a", "b", "c", "d", "e", "f"]);
        let set = features(&[("a", true), ("b", false), ("f", true)]);
        let bytes = URL_SAFE_NO_PAD
            .decode(encode(&set, &list).unwrap())
            .unwrap();
        assert_eq!(bytes, vec![6, 0, 1 + 18 + 54 + 162, 1]);
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let encoded = encode(&FeatureSet::new(), &canonical(&["a", "b"])).unwrap();
        assert!(matches!(
            decode(&encoded, &canonical(&["a"])),
            Err(CodecError::InvalidFeatureListLength {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn empty_canonical_list() {
        let encoded = encode(&features(&[("a", true)]), &[]).unwrap();
        assert_eq!(decode(&encoded, &[]).unwrap(), FeatureSet::new());
    }

    #[test]
    fn plain_form_sorts_decorated_entries() {
        let set = features(&[("dom", true), ("air", false), ("touch", true)]);
        assert_eq!(plain(&set).unwrap(), "!air*dom*touch");
        assert_eq!(parse_plain("!air*dom*touch"), set);
        assert_eq!(plain(&FeatureSet::new()), None);
    }

    #[test]
    fn parse_plain_accepts_semicolons() {
        assert_eq!(
            parse_plain("a;!b"),
            features(&[("a", true), ("b", false)])
        );
    }

    #[derive(Default)]
    struct CapturingStore {
        set_calls: Vec<(String, Option<String>, String)>,
    }

    impl CookieStore for CapturingStore {
        fn set(
            &mut self,
            name: &str,
            value: Option<&str>,
            _expire_days: i32,
            path: &str,
            _domain: Option<&str>,
        ) {
            self.set_calls
                .push((name.to_string(), value.map(str::to_string), path.to_string()));
        }
    }

    #[test]
    fn query_arg_prefers_trit_encoding() {
        let list = canonical(&["a"]);
        let set = features(&[("a", true)]);
        let (key, _) = query_arg(&set, Some(&list), None, "/combo")
            .unwrap()
            .unwrap();
        assert_eq!(key, "hasEnc");
    }

    #[test]
    fn query_arg_falls_back_to_cookie_then_plain() {
        let set = features(&[("a", true), ("b", false)]);

        let mut store = CapturingStore::default();
        let (key, digest) = query_arg(&set, None, Some(&mut store), "/combo")
            .unwrap()
            .unwrap();
        assert_eq!(key, "hashhash");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            store.set_calls,
            vec![(
                "has".to_string(),
                Some("!b*a".to_string()),
                "/combo".to_string()
            )]
        );

        let (key, value) = query_arg(&set, None, None, "/combo").unwrap().unwrap();
        assert_eq!((key, value.as_str()), ("has", "!b*a"));
    }

    #[test]
    fn query_arg_omitted_for_empty_set() {
        assert!(query_arg(&FeatureSet::new(), None, None, "/").unwrap().is_none());
    }
}
