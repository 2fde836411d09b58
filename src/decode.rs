// Request decoding for diagnostics and testing.
//
// Normal operation decodes on the server; this mirror of that path lets
// a built URL be checked for exact round-tripping.  The positioned
// module list is re-assembled from both the folded-trie arg and the id
// arg, then validated: the `count` arg must match and the list may not
// have holes.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;

use crate::error::CodecError;
use crate::features::{self, FeatureSet};
use crate::idlist;
use crate::module::{ModuleIdMap, ModuleRequest};
use crate::trie::{text, unfold};

/// A fully decoded combo request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedRequest {
    /// The requested module list, in load order.
    pub modules: Vec<ModuleRequest>,
    /// Bootstrap/expansion-layer dependencies (`reqExpEx`).
    pub excludes: Vec<ModuleRequest>,
    /// Decoded feature flags (`hasEnc` or `has`).
    pub features: FeatureSet,
    /// Digest from a `hashhash=` arg; the feature list itself travels in
    /// a cookie the decoder cannot see.
    pub feature_digest: Option<String>,
}

/// Decode a built URL's query args.
pub fn decode_request(
    url: &str,
    id_map: &ModuleIdMap,
    canonical_features: &[String],
) -> Result<DecodedRequest, CodecError> {
    let args = parse_query_args(url);
    let mut result = DecodedRequest::default();

    let mut positioned: Vec<Option<ModuleRequest>> = Vec::new();
    if let Some(encoded) = args.get("modules") {
        unfold(&text::decode(encoded)?, &mut positioned)?;
    }
    if let Some(encoded) = args.get("moduleIds") {
        idlist::decode(encoded, id_map, true, &mut positioned)?;
    }
    if let Some(count) = args.get("count") {
        let expected: usize = count.parse().map_err(|_| CodecError::InvalidCount {
            expected: 0,
            actual: positioned.len(),
        })?;
        if positioned.len() != expected {
            return Err(CodecError::InvalidCount {
                expected,
                actual: positioned.len(),
            });
        }
    }
    result.modules = collect(positioned)?;

    let mut positioned: Vec<Option<ModuleRequest>> = Vec::new();
    if let Some(encoded) = args.get("reqExpEx") {
        unfold(&text::decode(encoded)?, &mut positioned)?;
    }
    if let Some(encoded) = args.get("reqExpExIds") {
        idlist::decode(encoded, id_map, false, &mut positioned)?;
    }
    result.excludes = collect(positioned)?;

    if let Some(encoded) = args.get("hasEnc") {
        result.features = features::decode(encoded, canonical_features)?;
    } else if let Some(plain) = args.get("has") {
        result.features = features::parse_plain(plain);
    } else if let Some(digest) = args.get("hashhash") {
        result.feature_digest = Some(digest.clone());
    }

    Ok(result)
}

/// Contiguity check: every position up to the highest one must be
/// assigned.
fn collect(positioned: Vec<Option<ModuleRequest>>) -> Result<Vec<ModuleRequest>, CodecError> {
    positioned
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or(CodecError::UnassignedPosition(i)))
        .collect()
}

/// Split the query string into an arg map.  Multivalued args are not
/// supported; the last instance wins.
fn parse_query_args(url: &str) -> HashMap<String, String> {
    let query = match url.split_once('?') {
        Some((_, query)) => query,
        None => url,
    };
    let mut args = HashMap::new();
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            args.insert(
                percent_decode_str(key).decode_utf8_lossy().into_owned(),
                percent_decode_str(value).decode_utf8_lossy().into_owned(),
            );
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Batch, RequestBuilder};

    fn id_map() -> ModuleIdMap {
        let mut map = ModuleIdMap::new(vec![0xCA, 0xFE]);
        map.insert("app/main", 1).unwrap();
        map.insert("text", 2).unwrap();
        map.insert("app/view.html", 3).unwrap();
        map
    }

    #[test]
    fn mixed_codec_request_roundtrips() {
        let mut batch = Batch::new();
        batch
            .add_module("app/main")
            .add_module("unmapped/module")
            .add_module("text!app/view.html");
        batch.set_feature("touch", true).set_feature("ie", false);

        let canonical = vec!["ie".to_string(), "touch".to_string()];
        let mut builder = RequestBuilder::new("/combo")
            .max_url_length(0)
            .id_map(id_map())
            .canonical_features(canonical.clone());
        let urls = builder.build(batch.clone()).unwrap();
        assert_eq!(urls.len(), 1);

        let decoded = decode_request(&urls[0], &id_map(), &canonical).unwrap();
        assert_eq!(decoded.modules, batch.modules);
        assert_eq!(decoded.features, batch.features);
        assert!(decoded.excludes.is_empty());
    }

    #[test]
    fn excludes_roundtrip_without_hash() {
        let mut builder = RequestBuilder::new("/combo")
            .max_url_length(0)
            .id_map(id_map())
            .boot_layer_deps(vec![
                ModuleRequest::new("app/main"),
                ModuleRequest::new("boot/loader"),
            ]);
        let urls = builder.build(Batch::new()).unwrap();
        let decoded = decode_request(&urls[0], &id_map(), &[]).unwrap();
        assert_eq!(
            decoded.excludes,
            vec![
                ModuleRequest::new("app/main"),
                ModuleRequest::new("boot/loader"),
            ]
        );
    }

    #[test]
    fn count_mismatch_is_fatal() {
        let err = decode_request(
            "/combo?count=3&modules=(a!0*b!1)",
            &ModuleIdMap::default(),
            &[],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidCount {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn holes_are_fatal() {
        let err = decode_request(
            "/combo?count=3&modules=(a!0*b!2)",
            &ModuleIdMap::default(),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::UnassignedPosition(1)));
    }

    #[test]
    fn plain_has_arg_parses() {
        let decoded = decode_request(
            "/combo?count=0&has=!air*dom",
            &ModuleIdMap::default(),
            &[],
        )
        .unwrap();
        assert_eq!(decoded.features.get("dom"), Some(&true));
        assert_eq!(decoded.features.get("air"), Some(&false));
    }

    #[test]
    fn hashhash_arg_surfaces_digest() {
        let decoded = decode_request(
            "/combo?count=0&hashhash=abc123",
            &ModuleIdMap::default(),
            &[],
        )
        .unwrap();
        assert!(decoded.features.is_empty());
        assert_eq!(decoded.feature_digest.as_deref(), Some("abc123"));
    }

    #[test]
    fn percent_encoded_args_decode() {
        let decoded = decode_request(
            "/combo?count=1&modules=(a%7Cb!0)",
            &ModuleIdMap::default(),
            &[],
        )
        .unwrap();
        assert_eq!(decoded.modules, vec![ModuleRequest::new("a!b")]);
    }
}
