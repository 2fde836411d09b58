use comboreq::features::{self, FeatureSet};
use comboreq::request::{Batch, RequestBuilder};
use comboreq::{ModuleIdMap, ModuleRequest, decode_request};
use proptest::prelude::*;

/// Slash-delimited names free of the reserved characters.
fn name_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9]{0,5}(/[a-z][a-z0-9.]{0,5}){0,3}")
        .expect("valid regex")
}

fn name_list_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::hash_set(name_strategy(), 1..max)
        .prop_map(|set| set.into_iter().collect())
}

fn build_and_reassemble(names: &[String], budget: usize) -> Vec<ModuleRequest> {
    let mut batch = Batch::new();
    for name in names {
        batch.add_module(name.as_str());
    }
    let mut builder = RequestBuilder::new("/combo").max_url_length(budget);
    let urls = builder.build(batch).unwrap();
    let map = ModuleIdMap::default();
    let mut reassembled = Vec::new();
    for url in &urls {
        reassembled.extend(decode_request(url, &map, &[]).unwrap().modules);
    }
    reassembled
}

proptest! {
    #[test]
    fn prop_name_list_roundtrips(names in name_list_strategy(24)) {
        let reassembled = build_and_reassemble(&names, 0);
        let expected: Vec<ModuleRequest> =
            names.iter().map(|n| ModuleRequest::new(n.clone())).collect();
        prop_assert_eq!(reassembled, expected);
    }

    #[test]
    fn prop_split_preserves_order_and_budget(
        names in name_list_strategy(32),
        budget in 120usize..400
    ) {
        let mut batch = Batch::new();
        for name in &names {
            batch.add_module(name.as_str());
        }
        let mut builder = RequestBuilder::new("/combo").max_url_length(budget);
        let urls = builder.build(batch).unwrap();
        let map = ModuleIdMap::default();
        let mut reassembled = Vec::new();
        for url in &urls {
            let decoded = decode_request(url, &map, &[]).unwrap();
            // A request either fits the budget or could not be split
            // further.
            prop_assert!(
                url.len() <= budget || decoded.modules.len() == 1,
                "unsplittable over-budget url: {}",
                url
            );
            reassembled.extend(decoded.modules);
        }
        let expected: Vec<ModuleRequest> =
            names.iter().map(|n| ModuleRequest::new(n.clone())).collect();
        prop_assert_eq!(reassembled, expected);
    }

    #[test]
    fn prop_feature_trits_roundtrip(
        entries in proptest::collection::btree_map(
            "[a-z][a-z0-9-]{0,8}",
            proptest::option::of(any::<bool>()),
            0..40,
        )
    ) {
        // The canonical list covers every name; `None` means the
        // feature is unknown and must come back absent.
        let canonical: Vec<String> = entries.keys().cloned().collect();
        let set: FeatureSet = entries
            .iter()
            .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
            .collect();

        let encoded = features::encode(&set, &canonical).unwrap();
        let decoded = features::decode(&encoded, &canonical).unwrap();
        prop_assert_eq!(decoded, set);
    }

    #[test]
    fn prop_plain_feature_form_roundtrips(
        entries in proptest::collection::btree_map(
            "[a-z][a-z0-9-]{0,8}",
            any::<bool>(),
            1..20,
        )
    ) {
        let set: FeatureSet = entries;
        let plain = features::plain(&set).unwrap();
        prop_assert_eq!(features::parse_plain(&plain), set);
    }

    #[test]
    fn prop_id_list_roundtrips(
        ids in proptest::collection::hash_set(1u32..200_000, 1..32),
        gap_every in 1usize..5
    ) {
        let ids: Vec<u32> = ids.into_iter().collect();
        let mut map = ModuleIdMap::new(vec![0xFE, 0xED]);
        for (i, &id) in ids.iter().enumerate() {
            map.insert(format!("mod{i}"), id).unwrap();
        }

        // Leave periodic holes so the encoder has to emit multiple
        // segments; holes are filled by a folded module in real use.
        let mut builder = comboreq::idlist::IdListBuilder::default();
        let mut expected: Vec<Option<ModuleRequest>> = Vec::new();
        let mut position = 0u32;
        for (i, _) in ids.iter().enumerate() {
            if i > 0 && i % gap_every == 0 {
                expected.push(None);
                position += 1;
            }
            let module = ModuleRequest::new(format!("mod{i}"));
            prop_assert!(builder.try_add(&module, position, &map));
            expected.push(Some(module));
            position += 1;
        }

        let encoded = builder.finish(Some(map.hash()));
        let mut out = Vec::new();
        comboreq::idlist::decode(&encoded, &map, true, &mut out).unwrap();
        prop_assert_eq!(out, expected);
    }
}
