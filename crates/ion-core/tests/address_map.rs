use ion_core::AddressMap;
use proptest::prelude::*;

fn map_of(keys: &[String]) -> AddressMap<String> {
    keys.iter().cloned().collect()
}

fn keys() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-e]{1,3}", 0..200)
}

proptest! {
    #[test]
    fn addresses_are_dense_and_ordered(keys in keys()) {
        let mut map = AddressMap::with_capacity(4);
        for (i, key) in keys.iter().enumerate() {
            prop_assert_eq!(map.assign(key.clone()), i);
        }
        prop_assert_eq!(map.len(), keys.len());
        for (i, key) in keys.iter().enumerate() {
            prop_assert_eq!(map.key(i), Some(key));
            let first = keys.iter().position(|k| k == key);
            prop_assert_eq!(map.get(key), first);
        }
        prop_assert_eq!(map.key(keys.len()), None);
    }

    #[test]
    fn truncate_keeps_lower_addresses(keys in keys(), cut in 0usize..220, more in keys()) {
        let mut map = map_of(&keys);
        map.truncate(cut);
        let kept = cut.min(keys.len());
        prop_assert_eq!(map.len(), kept);
        for (i, key) in keys.iter().enumerate() {
            if i < kept {
                prop_assert_eq!(map.key(i), Some(key));
            } else {
                prop_assert_eq!(map.key(i), None);
            }
        }
        for key in &keys[kept..] {
            if !keys[..kept].contains(key) {
                prop_assert_eq!(map.get(key), None);
            }
        }
        for (i, key) in more.iter().enumerate() {
            prop_assert_eq!(map.assign(key.clone()), kept + i);
        }
    }

    #[test]
    fn extension_follows_key_prefix(keys in keys(), more in keys()) {
        let base = map_of(&keys);
        prop_assert!(base.is_extension_of(&base));
        let mut extended = base.clone();
        extended.extend(more.iter().cloned());
        prop_assert!(extended.is_extension_of(&base));
        prop_assert_eq!(base.is_extension_of(&extended), more.is_empty());
    }
}

#[test]
fn get_or_assign_reuses_the_first_address() {
    let mut map = AddressMap::new();
    assert_eq!(map.assign("a"), 0);
    assert_eq!(map.assign("b"), 1);
    assert_eq!(map.assign("a"), 2);
    assert_eq!(map.get(&"a"), Some(0));
    assert_eq!(map.get_or_assign("a"), 0);
    assert_eq!(map.get_or_assign("c"), 3);
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec!["a", "b", "a", "c"]);
}

#[test]
fn truncate_reopens_duplicate_keys() {
    let mut map: AddressMap<&str> = ["x", "y", "x"].into_iter().collect();
    map.truncate(1);
    assert_eq!(map.get(&"x"), Some(0));
    assert_eq!(map.get(&"y"), None);
    assert_eq!(map.assign("y"), 1);
    map.clear();
    assert!(map.is_empty());
    assert_eq!(map.get(&"x"), None);
}

#[test]
fn growth_preserves_lookups() {
    let mut map = AddressMap::with_capacity(8);
    for i in 0..1000 {
        map.assign(i);
    }
    assert!(map.capacity() >= 1000);
    for i in 0..1000 {
        assert_eq!(map.get(&i), Some(i as usize));
    }
}

#[test]
fn different_keys_break_extension() {
    let a = map_of(&["x".into(), "y".into()]);
    let b = map_of(&["x".into(), "z".into(), "w".into()]);
    assert!(!b.is_extension_of(&a));
    assert!(!a.is_extension_of(&b));
    assert_eq!(a, a.clone());
}
