use std::collections::BTreeMap;

use config_core::{ConfigManager, ManagerConfig, RamBackend, Value};
use proptest::prelude::*;

fn manager() -> ConfigManager {
    ConfigManager::with_config(ManagerConfig::default()).expect("init")
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9._]{0,15}"
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::I32),
        any::<u32>().prop_map(Value::U32),
        any::<i64>().prop_map(Value::I64),
        any::<u32>().prop_map(|bits| Value::Float(f32::from_bits(bits))),
        any::<bool>().prop_map(Value::Bool),
        "[ -~]{0,64}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..128).prop_map(Value::Blob),
    ]
}

/// Equality that compares floats by bit pattern, so NaN payloads count.
fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

proptest! {
    #[test]
    fn set_then_get_is_exact(key in arb_key(), value in arb_value()) {
        let manager = manager();
        manager.set_value(&key, value.clone()).unwrap();
        let stored = manager.get_value(&key).unwrap();
        prop_assert!(same(&stored, &value), "{stored:?} != {value:?}");
    }

    #[test]
    fn namespaces_are_isolated(key in arb_key(), a in any::<i64>(), b in any::<i64>()) {
        let manager = manager();
        let first = manager.open_namespace("first").unwrap();
        let second = manager.open_namespace("second").unwrap();

        manager.ns_set_i64(second, &key, b).unwrap();
        manager.ns_set_i64(first, &key, a).unwrap();
        manager.set_i64(&key, a.wrapping_add(1)).unwrap();

        prop_assert_eq!(manager.ns_get_i64(second, &key, 0).unwrap(), b);
        prop_assert_eq!(manager.ns_get_i64(first, &key, 0).unwrap(), a);
        prop_assert_eq!(manager.ns_get_count(second).unwrap(), 1);
    }

    #[test]
    fn reset_restores_default(key in arb_key(), default in any::<u32>(), live in proptest::option::of(any::<u32>())) {
        let manager = manager();
        manager.register_default(&key, default).unwrap();
        if let Some(live) = live {
            manager.set_u32(&key, live).unwrap();
        }

        manager.reset_to_default(&key).unwrap();
        prop_assert_eq!(manager.get_u32(&key, default.wrapping_add(1)).unwrap(), default);
    }

    #[test]
    fn commit_then_load_restores_everything(
        entries in prop::collection::btree_map(arb_key(), arb_value(), 0..32),
    ) {
        let manager = manager();
        for (key, value) in &entries {
            manager.set_value(key, value.clone()).unwrap();
        }
        manager.set_backend(RamBackend::new()).unwrap();
        manager.commit().unwrap();

        manager.erase_all().unwrap();
        prop_assert_eq!(manager.get_count().unwrap(), 0);
        prop_assert_eq!(manager.load().unwrap(), entries.len());

        let mut restored = BTreeMap::new();
        for key in manager.keys().unwrap() {
            let value = manager.get_value(&key).unwrap();
            restored.insert(key, value);
        }
        prop_assert_eq!(restored.len(), entries.len());
        for (key, value) in &entries {
            prop_assert!(same(&restored[key], value), "{key}: {:?} != {value:?}", restored[key]);
        }
    }
}
