use rand::Rng;
use ridgedb::{Result, Store, StoreConfig};
use std::collections::HashMap;
use std::path::PathBuf;

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("ridgedb-{prefix}-{pid}-{nanos}"))
}

/// Random interleaving of put/delete against a small key space, checked
/// against a plain in-memory model after each mutation. Exercises flush
/// and compaction as a side effect of the small memtable budget.
#[test]
fn random_put_delete_matches_model() -> Result<()> {
    let root = unique_root("fuzz");
    let cfg = StoreConfig::default()
        .with_memtable_byte_budget(256)
        .with_level0_max_runs(3);
    let store = Store::open(&root, cfg)?;

    let mut rng = rand::thread_rng();
    let mut model: HashMap<String, Option<String>> = HashMap::new();

    for _ in 0..500 {
        let key = format!("key{}", rng.gen_range(0..20));
        if rng.gen_bool(0.7) {
            let value = format!("v{}", rng.gen_range(0..1000));
            store.put(key.as_bytes(), value.as_bytes())?;
            model.insert(key, Some(value));
        } else {
            store.delete(key.as_bytes())?;
            model.insert(key, None);
        }
    }

    for (key, expected) in &model {
        let got = store.get(key.as_bytes())?;
        assert_eq!(got, expected.as_ref().map(|v| v.as_bytes().to_vec()));
    }

    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}
