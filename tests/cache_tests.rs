use std::{sync::Arc, thread, time::Duration};

use wellness_admin::TtlCache;

#[test]
fn test_get_insert_invalidate() {
    let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
    assert!(cache.is_empty());

    cache.insert("a".to_string(), 1);
    cache.insert("b".to_string(), 2);
    assert_eq!(cache.get(&"a".to_string()), Some(1));
    assert_eq!(cache.len(), 2);

    cache.insert("a".to_string(), 10);
    assert_eq!(cache.get(&"a".to_string()), Some(10));

    cache.invalidate(&"a".to_string());
    assert_eq!(cache.get(&"a".to_string()), None);

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_entries_expire() {
    let cache: TtlCache<&str, &str> = TtlCache::new(Duration::from_millis(30));
    cache.insert("settings", "v1");
    assert_eq!(cache.get(&"settings"), Some("v1"));

    thread::sleep(Duration::from_millis(60));
    assert_eq!(cache.get(&"settings"), None);
    // A read of an expired entry drops it.
    assert!(cache.is_empty());

    cache.insert("roles", "v1");
    cache.insert("audit", "v1");
    thread::sleep(Duration::from_millis(60));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.purge_expired(), 2);
    assert!(cache.is_empty());
}

#[test]
fn test_expired_entries_are_evicted_when_full() {
    let cache: TtlCache<u32, u32> = TtlCache::with_capacity(Duration::from_millis(1), 100);
    for i in 0..100 {
        cache.insert(i, i);
    }
    thread::sleep(Duration::from_millis(5));

    cache.insert(1_000, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_stays_bounded() {
    let cache: TtlCache<String, u32> = TtlCache::with_capacity(Duration::from_secs(60), 50);
    for i in 0..10_000 {
        cache.insert(format!("funnel:{}", i), i);
        assert!(cache.len() <= cache.capacity());
    }

    // The newest entry always survives the eviction that made room for it.
    assert_eq!(cache.get(&"funnel:9999".to_string()), Some(9_999));
    // Overwriting an existing key never evicts.
    let before = cache.len();
    cache.insert("funnel:9999".to_string(), 0);
    assert_eq!(cache.len(), before);
}

#[test]
fn test_zero_ttl_never_serves() {
    let cache: TtlCache<u8, u8> = TtlCache::new(Duration::ZERO);
    cache.insert(1, 1);
    assert_eq!(cache.get(&1), None);
}

#[test]
fn test_shared_across_threads() {
    let cache: Arc<TtlCache<usize, usize>> = Arc::new(TtlCache::new(Duration::from_secs(60)));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.insert(i, i * i))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(cache.len(), 8);
    assert_eq!(cache.get(&3), Some(9));
    assert_eq!(cache.ttl(), Duration::from_secs(60));
}
