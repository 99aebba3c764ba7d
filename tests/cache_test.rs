use airbar_backend::cache::{CacheKeys, CacheService, CacheTtl};
use airbar_backend::config::CacheConfig;
use airbar_backend::error::AppError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

async fn exercise_backend(cache: &CacheService) {
    let user = Uuid::new_v4();
    let key = CacheKeys::wallet(user);

    assert!(cache.set(&key, &vec![1u32, 2, 3], CacheTtl::Short.as_secs()).await);
    assert!(cache.exists(&key).await);
    assert_eq!(cache.get::<Vec<u32>>(&key).await, Some(vec![1, 2, 3]));

    cache.invalidate_users(&[user]).await;
    assert!(!cache.exists(&key).await);

    let counter = CacheKeys::trip_views(Uuid::new_v4());
    assert_eq!(cache.increment(&counter, 1).await, 1);
    assert_eq!(cache.increment(&counter, 2).await, 3);

    let viewers = CacheKeys::trip_viewers(Uuid::new_v4());
    cache.s_add(&viewers, &["a".to_string(), "b".to_string()]).await;
    cache.s_add(&viewers, &["a".to_string()]).await;
    assert_eq!(cache.s_members(&viewers).await.len(), 2);
    assert!(cache.s_is_member(&viewers, "b").await);
    assert_eq!(cache.ttl(&viewers).await, None);
    assert!(cache.expire(&viewers, CacheTtl::Weekly.as_secs()).await);
    let ttl = cache.ttl(&viewers).await.expect("ttl set");
    assert!(ttl > CacheTtl::Weekly.as_secs() - 60);

    exercise_batches(cache).await;
}

async fn exercise_batches(cache: &CacheService) {
    let [a, b, c] = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()].map(CacheKeys::trip);
    let entries = vec![(a.clone(), "first".to_string()), (c.clone(), "third".to_string())];
    assert!(cache.m_set(&entries, CacheTtl::Short.as_secs()).await);

    // Misses keep their slot so results line up with the keys
    let found: Vec<Option<String>> = cache.m_get(&[b.clone(), a.clone(), c.clone(), b.clone()]).await;
    assert_eq!(
        found,
        vec![None, Some("first".to_string()), Some("third".to_string()), None]
    );

    assert!(cache.m_get::<String>(&[]).await.is_empty());
    assert_eq!(cache.delete_many(&[a, c]).await, 2);
    assert_eq!(cache.m_get::<String>(&[b]).await, vec![None]);
}

#[tokio::test]
async fn test_memory_backend() {
    let cache = CacheService::memory("airbar-test");
    assert_eq!(cache.backend_name(), "memory");
    exercise_backend(&cache).await;
}

#[tokio::test]
async fn test_get_or_set_runs_loader_once() {
    let cache = CacheService::memory("airbar-test");
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = calls.clone();
        let value = cache
            .get_or_set("answer", CacheTtl::Short, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>(42u64)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_or_set_does_not_cache_errors() {
    let cache = CacheService::memory("airbar-test");

    let failed: Result<u64, AppError> = cache
        .get_or_set("flaky", CacheTtl::Short, || async {
            Err(AppError::NotFound("missing".to_string()))
        })
        .await;
    assert!(failed.is_err());
    assert!(!cache.exists("flaky").await);
}

#[tokio::test]
async fn test_disconnected_cache_still_serves_loader() {
    let cache = CacheService::connect(&CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    })
    .await;
    assert_eq!(cache.backend_name(), "disconnected");

    let value = cache
        .get_or_set("k", CacheTtl::Short, || async { Ok::<_, AppError>("fresh".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "fresh");
}

#[tokio::test]
async fn test_unreachable_redis_degrades() {
    let cache = CacheService::connect(&CacheConfig {
        redis_url: Some("redis://127.0.0.1:1".to_string()),
        connect_timeout_ms: 200,
        ..CacheConfig::default()
    })
    .await;

    assert!(!cache.is_connected());
    assert_eq!(cache.get::<u8>("anything").await, None);
}

#[tokio::test]
#[ignore = "requires REDIS_URL and a running Redis"]
async fn test_redis_backend() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let prefix = format!("airbar-test-{}", Uuid::new_v4());
    let cache = CacheService::connect(&CacheConfig {
        redis_url: Some(url),
        key_prefix: prefix,
        ..CacheConfig::default()
    })
    .await;

    assert_eq!(cache.backend_name(), "redis");
    exercise_backend(&cache).await;
    assert!(cache.delete_pattern("*").await > 0);
}
