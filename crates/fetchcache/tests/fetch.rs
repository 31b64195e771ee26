use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use fetchcache::{Cache, CacheConfig, CacheError, CacheOptions, CacheTier};
use fetchcache_test::{setup, ContentServer, TempDir};
use filetime::FileTime;
use tokio::sync::mpsc;

fn cache(dir: &TempDir) -> Cache<Bytes> {
    setup();
    Cache::new(CacheConfig {
        cache_dir: dir.path().to_path_buf(),
        max_age: Duration::from_secs(3600),
        ..Default::default()
    })
}

fn age_file(path: &Path, age: Duration) {
    let mtime = FileTime::from_system_time(SystemTime::now() - age);
    filetime::set_file_mtime(path, mtime).unwrap();
}

#[tokio::test]
async fn test_fetch_downloads_once_then_serves_from_cache() {
    let server = ContentServer::spawn([("/logo.png", 200, b"image bytes".to_vec())]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("logo.png");

    let first = cache.fetch(&url, CacheOptions::default()).await.unwrap();
    assert_eq!(first.as_ref(), b"image bytes");
    assert_eq!(server.hits("logo.png"), 1);
    assert!(cache.cache_path(&url).is_file());

    // second fetch is a cache hit
    let second = cache.fetch(&url, CacheOptions::default()).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(server.hits("logo.png"), 1);
}

#[tokio::test]
async fn test_missing_resource_is_not_found_and_leaves_no_file() {
    let server = ContentServer::spawn([]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("absent");

    let result = cache.fetch(&url, CacheOptions::default()).await;
    assert_eq!(result, Err(CacheError::NotFound));
    assert!(!cache.cache_path(&url).exists());
    assert!(!cache.is_cached(&url, CacheTier::Memory).await);
    assert!(!cache.is_cached(&url, CacheTier::Disk).await);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_request() {
    let server = ContentServer::spawn([("/blob", 200, vec![42u8; 4096])]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = Arc::new(cache(&dir));
    let url = server.url("blob");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let url = url.clone();
            tokio::spawn(async move { cache.fetch(&url, CacheOptions::default()).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().len(), 4096);
    }
    assert_eq!(server.hits("blob"), 1);
}

#[tokio::test]
async fn test_force_refresh_downloads_again() {
    let server = ContentServer::spawn([("/feed", 200, b"payload".to_vec())]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("feed");

    cache.fetch(&url, CacheOptions::default()).await.unwrap();
    assert_eq!(server.hits("feed"), 1);

    let refreshed = cache
        .fetch(&url, CacheOptions::default().force_refresh(true))
        .await
        .unwrap();
    assert_eq!(refreshed.as_ref(), b"payload");
    assert_eq!(server.hits("feed"), 2);
    assert!(cache.cache_path(&url).is_file());
}

#[tokio::test]
async fn test_fetch_reports_progress() {
    let server = ContentServer::spawn([("/blob", 200, vec![7u8; 2048])]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("blob");

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    cache
        .fetch_with_progress(&url, CacheOptions::default(), Some(progress_tx))
        .await
        .unwrap();

    let mut last = None;
    while let Ok(update) = progress_rx.try_recv() {
        last = Some(update);
    }
    assert_eq!(last.unwrap().transferred, 2048);
}

#[tokio::test]
async fn test_downloaded_event_is_broadcast() {
    let server = ContentServer::spawn([("/a", 200, b"content".to_vec())]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("a");

    let mut downloaded = cache.events().subscribe_downloaded();
    cache.fetch(&url, CacheOptions::default()).await.unwrap();

    let event = downloaded.recv().await.unwrap();
    assert_eq!(event.url, url);
    assert_eq!(event.result, Ok(Bytes::from_static(b"content")));
}

#[tokio::test]
async fn test_failed_download_event_carries_the_error() {
    let server = ContentServer::spawn([]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("absent");

    let mut downloaded = cache.events().subscribe_downloaded();
    cache.fetch(&url, CacheOptions::default()).await.unwrap_err();

    let event = downloaded.recv().await.unwrap();
    assert_eq!(event.result, Err(CacheError::NotFound));
}

#[tokio::test]
async fn test_clean_expired_sweeps_and_broadcasts() {
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let old = url::Url::parse("https://example.org/old").unwrap();
    let fresh = url::Url::parse("https://example.org/fresh").unwrap();

    cache.save(&old, Bytes::from_static(b"old")).await.unwrap();
    cache.save(&fresh, Bytes::from_static(b"fresh")).await.unwrap();
    age_file(&cache.cache_path(&old), Duration::from_secs(7200));

    let mut cleaned = cache.events().subscribe_cleaned();
    let removed = cache.clean_expired().await;
    assert_eq!(removed, vec![cache.cache_path(&old)]);
    assert!(cache.cache_path(&fresh).is_file());

    let event = cleaned.recv().await.unwrap();
    assert_eq!(event.removed, removed);

    // a sweep with nothing to remove stays silent
    let removed = cache.clean_expired().await;
    assert!(removed.is_empty());
    assert!(cleaned.try_recv().is_err());
}

#[tokio::test]
async fn test_memory_disabled_fetch_skips_memory_tier() {
    let server = ContentServer::spawn([("/a", 200, b"disk only".to_vec())]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("a");

    cache
        .fetch(&url, CacheOptions::default().memory(false))
        .await
        .unwrap();
    assert!(!cache.is_cached(&url, CacheTier::Memory).await);
    assert!(cache.is_cached(&url, CacheTier::Disk).await);
}

#[tokio::test]
async fn test_disk_disabled_fetch_skips_disk_tier() {
    let server = ContentServer::spawn([("/a", 200, b"memory only".to_vec())]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = server.url("a");

    cache
        .fetch(&url, CacheOptions::default().disk(false))
        .await
        .unwrap();
    assert!(cache.is_cached(&url, CacheTier::Memory).await);
    assert!(!cache.is_cached(&url, CacheTier::Disk).await);
}

#[tokio::test]
async fn test_clear_disk_removes_everything_and_is_idempotent() {
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = cache(&dir);
    let url = url::Url::parse("https://example.org/a").unwrap();

    cache.save(&url, Bytes::from_static(b"x")).await.unwrap();
    cache.clear_disk().await.unwrap();
    assert!(!cache.is_cached(&url, CacheTier::Disk).await);
    cache.clear_disk().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_sync_reads_through_to_disk() {
    let dir = fetchcache_test::tempdir().unwrap();
    let cache = Arc::new(cache(&dir));
    let url = url::Url::parse("https://example.org/a").unwrap();

    cache.save(&url, Bytes::from_static(b"stored")).await.unwrap();
    cache.clear_memory();

    let sync_cache = cache.clone();
    let sync_url = url.clone();
    let value = tokio::task::spawn_blocking(move || sync_cache.get_sync(&sync_url))
        .await
        .unwrap();
    assert_eq!(value, Ok(Bytes::from_static(b"stored")));
    // read-through populated the memory tier
    assert!(cache.is_cached(&url, CacheTier::Memory).await);
}

#[tokio::test]
async fn test_cancel_fetching_resolves_waiters() {
    struct NeverTransport;

    impl fetchcache::Transport for NeverTransport {
        fn fetch(
            &self,
            _request: fetchcache::FetchRequest,
            _progress: fetchcache::ProgressReporter,
        ) -> futures::future::BoxFuture<'static, fetchcache::CacheEntry<fetchcache::Payload>>
        {
            Box::pin(std::future::pending())
        }
    }

    setup();
    let dir = fetchcache_test::tempdir().unwrap();
    let cache: Arc<Cache<Bytes>> = Arc::new(Cache::with_transport(
        CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
        Arc::new(NeverTransport),
    ));
    let url = url::Url::parse("https://example.org/stuck").unwrap();

    let waiter = {
        let cache = cache.clone();
        let url = url.clone();
        tokio::spawn(async move { cache.fetch(&url, CacheOptions::default()).await })
    };
    while !cache.is_fetching(&url) {
        tokio::task::yield_now().await;
    }

    assert!(cache.cancel_fetching(&url, true));
    assert!(!cache.is_fetching(&url));
    assert_eq!(waiter.await.unwrap(), Err(CacheError::Cancelled));
}

#[tokio::test]
async fn test_background_decode_returns_same_value() {
    let server = ContentServer::spawn([("/text", 200, b"decoded off-thread".to_vec())]).await;
    let dir = fetchcache_test::tempdir().unwrap();
    setup();
    let cache: Cache<String> = Cache::new(CacheConfig {
        cache_dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    let url = server.url("text");

    let value = cache
        .fetch(&url, CacheOptions::default().background_decode(true))
        .await
        .unwrap();
    assert_eq!(value, "decoded off-thread");
}
