#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{resolver, FakeYtdl};
use video_cacher::cache::{ResolvedUrlCache, RESOLVED_URL_CAPACITY};
use video_cacher::error::ResolveError;
use video_cacher::identity::Category;
use video_cacher::ytdl::UrlResolver;

const SOURCE: &str = "https://youtu.be/GoSo8YOKSAE";

#[tokio::test]
async fn repeat_lookups_within_ttl_reuse_the_result() {
    let fake = FakeYtdl::resolving_to("https://cdn.test/GoSo8YOKSAE.mp4");
    let resolver = resolver(fake.ytdl());

    let first = resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap();
    let second = resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap();

    assert_eq!(first, "https://cdn.test/GoSo8YOKSAE.mp4");
    assert_eq!(second, first);
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn avpro_flag_is_part_of_the_key() {
    let fake = FakeYtdl::resolving_to("https://cdn.test/clip");
    let resolver = resolver(fake.ytdl());

    resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap();
    resolver.resolve(SOURCE, Category::YouTube, true).await.unwrap();

    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test]
async fn expired_results_are_resolved_again() {
    let fake = FakeYtdl::resolving_to("https://cdn.test/clip");
    let resolver = UrlResolver::new(
        fake.ytdl(),
        ResolvedUrlCache::new(RESOLVED_URL_CAPACITY, Duration::from_millis(200)),
    );

    resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap();

    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let fake = FakeYtdl::failing_with("ERROR: Video unavailable");
    let resolver = resolver(fake.ytdl());

    for _ in 0..2 {
        let err = resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap_err();
        assert!(matches!(&err, ResolveError::Tool { stderr, .. } if stderr == "ERROR: Video unavailable"));
        assert_eq!(err.diagnostic(), "ERROR: Video unavailable");
    }
    assert_eq!(fake.calls().len(), 2);
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn bot_check_is_reported_as_such() {
    let fake = FakeYtdl::failing_with("ERROR: [youtube] GoSo8YOKSAE: Sign in to confirm you're not a bot");
    let resolver = resolver(fake.ytdl());

    let err = resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap_err();

    assert!(matches!(err, ResolveError::BotCheck(_)));
}

#[tokio::test]
async fn search_pages_never_reach_ytdl() {
    let fake = FakeYtdl::resolving_to("https://cdn.test/clip");
    let resolver = resolver(fake.ytdl());

    let err = resolver
        .resolve("https://www.youtube.com/results?search_query=dance", Category::YouTube, false)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::SearchPage));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn blank_output_is_an_error_and_first_line_wins() {
    let fake = FakeYtdl::new("echo ''");
    let err = resolver(fake.ytdl())
        .resolve(SOURCE, Category::YouTube, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::EmptyOutput));

    let fake = FakeYtdl::new("echo\necho 'https://cdn.test/video'\necho 'https://cdn.test/audio'");
    let url = resolver(fake.ytdl())
        .resolve(SOURCE, Category::YouTube, false)
        .await
        .unwrap();
    assert_eq!(url, "https://cdn.test/video");
}

#[tokio::test]
async fn cookies_are_only_passed_for_youtube() {
    let fake = FakeYtdl::resolving_to("https://cdn.test/clip");
    let ytdl = Arc::new(video_cacher::ytdl::Ytdl::new(&fake.path).with_cookies("/tmp/cookies.txt"));
    let resolver = resolver(ytdl);

    resolver.resolve(SOURCE, Category::YouTube, false).await.unwrap();
    resolver
        .resolve("https://example.com/clip.mp4", Category::Other, false)
        .await
        .unwrap();

    let calls = fake.calls();
    assert!(calls[0].contains("--cookies /tmp/cookies.txt"));
    assert!(!calls[1].contains("--cookies"));
    assert!(calls[1].ends_with("--get-url https://example.com/clip.mp4"));
}

/// The first caller finishes quickly; everyone else is stuck in a slow run
/// and must abandon it as soon as the first result lands.
#[tokio::test]
async fn concurrent_callers_adopt_the_first_result() {
    let fake = FakeYtdl::new(
        r#"if mkdir "$DIR/first" 2>/dev/null; then
  sleep 0.3
else
  sleep 5
fi
echo "https://cdn.test/$$"
touch "$DIR/finished-$$""#,
    );
    let resolver = Arc::new(resolver(fake.ytdl()));

    let started = Instant::now();
    let racers: Vec<_> = (0..4)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve(SOURCE, Category::YouTube, false).await })
        })
        .collect();
    let mut results = Vec::new();
    for racer in racers {
        results.push(racer.await.unwrap().unwrap());
    }

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(results.iter().all(|url| url == &results[0]));
    assert_eq!(fake.calls().len(), 4);
    let finished = std::fs::read_dir(fake.dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("finished-"))
        .count();
    assert_eq!(finished, 1);
}
