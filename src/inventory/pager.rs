//! Server listing pagination
//!
//! Walks the paged server listing lazily. Each page request goes through the
//! retry policy; a page that still fails ends the walk with that error after
//! every record from earlier pages has been yielded.

use super::retry::RetryPolicy;
use crate::cloud::model::{PageToken, ServerRecord};
use crate::cloud::ComputeApi;
use crate::error::ApiError;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;

enum Cursor {
    Start,
    Next(PageToken),
    Done,
}

/// Stream every server in listing order.
///
/// The walk stops when a page comes back shorter than `page_size` or
/// without a next-page token.
pub fn walk_servers(
    api: Arc<dyn ComputeApi>,
    page_size: usize,
    retry: RetryPolicy,
) -> BoxStream<'static, Result<ServerRecord, ApiError>> {
    let page_size = page_size.max(1);

    stream::unfold(Cursor::Start, move |cursor| {
        let api = api.clone();
        async move {
            let token = match cursor {
                Cursor::Done => return None,
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
            };

            let result = retry
                .run("list_servers", || api.list_servers(token.as_ref(), page_size))
                .await;

            match result {
                Ok(page) => {
                    tracing::debug!(
                        "Fetched server page {}: {} servers",
                        token.as_ref().map_or("first".to_string(), |t| t.to_string()),
                        page.servers.len()
                    );
                    let next = match page.next {
                        Some(next) if page.servers.len() >= page_size => Cursor::Next(next),
                        _ => Cursor::Done,
                    };
                    Some((Ok(page.servers), next))
                }
                Err(e) => Some((Err(e), Cursor::Done)),
            }
        }
    })
    .map_ok(|servers| stream::iter(servers.into_iter().map(Ok::<_, ApiError>)))
    .try_flatten()
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::testing::FakeCompute;

    async fn collect_all(
        fake: Arc<FakeCompute>,
        page_size: usize,
    ) -> (Vec<String>, Option<ApiError>) {
        let mut ids = Vec::new();
        let mut walk = walk_servers(fake, page_size, RetryPolicy::immediate(3));
        while let Some(item) = walk.next().await {
            match item {
                Ok(server) => ids.push(server.id),
                Err(e) => return (ids, Some(e)),
            }
        }
        (ids, None)
    }

    fn expected(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("srv-{}", i)).collect()
    }

    #[tokio::test]
    async fn yields_every_server_once_in_order() {
        for page_size in [1, 2, 3, 4, 5, 10] {
            let fake = Arc::new(FakeCompute::with_servers(7));
            let (ids, err) = collect_all(fake, page_size).await;
            assert!(err.is_none());
            assert_eq!(ids, expected(7), "page size {}", page_size);
        }
    }

    #[tokio::test]
    async fn exact_multiple_stops_on_missing_token() {
        let fake = Arc::new(FakeCompute::with_servers(4));
        let (ids, _) = collect_all(fake.clone(), 2).await;
        assert_eq!(ids, expected(4));
        assert_eq!(fake.calls("list_servers"), 2);
    }

    #[tokio::test]
    async fn short_page_ends_walk() {
        let fake = Arc::new(FakeCompute::with_servers(5));
        let (ids, _) = collect_all(fake.clone(), 2).await;
        assert_eq!(ids, expected(5));
        assert_eq!(fake.calls("list_servers"), 3);
    }

    #[tokio::test]
    async fn short_page_ends_walk_despite_next_token() {
        let mut fake = FakeCompute::with_servers(3);
        fake.dangling_token = true;
        let fake = Arc::new(fake);
        fake.fail_always("list_servers:3", ApiError::fatal("list_servers", "past the end"));

        let (ids, err) = collect_all(fake.clone(), 5).await;
        assert!(err.is_none());
        assert_eq!(ids, expected(3));
        assert_eq!(fake.calls("list_servers"), 1);
    }

    #[tokio::test]
    async fn empty_listing() {
        let fake = Arc::new(FakeCompute::with_servers(0));
        let (ids, err) = collect_all(fake, 10).await;
        assert!(ids.is_empty());
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn transient_page_failure_is_retried() {
        let fake = Arc::new(FakeCompute::with_servers(4));
        fake.fail_times("list_servers:2", 2, ApiError::transient("list_servers", "503"));

        let (ids, err) = collect_all(fake.clone(), 2).await;
        assert!(err.is_none());
        assert_eq!(ids, expected(4));
        assert_eq!(fake.calls("list_servers:2"), 3);
    }

    #[tokio::test]
    async fn fatal_page_failure_keeps_earlier_records() {
        let fake = Arc::new(FakeCompute::with_servers(6));
        fake.fail_always("list_servers:2", ApiError::fatal("list_servers", "401"));

        let (ids, err) = collect_all(fake.clone(), 2).await;
        assert_eq!(ids, expected(2));
        assert!(matches!(err, Some(ApiError::Fatal { .. })));
        assert_eq!(fake.calls("list_servers:4"), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_end_walk() {
        let fake = Arc::new(FakeCompute::with_servers(4));
        fake.fail_always("list_servers:0", ApiError::transient("list_servers", "429"));

        let (ids, err) = collect_all(fake.clone(), 2).await;
        assert!(ids.is_empty());
        assert!(matches!(err, Some(ApiError::Exhausted { attempts: 3, .. })));
    }
}
