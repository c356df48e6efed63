use batchstream_stream::{CancellationToken, Collector, Stream, StreamError, TokenStream};
use std::time::Duration;

#[tokio::test]
async fn test_buffer_group_counts() {
    let scope = CancellationToken::new();

    for (len, size) in [(1usize, 1usize), (5, 2), (9, 3), (10, 4), (3, 8)] {
        let groups = Stream::from_iter(&scope, 4, 0..len)
            .buffer(size)
            .aggregate()
            .await
            .unwrap();

        assert_eq!(groups.len(), len.div_ceil(size), "len={} size={}", len, size);
        let expected_last = if len % size == 0 { size } else { len % size };
        assert_eq!(groups.last().map(Vec::len), Some(expected_last));
        assert!(groups.iter().all(|g| !g.is_empty()));
        assert_eq!(groups.concat(), (0..len).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_filter_map_buffer_pipeline() {
    let scope = CancellationToken::new();

    let groups = Stream::from_iter(&scope, 8, 1..=20)
        .filter(|n| n % 3 != 0)
        .map(|n| n * 10)
        .buffer(4)
        .aggregate()
        .await
        .unwrap();

    let flat: Vec<i32> = groups.concat();
    let expected: Vec<i32> = (1..=20).filter(|n| n % 3 != 0).map(|n| n * 10).collect();
    assert_eq!(flat, expected);
    assert_eq!(groups.len(), 4);
}

#[tokio::test]
async fn test_tee_into_merge() {
    let scope = CancellationToken::new();
    let (left, right) = Stream::from_iter(&scope, 2, 0..50).tee();

    let doubled = left.map(|n| n * 2);
    let negated = right.map(|n| -n);
    let mut merged = Stream::merge(&scope, vec![doubled, negated])
        .aggregate()
        .await
        .unwrap();

    merged.sort();
    let mut expected: Vec<i32> = (0..50).map(|n| n * 2).chain((0..50).map(|n| -n)).collect();
    expected.sort();
    assert_eq!(merged, expected);
}

#[tokio::test]
async fn test_cancel_mid_pipeline_unblocks_consumer() {
    let scope = CancellationToken::new();
    let source = Stream::generate(&scope, 1, |writer| async move {
        let mut i = 0u64;
        while writer.send(i).await.is_ok() {
            i += 1;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let mut pipeline = source.map(|n| n + 1).buffer(1000);
    let canceller = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.recv()).await;
    assert_eq!(result.unwrap(), None);
    assert!(matches!(pipeline.error(), Some(StreamError::Cancelled)));
}

#[tokio::test]
async fn test_token_stream_over_merged_collector() {
    let scope = CancellationToken::new();
    let words = ["stream", "ing ", "text"].map(String::from);
    let mut tokens = TokenStream::new(Stream::from_iter(&scope, 1, words));

    let mut forwarded = Vec::new();
    while let Some(token) = tokens.recv().await {
        forwarded.push(token);
    }
    assert_eq!(forwarded.len(), 3);
    assert_eq!(tokens.full_text(), "streaming text");

    let collector = Collector::collect(Stream::from_iter(&scope, 1, forwarded)).await;
    assert_eq!(collector.items().concat(), "streaming text");
}
