use anyhow::Result;
use batchstream::prelude::*;
use batchstream::Settings;
use batchstream_example::init_logging;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    init_logging(&settings.logging);

    let capacity = settings.stream.capacity;
    let scope = CancellationToken::new();

    println!("Batchstream - Pipeline Demo");
    println!("===========================\n");

    // 1. filter -> map -> buffer
    println!("1. Squaring odd numbers, grouped by 4...");
    let groups = Stream::from_iter(&scope, capacity, 1..=20)
        .filter(|n| n % 2 == 1)
        .map(|n| n * n)
        .buffer(4)
        .aggregate()
        .await?;
    for group in &groups {
        println!("   {:?}", group);
    }
    println!();

    // 2. tee -> two branches -> merge
    println!("2. Teeing words into upper and reversed branches, then merging...");
    let words = Stream::from_iter(&scope, capacity, vec!["tokio", "stream", "batch"]);
    let (left, right) = words.tee();
    let upper = left.map(|w| w.to_uppercase());
    let reversed = right.map(|w| w.chars().rev().collect::<String>());
    let merged = Stream::merge(&scope, vec![upper, reversed]);

    let done = Listener::new()
        .on_item(|word: String| println!("   -> {}", word))
        .on_error(|e| tracing::warn!(error = %e, "merge failed"))
        .on_done(|| println!("   (merge finished)\n"))
        .spawn(merged);
    done.await?;

    // 3. Streamify a batch-returning function
    println!("3. Streaming the words of a sentence in chunks of 3...");
    let split = Streamify::new(&scope, |sentence: String| async move {
        Ok::<_, anyhow::Error>(sentence.split_whitespace().map(str::to_string).collect::<Vec<_>>())
    })
    .with_capacity(capacity);
    let chunks = Collector::collect(
        split
            .chunked(3)
            .call("a stream is a conduit with one writer and one reader".to_string()),
    )
    .await;
    for chunk in chunks.items() {
        println!("   {:?}", chunk);
    }
    println!();

    // 4. Token stream with a slow producer
    println!("4. Assembling a token stream...");
    let tokens = Stream::generate(&scope, capacity, |writer| async move {
        for token in ["Batches ", "flow ", "through ", "streams."] {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if writer.send(token.to_string()).await.is_err() {
                return;
            }
        }
        writer.close();
    });
    let text = TokenStream::new(tokens).drain().await?;
    println!("   {}\n", text);

    // 5. Cancel a pipeline that never ends
    println!("5. Cancelling an endless pipeline...");
    let endless_scope = scope.child_token();
    let counter = Stream::generate(&endless_scope, capacity, |writer| async move {
        let mut n = 0u64;
        while writer.send(n).await.is_ok() {
            n += 1;
        }
    });
    let mut doubled = StreamBuffer::new(8).pipe(counter.map(|n| n * 2));
    let mut seen = 0;
    while let Some(_value) = doubled.recv().await {
        seen += 1;
        if seen == 100 {
            endless_scope.cancel();
        }
    }
    println!("   ✓ stopped after {} values: {:?}", seen, doubled.error());

    Ok(())
}
