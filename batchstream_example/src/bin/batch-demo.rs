use anyhow::Result;
use batchstream::prelude::*;
use batchstream::Settings;
use batchstream_example::init_logging;
use futures::future::join_all;
use std::time::{Duration, Instant};

/// Pretend embedding backend: one round trip per batch, one vector per prompt
async fn embed(_cancel: CancellationToken, prompts: Vec<String>) -> BatchResults<Vec<f32>> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok(prompts
        .into_iter()
        .map(|prompt| {
            if prompt.is_empty() {
                Err(anyhow::anyhow!("empty prompt"))
            } else {
                Ok(vec![prompt.len() as f32, prompt.split_whitespace().count() as f32])
            }
        })
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    init_logging(&settings.logging);

    println!("Batchstream - Batching Demo");
    println!("===========================\n");

    // 1. Seven concurrent callers against batches of three
    println!("1. Submitting 7 prompts (max batch 3, max wait 50ms)...");
    let config = BatcherConfig::new()
        .with_max_batch_size(3)
        .with_max_wait(Duration::from_millis(50));
    let batcher: Batcher<String, Vec<f32>> = Batcher::new(config, embed)?;
    let token = CancellationToken::new();

    let prompts: Vec<String> = [
        "hello world",
        "batching requests",
        "",
        "one more",
        "streams and stages",
        "cancellation",
        "the last one waits for the timer",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let started = Instant::now();
    let results = join_all(prompts.iter().cloned().map(|p| batcher.submit(&token, p))).await;
    for (prompt, result) in prompts.iter().zip(results) {
        match result {
            Ok(vector) => println!("   ✓ {:?} -> {:?}", prompt, vector),
            Err(e) => println!("   ✗ {:?} -> {}", prompt, e),
        }
    }
    println!("   Took {:?}\n", started.elapsed());

    // 2. Configured batcher, fed through a stream stage
    println!(
        "2. Streaming 20 prompts through batch_map (max batch {}, max wait {}ms)...",
        settings.batcher.max_batch_size, settings.batcher.max_wait_ms
    );
    let configured: Batcher<String, Vec<f32>> = Batcher::new(settings.batcher.clone(), embed)?;
    let source = Stream::from_iter(
        &token,
        settings.stream.capacity,
        (0..20).map(|i| format!("prompt number {}", i)),
    );
    let embedded = batch_map(source, configured.clone(), settings.batcher.max_batch_size).aggregate().await?;
    let ok = embedded.iter().filter(|r| r.is_ok()).count();
    println!("   ✓ {} of {} embedded\n", ok, embedded.len());

    // 3. Batching off: every call goes straight to the backend
    println!("3. Disabling batching at runtime...");
    let auto = AutoBatcher::new(configured.clone(), |cancel: CancellationToken, prompt: String| async move {
        let mut vectors = embed(cancel, vec![prompt]).await?;
        vectors.pop().unwrap_or_else(|| Err(anyhow::anyhow!("backend returned nothing")))
    });
    auto.disable();
    let direct = auto.process(&token, "no batching here".to_string()).await?;
    println!("   ✓ direct call -> {:?}\n", direct);

    batcher.close().await;
    auto.close().await;

    // 4. Counters
    println!("4. Stats:");
    for (name, stats) in [("demo", batcher.stats()), ("configured", configured.stats())] {
        tracing::info!(
            batcher = name,
            items = stats.items_submitted,
            batches = stats.batches_dispatched,
            by_size = stats.size_triggered,
            by_timer = stats.time_triggered,
            by_close = stats.close_triggered,
            "batcher finished"
        );
        println!(
            "   {}: {} items in {} batches (avg {:.1}), {} size / {} timer / {} close",
            name,
            stats.items_submitted,
            stats.batches_dispatched,
            stats.avg_items_per_batch(),
            stats.size_triggered,
            stats.time_triggered,
            stats.close_triggered,
        );
    }

    Ok(())
}
