use batchstream_stream::Stream;
use futures::StreamExt;

use crate::batcher::Batcher;
use crate::error::Result;

/// Route every value of `input` through `batcher`, keeping input order.
///
/// Up to `concurrency` values are in flight at once, which is what lets them
/// coalesce into batches; a value below `max_batch_size` only fills batches on
/// the timer. Submissions use the input's scope, so cancelling the pipeline
/// abandons pending results. An upstream failure becomes the output's
/// terminal error.
pub fn batch_map<T, R>(input: Stream<T>, batcher: Batcher<T, R>, concurrency: usize) -> Stream<Result<R>>
where
    T: Send + 'static,
    R: Send + 'static,
{
    let concurrency = concurrency.max(1);
    let (writer, output) = Stream::channel(input.scope(), input.capacity());
    let scope = input.scope().clone();

    tokio::spawn(async move {
        tracing::trace!(stage = "batch_map", concurrency, "stage started");
        let mut results = input
            .into_stream()
            .map(|value| {
                let batcher = batcher.clone();
                let scope = scope.clone();
                async move {
                    match value {
                        Ok(value) => Ok(batcher.submit(&scope, value).await),
                        Err(error) => Err(error),
                    }
                }
            })
            .buffered(concurrency);

        while let Some(next) = results.next().await {
            match next {
                Ok(result) => {
                    if writer.send(result).await.is_err() {
                        tracing::trace!(stage = "batch_map", "output gone, stopping");
                        return;
                    }
                }
                Err(error) => {
                    writer.finish(Some(error)).await;
                    return;
                }
            }
        }

        writer.close();
    });

    output
}
