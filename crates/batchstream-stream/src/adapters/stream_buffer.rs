use crate::stream::Stream;

/// Re-emits a stream through a fixed-capacity buffer.
///
/// The producer may run ahead of the consumer by at most `capacity` values,
/// then blocks.
#[derive(Debug, Clone, Copy)]
pub struct StreamBuffer {
    capacity: usize,
}

impl StreamBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pipe<T: Send + 'static>(&self, mut input: Stream<T>) -> Stream<T> {
        let (writer, output) = Stream::with_scope(input.scope().clone(), self.capacity);

        tokio::spawn(async move {
            while let Some(value) = input.recv().await {
                if writer.send(value).await.is_err() {
                    return;
                }
            }
            writer.finish(input.take_error()).await;
        });

        output
    }
}
