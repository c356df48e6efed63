use crate::error::StreamError;
use crate::stream::Stream;

/// Drains a stream into memory, keeping failures next to the values
#[derive(Debug)]
pub struct Collector<T> {
    items: Vec<T>,
    errors: Vec<StreamError>,
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> Collector<T> {
    /// Collect every value; a terminal error lands in `errors`
    pub async fn collect(mut stream: Stream<T>) -> Self {
        let mut collector = Self::default();
        while let Some(item) = stream.recv().await {
            collector.items.push(item);
        }
        if let Some(error) = stream.take_error() {
            collector.errors.push(error);
        }
        collector
    }

    /// Collect a stream of per-item results, filing each `Err` as an error
    pub async fn collect_results<E>(mut stream: Stream<std::result::Result<T, E>>) -> Self
    where
        E: Into<anyhow::Error>,
    {
        let mut collector = Self::default();
        while let Some(result) = stream.recv().await {
            match result {
                Ok(item) => collector.items.push(item),
                Err(error) => collector.errors.push(StreamError::failed(error)),
            }
        }
        if let Some(error) = stream.take_error() {
            collector.errors.push(error);
        }
        collector
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn errors(&self) -> &[StreamError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<StreamError>) {
        (self.items, self.errors)
    }
}
