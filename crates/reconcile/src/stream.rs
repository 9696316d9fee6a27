//! Keyset-paged source reader.

use crate::error::Result;
use crate::table::SourceTable;
use mirror_core::{KeyProjection, PrimaryKey, Row};
use std::collections::VecDeque;
use tracing::debug;

/// Forward-only stream of source rows, ascending by primary key.
///
/// Rows are fetched `page_size` at a time. Each later page starts at the
/// last key of the previous one, so repeats of a key that straddle a page
/// boundary are still read; the rows already emitted for that key are
/// skipped. The stream cannot resume mid-page; a rerun starts again from
/// the first key.
pub struct SourceStream<'a, S: SourceTable + ?Sized> {
    source: &'a S,
    projection: KeyProjection,
    page_size: usize,
    buffer: VecDeque<Row>,
    last_key: Option<PrimaryKey>,
    /// Rows already emitted under `last_key`
    boundary_rows: usize,
    exhausted: bool,
    pages_read: u64,
}

impl<'a, S: SourceTable + ?Sized> SourceStream<'a, S> {
    pub fn new(source: &'a S, projection: KeyProjection, page_size: usize) -> Self {
        Self {
            source,
            projection,
            page_size,
            buffer: VecDeque::with_capacity(page_size),
            last_key: None,
            boundary_rows: 0,
            exhausted: false,
            pages_read: 0,
        }
    }

    /// Next row, or `None` once the source is drained.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        Ok(self.buffer.pop_front())
    }

    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    fn has_key(&self, row: &Row, key: &PrimaryKey) -> bool {
        self.projection.project(row).ok().as_ref() == Some(key)
    }

    async fn fill(&mut self) -> Result<()> {
        let (mut rows, limit) = match &self.last_key {
            None => (
                self.source.fetch_page(None, self.page_size).await?,
                self.page_size,
            ),
            Some(last) => {
                let limit = self.page_size + self.boundary_rows;
                (self.source.fetch_page_from(last, limit).await?, limit)
            }
        };
        self.pages_read += 1;
        if rows.len() < limit {
            self.exhausted = true;
        }

        if let Some(last) = &self.last_key {
            let seen = rows
                .iter()
                .take(self.boundary_rows)
                .take_while(|row| self.has_key(row, last))
                .count();
            rows.drain(..seen);
        }

        if let Some(tail) = rows.last() {
            let key = self.projection.project(tail)?;
            let same = rows
                .iter()
                .rev()
                .take_while(|row| self.has_key(row, &key))
                .count();
            if same == rows.len() && self.last_key.as_ref() == Some(&key) {
                self.boundary_rows += same;
            } else {
                self.boundary_rows = same;
            }
            self.last_key = Some(key);
        }

        debug!(
            page = self.pages_read,
            rows = rows.len(),
            exhausted = self.exhausted,
            "Fetched source page"
        );
        self.buffer.extend(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;
    use mirror_core::Value;

    #[tokio::test]
    async fn test_stream_reads_every_row_across_pages() {
        let table = MemoryTable::from_names("public.t", &["id", "val"], &["id"]).unwrap();
        for id in 1..=7 {
            table
                .seed(vec![Value::Int(id), Value::from("v")])
                .await
                .unwrap();
        }
        let projection = KeyProjection::from_names(table.schema().layout(), &["id"]).unwrap();
        let mut stream = SourceStream::new(&table, projection, 3);

        let mut ids = Vec::new();
        while let Some(row) = stream.next_row().await.unwrap() {
            ids.push(row.get("id").cloned().unwrap());
        }
        assert_eq!(ids, (1..=7).map(Value::Int).collect::<Vec<_>>());
        assert_eq!(stream.pages_read(), 3);
    }
}
