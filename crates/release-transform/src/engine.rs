//! Streaming line-by-line file transformation.

use release_types::rf2::{COLUMN_SEPARATOR, LINE_ENDING};
use release_types::BuildReport;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransformError;
use crate::line::{BatchLineTransformation, LineTransformation};

const TRANSFORMATION_PHASE: &str = "File Transformation";

enum TransformationStep {
    Line(Box<dyn LineTransformation>),
    Batch(Box<dyn BatchLineTransformation>),
}

/// Totals for one transformed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformationSummary {
    /// Data rows read, excluding the header.
    pub lines_read: u64,
    /// Data rows written to the output.
    pub lines_written: u64,
    /// Data rows on which a transformation failed.
    pub lines_failed: u64,
}

/// Applies an ordered list of column transformations to one tab-separated
/// file, streaming it line by line.
///
/// The header row passes through verbatim and is never transformed. A failed
/// transformation records the failure in the build report and writes the row
/// as transformed so far; every input row appears in the output, in input
/// order, so the engine itself fails only on I/O errors or an empty input.
///
/// Batched transformations operate on runs of consecutive rows sharing one
/// module id, bounded by the configured buffer size. Output is identical to
/// the unbatched path, batching only changes how the id service is called.
pub struct StreamingFileTransformation {
    steps: Vec<TransformationStep>,
    buffer_size: usize,
}

impl StreamingFileTransformation {
    /// Creates an engine with no transformation steps.
    pub fn new(buffer_size: usize) -> Self {
        StreamingFileTransformation {
            steps: Vec::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Appends a per-row transformation step.
    pub fn add_line(mut self, transformation: Box<dyn LineTransformation>) -> Self {
        self.steps.push(TransformationStep::Line(transformation));
        self
    }

    /// Appends a batched transformation step.
    pub fn add_batch(mut self, transformation: Box<dyn BatchLineTransformation>) -> Self {
        self.steps.push(TransformationStep::Batch(transformation));
        self
    }

    /// Returns true if no steps have been added.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Streams `reader` to `writer`, transforming every data row.
    pub async fn transform_file<R, W>(
        &self,
        reader: R,
        mut writer: W,
        file_name: &str,
        report: &BuildReport,
    ) -> Result<TransformationSummary, TransformError>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let mut lines = reader.lines();
        let header = lines
            .next_line()
            .await?
            .ok_or_else(|| TransformError::Other(format!("{file_name} is empty")))?;
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(LINE_ENDING.as_bytes()).await?;

        // Rows group on the first batched step's module column.
        let group_column = self.steps.iter().find_map(|step| match step {
            TransformationStep::Batch(batch) => Some(batch.module_id_column()),
            TransformationStep::Line(_) => None,
        });

        let mut summary = TransformationSummary::default();
        let mut buffer: Vec<Vec<String>> = Vec::new();
        let mut buffer_start_line = 0u64;
        let mut group_key = String::new();
        let mut line_number = 1u64;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            summary.lines_read += 1;

            let mut columns: Vec<String> =
                line.split(COLUMN_SEPARATOR).map(str::to_string).collect();

            if let Err(error) = self.apply_line_steps(&mut columns).await {
                tracing::warn!(file = file_name, line = line_number, %error, "row failed");
                report.add_error(
                    TRANSFORMATION_PHASE,
                    file_name,
                    error.to_string(),
                    Some(line_number),
                );
                summary.lines_failed += 1;
            }

            match group_column {
                None => {
                    Self::write_row(&mut writer, &columns).await?;
                    summary.lines_written += 1;
                }
                Some(column) => {
                    let key = columns.get(column).cloned().unwrap_or_default();
                    if buffer.is_empty() {
                        buffer_start_line = line_number;
                        group_key = key;
                    } else if key != group_key || buffer.len() >= self.buffer_size {
                        self.flush_group(
                            &mut writer,
                            &mut buffer,
                            buffer_start_line,
                            file_name,
                            report,
                            &mut summary,
                        )
                        .await?;
                        buffer_start_line = line_number;
                        group_key = key;
                    }
                    buffer.push(columns);
                }
            }
        }

        if !buffer.is_empty() {
            self.flush_group(
                &mut writer,
                &mut buffer,
                buffer_start_line,
                file_name,
                report,
                &mut summary,
            )
            .await?;
        }
        writer.flush().await?;
        Ok(summary)
    }

    async fn apply_line_steps(&self, columns: &mut [String]) -> Result<(), TransformError> {
        for step in &self.steps {
            if let TransformationStep::Line(transformation) = step {
                transformation.transform_line(columns).await?;
            }
        }
        Ok(())
    }

    /// Runs the batched steps over the buffered group and writes it out.
    /// A failed batch writes the group as transformed so far.
    async fn flush_group<W>(
        &self,
        writer: &mut W,
        buffer: &mut Vec<Vec<String>>,
        start_line: u64,
        file_name: &str,
        report: &BuildReport,
        summary: &mut TransformationSummary,
    ) -> Result<(), TransformError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let group_len = buffer.len() as u64;
        for step in &self.steps {
            if let TransformationStep::Batch(transformation) = step {
                if let Err(error) = transformation.transform_lines(buffer).await {
                    tracing::warn!(
                        file = file_name,
                        start_line,
                        rows = group_len,
                        %error,
                        "batch group failed"
                    );
                    report.add_error(
                        TRANSFORMATION_PHASE,
                        file_name,
                        format!("batch of {group_len} rows failed: {error}"),
                        Some(start_line),
                    );
                    summary.lines_failed += group_len;
                    break;
                }
            }
        }
        for row in buffer.drain(..) {
            Self::write_row(writer, &row).await?;
            summary.lines_written += 1;
        }
        Ok(())
    }

    async fn write_row<W>(writer: &mut W, columns: &[String]) -> Result<(), TransformError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let line = columns.join(&COLUMN_SEPARATOR.to_string());
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(LINE_ENDING.as_bytes()).await?;
        Ok(())
    }
}
