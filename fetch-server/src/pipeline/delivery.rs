//! Hand-off of a terminal artifact to the caller.
//!
//! A [`DeliveryStream`] owns the job while its terminal file is streamed out.
//! The job is disposed when the stream is dropped: after the last byte on
//! success, or as soon as the transport drops it on client abort.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::pipeline::job::Job;
use crate::utils::filename::content_type_for;
use crate::{Error, Result};

/// A finished job, ready to be streamed.
#[derive(Debug)]
pub struct Delivery {
    job: Job,
    path: PathBuf,
    filename: String,
    size: u64,
}

impl Delivery {
    pub(crate) fn new(job: Job, path: PathBuf, filename: String, size: u64) -> Self {
        Self {
            job,
            path,
            filename,
            size,
        }
    }

    pub fn job_id(&self) -> &str {
        self.job.id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name presented to the caller.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.filename)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open the terminal artifact for streaming.
    ///
    /// On error the job is dropped here, which disposes it.
    pub async fn open(self) -> Result<DeliveryStream> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            Error::Delivery(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        debug!(job_id = %self.job.id(), size = self.size, "Delivery started");
        Ok(DeliveryStream {
            inner: ReaderStream::new(file),
            job: self.job,
            sent: 0,
            expected: self.size,
        })
    }
}

/// Byte stream of a terminal artifact that disposes its job when dropped.
#[derive(Debug)]
pub struct DeliveryStream {
    // Declared before `job` so the file handle closes before disposal runs.
    inner: ReaderStream<tokio::fs::File>,
    job: Job,
    sent: u64,
    expected: u64,
}

impl DeliveryStream {
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

impl Drop for DeliveryStream {
    fn drop(&mut self) {
        if self.bytes_sent() < self.expected {
            debug!(
                job_id = %self.job.id(),
                sent = self.bytes_sent(),
                expected = self.expected,
                "Delivery stream closed early"
            );
        }
    }
}

impl Stream for DeliveryStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                if this.sent >= this.expected {
                    this.job.mark_delivered();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!(job_id = %this.job.id(), error = %e, "Failed to read terminal artifact");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if this.sent >= this.expected {
                    this.job.mark_delivered();
                } else {
                    warn!(
                        job_id = %this.job.id(),
                        sent = this.sent,
                        expected = this.expected,
                        "Terminal artifact shorter than announced"
                    );
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
