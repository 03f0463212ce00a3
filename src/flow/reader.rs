use crate::errors::Error;
use crate::flow::{json, FlowRecord};

use futures::io::{AsyncBufRead, AsyncRead, BufReader};
use futures::Stream;
use log::*;
use pin_project::pin_project;
use std::convert::TryFrom;
use std::pin::Pin;
use std::task::{Context, Poll};

const BUFFER_SIZE: usize = 1_000_000;

/// Decodes flow records from a dump of JSON documents, batch per read.
///
/// Documents that are valid JSON but not flow records are skipped with a
/// warning. A document cut off by the end of input ends the stream with
/// [`Error::TruncatedDump`].
#[pin_project]
pub struct FlowReader<R> {
    #[pin]
    inner: BufReader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<R: AsyncRead> FlowReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::with_capacity(BUFFER_SIZE),
            done: false,
        }
    }
}

impl<R: AsyncRead> Stream for FlowReader<R> {
    type Item = Result<Vec<FlowRecord>, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match futures::ready!(this.inner.as_mut().poll_fill_buf(cx)) {
            Err(e) => Poll::Ready(Some(Err(Error::Io(e)))),
            Ok(available) => {
                let bytes_read = available.len();

                trace!("Read {}B", bytes_read);

                if bytes_read == 0 {
                    *this.done = true;
                    let unread = this.buf.iter().filter(|c| !c.is_ascii_whitespace()).count();
                    if unread > 0 {
                        return Poll::Ready(Some(Err(Error::TruncatedDump(unread))));
                    }
                    return Poll::Ready(None);
                }

                this.buf.extend_from_slice(available);
                this.inner.as_mut().consume(bytes_read);

                let (records, unread_position) = match json::split_documents(this.buf.as_slice()) {
                    Err(e) => {
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Ok((rem, docs)) => {
                        let records: Vec<_> = docs
                            .into_iter()
                            .filter_map(|d| match FlowRecord::try_from(d) {
                                Ok(r) => Some(r),
                                Err(e) => {
                                    warn!("Skipping document that is not a flow record: {:?}", e);
                                    None
                                }
                            })
                            .collect();
                        (records, this.buf.len() - rem.len())
                    }
                };

                debug!("Collected {} flow records", records.len());
                let to_keep = this.buf.split_off(unread_position);
                *this.buf = to_keep;

                Poll::Ready(Some(Ok(records)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    const FLOW: &'static str = r#"{"timestamp":"2024-01-01T00:02:00Z","IN_BYTES":100,"PROTOCOL":6}"#;

    /// Hands out its chunks one read at a time.
    struct Chunked {
        chunks: Vec<Vec<u8>>,
    }

    impl AsyncRead for Chunked {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut [u8],
        ) -> Poll<std::io::Result<usize>> {
            if self.chunks.is_empty() {
                return Poll::Ready(Ok(0));
            }
            let chunk = self.chunks.remove(0);
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.insert(0, chunk[n..].to_vec());
            }
            Poll::Ready(Ok(n))
        }
    }

    fn read_all(chunks: Vec<&str>) -> Result<Vec<FlowRecord>, Error> {
        let reader = FlowReader::new(Chunked {
            chunks: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
        });
        smol::block_on(async move {
            let batches: Vec<Vec<FlowRecord>> = reader.try_collect().await?;
            Ok::<_, Error>(batches.into_iter().flatten().collect())
        })
    }

    #[test]
    fn reads_flows() {
        let _ = env_logger::try_init();

        let dump = format!("{}\n{}\n", FLOW, FLOW);
        let flows = read_all(vec![dump.as_str()]).expect("Failed to read flows");

        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].in_bytes, Some(100));
    }

    #[test]
    fn reads_partial_flows() {
        let _ = env_logger::try_init();

        let (head, tail) = FLOW.split_at(30);
        let first = format!("{}\n{}", FLOW, head);
        let flows = read_all(vec![first.as_str(), tail, "\n", FLOW]).expect("Failed to read flows");

        assert_eq!(flows.len(), 3);
    }

    #[test]
    fn skips_documents_that_are_not_flows() {
        let _ = env_logger::try_init();

        let dump = format!("{}{{\"template_id\":256}}{}", FLOW, FLOW);
        let flows = read_all(vec![dump.as_str()]).expect("Failed to read flows");

        assert_eq!(flows.len(), 2);
    }

    #[test]
    fn fails_on_truncated_dump() {
        let _ = env_logger::try_init();

        let (head, _) = FLOW.split_at(30);
        match read_all(vec![FLOW, head]) {
            Err(Error::TruncatedDump(n)) => assert!(n > 0),
            other => panic!("Unexpected {:?}", other.map(|f| f.len())),
        }
    }
}
