use crate::errors::Error;
use serde::de::IgnoredAny;
use serde_json::error::Category;
use serde_json::Deserializer;

/// Splits a buffer of concatenated or newline-delimited JSON documents.
///
/// Returns the unread tail (an incomplete trailing document, if any) and the
/// complete documents found before it.
pub fn split_documents(buffer: &[u8]) -> Result<(&[u8], Vec<&[u8]>), Error> {
    let mut stream_deserializer = Deserializer::from_slice(buffer).into_iter::<IgnoredAny>();
    let mut values = vec![];
    let mut last_good_offset = 0;

    loop {
        match stream_deserializer.next() {
            Some(Ok(_)) => {
                let end = stream_deserializer.byte_offset();
                values.push(trim_leading(&buffer[last_good_offset..end]));
                last_good_offset = end;
            }
            Some(Err(e)) if e.classify() == Category::Eof => {
                return Ok((&buffer[last_good_offset..], values));
            }
            Some(Err(e)) => {
                let s = String::from_utf8_lossy(&buffer[last_good_offset..]);
                log::debug!("Failed to split documents: {}", s);
                return Err(Error::SerdeJson(e));
            }
            None => {
                return Ok((&buffer[last_good_offset..], values));
            }
        }
    }
}

fn trim_leading(v: &[u8]) -> &[u8] {
    let start = v
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(v.len());
    &v[start..]
}
