use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{DecodeError, TransportError};
use crate::types::TokensUsage;

pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParsedLine {
    Fragment(String),
    /// Terminal record, optionally carrying the generated token count
    Done(Option<TokensUsage>),
    /// The backend reported an error inside the stream
    BackendError(String),
    /// Well-formed record without text
    Empty,
    Malformed(DecodeError),
}

pub(crate) fn parse_line(line: &str) -> ParsedLine {
    let record: StreamRecord = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(err) => return ParsedLine::Malformed(DecodeError(err.to_string())),
    };

    if let Some(error) = record.error {
        return ParsedLine::BackendError(error);
    }
    match record.response {
        Some(text) if !text.is_empty() => ParsedLine::Fragment(text),
        _ if record.done => ParsedLine::Done(record.eval_count.map(TokensUsage)),
        _ => ParsedLine::Empty,
    }
}

pub(crate) fn decode_chunk(chunk: &[u8]) -> Vec<ParsedLine> {
    String::from_utf8_lossy(chunk)
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

#[derive(Debug, Default)]
pub(crate) struct StreamDecoder {
    text: String,
    tokens: Option<TokensUsage>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, line: ParsedLine) -> Option<String> {
        match line {
            ParsedLine::Fragment(text) => {
                self.text.push_str(&text);
                Some(text)
            }
            ParsedLine::Done(tokens) => {
                self.tokens = tokens;
                None
            }
            ParsedLine::BackendError(message) => {
                warn!("backend reported an error mid-stream: {}", message);
                None
            }
            ParsedLine::Empty => None,
            ParsedLine::Malformed(err) => {
                debug!("skipping line: {}", err);
                None
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(self) -> (String, Option<TokensUsage>) {
        (self.text, self.tokens)
    }
}

/// Chunks are split independently, a record cut by a chunk boundary is dropped
pub(crate) fn lines(
    body: ByteStream,
) -> impl Stream<Item = Result<ParsedLine, TransportError>> + Send {
    body.flat_map(|chunk| match chunk {
        Ok(bytes) => stream::iter(decode_chunk(&bytes).into_iter().map(Ok).collect::<Vec<_>>()),
        Err(err) => stream::iter(vec![Err(err)]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: &[&'static str]) -> ByteStream {
        let chunks: Vec<Result<Bytes, TransportError>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    async fn decode_all(body: ByteStream) -> (Vec<String>, String) {
        let mut decoder = StreamDecoder::new();
        let mut fragments = Vec::new();
        let mut records = Box::pin(lines(body));
        while let Some(line) = records.next().await {
            if let Some(fragment) = decoder.apply(line.unwrap()) {
                fragments.push(fragment);
            }
        }
        (fragments, decoder.finish().0)
    }

    #[tokio::test]
    async fn fragments_are_concatenated_in_order() {
        let (fragments, text) = decode_all(body(&[
            "{\"response\":\"Hi\"}\n",
            "{\"response\":\" there\"}\n",
        ]))
        .await;
        assert_eq!(fragments, vec!["Hi", " there"]);
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let (_, text) = decode_all(body(&[
            "{\"response\":\"Hi\"}\n",
            "not-json\n",
            "{\"response\":\" there\"}\n",
        ]))
        .await;
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn several_records_in_one_chunk() {
        let (fragments, text) = decode_all(body(&[
            "{\"response\":\"a\"}\n{\"response\":\"b\"}\n\n{\"response\":\"c\",\"done\":false}\n",
        ]))
        .await;
        assert_eq!(fragments.len(), 3);
        assert_eq!(text, "abc");
    }

    #[tokio::test]
    async fn record_split_across_chunks_is_dropped() {
        let (_, text) = decode_all(body(&[
            "{\"response\":\"Hi\"}\n{\"respo",
            "nse\":\" lost\"}\n{\"response\":\"!\"}\n",
        ]))
        .await;
        assert_eq!(text, "Hi!");
    }

    #[test]
    fn terminal_record_carries_token_usage() {
        let line = parse_line(r#"{"response":"","done":true,"eval_count":42}"#);
        assert_eq!(line, ParsedLine::Done(Some(TokensUsage(42))));

        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.apply(line), None);
        assert_eq!(decoder.finish().1, Some(TokensUsage(42)));
    }

    #[test]
    fn error_record_is_not_text() {
        assert_eq!(
            parse_line(r#"{"error":"model not found"}"#),
            ParsedLine::BackendError("model not found".to_string())
        );
        assert_eq!(parse_line(r#"{"model":"mistral"}"#), ParsedLine::Empty);
    }

    #[tokio::test]
    async fn body_error_is_forwarded() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"{\"response\":\"Hi\"}\n")),
            Err(TransportError::connection("reset")),
        ];
        let collected: Vec<_> = lines(Box::pin(stream::iter(chunks))).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[1].is_err());
    }
}
