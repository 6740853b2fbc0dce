//! Server-Sent Events decoding for OpenAI-compatible streaming responses.
//!
//! Chat-completion streams arrive as `data: {json}` lines separated by blank
//! lines and terminated by `data: [DONE]`. TCP chunks may split a line
//! anywhere, so bytes are buffered until a newline is seen.

use serde_json::Value;

/// Incremental SSE decoder.
///
/// # Example
///
/// ```
/// use crew_pipeline::backend::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// let data = b"data: {\"choices\":[{\"delta\":{\"content\":\"Ol\xc3\xa1\"}}]}\n\ndata: [DONE]\n\n";
/// let values = decoder.decode(data);
/// assert_eq!(values.len(), 1);
/// assert!(decoder.is_done());
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Create a new empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` terminator has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and return the JSON payload of every complete `data:`
    /// line. Keep-alives, comments and `event:` lines are skipped.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            // Multi-byte characters may straddle chunks, but never a newline.
            let line = String::from_utf8_lossy(&line);
            if let Some(value) = self.parse_line(&line) {
                values.push(value);
            }
        }
        values
    }

    /// Decode whatever is left in the buffer once the stream has ended.
    pub fn flush(&mut self) -> Vec<Value> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = String::from_utf8_lossy(&rest).into_owned();
        rest.lines()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    fn parse_line(&mut self, line: &str) -> Option<Value> {
        let data = line.trim().strip_prefix("data:")?.trim();
        if data == "[DONE]" {
            self.done = true;
            return None;
        }
        serde_json::from_str(data).ok()
    }
}

/// Extract the content delta of a chat-completion stream chunk.
pub fn delta_content(chunk: &Value) -> Option<&str> {
    chunk
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_basic_decode() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n");
        assert_eq!(values.len(), 1);
        assert_eq!(delta_content(&values[0]), Some("Hello"));
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_sse_done_marks_end() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b"data: {\"x\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(values.len(), 1);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_sse_skips_noise() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b": keep-alive\n\nevent: message\n\n\ndata:{\"x\":2}\n");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["x"], 2);
    }

    #[test]
    fn test_sse_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"cho").is_empty());
        let values = decoder.decode(b"ices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n");
        assert_eq!(values.len(), 1);
        assert_eq!(delta_content(&values[0]), Some("Hi"));
    }

    #[test]
    fn test_sse_multibyte_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"ção\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.decode(&line[..split]).is_empty());
        let values = decoder.decode(&line[split..]);
        assert_eq!(delta_content(&values[0]), Some("ção"));
    }

    #[test]
    fn test_sse_flush_trailing_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"x\":3}").is_empty());
        let values = decoder.flush();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["x"], 3);
    }

    #[test]
    fn test_delta_content_ignores_empty_and_role_chunks() {
        let role_only: Value =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        let empty: Value =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap();
        assert_eq!(delta_content(&role_only), None);
        assert_eq!(delta_content(&empty), None);
    }
}
