//! Reassembles complete lines from WebSocket frames.

/// Buffers inbound text and yields complete lines.
///
/// A frame may carry several lines or end mid-line; the trailing fragment is
/// kept until the next frame completes it.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completes, without delimiters.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Bytes held back waiting for a delimiter.
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    pub fn clear(&mut self) {
        self.partial.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "@badge-info=;color=#FF0000 :a!a@a PRIVMSG #foo :hello\r\n\
                          PING :tmi.twitch.tv\r\n\
                          :tmi.twitch.tv 001 me :Welcome, GLHF!\r\n";

    #[test]
    fn test_multiple_lines_in_one_frame() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(STREAM);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "PING :tmi.twitch.tv");
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_split_at_every_boundary_matches_whole() {
        let whole = LineBuffer::new().push(STREAM);
        for split in 0..=STREAM.len() {
            if !STREAM.is_char_boundary(split) {
                continue;
            }
            let mut buffer = LineBuffer::new();
            let mut lines = buffer.push(&STREAM[..split]);
            lines.extend(buffer.push(&STREAM[split..]));
            assert_eq!(lines, whole, "split at {split}");
        }
    }

    #[test]
    fn test_byte_by_byte() {
        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        for c in STREAM.chars() {
            lines.extend(buffer.push(&c.to_string()));
        }
        assert_eq!(lines, LineBuffer::new().push(STREAM));
    }

    #[test]
    fn test_partial_line_retained_until_delimiter() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push("PING :tmi").is_empty());
        assert_eq!(buffer.pending_len(), 9);
        assert_eq!(buffer.push(".twitch.tv\r\n"), vec!["PING :tmi.twitch.tv".to_string()]);
        buffer.push("dangling");
        buffer.clear();
        assert_eq!(buffer.pending_len(), 0);
    }
}
