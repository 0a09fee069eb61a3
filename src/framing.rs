use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const NEWLINE: u8 = b'\n';
pub const FILE_DELIMITER: u8 = 0x10;

/// How a byte source is cut into messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// Interactive input: one message per line.
    Line,
    /// File input: messages separated by an arbitrary byte.
    Delimiter(u8),
}

impl Framing {
    pub fn delimiter(&self) -> u8 {
        match self {
            Framing::Line => NEWLINE,
            Framing::Delimiter(byte) => *byte,
        }
    }
}

/// Pulls messages out of a buffered input according to a `Framing`.
pub struct MessageReader<R> {
    input: R,
    framing: Framing,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    pub fn new(input: R, framing: Framing) -> Self {
        Self {
            input,
            framing,
            buf: Vec::new(),
        }
    }

    /// Returns the next message without its delimiter, or `None` once the
    /// input is exhausted. Bytes after the last delimiter come out as a final message.
    pub async fn next_message(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        self.buf.clear();
        let delimiter = self.framing.delimiter();
        let n = self.input.read_until(delimiter, &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&delimiter) {
            self.buf.pop();
        }

        Ok(Some(std::mem::take(&mut self.buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &[u8], framing: Framing) -> Vec<Vec<u8>> {
        let mut reader = MessageReader::new(input, framing);
        let mut messages = Vec::new();
        while let Some(message) = reader.next_message().await.unwrap() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn line_strips_newline() {
        assert_eq!(collect(b"hello\n", Framing::Line).await, vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn line_keeps_empty_lines() {
        assert_eq!(
            collect(b"a\n\nb\n", Framing::Line).await,
            vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]
        );
    }

    #[tokio::test]
    async fn file_splits_on_0x10() {
        assert_eq!(
            collect(b"a\x10b\x10", Framing::Delimiter(FILE_DELIMITER)).await,
            vec![b"a".to_vec(), b"b".to_vec()]
        );
    }

    // File mode does not treat newline as a boundary unless asked to.
    #[tokio::test]
    async fn file_mode_keeps_newlines_inside_messages() {
        assert_eq!(
            collect(b"one\ntwo\x10", Framing::Delimiter(FILE_DELIMITER)).await,
            vec![b"one\ntwo".to_vec()]
        );
        assert_eq!(
            collect(b"one\ntwo\n", Framing::Delimiter(NEWLINE)).await,
            vec![b"one".to_vec(), b"two".to_vec()]
        );
    }

    #[tokio::test]
    async fn trailing_bytes_form_last_message() {
        assert_eq!(
            collect(b"a\nbc", Framing::Line).await,
            vec![b"a".to_vec(), b"bc".to_vec()]
        );
    }

    #[tokio::test]
    async fn empty_input_is_exhausted() {
        assert!(collect(b"", Framing::Line).await.is_empty());
    }
}
