use std::io::SeekFrom;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::http::response::SendFile;
use crate::spartan::grammar::format_status_line;
use crate::spartan::status::{WireBody, WireResponse};

/// Status line plus in-memory body.
fn serialize_response(resp: &WireResponse) -> Vec<u8> {
    let mut buf = format_status_line(resp.status, &resp.meta);
    if let WireBody::Bytes(body) = &resp.body {
        buf.extend_from_slice(body);
    }
    buf
}

/// Writes one Spartan response. The caller closes the connection afterwards;
/// the close is what tells the client the body has ended.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
    file: Option<SendFile>,
}

impl ResponseWriter {
    pub fn new(response: &WireResponse) -> Self {
        let file = match &response.body {
            WireBody::File(file) => Some(file.clone()),
            _ => None,
        };
        Self {
            buffer: serialize_response(response),
            written: 0,
            file,
        }
    }

    /// Bytes that go out before any file contents.
    pub fn head(&self) -> &[u8] {
        &self.buffer
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        if let Some(file) = self.file.take() {
            send_file(&file, stream).await?;
        }

        stream.flush().await?;
        Ok(())
    }
}

async fn send_file<W>(file: &SendFile, stream: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut source = File::open(&file.path).await?;
    source.seek(SeekFrom::Start(file.offset)).await?;

    let mut reader: Box<dyn AsyncRead + Unpin + Send> = if file.length == 0 {
        Box::new(source)
    } else {
        Box::new(source.take(file.length))
    };
    tokio::io::copy(&mut reader, stream).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_status_line_then_body() {
        let mut wire = WireResponse::new(2, "text/gemini");
        wire.body = WireBody::Bytes(b"# Hi".to_vec());

        let mut writer = ResponseWriter::new(&wire);
        assert_eq!(writer.head(), b"2 text/gemini\r\n# Hi");

        let mut out = Vec::new();
        writer.write_to_stream(&mut out).await.unwrap();
        assert_eq!(out, b"2 text/gemini\r\n# Hi".to_vec());
    }

    #[test]
    fn error_status_has_no_body() {
        let writer = ResponseWriter::new(&WireResponse::new(5, "Path /x Not Found"));
        assert_eq!(writer.head(), b"5 Path /x Not Found\r\n");
    }
}
