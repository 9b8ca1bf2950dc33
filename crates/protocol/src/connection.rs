use bytes::BytesMut;
use std::io::Cursor;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};

use squall_common::{ConnectionError, INITIAL_BUFFER_CAPACITY, ProtocolError};

use crate::Frame;

/// Wrapper sobre TcpStream com buffer para leitura/escrita de frames RESP.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Abre uma conexão respeitando o timeout de discagem.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
    ) -> Result<Connection, ConnectionError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout.as_millis() as u64))??;
        stream.set_nodelay(true)?;
        Ok(Connection::new(stream))
    }

    /// Lê um frame completo do stream. Retorna None no EOF.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ConnectionError::ConnectionReset);
            }
        }
    }

    /// Escreve um frame no stream.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        self.stream.write_all(&frame.to_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Envia um frame e aguarda a resposta, tudo dentro de `timeout`.
    pub async fn call(&mut self, frame: &Frame, timeout: Duration) -> Result<Frame, ConnectionError> {
        let exchange = async {
            self.write_frame(frame).await?;
            self.read_frame()
                .await?
                .ok_or(ConnectionError::ConnectionReset)
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ConnectionError::Timeout(timeout.as_millis() as u64))?
    }

    fn parse_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        let mut cursor = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut cursor) {
            Ok(()) => {
                let len = cursor.position() as usize;
                cursor.set_position(0);
                let frame = Frame::parse(&mut cursor)?;
                let _ = self.buffer.split_to(len);
                Ok(Some(frame))
            }
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
