use bytes::{Buf, BufMut, Bytes, BytesMut};
use squall_common::{MAX_FRAME_SIZE, ProtocolError};
use std::io::Cursor;

const CRLF: &[u8] = b"\r\n";

/// Frame RESP2 trocado entre peers e com o serviço de coordenação.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Confere se há um frame completo no buffer, sem alocar.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
        match get_u8(src)? {
            b'+' | b'-' | b':' => get_line(src).map(|_| ()),
            b'$' => match bulk_len(src)? {
                Some(len) => skip(src, len + CRLF.len()),
                None => Ok(()),
            },
            b'*' => {
                if let Some(count) = array_len(src)? {
                    for _ in 0..count {
                        Frame::check(src)?;
                    }
                }
                Ok(())
            }
            byte => Err(ProtocolError::InvalidFrameType(byte)),
        }
    }

    /// Faz o parse de um frame completo. Só deve ser chamado após `check()`.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, ProtocolError> {
        match get_u8(src)? {
            b'+' => Ok(Frame::Simple(utf8_line(src)?)),
            b'-' => Ok(Frame::Error(utf8_line(src)?)),
            b':' => Ok(Frame::Integer(get_decimal(src)?)),
            b'$' => {
                let Some(len) = bulk_len(src)? else {
                    return Ok(Frame::Null);
                };
                if src.remaining() < len + CRLF.len() {
                    return Err(ProtocolError::Incomplete);
                }
                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + len]);
                src.advance(len + CRLF.len());
                Ok(Frame::Bulk(data))
            }
            b'*' => {
                let Some(count) = array_len(src)? else {
                    return Ok(Frame::Null);
                };
                let mut frames = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    frames.push(Frame::parse(src)?);
                }
                Ok(Frame::Array(frames))
            }
            byte => Err(ProtocolError::InvalidFrameType(byte)),
        }
    }

    /// Encoda o frame em formato RESP2.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => put_line(dst, b'+', s.as_bytes()),
            Frame::Error(s) => put_line(dst, b'-', s.as_bytes()),
            Frame::Integer(n) => put_line(dst, b':', n.to_string().as_bytes()),
            Frame::Bulk(data) => {
                put_line(dst, b'$', data.len().to_string().as_bytes());
                dst.put(data.as_ref());
                dst.put(CRLF);
            }
            Frame::Null => dst.put(&b"$-1\r\n"[..]),
            Frame::Array(frames) => {
                put_line(dst, b'*', frames.len().to_string().as_bytes());
                for frame in frames {
                    frame.encode(dst);
                }
            }
        }
    }

    /// Helper: cria um Frame::Bulk a partir de &str.
    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Helper: cria um Array de Bulk strings.
    pub fn array_from_strs<S: AsRef<str>>(strs: &[S]) -> Frame {
        Frame::Array(strs.iter().map(|s| Frame::bulk(s.as_ref())).collect())
    }

    /// Serializa o frame num buffer novo.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

fn put_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.put_u8(prefix);
    dst.put(body);
    dst.put(CRLF);
}

/// Comprimento de um bulk; `None` para o bulk nulo (`$-1`).
fn bulk_len(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, ProtocolError> {
    let len = get_decimal(src)?;
    match len {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidBulkLength(n)),
        n if n as usize > MAX_FRAME_SIZE => Err(ProtocolError::FrameTooLarge(n as usize)),
        n => Ok(Some(n as usize)),
    }
}

fn array_len(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, ProtocolError> {
    let count = get_decimal(src)?;
    match count {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidBulkLength(n)),
        n => Ok(Some(n as usize)),
    }
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();
    let end = buf[start..]
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .ok_or(ProtocolError::Incomplete)?;
    src.set_position((start + end + CRLF.len()) as u64);
    Ok(&buf[start..start + end])
}

fn utf8_line(src: &mut Cursor<&[u8]>) -> Result<String, ProtocolError> {
    let line = get_line(src)?;
    String::from_utf8(line.to_vec()).map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let line = get_line(src)?;
    let s = std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidInteger(e.to_string()))?;
    s.parse::<i64>()
        .map_err(|e| ProtocolError::InvalidInteger(e.to_string()))
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::Incomplete);
    }
    src.advance(n);
    Ok(())
}
