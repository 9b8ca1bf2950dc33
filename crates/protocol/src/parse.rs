use std::vec::IntoIter;

use squall_common::CommandError;

use crate::Frame;

/// Cursor sobre um Frame::Array para extrair argumentos sequencialmente.
pub struct Parse {
    parts: IntoIter<Frame>,
}

impl Parse {
    /// Cria um Parse a partir de um Frame. O frame deve ser Array.
    pub fn new(frame: Frame) -> Result<Parse, CommandError> {
        match frame {
            Frame::Array(parts) => Ok(Parse {
                parts: parts.into_iter(),
            }),
            _ => Err(CommandError::InvalidArgument("esperado array".into())),
        }
    }

    /// Retorna o próximo elemento como String (de Bulk ou Simple).
    pub fn next_string(&mut self) -> Result<String, CommandError> {
        match self.next()? {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(data) => String::from_utf8(data.to_vec())
                .map_err(|_| CommandError::InvalidArgument("string UTF-8 inválida".into())),
            Frame::Null => Ok(String::new()),
            _ => Err(CommandError::InvalidArgument(
                "esperado string ou bulk".into(),
            )),
        }
    }

    /// Retorna o próximo elemento como i64 (Integer ou texto decimal).
    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        match self.next()? {
            Frame::Integer(n) => Ok(n),
            Frame::Bulk(data) => {
                let s = std::str::from_utf8(&data)
                    .map_err(|_| CommandError::InvalidArgument("inteiro inválido".into()))?;
                parse_int(s)
            }
            Frame::Simple(s) => parse_int(&s),
            _ => Err(CommandError::InvalidArgument("esperado inteiro".into())),
        }
    }

    /// Consome todos os argumentos restantes como strings.
    pub fn rest_strings(&mut self) -> Result<Vec<String>, CommandError> {
        let mut out = Vec::with_capacity(self.remaining());
        while self.has_remaining() {
            out.push(self.next_string()?);
        }
        Ok(out)
    }

    /// Verifica se todos os argumentos foram consumidos.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.has_remaining() {
            Err(CommandError::InvalidArgument(
                "argumentos extras não esperados".into(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn remaining(&self) -> usize {
        self.parts.len()
    }

    fn next(&mut self) -> Result<Frame, CommandError> {
        self.parts
            .next()
            .ok_or_else(|| CommandError::InvalidArgument("argumentos insuficientes".into()))
    }
}

fn parse_int(s: &str) -> Result<i64, CommandError> {
    s.parse::<i64>()
        .map_err(|_| CommandError::InvalidArgument(format!("'{s}' não é um inteiro")))
}
