use squall_common::CommandError;

use crate::{Frame, Parse};

/// Identificador de lease concedido pelo serviço de coordenação.
pub type LeaseId = i64;

/// Comandos do protocolo do serviço de coordenação.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordCommand {
    Grant {
        ttl_ms: u64,
    },
    KeepAlive {
        lease: LeaseId,
    },
    Revoke {
        lease: LeaseId,
    },
    Put {
        key: String,
        value: String,
        lease: LeaseId,
    },
    GetPrefix {
        prefix: String,
    },
    /// Muda a conexão para modo streaming de `WatchEvent`.
    Watch {
        prefix: String,
    },
    /// Bloqueia até o candidato ser eleito.
    Campaign {
        election: String,
        candidate: String,
        lease: LeaseId,
    },
    /// Muda a conexão para modo streaming de líderes observados.
    Observe {
        election: String,
    },
}

impl CoordCommand {
    pub fn from_frame(frame: Frame) -> Result<CoordCommand, CommandError> {
        let mut parse = Parse::new(frame)?;
        let name = parse.next_string()?.to_uppercase();

        let cmd = match name.as_str() {
            "GRANT" => {
                let ttl_ms = parse.next_int()?;
                if ttl_ms <= 0 {
                    return Err(CommandError::InvalidArgument(
                        "ttl do lease deve ser positivo".into(),
                    ));
                }
                CoordCommand::Grant {
                    ttl_ms: ttl_ms as u64,
                }
            }
            "KEEPALIVE" => CoordCommand::KeepAlive {
                lease: parse.next_int()?,
            },
            "REVOKE" => CoordCommand::Revoke {
                lease: parse.next_int()?,
            },
            "PUT" => CoordCommand::Put {
                key: parse.next_string()?,
                value: parse.next_string()?,
                lease: parse.next_int()?,
            },
            "GETPREFIX" => CoordCommand::GetPrefix {
                prefix: parse.next_string()?,
            },
            "WATCH" => CoordCommand::Watch {
                prefix: parse.next_string()?,
            },
            "CAMPAIGN" => CoordCommand::Campaign {
                election: parse.next_string()?,
                candidate: parse.next_string()?,
                lease: parse.next_int()?,
            },
            "OBSERVE" => CoordCommand::Observe {
                election: parse.next_string()?,
            },
            _ => return Err(CommandError::Unknown(name)),
        };
        parse.finish()?;
        Ok(cmd)
    }

    pub fn to_frame(&self) -> Frame {
        match self {
            CoordCommand::Grant { ttl_ms } => {
                Frame::Array(vec![Frame::bulk("GRANT"), Frame::Integer(*ttl_ms as i64)])
            }
            CoordCommand::KeepAlive { lease } => {
                Frame::Array(vec![Frame::bulk("KEEPALIVE"), Frame::Integer(*lease)])
            }
            CoordCommand::Revoke { lease } => {
                Frame::Array(vec![Frame::bulk("REVOKE"), Frame::Integer(*lease)])
            }
            CoordCommand::Put { key, value, lease } => Frame::Array(vec![
                Frame::bulk("PUT"),
                Frame::bulk(key),
                Frame::bulk(value),
                Frame::Integer(*lease),
            ]),
            CoordCommand::GetPrefix { prefix } => {
                Frame::Array(vec![Frame::bulk("GETPREFIX"), Frame::bulk(prefix)])
            }
            CoordCommand::Watch { prefix } => {
                Frame::Array(vec![Frame::bulk("WATCH"), Frame::bulk(prefix)])
            }
            CoordCommand::Campaign {
                election,
                candidate,
                lease,
            } => Frame::Array(vec![
                Frame::bulk("CAMPAIGN"),
                Frame::bulk(election),
                Frame::bulk(candidate),
                Frame::Integer(*lease),
            ]),
            CoordCommand::Observe { election } => {
                Frame::Array(vec![Frame::bulk("OBSERVE"), Frame::bulk(election)])
            }
        }
    }
}

/// Evento de mudança sob um prefixo observado.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Put { key: String, value: String },
    Delete { key: String },
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key } => key,
        }
    }

    pub fn from_frame(frame: Frame) -> Result<WatchEvent, CommandError> {
        let mut parse = Parse::new(frame)?;
        let kind = parse.next_string()?;
        let key = parse.next_string()?;
        let event = match kind.as_str() {
            "put" => WatchEvent::Put {
                key,
                value: parse.next_string()?,
            },
            "delete" => WatchEvent::Delete { key },
            other => {
                return Err(CommandError::InvalidArgument(format!(
                    "evento de watch desconhecido: {other}"
                )));
            }
        };
        parse.finish()?;
        Ok(event)
    }

    pub fn to_frame(&self) -> Frame {
        match self {
            WatchEvent::Put { key, value } => {
                Frame::array_from_strs(&["put", key.as_str(), value.as_str()])
            }
            WatchEvent::Delete { key } => Frame::array_from_strs(&["delete", key.as_str()]),
        }
    }
}

/// Encoda o líder observado de uma eleição (`""` = sem líder).
pub fn leader_frame(leader: Option<&str>) -> Frame {
    Frame::array_from_strs(&["leader", leader.unwrap_or("")])
}

pub fn leader_from_frame(frame: Frame) -> Result<Option<String>, CommandError> {
    let mut parse = Parse::new(frame)?;
    if parse.next_string()? != "leader" {
        return Err(CommandError::InvalidArgument("esperado evento leader".into()));
    }
    let leader = parse.next_string()?;
    parse.finish()?;
    Ok(Some(leader).filter(|l| !l.is_empty()))
}

/// Encoda o resultado de `GETPREFIX` como array plano `[k1, v1, k2, v2, ...]`.
pub fn pairs_frame(pairs: &[(String, String)]) -> Frame {
    Frame::Array(
        pairs
            .iter()
            .flat_map(|(k, v)| [Frame::bulk(k), Frame::bulk(v)])
            .collect(),
    )
}

pub fn pairs_from_frame(frame: Frame) -> Result<Vec<(String, String)>, CommandError> {
    let mut parse = Parse::new(frame)?;
    if parse.remaining() % 2 != 0 {
        return Err(CommandError::InvalidArgument(
            "lista de pares com tamanho ímpar".into(),
        ));
    }
    let mut pairs = Vec::with_capacity(parse.remaining() / 2);
    while parse.has_remaining() {
        pairs.push((parse.next_string()?, parse.next_string()?));
    }
    Ok(pairs)
}
