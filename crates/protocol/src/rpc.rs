use std::fmt;

use squall_common::CommandError;

use crate::{Action, Frame, Parse};

/// Procedimentos expostos entre peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Verificação de vida.
    Ping,
    /// Mutação enviada ao líder (por um seguidor ou cliente).
    Master,
    /// Mutação propagada pelo líder a um seguidor.
    Slave,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Ping => "PING",
            Method::Master => "MASTER",
            Method::Slave => "SLAVE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Uma mutação: ação + argumentos já serializados como texto.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub action: Action,
    pub values: Vec<String>,
}

impl Mutation {
    pub fn new(action: Action, values: Vec<String>) -> Self {
        Self { action, values }
    }

    /// Chave principal afetada (a primeira, para `del`).
    pub fn key(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or("")
    }
}

/// Requisição RPC: `[method, user, password, action, values...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub credentials: Option<Credentials>,
    pub mutation: Option<Mutation>,
}

impl Request {
    pub fn ping(credentials: Option<Credentials>) -> Self {
        Self {
            method: Method::Ping,
            credentials,
            mutation: None,
        }
    }

    pub fn master(credentials: Option<Credentials>, mutation: Mutation) -> Self {
        Self {
            method: Method::Master,
            credentials,
            mutation: Some(mutation),
        }
    }

    pub fn slave(credentials: Option<Credentials>, mutation: Mutation) -> Self {
        Self {
            method: Method::Slave,
            credentials,
            mutation: Some(mutation),
        }
    }

    pub fn from_frame(frame: Frame) -> Result<Request, CommandError> {
        let mut parse = Parse::new(frame)?;
        let name = parse.next_string()?.to_uppercase();
        let method = match name.as_str() {
            "PING" => Method::Ping,
            "MASTER" => Method::Master,
            "SLAVE" => Method::Slave,
            _ => return Err(CommandError::Unknown(name)),
        };

        let username = parse.next_string()?;
        let password = parse.next_string()?;
        let credentials = if username.is_empty() && password.is_empty() {
            None
        } else {
            Some(Credentials { username, password })
        };

        if method == Method::Ping {
            parse.finish()?;
            return Ok(Request::ping(credentials));
        }

        let action = Action::from_code(parse.next_int()?)?;
        let values = parse.rest_strings()?;
        if values.len() < action.min_values() {
            return Err(CommandError::WrongArity(action.name().to_string()));
        }

        Ok(Request {
            method,
            credentials,
            mutation: Some(Mutation { action, values }),
        })
    }

    pub fn to_frame(&self) -> Frame {
        let (user, pass) = match &self.credentials {
            Some(c) => (c.username.as_str(), c.password.as_str()),
            None => ("", ""),
        };
        let mut parts = vec![
            Frame::bulk(self.method.name()),
            Frame::bulk(user),
            Frame::bulk(pass),
        ];
        if let Some(mutation) = &self.mutation {
            parts.push(Frame::Integer(mutation.action.code()));
            parts.extend(mutation.values.iter().map(|v| Frame::bulk(v)));
        }
        Frame::Array(parts)
    }
}

/// Código de status da resposta; distingue "não encontrado" das demais falhas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    BadArgument,
    TypeConflict,
    Unauthenticated,
    RoleMismatch,
    Canceled,
    Internal,
}

impl Status {
    pub fn code(self) -> i64 {
        match self {
            Status::Ok => 0,
            Status::NotFound => 1,
            Status::BadArgument => 2,
            Status::TypeConflict => 3,
            Status::Unauthenticated => 4,
            Status::RoleMismatch => 5,
            Status::Canceled => 6,
            Status::Internal => 7,
        }
    }

    pub fn from_code(code: i64) -> Status {
        match code {
            0 => Status::Ok,
            1 => Status::NotFound,
            2 => Status::BadArgument,
            3 => Status::TypeConflict,
            4 => Status::Unauthenticated,
            5 => Status::RoleMismatch,
            6 => Status::Canceled,
            _ => Status::Internal,
        }
    }
}

/// Resposta RPC: `[status, value]`. Em erro, `value` carrega a mensagem.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub value: String,
}

impl Response {
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            value: value.into(),
        }
    }

    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            value: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn from_frame(frame: Frame) -> Result<Response, CommandError> {
        let mut parse = Parse::new(frame)?;
        let status = Status::from_code(parse.next_int()?);
        let value = parse.next_string()?;
        parse.finish()?;
        Ok(Response { status, value })
    }

    pub fn to_frame(&self) -> Frame {
        Frame::Array(vec![
            Frame::Integer(self.status.code()),
            Frame::bulk(&self.value),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Option<Credentials> {
        Some(Credentials {
            username: "admin".into(),
            password: "s3cret".into(),
        })
    }

    #[test]
    fn master_request_layout() {
        let req = Request::master(
            creds(),
            Mutation::new(Action::HSet, vec!["h".into(), "f".into(), "v".into()]),
        );
        let frame = req.to_frame();
        match &frame {
            Frame::Array(parts) => {
                assert_eq!(parts[0], Frame::bulk("MASTER"));
                assert_eq!(parts[1], Frame::bulk("admin"));
                assert_eq!(parts[3], Frame::Integer(Action::HSet.code()));
                assert_eq!(parts.len(), 7);
            }
            _ => panic!("expected array"),
        }
        assert_eq!(Request::from_frame(frame).unwrap(), req);
    }

    #[test]
    fn empty_credentials_decode_as_none() {
        let req = Request::slave(None, Mutation::new(Action::Pop, vec!["l".into()]));
        let decoded = Request::from_frame(req.to_frame()).unwrap();
        assert_eq!(decoded.credentials, None);
        assert_eq!(decoded.method, Method::Slave);
    }

    #[test]
    fn ping_has_no_mutation() {
        let decoded = Request::from_frame(Request::ping(None).to_frame()).unwrap();
        assert_eq!(decoded.method, Method::Ping);
        assert!(decoded.mutation.is_none());
    }

    #[test]
    fn too_few_values_is_wrong_arity() {
        let frame = Frame::Array(vec![
            Frame::bulk("MASTER"),
            Frame::bulk(""),
            Frame::bulk(""),
            Frame::Integer(Action::Set.code()),
            Frame::bulk("only-key"),
        ]);
        assert!(matches!(
            Request::from_frame(frame),
            Err(CommandError::WrongArity(_))
        ));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let frame = Frame::array_from_strs(&["VOTE", "", ""]);
        assert!(matches!(
            Request::from_frame(frame),
            Err(CommandError::Unknown(_))
        ));
    }

    #[test]
    fn response_carries_status() {
        let resp = Response::error(Status::NotFound, "valor não encontrado");
        let decoded = Response::from_frame(resp.to_frame()).unwrap();
        assert_eq!(decoded.status, Status::NotFound);
        assert!(!decoded.is_ok());
        assert!(Response::ok("OK").is_ok());
    }
}
