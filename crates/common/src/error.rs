use crate::Category;

/// Erros de parsing do protocolo RESP.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame incompleto")]
    Incomplete,
    #[error("byte de tipo inválido: {0:#x}")]
    InvalidFrameType(u8),
    #[error("inteiro inválido: {0}")]
    InvalidInteger(String),
    #[error("comprimento de bulk inválido: {0}")]
    InvalidBulkLength(i64),
    #[error("frame excede tamanho máximo ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("encoding inválido: {0}")]
    InvalidEncoding(String),
}

/// Erros das stores tipadas e da fachada.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Chave, campo ou membro ausente (ou expirado).
    #[error("valor não encontrado")]
    NoValue,
    #[error("argumento inválido: {0}")]
    BadArgument(String),
    #[error("chave '{key}' pertence à categoria {existing}, não pode ser usada como {requested}")]
    TypeConflict {
        key: String,
        existing: Category,
        requested: Category,
    },
    #[error("operação cancelada")]
    Canceled,
    #[error("falha ao serializar valor: {0}")]
    Marshal(String),
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("conexão resetada pelo peer")]
    ConnectionReset,
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocolo: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("timeout após {0} ms")]
    Timeout(u64),
    #[error("servidor em shutdown")]
    Shutdown,
}

/// Erros de parsing/validação de requisições.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("comando desconhecido: {0}")]
    Unknown(String),
    #[error("ação desconhecida: {0}")]
    UnknownAction(i64),
    #[error("número errado de argumentos para '{0}'")]
    WrongArity(String),
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),
}

/// Erros da camada de cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("configuração inválida: {0}")]
    Config(String),
    #[error("credenciais ausentes ou inválidas")]
    Unauthenticated,
    #[error("chamada {call} recusada: nó está como {role}")]
    RoleMismatch { call: String, role: String },
    #[error("nenhum líder conhecido")]
    NoLeader,
    #[error("peer inacessível: {0}")]
    Unreachable(String),
    #[error("serviço de coordenação: {0}")]
    Coordinator(String),
    #[error("erro remoto (status {code}): {message}")]
    Remote { code: i64, message: String },
    #[error("syncer encerrado")]
    Closed,
}

/// Erro top-level do Squall.
#[derive(Debug, thiserror::Error)]
pub enum SquallError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl SquallError {
    /// `true` quando o erro representa um miss (chave/campo/membro ausente).
    pub fn is_no_value(&self) -> bool {
        matches!(self, SquallError::Store(StoreError::NoValue))
    }
}

/// Result type alias.
pub type SquallResult<T> = Result<T, SquallError>;

// Conversão implícita de io::Error → SquallError (via ConnectionError)
impl From<std::io::Error> for SquallError {
    fn from(e: std::io::Error) -> Self {
        SquallError::Connection(ConnectionError::Io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::Incomplete;
        assert_eq!(err.to_string(), "frame incompleto");
    }

    #[test]
    fn type_conflict_names_both_categories() {
        let err = StoreError::TypeConflict {
            key: "k".into(),
            existing: Category::Hash,
            requested: Category::List,
        };
        let msg = err.to_string();
        assert!(msg.contains("hash"));
        assert!(msg.contains("list"));
    }

    #[test]
    fn no_value_is_a_miss() {
        let err: SquallError = StoreError::NoValue.into();
        assert!(err.is_no_value());

        let err: SquallError = StoreError::Canceled.into();
        assert!(!err.is_no_value());
    }

    #[test]
    fn squall_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken");
        let err: SquallError = io_err.into();
        assert!(matches!(
            err,
            SquallError::Connection(ConnectionError::Io(_))
        ));
    }

    #[test]
    fn cluster_error_display() {
        let err = ClusterError::RoleMismatch {
            call: "SLAVE".into(),
            role: "leader".into(),
        };
        assert_eq!(err.to_string(), "chamada SLAVE recusada: nó está como leader");
    }
}
