use std::time::Duration;

use squall_common::{ClusterError, DEFAULT_HOST, DEFAULT_NAMESPACE, DEFAULT_PORT};
use squall_protocol::Credentials;

/// Configuração de um nó do cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub namespace: String,
    /// Nome do cluster dentro do namespace. Obrigatório.
    pub prefix: String,
    /// Host anunciado aos peers.
    pub host: String,
    /// Porta da superfície RPC anunciada aos peers.
    pub port: u16,
    /// Id fixo do nó; gerado a partir do host quando ausente.
    pub node_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// TTL do lease de registro no serviço de coordenação.
    pub lease_ttl: Duration,
    pub dial_timeout: Duration,
    pub rpc_timeout: Duration,
    /// Tentativas de discagem antes de considerar o peer inacessível.
    pub dial_retries: u32,
    pub dial_backoff: Duration,
    /// Espera entre reinícios das tarefas de registro/eleição.
    pub retry_delay: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            prefix: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            node_id: None,
            username: None,
            password: None,
            lease_ttl: Duration::from_secs(5),
            dial_timeout: Duration::from_secs(2),
            rpc_timeout: Duration::from_secs(3),
            dial_retries: 3,
            dial_backoff: Duration::from_millis(200),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl ClusterConfig {
    /// Falha cedo em configurações que só quebrariam no primeiro uso.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.prefix.trim().is_empty() {
            return Err(ClusterError::Config("prefixo do cluster ausente".into()));
        }
        if self.port == 0 {
            return Err(ClusterError::Config("porta não pode ser 0".into()));
        }
        match &self.username {
            Some(username) if username.trim().is_empty() => {
                return Err(ClusterError::Config("usuário não pode ser vazio".into()));
            }
            None if self.password.is_some() => {
                return Err(ClusterError::Config("senha configurada sem usuário".into()));
            }
            _ => {}
        }
        if self.lease_ttl.is_zero() {
            return Err(ClusterError::Config("ttl do lease não pode ser 0".into()));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }

    /// `<namespace>/<prefix>/server/`
    pub fn discovery_prefix(&self) -> String {
        format!("{}/{}/server/", self.namespace, self.prefix)
    }

    pub fn discovery_key(&self, node_id: &str) -> String {
        format!("{}{}", self.discovery_prefix(), node_id)
    }

    /// `<namespace>/<prefix>/election`
    pub fn election_key(&self) -> String {
        format!("{}/{}/election", self.namespace, self.prefix)
    }
}
