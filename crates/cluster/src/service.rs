use tracing::{debug, warn};

use squall_common::{ClusterError, CommandError, SquallError, SquallResult, StoreError};
use squall_protocol::{Method, Request, Response, Status};

use crate::syncer::Syncer;
use crate::topology::Role;

/// Superfície RPC entre peers: `PING`, `MASTER` e `SLAVE`.
#[derive(Clone)]
pub struct RpcService {
    syncer: Syncer,
}

impl RpcService {
    pub fn new(syncer: Syncer) -> Self {
        Self { syncer }
    }

    pub fn syncer(&self) -> &Syncer {
        &self.syncer
    }

    /// Atende uma requisição já decodificada. Credenciais são conferidas antes
    /// de qualquer despacho.
    pub async fn handle(&self, request: Request) -> Response {
        if let Err(e) = self.syncer.authenticate(request.credentials.as_ref()) {
            warn!(method = %request.method, "chamada sem credenciais válidas");
            return error_response(&e.into());
        }

        let method = request.method;
        let mutation = match (method, request.mutation) {
            (Method::Ping, _) => return Response::ok("PONG"),
            (_, Some(mutation)) => mutation,
            (_, None) => {
                return Response::error(Status::BadArgument, format!("{method} sem mutação"));
            }
        };
        debug!(%method, action = %mutation.action, key = mutation.key(), "rpc recebida");

        let role = self.syncer.role();
        let expected = match method {
            Method::Master => role == Role::Leader,
            _ => role == Role::Follower,
        };
        if !expected {
            let err = ClusterError::RoleMismatch {
                call: method.name().to_string(),
                role: role.to_string(),
            };
            warn!(%method, %role, "chamada recusada pelo papel atual");
            return error_response(&err.into());
        }

        let ctx = self.syncer.shutdown_token().child_token();
        let result = match method {
            Method::Master => self.syncer.apply_and_fan_out(&ctx, mutation).await,
            _ => self.syncer.apply_local(&ctx, &mutation).await,
        };
        match result {
            Ok(value) => Response::ok(value),
            Err(e) => error_response(&e),
        }
    }
}

/// Status que representa `err` no fio.
pub fn status_of(err: &SquallError) -> Status {
    match err {
        SquallError::Store(StoreError::NoValue) => Status::NotFound,
        SquallError::Store(StoreError::BadArgument(_) | StoreError::Marshal(_))
        | SquallError::Command(_)
        | SquallError::Protocol(_) => Status::BadArgument,
        SquallError::Store(StoreError::TypeConflict { .. }) => Status::TypeConflict,
        SquallError::Store(StoreError::Canceled) => Status::Canceled,
        SquallError::Cluster(ClusterError::Unauthenticated) => Status::Unauthenticated,
        SquallError::Cluster(ClusterError::RoleMismatch { .. }) => Status::RoleMismatch,
        SquallError::Cluster(ClusterError::Remote { code, .. }) => Status::from_code(*code),
        _ => Status::Internal,
    }
}

pub fn error_response(err: &SquallError) -> Response {
    Response::error(status_of(err), err.to_string())
}

/// Converte uma resposta remota de volta em resultado local.
pub fn into_result(response: Response) -> SquallResult<String> {
    match response.status {
        Status::Ok => Ok(response.value),
        Status::NotFound => Err(StoreError::NoValue.into()),
        Status::BadArgument => Err(StoreError::BadArgument(response.value).into()),
        Status::Canceled => Err(StoreError::Canceled.into()),
        Status::Unauthenticated => Err(ClusterError::Unauthenticated.into()),
        status => Err(ClusterError::Remote {
            code: status.code(),
            message: response.value,
        }
        .into()),
    }
}

/// Resposta para um frame que nem chegou a virar requisição.
pub fn malformed_request(err: &CommandError) -> Response {
    Response::error(Status::BadArgument, err.to_string())
}
