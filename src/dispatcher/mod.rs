//! The dispatcher: the per-connection event loop and the routing table
//! that turns typed messages into handler calls (spec §4.3).

pub mod handlers;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::auth::{self, AuthMethod};
use crate::errors::{sqlstate, Error, ProtocolError};
use crate::messages::constants::{frontend as tag, startup_code};
use crate::messages::{backend, codec, frontend};
use crate::registry::{Registry, RegistryGuard};
use crate::session::{BackendKey, CancelFlag, Session, State};

use handlers::{HandlerOutcome, MessageHandlers};

/// The ambient parameters the dispatcher needs that are not part of a
/// `Session`'s own state: framing limits, the auth policy, and the
/// `ParameterStatus` values advertised after a successful startup
/// (spec §6's minimum set).
#[derive(Clone)]
pub struct DispatcherConfig {
    pub message_size_limit: usize,
    pub auth_method: AuthMethod,
    pub auth_password: Option<String>,
    pub server_parameters: Vec<(String, String)>,
    /// Inactivity timeout applied around every read; `None` disables it
    /// (spec §5 "Timeouts": no per-message deadline, only inactivity).
    pub idle_timeout: Option<std::time::Duration>,
}

pub struct Dispatcher<H: MessageHandlers> {
    handlers: H,
    config: DispatcherConfig,
}

/// Why a connection's dispatch loop returned.
pub enum Ended {
    /// `Terminate`, peer close after a clean `Ready`/`InBatch` state, or
    /// the cancel flow (no response was or needed to be sent).
    Closed,
    /// The global shutdown flag was observed; an `admin_shutdown` error
    /// was sent before closing.
    ShutDown,
}

impl<H: MessageHandlers> Dispatcher<H> {
    pub fn new(handlers: H, config: DispatcherConfig) -> Self {
        Dispatcher { handlers, config }
    }

    /// Drive one accepted connection to completion.
    ///
    /// `registry` and `key` let the dispatcher register the session once
    /// (and only once) it reaches `Ready`, and `shutdown` is polled at
    /// every read boundary so an admin shutdown can close the socket with
    /// a `57P01` `ErrorResponse` (spec §5 "Internal" cancellation).
    pub async fn run<S>(
        &mut self,
        stream: &mut S,
        registry: std::sync::Arc<Registry>,
        key: BackendKey,
        shutdown: &CancelFlag,
    ) -> Result<Ended, Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = Session::new(key);
        let mut guard = RegistryGuard::new(registry.clone(), key);

        let mut out = BytesMut::new();

        loop {
            if shutdown.is_set() {
                out.clear();
                out.extend_from_slice(&backend::simple_error(
                    "FATAL",
                    sqlstate::ADMIN_SHUTDOWN,
                    "terminating connection due to administrator command",
                ));
                let _ = codec::write(stream, &out).await;
                return Ok(Ended::ShutDown);
            }

            match session.state {
                State::AwaitingStartup => {
                    if !self
                        .handle_startup(stream, &mut session, &registry, &mut guard)
                        .await?
                    {
                        return Ok(Ended::Closed);
                    }
                }
                State::Terminated => return Ok(Ended::Closed),
                _ => {
                    let msg = match self.config.idle_timeout {
                        Some(timeout) => {
                            match tokio::time::timeout(
                                timeout,
                                codec::read_typed(stream, self.config.message_size_limit),
                            )
                            .await
                            {
                                Ok(result) => result?,
                                Err(_) => return Ok(Ended::Closed),
                            }
                        }
                        None => codec::read_typed(stream, self.config.message_size_limit).await?,
                    };
                    out.clear();
                    let should_close = self.process_typed(&mut session, msg, &mut out)?;
                    if !out.is_empty() {
                        codec::write(stream, &out).await?;
                    }
                    if should_close {
                        return Ok(Ended::Closed);
                    }
                }
            }
        }
    }

    /// Handle the `AwaitingStartup` state: read one untyped frame and
    /// either complete the startup handshake, decline SSL/GSSENC and
    /// stay put, service a `CancelRequest`, or fail. Returns `false` when
    /// the connection should close without further reads.
    async fn handle_startup<S>(
        &mut self,
        stream: &mut S,
        session: &mut Session,
        registry: &Registry,
        guard: &mut RegistryGuard,
    ) -> Result<bool, Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut header = match self.config.idle_timeout {
            Some(timeout) => {
                match tokio::time::timeout(
                    timeout,
                    codec::read_untyped(stream, self.config.message_size_limit),
                )
                .await
                {
                    Ok(result) => result?,
                    Err(_) => return Ok(false),
                }
            }
            None => codec::read_untyped(stream, self.config.message_size_limit).await?,
        };
        if header.len() < 4 {
            return Err(ProtocolError::MalformedPayload("short startup frame".into()).into());
        }
        let code = {
            use bytes::Buf;
            header.get_i32()
        };

        match code {
            startup_code::PROTOCOL_V3 => {
                let params = frontend::StartupParams::parse(header)?;
                session.user = params.user()?.to_string();
                session.database = params.database().to_string();
                session.state = crate::session::State::Negotiating;

                let auth_result = auth::authenticate(
                    stream,
                    self.config.auth_method,
                    &session.user,
                    self.config.auth_password.as_deref(),
                )
                .await;

                match auth_result {
                    Ok(()) => {
                        let mut reply = BytesMut::new();
                        reply.extend_from_slice(&backend::authentication_ok());
                        for (name, value) in &self.config.server_parameters {
                            reply.extend_from_slice(&backend::parameter_status(name, value));
                        }
                        reply.extend_from_slice(&backend::backend_key_data(
                            session.key.backend_pid,
                            session.key.secret_key,
                        ));
                        reply.extend_from_slice(&backend::ready_for_query(
                            crate::session::TxnStatus::Idle.as_byte(),
                        ));
                        codec::write(stream, &reply).await?;

                        session.state = crate::session::State::Ready;
                        registry.insert(session.key, session.cancel.clone());
                        guard.arm();
                        Ok(true)
                    }
                    Err(Error::Auth(auth_err)) => {
                        let (sqlstate, message) = match &auth_err {
                            crate::errors::AuthError::WrongPassword(user) => (
                                sqlstate::INVALID_PASSWORD,
                                format!("password authentication failed for user \"{user}\""),
                            ),
                            crate::errors::AuthError::UnsupportedMethod => (
                                sqlstate::INVALID_PASSWORD,
                                "unsupported authentication method".to_string(),
                            ),
                        };
                        let reply = backend::simple_error("FATAL", sqlstate, &message);
                        let _ = codec::write(stream, &reply).await;
                        session.state = crate::session::State::Terminated;
                        Ok(false)
                    }
                    Err(other) => Err(other),
                }
            }
            startup_code::SSL_REQUEST | startup_code::GSSENC_REQUEST => {
                codec::write(stream, b"N").await?;
                Ok(true)
            }
            startup_code::CANCEL_REQUEST => {
                if let Ok(cancel) = frontend::CancelRequest::parse(header) {
                    registry.request_cancel(BackendKey {
                        backend_pid: cancel.backend_pid,
                        secret_key: cancel.secret_key,
                    });
                }
                session.state = crate::session::State::Terminated;
                Ok(false)
            }
            other => Err(ProtocolError::UnexpectedStartupCode(other).into()),
        }
    }

    /// Process one already-read typed message and append the response
    /// into `out`. Returns whether the connection should close.
    fn process_typed(
        &mut self,
        session: &mut Session,
        msg: crate::messages::TypedMessage,
        out: &mut BytesMut,
    ) -> Result<bool, Error> {
        let is_extended = matches!(
            msg.tag,
            tag::PARSE | tag::BIND | tag::DESCRIBE | tag::EXECUTE | tag::CLOSE
        );
        let is_copy = matches!(
            msg.tag,
            tag::COPY_DATA | tag::COPY_DONE | tag::COPY_FAIL
        );
        let accepted = match session.state {
            State::Ready => {
                is_extended
                    || is_copy
                    || matches!(
                        msg.tag,
                        tag::QUERY | tag::SYNC | tag::FLUSH | tag::TERMINATE
                    )
            }
            State::InBatch => {
                is_extended
                    || is_copy
                    || matches!(msg.tag, tag::SYNC | tag::FLUSH | tag::TERMINATE)
            }
            _ => false,
        };

        if !accepted {
            session.force_fail();
            out.extend_from_slice(&backend::simple_error(
                "ERROR",
                sqlstate::PROTOCOL_VIOLATION,
                &format!("unexpected message type {:?}", msg.tag as char),
            ));
            out.extend_from_slice(&backend::ready_for_query(session.txn_status.as_byte()));
            session.batch_failed = false;
            session.state = State::Ready;
            return Ok(false);
        }

        match msg.tag {
            tag::TERMINATE => Ok(true),
            tag::QUERY => {
                let query = frontend::Query::parse(msg.payload)?;
                match self.handlers.on_query(session, query, out) {
                    HandlerOutcome::Ok => {}
                    HandlerOutcome::ProtocolError { sqlstate, message } => {
                        out.extend_from_slice(&backend::simple_error("ERROR", sqlstate, &message));
                    }
                    HandlerOutcome::Fatal(e) => return Err(e),
                }
                out.extend_from_slice(&backend::ready_for_query(session.txn_status.as_byte()));
                Ok(false)
            }
            tag::SYNC => {
                session.reset_on_sync();
                out.extend_from_slice(&backend::ready_for_query(session.txn_status.as_byte()));
                Ok(false)
            }
            tag::FLUSH => {
                trace!("Flush: no buffered messages to force out beyond this call");
                Ok(false)
            }
            tag::COPY_DATA | tag::COPY_DONE | tag::COPY_FAIL => {
                // Accepted but not implemented (spec §1/§6): the COPY
                // sub-protocol is an explicit Non-goal, so these are a
                // silent no-op rather than a protocol violation.
                trace!("{:?}: COPY sub-protocol not implemented, ignoring", msg.tag as char);
                Ok(false)
            }
            _ => {
                if session.state == State::Ready {
                    session.enter_batch();
                }
                if session.batch_failed {
                    debug!("batch already failed; ignoring message until Sync");
                    return Ok(false);
                }
                let outcome = match msg.tag {
                    tag::PARSE => {
                        let parse = frontend::Parse::parse(msg.payload)?;
                        self.handlers.on_parse(session, parse, out)
                    }
                    tag::BIND => {
                        let bind = frontend::Bind::parse(msg.payload)?;
                        self.handlers.on_bind(session, bind, out)
                    }
                    tag::DESCRIBE => {
                        let describe = frontend::Describe::parse(msg.payload)?;
                        self.handlers.on_describe(session, describe, out)
                    }
                    tag::EXECUTE => {
                        let execute = frontend::Execute::parse(msg.payload)?;
                        self.handlers.on_execute(session, execute, out)
                    }
                    tag::CLOSE => {
                        let close = frontend::Close::parse(msg.payload)?;
                        self.handlers.on_close(session, close, out)
                    }
                    other => {
                        return Err(ProtocolError::UnexpectedMessage(Some(other)).into());
                    }
                };
                match outcome {
                    HandlerOutcome::Ok => Ok(false),
                    HandlerOutcome::ProtocolError { sqlstate, message } => {
                        session.batch_failed = true;
                        out.extend_from_slice(&backend::simple_error("ERROR", sqlstate, &message));
                        Ok(false)
                    }
                    HandlerOutcome::Fatal(e) => Err(e),
                }
            }
        }
    }
}
