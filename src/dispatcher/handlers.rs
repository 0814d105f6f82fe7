//! The handler interface. Default implementations live in
//! [`crate::handlers::DefaultHandlers`]; anything implementing this trait
//! can be installed on a [`super::Dispatcher`] instead.
//!
//! This replaces the original server's function-pointer callback table:
//! one method per recognized message type, called by the dispatch loop
//! with the session state and the already-parsed payload, writing its
//! response directly into the supplied output buffer.

use bytes::BytesMut;

use crate::messages::frontend;
use crate::session::Session;

/// What a handler call did, as far as the dispatch loop is concerned.
pub enum HandlerOutcome {
    /// The handler wrote whatever response messages it needed to `out`.
    Ok,
    /// The handler wants an `ErrorResponse` with this SQLSTATE/message
    /// emitted on its behalf; the dispatcher handles batch-failure
    /// bookkeeping (spec §4.3's sticky `batch_failed` flag).
    ProtocolError { sqlstate: &'static str, message: String },
    /// Unrecoverable; the dispatch loop closes the connection after
    /// best-effort notification.
    Fatal(crate::errors::Error),
}

/// Plug-in handlers for the message types whose *content* (not framing)
/// is the core's business to interpret: the query and extended-query
/// sub-protocols, and authentication.
pub trait MessageHandlers: Send {
    /// Simple-query (`Query`, tag `Q`). Writes zero or more
    /// `RowDescription`/`DataRow`/`CommandComplete` (or
    /// `EmptyQueryResponse`) messages; the dispatcher appends
    /// `ReadyForQuery` itself.
    fn on_query(&mut self, session: &mut Session, query: frontend::Query, out: &mut BytesMut)
        -> HandlerOutcome;

    fn on_parse(&mut self, session: &mut Session, parse: frontend::Parse, out: &mut BytesMut)
        -> HandlerOutcome;

    fn on_bind(&mut self, session: &mut Session, bind: frontend::Bind, out: &mut BytesMut)
        -> HandlerOutcome;

    fn on_describe(
        &mut self,
        session: &mut Session,
        describe: frontend::Describe,
        out: &mut BytesMut,
    ) -> HandlerOutcome;

    fn on_execute(&mut self, session: &mut Session, execute: frontend::Execute, out: &mut BytesMut)
        -> HandlerOutcome;

    fn on_close(&mut self, session: &mut Session, close: frontend::Close, out: &mut BytesMut)
        -> HandlerOutcome;
}
