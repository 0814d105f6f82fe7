//! Default handler implementations: a trivial but conformance-correct
//! simple-query and extended-query engine, installed on the
//! [`crate::dispatcher::Dispatcher`] unless the caller supplies its own.

pub mod canned;

use bytes::BytesMut;

use crate::dispatcher::handlers::{HandlerOutcome, MessageHandlers};
use crate::messages::backend::{self, FieldDescription};
use crate::messages::frontend;
use crate::session::{PreparedStatement, Portal, Session};

use canned::Shape;

/// Stateless: every fact a default handler needs (the SQL text of a
/// prepared statement, the bound parameters of a portal) already lives
/// in the [`Session`] it is called with.
#[derive(Default)]
pub struct DefaultHandlers;

impl DefaultHandlers {
    pub fn new() -> Self {
        DefaultHandlers
    }
}

impl MessageHandlers for DefaultHandlers {
    fn on_query(
        &mut self,
        session: &mut Session,
        query: frontend::Query,
        out: &mut BytesMut,
    ) -> HandlerOutcome {
        if query.sql.trim().is_empty() {
            out.extend_from_slice(&backend::empty_query_response());
            return HandlerOutcome::Ok;
        }

        // A multi-statement Query string gets one CommandComplete per
        // statement; the dispatcher appends a single trailing
        // ReadyForQuery once this call returns (spec §4.3).
        for stmt_sql in canned::split_statements(&query.sql) {
            let shape = canned::classify(stmt_sql);

            if let Shape::Transaction(verb) = shape {
                let tag = canned::apply_transaction(session, verb);
                out.extend_from_slice(&backend::command_complete(tag));
                continue;
            }

            match canned::run(shape, None, true, &session.cancel, out) {
                Ok(()) => {}
                Err((sqlstate, message)) => {
                    session.fail_transaction();
                    return HandlerOutcome::ProtocolError { sqlstate, message };
                }
            }
        }
        HandlerOutcome::Ok
    }

    fn on_parse(
        &mut self,
        session: &mut Session,
        parse: frontend::Parse,
        out: &mut BytesMut,
    ) -> HandlerOutcome {
        if matches!(canned::classify(&parse.sql), Shape::Invalid) {
            return HandlerOutcome::ProtocolError {
                sqlstate: crate::errors::sqlstate::SYNTAX_ERROR,
                message: "syntax error".to_string(),
            };
        }

        if parse.statement.is_empty() {
            session.drop_unnamed_statement();
        }
        session.statements.insert(
            parse.statement.clone(),
            PreparedStatement {
                sql: parse.sql,
                param_type_oids: parse.param_type_oids,
            },
        );
        out.extend_from_slice(&backend::parse_complete());
        HandlerOutcome::Ok
    }

    fn on_bind(
        &mut self,
        session: &mut Session,
        bind: frontend::Bind,
        out: &mut BytesMut,
    ) -> HandlerOutcome {
        if !session.statements.contains_key(&bind.statement) {
            return HandlerOutcome::ProtocolError {
                sqlstate: crate::errors::sqlstate::INTERNAL_ERROR,
                message: format!("prepared statement \"{}\" does not exist", bind.statement),
            };
        }

        if bind.portal.is_empty() {
            session.drop_unnamed_portal();
        }
        session.portals.insert(
            bind.portal.clone(),
            Portal {
                statement: bind.statement,
                param_values: bind.params,
                param_format_codes: bind.param_format_codes,
                result_format_codes: bind.result_format_codes,
            },
        );
        out.extend_from_slice(&backend::bind_complete());
        HandlerOutcome::Ok
    }

    fn on_describe(
        &mut self,
        session: &mut Session,
        describe: frontend::Describe,
        out: &mut BytesMut,
    ) -> HandlerOutcome {
        let sql = match describe.target {
            frontend::DescribeTarget::Statement => session
                .statements
                .get(&describe.name)
                .map(|s| s.sql.clone()),
            frontend::DescribeTarget::Portal => session
                .portals
                .get(&describe.name)
                .and_then(|p| session.statements.get(&p.statement))
                .map(|s| s.sql.clone()),
        };

        let Some(sql) = sql else {
            return HandlerOutcome::ProtocolError {
                sqlstate: crate::errors::sqlstate::INTERNAL_ERROR,
                message: "unknown statement or portal".to_string(),
            };
        };

        if describe.target == frontend::DescribeTarget::Statement {
            let stmt = session.statements.get(&describe.name).unwrap();
            out.extend_from_slice(&backend::parameter_description(&stmt.param_type_oids));
        }

        let shape = canned::classify(&sql);
        if canned::returns_rows(shape) {
            let name = match shape {
                Shape::GenerateSeries(_, _) => "generate_series",
                _ => "?column?",
            };
            out.extend_from_slice(&backend::row_description(&[FieldDescription::int4(name)]));
        } else {
            out.extend_from_slice(&backend::no_data());
        }
        HandlerOutcome::Ok
    }

    fn on_execute(
        &mut self,
        session: &mut Session,
        execute: frontend::Execute,
        out: &mut BytesMut,
    ) -> HandlerOutcome {
        let Some(portal) = session.portals.get(&execute.portal).cloned() else {
            return HandlerOutcome::ProtocolError {
                sqlstate: crate::errors::sqlstate::INTERNAL_ERROR,
                message: format!("portal \"{}\" does not exist", execute.portal),
            };
        };
        let Some(stmt) = session.statements.get(&portal.statement).cloned() else {
            return HandlerOutcome::ProtocolError {
                sqlstate: crate::errors::sqlstate::INTERNAL_ERROR,
                message: "bound statement no longer exists".to_string(),
            };
        };

        let shape = canned::classify(&stmt.sql);
        if let Shape::Transaction(verb) = shape {
            let tag = canned::apply_transaction(session, verb);
            out.extend_from_slice(&backend::command_complete(tag));
            return HandlerOutcome::Ok;
        }

        let echo_param = portal
            .param_values
            .first()
            .and_then(|v| v.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

        match canned::run(shape, echo_param.as_deref(), false, &session.cancel, out) {
            Ok(()) => HandlerOutcome::Ok,
            Err((sqlstate, message)) => {
                session.fail_transaction();
                HandlerOutcome::ProtocolError { sqlstate, message }
            }
        }
    }

    fn on_close(
        &mut self,
        session: &mut Session,
        close: frontend::Close,
        out: &mut BytesMut,
    ) -> HandlerOutcome {
        match close.target {
            frontend::DescribeTarget::Statement => {
                session.statements.remove(&close.name);
            }
            frontend::DescribeTarget::Portal => {
                session.portals.remove(&close.name);
            }
        }
        out.extend_from_slice(&backend::close_complete());
        HandlerOutcome::Ok
    }
}
