//! A deliberately trivial SQL "evaluator": first-keyword inspection plus
//! two canned query shapes. This is the conformance fixture's entire
//! notion of "executing" SQL — it exists to drive well-formed response
//! streams, not to answer real queries.

use bytes::BytesMut;

use crate::errors::sqlstate;
use crate::messages::backend::{self, FieldDescription};
use crate::session::{CancelFlag, Session};

/// The shape of a canned statement, decided once at `Parse`/`Query` time
/// and reused by `Describe`/`Bind`/`Execute` so the two sub-protocols
/// agree on what a statement returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `SELECT 1` and anything not otherwise recognized: one `int4`
    /// column, one row, value `1`.
    SelectOne,
    /// `SELECT $1::int`-style: one `int4` column whose value echoes the
    /// first bound parameter (or `1` with no parameters bound, e.g. a
    /// plain `Query` message).
    SelectEchoParam,
    /// `SELECT generate_series(a, b)`: one `int4` column, one row per
    /// integer in the (inclusive) range, cancellable between rows.
    GenerateSeries(i64, i64),
    /// `BEGIN`/`COMMIT`/`ROLLBACK`: no result set.
    Transaction(TransactionVerb),
    /// Anything the fixture doesn't recognize as one of the above:
    /// treated as a syntax error.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionVerb {
    Begin,
    Commit,
    Rollback,
}

/// Split a simple-query string on top-level `;` into its component
/// statements, per spec §4.3: "a multi-statement Query string produces
/// a `CommandComplete` per statement but only one `ReadyForQuery` at
/// the end." Empty segments (a trailing `;`, or `;;`) are dropped; none
/// of this fixture's canned shapes embed a semicolon inside a string
/// literal, so a plain split is exact.
pub fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Classify a SQL string by its first keyword, ignoring leading
/// whitespace and case, exactly as spec §4.2 prescribes.
pub fn classify(sql: &str) -> Shape {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Shape::Invalid;
    }
    let first_word: String = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    match first_word.as_str() {
        "BEGIN" => Shape::Transaction(TransactionVerb::Begin),
        "COMMIT" => Shape::Transaction(TransactionVerb::Commit),
        "ROLLBACK" => Shape::Transaction(TransactionVerb::Rollback),
        "SELECT" => classify_select(trimmed),
        _ => Shape::Invalid,
    }
}

fn classify_select(trimmed: &str) -> Shape {
    let lower = trimmed.to_ascii_lowercase();
    let rest = lower["select".len()..].trim();

    if let Some(args) = rest
        .strip_prefix("generate_series(")
        .and_then(|s| s.strip_suffix(')'))
    {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        if let [a, b] = parts[..] {
            if let (Ok(a), Ok(b)) = (a.parse::<i64>(), b.parse::<i64>()) {
                return Shape::GenerateSeries(a, b);
            }
        }
        return Shape::Invalid;
    }

    if rest.starts_with('$') {
        return Shape::SelectEchoParam;
    }

    if rest == "1" {
        return Shape::SelectOne;
    }

    // Anything else that at least parses as SELECT <something> is
    // treated as a caller-supplied no-op query: answer with the same
    // canned single row rather than rejecting it outright.
    Shape::SelectOne
}

/// Run a [`Shape`] to completion, appending its RowDescription (when the
/// caller asks for one), DataRow(s), and CommandComplete into `out`.
/// `echo_param` is the first bound parameter's text value, when one is
/// available (extended query only).
///
/// Returns `Err` with the SQLSTATE/message to report when cancellation
/// interrupts a `GenerateSeries` run, or when the shape is invalid.
pub fn run(
    shape: Shape,
    echo_param: Option<&str>,
    describe_row: bool,
    cancel: &CancelFlag,
    out: &mut BytesMut,
) -> Result<(), (&'static str, String)> {
    match shape {
        Shape::Invalid => Err((sqlstate::SYNTAX_ERROR, "syntax error".to_string())),
        Shape::Transaction(_) => Ok(()), // handled by the caller: no result set
        Shape::SelectOne => {
            if describe_row {
                out.extend_from_slice(&backend::row_description(&[FieldDescription::int4(
                    "?column?",
                )]));
            }
            out.extend_from_slice(&backend::data_row(&[Some("1")]));
            out.extend_from_slice(&backend::command_complete("SELECT 1"));
            Ok(())
        }
        Shape::SelectEchoParam => {
            let value = echo_param.unwrap_or("1").to_string();
            if describe_row {
                out.extend_from_slice(&backend::row_description(&[FieldDescription::int4(
                    "?column?",
                )]));
            }
            out.extend_from_slice(&backend::data_row(&[Some(&value)]));
            out.extend_from_slice(&backend::command_complete("SELECT 1"));
            Ok(())
        }
        Shape::GenerateSeries(a, b) => {
            if describe_row {
                out.extend_from_slice(&backend::row_description(&[FieldDescription::int4(
                    "generate_series",
                )]));
            }
            let mut count = 0i64;
            let mut i = a;
            while i <= b {
                if cancel.is_set() {
                    return Err((sqlstate::QUERY_CANCELED, "canceling statement".to_string()));
                }
                let text = i.to_string();
                out.extend_from_slice(&backend::data_row(&[Some(&text)]));
                count += 1;
                i += 1;
            }
            out.extend_from_slice(&backend::command_complete(&format!("SELECT {count}")));
            Ok(())
        }
    }
}

/// Whether this shape produces a result set at all (used by `Describe`
/// to decide between `RowDescription`/`NoData`).
pub fn returns_rows(shape: Shape) -> bool {
    matches!(
        shape,
        Shape::SelectOne | Shape::SelectEchoParam | Shape::GenerateSeries(_, _)
    )
}

/// Apply a transaction verb to `session`'s `txn_status`, downgrading a
/// `COMMIT` issued in a failed transaction to an effective `ROLLBACK`
/// exactly as spec §8 scenario 4 requires, and return the command tag
/// that should accompany it.
pub fn apply_transaction(session: &mut Session, verb: TransactionVerb) -> &'static str {
    use crate::session::TxnStatus;

    match verb {
        TransactionVerb::Begin => {
            session.begin_transaction();
            "BEGIN"
        }
        TransactionVerb::Commit => {
            let downgraded = session.txn_status == TxnStatus::Failed;
            session.end_transaction();
            if downgraded {
                "ROLLBACK"
            } else {
                "COMMIT"
            }
        }
        TransactionVerb::Rollback => {
            session.end_transaction();
            "ROLLBACK"
        }
    }
}
