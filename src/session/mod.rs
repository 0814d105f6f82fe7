//! Per-connection session state.
//!
//! A `Session` never touches a socket. It holds identity, transaction and
//! authentication state, and the prepared-statement/portal maps, and
//! exposes transition methods the dispatcher calls as it processes each
//! message. Keeping I/O out of this module is what lets the dispatcher's
//! event loop and the wire-level tests stay independent of each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;

use crate::messages::constants::txn_status;

/// The session's position in the startup/auth/query state machine
/// (spec §4.2's table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingStartup,
    Negotiating,
    AwaitingPassword,
    Ready,
    InBatch,
    Terminated,
}

/// Transaction status reported inside every `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Idle,
    InTransaction,
    Failed,
}

impl TxnStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            TxnStatus::Idle => txn_status::IDLE,
            TxnStatus::InTransaction => txn_status::IN_TRANSACTION,
            TxnStatus::Failed => txn_status::FAILED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub sql: String,
    pub param_type_oids: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct Portal {
    pub statement: String,
    pub param_values: Vec<Option<Vec<u8>>>,
    pub param_format_codes: Vec<i16>,
    pub result_format_codes: Vec<i16>,
}

/// A process-wide unique `(backend_pid, secret_key)` pair, handed out at
/// accept time and consulted only by the cancel flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendKey {
    pub backend_pid: i32,
    pub secret_key: i32,
}

/// Cooperative cancellation: set by a `CancelRequest` on a different
/// connection, polled by this session's handlers between row emissions.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Session {
    pub state: State,
    pub user: String,
    pub database: String,
    pub client_encoding: String,
    pub txn_status: TxnStatus,
    pub key: BackendKey,
    pub statements: AHashMap<String, PreparedStatement>,
    pub portals: AHashMap<String, Portal>,
    /// Set once the dispatcher has committed to the extended-query batch
    /// failing; reset at the next `Sync`.
    pub batch_failed: bool,
    pub cancel: CancelFlag,
}

impl Session {
    pub fn new(key: BackendKey) -> Self {
        Session {
            state: State::AwaitingStartup,
            user: String::new(),
            database: String::new(),
            client_encoding: "UTF8".to_string(),
            txn_status: TxnStatus::Idle,
            key,
            statements: AHashMap::new(),
            portals: AHashMap::new(),
            batch_failed: false,
            cancel: CancelFlag::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(
            self.state,
            State::AwaitingStartup | State::Negotiating | State::AwaitingPassword
        )
    }

    /// Drop the unnamed portal and statement the way `Sync` and fresh
    /// `Parse`/`Bind` calls do — named entries persist until an explicit
    /// `Close` or session end.
    pub fn drop_unnamed_portal(&mut self) {
        self.portals.remove("");
    }

    pub fn drop_unnamed_statement(&mut self) {
        self.statements.remove("");
    }

    /// Called by the dispatcher on `Sync`: resets batch state and returns
    /// to `Ready` regardless of the state the batch left the session in.
    pub fn reset_on_sync(&mut self) {
        self.batch_failed = false;
        self.drop_unnamed_portal();
        self.state = State::Ready;
    }

    pub fn enter_batch(&mut self) {
        if self.state == State::Ready {
            self.state = State::InBatch;
        }
    }

    pub fn begin_transaction(&mut self) {
        self.txn_status = TxnStatus::InTransaction;
    }

    pub fn end_transaction(&mut self) {
        self.txn_status = TxnStatus::Idle;
    }

    pub fn fail_transaction(&mut self) {
        if self.txn_status == TxnStatus::InTransaction {
            self.txn_status = TxnStatus::Failed;
        }
    }

    /// Unconditionally marks the transaction failed, used for the
    /// protocol-violation path (spec §4.2) where the `ReadyForQuery`
    /// that follows an unexpected message always reports `E`.
    pub fn force_fail(&mut self) {
        self.txn_status = TxnStatus::Failed;
    }
}
