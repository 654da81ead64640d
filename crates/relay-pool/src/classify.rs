use relay_common::{ErrorStrategyTable, Strategy};

/// Transport-level failure kinds, named the way the strategy table keys
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ReadError,
    ConnectError,
    ReadTimeout,
    Other,
}

impl TransportErrorKind {
    pub fn as_key(&self) -> &'static str {
        match self {
            TransportErrorKind::ReadError => "ReadError",
            TransportErrorKind::ConnectError => "ConnectError",
            TransportErrorKind::ReadTimeout => "ReadTimeout",
            TransportErrorKind::Other => "Other",
        }
    }
}

/// A non-success attempt result: an HTTP status line, or no status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HttpStatus(u16),
    Transport(TransportErrorKind),
}

/// Map an outcome to the retry strategy the orchestrator should run.
/// Lookup order: exact key, the table's `default`, then the hard-coded
/// fallback inside the table accessors.
pub fn classify(table: &ErrorStrategyTable, outcome: &Outcome) -> Strategy {
    match outcome {
        Outcome::HttpStatus(status) => table.for_status(*status),
        Outcome::Transport(kind) => table.for_transport(kind.as_key()),
    }
}
