pub type CombatantId = u64;

/// Prefix shared by every combatant health record in the store.
pub const COWBOY_KEY_PREFIX: &str = "cowboy-";

/// One participant as loaded from the roster. `health` here is only the
/// initial value; the live value is owned by the store.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Combatant {
    pub name: String,
    pub health: u64,
    pub damage: u64,
}

/// `cowboy-<id>`
pub fn cowboy_key(id: CombatantId) -> String {
    format!("{COWBOY_KEY_PREFIX}{id}")
}

/// Inverse of [`cowboy_key`]. `None` for keys outside the prefix or with a
/// non-numeric suffix.
pub fn parse_cowboy_key(key: &str) -> Option<CombatantId> {
    key.strip_prefix(COWBOY_KEY_PREFIX)?.parse().ok()
}

/// Store values are compared as raw bytes, so a positive decimal health
/// (no leading zeros) always sorts above `"0"`.
pub fn is_alive_value(value: &str) -> bool {
    value > "0"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    Less,
}

/// A transaction precondition on the current value of `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compare {
    pub key: String,
    pub op: CompareOp,
    pub value: String,
}

impl Compare {
    pub fn new(key: impl Into<String>, op: CompareOp, value: impl Into<String>) -> Self {
        Compare { key: key.into(), op, value: value.into() }
    }

    /// Evaluate against the stored value. Absent keys never satisfy a
    /// comparison.
    pub fn holds(&self, current: Option<&str>) -> bool {
        let Some(current) = current else {
            return false;
        };
        let lhs = current.as_bytes();
        let rhs = self.value.as_bytes();
        match self.op {
            CompareOp::Equal => lhs == rhs,
            CompareOp::NotEqual => lhs != rhs,
            CompareOp::Greater => lhs > rhs,
            CompareOp::Less => lhs < rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: String },
}

impl TxnOp {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        TxnOp::Put { key: key.into(), value: value.into() }
    }
}

/// Conditional multi-write: every op in `then` applies iff every compare in
/// `when` holds at commit time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Txn {
    pub when: Vec<Compare>,
    pub then: Vec<TxnOp>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, compares: impl IntoIterator<Item = Compare>) -> Self {
        self.when.extend(compares);
        self
    }

    pub fn then(mut self, ops: impl IntoIterator<Item = TxnOp>) -> Self {
        self.then.extend(ops);
        self
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    #[error("transaction unsuccessful")]
    TxnUnsuccessful,
    #[error("operation timed out")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cowboy_key_round_trip() {
        assert_eq!(cowboy_key(12), "cowboy-12");
        assert_eq!(parse_cowboy_key("cowboy-12"), Some(12));
        assert_eq!(parse_cowboy_key("cowboy-x"), None);
        assert_eq!(parse_cowboy_key("horse-1"), None);
    }

    #[test]
    fn alive_uses_byte_order() {
        assert!(is_alive_value("1"));
        assert!(is_alive_value("10"));
        assert!(is_alive_value("9000"));
        assert!(!is_alive_value("0"));
        assert!(!is_alive_value(""));
    }

    #[test]
    fn compare_on_missing_key_is_false() {
        let cmp = Compare::new("cowboy-1", CompareOp::NotEqual, "0");
        assert!(!cmp.holds(None));
        assert!(cmp.holds(Some("5")));
    }

    #[test]
    fn compare_operators() {
        assert!(Compare::new("k", CompareOp::Greater, "0").holds(Some("20")));
        assert!(!Compare::new("k", CompareOp::Greater, "0").holds(Some("0")));
        assert!(Compare::new("k", CompareOp::Less, "5").holds(Some("10")));
        assert!(Compare::new("k", CompareOp::Equal, "7").holds(Some("7")));
    }
}
