use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Houses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum House {
    Gryffindor,
    Hufflepuff,
    Ravenclaw,
    Slytherin,
}

impl House {
    /// Declaration order. Tie results are always listed in this order.
    pub const ALL: [House; 4] = [
        House::Gryffindor,
        House::Hufflepuff,
        House::Ravenclaw,
        House::Slytherin,
    ];

    pub fn index(self) -> usize {
        match self {
            House::Gryffindor => 0,
            House::Hufflepuff => 1,
            House::Ravenclaw => 2,
            House::Slytherin => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            House::Gryffindor => "Gryffindor",
            House::Hufflepuff => "Hufflepuff",
            House::Ravenclaw => "Ravenclaw",
            House::Slytherin => "Slytherin",
        }
    }

    /// Case-insensitive match on the house name. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Option<House> {
        let raw = raw.trim();
        House::ALL
            .into_iter()
            .find(|h| h.name().eq_ignore_ascii_case(raw))
    }
}

impl std::fmt::Display for House {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One row of the append-only ledger. `shares` is signed: positive for a buy,
/// negative for a sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    /// Nanosecond UTC epoch timestamp.
    pub timestamp: i64,
}

/// A ledger row that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: i64,
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
}

impl NewTransaction {
    /// Cash moves opposite to shares: a buy debits, a sell credits.
    pub fn cash_delta(&self) -> f64 {
        -(self.shares as f64) * self.price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub cash: f64,
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
}

/// Trim and upper-case a ticker symbol. Returns None for blank input.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_ascii_uppercase())
    }
}
