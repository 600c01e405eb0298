pub mod holdings;
pub mod leaderboard;
pub mod trade;
pub mod valuation;

pub use holdings::Position;
pub use leaderboard::LeaderboardEntry;
pub use valuation::{PortfolioRow, PortfolioView};
