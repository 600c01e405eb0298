pub mod house_scorer;

pub use house_scorer::{score, sort_form, HouseScores, Outcome, QuizAnswers, QuizResult};
