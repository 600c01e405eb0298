use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{slider, QUIZ_QUESTION_COUNT};
use crate::error::{AppError, Result};
use crate::types::House;

/// Slider 1 splits a point between Gryffindor (high end) and Slytherin (low end).
pub const SLIDER_ONE: SliderAxis = SliderAxis {
    field: "q14",
    high: House::Gryffindor,
    low: House::Slytherin,
};

/// Slider 2 splits a point between Hufflepuff (high end) and Ravenclaw (low end).
pub const SLIDER_TWO: SliderAxis = SliderAxis {
    field: "q15",
    high: House::Hufflepuff,
    low: House::Ravenclaw,
};

#[derive(Debug, Clone, Copy)]
pub struct SliderAxis {
    pub field: &'static str,
    pub high: House,
    pub low: House,
}

// ---------------------------------------------------------------------------
// Answers
// ---------------------------------------------------------------------------

/// Parsed quiz form. Categorical answers that did not name a house are already
/// dropped; sliders are validated and clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizAnswers {
    pub name: Option<String>,
    pub houses: Vec<House>,
    pub slider_one: f64,
    pub slider_two: f64,
}

impl QuizAnswers {
    /// Read `name`, `q1`..`q13`, `q14`, `q15` out of a submitted form.
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self> {
        let mut houses = Vec::with_capacity(QUIZ_QUESTION_COUNT);
        for n in 1..=QUIZ_QUESTION_COUNT {
            let field = format!("q{n}");
            let Some(raw) = form.get(&field).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
                continue;
            };
            match House::parse(raw) {
                Some(house) => houses.push(house),
                None => warn!(field = %field, answer = %raw, "Ignoring answer that names no house"),
            }
        }

        Ok(Self {
            name: form
                .get("name")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            houses,
            slider_one: parse_slider(SLIDER_ONE.field, form.get(SLIDER_ONE.field).map(String::as_str))?,
            slider_two: parse_slider(SLIDER_TWO.field, form.get(SLIDER_TWO.field).map(String::as_str))?,
        })
    }
}

/// Missing or blank → default. Anything that is not a finite number is a
/// validation error naming the field. Values outside 1..=10 are clamped.
pub fn parse_slider(field: &str, raw: Option<&str>) -> Result<f64> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(slider::DEFAULT);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| AppError::validation(field, format!("expected a number, got {raw:?}")))?;
    if !value.is_finite() {
        return Err(AppError::validation(field, format!("expected a finite number, got {raw:?}")));
    }
    Ok(value.clamp(slider::MIN, slider::MAX))
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HouseScores {
    counts: [u32; 4],
}

impl HouseScores {
    pub fn get(&self, house: House) -> u32 {
        self.counts[house.index()]
    }

    pub fn add(&mut self, house: House, points: u32) {
        self.counts[house.index()] += points;
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Every house sharing the top score, in declaration order.
    pub fn leaders(&self) -> Vec<House> {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        House::ALL
            .into_iter()
            .filter(|h| self.get(*h) == max)
            .collect()
    }

    pub fn outcome(&self) -> Outcome {
        let mut leaders = self.leaders();
        if leaders.len() == 1 {
            Outcome::Winner(leaders.remove(0))
        } else {
            Outcome::Tie(leaders)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Winner(House),
    /// Two or more houses share the top score, listed in declaration order.
    Tie(Vec<House>),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Winner(h) => write!(f, "{h}"),
            Outcome::Tie(houses) => {
                let names: Vec<&str> = houses.iter().map(|h| h.name()).collect();
                write!(f, "{}", names.join(" or "))
            }
        }
    }
}

/// Position of a raw 1–10 slider value on the unit interval.
pub fn normalize_slider(value: f64) -> f64 {
    (value - slider::MIN) / (slider::MAX - slider::MIN)
}

/// Split one slider between its two houses: `round(n)` to the high house,
/// `round(1 - n)` to the low one, rounding half to even.
pub fn split_slider(axis: SliderAxis, value: f64) -> [(House, u32); 2] {
    let n = normalize_slider(value);
    [
        (axis.high, n.round_ties_even() as u32),
        (axis.low, (1.0 - n).round_ties_even() as u32),
    ]
}

/// Score a parsed quiz. Pure: every call starts from zeroed counters.
pub fn score(answers: &QuizAnswers) -> HouseScores {
    let mut scores = HouseScores::default();

    for house in &answers.houses {
        scores.add(*house, 1);
    }

    for (axis, value) in [(SLIDER_ONE, answers.slider_one), (SLIDER_TWO, answers.slider_two)] {
        for (house, points) in split_slider(axis, value) {
            scores.add(house, points);
        }
    }

    debug!(
        gryffindor = scores.get(House::Gryffindor),
        hufflepuff = scores.get(House::Hufflepuff),
        ravenclaw = scores.get(House::Ravenclaw),
        slytherin = scores.get(House::Slytherin),
        "Quiz scored"
    );
    scores
}

// ---------------------------------------------------------------------------
// Result view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizResult {
    pub name: Option<String>,
    pub house: String,
    pub gryffindor: u32,
    pub hufflepuff: u32,
    pub ravenclaw: u32,
    pub slytherin: u32,
}

impl QuizResult {
    pub fn new(name: Option<String>, scores: &HouseScores) -> Self {
        Self {
            name,
            house: scores.outcome().to_string(),
            gryffindor: scores.get(House::Gryffindor),
            hufflepuff: scores.get(House::Hufflepuff),
            ravenclaw: scores.get(House::Ravenclaw),
            slytherin: scores.get(House::Slytherin),
        }
    }
}

/// Parse, score and label a submitted form in one step.
pub fn sort_form(form: &HashMap<String, String>) -> Result<QuizResult> {
    let answers = QuizAnswers::from_form(form)?;
    let scores = score(&answers);
    Ok(QuizResult::new(answers.name, &scores))
}
