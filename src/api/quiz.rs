//! Sorting hat HTTP surface: the quiz sheet and the scoring endpoint.

use std::collections::HashMap;

use axum::{routing::get, Form, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::config::{slider, QUIZ_QUESTION_COUNT};
use crate::error::AppError;
use crate::scorer::house_scorer::{SliderAxis, SLIDER_ONE, SLIDER_TWO};
use crate::scorer::{sort_form, QuizResult};
use crate::types::House;

pub fn router() -> Router {
    Router::new().route("/", get(get_sheet).post(post_answers))
}

#[derive(Debug, Serialize)]
pub struct SliderSheet {
    pub field: &'static str,
    pub high: House,
    pub low: House,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl From<SliderAxis> for SliderSheet {
    fn from(axis: SliderAxis) -> Self {
        Self {
            field: axis.field,
            high: axis.high,
            low: axis.low,
            min: slider::MIN,
            max: slider::MAX,
            default: slider::DEFAULT,
        }
    }
}

/// What a client needs to render the form.
#[derive(Debug, Serialize)]
pub struct QuizSheet {
    pub questions: Vec<String>,
    pub houses: [House; 4],
    pub sliders: [SliderSheet; 2],
}

pub fn sheet() -> QuizSheet {
    QuizSheet {
        questions: (1..=QUIZ_QUESTION_COUNT).map(|n| format!("q{n}")).collect(),
        houses: House::ALL,
        sliders: [SLIDER_ONE.into(), SLIDER_TWO.into()],
    }
}

async fn get_sheet() -> Json<QuizSheet> {
    Json(sheet())
}

async fn post_answers(Form(form): Form<HashMap<String, String>>) -> Result<Json<QuizResult>, AppError> {
    let result = sort_form(&form)?;
    info!(house = %result.house, "Sorted");
    Ok(Json(result))
}
