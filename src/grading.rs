use crate::models::{GradeResult, LetterGrade};

/// Score breakpoints, checked top-down; the first `score >= floor` wins.
/// Anything below the last floor is an F.
const GRADE_LADDER: [(f64, LetterGrade); 12] = [
    (90.0, LetterGrade::APlus),
    (85.0, LetterGrade::A),
    (83.0, LetterGrade::AMinus),
    (80.0, LetterGrade::BPlus),
    (77.0, LetterGrade::B),
    (72.0, LetterGrade::BMinus),
    (60.0, LetterGrade::CPlus),
    (57.0, LetterGrade::C),
    (52.0, LetterGrade::CMinus),
    (50.0, LetterGrade::DPlus),
    (47.0, LetterGrade::D),
    (42.0, LetterGrade::DMinus),
];

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

pub const INVALID: GradeResult = GradeResult {
    letter: "Invalid",
    gpa: 0.0,
    is_passing: false,
};

impl From<LetterGrade> for GradeResult {
    fn from(letter: LetterGrade) -> Self {
        GradeResult {
            letter: letter.as_str(),
            gpa: letter.grade_points(),
            is_passing: letter.is_passing(),
        }
    }
}

pub fn letter_for(score: f64) -> Option<LetterGrade> {
    if score.is_nan() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return None;
    }

    let letter = GRADE_LADDER
        .iter()
        .find(|(floor, _)| score >= *floor)
        .map(|(_, letter)| *letter)
        .unwrap_or(LetterGrade::F);
    Some(letter)
}

/// Maps a 0-100 score to its letter, grade points and pass flag.
///
/// Out-of-range and NaN scores yield [`INVALID`] rather than an error.
pub fn resolve(score: f64) -> GradeResult {
    letter_for(score).map(GradeResult::from).unwrap_or(INVALID)
}

/// Loosely typed score as typed into a form field.
#[derive(Debug, Clone, Copy)]
pub enum ScoreInput<'a> {
    Text(&'a str),
    Number(f64),
}

impl<'a> From<&'a str> for ScoreInput<'a> {
    fn from(value: &'a str) -> Self {
        ScoreInput::Text(value)
    }
}

impl From<f64> for ScoreInput<'_> {
    fn from(value: f64) -> Self {
        ScoreInput::Number(value)
    }
}

/// Letter to pre-fill while a score is being typed. Empty when the input
/// has no leading number, "Invalid" when it parses but is out of range.
pub fn auto_suggest<'a>(input: impl Into<ScoreInput<'a>>) -> String {
    let score = match input.into() {
        ScoreInput::Number(value) => Some(value),
        ScoreInput::Text(text) => parse_leading_float(text),
    };

    match score {
        Some(value) if !value.is_nan() => resolve(value).letter.to_string(),
        _ => String::new(),
    }
}

/// Parses the longest numeric prefix after leading whitespace, so "85.5%"
/// reads as 85.5 and "abc" reads as nothing.
fn parse_leading_float(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    if text[end..].starts_with("Infinity") {
        return text[..end + "Infinity".len()].parse::<f64>().ok();
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let fraction_start = end + 1;
        let mut fraction_end = fraction_start;
        while fraction_end < bytes.len() && bytes[fraction_end].is_ascii_digit() {
            fraction_end += 1;
        }
        mantissa_digits += fraction_end - fraction_start;
        end = fraction_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exponent_end = end + 1;
        if matches!(bytes.get(exponent_end), Some(b'+') | Some(b'-')) {
            exponent_end += 1;
        }
        let exponent_digits_start = exponent_end;
        while exponent_end < bytes.len() && bytes[exponent_end].is_ascii_digit() {
            exponent_end += 1;
        }
        if exponent_end > exponent_digits_start {
            end = exponent_end;
        }
    }

    text[..end].parse::<f64>().ok()
}
