pub mod scorer;

pub use scorer::{
    ScoreExplanation, ScorerRegistry, ScoringArgs, ScoringFunction, SCORE_FILTEROUT,
};
