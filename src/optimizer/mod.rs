//! Decision Heuristic
//!
//! Classifies the quality index, gates new proposals behind a cooldown and
//! urgency rules, and computes parameter targets with a predicted impact.
//! Entirely algorithmic: the sensitivity weights approximate a fitted model
//! but nothing is trained here.

mod forced;
mod heuristic;
mod impact;

pub use heuristic::{DecisionHeuristic, Proposal};
pub use impact::{expected_improvement, predict_impact, ImpactPrediction};
