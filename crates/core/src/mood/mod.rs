pub mod engine;
pub mod weights;

pub use engine::{MoodEngine, MoodEvent};
pub use weights::{IntentWeights, decision_weights, get_intent};
