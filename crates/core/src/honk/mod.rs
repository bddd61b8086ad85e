pub mod honkify;

pub use honkify::{HonkifyAction, HonkifyOptions, HonkifyOutcome, honkify_message};
