pub mod engine;

pub use engine::AlertDecisionEngine;
