pub mod ai;
pub mod arena;
pub mod motion;
pub mod population;
pub mod scoring;
pub mod search;
