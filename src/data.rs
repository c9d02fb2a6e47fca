pub mod context;
pub mod dataset;
pub mod domain;
pub mod series;
