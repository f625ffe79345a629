pub mod archive;
pub mod cards;
pub mod charts;
pub mod config;
pub mod error;
pub mod http;
pub mod inspect;
pub mod metrics;
pub mod oembed;
pub mod parse;
pub mod session;
pub mod utils;

pub use error::{Result, TokLensError};
