//! Utility functions shared across the codebase

pub mod html;

// Re-export commonly used utilities
pub use html::escape_html;
