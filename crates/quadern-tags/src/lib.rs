//! quadern-tags: free-form tag handling for section notes.
//!
//! Readers label notes with free-form tags typed as a comma-separated list
//! (`examen, tema 1/repàs`). A `/` inside a tag is read as a hierarchy
//! separator, so `tema 1` also matches notes tagged `tema 1/repàs`.

pub mod autocomplete;
pub mod parse;
pub mod query;
pub mod tag;

pub use autocomplete::*;
pub use parse::*;
pub use query::*;
pub use tag::*;
