pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{DeckSide, Outcome, PlayOrder, SortDirection, SortKey};
pub use error::CoreError;
pub use structs::{
    Deck, MatchResult, MatchUpdate, NewMatchResult, ResultFilter, User, DEFAULT_RESULT_LIMIT,
    MAX_DECK_NAME_LEN,
};
