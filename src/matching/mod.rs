pub mod best;
pub mod fuzz;
pub mod locate;
pub mod normalize;

pub use best::{best_paragraph, MatchResult};
pub use locate::{place_anchor, AnchorPlacement, LocateSettings, StartMethod};
pub use normalize::{normalize, NormalizedText};
