pub mod elo;
pub mod protocol;

pub use elo::{calculate_new_rating, k_factor, rating_delta, DEFAULT_RATING, RATING_FLOOR};
pub use protocol::{
    InviteNotice, InviteStatus, MatchOutcome, MatchUpdate, MatchUpdateStatus, PushMessage,
};
