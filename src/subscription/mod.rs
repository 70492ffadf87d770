//! Subscription map and matcher
//!
//! Participants declare interest in manifest criteria; the matcher turns a
//! published manifest into the set of participants that should receive it.

mod map;
mod matcher;

pub use map::SubscriptionMap;
pub use matcher::{SubscriptionError, SubscriptionMatcher};
