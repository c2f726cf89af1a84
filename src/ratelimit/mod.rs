//! Rate limiting logic and state management.

mod clock;
mod decision;
mod key;
mod limiter;
mod rules;
mod sweeper;
mod window;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use decision::Decision;
pub use key::LimitKey;
pub use limiter::RateLimiter;
pub use rules::{RateLimitRule, RuleRegistry, AUTH_LOGIN, AUTH_REGISTER, SKATE_SPOT_WRITE};
pub use sweeper::spawn_sweeper;
pub use window::EventWindow;
