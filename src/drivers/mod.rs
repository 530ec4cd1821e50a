pub mod attn;
pub mod notecard;

pub use attn::AttnSignal;
pub use notecard::{Notecard, Outcome, State};
