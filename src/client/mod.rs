pub mod session;
pub mod typing;

pub use session::ClientSession;
pub use typing::{TypingIndicator, TypingNotifier, TypingSignal};
