//! Client-side typing state machines.
//!
//! Sender side: a single-slot debounce — the first keystroke after idle
//! emits `typing`, further keystrokes re-arm the timer without re-emitting,
//! and idle expiry or message send emits `stopTyping`.
//!
//! Receiver side: an extinguish timer — a peer's `typing` lights the
//! indicator and re-arms the timer without flicker on duplicates, and
//! `stopTyping` or expiry clears it.
//!
//! Both timers are cancellable: a new arm aborts the pending one, so at most
//! one timer is live per machine and stale indicators cannot outlive the
//! condition they report.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sender idle window: no keystroke for this long means composition stopped.
pub const TYPING_DEBOUNCE: Duration = Duration::from_secs(2);

/// Receiver extinguish window: a typing indicator with no refreshing event
/// clears itself after this long.
pub const TYPING_EXTINGUISH: Duration = Duration::from_secs(3);

/// Signals the notifier asks the session to put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Typing,
    StopTyping,
}

// --- Sender side ---

struct NotifierInner {
    composing: bool,
    timer: Option<JoinHandle<()>>,
    // Incremented on every arm/cancel; a timer that fires with a stale
    // generation was superseded while it slept and must not transition.
    generation: u64,
}

/// Sender-side debounce, owned by the session object. One instance per
/// session: the timer is global to the active composition, not per-peer.
#[derive(Clone)]
pub struct TypingNotifier {
    inner: Arc<Mutex<NotifierInner>>,
    signals: mpsc::UnboundedSender<TypingSignal>,
}

impl TypingNotifier {
    /// Create a notifier and the stream of signals it emits.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TypingSignal>) {
        let (signals, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Mutex::new(NotifierInner {
                    composing: false,
                    timer: None,
                    generation: 0,
                })),
                signals,
            },
            rx,
        )
    }

    /// Record a local keystroke. Emits `Typing` only on the idle→composing
    /// transition; always re-arms the single debounce timer.
    pub fn keystroke(&self) {
        let mut inner = self.inner.lock().expect("typing notifier lock");

        if !inner.composing {
            inner.composing = true;
            let _ = self.signals.send(TypingSignal::Typing);
        }

        // Single-slot debounce: a new timer start cancels any pending one.
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        let generation = inner.generation;

        let weak = Arc::downgrade(&self.inner);
        let signals = self.signals.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(TYPING_DEBOUNCE).await;
            expire_notifier(&weak, &signals, generation);
        }));
    }

    /// The composed message went out: return to idle immediately,
    /// pre-empting the timer.
    pub fn message_sent(&self) {
        let mut inner = self.inner.lock().expect("typing notifier lock");
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        if inner.composing {
            inner.composing = false;
            let _ = self.signals.send(TypingSignal::StopTyping);
        }
    }

    #[cfg(test)]
    fn is_composing(&self) -> bool {
        self.inner.lock().expect("typing notifier lock").composing
    }
}

fn expire_notifier(
    weak: &Weak<Mutex<NotifierInner>>,
    signals: &mpsc::UnboundedSender<TypingSignal>,
    generation: u64,
) {
    // The session may be gone by the time the timer fires.
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut inner = inner.lock().expect("typing notifier lock");
    if inner.generation != generation {
        // Superseded while sleeping: a newer keystroke or send owns the state.
        return;
    }
    inner.timer = None;
    if inner.composing {
        inner.composing = false;
        let _ = signals.send(TypingSignal::StopTyping);
    }
}

// --- Receiver side ---

struct IndicatorInner {
    typing: bool,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

/// Receiver-side indicator for the currently open peer. Duplicate `typing`
/// events re-arm the extinguish timer without a visible flicker.
#[derive(Clone)]
pub struct TypingIndicator {
    inner: Arc<Mutex<IndicatorInner>>,
}

impl TypingIndicator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(IndicatorInner {
                typing: false,
                timer: None,
                generation: 0,
            })),
        }
    }

    /// A `typing` event from the open peer arrived.
    pub fn on_typing(&self) {
        let mut inner = self.inner.lock().expect("typing indicator lock");
        inner.typing = true;

        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        let generation = inner.generation;

        let weak = Arc::downgrade(&self.inner);
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(TYPING_EXTINGUISH).await;
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().expect("typing indicator lock");
                if inner.generation != generation {
                    return;
                }
                inner.typing = false;
                inner.timer = None;
            }
        }));
    }

    /// A `stopTyping` event arrived: clear immediately, regardless of the
    /// timer state.
    pub fn on_stop_typing(&self) {
        let mut inner = self.inner.lock().expect("typing indicator lock");
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        inner.typing = false;
    }

    /// Clear without an event — used when switching conversations.
    pub fn reset(&self) {
        self.on_stop_typing();
    }

    pub fn is_typing(&self) -> bool {
        self.inner.lock().expect("typing indicator lock").typing
    }
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new()
    }
}
