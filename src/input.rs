//! Debounced multi-key command recognition.
//!
//! Keystrokes accumulate in a trailing buffer; entries older than the
//! command window relative to the newest key are dropped, and the remaining
//! text is scanned for configured trigger phrases. Matching consumes the
//! whole buffer.

use std::time::{Duration, Instant};

use tracing::info;

/// How spread out a command phrase may be typed.
pub const COMMAND_WINDOW: Duration = Duration::from_secs(2);

/// Render/poll rate used when the configured rate is unusable.
pub const DEFAULT_DISPLAY_FPS: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// No command recognized; keep looping.
    Continue,
    /// Terminate the main loop.
    Quit,
}

pub struct InputController {
    /// Trigger phrases, longest first, ties lexicographic. The fixed order
    /// makes multi-match resolution deterministic.
    phrases: Vec<(String, KeyAction)>,
    buffer: Vec<(char, Instant)>,
    window: Duration,
}

impl InputController {
    pub fn new(phrases: impl IntoIterator<Item = (String, KeyAction)>) -> Self {
        let mut phrases: Vec<(String, KeyAction)> = phrases
            .into_iter()
            .map(|(p, a)| (p.to_ascii_lowercase(), a))
            .collect();
        phrases.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            phrases,
            buffer: Vec::new(),
            window: COMMAND_WINDOW,
        }
    }

    /// The stock phrase table.
    pub fn with_default_phrases() -> Self {
        Self::new([("quit".to_owned(), KeyAction::Quit)])
    }

    /// Feed one keystroke, stamped now.
    pub fn push_key(&mut self, key: char) -> KeyAction {
        self.push_key_at(key, Instant::now())
    }

    /// Feed one keystroke with an explicit timestamp. Timestamps must be
    /// monotonically non-decreasing across calls.
    pub fn push_key_at(&mut self, key: char, at: Instant) -> KeyAction {
        self.buffer.push((key.to_ascii_lowercase(), at));

        let expired = self
            .buffer
            .iter()
            .take_while(|(_, t)| at.duration_since(*t) > self.window)
            .count();
        self.buffer.drain(..expired);

        let text: String = self.buffer.iter().map(|(c, _)| *c).collect();
        for (phrase, action) in &self.phrases {
            if text.contains(phrase.as_str()) {
                info!(%phrase, "command recognized");
                self.buffer.clear();
                return *action;
            }
        }
        KeyAction::Continue
    }

    /// Keyboard poll interval derived from the display refresh rate.
    pub fn poll_interval(display_fps: f32) -> Duration {
        let fps = if display_fps > 0.0 {
            display_fps
        } else {
            DEFAULT_DISPLAY_FPS
        };
        Duration::from_millis(((1000.0 / fps) as u64).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(ctl: &mut InputController, text: &str, start: Instant, gap: Duration) -> Vec<KeyAction> {
        text.chars()
            .enumerate()
            .map(|(i, c)| ctl.push_key_at(c, start + gap * i as u32))
            .collect()
    }

    #[test]
    fn quit_within_window_fires_once_and_clears() {
        let mut ctl = InputController::with_default_phrases();
        let start = Instant::now();
        let actions = feed(&mut ctl, "quit", start, Duration::from_millis(400));
        assert_eq!(
            actions,
            vec![
                KeyAction::Continue,
                KeyAction::Continue,
                KeyAction::Continue,
                KeyAction::Quit
            ]
        );
        // Buffer was consumed: the trailing "t" of the match is gone, so a
        // new "t" alone does not re-trigger.
        assert_eq!(
            ctl.push_key_at('t', start + Duration::from_millis(1700)),
            KeyAction::Continue
        );
    }

    #[test]
    fn expired_prefix_does_not_combine_with_late_suffix() {
        let mut ctl = InputController::with_default_phrases();
        let start = Instant::now();
        feed(&mut ctl, "qu", start, Duration::from_millis(100));
        // 3 second pause, then "it": "qu" has aged out of the window.
        let late = start + Duration::from_secs(3) + Duration::from_millis(100);
        assert_eq!(ctl.push_key_at('i', late), KeyAction::Continue);
        assert_eq!(
            ctl.push_key_at('t', late + Duration::from_millis(100)),
            KeyAction::Continue
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mut ctl = InputController::with_default_phrases();
        let start = Instant::now();
        let actions = feed(&mut ctl, "QuIt", start, Duration::from_millis(100));
        assert_eq!(actions.last(), Some(&KeyAction::Quit));
    }

    #[test]
    fn phrase_matches_as_substring_of_noise() {
        let mut ctl = InputController::with_default_phrases();
        let start = Instant::now();
        let actions = feed(&mut ctl, "xxquitzz", start, Duration::from_millis(100));
        assert_eq!(actions[5], KeyAction::Quit);
        // Everything after the match starts from an empty buffer.
        assert_eq!(actions[6], KeyAction::Continue);
    }

    #[test]
    fn longest_phrase_wins_when_both_match_at_once() {
        // The final "t" completes "it" and "quit" simultaneously; the scan
        // order (longest first) must hand the win to "quit". Insertion or
        // lexicographic order would pick "it".
        let mut ctl = InputController::new([
            ("it".to_owned(), KeyAction::Continue),
            ("quit".to_owned(), KeyAction::Quit),
        ]);
        let actions = feed(&mut ctl, "quit", Instant::now(), Duration::from_millis(50));
        assert_eq!(actions.last(), Some(&KeyAction::Quit));
    }

    #[test]
    fn poll_interval_falls_back_for_nonpositive_fps() {
        assert_eq!(InputController::poll_interval(30.0), Duration::from_millis(33));
        assert_eq!(InputController::poll_interval(0.0), Duration::from_millis(16));
        assert_eq!(InputController::poll_interval(-5.0), Duration::from_millis(16));
    }
}
