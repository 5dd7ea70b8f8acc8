//! Fast-path router
//!
//! Deterministic intent matching that runs before the agent: common
//! commands (timers, playback transport, clock) are handled with
//! compiled regexes and no model inference. Every utterance gets
//! exactly one decision; anything unmatched is declined to the agent.
//!
//! Pattern classes are ordered and mutually exclusive. Timer phrases
//! are checked before transport phrases so "stop the timer" never
//! reaches the playback verbs.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use regex::Regex;

use crate::timers::{TimerSet, format_duration};
use crate::tools::MediaTransport;

/// Outcome of routing one utterance
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// Fast path took it; the string is the spoken response
    Handled(String),
    /// No fast-path match; hand the utterance to the agent
    Declined,
}

/// Varied acknowledgements for fire-and-forget transport commands
const ACKNOWLEDGEMENTS: &[&str] = &["Sure.", "On it.", "You got it.", "Okay."];

struct Patterns {
    timer_set: Regex,
    timer_query: Regex,
    timer_cancel: Regex,
    play: Regex,
    pause: Regex,
    stop: Regex,
    skip: Regex,
    resume: Regex,
    clock: Regex,
}

impl Patterns {
    fn compile() -> Self {
        // Panic-free: every pattern is a literal checked by the unit
        // tests below.
        Self {
            timer_set: Regex::new(r"\b(?:set|start|create)\b.*\btimer\b|\btimer\b.*\bfor\b")
                .unwrap(),
            timer_query: Regex::new(
                r"\b(?:list|get|check|what|how many|how long|status)\b.*\btimers?\b",
            )
            .unwrap(),
            timer_cancel: Regex::new(r"\b(?:cancel|stop|clear|kill)\b.*\btimer\b").unwrap(),
            play: Regex::new(r"^play\s+(.+)$").unwrap(),
            pause: Regex::new(r"^pause(?:\s+(?:the\s+)?(?:music|playback|song))?$").unwrap(),
            stop: Regex::new(r"^(?:stop|halt)(?:\s+(?:the\s+)?(?:music|playback|song))?$")
                .unwrap(),
            skip: Regex::new(r"^(?:skip|next)(?:\s+(?:this\s+)?(?:song|track))?$").unwrap(),
            resume: Regex::new(r"^(?:resume|continue|unpause)(?:\s+(?:the\s+)?(?:music|playback))?$")
                .unwrap(),
            clock: Regex::new(r"\bwhat(?:'s| is)?\s+(?:the\s+)?time\b|\btime\s+is\s+it\b")
                .unwrap(),
        }
    }
}

/// Routes utterances to deterministic handlers ahead of the agent
pub struct Router {
    patterns: Patterns,
    timers: Arc<TimerSet>,
    media: Arc<dyn MediaTransport>,
}

impl Router {
    #[must_use]
    pub fn new(timers: Arc<TimerSet>, media: Arc<dyn MediaTransport>) -> Self {
        Self {
            patterns: Patterns::compile(),
            timers,
            media,
        }
    }

    /// Decide one utterance. Same text always yields the same decision
    /// class; transport side effects are dispatched fire-and-forget.
    #[must_use]
    pub fn route(&self, utterance: &str) -> RouteDecision {
        let text = utterance.to_lowercase();
        let text = text
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .trim()
            .to_string();

        if text.is_empty() {
            return RouteDecision::Declined;
        }

        // 1. timer set
        if self.patterns.timer_set.is_match(&text) && !self.patterns.timer_cancel.is_match(&text) {
            return self.handle_timer_set(&text);
        }

        // 2. timer query
        if self.patterns.timer_query.is_match(&text) {
            tracing::debug!(%text, "fast path: timer query");
            return RouteDecision::Handled(self.timers.describe());
        }

        // 3. timer cancel
        if self.patterns.timer_cancel.is_match(&text) {
            tracing::debug!(%text, "fast path: timer cancel");
            let response = match self.timers.cancel_latest() {
                Some(snapshot) => format!(
                    "Cancelled your timer with {} remaining.",
                    format_duration(snapshot.remaining)
                ),
                None => "You don't have any timers running.".to_string(),
            };
            return RouteDecision::Handled(response);
        }

        // 4. playback transport
        if let Some(caps) = self.patterns.play.captures(&text) {
            let query = caps[1].to_string();
            tracing::debug!(%query, "fast path: play");
            let media = Arc::clone(&self.media);
            tokio::spawn(async move {
                if let Err(e) = media.play(&query).await {
                    tracing::warn!(error = %e, "media play failed");
                }
            });
            return RouteDecision::Handled(acknowledge());
        }
        if self.patterns.pause.is_match(&text) {
            return self.transport(TransportVerb::Pause);
        }
        if self.patterns.stop.is_match(&text) {
            return self.transport(TransportVerb::Stop);
        }
        if self.patterns.skip.is_match(&text) {
            return self.transport(TransportVerb::Skip);
        }
        if self.patterns.resume.is_match(&text) {
            return self.transport(TransportVerb::Resume);
        }

        // 5. clock
        if self.patterns.clock.is_match(&text) {
            tracing::debug!(%text, "fast path: clock");
            let now = chrono::Local::now();
            return RouteDecision::Handled(format!("It's {}.", now.format("%-I:%M %p")));
        }

        RouteDecision::Declined
    }

    fn handle_timer_set(&self, text: &str) -> RouteDecision {
        tracing::debug!(%text, "fast path: timer set");

        let Some(duration) = parse_duration(text) else {
            return RouteDecision::Handled(
                "I didn't catch how long. Try something like 'set a timer for ten minutes'."
                    .to_string(),
            );
        };

        self.timers.start(duration, None);
        RouteDecision::Handled(format!("Timer set for {}.", format_duration(duration)))
    }

    /// Fire-and-forget transport command; success is reported
    /// optimistically, the device is authoritative for actual state.
    fn transport(&self, verb: TransportVerb) -> RouteDecision {
        tracing::debug!(?verb, "fast path: transport");
        let media = Arc::clone(&self.media);
        tokio::spawn(async move {
            let result = match verb {
                TransportVerb::Pause => media.pause().await,
                TransportVerb::Stop => media.stop().await,
                TransportVerb::Skip => media.skip().await,
                TransportVerb::Resume => media.resume().await,
            };
            if let Err(e) = result {
                tracing::warn!(?verb, error = %e, "media transport failed");
            }
        });
        RouteDecision::Handled(acknowledge())
    }
}

#[derive(Clone, Copy, Debug)]
enum TransportVerb {
    Pause,
    Stop,
    Skip,
    Resume,
}

fn acknowledge() -> String {
    let mut rng = rand::thread_rng();
    ACKNOWLEDGEMENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or("Okay.")
        .to_string()
}

/// Parse a spoken duration out of free text: digits ("10 minutes",
/// "90s"), number words ("ten minutes", "twenty-five seconds"), and
/// the common "half an hour" forms.
#[must_use]
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.to_lowercase();

    // "half an hour", "an hour and a half"
    if text.contains("hour and a half") {
        return Some(Duration::from_secs(90 * 60));
    }
    if text.contains("half an hour") || text.contains("half hour") {
        return Some(Duration::from_secs(30 * 60));
    }

    let unit_re =
        Regex::new(r"([a-z\- ]+?|\d+)\s*(hours?|hrs?|minutes?|mins?|seconds?|secs?|h|m|s)\b")
            .ok()?;

    let mut total = 0u64;
    for caps in unit_re.captures_iter(&text) {
        let quantity = parse_quantity(caps[1].trim())?;
        let unit_secs = match &caps[2] {
            u if u.starts_with('h') => 3600,
            u if u.starts_with('m') => 60,
            _ => 1,
        };
        // Transcription can produce arbitrary numbers; an overflowing
        // duration is treated as no duration at all.
        total = quantity
            .checked_mul(unit_secs)
            .and_then(|secs| total.checked_add(secs))?;
    }

    if total == 0 { None } else { Some(Duration::from_secs(total)) }
}

/// Parse "10", "ten", "twenty-five", "twenty five", "a"/"an"
fn parse_quantity(words: &str) -> Option<u64> {
    if let Ok(n) = words.parse::<u64>() {
        return Some(n);
    }

    // Only the trailing number phrase matters: "set a timer for ten"
    // reaches here as "set a timer for ten".
    let tokens: Vec<&str> = words.split([' ', '-']).filter(|t| !t.is_empty()).collect();

    let mut total = 0u64;
    let mut matched = false;
    for token in tokens.iter().rev().take(2).rev() {
        if let Some(n) = word_number(token) {
            total += n;
            matched = true;
        } else if matched {
            return None;
        }
    }

    if matched { Some(total) } else { None }
}

fn word_number(word: &str) -> Option<u64> {
    let n = match word {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "ninety" => 90,
        _ => return None,
    };
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_digit_durations() {
        assert_eq!(
            parse_duration("set a timer for 10 minutes"),
            Some(Duration::from_secs(600))
        );
        assert_eq!(
            parse_duration("timer for 1 hour 30 minutes"),
            Some(Duration::from_secs(5400))
        );
        assert_eq!(parse_duration("90s timer"), Some(Duration::from_secs(90)));
        assert_eq!(
            parse_duration("timer for 45 seconds"),
            Some(Duration::from_secs(45))
        );
    }

    #[test]
    fn parses_word_durations() {
        assert_eq!(
            parse_duration("set a timer for ten minutes"),
            Some(Duration::from_secs(600))
        );
        assert_eq!(
            parse_duration("twenty-five second timer"),
            Some(Duration::from_secs(25))
        );
        assert_eq!(
            parse_duration("timer for an hour"),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            parse_duration("set a timer for half an hour"),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(
            parse_duration("an hour and a half please"),
            Some(Duration::from_secs(5400))
        );
    }

    #[test]
    fn rejects_durationless_text() {
        assert_eq!(parse_duration("set a timer"), None);
        assert_eq!(parse_duration("what's the weather"), None);
    }

    #[test]
    fn rejects_overflowing_durations() {
        assert_eq!(
            parse_duration("set a timer for 9999999999999999 hours"),
            None
        );
        assert_eq!(
            parse_duration("timer for 18446744073709551615 minutes"),
            None
        );
    }

    #[test]
    fn patterns_compile() {
        let _ = Patterns::compile();
    }
}
