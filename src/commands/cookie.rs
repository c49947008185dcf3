// cookie.rs - Fortune Cookie Command Module
// `!cookie` hands out a random fortune, at most once per cooldown window per user.
// Fortunes come from a plain text file (one per line) read once at startup.
//
// Used by: commands/router.rs, main.rs (fortune loading)

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use tokio::time::Instant;

const FORTUNE_PATHS: [&str; 4] = [
    "fortunes.txt",
    "../fortunes.txt",
    "../../fortunes.txt",
    "src/fortunes.txt",
];

const BUILTIN_FORTUNES: [&str; 6] = [
    "A pleasant surprise is waiting for you.",
    "Your hard work is about to pay off.",
    "Now is the time to try something new.",
    "A friend asks only for your time, not your money.",
    "You will read this and wonder why you opened a cookie.",
    "The bug you are looking for is in the line you trust the most.",
];

pub const EMPTY_JAR: &str = "The cookie jar is empty.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownOutcome {
    Allowed,
    Rejected { remaining: Duration },
}

/// Last-use timestamps for one rate-limited command.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_use: HashMap<UserId, Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record a use in one step. A rejection leaves the stored time alone.
    pub fn try_use(&mut self, user_id: UserId, window: Duration, now: Instant) -> CooldownOutcome {
        if let Some(last) = self.last_use.get(&user_id) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < window {
                return CooldownOutcome::Rejected {
                    remaining: window - elapsed,
                };
            }
        }
        self.last_use.insert(user_id, now);
        CooldownOutcome::Allowed
    }

    pub fn tracked_users(&self) -> usize {
        self.last_use.len()
    }
}

/// The static fortune collection.
#[derive(Debug, Clone)]
pub struct Fortunes {
    entries: Vec<String>,
}

impl Fortunes {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn parse(content: &str) -> Self {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_FORTUNES.iter().map(|f| f.to_string()).collect())
    }

    /// Load from `path` if given, otherwise from the usual locations, falling back
    /// to the built-in list.
    pub fn load(path: Option<&str>) -> Self {
        let candidates: Vec<&str> = match path {
            Some(path) => vec![path],
            None => FORTUNE_PATHS.to_vec(),
        };
        for candidate in candidates {
            if let Ok(content) = fs::read_to_string(candidate) {
                let fortunes = Self::parse(&content);
                if fortunes.is_empty() {
                    log::warn!("{} has no fortunes, !cookie will report an empty jar", candidate);
                } else {
                    println!("🥠 Loaded {} fortunes from {}", fortunes.len(), candidate);
                }
                return fortunes;
            }
        }
        log::warn!("No fortunes file found, using {} built-in fortunes", BUILTIN_FORTUNES.len());
        Self::builtin()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uniformly random fortune.
    pub fn pick(&self) -> Option<&str> {
        self.entries.choose(&mut rand::thread_rng()).map(String::as_str)
    }
}

pub fn fortune_reply(fortune: &str) -> String {
    format!("🥠 {}", fortune)
}

/// Wait message for a rejected `!cookie`, e.g. `1h 5m 3s`.
pub fn cooldown_reply(remaining: Duration) -> String {
    format!(
        "🍪 You already opened a cookie. Try again in {}.",
        format_remaining(remaining)
    )
}

pub fn format_remaining(remaining: Duration) -> String {
    // Round up so "0s" is never shown while still on cooldown.
    let mut total = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        total += 1;
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_allows_rejects_then_allows() {
        let mut tracker = CooldownTracker::new();
        let user = UserId(1);
        let window = Duration::from_secs(60);
        let start = Instant::now();

        assert_eq!(tracker.try_use(user, window, start), CooldownOutcome::Allowed);
        assert_eq!(
            tracker.try_use(user, window, start + Duration::from_secs(20)),
            CooldownOutcome::Rejected {
                remaining: Duration::from_secs(40)
            }
        );
        // Rejection did not refresh the timestamp.
        assert_eq!(
            tracker.try_use(user, window, start + Duration::from_secs(59)),
            CooldownOutcome::Rejected {
                remaining: Duration::from_secs(1)
            }
        );
        assert_eq!(
            tracker.try_use(user, window, start + Duration::from_secs(60)),
            CooldownOutcome::Allowed
        );
    }

    #[test]
    fn test_cooldown_is_per_user() {
        let mut tracker = CooldownTracker::new();
        let window = Duration::from_secs(60);
        let now = Instant::now();
        assert_eq!(tracker.try_use(UserId(1), window, now), CooldownOutcome::Allowed);
        assert_eq!(tracker.try_use(UserId(2), window, now), CooldownOutcome::Allowed);
        assert_eq!(tracker.tracked_users(), 2);
    }

    #[test]
    fn test_zero_window_always_allows() {
        let mut tracker = CooldownTracker::new();
        let now = Instant::now();
        assert_eq!(tracker.try_use(UserId(1), Duration::ZERO, now), CooldownOutcome::Allowed);
        assert_eq!(tracker.try_use(UserId(1), Duration::ZERO, now), CooldownOutcome::Allowed);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::from_secs(3 * 3600 + 5 * 60 + 9)), "3h 5m 9s");
        assert_eq!(format_remaining(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_remaining(Duration::from_millis(1500)), "2s");
        assert_eq!(format_remaining(Duration::from_secs(3600)), "1h 0m 0s");
    }

    #[test]
    fn test_parse_fortunes_skips_blank_and_comment_lines() {
        let fortunes = Fortunes::parse("# fortunes\nOne\n\n  Two  \n");
        assert_eq!(fortunes.len(), 2);
        let picked = fortunes.pick().unwrap();
        assert!(picked == "One" || picked == "Two");
    }

    #[test]
    fn test_empty_collection_picks_nothing() {
        let fortunes = Fortunes::new(Vec::new());
        assert!(fortunes.is_empty());
        assert_eq!(fortunes.pick(), None);
    }

    #[test]
    fn test_builtin_fortunes_present() {
        assert_eq!(Fortunes::builtin().len(), BUILTIN_FORTUNES.len());
        assert_eq!(fortune_reply("Hi"), "🥠 Hi");
    }
}
