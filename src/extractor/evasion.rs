//! Client emulation, header spoofing and pacing for yt-dlp runs.
//!
//! When no usable cookies are present (or they stop working), requests are
//! retried as different YouTube player clients with matching user agents,
//! with exponential backoff and randomized delays between attempts.

use std::time::Duration;

use rand::Rng;

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const ANDROID_UA: &str = "com.google.android.youtube/19.44.38 (Linux; U; Android 14) gzip";
const IOS_UA: &str = "com.google.ios.youtube/19.45.4 (iPhone16,2; U; CPU iOS 17_5_1 like Mac OS X;)";
const MWEB_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 \
(KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

const ACCEPT_LANGUAGE: &str = "Accept-Language:en-US,en;q=0.9";

/// One rung of the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientProfile {
    pub name: &'static str,
    /// Value for `--extractor-args youtube:player_client=...`
    pub player_client: &'static str,
    pub user_agent: &'static str,
    /// Whether the cookie file is passed on this rung
    pub uses_cookies: bool,
}

impl ClientProfile {
    pub const WEB_WITH_COOKIES: ClientProfile = ClientProfile {
        name: "web+cookies",
        player_client: "web,web_safari",
        user_agent: CHROME_UA,
        uses_cookies: true,
    };

    pub const ANDROID: ClientProfile = ClientProfile {
        name: "android",
        player_client: "android",
        user_agent: ANDROID_UA,
        uses_cookies: false,
    };

    pub const IOS: ClientProfile = ClientProfile {
        name: "ios",
        player_client: "ios",
        user_agent: IOS_UA,
        uses_cookies: false,
    };

    pub const MWEB: ClientProfile = ClientProfile {
        name: "mweb",
        player_client: "mweb",
        user_agent: MWEB_UA,
        uses_cookies: false,
    };

    /// yt-dlp arguments selecting this client and spoofing its headers.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--extractor-args".to_string(),
            format!("youtube:player_client={}", self.player_client),
            "--user-agent".to_string(),
            self.user_agent.to_string(),
            "--add-header".to_string(),
            ACCEPT_LANGUAGE.to_string(),
        ]
    }
}

/// Order in which client profiles are tried.
pub fn attempt_plan(cookies_available: bool) -> Vec<ClientProfile> {
    let mut plan = Vec::with_capacity(4);
    if cookies_available {
        plan.push(ClientProfile::WEB_WITH_COOKIES);
    }
    plan.extend([ClientProfile::ANDROID, ClientProfile::IOS, ClientProfile::MWEB]);
    plan
}

/// Exponential backoff between fallback attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay added to each wait
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all, for tests and local tooling.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let exponential = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.random_range(0..=jitter_ms))
        };
        exponential + jitter
    }
}

/// Randomized inter-request pacing handed to yt-dlp.
///
/// `for_download` adds a sleep before the media download itself.
pub fn pacing_args<R: Rng>(rng: &mut R, for_download: bool) -> Vec<String> {
    let sleep_requests: f64 = rng.random_range(0.5..1.5);
    let mut args = vec![
        "--sleep-requests".to_string(),
        format!("{:.2}", sleep_requests),
        "--retries".to_string(),
        "3".to_string(),
        "--extractor-retries".to_string(),
        "3".to_string(),
    ];
    if for_download {
        let min_sleep: u32 = rng.random_range(1..=3);
        args.extend([
            "--sleep-interval".to_string(),
            min_sleep.to_string(),
            "--max-sleep-interval".to_string(),
            (min_sleep + 3).to_string(),
            "--fragment-retries".to_string(),
            "5".to_string(),
        ]);
    }
    args
}
