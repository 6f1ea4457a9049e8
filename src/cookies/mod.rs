//! Cookie file provisioning and inspection.
//!
//! yt-dlp reads browser-exported cookies in the Netscape format. The file is
//! seeded from `COOKIE_BASE64` at startup, replaced through the admin upload
//! endpoint, and reported on by `/api/cookie_status`.

mod netscape;
mod store;

pub use netscape::{parse_cookies, summarize, CookieEntry, CookieSummary};
pub use store::{CookieError, CookieSource, CookieStatus, CookieStore, MAX_COOKIE_FILE_BYTES};
