/// Names that only appear once a Google account is signed in.
const LOGIN_COOKIES: [&str; 4] = ["SAPISID", "__Secure-3PSID", "LOGIN_INFO", "SID"];

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// One line of a Netscape cookie file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    /// Unix seconds; 0 marks a session cookie
    pub expires: i64,
    pub name: String,
    pub value: String,
}

impl CookieEntry {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires != 0 && self.expires < now_unix
    }

    pub fn is_youtube(&self) -> bool {
        let domain = self.domain.trim_start_matches('.');
        domain == "youtube.com"
            || domain.ends_with(".youtube.com")
            || domain == "google.com"
            || domain.ends_with(".google.com")
    }
}

/// Counts reported by `/api/cookie_status`. Never carries cookie values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSummary {
    pub entries: usize,
    pub youtube_entries: usize,
    pub expired_entries: usize,
    pub has_login_cookies: bool,
    pub has_header: bool,
}

impl CookieSummary {
    pub fn format_valid(&self) -> bool {
        self.entries > 0
    }
}

/// Parse the cookie lines of a Netscape cookie file, skipping anything malformed.
pub fn parse_cookies(content: &str) -> Vec<CookieEntry> {
    content.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<CookieEntry> {
    let line = line.trim_end_matches('\r');
    let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
        Some(rest) => rest,
        None if line.starts_with('#') || line.trim().is_empty() => return None,
        None => line,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 7 || fields[0].is_empty() || fields[5].is_empty() {
        return None;
    }

    Some(CookieEntry {
        domain: fields[0].to_string(),
        include_subdomains: parse_flag(fields[1])?,
        path: fields[2].to_string(),
        secure: parse_flag(fields[3])?,
        expires: fields[4].trim().parse().ok()?,
        name: fields[5].to_string(),
        value: fields[6].to_string(),
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

pub fn summarize(content: &str, now_unix: i64) -> CookieSummary {
    let entries = parse_cookies(content);
    let has_header = content
        .lines()
        .take(5)
        .any(|line| line.starts_with("# Netscape HTTP Cookie File") || line.starts_with("# HTTP Cookie File"));

    CookieSummary {
        entries: entries.len(),
        youtube_entries: entries.iter().filter(|c| c.is_youtube()).count(),
        expired_entries: entries.iter().filter(|c| c.is_expired(now_unix)).count(),
        has_login_cookies: entries
            .iter()
            .any(|c| c.is_youtube() && LOGIN_COOKIES.contains(&c.name.as_str())),
        has_header,
    }
}
