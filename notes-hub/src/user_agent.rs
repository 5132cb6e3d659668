//! Coarse User-Agent classification for the access log.
//!
//! Substring checks only. The order of the checks matters: iPad and Android
//! tablets also advertise "mobile"/"linux", and Edge and Chrome both claim to
//! be Safari.

use serde::Serialize;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAgentInfo {
    pub device_type: &'static str,
    pub os: &'static str,
    pub browser: &'static str,
}

pub fn classify(user_agent: &str) -> UserAgentInfo {
    let ua = user_agent.trim().to_ascii_lowercase();
    if ua.is_empty() {
        return UserAgentInfo {
            device_type: UNKNOWN,
            os: UNKNOWN,
            browser: UNKNOWN,
        };
    }
    let has = |needle: &str| ua.contains(needle);

    let device_type = if has("tablet") || has("ipad") {
        "Tablet"
    } else if has("mobile") || has("iphone") || has("android") {
        "Mobile"
    } else {
        "PC"
    };

    let os = if has("iphone") || has("ipad") {
        "iOS"
    } else if has("android") {
        "Android"
    } else if has("windows") {
        "Windows"
    } else if has("macintosh") || has("mac os") {
        "Mac OS"
    } else if has("linux") {
        "Linux"
    } else {
        UNKNOWN
    };

    let browser = if has("edg") {
        "Edge"
    } else if has("firefox") {
        "Firefox"
    } else if has("chrome") {
        "Chrome"
    } else if has("safari") {
        "Safari"
    } else {
        UNKNOWN
    };

    UserAgentInfo {
        device_type,
        os,
        browser,
    }
}
