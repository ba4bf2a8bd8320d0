use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::visitor::{
    clip, column_max_len, COLUMN_USER_BROWSER, COLUMN_USER_BROWSER_VERSION, COLUMN_USER_DEVICE,
    COLUMN_USER_DEVICE_TYPE, COLUMN_USER_OS, COLUMN_USER_OS_VERSION,
};

pub const DEVICE_TYPE_BOT: &str = "bot";
pub const DEVICE_TYPE_TABLET: &str = "tablet";
pub const DEVICE_TYPE_MOBILE: &str = "mobile";
pub const DEVICE_TYPE_DESKTOP: &str = "desktop";

/// Fields derived from a `User-Agent` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserAgentInfo {
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub os_version: String,
    pub device: String,
    pub device_type: String,
}

static BOT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)bot\b|bot/|crawler|spider|crawling|slurp|facebookexternalhit|headless|curl/|wget/|python-requests|go-http-client|okhttp",
    )
    .unwrap()
});

static BOT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([a-z0-9\-_.]*(?:bot|crawler|spider|slurp))").unwrap());

// Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari.
static BROWSERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("Edge", Regex::new(r"Edg(?:e|A|iOS)?/([\d.]+)").unwrap()),
        ("Opera", Regex::new(r"(?:OPR|Opera)/([\d.]+)").unwrap()),
        (
            "Samsung Internet",
            Regex::new(r"SamsungBrowser/([\d.]+)").unwrap(),
        ),
        ("Chrome", Regex::new(r"(?:Chrome|CriOS)/([\d.]+)").unwrap()),
        ("Firefox", Regex::new(r"(?:Firefox|FxiOS)/([\d.]+)").unwrap()),
        ("Safari", Regex::new(r"Version/([\d.]+).*Safari/").unwrap()),
    ]
});

static WINDOWS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Windows NT ([\d.]+)").unwrap());
static IOS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:iPhone|iPad|iPod).*? OS (\d+(?:_\d+)*)").unwrap());
static MACOS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Mac OS X (\d+(?:[_.]\d+)*)").unwrap());
static ANDROID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Android (\d+(?:\.\d+)*)").unwrap());
static ANDROID_MODEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Android [\d.]+; (?:[a-zA-Z]{2}[-_][a-zA-Z]{2}; )?([^;)]+)").unwrap());
static MOBILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Mobi|iPhone|iPod").unwrap());
static TABLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)iPad|tablet").unwrap());

fn windows_version(nt: &str) -> String {
    match nt {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        "6.0" => "Vista",
        "5.1" | "5.2" => "XP",
        other => other,
    }
    .to_string()
}

fn detect_os(ua: &str) -> (String, String) {
    if let Some(caps) = WINDOWS_RE.captures(ua) {
        return ("Windows".into(), windows_version(&caps[1]));
    }
    if let Some(caps) = IOS_RE.captures(ua) {
        return ("iOS".into(), caps[1].replace('_', "."));
    }
    if let Some(caps) = ANDROID_RE.captures(ua) {
        return ("Android".into(), caps[1].to_string());
    }
    if let Some(caps) = MACOS_RE.captures(ua) {
        return ("macOS".into(), caps[1].replace('_', "."));
    }
    if ua.contains("CrOS") {
        return ("ChromeOS".into(), String::new());
    }
    if ua.contains("Linux") {
        return ("Linux".into(), String::new());
    }
    (String::new(), String::new())
}

fn detect_browser(ua: &str) -> (String, String) {
    for (name, re) in BROWSERS.iter() {
        if let Some(caps) = re.captures(ua) {
            return (name.to_string(), caps[1].to_string());
        }
    }
    if ua.contains("Safari/") {
        return ("Safari".into(), String::new());
    }
    (String::new(), String::new())
}

fn detect_device(ua: &str) -> String {
    for device in ["iPhone", "iPad", "iPod"] {
        if ua.contains(device) {
            return device.to_string();
        }
    }
    if let Some(caps) = ANDROID_MODEL_RE.captures(ua) {
        let model = caps[1].split(" Build/").next().unwrap_or("").trim();
        if !model.is_empty() && model != "K" {
            return model.to_string();
        }
    }
    if ua.contains("Macintosh") {
        return "Mac".into();
    }
    if ua.contains("Windows") || ua.contains("X11") || ua.contains("CrOS") {
        return "PC".into();
    }
    String::new()
}

/// Derive browser, OS and device details from a user agent string.
/// An empty user agent yields empty fields.
pub fn parse_user_agent(ua: &str) -> UserAgentInfo {
    let ua = ua.trim();
    if ua.is_empty() {
        return UserAgentInfo::default();
    }

    let (mut browser, mut browser_version) = detect_browser(ua);
    let (os, os_version) = detect_os(ua);
    let mut device = detect_device(ua);

    let device_type = if BOT_RE.is_match(ua) {
        if let Some(caps) = BOT_NAME_RE.captures(ua) {
            browser = caps[1].to_string();
            browser_version = String::new();
        }
        device = "Bot".to_string();
        DEVICE_TYPE_BOT
    } else if TABLET_RE.is_match(ua) || (ua.contains("Android") && !ua.contains("Mobile")) {
        DEVICE_TYPE_TABLET
    } else if MOBILE_RE.is_match(ua) || ua.contains("Android") {
        DEVICE_TYPE_MOBILE
    } else {
        DEVICE_TYPE_DESKTOP
    };

    UserAgentInfo {
        browser: clip(&browser, column_max_len(COLUMN_USER_BROWSER)),
        browser_version: clip(&browser_version, column_max_len(COLUMN_USER_BROWSER_VERSION)),
        os: clip(&os, column_max_len(COLUMN_USER_OS)),
        os_version: clip(&os_version, column_max_len(COLUMN_USER_OS_VERSION)),
        device: clip(&device, column_max_len(COLUMN_USER_DEVICE)),
        device_type: clip(device_type, column_max_len(COLUMN_USER_DEVICE_TYPE)),
    }
}
