//! Parsed session entries as the registry caches them.

use chrono::{DateTime, Datelike, FixedOffset};
use shared::{
    domain::{ApiId, SessionHash},
    protocol::AuthorizationRecord,
};

const DESKTOP_API_ID: i32 = 2040;
const TEST_DESKTOP_API_ID: i32 = 17349;
const ONLINE_LABEL: &str = "online";
const COUNTRY_SEPARATOR: &str = " \u{2013} ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub hash: SessionHash,
    pub incomplete: bool,
    pub calls_disabled: bool,
    pub api_id: ApiId,
    pub active_time: i64,
    pub name: String,
    pub info: String,
    pub ip: String,
    pub location: String,
    pub system: String,
    pub platform: String,
    pub active: String,
}

impl Entry {
    pub fn parse(
        record: &AuthorizationRecord,
        device_model_here: Option<&str>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let hash = if record.current {
            SessionHash::CURRENT
        } else {
            record.hash
        };
        let api_id = record.api_id.0;
        let is_test = api_id == TEST_DESKTOP_API_ID;
        let is_desktop = api_id == DESKTOP_API_ID || is_test;

        let app_name = if is_desktop {
            format!(
                "Telegram Desktop{}",
                if is_test { " (GitHub)" } else { "" }
            )
        } else {
            record.app_name.clone()
        };
        let app_version = app_version_display(&record.app_version, is_desktop);
        let info = format!("{app_name} {app_version}").trim().to_string();

        let name = match device_model_here {
            Some(model) if hash.is_current() && !model.is_empty() => model.to_string(),
            _ => record.device_model.clone(),
        };

        let country = record.country.as_str();
        let ip = if country.is_empty() {
            record.ip.clone()
        } else {
            format!("{}{COUNTRY_SEPARATOR}{country}", record.ip)
        };
        let location = match (record.region.is_empty(), country.is_empty()) {
            (false, false) => format!("{}, {country}", record.region),
            (true, false) => country.to_string(),
            (false, true) => record.region.clone(),
            (true, true) => String::new(),
        };

        let active_time = if record.date_active != 0 {
            record.date_active
        } else {
            record.date_created
        };
        let active = if hash.is_current() {
            ONLINE_LABEL.to_string()
        } else {
            active_label(active_time, now)
        };

        Self {
            hash,
            incomplete: record.password_pending,
            calls_disabled: record.call_requests_disabled,
            api_id: record.api_id,
            active_time,
            name,
            info,
            ip,
            location,
            system: record.system_version.clone(),
            platform: record.platform.clone(),
            active,
        }
    }

    pub fn is_current(&self) -> bool {
        self.hash.is_current()
    }

    pub fn counts_towards_total(&self) -> bool {
        !self.is_current() && !self.incomplete
    }

    pub fn device_type(&self) -> DeviceType {
        DeviceType::from_entry(self)
    }
}

/// Desktop clients report their version as a packed integer
/// (`major * 1_000_000 + minor * 1_000 + patch`).
fn app_version_display(version: &str, is_desktop: bool) -> String {
    let version = version.trim();
    if is_desktop {
        if let Ok(packed) = version.parse::<i64>() {
            if packed.to_string() == version {
                return format_packed_version(packed);
            }
        }
    }
    version.to_string()
}

pub fn format_packed_version(packed: i64) -> String {
    let major = packed / 1_000_000;
    let minor = (packed % 1_000_000) / 1_000;
    let patch = packed % 1_000;
    if patch != 0 {
        format!("{major}.{minor}.{patch}")
    } else {
        format!("{major}.{minor}")
    }
}

pub fn active_label(active_time: i64, now: DateTime<FixedOffset>) -> String {
    let Some(last) = DateTime::from_timestamp(active_time, 0) else {
        return String::new();
    };
    let last = last.with_timezone(&now.timezone());
    if last.date_naive() == now.date_naive() {
        last.format("%H:%M").to_string()
    } else if last.iso_week() == now.iso_week() {
        last.format("%a").to_string()
    } else {
        last.format("%d.%m.%y").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Windows,
    Mac,
    Ubuntu,
    Linux,
    IPhone,
    IPad,
    Android,
    Web,
    Chrome,
    Edge,
    Firefox,
    Safari,
    Other,
}

const DESKTOP_API_IDS: [i32; 3] = [2040, 17349, 611335];
const MAC_API_IDS: [i32; 1] = [2834];
const ANDROID_API_IDS: [i32; 8] = [5, 6, 24, 1026, 1083, 2458, 2521, 21724];
const IOS_API_IDS: [i32; 4] = [1, 7, 10840, 16352];
const WEB_API_IDS: [i32; 3] = [2496, 739222, 1025907];

impl DeviceType {
    pub fn from_entry(entry: &Entry) -> Self {
        let platform = entry.platform.to_lowercase();
        let device = entry.name.to_lowercase();
        let system = entry.system.to_lowercase();
        let api_id = entry.api_id.0;
        let either = |needle: &str| platform.contains(needle) || system.contains(needle);

        let detect_browser = || {
            if device.contains("edg/") || device.contains("edgios/") || device.contains("edga/") {
                Some(DeviceType::Edge)
            } else if device.contains("chrome") {
                Some(DeviceType::Chrome)
            } else if device.contains("safari") {
                Some(DeviceType::Safari)
            } else if device.contains("firefox") {
                Some(DeviceType::Firefox)
            } else {
                None
            }
        };
        let detect_desktop = || {
            if either("windows") {
                Some(DeviceType::Windows)
            } else if either("macos") {
                Some(DeviceType::Mac)
            } else if either("ubuntu") || either("unity") {
                Some(DeviceType::Ubuntu)
            } else if either("linux") {
                Some(DeviceType::Linux)
            } else {
                None
            }
        };

        if ANDROID_API_IDS.contains(&api_id) {
            DeviceType::Android
        } else if DESKTOP_API_IDS.contains(&api_id) {
            detect_desktop().unwrap_or(DeviceType::Linux)
        } else if MAC_API_IDS.contains(&api_id) {
            DeviceType::Mac
        } else if WEB_API_IDS.contains(&api_id) {
            detect_browser().unwrap_or(DeviceType::Web)
        } else if device.contains("chromebook") {
            DeviceType::Other
        } else if let Some(browser) = detect_browser() {
            browser
        } else if device.contains("iphone") {
            DeviceType::IPhone
        } else if device.contains("ipad") {
            DeviceType::IPad
        } else if IOS_API_IDS.contains(&api_id) {
            DeviceType::IPhone
        } else if let Some(desktop) = detect_desktop() {
            desktop
        } else if either("android") {
            DeviceType::Android
        } else if either("ios") {
            DeviceType::IPhone
        } else {
            DeviceType::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Windows => "windows",
            DeviceType::Mac => "mac",
            DeviceType::Ubuntu => "ubuntu",
            DeviceType::Linux => "linux",
            DeviceType::IPhone => "iphone",
            DeviceType::IPad => "ipad",
            DeviceType::Android => "android",
            DeviceType::Web => "web",
            DeviceType::Chrome => "chrome",
            DeviceType::Edge => "edge",
            DeviceType::Firefox => "firefox",
            DeviceType::Safari => "safari",
            DeviceType::Other => "other",
        }
    }
}

#[cfg(test)]
#[path = "tests/entry_tests.rs"]
mod tests;
