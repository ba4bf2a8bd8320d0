use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::fingerprint::{human_uid, visitor_fingerprint};

/// Stored datetime layout. Fixed width, so string comparison is chronological.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `deleted_at` of a live record.
pub const MAX_DATETIME: &str = "9999-12-31 23:59:59";

/// Placeholder for "no datetime".
pub const NULL_DATETIME: &str = "0002-01-01 00:00:00";

pub fn now_datetime_string() -> String {
    format_datetime(Utc::now())
}

pub fn format_datetime(at: DateTime<Utc>) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

/// Bring a user-supplied date bound into the stored layout.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and bare
/// `YYYY-MM-DD`. A bare date becomes the start of the day, or the end of the
/// day when `end_of_day` is set. Anything else is passed through unchanged.
pub fn normalize_datetime(value: &str, end_of_day: bool) -> String {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return format_datetime(dt.with_timezone(&Utc));
    }
    if let Some(dt) = parse_datetime(value) {
        return format_datetime(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return format_datetime(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = if end_of_day { "23:59:59" } else { "00:00:00" };
        return format!("{} {time}", date.format("%Y-%m-%d"));
    }
    value.to_string()
}

/// Char-aware prefix of at most `max` characters.
pub(crate) fn clip(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Generates the column constants, the record struct and its accessors from
/// one column list so the three never drift apart.
macro_rules! visitor_columns {
    ($( $field:ident, $setter:ident, $column:ident = $name:literal; )*) => {
        $(
            pub const $column: &str = $name;
        )*

        /// All columns in table order.
        pub const COLUMNS: &[&str] = &[$( $name ),*];

        /// One page-view event.
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct Visitor {
            $(
                $field: String,
            )*
            #[serde(skip)]
            dirty: BTreeSet<&'static str>,
        }

        impl Visitor {
            $(
                pub fn $field(&self) -> &str {
                    &self.$field
                }

                pub fn $setter(&mut self, value: impl Into<String>) -> &mut Self {
                    self.$field = value.into();
                    self.dirty.insert($name);
                    self
                }
            )*

            /// Value of a column by name, `None` for unknown columns.
            pub fn get(&self, column: &str) -> Option<&str> {
                match column {
                    $( $name => Some(self.$field.as_str()), )*
                    _ => None,
                }
            }

            fn assign(&mut self, column: &str, value: String) -> bool {
                match column {
                    $( $name => { self.$field = value; true } )*
                    _ => false,
                }
            }
        }
    };
}

visitor_columns! {
    id, set_id, COLUMN_ID = "id";
    path, set_path, COLUMN_PATH = "path";
    ip_address, set_ip_address, COLUMN_IP_ADDRESS = "ip_address";
    country, set_country, COLUMN_COUNTRY = "country";
    fingerprint, set_fingerprint, COLUMN_FINGERPRINT = "fingerprint";
    user_accept_language, set_user_accept_language, COLUMN_USER_ACCEPT_LANGUAGE = "user_accept_language";
    user_accept_encoding, set_user_accept_encoding, COLUMN_USER_ACCEPT_ENCODING = "user_accept_encoding";
    user_agent, set_user_agent, COLUMN_USER_AGENT = "user_agent";
    user_os, set_user_os, COLUMN_USER_OS = "user_os";
    user_os_version, set_user_os_version, COLUMN_USER_OS_VERSION = "user_os_version";
    user_device, set_user_device, COLUMN_USER_DEVICE = "user_device";
    user_device_type, set_user_device_type, COLUMN_USER_DEVICE_TYPE = "user_device_type";
    user_browser, set_user_browser, COLUMN_USER_BROWSER = "user_browser";
    user_browser_version, set_user_browser_version, COLUMN_USER_BROWSER_VERSION = "user_browser_version";
    user_referrer, set_user_referrer, COLUMN_USER_REFERRER = "user_referrer";
    created_at, set_created_at, COLUMN_CREATED_AT = "created_at";
    updated_at, set_updated_at, COLUMN_UPDATED_AT = "updated_at";
    deleted_at, set_deleted_at, COLUMN_DELETED_AT = "deleted_at";
}

/// Maximum stored length per column, in characters.
pub fn column_max_len(column: &str) -> usize {
    match column {
        COLUMN_PATH => 512,
        COLUMN_COUNTRY => 2,
        COLUMN_FINGERPRINT => 32,
        COLUMN_USER_AGENT | COLUMN_USER_REFERRER => 255,
        COLUMN_USER_OS | COLUMN_USER_OS_VERSION | COLUMN_USER_DEVICE_TYPE => 12,
        COLUMN_USER_BROWSER_VERSION => 24,
        _ => 40,
    }
}

pub fn is_known_column(column: &str) -> bool {
    COLUMNS.contains(&column)
}

impl Visitor {
    /// Fresh record with a new id, empty fields and "now" timestamps.
    /// Every column is dirty.
    pub fn new() -> Self {
        let now = now_datetime_string();
        let mut visitor = Visitor::default();
        visitor
            .set_id(human_uid())
            .set_created_at(now.clone())
            .set_updated_at(now)
            .set_deleted_at(MAX_DATETIME);
        visitor.dirty.extend(COLUMNS.iter().copied());
        visitor
    }

    /// Hydrate from a column → value map read from storage. Nothing is dirty.
    pub fn from_existing_data(data: HashMap<String, String>) -> Self {
        let mut visitor = Visitor::default();
        for (column, value) in data {
            visitor.assign(&column, value);
        }
        visitor
    }

    /// Every column with its value, in table order.
    pub fn data(&self) -> Vec<(&'static str, String)> {
        COLUMNS
            .iter()
            .map(|&column| (column, self.get(column).unwrap_or_default().to_string()))
            .collect()
    }

    /// Only the columns changed since the last save, in table order.
    pub fn data_changed(&self) -> Vec<(&'static str, String)> {
        COLUMNS
            .iter()
            .filter(|column| self.dirty.contains(*column))
            .map(|&column| (column, self.get(column).unwrap_or_default().to_string()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn mark_as_not_dirty(&mut self) -> &mut Self {
        self.dirty.clear();
        self
    }

    pub fn created_at_time(&self) -> Option<DateTime<Utc>> {
        parse_datetime(&self.created_at)
    }

    pub fn updated_at_time(&self) -> Option<DateTime<Utc>> {
        parse_datetime(&self.updated_at)
    }

    pub fn deleted_at_time(&self) -> Option<DateTime<Utc>> {
        parse_datetime(&self.deleted_at)
    }

    /// Fingerprint of `ip_address + user_agent`.
    pub fn fingerprint_calculate(&self) -> String {
        visitor_fingerprint(&self.ip_address, &self.user_agent)
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.deleted_at.as_str() <= now_datetime_string().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_visitor_defaults() {
        let v = Visitor::new();
        assert_eq!(v.id().len(), 32);
        assert_eq!(v.deleted_at(), MAX_DATETIME);
        assert_eq!(v.path(), "");
        assert!(v.created_at_time().is_some());
        assert!(!v.is_soft_deleted());
        assert_eq!(v.data_changed().len(), COLUMNS.len());
    }

    #[test]
    fn test_existing_data_is_clean() {
        let mut data = HashMap::new();
        data.insert("id".to_string(), "abc".to_string());
        data.insert("path".to_string(), "/pricing".to_string());
        data.insert("not_a_column".to_string(), "x".to_string());
        let v = Visitor::from_existing_data(data);
        assert_eq!(v.id(), "abc");
        assert_eq!(v.path(), "/pricing");
        assert!(!v.is_dirty());
        assert!(v.data_changed().is_empty());
    }

    #[test]
    fn test_setters_track_changes_in_column_order() {
        let mut v = Visitor::from_existing_data(HashMap::new());
        v.set_user_referrer("https://news.example").set_path("/a");
        let changed: Vec<&str> = v.data_changed().iter().map(|(c, _)| *c).collect();
        assert_eq!(changed, vec![COLUMN_PATH, COLUMN_USER_REFERRER]);

        v.mark_as_not_dirty();
        assert!(!v.is_dirty());
    }

    #[test]
    fn test_soft_deleted_when_deleted_at_in_past() {
        let mut v = Visitor::new();
        v.set_deleted_at("2000-01-01 00:00:00");
        assert!(v.is_soft_deleted());
        v.set_deleted_at(NULL_DATETIME);
        assert!(v.is_soft_deleted());
    }

    #[test]
    fn test_fingerprint_calculate_uses_ip_and_agent() {
        let mut a = Visitor::new();
        a.set_ip_address("1.2.3.4").set_user_agent("UA");
        let mut b = Visitor::new();
        b.set_ip_address("1.2.3.4").set_user_agent("UA");
        assert_eq!(a.fingerprint_calculate(), b.fingerprint_calculate());
        b.set_ip_address("1.2.3.5");
        assert_ne!(a.fingerprint_calculate(), b.fingerprint_calculate());
    }

    #[test]
    fn test_normalize_datetime() {
        assert_eq!(
            normalize_datetime("2024-03-01", false),
            "2024-03-01 00:00:00"
        );
        assert_eq!(normalize_datetime("2024-03-01", true), "2024-03-01 23:59:59");
        assert_eq!(
            normalize_datetime("2024-03-01T10:00:00+02:00", false),
            "2024-03-01 08:00:00"
        );
        assert_eq!(
            normalize_datetime("2024-03-01T10:00:00", true),
            "2024-03-01 10:00:00"
        );
        assert_eq!(
            normalize_datetime(" 2024-03-01 10:11:12 ", false),
            "2024-03-01 10:11:12"
        );
        assert_eq!(normalize_datetime("garbage", false), "garbage");
    }

    #[test]
    fn test_clip_is_char_aware() {
        assert_eq!(clip("héllo", 2), "hé");
        assert_eq!(clip("abc", 10), "abc");
    }
}
