//! The unit of work: one parsed appsinstalled record, and the tolerant
//! line parser that produces it.

use std::fmt;

/// Closed set of device tags, each bound to one shard endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Idfa,
    Gaid,
    Adid,
    Dvid,
}

impl DeviceType {
    pub const ALL: [DeviceType; 4] = [
        DeviceType::Idfa,
        DeviceType::Gaid,
        DeviceType::Adid,
        DeviceType::Dvid,
    ];

    /// Parses the wire tag; anything outside the closed set is `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "idfa" => Some(DeviceType::Idfa),
            "gaid" => Some(DeviceType::Gaid),
            "adid" => Some(DeviceType::Adid),
            "dvid" => Some(DeviceType::Dvid),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            DeviceType::Idfa => "idfa",
            DeviceType::Gaid => "gaid",
            DeviceType::Adid => "adid",
            DeviceType::Dvid => "dvid",
        }
    }

    /// Stable position in shard-indexed arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One installed-apps record as read from a log line.
///
/// `lat`/`lon` are advisory; a record with zeroed geo is still valid.
#[derive(Debug, Clone, PartialEq)]
pub struct AppsInstalled {
    pub dev_type: DeviceType,
    pub dev_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<u32>,
}

/// Outcome of parsing one non-blank input line.
///
/// Only structural problems withhold a record; numeric trouble is tolerated
/// and reported through the variant so callers can account for it without
/// losing the record.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Valid(AppsInstalled),
    /// Non-numeric app ids were dropped; the record is still usable.
    FilteredApps(AppsInstalled),
    /// Geo fields failed to parse and were zeroed; the record is still usable.
    ZeroedGeo(AppsInstalled),
    /// The device tag is outside the closed set; carries the offending tag.
    UnknownDevice(String),
    /// Wrong field count or empty identifiers.
    Invalid,
}

impl ParsedLine {
    /// The record, if this outcome produced one.
    pub fn into_record(self) -> Option<AppsInstalled> {
        match self {
            ParsedLine::Valid(rec)
            | ParsedLine::FilteredApps(rec)
            | ParsedLine::ZeroedGeo(rec) => Some(rec),
            ParsedLine::UnknownDevice(_) | ParsedLine::Invalid => None,
        }
    }
}

/// Parses one trimmed, non-blank log line.
///
/// Exactly five tab-separated fields: `dev_type, dev_id, lat, lon, apps`.
/// Apps are comma-separated integers; on a strict-parse failure only the
/// all-digit tokens are kept. Unparseable geo coords default to zero.
pub fn parse_line(line: &str) -> ParsedLine {
    let parts: Vec<&str> = line.split('\t').collect();
    let [dev_type, dev_id, raw_lat, raw_lon, raw_apps] = parts[..] else {
        return ParsedLine::Invalid;
    };
    if dev_type.is_empty() || dev_id.is_empty() {
        return ParsedLine::Invalid;
    }
    let Some(tag) = DeviceType::from_tag(dev_type) else {
        return ParsedLine::UnknownDevice(dev_type.to_string());
    };

    let strict: Result<Vec<u32>, _> = raw_apps
        .split(',')
        .map(|a| a.trim().parse::<u32>())
        .collect();
    let (apps, apps_filtered) = match strict {
        Ok(apps) => (apps, false),
        Err(_) => {
            eprintln!("[INFO] Not all user apps are digits: `{line}`");
            let digits_only = raw_apps
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty() && a.bytes().all(|b| b.is_ascii_digit()))
                .filter_map(|a| a.parse().ok())
                .collect();
            (digits_only, true)
        }
    };

    // Geo is all-or-nothing: a bad latitude zeroes the longitude too.
    let geo = raw_lat
        .trim()
        .parse::<f64>()
        .and_then(|lat| raw_lon.trim().parse::<f64>().map(|lon| (lat, lon)));
    let ((lat, lon), geo_zeroed) = match geo {
        Ok(pair) => (pair, false),
        Err(_) => {
            eprintln!("[INFO] Invalid geo coords: `{line}`");
            ((0.0, 0.0), true)
        }
    };

    let rec = AppsInstalled {
        dev_type: tag,
        dev_id: dev_id.to_string(),
        lat,
        lon,
        apps,
    };
    if apps_filtered {
        ParsedLine::FilteredApps(rec)
    } else if geo_zeroed {
        ParsedLine::ZeroedGeo(rec)
    } else {
        ParsedLine::Valid(rec)
    }
}
