//! Wire codec for the per-device payload.
//!
//! The stored value is the protobuf encoding of [`UserApps`]; the cache key
//! is `"<dev_type>:<dev_id>"`. Encoding is pure and deterministic.

use anyhow::{anyhow, ensure, Result};
use prost::Message;

use crate::record::{parse_line, AppsInstalled};

/// Schema-described payload stored under each device key.
#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(double, tag = "1")]
    pub lat: f64,
    #[prost(double, tag = "2")]
    pub lon: f64,
    #[prost(uint32, repeated, tag = "3")]
    pub apps: Vec<u32>,
}

/// Builds the cache key and encoded payload for one record.
pub fn pack_record(rec: &AppsInstalled) -> (String, Vec<u8>) {
    let ua = UserApps {
        lat: rec.lat,
        lon: rec.lon,
        apps: rec.apps.clone(),
    };
    let key = format!("{}:{}", rec.dev_type, rec.dev_id);
    (key, ua.encode_to_vec())
}

/// Round-trip self-test behind `--test`: parse canonical sample lines,
/// encode, decode, and compare.
pub fn self_test() -> Result<()> {
    const SAMPLE: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
                          gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424";
    for line in SAMPLE.lines() {
        let rec = parse_line(line.trim())
            .into_record()
            .ok_or_else(|| anyhow!("sample line failed to parse: `{line}`"))?;
        let (_, payload) = pack_record(&rec);
        let decoded = UserApps::decode(payload.as_slice())?;
        ensure!(
            decoded.lat == rec.lat && decoded.lon == rec.lon && decoded.apps == rec.apps,
            "decoded payload does not match source record for `{line}`"
        );
    }
    Ok(())
}
