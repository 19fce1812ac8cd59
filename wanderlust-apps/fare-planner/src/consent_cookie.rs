//!  Wanderlust Fare Planner
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! SOCS consent cookie sent with search requests.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{Datelike, NaiveDate};
use prost::Message;

/// Stable trailing bytes observed in browser-issued cookies.
const CONSENT_BLOB: &[u8] = &[0x08, 0x80, 0xc4, 0xf6, 0xca];

#[derive(Clone, PartialEq, prost::Message)]
struct SocsCookie {
    #[prost(string, tag = "2")]
    server_tag: String,
    #[prost(bytes = "vec", tag = "3")]
    blob: Vec<u8>,
}

/// Base64 SOCS value stamped with the day before `today`.
fn socs_value(today: NaiveDate) -> String {
    let stamp = today.pred_opt().unwrap_or(today);
    let cookie = SocsCookie {
        server_tag: format!(
            "boq_identityfrontenduiserver_{}{:02}{:02}.03_p0en",
            stamp.year(),
            stamp.month(),
            stamp.day()
        ),
        blob: CONSENT_BLOB.to_vec(),
    };
    STANDARD.encode(cookie.encode_to_vec())
}

/// `Cookie` header value: pending consent plus the SOCS value.
pub fn cookie_header(today: NaiveDate) -> String {
    format!("CONSENT=PENDING+987; SOCS={}", socs_value(today))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socs_is_length_delimited_tag_two() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let decoded = STANDARD.decode(socs_value(today)).unwrap();
        assert_eq!(decoded[0] >> 3, 2);
        assert_eq!(decoded[0] & 0x07, 2);

        let cookie = SocsCookie::decode(decoded.as_slice()).unwrap();
        assert_eq!(cookie.server_tag, "boq_identityfrontenduiserver_20260228.03_p0en");
        assert_eq!(cookie.blob, CONSENT_BLOB);
    }

    #[test]
    fn header_format() {
        let header = cookie_header(NaiveDate::from_ymd_opt(2026, 5, 10).unwrap());
        assert!(header.starts_with("CONSENT=PENDING+987; SOCS="));
    }
}
