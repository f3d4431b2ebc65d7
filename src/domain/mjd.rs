//! Modified Julian Date helpers.
//!
//! Observation nights are identified by an integer MJD. The observatory's
//! "SJD" convention shifts the day boundary by 0.3 days so that a whole night
//! shares one number; `current_mjd` follows it.

use chrono::{Duration, NaiveDate, Utc};

/// TAI - UTC offset (seconds) used by the observatory clock.
const TAI_UTC: i64 = 34;

/// MJD of the Unix epoch, shifted by the SJD day boundary.
const UNIX_EPOCH_SJD: f64 = 40587.3;

fn mjd_zero() -> NaiveDate {
    NaiveDate::from_ymd_opt(1858, 11, 17).unwrap_or_default()
}

/// SJD of a Unix timestamp (seconds).
pub fn sjd_from_unix(unix_seconds: i64) -> u32 {
    let days = (unix_seconds + TAI_UTC) as f64 / 86400.0 + UNIX_EPOCH_SJD;
    days.floor().max(0.0) as u32
}

/// SJD of the current night.
pub fn current_mjd() -> u32 {
    sjd_from_unix(Utc::now().timestamp())
}

/// Calendar date (UTC) on which an MJD starts, `None` past chrono's date range.
pub fn mjd_to_date(mjd: u32) -> Option<NaiveDate> {
    mjd_zero().checked_add_signed(Duration::days(i64::from(mjd)))
}

pub fn date_to_mjd(date: NaiveDate) -> Option<u32> {
    u32::try_from((date - mjd_zero()).num_days()).ok()
}
