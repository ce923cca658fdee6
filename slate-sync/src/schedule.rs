// Parser for the packed "Game Info" field of a contest salary export.
//
// Format: `AWAY@HOME MM/DD/YYYY H:MMAM ET`, e.g. `BOS@NYK 03/14/2025 7:30PM ET`.
// The time is US Eastern civil time.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use regex::Regex;
use thiserror::Error;

static GAME_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<away>[A-Za-z0-9]+)@(?P<home>[A-Za-z0-9]+)\s+(?P<date>\d{1,2}/\d{1,2}/\d{4})\s+(?P<time>\d{1,2}:\d{2})\s?(?P<ampm>[AaPp][Mm])(?:\s+(?P<zone>[A-Za-z]+))?\s*$",
    )
    .expect("game info pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("game info `{0}` does not match `AWAY@HOME MM/DD/YYYY H:MMAM ET`")]
    Malformed(String),

    #[error("game info `{input}` has an invalid date or time")]
    InvalidDateTime { input: String },

    #[error("game info `{input}` uses unsupported time zone `{zone}`")]
    UnsupportedZone { input: String, zone: String },

    #[error("game info `{input}` names a local time that does not exist in US/Eastern")]
    NonexistentLocalTime { input: String },

    #[error("team `{team}` is on neither side of matchup {away}@{home}")]
    TeamNotInMatchup {
        team: String,
        away: String,
        home: String,
    },
}

/// Today's calendar date in US/Eastern, the league's scheduling zone.
pub fn eastern_today() -> NaiveDate {
    Utc::now().with_timezone(&New_York).date_naive()
}

/// One parsed matchup with its tip-off instant localized to US/Eastern.
#[derive(Debug, Clone, PartialEq)]
pub struct GameInfo {
    pub away: String,
    pub home: String,
    pub tipoff: DateTime<Tz>,
}

impl GameInfo {
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let caps = GAME_INFO
            .captures(input)
            .ok_or_else(|| ScheduleError::Malformed(input.to_string()))?;

        if let Some(zone) = caps.name("zone") {
            let zone = zone.as_str().to_uppercase();
            if !matches!(zone.as_str(), "ET" | "EST" | "EDT") {
                return Err(ScheduleError::UnsupportedZone {
                    input: input.to_string(),
                    zone,
                });
            }
        }

        let invalid = || ScheduleError::InvalidDateTime {
            input: input.to_string(),
        };
        let date = NaiveDate::parse_from_str(&caps["date"], "%m/%d/%Y").map_err(|_| invalid())?;
        let clock = format!("{}{}", &caps["time"], caps["ampm"].to_uppercase());
        let time = NaiveTime::parse_from_str(&clock, "%I:%M%p").map_err(|_| invalid())?;

        // Fall-back hour is ambiguous; take the earlier instant.
        let tipoff = New_York
            .from_local_datetime(&NaiveDateTime::new(date, time))
            .earliest()
            .ok_or_else(|| ScheduleError::NonexistentLocalTime {
                input: input.to_string(),
            })?;

        Ok(Self {
            away: caps["away"].to_uppercase(),
            home: caps["home"].to_uppercase(),
            tipoff,
        })
    }

    /// Calendar date of the game in Eastern time.
    pub fn game_date(&self) -> NaiveDate {
        self.tipoff.date_naive()
    }

    /// The other team in the matchup. A team on neither side is an error
    /// rather than a silent guess.
    pub fn opponent_for(&self, team: &str) -> Result<&str, ScheduleError> {
        if team.eq_ignore_ascii_case(&self.away) {
            Ok(&self.home)
        } else if team.eq_ignore_ascii_case(&self.home) {
            Ok(&self.away)
        } else {
            Err(ScheduleError::TeamNotInMatchup {
                team: team.to_string(),
                away: self.away.clone(),
                home: self.home.clone(),
            })
        }
    }
}
