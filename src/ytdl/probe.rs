use std::fmt;

use serde::Deserialize;

/// The fields of `yt-dlp -j` output needed to vet a download.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbeInfo {
    pub id: String,
    /// Seconds; absent for some live streams.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub is_live: Option<bool>,
    #[serde(default)]
    pub was_live: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeRejection {
    Live,
    MissingDuration,
    TooLong { duration_secs: f64, max_secs: u64 },
}

impl fmt::Display for ProbeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeRejection::Live => f.write_str("video is a stream"),
            ProbeRejection::MissingDuration => f.write_str("video has no duration"),
            ProbeRejection::TooLong {
                duration_secs,
                max_secs,
            } => write!(
                f,
                "video is longer than configured max length ({}/{} minutes)",
                (duration_secs / 60.0).round(),
                max_secs / 60
            ),
        }
    }
}

impl ProbeInfo {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw.trim())
    }

    /// Checks the probed video against the download policy. `max_secs == 0` means no limit.
    pub fn check(&self, max_secs: u64) -> Result<(), ProbeRejection> {
        if self.is_live.unwrap_or(false) || self.was_live.unwrap_or(false) {
            return Err(ProbeRejection::Live);
        }
        let duration_secs = self.duration.ok_or(ProbeRejection::MissingDuration)?;
        if max_secs > 0 && duration_secs > max_secs as f64 {
            return Err(ProbeRejection::TooLong {
                duration_secs,
                max_secs,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_fields_it_needs() {
        let info = ProbeInfo::parse(
            r#"{"id":"GoSo8YOKSAE","title":"x","duration":212.0,"is_live":false,"formats":[]}"#,
        )
        .unwrap();
        assert_eq!(info.id, "GoSo8YOKSAE");
        assert_eq!(info.duration, Some(212.0));
        assert_eq!(info.was_live, None);
        assert_eq!(info.check(3600), Ok(()));
    }

    #[test]
    fn null_fields_are_absent() {
        let info = ProbeInfo::parse(r#"{"id":"abc","duration":null,"is_live":null}"#).unwrap();
        assert_eq!(info.check(0), Err(ProbeRejection::MissingDuration));
    }

    #[test]
    fn missing_id_fails_to_parse() {
        assert!(ProbeInfo::parse(r#"{"duration":10}"#).is_err());
    }

    #[test]
    fn live_streams_are_rejected() {
        let info = ProbeInfo::parse(r#"{"id":"abc","duration":10,"is_live":true}"#).unwrap();
        assert_eq!(info.check(0), Err(ProbeRejection::Live));
        let info = ProbeInfo::parse(r#"{"id":"abc","duration":10,"was_live":true}"#).unwrap();
        assert_eq!(info.check(0), Err(ProbeRejection::Live));
    }

    #[test]
    fn length_limit_applies_only_when_set() {
        let info = ProbeInfo::parse(r#"{"id":"abc","duration":7201}"#).unwrap();
        assert!(matches!(info.check(7200), Err(ProbeRejection::TooLong { .. })));
        assert_eq!(info.check(0), Ok(()));
    }
}
