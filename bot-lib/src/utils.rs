use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::eyre::Result;
use poise::{CreateReply, serenity_prelude as serenity};

use crate::data::PoiseContext;

pub trait GetRelativeTimestamp {
    fn discord_relative_timestamp(&self) -> String;
    /// Full date and time, rendered in the reader's timezone.
    fn discord_full_timestamp(&self) -> String;
}

impl GetRelativeTimestamp for DateTime<Utc> {
    fn discord_relative_timestamp(&self) -> String {
        format!("<t:{}:R>", self.timestamp())
    }

    fn discord_full_timestamp(&self) -> String {
        format!("<t:{}:f>", self.timestamp())
    }
}

impl GetRelativeTimestamp for serenity::Timestamp {
    fn discord_relative_timestamp(&self) -> String {
        format!("<t:{}:R>", self.unix_timestamp())
    }

    fn discord_full_timestamp(&self) -> String {
        format!("<t:{}:f>", self.unix_timestamp())
    }
}

pub fn timestamp_to_utc(timestamp: &serenity::Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// "3 days ago" style age, picking the largest unit that fits.
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - then).max(TimeDelta::zero());

    let (amount, unit) = if elapsed.num_days() >= 365 {
        (elapsed.num_days() / 365, "year")
    } else if elapsed.num_days() >= 30 {
        (elapsed.num_days() / 30, "month")
    } else if elapsed.num_days() >= 1 {
        (elapsed.num_days(), "day")
    } else if elapsed.num_hours() >= 1 {
        (elapsed.num_hours(), "hour")
    } else if elapsed.num_minutes() >= 1 {
        (elapsed.num_minutes(), "minute")
    } else {
        return "just now".to_owned();
    };

    let plural = if amount == 1 { "" } else { "s" };
    format!("{amount} {unit}{plural} ago")
}

/// `HH:MM:SS`, hours are not wrapped at 24.
pub fn format_hms(duration: TimeDelta) -> String {
    let seconds = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// `1d 2h 3m`, minutes are always shown.
pub fn format_uptime(duration: TimeDelta) -> String {
    let minutes = duration.num_minutes().max(0);
    let (days, hours, minutes) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{hours}h"));
    }
    parts.push(format!("{minutes}m"));

    parts.join(" ")
}

/// Shortens `text` to at most `max` characters, marking the cut with "...".
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }

    let mut clipped: String = text.chars().take(max.saturating_sub(3)).collect();
    clipped.push_str("...");
    clipped
}

pub trait SendReplyEphemeral {
    async fn reply_ephemeral(self, message: impl Into<String>) -> Result<()>;
}

impl SendReplyEphemeral for PoiseContext<'_> {
    async fn reply_ephemeral(self, message: impl Into<String>) -> Result<()> {
        self.send(CreateReply::default().content(message).ephemeral(true))
            .await?;

        Ok(())
    }
}

/// Discord answered 403 or 404, the thing we poked is gone or off limits.
pub fn is_missing_or_forbidden(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if matches!(response.status_code.as_u16(), 403 | 404)
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_http_answers_mean_missing() {
        assert!(!is_missing_or_forbidden(&serenity::Error::Other(
            "gateway hiccup"
        )));
    }

    #[test]
    fn time_ago_picks_largest_unit() {
        let now = Utc::now();

        assert_eq!(format_time_ago(now, now), "just now");
        assert_eq!(
            format_time_ago(now - TimeDelta::minutes(1), now),
            "1 minute ago"
        );
        assert_eq!(
            format_time_ago(now - TimeDelta::hours(5), now),
            "5 hours ago"
        );
        assert_eq!(format_time_ago(now - TimeDelta::days(40), now), "1 month ago");
        assert_eq!(
            format_time_ago(now - TimeDelta::days(800), now),
            "2 years ago"
        );
    }

    #[test]
    fn session_length_is_hms() {
        assert_eq!(format_hms(TimeDelta::seconds(0)), "00:00:00");
        assert_eq!(format_hms(TimeDelta::seconds(3725)), "01:02:05");
        assert_eq!(format_hms(TimeDelta::hours(30)), "30:00:00");
    }

    #[test]
    fn uptime_skips_leading_zero_units() {
        assert_eq!(format_uptime(TimeDelta::seconds(59)), "0m");
        assert_eq!(format_uptime(TimeDelta::minutes(61)), "1h 1m");
        assert_eq!(format_uptime(TimeDelta::minutes(1440 + 5)), "1d 0h 5m");
    }

    #[test]
    fn clip_counts_characters() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghij", 6), "abc...");
        assert_eq!(clip("ééééééé", 5), "éé...");
    }
}
