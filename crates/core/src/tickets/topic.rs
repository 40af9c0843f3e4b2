use chrono::{DateTime, Utc};

use crate::domain::ids::UserId;
use crate::errors::TicketError;

pub const CREATOR_LABEL: &str = "チケット作成者ID:";
pub const CREATED_AT_LABEL: &str = "作成日時:";

/// The topic is the only durable link between a ticket channel and its creator.
pub fn format_topic(creator: UserId, created_at: DateTime<Utc>) -> String {
    format!(
        "{CREATOR_LABEL} {creator} | {CREATED_AT_LABEL} {}",
        created_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// `Ok(None)` when the topic carries no creator label at all.
pub fn parse_creator_id(topic: &str) -> Result<Option<UserId>, TicketError> {
    let Some((_, rest)) = topic.split_once(CREATOR_LABEL) else {
        return Ok(None);
    };

    let raw = rest.split('|').next().unwrap_or_default().trim();
    raw.parse::<u64>().map(|id| Some(UserId(id))).map_err(|error| TicketError::TopicParse {
        topic: topic.to_owned(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_topic, parse_creator_id};
    use crate::domain::ids::UserId;
    use crate::errors::{ErrorClass, TicketError};

    #[test]
    fn formats_creator_and_utc_timestamp_to_the_second() {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).single().expect("valid date");
        assert_eq!(
            format_topic(UserId(42), created_at),
            "チケット作成者ID: 42 | 作成日時: 2025-03-14 09:26:53 UTC"
        );
    }

    #[test]
    fn parses_creator_id_before_separator() {
        let topic = "チケット作成者ID: 123456789 | 作成日時: 2025-01-01 00:00:00 UTC";
        assert_eq!(parse_creator_id(topic).expect("parse"), Some(UserId(123456789)));
    }

    #[test]
    fn parses_creator_id_without_separator() {
        assert_eq!(parse_creator_id("チケット作成者ID:77").expect("parse"), Some(UserId(77)));
    }

    #[test]
    fn topic_without_label_means_unknown_creator() {
        assert_eq!(parse_creator_id("general support chat").expect("parse"), None);
        assert_eq!(parse_creator_id("").expect("parse"), None);
    }

    #[test]
    fn malformed_creator_id_is_a_parse_error() {
        let error = parse_creator_id("チケット作成者ID: alice | 作成日時: now")
            .expect_err("non-numeric id should fail");
        assert!(matches!(error, TicketError::TopicParse { .. }));
        assert_eq!(error.class(), ErrorClass::Parse);
    }
}
