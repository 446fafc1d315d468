use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

pub fn validate_slack_id(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Ok(());
    }
    Err(format!("{kind} must use only ASCII letters and digits"))
}

macro_rules! define_slack_id {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                validate_slack_id($kind, raw)?;
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(|err| {
                    D::Error::custom(format!("invalid {} `{}`: {}", $kind, raw, err))
                })
            }
        }
    };
}

define_slack_id!(TeamId, "team id");
define_slack_id!(UserId, "user id");
define_slack_id!(ChannelId, "channel id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_ids_reject_empty_and_punctuation() {
        assert!(TeamId::parse("T0123ABC").is_ok());
        assert!(TeamId::parse("").is_err());
        assert!(ChannelId::parse("C01:1700").is_err());
    }

    #[test]
    fn deserialize_reports_kind_and_raw_value() {
        let err = serde_json::from_str::<UserId>("\"U 1\"").expect_err("invalid id");
        assert!(err.to_string().contains("invalid user id `U 1`"));
    }
}
