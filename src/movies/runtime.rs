use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub const INVALID_RUNTIME_FORMAT: &str = "invalid runtime format";

/// Running time in minutes. Travels over JSON as the string `"<n> mins"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Runtime {
    pub fn parse(raw: &str) -> Option<Self> {
        let (minutes, unit) = raw.split_once(' ')?;
        if unit != "mins" {
            return None;
        }
        minutes.parse::<i32>().ok().map(Runtime)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuntimeVisitor;

        impl<'de> de::Visitor<'de> for RuntimeVisitor {
            type Value = Runtime;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string of the form \"<n> mins\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Runtime, E> {
                Runtime::parse(v).ok_or_else(|| E::custom(INVALID_RUNTIME_FORMAT))
            }
        }

        deserializer.deserialize_str(RuntimeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_unit() {
        assert_eq!(serde_json::to_string(&Runtime(102)).unwrap(), "\"102 mins\"");
    }

    #[test]
    fn accepts_only_mins_string() {
        let ok: Runtime = serde_json::from_str("\"107 mins\"").unwrap();
        assert_eq!(ok, Runtime(107));

        for bad in ["107", "\"107\"", "\"107 minutes\"", "\"abc mins\"", "\"107  mins\""] {
            let err = serde_json::from_str::<Runtime>(bad).unwrap_err();
            if bad.starts_with('"') {
                assert!(err.to_string().contains(INVALID_RUNTIME_FORMAT), "{bad}: {err}");
            }
        }
    }
}
