//! Identifier and timestamp types shared by every store.
//!
//! All identifiers are externally supplied strings. They are validated once,
//! at construction, so stores never see an empty or malformed identifier.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// `chrono` format of a [`KeyTimestamp`]. Underscores replace colons so the
/// value can be used verbatim as a URL path segment.
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H_%M_%S";

fn validate_identifier(field: &'static str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::validation(field, "must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(StorageError::validation(
            field,
            format!("must be at most {MAX_IDENTIFIER_LEN} bytes, got {}", value.len()),
        ));
    }
    if let Some(c) =
        value.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(StorageError::validation(field, format!("invalid character {c:?}")));
    }
    Ok(())
}

/// Defines a validated string identifier newtype.
///
/// Each generated type:
/// - Validates on construction via `new` / `FromStr` / `TryFrom<String>`
/// - Derives `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Serializes transparently as a string and re-validates on deserialize
/// - Implements `Display` and `AsRef<str>`
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier.
            ///
            /// # Errors
            ///
            /// Returns [`StorageError::Validation`] if the value is empty, too
            /// long, or contains characters outside `[A-Za-z0-9._-]`.
            pub fn new(value: impl Into<String>) -> Result<Self, StorageError> {
                let value = value.into();
                validate_identifier($field, &value)?;
                Ok(Self(value))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = StorageError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of an application (tenant-facing service) registered with
    /// the identity manager.
    ApplicationId,
    "application_identifier"
);

define_id!(
    /// Identifier of a permittable group: a named bundle of endpoints that a
    /// permission grants access to.
    PermittableGroupId,
    "permittable_group_identifier"
);

define_id!(
    /// Identifier of a user in the external user directory.
    UserId,
    "user_identifier"
);

/// Second-resolution creation time of a signature set.
///
/// Doubles as the set's lookup key and as the key version (`kid`) embedded in
/// issued tokens. Rendered as `YYYY-MM-DDTHH_MM_SS` in UTC; ordering is
/// chronological.
///
/// ```
/// use tessera_storage::KeyTimestamp;
///
/// let ts: KeyTimestamp = "2024-01-15T10_30_00".parse().unwrap();
/// assert_eq!(ts.to_string(), "2024-01-15T10_30_00");
/// assert!("2024-01-15T10:30:00".parse::<KeyTimestamp>().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyTimestamp(DateTime<Utc>);

impl KeyTimestamp {
    /// Truncates `instant` to whole seconds.
    #[must_use]
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        // with_nanosecond(0) only fails for out-of-range values, which 0 is not.
        Self(instant.with_nanosecond(0).unwrap_or(instant))
    }

    /// The current time at second resolution.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Returns the underlying instant.
    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for KeyTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(KEY_TIMESTAMP_FORMAT))
    }
}

impl FromStr for KeyTimestamp {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let naive = NaiveDateTime::parse_from_str(s, KEY_TIMESTAMP_FORMAT).map_err(|e| {
            StorageError::validation("timestamp", format!("'{s}' is not YYYY-MM-DDTHH_MM_SS: {e}"))
        })?;
        // Reject trailing fractions or alternate spellings that chrono tolerates.
        let parsed = Self(naive.and_utc());
        if parsed.to_string() != s {
            return Err(StorageError::validation("timestamp", format!("'{s}' is not canonical")));
        }
        Ok(parsed)
    }
}

impl TryFrom<String> for KeyTimestamp {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyTimestamp> for String {
    fn from(ts: KeyTimestamp) -> Self {
        ts.to_string()
    }
}
