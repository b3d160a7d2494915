//! Type-safe, prefixed identifiers for the entities this server owns.
//!
//! Built on the [TypeID specification](https://github.com/jetpack-io/typeid/blob/main/spec/SPEC.md)
//! via the `mti` crate: every id is a prefix plus a base32-encoded UUID, so
//! `ep_01h455vb4pex5vsknk084sn02q` is recognizable as an endpoint id at a
//! glance and cannot be confused with a rule or log id at the type level.
//!
//! Endpoints and rules use UUIDv4 (creation order is tracked by a separate
//! `created_at` column). Request logs use UUIDv7 so that the id itself sorts
//! chronologically, which matters for the log table's timestamp-descending
//! queries and for the inspector hub's history replay.

use mti::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing a typed id fails.
#[derive(Debug, thiserror::Error)]
pub enum IdParseError {
    #[error("failed to parse id: {0}")]
    Parse(#[from] MagicTypeIdError),

    #[error("invalid prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix { expected: String, actual: String },
}

macro_rules! define_typed_id {
    ($name:ident, $prefix:literal, $version:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(MagicTypeId);

        impl $name {
            /// The id's fixed prefix.
            pub const PREFIX: &'static str = $prefix;

            #[must_use]
            pub fn new() -> Self {
                Self(Self::PREFIX.create_type_id::<$version>())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            #[must_use]
            pub fn prefix(&self) -> &str {
                self.0.prefix().as_str()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mti = MagicTypeId::from_str(s).map_err(IdParseError::Parse)?;
                if mti.prefix().as_str() != Self::PREFIX {
                    return Err(IdParseError::InvalidPrefix {
                        expected: Self::PREFIX.to_string(),
                        actual: mti.prefix().as_str().to_string(),
                    });
                }
                Ok(Self(mti))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> <sqlx::Sqlite as sqlx::Database>::TypeInfo {
                <String as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <String as sqlx::Encode<'q, sqlx::Sqlite>>::encode(self.as_str().to_owned(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
            ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
                let s = <String as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
                Self::from_str(&s).map_err(|e| e.into())
            }
        }
    };
}

define_typed_id!(EndpointId, "ep", V4, "Identifies a registered endpoint.");
define_typed_id!(RuleId, "rul", V4, "Identifies a conditional rule attached to an endpoint.");
define_typed_id!(RequestLogId, "req", V7, "Identifies an immutable request log entry.");

/// A tenant identifier.
///
/// Unlike the other ids, tenants are not generated: the identifier is the
/// slug a client supplies (the first path segment under `/m/{tenant}/...`,
/// or the leftmost host label). This type exists to make "a validated,
/// non-reserved tenant slug" a type rather than a bare `String` passed
/// around uncheckeded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a raw slug without the reserved-name/emptiness check
    /// [`validate_tenant_id`] performs. Used by the internal admin surface,
    /// which addresses tenants directly rather than through the public
    /// routing policy those checks exist for.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// Validates and wraps a raw tenant slug, rejecting empty or reserved names.
///
/// This is the single precondition §6 reduces host-routing policy to.
pub fn validate_tenant_id(raw: &str, reserved: &[String]) -> Result<TenantId, crate::error::Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(crate::error::Error::NotFound("tenant".into()));
    }
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(trimmed)) {
        return Err(crate::error::Error::NotFound("tenant".into()));
    }
    Ok(TenantId(trimmed.to_string()))
}
