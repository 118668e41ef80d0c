//! Bounded string identifiers used as key fields across every topic.
//!
//! Each identifier is a newtype over `String` with an explicit length cap
//! matching the wire contract.  Construction is fail-closed: an over-length
//! value is rejected with [`VitaError::IdentifierTooLong`], never silently
//! truncated.  Deserialization goes through the same check via
//! `#[serde(try_from = "String")]`, so malformed input cannot enter the
//! system through the wire either.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::VitaError;

macro_rules! bounded_ident {
    ($(#[$meta:meta])* $name:ident, $max:expr) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, JsonSchema,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Maximum length in bytes accepted by the wire contract.
            pub const MAX_LEN: usize = $max;

            /// Validate and wrap `value`.
            ///
            /// # Errors
            ///
            /// [`VitaError::IdentifierTooLong`] when `value` exceeds
            /// [`Self::MAX_LEN`].
            pub fn new(value: impl Into<String>) -> Result<Self, VitaError> {
                let value = value.into();
                if value.len() > Self::MAX_LEN {
                    return Err(VitaError::IdentifierTooLong {
                        what: stringify!($name),
                        max: Self::MAX_LEN,
                        actual: value.len(),
                    });
                }
                Ok(Self(value))
            }

            /// Construct from a literal known to satisfy the length cap.
            ///
            /// Used by the nomenclature tables; debug builds assert the cap.
            pub(crate) fn from_static(value: &'static str) -> Self {
                debug_assert!(value.len() <= Self::MAX_LEN);
                Self(value.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl TryFrom<String> for $name {
            type Error = VitaError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

bounded_ident!(
    /// Unique identifier of a participant (device or supervisory application).
    DeviceId,
    64
);

bounded_ident!(
    /// Standard nomenclature code of a metric (e.g. `MDC_PULS_OXIM_SAT_O2`).
    MetricId,
    64
);

bounded_ident!(
    /// Vendor-private metric label.  Informational only: it may be empty and
    /// no consumer is allowed to branch on its contents.
    VendorMetricId,
    64
);

bounded_ident!(
    /// Standard nomenclature code of a unit of measure (e.g. `MDC_DIM_PERCENT`).
    UnitId,
    64
);

bounded_ident!(
    /// Free-form identifier of an alarm condition, unique per device.
    AlertId,
    128
);

bounded_ident!(
    /// Patient medical record number.
    MedicalRecordNumber,
    64
);

bounded_ident!(
    /// Short human-readable label (manufacturer, model, drug name, ...).
    DisplayName,
    128
);

bounded_ident!(
    /// Descriptive alarm text shown to clinicians.
    AlertText,
    256
);

bounded_ident!(
    /// ISO-8601 calendar date rendered as text (`YYYY-MM-DD`).
    IsoDate,
    64
);
