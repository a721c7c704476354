use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($s) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ModelError::InvalidEnum {
                    field: stringify!($name).into(),
                    value: s.into(),
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Gender {
    Male => "Male",
    Female => "Female",
});

/// Brand/generic classification reported by the search provider.
///
/// The provider also emits `Synonym` and may add labels later; anything that
/// is not a brand or a generic name lands in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DrugKind {
    Brand,
    Generic,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DrugKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brand => "Brand",
            Self::Generic => "Generic",
            Self::Unknown => "Unknown",
        }
    }
}

/// Severity bucket for an interaction finding.
///
/// The service returns free text ("High", "Major", "moderate risk", ...).
/// Ordering is by clinical weight: `Unknown < Low < Moderate < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Moderate,
    High,
}

impl Severity {
    /// Classify a free-text severity label.
    pub fn classify(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.contains("high") || label.contains("severe") || label.contains("major") {
            Self::High
        } else if label.contains("mod") {
            Self::Moderate
        } else if label.contains("low") || label.contains("minor") {
            Self::Low
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}
