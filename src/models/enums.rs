use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("invalid {field} value: {value:?}")]
pub struct InvalidEnum {
    pub field: &'static str,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(PageClass {
    Table => "table",
    Narrative => "narrative",
});

str_enum!(BatchedPhaseKind {
    Vendor => "vendor",
    Subservice => "subservice",
    UserEntity => "user_entity",
});

str_enum!(Phase {
    AuditorOpinion => "auditor_opinion",
    VendorControls => "vendor_controls",
    Exceptions => "exceptions",
    SubserviceControls => "subservice_controls",
    UserEntityControls => "user_entity_controls",
    CriteriaMappings => "criteria_mappings",
    Merge => "merge",
    Done => "done",
});

impl Phase {
    /// Execution order of an extraction run.
    pub const ORDER: [Phase; 8] = [
        Phase::AuditorOpinion,
        Phase::VendorControls,
        Phase::Exceptions,
        Phase::SubserviceControls,
        Phase::UserEntityControls,
        Phase::CriteriaMappings,
        Phase::Merge,
        Phase::Done,
    ];

    /// The phase that follows this one. `Done` is terminal.
    pub fn next(self) -> Phase {
        match self {
            Phase::AuditorOpinion => Phase::VendorControls,
            Phase::VendorControls => Phase::Exceptions,
            Phase::Exceptions => Phase::SubserviceControls,
            Phase::SubserviceControls => Phase::UserEntityControls,
            Phase::UserEntityControls => Phase::CriteriaMappings,
            Phase::CriteriaMappings => Phase::Merge,
            Phase::Merge | Phase::Done => Phase::Done,
        }
    }
}

str_enum!(Termination {
    Exhausted => "exhausted",
    MaxPassExceeded => "max_pass_exceeded",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn page_class_round_trips_through_str() {
        for class in [PageClass::Table, PageClass::Narrative] {
            assert_eq!(PageClass::from_str(class.as_str()).unwrap(), class);
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&BatchedPhaseKind::UserEntity).unwrap();
        assert_eq!(json, "\"user_entity\"");
        let json = serde_json::to_string(&Termination::MaxPassExceeded).unwrap();
        assert_eq!(json, "\"max_pass_exceeded\"");
    }

    #[test]
    fn phases_advance_in_order() {
        let mut phase = Phase::AuditorOpinion;
        let mut seen = vec![phase];
        while phase != Phase::Done {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(seen, Phase::ORDER.to_vec());
        assert_eq!(Phase::Done.next(), Phase::Done);
    }

    #[test]
    fn unknown_value_rejected() {
        let err = PageClass::from_str("figure").unwrap_err();
        assert_eq!(err.field, "PageClass");
        assert_eq!(err.value, "figure");
    }
}
