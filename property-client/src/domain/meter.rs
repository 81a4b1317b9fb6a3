use std::{fmt, str::FromStr};

use uuid::Uuid;

/// Closed set of meter types stored in `meters.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    WaterCold,
    WaterHot,
    Heat,
    Electricity,
    Other,
}

impl MeterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaterCold => "water_cold",
            Self::WaterHot => "water_hot",
            Self::Heat => "heat",
            Self::Electricity => "electricity",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown meter type '{0}'")]
pub struct UnknownMeterKind(pub String);

impl FromStr for MeterKind {
    type Err = UnknownMeterKind;

    /// Accepts the stored names plus the spellings people tend to type into
    /// measurement overrides (`cold_water`, `electric`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "water_cold" | "cold_water" | "cold" => Ok(Self::WaterCold),
            "water_hot" | "hot_water" | "hot" => Ok(Self::WaterHot),
            "heat" => Ok(Self::Heat),
            "electricity" | "electric" | "power" => Ok(Self::Electricity),
            "other" => Ok(Self::Other),
            _ => Err(UnknownMeterKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for MeterKind {
    type Error = UnknownMeterKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Meter {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub serial_number: String,
    #[sqlx(rename = "type", try_from = "String")]
    pub kind: MeterKind,
    pub unit_of_measure: String,
}

#[derive(Debug, Clone)]
pub struct NewMeter {
    pub unit_id: Uuid,
    pub serial_number: String,
    pub kind: MeterKind,
    pub unit_of_measure: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_kind_parses_stored_names_and_aliases() {
        assert_eq!("water_cold".parse::<MeterKind>(), Ok(MeterKind::WaterCold));
        assert_eq!("Hot_Water".parse::<MeterKind>(), Ok(MeterKind::WaterHot));
        assert_eq!(" heat ".parse::<MeterKind>(), Ok(MeterKind::Heat));
        assert_eq!("electric".parse::<MeterKind>(), Ok(MeterKind::Electricity));
    }

    #[test]
    fn meter_kind_rejects_unknown_names() {
        let err = "gas".parse::<MeterKind>().unwrap_err();
        assert_eq!(err, UnknownMeterKind("gas".to_string()));
    }

    #[test]
    fn meter_kind_display_matches_stored_name() {
        for kind in [
            MeterKind::WaterCold,
            MeterKind::WaterHot,
            MeterKind::Heat,
            MeterKind::Electricity,
            MeterKind::Other,
        ] {
            assert_eq!(kind.to_string().parse::<MeterKind>(), Ok(kind));
        }
    }
}
