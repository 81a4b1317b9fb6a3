//! Per-building measurement configuration.
//!
//! Grammar: `entry (',' entry)*` where an entry is `name`, `name[uom]` or
//! `name[uom,type]`. Commas inside brackets belong to the entry.

use property_client::domain::MeterKind;

use super::{SkipReason, Skipped};

/// Used when a building has no (usable) measurement configuration.
const DEFAULT_MEASUREMENTS: [(&str, MeterKind, &str); 3] = [
    ("sv_l", MeterKind::WaterCold, "m3"),
    ("tv_l", MeterKind::WaterHot, "m3"),
    ("teplo_kWh", MeterKind::Heat, "kWh"),
];

/// Keyword families checked in order against the lower-cased name.
const KIND_KEYWORDS: [(MeterKind, &[&str]); 4] = [
    (MeterKind::WaterCold, &["sv", "cold", "studen"]),
    (MeterKind::WaterHot, &["tv", "hot", "tepla_voda"]),
    (MeterKind::Heat, &["teplo", "heat", "kalorimetr"]),
    (MeterKind::Electricity, &["elektr", "electr", "power"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementSpec {
    pub name: String,
    pub kind: MeterKind,
    pub unit_of_measure: String,
}

/// Measurements in configuration order, plus the entries that were rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurementSet {
    measurements: Vec<MeasurementSpec>,
    pub rejected: Vec<String>,
}

impl MeasurementSet {
    pub fn defaults() -> Self {
        Self {
            measurements: DEFAULT_MEASUREMENTS
                .iter()
                .map(|(name, kind, uom)| MeasurementSpec {
                    name: name.to_string(),
                    kind: *kind,
                    unit_of_measure: uom.to_string(),
                })
                .collect(),
            rejected: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MeasurementSpec> {
        self.measurements.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementSpec> {
        self.measurements.iter()
    }

    /// The measurement unit discovery runs against.
    pub fn reference(&self) -> Option<&MeasurementSpec> {
        self.measurements.first()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn skipped(&self) -> Vec<Skipped> {
        self.rejected
            .iter()
            .map(|entry| Skipped::new(entry.clone(), SkipReason::MalformedConfig(entry.clone())))
            .collect()
    }
}

/// Infers a meter type from a measurement name, `Other` if nothing matches.
pub fn infer_kind(name: &str) -> MeterKind {
    let lower = name.to_lowercase();
    KIND_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(MeterKind::Other)
}

pub fn parse_measurements(config: Option<&str>) -> MeasurementSet {
    let Some(config) = config.map(str::trim).filter(|c| !c.is_empty()) else {
        return MeasurementSet::defaults();
    };

    let mut set = MeasurementSet::default();
    for entry in split_entries(config) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match parse_entry(entry) {
            Some(spec) if set.get(&spec.name).is_none() => set.measurements.push(spec),
            Some(spec) => {
                tracing::debug!(measurement = %spec.name, "duplicate measurement entry ignored");
            }
            None => {
                tracing::warn!(entry, "skipping malformed measurement entry");
                set.rejected.push(entry.to_string());
            }
        }
    }

    if set.measurements.is_empty() {
        let rejected = std::mem::take(&mut set.rejected);
        set = MeasurementSet::defaults();
        set.rejected = rejected;
    }
    set
}

/// Splits on commas outside brackets. An unterminated bracket swallows the
/// rest of the string into one (malformed) entry.
fn split_entries(config: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth: u32 = 0;
    let mut start = 0;

    for (idx, ch) in config.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&config[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    entries.push(&config[start..]);
    entries
}

fn parse_entry(entry: &str) -> Option<MeasurementSpec> {
    let Some(open) = entry.find('[') else {
        if entry.contains(']') {
            return None;
        }
        return Some(MeasurementSpec {
            name: entry.to_string(),
            kind: infer_kind(entry),
            unit_of_measure: String::new(),
        });
    };

    let name = entry[..open].trim();
    let inner = entry[open + 1..].strip_suffix(']')?;
    if name.is_empty() || name.contains(']') || inner.contains(['[', ']']) {
        return None;
    }

    let mut fields = inner.split(',');
    let uom = fields.next().unwrap_or_default().trim();
    let type_override = fields.next().map(str::trim);
    if fields.next().is_some() {
        return None;
    }

    let kind = match type_override.filter(|t| !t.is_empty()) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(measurement = name, type_override = raw, "unknown meter type override, inferring from name");
            infer_kind(name)
        }),
        None => infer_kind(name),
    };

    Some(MeasurementSpec {
        name: name.to_string(),
        kind,
        unit_of_measure: uom.to_string(),
    })
}
