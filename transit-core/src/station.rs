//! Stations: either resolved from a static per-scheme table or left as a raw id.

use serde::Serialize;

/// A row of a static station table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationEntry {
    pub id: u32,
    pub name: &'static str,
    pub line: Option<&'static str>,
    pub lat: Option<f32>,
    pub lon: Option<f32>,
}

/// A static station database for one operator.
#[derive(Debug, Clone, Copy)]
pub struct StationTable {
    pub company: &'static str,
    pub entries: &'static [StationEntry],
}

impl StationTable {
    pub fn lookup(&self, id: u32) -> Option<&'static StationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Resolve `id`, falling back to an unknown station carrying the raw id.
    pub fn station(&self, id: u32) -> Station {
        match self.lookup(id) {
            Some(entry) => Station::Known {
                id: Some(entry.id),
                name: entry.name.to_string(),
                company: Some(self.company.to_string()),
                lines: entry.line.map(|l| vec![l.to_string()]).unwrap_or_default(),
                lat: entry.lat,
                lon: entry.lon,
            },
            None => Station::Unknown { id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Station {
    Known {
        id: Option<u32>,
        name: String,
        company: Option<String>,
        lines: Vec<String>,
        lat: Option<f32>,
        lon: Option<f32>,
    },
    Unknown {
        id: u32,
    },
}

impl Station {
    pub fn name(&self) -> String {
        match self {
            Station::Known { name, .. } => name.clone(),
            Station::Unknown { id } => format!("Unknown ({id:#06x})"),
        }
    }

    pub fn has_location(&self) -> bool {
        matches!(self, Station::Known { lat: Some(_), lon: Some(_), .. })
    }
}

impl std::fmt::Display for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: StationTable = StationTable {
        company: "Test Rail",
        entries: &[StationEntry {
            id: 0x10,
            name: "Central",
            line: Some("Red"),
            lat: Some(1.5),
            lon: Some(2.5),
        }],
    };

    #[test]
    fn test_lookup_known() {
        let s = TABLE.station(0x10);
        assert_eq!(s.name(), "Central");
        assert!(s.has_location());
        match s {
            Station::Known { company, lines, .. } => {
                assert_eq!(company.as_deref(), Some("Test Rail"));
                assert_eq!(lines, vec!["Red".to_string()]);
            }
            Station::Unknown { .. } => panic!("expected known station"),
        }
    }

    #[test]
    fn test_lookup_unknown_keeps_raw_id() {
        let s = TABLE.station(0x1234);
        assert_eq!(s, Station::Unknown { id: 0x1234 });
        assert_eq!(s.to_string(), "Unknown (0x1234)");
        assert!(!s.has_location());
    }
}
