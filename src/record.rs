use std::collections::BTreeMap;

/// Closed set of data fields a template element can bind to. Field names
/// arriving from the API clients are matched verbatim (camelCase); anything
/// outside this set is treated as absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum GameField {
    TeamHome,
    TeamAway,
    Date,
    Time,
    Result,
    ResultDetail,
    TeamHomeLogo,
    TeamAwayLogo,
    Location,
    City,
    League,
    Matchday,
}

impl GameField {
    pub fn parse(name: &str) -> Option<GameField> {
        Some(match name {
            "teamHome" => GameField::TeamHome,
            "teamAway" => GameField::TeamAway,
            "date" => GameField::Date,
            "time" => GameField::Time,
            "result" => GameField::Result,
            "resultDetail" => GameField::ResultDetail,
            "teamHomeLogo" => GameField::TeamHomeLogo,
            "teamAwayLogo" => GameField::TeamAwayLogo,
            "location" => GameField::Location,
            "city" => GameField::City,
            "league" => GameField::League,
            "matchday" => GameField::Matchday,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameField::TeamHome => "teamHome",
            GameField::TeamAway => "teamAway",
            GameField::Date => "date",
            GameField::Time => "time",
            GameField::Result => "result",
            GameField::ResultDetail => "resultDetail",
            GameField::TeamHomeLogo => "teamHomeLogo",
            GameField::TeamAwayLogo => "teamAwayLogo",
            GameField::Location => "location",
            GameField::City => "city",
            GameField::League => "league",
            GameField::Matchday => "matchday",
        }
    }
}

/// One game's worth of flat field values. Unknown field names are dropped
/// at construction; empty values are treated as absent at lookup.
#[derive(Clone, Debug, Default)]
pub struct GameRecord {
    pub id: String,
    fields: BTreeMap<GameField, String>,
}

impl GameRecord {
    pub fn new(id: impl Into<String>) -> GameRecord {
        GameRecord {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: GameField, value: impl Into<String>) -> GameRecord {
        self.fields.insert(field, value.into());
        self
    }

    pub fn set(&mut self, field: GameField, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    /// Value for a field; `None` for unknown, unset, or empty fields.
    pub fn get(&self, field: GameField) -> Option<&str> {
        self.fields
            .get(&field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Lookup by the verbatim field name used in field reference strings.
    pub fn get_named(&self, name: &str) -> Option<&str> {
        GameField::parse(name).and_then(|f| self.get(f))
    }
}

impl serde::Serialize for GameRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("id", &self.id)?;
        for (field, value) in &self.fields {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

impl<'de> serde::Deserialize<'de> for GameRecord {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<GameRecord, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut record = GameRecord::default();
        for (name, value) in raw {
            if name == "id" {
                record.id = value;
            } else if let Some(field) = GameField::parse(&name) {
                record.fields.insert(field, value);
            }
            // unknown field: absent by definition
        }
        Ok(record)
    }
}

/// The records bound for one export: primary game plus up to two more,
/// addressed by the `game-2.`/`game-3.` reference prefixes.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<GameRecord>,
}

impl RecordSet {
    pub const MAX_RECORDS: usize = 3;

    pub fn new(records: Vec<GameRecord>) -> RecordSet {
        let mut records = records;
        records.truncate(Self::MAX_RECORDS);
        RecordSet { records }
    }

    pub fn single(record: GameRecord) -> RecordSet {
        RecordSet {
            records: vec![record],
        }
    }

    pub fn primary(&self) -> Option<&GameRecord> {
        self.records.first()
    }

    /// Record at `index`, falling back to the primary record when the index
    /// is out of range. The fallback is a real lookup target: a reference
    /// like `game-3.teamHome` over a single-record set resolves against the
    /// primary record and can yield its value.
    pub fn select(&self, index: usize) -> Option<&GameRecord> {
        self.records.get(index).or_else(|| self.primary())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
