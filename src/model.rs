use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Local calendar day of an instant.
pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_habit: bool,
    #[serde(default, with = "day_list")]
    pub streak: Vec<NaiveDate>,
    #[serde(default)]
    pub is_archived: bool,
}

impl Goal {
    pub fn new(id: i64, title: &str, description: &str, is_habit: bool) -> Self {
        Goal {
            id,
            title: title.to_string(),
            description: description.to_string(),
            is_habit,
            streak: Vec::new(),
            is_archived: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<i64>,
}

impl Task {
    /// Time-based id with a random low-order tie-break, so two contexts adding
    /// a task in the same millisecond still get distinct ids.
    pub fn new_id(now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() * 1000 + rand::random_range(0..1000)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTaskRecord {
    #[serde(flatten)]
    pub task: Task,
    pub completed_at: DateTime<Utc>,
}

impl CompletedTaskRecord {
    pub fn new(task: &Task, completed_at: DateTime<Utc>) -> Self {
        CompletedTaskRecord {
            task: Task {
                completed: true,
                ..task.clone()
            },
            completed_at,
        }
    }

    pub fn id(&self) -> i64 {
        self.task.id
    }

    pub fn day(&self) -> NaiveDate {
        local_day(self.completed_at)
    }

    pub fn matches(&self, id: i64, completed_at: DateTime<Utc>) -> bool {
        self.task.id == id && self.completed_at == completed_at
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Float(f64),
    }
    Ok(match RawId::deserialize(de)? {
        RawId::Int(n) => n,
        RawId::Float(f) => f.trunc() as i64,
    })
}

/// Parse a stored streak entry: either a plain `YYYY-MM-DD` day or a full
/// ISO-8601 timestamp, which is truncated to its local calendar day.
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(day);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| local_day(dt.with_timezone(&Utc)))
}

mod day_list {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(days: &[NaiveDate], ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_seq(days.iter().map(|d| d.format("%Y-%m-%d").to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<NaiveDate>, D::Error> {
        let raw: Option<Vec<String>> = Option::deserialize(de)?;
        let mut days = Vec::new();
        for entry in raw.unwrap_or_default() {
            match super::parse_day(&entry) {
                Some(day) if !days.contains(&day) => days.push(day),
                Some(_) => {}
                None => log::warn!("skipping unparseable streak day '{entry}'"),
            }
        }
        Ok(days)
    }
}
