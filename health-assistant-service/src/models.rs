use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wall-clock stamp format shared by memory entries and profile updates.
pub const TIMESTAMP_FORMAT: &str = "%d_%m_%y_%H_%M";

pub fn now_stamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Treatment keys hoisted to the top level in the flattened working form.
pub const TREATMENT_KEYS: [&str; 6] = [
    "medicationList",
    "dailyChecklist",
    "appointment",
    "recommendations",
    "sleepHours",
    "sleepQuality",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientProfile {
    pub uid: String,
    pub name: String,
    pub age: u64,
    #[serde(rename = "bloodType")]
    pub blood_type: String,
    pub allergies: Vec<String>,
    pub treatment: Treatment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Treatment {
    #[serde(rename = "medicationList")]
    pub medication_list: Vec<String>,
    #[serde(rename = "dailyChecklist")]
    pub daily_checklist: Vec<String>,
    pub appointment: String,
    pub recommendations: Vec<String>,
    #[serde(rename = "sleepHours")]
    pub sleep_hours: f64,
    #[serde(rename = "sleepQuality")]
    pub sleep_quality: String,
}

/// Hoist the treatment keys to the top level and drop the `treatment` key.
/// The core operates on this form; the HTTP boundary re-nests on the way out.
pub fn flatten_profile(profile: &PatientProfile) -> Map<String, Value> {
    let value = serde_json::to_value(profile).expect("profile serializes");
    let mut map = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Some(Value::Object(treatment)) = map.remove("treatment") {
        for (key, value) in treatment {
            map.insert(key, value);
        }
    }
    map
}

/// Rebuild the nested profile from the flattened working form, applying the
/// documented defaults for anything missing or mistyped.
pub fn nest_profile(flat: &Map<String, Value>) -> PatientProfile {
    PatientProfile {
        uid: string_field(flat, "uid"),
        name: string_field(flat, "name"),
        age: flat.get("age").and_then(Value::as_u64).unwrap_or(0),
        blood_type: string_field(flat, "bloodType"),
        allergies: string_list(flat, "allergies"),
        treatment: Treatment {
            medication_list: string_list(flat, "medicationList"),
            daily_checklist: string_list(flat, "dailyChecklist"),
            appointment: string_field(flat, "appointment"),
            recommendations: string_list(flat, "recommendations"),
            sleep_hours: flat
                .get("sleepHours")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
                .max(0.0),
            sleep_quality: string_field(flat, "sleepQuality"),
        },
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEntry {
    pub text: String,
    pub datetime: String,
}

impl MemoryEntry {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            datetime: now_stamp(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateEntry {
    pub datetime: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
        };
        f.write_str(token)
    }
}

/// One typed, dotted-path difference between two profile trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub before: Value,
    pub after: Value,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTag {
    Text,
    Patient,
    Web,
    Medical,
    UiChange,
    AddTreatment,
}

impl RouteTag {
    /// Parse the classifier's token. Anything that is not exactly one of the
    /// six tags coerces to `Text`.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "text" => RouteTag::Text,
            "patient" => RouteTag::Patient,
            "web" => RouteTag::Web,
            "medical" => RouteTag::Medical,
            "ui_change" => RouteTag::UiChange,
            "add_treatment" => RouteTag::AddTreatment,
            _ => RouteTag::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteTag::Text => "text",
            RouteTag::Patient => "patient",
            RouteTag::Web => "web",
            RouteTag::Medical => "medical",
            RouteTag::UiChange => "ui_change",
            RouteTag::AddTreatment => "add_treatment",
        }
    }

    /// Tag sent to the realtime voice service for the initial invocation.
    pub fn voice_tag(&self) -> &'static str {
        match self {
            RouteTag::Text | RouteTag::Patient => "normal",
            RouteTag::Web => "web",
            RouteTag::Medical => "med",
            RouteTag::AddTreatment => "addt",
            RouteTag::UiChange => "ui",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Patient,
    Web,
    Memory,
    Medical,
    Ui,
}

/// Request-scoped state threaded through the orchestration graph. Created at
/// request entry, mutated only inside graph nodes, dropped at response time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentState {
    pub input: String,
    pub memory: Vec<MemoryEntry>,
    pub patient_profile: Map<String, Value>,
    pub updates: Vec<UpdateEntry>,
    pub final_answer: Option<String>,
    pub source: Option<AnswerSource>,
    pub route_tag: Option<RouteTag>,
    pub error: Option<String>,
}

impl AgentState {
    pub fn from_request(request: AgentRequest) -> Self {
        Self {
            input: request.prompt,
            memory: request.memory,
            patient_profile: flatten_profile(&request.patient_profile),
            updates: request.updates,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentRequest {
    pub prompt: String,
    pub memory: Vec<MemoryEntry>,
    pub updates: Vec<UpdateEntry>,
    /// Accepted for wire compatibility; the core keeps conversational
    /// context in `memory`.
    pub conversation: Value,
    #[serde(rename = "patientProfile")]
    pub patient_profile: PatientProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    #[serde(rename = "updatedPatientProfile")]
    pub updated_patient_profile: PatientProfile,
    #[serde(rename = "updatedMemory")]
    pub updated_memory: Vec<MemoryEntry>,
    #[serde(rename = "Updates")]
    pub updates: Vec<UpdateEntry>,
    #[serde(rename = "extraInfo")]
    pub extra_info: String,
}

impl From<AgentState> for AgentResponse {
    fn from(state: AgentState) -> Self {
        Self {
            updated_patient_profile: nest_profile(&state.patient_profile),
            updated_memory: state.memory,
            updates: state.updates,
            extra_info: state.final_answer.unwrap_or_default(),
        }
    }
}

/// One web search hit, in the shape the frontend expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    #[serde(rename = "displayLink")]
    pub display_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_profile() -> PatientProfile {
        serde_json::from_value(json!({
            "uid": "u1",
            "name": "A",
            "age": 30,
            "bloodType": "O+",
            "allergies": ["pollen"],
            "treatment": {
                "medicationList": ["aspirin"],
                "dailyChecklist": ["walk"],
                "appointment": "Friday",
                "recommendations": ["drink water"],
                "sleepHours": 7,
                "sleepQuality": "good"
            }
        }))
        .unwrap()
    }

    #[test]
    fn flatten_hoists_treatment_keys() {
        let flat = flatten_profile(&sample_profile());
        assert!(flat.get("treatment").is_none());
        assert_eq!(flat["sleepHours"], json!(7.0));
        assert_eq!(flat["medicationList"], json!(["aspirin"]));
        assert_eq!(flat["bloodType"], json!("O+"));
    }

    #[test]
    fn nest_restores_flattened_profile() {
        let profile = sample_profile();
        let nested = nest_profile(&flatten_profile(&profile));
        assert_eq!(nested, profile);
    }

    #[test]
    fn partial_input_acquires_documented_defaults() {
        let request: AgentRequest =
            serde_json::from_value(json!({ "prompt": "hi", "patientProfile": { "uid": "u9" } }))
                .unwrap();
        let profile = request.patient_profile;
        assert_eq!(profile.uid, "u9");
        assert_eq!(profile.age, 0);
        assert!(profile.allergies.is_empty());
        assert_eq!(profile.treatment.sleep_hours, 0.0);
        assert_eq!(profile.treatment.appointment, "");
        assert!(profile.treatment.recommendations.is_empty());
    }

    #[test]
    fn nest_defaults_mistyped_fields() {
        let mut flat = flatten_profile(&sample_profile());
        flat.insert("age".to_string(), json!("not a number"));
        flat.insert("sleepHours".to_string(), json!(-2.0));
        let nested = nest_profile(&flat);
        assert_eq!(nested.age, 0);
        assert_eq!(nested.treatment.sleep_hours, 0.0);
    }

    #[test]
    fn route_tag_tokens_round_trip_and_coerce() {
        for tag in [
            RouteTag::Text,
            RouteTag::Patient,
            RouteTag::Web,
            RouteTag::Medical,
            RouteTag::UiChange,
            RouteTag::AddTreatment,
        ] {
            assert_eq!(RouteTag::parse(tag.as_str()), tag);
        }
        assert_eq!(RouteTag::parse("  WEB \n"), RouteTag::Web);
        assert_eq!(RouteTag::parse("recommendation"), RouteTag::Text);
        assert_eq!(RouteTag::parse(""), RouteTag::Text);
    }

    #[test]
    fn voice_tags_follow_route_table() {
        assert_eq!(RouteTag::Text.voice_tag(), "normal");
        assert_eq!(RouteTag::Patient.voice_tag(), "normal");
        assert_eq!(RouteTag::Web.voice_tag(), "web");
        assert_eq!(RouteTag::Medical.voice_tag(), "med");
        assert_eq!(RouteTag::AddTreatment.voice_tag(), "addt");
        assert_eq!(RouteTag::UiChange.voice_tag(), "ui");
    }

    #[test]
    fn timestamp_matches_wire_format() {
        let stamp = now_stamp();
        let parts: Vec<&str> = stamp.split('_').collect();
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|p| p.len() == 2));
        assert!(parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())));
    }

    #[test]
    fn response_always_carries_full_nested_shape() {
        let state = AgentState {
            input: "hello".to_string(),
            ..Default::default()
        };
        let response = AgentResponse::from(state);
        let value = serde_json::to_value(&response).unwrap();
        let profile = &value["updatedPatientProfile"];
        for key in ["uid", "name", "age", "bloodType", "allergies", "treatment"] {
            assert!(profile.get(key).is_some(), "missing {key}");
        }
        for key in TREATMENT_KEYS {
            assert!(profile["treatment"].get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["extraInfo"], json!(""));
    }
}
