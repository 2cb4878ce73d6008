use serde::{Deserialize, Serialize};
use std::fmt;

/// A recognized person's presence entry for a given date and status.
///
/// Missing fields decode as empty strings; the backend is trusted to send
/// whatever it considers displayable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status_type: String,
}

impl AttendanceRecord {
    /// "First Last", as shown in the name column.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl fmt::Display for AttendanceRecord {
    /// One table row: `name | date | status`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | {} | {}",
            self.first_name, self.last_name, self.date, self.status_type
        )
    }
}

/// Body of `POST /attendance/take_attendance`.
///
/// `attendance` is kept as raw JSON so an empty object can be told apart
/// from a real record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TakeAttendanceResponse {
    #[serde(default)]
    pub attendance: Option<serde_json::Value>,
}

impl TakeAttendanceResponse {
    /// The recognized record, if the backend returned a non-empty one.
    pub fn into_record(self) -> Result<Option<AttendanceRecord>, serde_json::Error> {
        match self.attendance {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some),
        }
    }
}

/// Body of `GET /attendance/absent`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbsentResponse {
    #[serde(default)]
    pub attendance: Option<Vec<AttendanceRecord>>,
}

impl AbsentResponse {
    pub fn into_records(self) -> Vec<AttendanceRecord> {
        self.attendance.unwrap_or_default()
    }
}

/// Body of the local `GET /api/config` endpoint.
///
/// Both fields are null until an operator has logged in on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Body of `POST /admin/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Opaque admin profile; only echoed back to the operator.
    #[serde(default)]
    pub admin: serde_json::Value,
}

/// Request body of `POST /attendance/enroll_camera`.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollRequest {
    pub first_name: String,
    pub last_name: String,
}

/// Response body of `POST /attendance/enroll_camera`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollResponse {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(first: &str, last: &str, date: &str, status: &str) -> AttendanceRecord {
        AttendanceRecord {
            first_name: first.into(),
            last_name: last.into(),
            date: date.into(),
            status_type: status.into(),
        }
    }

    #[test]
    fn test_row_format() {
        let r = record("A", "B", "2024-01-01", "present");
        assert_eq!(r.to_string(), "A B | 2024-01-01 | present");
        assert_eq!(r.full_name(), "A B");
    }

    #[test]
    fn test_take_attendance_with_record() {
        let body = r#"{"attendance":{"first_name":"A","last_name":"B","date":"2024-01-01","status_type":"present"}}"#;
        let resp: TakeAttendanceResponse = serde_json::from_str(body).unwrap();
        let rec = resp.into_record().unwrap();
        assert_eq!(rec, Some(record("A", "B", "2024-01-01", "present")));
    }

    #[test]
    fn test_take_attendance_without_record() {
        for body in [r#"{}"#, r#"{"attendance":null}"#, r#"{"attendance":{}}"#] {
            let resp: TakeAttendanceResponse = serde_json::from_str(body).unwrap();
            assert_eq!(resp.into_record().unwrap(), None, "body: {body}");
        }
    }

    #[test]
    fn test_take_attendance_partial_record() {
        let body = r#"{"attendance":{"first_name":"A","status_type":"late"}}"#;
        let resp: TakeAttendanceResponse = serde_json::from_str(body).unwrap();
        let rec = resp.into_record().unwrap().unwrap();
        assert_eq!(rec.to_string(), "A  |  | late");
    }

    #[test]
    fn test_take_attendance_malformed_record() {
        let body = r#"{"attendance":"nobody"}"#;
        let resp: TakeAttendanceResponse = serde_json::from_str(body).unwrap();
        assert!(resp.into_record().is_err());
    }

    #[test]
    fn test_absent_response() {
        let body = r#"{"attendance":[
            {"first_name":"C","last_name":"D","date":"2024-01-01","status_type":"absent"},
            {"first_name":"E","last_name":"F","date":"2024-01-01","status_type":"absent"}
        ]}"#;
        let resp: AbsentResponse = serde_json::from_str(body).unwrap();
        let records = resp.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].first_name, "E");
    }

    #[test]
    fn test_absent_response_missing_list() {
        let resp: AbsentResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.into_records().is_empty());
        let resp: AbsentResponse = serde_json::from_str(r#"{"attendance":null}"#).unwrap();
        assert!(resp.into_records().is_empty());
    }

    #[test]
    fn test_remote_config_logged_out() {
        let cfg: RemoteConfig =
            serde_json::from_str(r#"{"backend_url":"http://x","access_token":null}"#).unwrap();
        assert_eq!(cfg.backend_url.as_deref(), Some("http://x"));
        assert_eq!(cfg.access_token, None);
    }
}
