//! Payload fixtures.

/// Topic used by fixtures and handler tests.
pub const ZONE_CHANGE_TOPIC: &str = "zone_change";

/// A well-formed zone change payload.
pub const EXAMPLE_PAYLOAD: &str =
    r#"{"user_id":"u1","zona_anterior":2,"zona_nueva":3,"bpm_actual":142.5,"timestamp":1700000000.0}"#;

/// A payload with only the subject present.
pub const MISSING_FIELDS_PAYLOAD: &str = r#"{"user_id":"u2"}"#;

/// Encode a well-formed payload with the producer's wire names.
#[must_use]
pub fn zone_change_payload(subject_id: &str, previous: i32, new: i32, value: f64) -> Vec<u8> {
    serde_json::json!({
        "user_id": subject_id,
        "zona_anterior": previous,
        "zona_nueva": new,
        "bpm_actual": value,
        "timestamp": 1_700_000_000.0,
    })
    .to_string()
    .into_bytes()
}

/// Named payloads that must never decode.
#[must_use]
pub fn malformed_payloads() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("missing fields", MISSING_FIELDS_PAYLOAD.as_bytes().to_vec()),
        (
            "missing user_id",
            br#"{"zona_anterior":1,"zona_nueva":2,"bpm_actual":90.0}"#.to_vec(),
        ),
        (
            "string zone",
            br#"{"user_id":"u1","zona_anterior":"2","zona_nueva":3,"bpm_actual":90.0}"#.to_vec(),
        ),
        (
            "string measurement",
            br#"{"user_id":"u1","zona_anterior":2,"zona_nueva":3,"bpm_actual":"fast"}"#.to_vec(),
        ),
        (
            "fractional zone",
            br#"{"user_id":"u1","zona_anterior":2.5,"zona_nueva":3,"bpm_actual":90.0}"#.to_vec(),
        ),
        (
            "numeric user_id",
            br#"{"user_id":7,"zona_anterior":2,"zona_nueva":3,"bpm_actual":90.0}"#.to_vec(),
        ),
        (
            "blank user_id",
            br#"{"user_id":"  ","zona_anterior":2,"zona_nueva":3,"bpm_actual":90.0}"#.to_vec(),
        ),
        ("json array", b"[1,2,3]".to_vec()),
        ("plain text", b"zone changed".to_vec()),
        ("empty", Vec::new()),
        ("invalid utf-8", vec![0xff, 0xfe, 0x00, 0x7b]),
    ]
}
