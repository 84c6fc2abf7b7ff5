fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use bytes::BytesMut;
    use hostlink_protocol::{
        HealthCheckResponse, Message, MessageType, NativeMessageCodec, ProgressEvent, PongResponse,
    };
    use tokio_util::codec::{Decoder, Encoder};

    const FIXTURES: &[&str] = &[
        "ping_request.json",
        "pong_response.json",
        "health_check_ok.json",
        "health_check_legacy.json",
        "progress_event.json",
        "download_request.json",
        "media_info_response.json",
        "error_response.json",
        "error_object_response.json",
        "download_locations_response.json",
    ];

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    fn load_message(name: &str) -> Message {
        serde_json::from_value(load_fixture(name))
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"))
    }

    /// Normalizes JSON numbers so that `12` and `12.0` compare equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    #[test]
    fn every_fixture_roundtrips_through_message() {
        for name in FIXTURES {
            let fixture = load_fixture(name);
            let parsed = load_message(name);
            let reserialized = serde_json::to_value(&parsed)
                .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
            assert_eq!(
                normalize_value(&fixture),
                normalize_value(&reserialized),
                "roundtrip mismatch for {name}:\n  host:   {fixture}\n  client: {reserialized}"
            );
        }
    }

    #[test]
    fn every_fixture_survives_native_framing() {
        let mut codec = NativeMessageCodec::default();
        let mut buf = BytesMut::new();
        for name in FIXTURES {
            codec.encode(load_message(name), &mut buf).unwrap();
        }
        for name in FIXTURES {
            let decoded = codec.decode(&mut buf).unwrap().unwrap().unwrap();
            assert_eq!(decoded, load_message(name), "framing mismatch for {name}");
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn handshake_messages() {
        let ping = load_message("ping_request.json");
        assert!(ping.is_type(&MessageType::Ping));
        assert!(ping.id.is_some());

        let pong = load_message("pong_response.json");
        assert_eq!(pong.id, ping.id);
        assert!(pong.is_type(&MessageType::Pong));
        let payload: PongResponse = pong.parse_payload().unwrap();
        assert!(payload.native_host_connected);
        assert_eq!(payload.version.as_deref(), Some("1.4.2"));
    }

    #[test]
    fn health_check_forms() {
        let current = load_message("health_check_ok.json");
        let status: HealthCheckResponse = current.parse_payload().unwrap();
        assert!(status.is_ok());
        assert!(current.msg_type.is_none());

        let legacy = load_message("health_check_legacy.json");
        let status: HealthCheckResponse = legacy.parse_payload().unwrap();
        assert!(!status.is_ok());
        assert!(legacy.is_type(&MessageType::Pong));
    }

    #[test]
    fn progress_push_event() {
        let msg = load_message("progress_event.json");
        assert!(msg.id.is_none());
        assert!(msg.is_type(&MessageType::Progress));

        let event: ProgressEvent = msg.parse_payload().unwrap();
        assert_eq!(event.download_id, "dl-42");
        assert_eq!(event.progress, 37.5);
        assert_eq!(event.speed, Some(1_048_576.0));
        assert_eq!(event.eta, Some(12.0));
        assert_eq!(event.confidence, Some(0.8));
    }

    #[test]
    fn request_fields_stay_top_level() {
        let msg = load_message("download_request.json");
        assert!(msg.is_type(&MessageType::Download));
        assert_eq!(
            msg.field("url").unwrap(),
            "https://cdn.example.com/stream/master.m3u8"
        );
        assert_eq!(msg.field("quality").unwrap(), 720);
        assert!(msg.field("type").is_none());
        assert!(msg.field("id").is_none());
    }

    #[test]
    fn responses_without_type() {
        for name in ["media_info_response.json", "download_locations_response.json"] {
            let msg = load_message(name);
            assert!(msg.id.is_some(), "{name} has no id");
            assert!(msg.msg_type.is_none(), "{name} has a type");
            assert!(msg.error_message().is_none(), "{name} carries an error");
        }
    }

    #[test]
    fn error_response_forms() {
        let plain = load_message("error_response.json");
        assert_eq!(
            plain.error_message().as_deref(),
            Some("ffmpeg exited with status 1")
        );

        let object = load_message("error_object_response.json");
        assert_eq!(
            object.error_message().as_deref(),
            Some("no space left on device")
        );
    }
}
