//! The HTTP front end over a loaded configuration.

use std::time::Duration;

use serde_json::json;

use crate::mock_hw::{Rig, body, json_body, status};

const CONFIG: &str = r#"{
    "network": {"port": 8080, "docs": true, "logs": true},
    "fan": {"type": "Fan", "pin": 17},
    "climate": {"type": "DHT22", "pin": 4},
    "lcd": {
        "type": "HD44780U_LCD",
        "register_select_pin": 21,
        "enable_pin": 22,
        "data_pins": [23, 25, 26, 27]
    },
    "chains": {"quiet": [{"device": "fan", "action": "off"}]}
}"#;

/// 22.6 °C, 40.1 %RH.
const FRAME: [u8; 5] = [0x01, 0x91, 0x00, 0xE2, 0x74];

#[test]
fn success_is_wrapped_in_the_envelope() {
    let rig = Rig::load(CONFIG);

    let reply = rig.request("/fan/set?value=30");

    assert_eq!(status(&reply), 200);
    assert!(reply.contains("Content-Type: application/json"));
    assert_eq!(
        json_body(&reply),
        json!({
            "parameters": {"value": "30"},
            "response": {"speed": 30, "state": "on"},
            "status": 200
        })
    );
}

#[test]
fn missing_required_argument_is_a_400() {
    let rig = Rig::load(CONFIG);

    let reply = rig.request("/fan/set");

    assert_eq!(status(&reply), 400);
    assert!(json_body(&reply)["response"]["error"].as_str().unwrap().contains("value"));
}

#[test]
fn sensor_failure_is_a_500() {
    let rig = Rig::load(CONFIG);

    let reply = rig.request("/climate/data");

    assert_eq!(status(&reply), 500);
    assert_eq!(json_body(&reply)["status"], 500);
}

#[test]
fn sensor_data_is_served_at_the_bare_device_path() {
    let rig = Rig::load(CONFIG);
    rig.board.push_climate_frame(4, FRAME);

    let reply = rig.request("/climate");

    assert_eq!(status(&reply), 200);
    assert_eq!(json_body(&reply)["response"], json!({"temperature": 22.6, "humidity": 40.1}));
}

#[test]
fn lcd_write_receives_the_decoded_text() {
    let rig = Rig::load(CONFIG);
    rig.supervisor.start();
    rig.runtime().run_for(Duration::from_millis(50));
    assert!(rig.board.display(21).unwrap().initialised);

    let reply = rig.request("/lcd/write?string=Hi%20there%21");

    assert_eq!(status(&reply), 200);
    assert_eq!(rig.board.display(21).unwrap().row_text(0, 16), "Hi there!       ");
}

#[test]
fn docs_list_every_operation_with_its_parameters() {
    let rig = Rig::load(CONFIG);

    let reply = rig.request("/docs");

    assert_eq!(status(&reply), 200);
    let html = body(&reply);
    for path in ["/fan/on", "/fan/set", "/climate/data", "/lcd/write", "/action/quiet"] {
        assert!(html.contains(path), "{path} undocumented");
    }
    assert!(html.contains("<code>value</code> (required)"));
}

#[test]
fn logs_page_shows_retained_lines() {
    let rig = Rig::load(CONFIG);
    rig.logs.push("fan `fan` ready");

    let reply = rig.request("/logs");

    assert_eq!(status(&reply), 200);
    assert!(body(&reply).contains("fan `fan` ready"));
}

#[test]
fn index_links_the_pages_and_chains() {
    let rig = Rig::load(CONFIG);

    let reply = rig.request("/");

    assert_eq!(status(&reply), 200);
    let html = body(&reply);
    assert!(html.contains("href=\"/docs\""));
    assert!(html.contains("href=\"/action/quiet\""));
    assert!(!html.contains("href=\"/fan/set\""));
}

#[test]
fn malformed_request_line_is_a_400() {
    let rig = Rig::load(CONFIG);
    let router = rig.supervisor.router().unwrap().clone();

    let reply = rig.runtime().block_on(async move {
        let mut out = Vec::new();
        router.handle(&b"BREW\r\n\r\n"[..], &mut out, "10.0.0.9").await;
        out
    });

    assert!(String::from_utf8(reply).unwrap().starts_with("HTTP/1.0 400 BAD REQUEST\r\n"));
}
