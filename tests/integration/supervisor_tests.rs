//! Loading and running a whole configuration: failures stay contained,
//! bound actions behave like direct calls, and chains can be repeated.

use std::time::Duration;

use breadboard::app::device::{Args, Reply};
use breadboard::devices::ONBOARD_LED_NAME;
use breadboard::devices::fan::{DEFAULT_MAX_DUTY, duty_for};
use log::Level;
use serde_json::json;

use crate::mock_hw::{Rig, errors_mentioning, logged, status};

#[test]
fn broken_entries_do_not_take_down_the_rest() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "fan": {"type": "Fan", "pin": 17},
            "pinless": {"type": "Fan"},
            "toaster": {"type": "Toaster", "pin": 3},
            "events": [
                {"device": "fan", "state": "on", "action": {"device": {"name": "pinless", "action": "off"}}},
                {"device": "fan", "state": "off", "action": {"webhook": {"url": "http://hub.local/off"}}}
            ]
        }"#,
    );

    let names: Vec<_> = rig.supervisor.registry().iter().map(|d| d.name().to_owned()).collect();
    assert_eq!(names, ["fan", ONBOARD_LED_NAME]);
    assert!(!errors_mentioning("pinless").is_empty());
    assert!(!errors_mentioning("`toaster`").is_empty());

    // The event naming the missing device is dropped; its sibling binds.
    let events = rig.supervisor.events();
    assert!(events.actions("fan", "on").is_empty());
    assert_eq!(events.actions("fan", "off").len(), 1);

    assert_eq!(status(&rig.request("/fan/off")), 200);
    assert_eq!(status(&rig.request("/pinless/off")), 404);
}

#[test]
fn each_kind_missing_a_required_parameter_is_skipped_alone() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "no_pin_fan": {"type": "Fan"},
            "no_pin_strip": {"type": "NeoPixel", "count": 3},
            "no_pin_rgb": {"type": "RGBNeoPixel", "count": 3},
            "no_scl_air": {"type": "CCS811", "sda": 21},
            "no_pin_dht11": {"type": "DHT11"},
            "no_pin_dht22": {"type": "DHT22"},
            "no_pin_virtual": {"type": "VirtualToggleButton"},
            "no_pin_toggle": {"type": "ToggleButton"},
            "no_mode_momentary": {"type": "MomentaryButton", "pin": 5},
            "no_mapping_switch": {"type": "Switch"},
            "no_columns_matrix": {"type": "Matrix", "row_pins": [10, 11]},
            "no_uart_serial": {"type": "Serial"},
            "no_enable_lcd": {"type": "HD44780U_LCD", "register_select_pin": 21, "data_pins": [23, 25, 26, 27]},
            "fan": {"type": "Fan", "pin": 17}
        }"#,
    );

    let names: Vec<_> = rig.supervisor.registry().iter().map(|d| d.name().to_owned()).collect();
    assert_eq!(names, ["fan", ONBOARD_LED_NAME]);
    for (name, param) in [
        ("no_pin_fan", "pin"),
        ("no_pin_strip", "pin"),
        ("no_pin_rgb", "pin"),
        ("no_scl_air", "scl"),
        ("no_pin_dht11", "pin"),
        ("no_pin_dht22", "pin"),
        ("no_pin_virtual", "pin"),
        ("no_pin_toggle", "pin"),
        ("no_mode_momentary", "mode"),
        ("no_mapping_switch", "state_pin_mapping"),
        ("no_columns_matrix", "column_pins"),
        ("no_uart_serial", "uart_id"),
        ("no_enable_lcd", "enable_pin"),
    ] {
        let errors = errors_mentioning(&format!("`{name}`"));
        assert_eq!(errors.len(), 1, "{name}: {errors:?}");
        assert!(errors[0].contains(&format!("`{param}`")), "{name}: {}", errors[0]);
    }
    assert_eq!(status(&rig.request("/fan/on")), 200);
}

#[test]
fn unknown_network_keys_keep_the_server() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080, "hostname": "bench", "tls": false},
            "fan": {"type": "Fan", "pin": 17}
        }"#,
    );

    assert!(rig.supervisor.router().is_some());
    assert_eq!(status(&rig.request("/fan/on")), 200);
    let warnings = logged(Level::Warn);
    assert!(warnings.iter().any(|w| w.contains("`hostname`")));
    assert!(warnings.iter().any(|w| w.contains("`tls`")));
}

#[test]
fn state_operation_reports_the_current_state() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "selector": {"type": "Switch", "state_pin_mapping": {"low": 6, "off": "off", "high": 7}}
        }"#,
    );
    rig.supervisor.start();
    rig.runtime().run_until_stalled();
    assert_eq!(rig.call("selector", "state", Args::new()), Ok(Reply::state("off")));

    rig.board.set_input(7, true);
    rig.runtime().run_for(Duration::from_millis(100));

    assert_eq!(rig.call("selector", "state", Args::new()), Ok(Reply::state("high")));
}

#[test]
fn bound_call_matches_a_direct_request() {
    const CONFIG: &str = r#"{
        "network": {"port": 8080},
        "fan": {"type": "Fan", "pin": 17},
        "chains": {"breeze": [{"device": "fan", "action": "set", "value": 30}]}
    }"#;
    let via_chain = Rig::load(CONFIG);
    let direct = Rig::load(CONFIG);

    assert_eq!(status(&via_chain.request("/action/breeze")), 200);
    assert_eq!(status(&direct.request("/fan/set?value=30")), 200);

    assert_eq!(via_chain.board.duty(17), Some(duty_for(30, DEFAULT_MAX_DUTY)));
    assert_eq!(via_chain.board.duty(17), direct.board.duty(17));
    assert_eq!(via_chain.state("fan"), direct.state("fan"));
}

#[test]
fn chains_can_be_run_repeatedly() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "fan": {"type": "Fan", "pin": 17, "idle": 50},
            "exhaust": {"type": "Fan", "pin": 18},
            "chains": {"quiet": [
                {"device": "fan", "action": "off"},
                {"device": "exhaust", "action": "set", "value": 10}
            ]}
        }"#,
    );

    for _ in 0..3 {
        assert_eq!(status(&rig.request("/chain/quiet")), 200);
        assert_eq!(rig.state("fan"), "off");
        assert_eq!(rig.board.duty(18), Some(duty_for(10, DEFAULT_MAX_DUTY)));
    }
    // `on` restores the configured idle speed, untouched by the chain.
    let reply = rig.call("fan", "on", Args::new()).unwrap();
    assert_eq!(reply, Reply::Json(json!({"speed": 50, "state": "on"})));
}

#[test]
fn dispatching_an_unbound_state_does_nothing() {
    let rig = Rig::load(r#"{"fan": {"type": "Fan", "pin": 17}}"#);
    let events = rig.supervisor.events().clone();
    let duty = rig.board.duty(17);

    rig.runtime().block_on(async move { events.dispatch("fan", "off").await });

    assert_eq!(rig.board.duty(17), duty);
    assert!(errors_mentioning("fan").is_empty());
}

#[test]
fn virtual_button_cascades_through_other_devices() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "master": {"type": "VirtualToggleButton", "pin": 12},
            "slave": {"type": "VirtualToggleButton", "pin": 13},
            "fan": {"type": "Fan", "pin": 17},
            "events": [
                {"device": "master", "state": "on", "action": {"device": {"name": "slave", "action": "on"}}},
                {"device": "slave", "state": "on", "action": {"device": {"name": "fan", "action": "off"}}}
            ]
        }"#,
    );
    rig.supervisor.start();
    rig.runtime().run_until_stalled();

    assert_eq!(status(&rig.request("/master/on")), 200);

    assert_eq!(rig.state("slave"), "on");
    assert!(rig.board.level(13));
    assert_eq!(rig.state("fan"), "off");
}
