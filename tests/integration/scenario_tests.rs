//! End-to-end scenarios: a configuration is loaded, inputs are driven on
//! the simulated board, and the outcome is read back from the pins, the
//! notifier and the captured log.

use std::time::Duration;

use breadboard::app::device::Args;
use breadboard::devices::fan::{DEFAULT_MAX_DUTY, duty_for};

use crate::mock_hw::{RecordingNotifier, Rig, body, errors_mentioning, status};

const FAN_PIN: u8 = 17;
const EXHAUST_PIN: u8 = 18;

// ── Button drives a fan ───────────────────────────────────────

const BUTTON_FAN: &str = r#"{
    "network": {"port": 8080},
    "button": {"type": "ToggleButton", "pin": 5},
    "fan": {"type": "Fan", "pin": 17, "idle": 40},
    "events": [
        {"device": "button", "state": "on", "action": {"device": {"name": "fan", "action": "on"}}},
        {"device": "button", "state": "on", "action": {"webhook": {"url": "http://hub.local:8123/pressed"}}}
    ]
}"#;

#[test]
fn button_press_turns_the_fan_on() {
    let rig = Rig::load(BUTTON_FAN);
    rig.call("fan", "off", Args::new()).unwrap();
    assert_eq!(rig.state("fan"), "off");

    rig.supervisor.start();
    rig.runtime().run_until_stalled();
    rig.board.set_input(5, true);
    rig.runtime().run_for(Duration::from_millis(100));

    assert_eq!(rig.state("button"), "on");
    assert_eq!(rig.state("fan"), "on");
    assert_eq!(rig.board.duty(FAN_PIN), Some(duty_for(40, DEFAULT_MAX_DUTY)));
}

#[test]
fn a_held_button_fires_its_actions_once() {
    let rig = Rig::load(BUTTON_FAN);
    rig.supervisor.start();
    rig.runtime().run_until_stalled();

    rig.board.set_input(5, true);
    rig.runtime().run_for(Duration::from_secs(3));

    assert_eq!(*rig.notifier.calls.borrow(), ["hub.local:8123/pressed"]);
}

// ── Rejected requests ─────────────────────────────────────────

#[test]
fn out_of_range_speed_is_rejected_and_nothing_changes() {
    let rig = Rig::load(BUTTON_FAN);
    let before = rig.board.duty(FAN_PIN);

    let reply = rig.request("/fan/set?value=150");

    assert_eq!(status(&reply), 400);
    assert_eq!(rig.board.duty(FAN_PIN), before);
    assert_eq!(rig.state("fan"), "on");
}

#[test]
fn unknown_path_is_a_404_logged_once() {
    let rig = Rig::load(BUTTON_FAN);

    let reply = rig.request("/nope");

    assert_eq!(status(&reply), 404);
    assert!(body(&reply).contains("/nope"));
    assert_eq!(errors_mentioning("/nope").len(), 1);
}

// ── Chains that cannot resolve ────────────────────────────────

#[test]
fn unresolvable_chain_is_dropped_and_reported_once() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "fan": {"type": "Fan", "pin": 17},
            "chains": {
                "bogus": [{"device": "ghost", "action": "on"}],
                "quiet": [{"device": "fan", "action": "off"}]
            }
        }"#,
    );
    let router = rig.supervisor.router().unwrap();

    assert!(!router.contains("/action/bogus"));
    assert!(!router.contains("/chain/bogus"));
    assert!(router.contains("/action/quiet"));
    assert_eq!(errors_mentioning("bogus").len(), 1);
    assert_eq!(status(&rig.request("/action/bogus")), 404);
}

// ── Best-effort notification vs. failing device calls ─────────

const TRIGGER: &str = r#"{
    "network": {"port": 8080},
    "trigger": {"type": "VirtualToggleButton", "pin": 12},
    "exhaust": {"type": "Fan", "pin": 18},
    "events": [
        {"device": "trigger", "state": "on", "action": {"webhook": {"url": "http://10.9.9.9/fired"}}},
        {"device": "trigger", "state": "on", "action": {"device": {"name": "exhaust", "action": "off"}}}
    ]
}"#;

#[test]
fn unreachable_webhook_does_not_stop_later_actions() {
    let rig = Rig::with_notifier(
        TRIGGER,
        RecordingNotifier {
            refuse: true,
            ..Default::default()
        },
    );
    rig.supervisor.start();
    rig.runtime().run_until_stalled();
    assert_eq!(rig.state("exhaust"), "on");

    let reply = rig.request("/trigger/on");

    assert_eq!(status(&reply), 200);
    assert_eq!(*rig.notifier.calls.borrow(), ["10.9.9.9:80/fired"]);
    assert_eq!(errors_mentioning("10.9.9.9:80/fired").len(), 1);
    assert_eq!(rig.state("exhaust"), "off");
    assert_eq!(rig.board.duty(EXHAUST_PIN), Some(DEFAULT_MAX_DUTY));
}

#[test]
fn failing_device_call_skips_the_rest_of_its_list() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "trigger": {"type": "VirtualToggleButton", "pin": 12},
            "fan": {"type": "Fan", "pin": 17},
            "exhaust": {"type": "Fan", "pin": 18},
            "events": [
                {"device": "trigger", "state": "on", "action": [
                    {"device": {"name": "fan", "action": "set", "value": 150}},
                    {"device": {"name": "exhaust", "action": "set", "value": 60}}
                ]}
            ]
        }"#,
    );
    rig.supervisor.start();
    rig.runtime().run_until_stalled();
    let exhaust_before = rig.board.duty(EXHAUST_PIN);

    let reply = rig.request("/trigger/on");

    // The trigger itself succeeded; only its bound actions failed.
    assert_eq!(status(&reply), 200);
    assert_eq!(rig.board.duty(EXHAUST_PIN), exhaust_before);
    let failures = errors_mentioning("skipping 1 remaining");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("fan.set(value=150)"));
}

// ── Operation-driven state changes ────────────────────────────

#[test]
fn fan_operations_fire_bindings_on_state_change() {
    let rig = Rig::load(
        r#"{
            "network": {"port": 8080},
            "fan": {"type": "Fan", "pin": 17, "idle": 0},
            "events": [
                {"device": "fan", "state": "on", "action": {"webhook": {"url": "http://hub.local/fan-on"}}},
                {"device": "fan", "state": "off", "action": {"webhook": {"url": "http://hub.local/fan-off"}}}
            ]
        }"#,
    );
    rig.supervisor.start();
    rig.runtime().run_until_stalled();
    assert_eq!(rig.state("fan"), "off");

    assert_eq!(status(&rig.request("/fan/set?value=50")), 200);
    assert_eq!(*rig.notifier.calls.borrow(), ["hub.local:80/fan-on"]);

    // Still on: nothing is re-sent.
    assert_eq!(status(&rig.request("/fan/set?value=60")), 200);
    assert_eq!(rig.notifier.calls.borrow().len(), 1);

    assert_eq!(status(&rig.request("/fan/off")), 200);
    assert_eq!(*rig.notifier.calls.borrow(), ["hub.local:80/fan-on", "hub.local:80/fan-off"]);
}
