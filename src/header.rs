//! The C header through which the fleet configuration reaches the firmware
//! build.

use crate::Config;

/// File name of the header, both in the fleet directory and in the firmware
/// project `include` directory.
pub const HEADER_FILENAME: &str = "BiosensorsNetwork.h";

/// Renders the header for `config`.
pub fn render(config: &Config) -> String {
    let broker = config.broker();
    format!(
        "#ifndef BN_H\n\
         #define BN_H\n\n\
         #define BNN \"{}\"\n\
         #define N_SIZE {}\n\n\
         #define WIFI_SSID \"{}\"\n\
         #define WIFI_PSW \"{}\"\n\n\
         #define BROKER_USERNAME \"{}\"\n\
         #define BROKER_PSW \"{}\"\n\
         #define TOPIC_PREFIX \"{}\"\n\n\
         #endif\n",
        c_escape(config.name()),
        config.size(),
        c_escape(config.wifi_ssid()),
        c_escape(config.wifi_password()),
        c_escape(broker.username()),
        c_escape(broker.password()),
        c_escape(broker.topic_prefix()),
    )
}

/// Escapes a value for use inside a C string literal.
fn c_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn header_defines_every_value() {
    let config = Config::new("hive1", 3, "bees", "honey", "alice", "s3cret").unwrap();
    let header = render(&config);
    assert!(header.starts_with("#ifndef BN_H\n#define BN_H\n"));
    for line in &[
        "#define BNN \"hive1\"",
        "#define N_SIZE 3",
        "#define WIFI_SSID \"bees\"",
        "#define WIFI_PSW \"honey\"",
        "#define BROKER_USERNAME \"alice\"",
        "#define BROKER_PSW \"s3cret\"",
        "#define TOPIC_PREFIX \"alice/hive1/\"",
    ] {
        assert!(header.lines().any(|l| l == *line), "missing `{}`", line);
    }
    assert!(header.trim_end().ends_with("#endif"));
}

#[test]
fn quotes_in_passwords_are_escaped() {
    let config = Config::new("hive1", 1, "my \"home\"", "a\\b", "alice", "p").unwrap();
    let header = render(&config);
    assert!(header.contains(r#"#define WIFI_SSID "my \"home\"""#));
    assert!(header.contains(r#"#define WIFI_PSW "a\\b""#));
}
