use std::time::Duration;

use scripter_rs::config::{Config, DEFAULT_SESSION_TIMEOUT};
use scripter_rs::error::Error;
use secrecy::ExposeSecret;

const VARS: [&str; 5] = [
    "BACKEND_URL",
    "BACKEND_WS_URL",
    "BACKEND_API_TOKEN",
    "UPLOAD_API_URL",
    "GENERATE_TIMEOUT_SECS",
];

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

// Environment mutation is process-wide, so every from_env case lives here.
#[test]
fn config_from_env() {
    clear_env();
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::set_var("BACKEND_URL", "http://localhost:8000");
        std::env::set_var("BACKEND_API_TOKEN", "tok");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.backend_url, "http://localhost:8000");
    assert_eq!(config.session_timeout, Some(DEFAULT_SESSION_TIMEOUT));
    assert_eq!(config.api_token.as_ref().unwrap().expose_secret(), "tok");
    assert!(config.backend_ws_url.is_none());
    assert!(!config.log_level.is_empty());

    unsafe { std::env::set_var("GENERATE_TIMEOUT_SECS", "45") };
    assert_eq!(
        Config::from_env().unwrap().session_timeout,
        Some(Duration::from_secs(45))
    );

    unsafe { std::env::set_var("GENERATE_TIMEOUT_SECS", "0") };
    assert_eq!(Config::from_env().unwrap().session_timeout, None);

    unsafe { std::env::set_var("GENERATE_TIMEOUT_SECS", "soon") };
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe { std::env::set_var("BACKEND_WS_URL", "  ") };
    unsafe { std::env::remove_var("GENERATE_TIMEOUT_SECS") };
    assert!(Config::from_env().unwrap().backend_ws_url.is_none());

    clear_env();
}

#[test]
fn websocket_base_swaps_scheme() {
    let ws = Config::new("http://localhost:8000").websocket_base().unwrap();
    assert_eq!(ws.as_str(), "ws://localhost:8000/");

    let wss = Config::new("https://api.example.com/").websocket_base().unwrap();
    assert_eq!(wss.as_str(), "wss://api.example.com/");
}

#[test]
fn explicit_websocket_url_is_used_verbatim() {
    let mut config = Config::new("http://localhost:8000");
    config.backend_ws_url = Some("wss://stream.example.com".to_string());
    assert_eq!(
        config.websocket_base().unwrap().as_str(),
        "wss://stream.example.com/"
    );

    config.backend_ws_url = Some("http://stream.example.com".to_string());
    assert!(matches!(config.websocket_base(), Err(Error::Config(_))));
}

#[test]
fn rejects_unusable_backend_url() {
    assert!(matches!(
        Config::new("not a url").http_base(),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        Config::new("ftp://files.example.com").websocket_base(),
        Err(Error::Config(_))
    ));
}

#[test]
fn upload_base_falls_back_to_backend() {
    let mut config = Config::new("http://localhost:8000");
    assert_eq!(config.upload_base().unwrap().as_str(), "http://localhost:8000/");

    config.upload_api_url = Some("http://uploads.local:3000".to_string());
    assert_eq!(config.upload_base().unwrap().as_str(), "http://uploads.local:3000/");
}
