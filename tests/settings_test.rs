use std::collections::HashMap;

use callscribe::infrastructure::audio::TranscriptionMode;
use callscribe::presentation::{ConfigError, Settings};

fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
    let map: HashMap<&str, &str> = vars.iter().copied().collect();
    move |key| map.get(key).map(|v| v.to_string())
}

#[test]
fn given_minimal_environment_when_loading_then_defaults_apply() {
    let settings = Settings::from_lookup(lookup(&[("MYSQL_DATABASE", "llamadas")])).unwrap();

    assert_eq!(settings.database.host, "localhost");
    assert_eq!(settings.database.port, 3306);
    assert_eq!(settings.database.database, "llamadas");
    assert_eq!(settings.workers, 4);
    assert_eq!(settings.chunk_size, 16);
    assert_eq!(settings.transcription_mode, TranscriptionMode::Embedded);
    assert_eq!(settings.language.as_deref(), Some("es"));
    assert!(!settings.cleanup_audio);
    assert_eq!(settings.service_url, "http://localhost:8000");
}

#[test]
fn given_no_database_name_when_loading_then_it_is_a_fatal_missing_error() {
    let result = Settings::from_lookup(lookup(&[]));

    assert!(matches!(result, Err(ConfigError::Missing("MYSQL_DATABASE"))));
}

#[test]
fn given_unparsable_port_when_loading_then_error_names_the_key() {
    let result = Settings::from_lookup(lookup(&[
        ("MYSQL_DATABASE", "llamadas"),
        ("MYSQL_PORT", "not-a-port"),
    ]));

    match result {
        Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "MYSQL_PORT"),
        other => panic!("expected invalid MYSQL_PORT, got {:?}", other),
    }
}

#[test]
fn given_service_mode_when_loading_then_mode_and_url_are_used() {
    let settings = Settings::from_lookup(lookup(&[
        ("MYSQL_DATABASE", "llamadas"),
        ("TRANSCRIPTION_MODE", "service"),
        ("WHISPER_SERVICE_URL", "http://10.0.0.5:9000"),
    ]))
    .unwrap();

    assert_eq!(settings.transcription_mode, TranscriptionMode::Service);
    assert_eq!(settings.service_url, "http://10.0.0.5:9000");
}

#[test]
fn given_unknown_mode_when_loading_then_it_is_rejected() {
    let result = Settings::from_lookup(lookup(&[
        ("MYSQL_DATABASE", "llamadas"),
        ("TRANSCRIPTION_MODE", "gpu-farm"),
    ]));

    assert!(matches!(
        result,
        Err(ConfigError::Invalid {
            key: "TRANSCRIPTION_MODE",
            ..
        })
    ));
}

#[test]
fn given_cleanup_toggle_when_loading_then_booleans_parse_loosely() {
    for truthy in ["1", "true", "YES", "on"] {
        let settings = Settings::from_lookup(lookup(&[
            ("MYSQL_DATABASE", "llamadas"),
            ("CLEANUP_AUDIO", truthy),
        ]))
        .unwrap();
        assert!(settings.cleanup_audio, "{} should enable cleanup", truthy);
    }

    let result = Settings::from_lookup(lookup(&[
        ("MYSQL_DATABASE", "llamadas"),
        ("CLEANUP_AUDIO", "sometimes"),
    ]));
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[test]
fn given_zero_workers_when_loading_then_it_is_rejected() {
    let result = Settings::from_lookup(lookup(&[
        ("MYSQL_DATABASE", "llamadas"),
        ("MAX_WORKERS", "0"),
    ]));

    assert!(matches!(
        result,
        Err(ConfigError::Invalid {
            key: "MAX_WORKERS",
            ..
        })
    ));
}

#[test]
fn given_blank_language_when_loading_then_no_language_hint_is_used() {
    let settings = Settings::from_lookup(lookup(&[
        ("MYSQL_DATABASE", "llamadas"),
        ("WHISPER_LANGUAGE", ""),
    ]))
    .unwrap();

    assert_eq!(settings.language, None);
}
