use std::io::Write;

use vr_viewer::config::{ConfigError, DEFAULT_SEGMENTS};
use vr_viewer::{Eye, Format, Layout, PlayerConfig};

#[test]
fn loads_player_config_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{
            "layout": "stereoLeftRight",
            "flipLayout": true,
            "format": "360",
            "segments": 32,
            "screen": {{ "height": 2.0 }},
            "clearColor": [0.0, 0.0, 0.0, 1.0],
            "debugView": "right"
        }}"#
    )
    .expect("write config");

    let config = PlayerConfig::load(file.path()).expect("config loads");
    assert_eq!(config.layout, Layout::StereoLeftRight);
    assert!(config.flip_layout);
    assert_eq!(config.format, Format::Full);
    assert_eq!(config.segments, 32);
    assert_eq!(config.screen.height, 2.0);
    assert_eq!(config.screen.distance, 1.0);
    assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(config.debug_view, Eye::Right);
}

#[test]
fn empty_object_is_the_default_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("player.json");
    std::fs::write(&path, "{}").expect("write config");

    let config = PlayerConfig::load(&path).expect("config loads");
    assert_eq!(config, PlayerConfig::default());
    assert_eq!(config.segments, DEFAULT_SEGMENTS);
}

#[test]
fn reports_missing_and_malformed_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = PlayerConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(missing, ConfigError::Io(_)));

    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{ "format": "720" }"#).expect("write config");
    let malformed = PlayerConfig::load(&path).unwrap_err();
    assert!(matches!(malformed, ConfigError::Parse(_)));
    assert!(malformed.to_string().starts_with("malformed player config"));
}
