use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use ipdc_ldes_mirror::config::{Config, ConfigLoader, archive_dir};
use ipdc_ldes_mirror::error::MirrorError;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn environment_names_map_onto_fields() {
    let config = Config::from_lookup(lookup(&[
        ("IPDC_API_HOST", "https://ipdc.example"),
        ("IPDC_API_KEY", "secret"),
        ("DATA_DIR", "/srv/data"),
        ("LDES_FOLDER", "products"),
        ("ENABLE_POLLING", "true"),
        ("CRON_PATTERN", "0 0 * * * *"),
        ("REQUEST_TIMEOUT_SECS", "5"),
    ]))
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.api_host.as_str(), "https://ipdc.example/");
    assert_eq!(resolved.api_key, "secret");
    assert_eq!(resolved.archive_dir, Utf8PathBuf::from("/srv/data/products"));
    assert!(resolved.polling_enabled);
    assert_eq!(resolved.cron_pattern, "0 0 * * * *");
    assert_eq!(resolved.request_timeout, Duration::from_secs(5));
}

#[test]
fn zero_does_not_enable_polling() {
    let config = Config::from_lookup(lookup(&[("IPDC_API_KEY", "k"), ("ENABLE_POLLING", "0")])).unwrap();
    assert_eq!(config.enable_polling, Some(false));
    assert!(!ConfigLoader::resolve_config(config).unwrap().polling_enabled);
}

#[test]
fn empty_variables_count_as_unset() {
    let config = Config::from_lookup(lookup(&[("IPDC_API_KEY", "k"), ("LDES_FOLDER", "")])).unwrap();
    assert_eq!(archive_dir(&config).unwrap(), Utf8PathBuf::from("/data/ipdc-products"));
}

#[test]
fn environment_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"api_key": "from-file", "ldes_folder": "file-folder", "enable_polling": true}}"#
    )
    .unwrap();

    let from_file = ConfigLoader::read(file.path().to_path_buf()).unwrap();
    let env = Config::from_lookup(lookup(&[("LDES_FOLDER", "env-folder")])).unwrap();
    let resolved = ConfigLoader::resolve_config(from_file.merge(env)).unwrap();

    assert_eq!(resolved.api_key, "from-file");
    assert_eq!(resolved.archive_dir, Utf8PathBuf::from("/data/env-folder"));
    assert!(resolved.polling_enabled);
}

#[test]
fn missing_api_key_is_reported() {
    let config = Config::from_lookup(lookup(&[])).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(MirrorError::MissingApiKey)
    );
}

#[test]
fn invalid_values_are_rejected() {
    let bad_host = Config::from_lookup(lookup(&[("IPDC_API_KEY", "k"), ("IPDC_API_HOST", "not a url")])).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(bad_host),
        Err(MirrorError::InvalidConfig(_))
    );

    let bad_cron = Config::from_lookup(lookup(&[("IPDC_API_KEY", "k"), ("CRON_PATTERN", "*/5")])).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(bad_cron),
        Err(MirrorError::InvalidSchedule(_))
    );

    assert_matches!(
        Config::from_lookup(lookup(&[("REQUEST_TIMEOUT_SECS", "soon")])),
        Err(MirrorError::InvalidConfig(_))
    );

    let escaping = Config::from_lookup(lookup(&[("LDES_FOLDER", "../etc")])).unwrap();
    assert_matches!(archive_dir(&escaping), Err(MirrorError::InvalidConfig(_)));
}

#[test]
fn unreadable_and_malformed_files() {
    assert_matches!(
        ConfigLoader::read("/nonexistent/ldes-mirror.json".into()),
        Err(MirrorError::ConfigRead(_))
    );

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert_matches!(
        ConfigLoader::read(file.path().to_path_buf()),
        Err(MirrorError::ConfigParse(_))
    );
}
