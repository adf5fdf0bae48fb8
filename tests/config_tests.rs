use chrono::{TimeZone, Utc};
use rust_photo_saver::config::{Configuration, SourceConfig};
use rust_photo_saver::source::FlickrListing;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
cache-dir: "/var/cache/saver"
capacity: 4
poll-quantum: 50ms
failure-backoff: 2s
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.cache_dir, PathBuf::from("/var/cache/saver"));
    assert_eq!(cfg.capacity, 4);
    assert_eq!(cfg.poll_quantum, Duration::from_millis(50));
    assert_eq!(cfg.failure_backoff, Duration::from_secs(2));
    assert!(cfg.sources.is_empty());
}

#[test]
fn defaults_apply_to_missing_keys() {
    let cfg: Configuration = serde_yaml::from_str("seed: 7\n").unwrap();
    assert_eq!(cfg.seed, Some(7));
    assert_eq!(cfg.capacity, 10);
    assert_eq!(cfg.poll_quantum, Duration::from_millis(100));
    assert_eq!(cfg.updater.interval, Duration::from_secs(5));
    assert_eq!(cfg.flickr.per_page, 500);
    assert_eq!(cfg.flickr.endpoint, "https://api.flickr.com/services/rest/");
    assert!(cfg.cache_dir.ends_with("photo-saver"));
}

#[test]
fn pop_timeout_defaults_to_interval() {
    let yaml = r#"
updater:
  interval: 8s
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.updater.pop_timeout(), Duration::from_secs(8));

    let yaml = r#"
updater:
  interval: 8s
  pop-timeout: 1s 500ms
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.updater.pop_timeout(), Duration::from_millis(1500));
}

#[test]
fn parse_every_source_kind() {
    let yaml = r#"
flickr:
  api-key: abc
sources:
  - type: interestingness
  - type: photostream
    user-id: "7353466@N08"
  - type: group
    group-id: "g1"
  - type: search
    text: fjord
    max-age: 3days
"#;
    let cfg: Configuration = serde_yaml::from_str::<Configuration>(yaml)
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(
        cfg.sources,
        vec![
            SourceConfig::Interestingness,
            SourceConfig::Photostream {
                user_id: "7353466@N08".into()
            },
            SourceConfig::Group {
                group_id: "g1".into()
            },
            SourceConfig::Search {
                text: "fjord".into(),
                max_age: Some(Duration::from_secs(3 * 24 * 60 * 60)),
            },
        ]
    );
}

#[test]
fn search_max_age_becomes_min_upload_date() {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let source = SourceConfig::Search {
        text: "fjord".into(),
        max_age: Some(Duration::from_secs(2 * 24 * 60 * 60)),
    };
    assert_eq!(
        source.to_listing(now),
        FlickrListing::Search {
            text: "fjord".into(),
            min_upload_date: Some(now.timestamp() - 2 * 24 * 60 * 60),
        }
    );

    let unbounded = SourceConfig::Search {
        text: "fjord".into(),
        max_age: None,
    };
    assert_eq!(
        unbounded.to_listing(now),
        FlickrListing::Search {
            text: "fjord".into(),
            min_upload_date: None,
        }
    );
}

#[test]
fn max_age_beyond_the_calendar_is_rejected() {
    let yaml = r#"
flickr:
  api-key: abc
sources:
  - type: search
    text: fjord
    max-age: 1000000years
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let source = cfg.sources[0].clone();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("out of range"), "{err:#}");

    // Converting it anyway leaves the search unbounded instead of panicking.
    assert_eq!(
        source.to_listing(Utc::now()),
        FlickrListing::Search {
            text: "fjord".into(),
            min_upload_date: None,
        }
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let err = serde_yaml::from_str::<Configuration>("capacty: 3\n").unwrap_err();
    assert!(err.to_string().contains("capacty"), "{err}");
}

#[test]
fn unknown_source_kind_is_rejected() {
    let yaml = r#"
sources:
  - type: favourites
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn validated_rejects_zero_capacity() {
    let cfg: Configuration = serde_yaml::from_str("capacity: 0\n").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("capacity"), "{err:#}");
}

#[test]
fn validated_requires_api_key_only_with_sources() {
    let cfg: Configuration = serde_yaml::from_str("capacity: 2\n").unwrap();
    assert!(cfg.validated().is_ok());

    let yaml = r#"
sources:
  - type: interestingness
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("api-key"), "{err:#}");
}

#[test]
fn validated_rejects_blank_source_ids() {
    let yaml = r#"
flickr:
  api-key: abc
sources:
  - type: photostream
    user-id: "  "
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("source #0"), "{err:#}");
}

#[test]
fn validated_rejects_invalid_numeric_ranges() {
    let cases = [
        "flickr:\n  per-page: 501\n",
        "flickr:\n  per-page: 0\n",
        "poll-quantum: 0s\n",
        "updater:\n  interval: 0s\n",
    ];
    for yaml in cases {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err(), "accepted {yaml:?}");
    }
}

#[test]
fn load_from_yaml_file() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        tmp.path(),
        "cache-dir: /tmp/saver\nflickr:\n  api-key: abc\nsources:\n  - type: interestingness\n",
    )
    .unwrap();
    let cfg = Configuration::from_yaml_file(tmp.path())
        .unwrap()
        .validated()
        .unwrap();
    let options = cfg.pool_options();
    assert_eq!(options.dir, PathBuf::from("/tmp/saver"));
    assert_eq!(options.capacity, 10);
    assert_eq!(cfg.flickr.api_key, "abc");
}
