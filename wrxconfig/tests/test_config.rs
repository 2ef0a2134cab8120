use serde_json::{json, Value};
use tempfile::TempDir;
use wrxconfig::{Config, SpotRecord};

/// Crée une configuration dans un répertoire temporaire
fn create_test_config() -> (TempDir, Config) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::load(temp_dir.path().to_str().unwrap()).unwrap();
    (temp_dir, config)
}

#[test]
fn test_load_creates_files() {
    let (temp_dir, _config) = create_test_config();

    // Les deux domaines sont sauvegardés au chargement
    assert!(temp_dir.path().join("config.json").exists());
    assert!(temp_dir.path().join("admin.json").exists());
}

#[test]
fn test_defaults() {
    let (_temp_dir, config) = create_test_config();

    assert_eq!(config.get_rx_channels(), 4);
    assert_eq!(config.get_chan_no_pwd(), 0);
    assert_eq!(config.get_clk_adj_ppm_limit(), 100);
    assert!(config.get_user_password().is_none());
    assert!(config.get_admin_password().is_none());
    assert!(!config.get_user_auto_login());
    assert!(!config.get_admin_auto_login());
}

#[test]
fn test_set_get_roundtrip() {
    let (_temp_dir, config) = create_test_config();

    config.set_value(&["chan_no_pwd"], json!(2)).unwrap();
    assert_eq!(config.get_chan_no_pwd(), 2);

    config
        .adm_set_value(&["admin_password"], json!("Hunter2"))
        .unwrap();
    assert_eq!(config.get_admin_password().as_deref(), Some("Hunter2"));
}

#[test]
fn test_set_persists_to_disk() {
    let (temp_dir, config) = create_test_config();

    config.set_value(&["status_msg"], json!("bonjour")).unwrap();
    drop(config);

    // Rechargement : la valeur doit avoir survécu
    let config = Config::load(temp_dir.path().to_str().unwrap()).unwrap();
    assert_eq!(config.get_status_msg(), "bonjour");
}

#[test]
fn test_env_override() {
    let temp_dir = tempfile::tempdir().unwrap();

    // La variable d'environnement prime sur le fichier et le défaut intégré
    std::env::set_var("WRX_CONFIG__ANTENNA", "dipole 40m");
    std::env::set_var("WRX_CONFIG__IDENT__SERIAL_NUMBER", "4217");
    let config = Config::load(temp_dir.path().to_str().unwrap()).unwrap();
    std::env::remove_var("WRX_CONFIG__ANTENNA");
    std::env::remove_var("WRX_CONFIG__IDENT__SERIAL_NUMBER");

    assert_eq!(config.get_value(&["antenna"]).unwrap(), json!("dipole 40m"));
    // Les valeurs numériques sont converties, pas gardées en chaîne
    assert_eq!(config.get_server_ident().serial_number, 4217);
}

#[test]
fn test_keys_are_lowercased() {
    let (_temp_dir, config) = create_test_config();

    config.set_value(&["Ident", "MAC"], json!("aa:bb")).unwrap();
    assert_eq!(config.get_value(&["ident", "mac"]).unwrap(), json!("aa:bb"));
}

#[test]
fn test_replace_user_document() {
    let (_temp_dir, config) = create_test_config();

    config
        .replace_user(r#"{"rx_channels": 8, "status_msg": "replaced"}"#)
        .unwrap();
    assert_eq!(config.get_rx_channels(), 8);
    assert_eq!(config.get_status_msg(), "replaced");
}

#[test]
fn test_replace_rejects_bad_json() {
    let (_temp_dir, config) = create_test_config();

    config.set_value(&["status_msg"], json!("before")).unwrap();

    // Un document invalide ne doit pas entamer l'état précédent
    assert!(config.replace_user("{not json").is_err());
    assert!(config.replace_user(r#"["not", "an", "object"]"#).is_err());
    assert_eq!(config.get_status_msg(), "before");
}

#[test]
fn test_replace_admin_document() {
    let (_temp_dir, config) = create_test_config();

    config
        .replace_admin(r#"{"admin_password": "s3cret", "admin_auto_login": true}"#)
        .unwrap();
    assert_eq!(config.get_admin_password().as_deref(), Some("s3cret"));
    assert!(config.get_admin_auto_login());
}

#[test]
fn test_unknown_path_is_error() {
    let (_temp_dir, config) = create_test_config();

    assert!(config.get_value(&["no", "such", "path"]).is_err());
}

#[test]
fn test_server_ident_defaults() {
    let (_temp_dir, config) = create_test_config();

    let ident = config.get_server_ident();
    assert_eq!(ident.ext_port, 8073);
    assert_eq!(ident.version_major, 1);
    // L'IP publique est devinée quand elle n'est pas configurée
    assert!(!ident.public_ip.is_empty());
}

#[test]
fn test_spots_roundtrip() {
    let (temp_dir, config) = create_test_config();

    let spots = vec![
        SpotRecord {
            freq: 7030.0,
            offset: 0,
            flags: 0,
            ident: "CW".into(),
            notes: "test".into(),
        },
        SpotRecord {
            freq: 14074.0,
            offset: 500,
            flags: 2,
            ident: "FT8".into(),
            notes: String::new(),
        },
    ];
    config.save_spots(&spots).unwrap();
    assert!(temp_dir.path().join("dx.json").exists());

    let loaded = config.load_spots().unwrap();
    assert_eq!(loaded, spots);
}

#[test]
fn test_spots_missing_file_is_empty() {
    let (_temp_dir, config) = create_test_config();

    assert_eq!(config.load_spots().unwrap(), Vec::<SpotRecord>::new());
}

#[test]
fn test_get_value_type() {
    let (_temp_dir, config) = create_test_config();

    match config.get_value(&["timezone"]).unwrap() {
        Value::Object(map) => assert!(map.contains_key("id")),
        other => panic!("timezone should be an object, got {other:?}"),
    }
}
