use std::sync::Arc;
use tempfile::TempDir;
use wrxconfig::Config;
use wrxdx::{Spot, SpotStore, SpotUpdate};

/// Crée un magasin vide sur un répertoire temporaire
fn create_test_store() -> (TempDir, SpotStore) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config::load(temp_dir.path().to_str().unwrap()).unwrap());
    let store = SpotStore::new(config).unwrap();
    (temp_dir, store)
}

fn insert(store: &SpotStore, freq: f64, offset: i32, ident: &str) {
    store
        .update(SpotUpdate::Insert {
            freq,
            offset,
            flags: 0,
            ident: ident.into(),
            notes: String::new(),
        })
        .unwrap();
}

fn frequencies(store: &SpotStore) -> Vec<f64> {
    store.snapshot().iter().map(Spot::effective_freq).collect()
}

fn assert_sorted(store: &SpotStore) {
    let freqs = frequencies(store);
    let mut sorted = freqs.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(freqs, sorted, "store must stay sorted by effective freq");
}

#[test]
fn test_insert_on_empty_store() {
    let (_temp_dir, store) = create_test_store();
    assert!(store.is_empty());

    store
        .update(SpotUpdate::Insert {
            freq: 7030.0,
            offset: 0,
            flags: 0,
            ident: "CW".into(),
            notes: "test".into(),
        })
        .unwrap();

    assert_eq!(store.len(), 1);
    let spots = store.snapshot();
    assert_eq!(spots[0].freq, 7030.0);
    assert_eq!(spots[0].ident, "CW");
    assert_eq!(spots[0].notes, "test");
}

#[test]
fn test_insert_keeps_sorted_position() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 14074.0, 0, "FT8");
    insert(&store, 7030.0, 0, "CW");
    insert(&store, 10136.0, 0, "FT8-30m");

    assert_eq!(frequencies(&store), vec![7030.0, 10136.0, 14074.0]);
}

#[test]
fn test_offset_counts_in_ordering() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 7030.0, 0, "a");
    // L'ordre suit la fréquence effective (porteuse + décalage), pas la
    // porteuse seule : b = 7029.9, a = 7030.0, c = 7030.1
    insert(&store, 7029.5, 400, "b");
    insert(&store, 7029.5, 600, "c");

    let idents: Vec<String> = store.snapshot().into_iter().map(|s| s.ident).collect();
    assert_eq!(idents, vec!["b", "a", "c"]);
    assert_sorted(&store);
}

#[test]
fn test_insert_then_delete_restores_sequence() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 7030.0, 0, "CW");
    insert(&store, 14074.0, 0, "FT8");
    insert(&store, 3573.0, 0, "FT8-80m");
    let before = store.snapshot();

    insert(&store, 10136.0, 0, "ephemeral");
    let gid = store
        .snapshot()
        .iter()
        .position(|s| s.ident == "ephemeral")
        .unwrap();
    store.update(SpotUpdate::Delete { gid }).unwrap();

    // Contenu et ordre identiques à l'état initial
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_delete_truncates_not_shifts() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 7030.0, 0, "a");
    insert(&store, 7040.0, 0, "b");
    insert(&store, 7050.0, 0, "c");

    store.update(SpotUpdate::Delete { gid: 0 }).unwrap();
    assert_eq!(store.len(), 2);
    let idents: Vec<String> = store.snapshot().into_iter().map(|s| s.ident).collect();
    assert_eq!(idents, vec!["b", "c"]);
    assert_sorted(&store);
}

#[test]
fn test_modify_resorts() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 7030.0, 0, "a");
    insert(&store, 7040.0, 0, "b");

    // Déplace "a" au-dessus de "b"
    store
        .update(SpotUpdate::Modify {
            gid: 0,
            freq: 7050.0,
            offset: 0,
            flags: 4,
            ident: "a2".into(),
            notes: "moved".into(),
        })
        .unwrap();

    let spots = store.snapshot();
    assert_eq!(spots[0].ident, "b");
    assert_eq!(spots[1].ident, "a2");
    assert_eq!(spots[1].flags, 4);
    assert_sorted(&store);
}

#[test]
fn test_out_of_range_gid() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 7030.0, 0, "a");

    assert!(store.update(SpotUpdate::Delete { gid: 5 }).is_err());
    assert!(store
        .update(SpotUpdate::Modify {
            gid: 1,
            freq: 1.0,
            offset: 0,
            flags: 0,
            ident: String::new(),
            notes: String::new(),
        })
        .is_err());
    // Le magasin n'a pas bougé
    assert_eq!(store.len(), 1);
}

#[test]
fn test_sorted_after_mixed_mutations() {
    let (_temp_dir, store) = create_test_store();
    for (f, id) in [(28074.0, "10m"), (7030.0, "40m"), (14074.0, "20m"), (3573.0, "80m")] {
        insert(&store, f, 0, id);
        assert_sorted(&store);
    }
    store.update(SpotUpdate::Delete { gid: 1 }).unwrap();
    assert_sorted(&store);
    store
        .update(SpotUpdate::Modify {
            gid: 0,
            freq: 21074.0,
            offset: 0,
            flags: 0,
            ident: "15m".into(),
            notes: String::new(),
        })
        .unwrap();
    assert_sorted(&store);
}

#[test]
fn test_mutations_survive_reload() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config::load(temp_dir.path().to_str().unwrap()).unwrap());
    {
        let store = SpotStore::new(config.clone()).unwrap();
        store
            .update(SpotUpdate::Insert {
                freq: 7030.0,
                offset: 0,
                flags: 1,
                ident: "CW".into(),
                notes: "persisted".into(),
            })
            .unwrap();
    }

    // Nouveau magasin sur le même répertoire : la mutation a été persistée
    let store = SpotStore::new(config).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.snapshot()[0].notes, "persisted");
}

#[test]
fn test_markers_window_with_margin() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 7000.0, 0, "below");
    insert(&store, 7020.0, 0, "edge-low"); // dans la marge de 10 kHz
    insert(&store, 7050.0, 0, "inside");
    insert(&store, 7080.0, 0, "edge-high");
    insert(&store, 7200.0, 0, "above");

    // Zoom fin : pas d'éclaircissage
    let markers = store.markers(7030.0, 7070.0, 10, 1024);
    let idents: Vec<&str> = markers.iter().map(|m| m.ident.as_str()).collect();
    assert_eq!(idents, vec!["edge-low", "inside", "edge-high"]);
}

#[test]
fn test_markers_thinning_at_coarse_zoom() {
    let (_temp_dir, store) = create_test_store();
    // Trois spots à moins de 10 px l'un de l'autre, un quatrième éloigné
    insert(&store, 7030.0, 0, "keep-1");
    insert(&store, 7030.2, 0, "drop-a");
    insert(&store, 7030.4, 0, "drop-b");
    insert(&store, 7060.0, 0, "keep-2");

    let min = 7000.0;
    let max = 7100.0;
    let width = 1000u32;
    let markers = store.markers(min, max, 3, width);
    let idents: Vec<&str> = markers.iter().map(|m| m.ident.as_str()).collect();
    assert_eq!(idents, vec!["keep-1", "keep-2"]);

    // Propriété : jamais deux marqueurs à moins du seuil en pixels
    let xs: Vec<i32> = markers
        .iter()
        .map(|m| (((m.freq - min) / (max - min)) * width as f64) as i32)
        .collect();
    for pair in xs.windows(2) {
        assert!(pair[1] - pair[0] >= wrxdx::SPACING_THRESHOLD_PX);
    }
}

#[test]
fn test_markers_fine_zoom_returns_everything_in_window() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 7030.0, 0, "a");
    insert(&store, 7030.2, 0, "b");
    insert(&store, 7030.4, 0, "c");

    let markers = store.markers(7030.0, 7031.0, 6, 100);
    assert_eq!(markers.len(), 3);
}

#[test]
fn test_marker_gid_is_sorted_index() {
    let (_temp_dir, store) = create_test_store();
    insert(&store, 14074.0, 0, "high");
    insert(&store, 7030.0, 0, "low");

    let markers = store.markers(0.0, 30000.0, 10, 1024);
    assert_eq!(markers[0].gid, 0);
    assert_eq!(markers[0].ident, "low");
    assert_eq!(markers[1].gid, 1);
    assert_eq!(markers[1].ident, "high");
}
