// tests/store.rs

//! Store lifecycle tests: reopen, fast mode, save-as, trash purge, config.

mod common;

use buildstore::{BuildStore, Error, PathType, StoreConfig};

#[test]
fn test_data_survives_reopen() {
    let (_temp, path, store) = common::open_temp_store();
    let build = common::record_compile_build(&store);
    store.close().unwrap();

    let store = BuildStore::open(&path, &StoreConfig::default()).unwrap();
    assert_eq!(store.files().get_path("/obj/a.o").unwrap(), build.obj);
    assert_eq!(
        store.actions().get_command(build.compile).unwrap(),
        "cc -c a.c -o ../obj/a.o"
    );
}

#[test]
fn test_close_purges_trash() {
    let (_temp, path, store) = common::open_temp_store();
    let files = store.files();
    let doomed = files.add_path(PathType::File, "/tmp/doomed").unwrap();
    files.move_to_trash(doomed).unwrap();
    assert!(files.is_trashed(doomed).unwrap());
    store.close().unwrap();

    let store = BuildStore::open(&path, &StoreConfig::default()).unwrap();
    assert!(matches!(store.files().get_path("/tmp/doomed"), Err(Error::NotFound(_))));
    assert!(matches!(store.files().is_trashed(doomed), Err(Error::NotFound(_))));
}

#[test]
fn test_fast_mode_and_save_as() {
    let (temp, _path, store) = common::open_temp_store();
    store.set_fast_access_mode(true).unwrap();
    assert!(store.is_fast_access_mode());

    for n in 0..50 {
        store
            .files()
            .add_path(PathType::File, &format!("/gen/out{}.o", n))
            .unwrap();
    }

    let copy_path = temp.path().join("copy.db");
    store.save_as(&copy_path).unwrap();
    assert!(store.is_fast_access_mode());
    store.close().unwrap();

    let copy = BuildStore::open(&copy_path, &StoreConfig::default()).unwrap();
    let gen_dir = copy.files().get_path("/gen").unwrap();
    assert_eq!(copy.files().get_children(gen_dir).unwrap().len(), 50);
}

#[test]
fn test_open_with_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let config_path = temp.path().join("buildstore.toml");
    std::fs::write(
        &config_path,
        "path_cache_capacity = 16\nworkspace_native = \"/home/dev/project\"\n",
    )
    .unwrap();

    let config = StoreConfig::from_file(&config_path).unwrap();
    assert_eq!(config.path_cache_capacity, 16);

    let store = BuildStore::open(&temp.path().join("build.db"), &config).unwrap();
    assert_eq!(
        store.package_roots().get_workspace_native().unwrap(),
        Some("/home/dev/project".into())
    );
}

#[test]
fn test_upgrade_current_store_is_noop() {
    let (_temp, path, store) = common::open_temp_store();
    store.close().unwrap();
    assert_eq!(
        BuildStore::upgrade(&path).unwrap(),
        buildstore::db::schema::SCHEMA_VERSION
    );
}
