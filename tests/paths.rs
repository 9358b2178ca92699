// tests/paths.rs

//! Path namespace tests: adding and resolving paths, roots, trash, includes.

mod common;

use buildstore::{ChangeEvent, Error, ErrorCode, PathChange, PathType};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_add_and_resolve_paths() {
    let (_temp, _path, store) = common::open_temp_store();
    let files = store.files();

    let id = files.add_path(PathType::File, "/usr/include/stdio.h").unwrap();
    assert_eq!(files.get_path("/usr/include/stdio.h").unwrap(), id);
    assert_eq!(files.add_path(PathType::File, "/usr/include/stdio.h").unwrap(), id);

    let include = files.get_path("/usr/include").unwrap();
    assert_eq!(files.get_parent(id).unwrap(), include);
    assert_eq!(files.get_path_type(include).unwrap(), PathType::Directory);
    assert_eq!(files.get_base_name(id).unwrap(), "stdio.h");
    assert_eq!(files.get_path_name(id, false).unwrap(), "/usr/include/stdio.h");
    assert_eq!(
        files.get_path_name(id, true).unwrap(),
        "@workspace/usr/include/stdio.h"
    );
}

#[test]
fn test_type_conflicts() {
    let (_temp, _path, store) = common::open_temp_store();
    let files = store.files();

    files.add_path(PathType::File, "/etc/passwd").unwrap();
    let err = files
        .add_path(PathType::File, "/etc/passwd/shadow")
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotADirectory));

    let err = files.add_path(PathType::Directory, "/etc/passwd").unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::OnlyOneAllowed));

    assert!(matches!(
        files.add_path(PathType::File, "relative/path"),
        Err(Error::BadPath(_))
    ));
}

#[test]
fn test_roots_anchor_paths() {
    let (_temp, _path, store) = common::open_temp_store();
    let files = store.files();

    let home = files.add_path(PathType::Directory, "/home/build").unwrap();
    files.add_root("src", home).unwrap();
    assert!(matches!(files.add_root("src", home), Err(Error::AlreadyUsed(_))));

    let c = files.add_path(PathType::File, "@src/main.c").unwrap();
    assert_eq!(files.get_path_name(c, false).unwrap(), "/home/build/main.c");
    assert_eq!(files.get_path_name(c, true).unwrap(), "@src/main.c");
    assert_eq!(files.get_enclosing_root(c).unwrap(), "src");
    assert_eq!(files.get_root_at_path(home).unwrap().as_deref(), Some("src"));

    assert!(matches!(files.delete_root("workspace"), Err(Error::CantRemove(_))));
    files.delete_root("src").unwrap();
    assert!(matches!(files.get_root_path("src"), Err(Error::NotFound(_))));
}

#[test]
fn test_trash_and_revive() {
    let (_temp, _path, store) = common::open_temp_store();
    let files = store.files();

    let dir = files.add_path(PathType::Directory, "/tmp/work").unwrap();
    let file = files.add_path(PathType::File, "/tmp/work/out.txt").unwrap();

    assert!(matches!(files.move_to_trash(dir), Err(Error::CantRemove(_))));
    files.move_to_trash(file).unwrap();
    assert!(!files.is_valid_path(file).unwrap());
    assert!(files.get_children(dir).unwrap().is_empty());

    files.move_to_trash(dir).unwrap();
    assert!(matches!(files.revive_from_trash(file), Err(Error::CantRevive(_))));

    files.revive_from_trash(dir).unwrap();
    files.revive_from_trash(file).unwrap();
    assert_eq!(files.get_children(dir).unwrap(), vec![file]);
}

#[test]
fn test_listeners_see_revivals() {
    let (_temp, _path, store) = common::open_temp_store();
    let files = store.files();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    let listener: Rc<dyn buildstore::ChangeListener<PathChange>> =
        Rc::new(move |event: &ChangeEvent<PathChange>| sink.borrow_mut().push(event.kind));
    files.add_listener(listener.clone());

    let file = files.add_path(PathType::File, "/a/b").unwrap();
    files.move_to_trash(file).unwrap();
    assert_eq!(files.add_path(PathType::File, "/a/b").unwrap(), file);

    files.remove_listener(&listener);
    files.move_to_trash(file).unwrap();

    assert_eq!(*seen.borrow(), vec![PathChange::Trashed, PathChange::Revived]);
}

#[test]
fn test_file_includes() {
    let (_temp, _path, store) = common::open_temp_store();
    let files = store.files();
    let includes = store.file_includes();

    let main_c = files.add_path(PathType::File, "/src/main.c").unwrap();
    let util_h = files.add_path(PathType::File, "/src/util.h").unwrap();
    let other_c = files.add_path(PathType::File, "/src/other.c").unwrap();

    includes.add_file_includes(main_c, util_h).unwrap();
    includes.add_file_includes(main_c, util_h).unwrap();
    includes.add_file_includes(other_c, util_h).unwrap();

    assert_eq!(includes.get_file_includes_count(main_c, util_h).unwrap(), 2);
    assert_eq!(includes.get_files_that_include(util_h).unwrap().len(), 2);
    assert!(matches!(files.move_to_trash(util_h), Err(Error::CantRemove(_))));

    let top = store
        .reports()
        .report_most_common_includers_of_file(util_h)
        .unwrap();
    assert_eq!(top[0].path, main_c);
    assert_eq!(top[0].count, 2);

    assert_eq!(includes.delete_files_included_by(main_c).unwrap(), 1);
    assert_eq!(includes.get_files_included_by(main_c).unwrap(), Vec::<i32>::new());
}
